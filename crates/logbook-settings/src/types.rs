use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogbookSettings {
    pub cluster: ClusterSettings,
    pub logging: LoggingSettings,
}

/// Where the storage cluster lives and which keyspace to use.
///
/// Credentials are handed to the driver untouched.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClusterSettings {
    /// Host names or addresses, without port.
    pub contact_points: Vec<String>,
    pub port: u16,
    pub keyspace: String,
    pub connect_timeout_ms: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Create the keyspace and tables on connect if they are missing.
    pub create_schema: bool,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            contact_points: vec!["127.0.0.1".to_string()],
            port: 9142,
            keyspace: "test".to_string(),
            connect_timeout_ms: 5_000,
            username: None,
            password: None,
            create_schema: false,
        }
    }
}

impl ClusterSettings {
    /// Contact points joined with the port, in `host:port` form.
    pub fn known_nodes(&self) -> Vec<String> {
        self.contact_points
            .iter()
            .map(|host| {
                if host.parse::<Ipv6Addr>().is_ok() {
                    format!("[{host}]:{}", self.port)
                } else {
                    format!("{host}:{}", self.port)
                }
            })
            .collect()
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            (Some(user), None) => Some((user.as_str(), "")),
            _ => None,
        }
    }
}

impl fmt::Debug for ClusterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterSettings")
            .field("contact_points", &self.contact_points)
            .field("port", &self.port)
            .field("keyspace", &self.keyspace)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("create_schema", &self.create_schema)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level: trace, debug, info, warn or error.
    pub level: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
    /// Per-target level overrides, e.g. `{"scylla": "warn"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
