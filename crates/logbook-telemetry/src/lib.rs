use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "scylla" => WARN).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from textual levels as they appear in settings files.
    pub fn from_levels<'a, I>(level: &str, modules: I, json: bool) -> Result<Self, TelemetryError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        let log_level = parse_level(level)?;
        let module_levels = modules
            .into_iter()
            .map(|(module, level)| Ok((module.clone(), parse_level(level)?)))
            .collect::<Result<Vec<_>, TelemetryError>>()?;
        Ok(Self {
            log_level,
            module_levels,
            json,
        })
    }

    /// The `EnvFilter` directive string for this config.
    pub fn directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("unknown log level: {0}")]
    UnknownLevel(String),
    #[error("invalid filter directive: {0}")]
    Filter(String),
    #[error("telemetry already initialised: {0}")]
    AlreadyInitialised(String),
    #[error("failed to reload filter: {0}")]
    Reload(String),
}

fn parse_level(level: &str) -> Result<Level, TelemetryError> {
    Level::from_str(level).map_err(|_| TelemetryError::UnknownLevel(level.to_string()))
}

/// Handle to the installed subscriber. Keep it alive for the process lifetime.
pub struct TelemetryGuard {
    filter: reload::Handle<EnvFilter, Registry>,
    config: TelemetryConfig,
}

impl TelemetryGuard {
    /// Change the default level at runtime, keeping per-module overrides.
    pub fn set_level(&mut self, level: Level) -> Result<(), TelemetryError> {
        self.config.log_level = level;
        self.apply()
    }

    /// Change the log level for a specific module at runtime.
    pub fn set_module_level(&mut self, module: &str, level: Level) -> Result<(), TelemetryError> {
        let levels = &mut self.config.module_levels;
        if let Some(entry) = levels.iter_mut().find(|(m, _)| m == module) {
            entry.1 = level;
        } else {
            levels.push((module.to_string(), level));
        }
        self.apply()
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    fn apply(&self) -> Result<(), TelemetryError> {
        let filter = EnvFilter::try_new(self.config.directives())
            .map_err(|e| TelemetryError::Filter(e.to_string()))?;
        self.filter
            .reload(filter)
            .map_err(|e| TelemetryError::Reload(e.to_string()))
    }
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.directives())
            .map_err(|e| TelemetryError::Filter(e.to_string()))?,
    };
    let (filter_layer, filter) = reload::Layer::new(env_filter);

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        let layer = tracing_subscriber::fmt::layer().with_target(true);
        (None, Some(layer))
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialised(e.to_string()))?;

    Ok(TelemetryGuard { filter, config })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn directives_include_module_levels() {
        let config = TelemetryConfig {
            log_level: Level::INFO,
            module_levels: vec![("scylla".into(), Level::WARN), ("logbook_store".into(), Level::DEBUG)],
            json: false,
        };
        assert_eq!(config.directives(), "info,scylla=warn,logbook_store=debug");
    }

    #[test]
    fn from_levels_parses_settings_text() {
        let mut modules = BTreeMap::new();
        modules.insert("scylla".to_string(), "warn".to_string());
        let config = TelemetryConfig::from_levels("debug", &modules, true).unwrap();
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.module_levels, vec![("scylla".to_string(), Level::WARN)]);
        assert!(config.json);
    }

    #[test]
    fn from_levels_rejects_unknown_level() {
        let modules: BTreeMap<String, String> = BTreeMap::new();
        let err = TelemetryConfig::from_levels("chatty", &modules, false).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownLevel(l) if l == "chatty"));
    }

    #[test]
    fn init_twice_fails_and_reload_works() {
        let mut guard = init_telemetry(TelemetryConfig::default()).unwrap();
        guard.set_level(Level::DEBUG).unwrap();
        guard.set_module_level("scylla", Level::ERROR).unwrap();
        guard.set_module_level("scylla", Level::WARN).unwrap();
        assert_eq!(guard.config().log_level, Level::DEBUG);
        assert_eq!(guard.config().module_levels, vec![("scylla".to_string(), Level::WARN)]);

        let second = init_telemetry(TelemetryConfig::default());
        assert!(matches!(second, Err(TelemetryError::AlreadyInitialised(_))));
    }
}
