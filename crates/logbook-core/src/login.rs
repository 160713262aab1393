use serde::{Deserialize, Serialize};

use crate::errors::CoreError;
use crate::ids::TimeUuid;

/// One recorded login: who, when, and into which area.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLogin")]
pub struct Login {
    user: String,
    ts: TimeUuid,
    area: String,
}

#[derive(Deserialize)]
struct RawLogin {
    user: String,
    ts: TimeUuid,
    area: String,
}

impl TryFrom<RawLogin> for Login {
    type Error = CoreError;

    fn try_from(raw: RawLogin) -> Result<Self, Self::Error> {
        Self::with_ts(raw.user, raw.ts, raw.area)
    }
}

impl Login {
    /// A login stamped with a freshly generated identifier.
    pub fn new(user: impl Into<String>, area: impl Into<String>) -> Result<Self, CoreError> {
        Self::with_ts(user, TimeUuid::now(), area)
    }

    pub fn with_ts(
        user: impl Into<String>,
        ts: TimeUuid,
        area: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let user = user.into();
        let area = area.into();
        if user.is_empty() {
            return Err(CoreError::EmptyField("user"));
        }
        if area.is_empty() {
            return Err(CoreError::EmptyField("area"));
        }
        Ok(Self { user, ts, area })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn ts(&self) -> TimeUuid {
        self.ts
    }

    pub fn area(&self) -> &str {
        &self.area
    }
}
