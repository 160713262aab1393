use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::CoreError;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// An ISO calendar date (`YYYY-MM-DD`), the day component of a counter key.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LoginDay(NaiveDate);

impl LoginDay {
    /// Parse canonical `YYYY-MM-DD` text. Unpadded or out-of-range parts are rejected.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let date = NaiveDate::parse_from_str(s, DAY_FORMAT)
            .map_err(|_| CoreError::InvalidDay(s.to_string()))?;
        let day = Self(date);
        if day.to_string() != s {
            return Err(CoreError::InvalidDay(s.to_string()));
        }
        Ok(day)
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for LoginDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}

impl FromStr for LoginDay {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for LoginDay {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<LoginDay> for String {
    fn from(day: LoginDay) -> Self {
        day.to_string()
    }
}

/// Source of the current calendar day for counter keys.
pub trait Clock: Send + Sync {
    fn today(&self) -> LoginDay;
}

/// The local calendar date of the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> LoginDay {
        LoginDay::from_date(Local::now().date_naive())
    }
}

/// A clock pinned to one day.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub LoginDay);

impl Clock for FixedClock {
    fn today(&self) -> LoginDay {
        self.0
    }
}
