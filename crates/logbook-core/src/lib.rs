//! # logbook-core
//!
//! Domain types shared by the login event log: time-ordered identifiers,
//! login events, the calendar day used as the counter key, and the clock
//! that decides what "today" is.

pub mod day;
pub mod errors;
pub mod ids;
pub mod login;

pub use day::{Clock, FixedClock, LoginDay, SystemClock};
pub use errors::CoreError;
pub use ids::TimeUuid;
pub use login::Login;

/// Retention window of a stored login row, in seconds (30 days).
pub const LOGIN_TTL_SECS: i32 = 2_592_000;
