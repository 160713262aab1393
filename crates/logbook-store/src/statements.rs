//! The statement templates the access layer issues.
//!
//! The two write templates exist twice: as hand-written text and as the
//! output of [`crate::query`]. Both must render to statements with the same
//! semantics.

use logbook_core::LOGIN_TTL_SECS;

use crate::query::{bind_marker, eq, gte, insert_into, lt, select, update};
use crate::schema::{LOGIN, LOGIN_STATS};

/// Binds: user, ts, area.
pub const INSERT_LOGIN: &str =
    "INSERT INTO login (user, ts, area) VALUES (?, ?, ?) USING TTL 2592000";

/// Binds: user, date.
pub const INCREMENT_COUNTER: &str =
    "UPDATE loginStats SET count = count + 1 WHERE user = ? AND date = ?";

/// Binds: user, ts, area.
pub fn insert_login() -> String {
    insert_into(LOGIN.name)
        .value("user", bind_marker())
        .value("ts", bind_marker())
        .value("area", bind_marker())
        .using_ttl(LOGIN_TTL_SECS)
        .to_string()
}

/// Binds: user, date.
pub fn increment_counter() -> String {
    update(LOGIN_STATS.name)
        .increment("count", 1i64)
        .where_(eq("user", bind_marker()))
        .and(eq("date", bind_marker()))
        .to_string()
}

/// Binds: delta (counter), user, date.
pub fn increment_counter_by() -> String {
    update(LOGIN_STATS.name)
        .increment("count", bind_marker())
        .where_(eq("user", bind_marker()))
        .and(eq("date", bind_marker()))
        .to_string()
}

/// Binds: user. Yields (ts, area), newest first.
pub fn select_logins_by_user() -> String {
    select(&["ts", "area"])
        .from(LOGIN.name)
        .where_(eq("user", bind_marker()))
        .to_string()
}

/// Binds: user, date. Yields (count).
pub fn select_counter() -> String {
    select(&["count"])
        .from(LOGIN_STATS.name)
        .where_(eq("user", bind_marker()))
        .and(eq("date", bind_marker()))
        .to_string()
}

/// Binds: user, start (inclusive), end (exclusive). Yields (ts).
pub fn select_timestamps_in_range() -> String {
    select(&["ts"])
        .from(LOGIN.name)
        .where_(eq("user", bind_marker()))
        .and(gte("ts", bind_marker()))
        .and(lt("ts", bind_marker()))
        .to_string()
}
