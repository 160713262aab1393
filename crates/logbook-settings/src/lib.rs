//! # logbook-settings
//!
//! Layered configuration for the login event log.
//!
//! Settings are resolved from three layers (in priority order):
//! 1. **Compiled defaults**: [`LogbookSettings::default()`]
//! 2. **Settings file**: `~/.logbook/settings.json`, or the file named by
//!    `LOGBOOK_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `LOGBOOK_*` overrides (highest priority)
//!
//! Unlike a best-effort loader, every layer is strict: an unreadable file,
//! malformed JSON, or a bad override aborts loading. Callers treat that as
//! fatal at startup.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_file,
    load_settings_from_path, settings_path, validate,
};
pub use types::{ClusterSettings, LogbookSettings, LoggingSettings};
