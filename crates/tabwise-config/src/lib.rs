//! Shared configuration for both sides of the extension runtime.
//!
//! The popup-side caller and the content-side endpoint agree on a handful of
//! tunables: how long a call may await its reply, where the answer API
//! lives, where persistent state is kept, and how telemetry is formatted.
//! Defaults work out of the box; every field can be overridden through
//! `TABWISE_*` environment variables.

mod logging;
mod settings;

pub use logging::{LogFormat, LogFormatParseError};
pub use settings::{ApiSettings, Config, ConfigError, StorageSettings};
