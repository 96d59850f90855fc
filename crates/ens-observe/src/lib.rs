//! Logging setup for the ensemble tools.
//!
//! One call to [`logger_init`] installs a global `tracing` subscriber writing
//! text, JSON or journald records, optionally mirrored as text into a log file
//! that rotates daily.

mod config;
pub use config::LoggerConfig;

mod error;
pub use error::LoggerError;

mod format;
pub use format::LoggerFormat;

mod init;
pub use init::{LoggerGuard, build_subscriber, logger_init};
