use std::{io, path::Path};

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::{LoggerConfig, LoggerError, LoggerFormat};

#[cfg(all(target_os = "linux", feature = "journald"))]
type JournaldLayer = tracing_journald::Layer;
#[cfg(not(all(target_os = "linux", feature = "journald")))]
type JournaldLayer = tracing_subscriber::layer::Identity;

/// Keeps the log file writer running; pending records are flushed on drop.
#[must_use = "dropping the guard stops the log file writer"]
pub struct LoggerGuard(Option<WorkerGuard>);

/// Install the global subscriber described by `cfg`.
pub fn logger_init(cfg: &LoggerConfig) -> Result<LoggerGuard, LoggerError> {
    let (subscriber, guard) = build_subscriber(cfg)?;
    subscriber.try_init().map_err(as_error)?;
    Ok(guard)
}

/// Subscriber for `cfg` without installing it.
pub fn build_subscriber(
    cfg: &LoggerConfig,
) -> Result<(impl Subscriber + Send + Sync + 'static, LoggerGuard), LoggerError> {
    let filter = mk_filter(&cfg.level)?;

    let (text, json) = match cfg.format {
        LoggerFormat::Text => (
            Some(
                fmt::layer()
                    .with_ansi(cfg.use_color)
                    .with_target(cfg.with_targets)
                    .with_timer(mk_timer()),
            ),
            None,
        ),
        LoggerFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(cfg.with_targets)
                    .with_timer(mk_timer()),
            ),
        ),
        LoggerFormat::Journald => (None, None),
    };

    let journald = match cfg.format {
        LoggerFormat::Journald => Some(mk_journald()?),
        _ => None,
    };

    let (file, guard) = match &cfg.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(rolling_file(path)?);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(cfg.with_targets)
                .with_timer(mk_timer())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(journald)
        .with(file);
    Ok((subscriber, LoggerGuard(guard)))
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

/// Appender for `path` rotated at midnight UTC; the active file carries the date suffix.
fn rolling_file(path: &Path) -> Result<RollingFileAppender, LoggerError> {
    let log_file_error = |source| LoggerError::LogFile {
        path: path.to_path_buf(),
        source,
    };
    let prefix = path.file_name().ok_or_else(|| {
        log_file_error(io::Error::new(io::ErrorKind::InvalidInput, "no file name"))
    })?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir).map_err(log_file_error)?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix.to_string_lossy())
        .build(dir)
        .map_err(|e| log_file_error(io::Error::other(e)))
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") || s.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald() -> Result<JournaldLayer, LoggerError> {
    tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald() -> Result<JournaldLayer, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
