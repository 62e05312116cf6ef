//! Logging bridges.
//!
//! Library code logs through the `log` facade. Hosts pick one of two sinks:
//! a foreign [`Logger`] installed with [`set_logger`], or, for development
//! hosts, a `tracing-subscriber` formatter installed with [`init_env_logging`].
//! Both claim the global `log` logger, so only the first call wins.

use std::sync::{Arc, OnceLock};

use tracing_subscriber::{util::SubscriberInitExt, EnvFilter};

use crate::error::DelegationKitError;

/// Trait representing a logger that can log messages at various levels.
///
/// This trait should be implemented by any logger that wants to receive log messages.
/// It is exported via `UniFFI` for use in foreign languages.
///
/// # Examples
///
/// Implementing the `Logger` trait:
///
/// ```rust
/// use delegationkit_core::logger::{Logger, LogLevel};
///
/// struct MyLogger;
///
/// impl Logger for MyLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
///
/// ## Swift
///
/// ```swift
/// class DelegationKitLoggerBridge: DelegationKit.Logger {
///     static let shared = DelegationKitLoggerBridge()
///
///     func log(level: DelegationKit.LogLevel, message: String) {
///         Log.log(level.toCoreLevel(), message)
///     }
/// }
///
/// public func setupDelegationKitLogger() {
///     DelegationKit.setLogger(logger: DelegationKitLoggerBridge.shared)
/// }
/// ```
#[cfg_attr(feature = "ffi", uniffi::export(with_foreign))]
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `message` - The log message to be recorded.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum LogLevel {
    /// Designates very low priority, often extremely detailed messages.
    Trace,
    /// Designates lower priority debugging information.
    Debug,
    /// Designates informational messages that highlight the progress of the application.
    Info,
    /// Designates potentially harmful situations.
    Warn,
    /// Designates error events that might still allow the application to continue running.
    Error,
}

/// Forwards `log` records to the host-provided [`Logger`].
struct ForeignLogger;

impl log::Log for ForeignLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if !should_forward(record.level(), record.module_path()) {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

/// Debug and trace records are only forwarded when they come from this crate.
fn should_forward(level: log::Level, module_path: Option<&str>) -> bool {
    let is_from_delegationkit =
        module_path.is_some_and(|module_path| module_path.starts_with("delegationkit"));
    let is_debug_or_trace = level == log::Level::Debug || level == log::Level::Trace;
    !is_debug_or_trace || is_from_delegationkit
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Call once, before any logging occurs. Later calls keep the first logger.
#[cfg_attr(feature = "ffi", uniffi::export)]
pub fn set_logger(logger: Arc<dyn Logger>) {
    if LOGGER_INSTANCE.set(logger).is_err() {
        println!("Logger already set");
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
    }
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForeignLogger = ForeignLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Installs a formatted `tracing` subscriber filtered by `filter` (an
/// `EnvFilter` directive such as `"delegationkit_core=debug"`) and routes
/// `log` records into it.
///
/// # Errors
///
/// Returns [`DelegationKitError::InvalidInput`] for an unparsable filter, or if
/// a global logger or subscriber is already installed.
pub fn init_env_logging(filter: &str) -> Result<(), DelegationKitError> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| DelegationKitError::invalid_input("filter", e.to_string()))?;

    tracing_log::LogTracer::init()
        .map_err(|e| DelegationKitError::invalid_input("logger", e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .finish()
        .try_init()
        .map_err(|e| DelegationKitError::invalid_input("subscriber", e.to_string()))
}
