//! Logging for the Lumen RHI
//!
//! Every crate in the workspace logs through one process-wide sink. The
//! default sink prints colored lines to stdout; `set_logger` swaps in any
//! `Logger`. Error entries carry the file and line they were raised at.

use chrono::{DateTime, Local};
use colored::*;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;

static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity never reach the sink
static MIN_SEVERITY: AtomicU8 = AtomicU8::new(LogSeverity::Trace as u8);

/// Destination for log entries
///
/// ```no_run
/// use lumen_rhi::lumen::log::{Logger, LogEntry};
///
/// struct FileLogger {
///     file: std::fs::File,
/// }
///
/// impl Logger for FileLogger {
///     fn log(&self, entry: &LogEntry) {
///         // Write to file...
///     }
/// }
/// ```
pub trait Logger: Send + Sync {
    fn log(&self, entry: &LogEntry);
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub severity: LogSeverity,
    pub timestamp: SystemTime,
    /// Emitting subsystem, e.g. "lumen::vulkan"
    pub source: String,
    pub message: String,
    /// Set for entries raised through `rhi_error!`, `rhi_err!` and `rhi_bail!`
    pub file: Option<&'static str>,
    pub line: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogSeverity {
    fn label(self) -> ColoredString {
        match self {
            LogSeverity::Trace => "TRACE".bright_black(),
            LogSeverity::Debug => "DEBUG".cyan(),
            LogSeverity::Info => "INFO ".green(),
            LogSeverity::Warn => "WARN ".yellow(),
            LogSeverity::Error => "ERROR".red().bold(),
        }
    }
}

/// Console logger: `[time] [SEVERITY] [source] message (file:line)`
pub struct DefaultLogger;

impl Logger for DefaultLogger {
    fn log(&self, entry: &LogEntry) {
        let time: DateTime<Local> = entry.timestamp.into();
        let location = match (entry.file, entry.line) {
            (Some(file), Some(line)) => format!(" ({}:{})", file, line),
            _ => String::new(),
        };
        println!(
            "[{}] [{}] [{}] {}{}",
            time.format("%Y-%m-%d %H:%M:%S%.3f"),
            entry.severity.label(),
            entry.source.bright_blue(),
            entry.message,
            location
        );
    }
}

// ===== SINK =====

fn sink() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

/// Replace the process-wide logger
pub fn set_logger<L: Logger + 'static>(logger: L) {
    if let Ok(mut lock) = sink().write() {
        *lock = Box::new(logger);
    }
}

/// Back to `DefaultLogger`
pub fn reset_logger() {
    set_logger(DefaultLogger);
}

pub fn set_min_severity(severity: LogSeverity) {
    MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
}

fn emit(severity: LogSeverity, source: &str, message: String, location: Option<(&'static str, u32)>) {
    if (severity as u8) < MIN_SEVERITY.load(Ordering::Relaxed) {
        return;
    }
    if let Ok(lock) = sink().read() {
        lock.log(&LogEntry {
            severity,
            timestamp: SystemTime::now(),
            source: source.to_string(),
            message,
            file: location.map(|(file, _)| file),
            line: location.map(|(_, line)| line),
        });
    }
}

/// Entry point of the `rhi_trace!` .. `rhi_warn!` macros
pub fn log(severity: LogSeverity, source: &str, message: String) {
    emit(severity, source, message, None);
}

/// Entry point of the error macros, with the raising location
pub fn log_detailed(severity: LogSeverity, source: &str, message: String, file: &'static str, line: u32) {
    emit(severity, source, message, Some((file, line)));
}

// ===== LOGGING MACROS =====

/// Log at an explicit `LogSeverity` variant
///
/// ```no_run
/// lumen_rhi::rhi_log!(Info, "lumen::device", "Swapchain has {} images", 3);
/// ```
#[macro_export]
macro_rules! rhi_log {
    ($severity:ident, $source:expr, $($arg:tt)*) => {
        $crate::log::log($crate::log::LogSeverity::$severity, $source, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! rhi_trace {
    ($source:expr, $($arg:tt)*) => { $crate::rhi_log!(Trace, $source, $($arg)*) };
}

#[macro_export]
macro_rules! rhi_debug {
    ($source:expr, $($arg:tt)*) => { $crate::rhi_log!(Debug, $source, $($arg)*) };
}

#[macro_export]
macro_rules! rhi_info {
    ($source:expr, $($arg:tt)*) => { $crate::rhi_log!(Info, $source, $($arg)*) };
}

#[macro_export]
macro_rules! rhi_warn {
    ($source:expr, $($arg:tt)*) => { $crate::rhi_log!(Warn, $source, $($arg)*) };
}

/// Error entry tagged with the calling file and line
#[macro_export]
macro_rules! rhi_error {
    ($source:expr, $($arg:tt)*) => {
        $crate::log::log_detailed($crate::log::LogSeverity::Error, $source, format!($($arg)*), file!(), line!())
    };
}

/// Log an error entry and build `Error::$kind` from the same message
///
/// ```no_run
/// use lumen_rhi::lumen::Error;
///
/// let err: Error = lumen_rhi::rhi_err!(CreationFailed, "lumen::vulkan", "Bad size {}", 0);
/// ```
#[macro_export]
macro_rules! rhi_err {
    ($kind:ident, $source:expr, $($arg:tt)*) => {{
        let message = format!($($arg)*);
        $crate::rhi_error!($source, "{}", message);
        $crate::lumen::Error::$kind(message)
    }};
}

/// `rhi_err!` and return it from the enclosing function
#[macro_export]
macro_rules! rhi_bail {
    ($kind:ident, $source:expr, $($arg:tt)*) => {
        return Err($crate::rhi_err!($kind, $source, $($arg)*))
    };
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
