/// Device configuration and validation statistics

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Which backend debug messages reach the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything, including info and verbose messages
    All,
}

/// Configuration for `Device` creation
#[derive(Debug, Clone)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Enable validation layers / KHR_debug output
    pub enable_validation: bool,
    /// Debug message filter (only used with validation)
    pub debug_severity: DebugSeverity,
    /// Prefer Mailbox presentation over Fifo
    pub prefer_low_latency: bool,
    /// Maximum time a fence wait may block
    pub fence_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Lumen Application".to_string(),
            app_version: (1, 0, 0),
            enable_validation: cfg!(debug_assertions),
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            prefer_low_latency: true,
            fence_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// `fence_timeout` in nanoseconds, saturated to `u64::MAX`
    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Severity of a backend debug message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationLevel {
    Error,
    Warning,
    Info,
    Verbose,
}

impl DebugSeverity {
    pub fn accepts(&self, level: ValidationLevel) -> bool {
        match self {
            DebugSeverity::ErrorsOnly => level == ValidationLevel::Error,
            DebugSeverity::ErrorsAndWarnings => {
                matches!(level, ValidationLevel::Error | ValidationLevel::Warning)
            }
            DebugSeverity::All => true,
        }
    }
}

/// Counts of debug messages received since the last reset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Thread-safe validation statistics tracker
struct ValidationStatsTracker {
    errors: AtomicU32,
    warnings: AtomicU32,
    info: AtomicU32,
    verbose: AtomicU32,
}

impl ValidationStatsTracker {
    const fn new() -> Self {
        Self {
            errors: AtomicU32::new(0),
            warnings: AtomicU32::new(0),
            info: AtomicU32::new(0),
            verbose: AtomicU32::new(0),
        }
    }

    fn counter(&self, level: ValidationLevel) -> &AtomicU32 {
        match level {
            ValidationLevel::Error => &self.errors,
            ValidationLevel::Warning => &self.warnings,
            ValidationLevel::Info => &self.info,
            ValidationLevel::Verbose => &self.verbose,
        }
    }

    fn snapshot(&self) -> ValidationStats {
        ValidationStats {
            errors: self.errors.load(Ordering::Relaxed),
            warnings: self.warnings.load(Ordering::Relaxed),
            info: self.info.load(Ordering::Relaxed),
            verbose: self.verbose.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        self.errors.store(0, Ordering::Relaxed);
        self.warnings.store(0, Ordering::Relaxed);
        self.info.store(0, Ordering::Relaxed);
        self.verbose.store(0, Ordering::Relaxed);
    }
}

/// Global validation statistics, fed by both backends' debug callbacks
static VALIDATION_STATS: ValidationStatsTracker = ValidationStatsTracker::new();

/// Count one debug message
pub fn record_validation_message(level: ValidationLevel) {
    VALIDATION_STATS.counter(level).fetch_add(1, Ordering::Relaxed);
}

pub fn validation_stats() -> ValidationStats {
    VALIDATION_STATS.snapshot()
}

pub fn reset_validation_stats() {
    VALIDATION_STATS.reset();
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
