/// KHR_debug output - Forwards driver messages to the logger
///
/// Messages that pass the configured severity filter are logged under
/// `lumen::gl::debug` and counted in the global validation statistics.

use glow::HasContext;
use lumen_rhi::lumen::{record_validation_message, DebugSeverity, ValidationLevel};
use lumen_rhi::{rhi_debug, rhi_error, rhi_info, rhi_warn};
use std::sync::Mutex;

const SOURCE: &str = "lumen::gl::debug";

static DEBUG_SEVERITY: Mutex<Option<DebugSeverity>> = Mutex::new(None);

pub(crate) fn validation_level(gl_type: u32, severity: u32) -> ValidationLevel {
    if gl_type == glow::DEBUG_TYPE_ERROR {
        return ValidationLevel::Error;
    }
    match severity {
        glow::DEBUG_SEVERITY_HIGH => ValidationLevel::Error,
        glow::DEBUG_SEVERITY_MEDIUM => ValidationLevel::Warning,
        glow::DEBUG_SEVERITY_LOW => ValidationLevel::Info,
        _ => ValidationLevel::Verbose,
    }
}

fn type_name(gl_type: u32) -> &'static str {
    match gl_type {
        glow::DEBUG_TYPE_ERROR => "Error",
        glow::DEBUG_TYPE_DEPRECATED_BEHAVIOR => "Deprecated",
        glow::DEBUG_TYPE_UNDEFINED_BEHAVIOR => "Undefined",
        glow::DEBUG_TYPE_PORTABILITY => "Portability",
        glow::DEBUG_TYPE_PERFORMANCE => "Performance",
        _ => "General",
    }
}

fn gl_debug_callback(_source: u32, gl_type: u32, id: u32, severity: u32, message: &str) {
    let filter = match DEBUG_SEVERITY.lock() {
        Ok(guard) => match *guard {
            Some(filter) => filter,
            None => return,
        },
        Err(_) => return,
    };
    let level = validation_level(gl_type, severity);
    if !filter.accepts(level) {
        return;
    }
    record_validation_message(level);

    let kind = type_name(gl_type);
    match level {
        ValidationLevel::Error => rhi_error!(SOURCE, "[{}] #{}: {}", kind, id, message),
        ValidationLevel::Warning => rhi_warn!(SOURCE, "[{}] #{}: {}", kind, id, message),
        ValidationLevel::Info => rhi_info!(SOURCE, "[{}] #{}: {}", kind, id, message),
        ValidationLevel::Verbose => rhi_debug!(SOURCE, "[{}] #{}: {}", kind, id, message),
    }
}

/// Install the debug callback when the context supports it
///
/// Returns false (and installs nothing) without `KHR_debug` / GL 4.3.
pub(crate) fn install(gl: &mut glow::Context, severity: DebugSeverity) -> bool {
    if !gl.supports_debug() {
        return false;
    }
    if let Ok(mut guard) = DEBUG_SEVERITY.lock() {
        *guard = Some(severity);
    }
    unsafe {
        gl.enable(glow::DEBUG_OUTPUT);
        gl.enable(glow::DEBUG_OUTPUT_SYNCHRONOUS);
        gl.debug_message_callback(gl_debug_callback);
    }
    true
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
