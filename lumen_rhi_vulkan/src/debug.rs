/// Vulkan Debug Messenger - Forwards validation layer messages to the logger
///
/// Messages that pass the configured severity filter are logged under
/// `lumen::vulkan::validation` and counted in the global validation statistics.
/// Identical messages are grouped: repeats carry a `[xN]` suffix.

use ash::vk;
use lumen_rhi::lumen::{record_validation_message, DebugSeverity, ValidationLevel};
use lumen_rhi::{rhi_debug, rhi_error, rhi_info, rhi_warn};
use rustc_hash::FxHashMap;
use std::ffi::CStr;
use std::sync::Mutex;

const SOURCE: &str = "lumen::vulkan::validation";

/// Severity filter shared with the callback
static DEBUG_SEVERITY: Mutex<Option<DebugSeverity>> = Mutex::new(None);

/// Global message tracker for grouping identical messages
static MESSAGE_TRACKER: Mutex<Option<FxHashMap<String, u32>>> = Mutex::new(None);

/// Install the severity filter used by `vulkan_debug_callback`
pub(crate) fn init_debug_severity(severity: DebugSeverity) {
    if let Ok(mut guard) = DEBUG_SEVERITY.lock() {
        *guard = Some(severity);
    }
    if let Ok(mut tracker) = MESSAGE_TRACKER.lock() {
        *tracker = Some(FxHashMap::default());
    }
}

/// Severity bits the messenger is created with
pub(crate) fn messenger_severity_flags(severity: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    match severity {
        DebugSeverity::ErrorsOnly => vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        DebugSeverity::ErrorsAndWarnings => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        }
        DebugSeverity::All => {
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        }
    }
}

pub(crate) fn validation_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> ValidationLevel {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        ValidationLevel::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        ValidationLevel::Warning
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        ValidationLevel::Info
    } else {
        ValidationLevel::Verbose
    }
}

fn message_type_name(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "Validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "Performance"
    } else {
        "General"
    }
}

fn track_message(message: &str) -> u32 {
    let Ok(mut guard) = MESSAGE_TRACKER.lock() else {
        return 1;
    };
    let tracker = guard.get_or_insert_with(FxHashMap::default);
    let count = tracker.entry(message.to_string()).or_insert(0);
    *count += 1;
    *count
}

/// Vulkan debug messenger callback
///
/// Called by the validation layers when they detect issues.
pub(crate) unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }
    let callback_data = *p_callback_data;
    let message_id_name = if callback_data.p_message_id_name.is_null() {
        "Unknown"
    } else {
        CStr::from_ptr(callback_data.p_message_id_name)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };
    let message = if callback_data.p_message.is_null() {
        "No message"
    } else {
        CStr::from_ptr(callback_data.p_message)
            .to_str()
            .unwrap_or("Invalid UTF-8")
    };

    let severity = match DEBUG_SEVERITY.lock() {
        Ok(guard) => match *guard {
            Some(severity) => severity,
            None => return vk::FALSE,
        },
        Err(_) => return vk::FALSE,
    };

    let level = validation_level(message_severity);
    if !severity.accepts(level) {
        return vk::FALSE;
    }
    record_validation_message(level);

    let occurrences = track_message(message);
    let repeat = if occurrences > 1 {
        format!(" [x{}]", occurrences)
    } else {
        String::new()
    };
    let type_name = message_type_name(message_type);

    match level {
        ValidationLevel::Error => {
            rhi_error!(SOURCE, "[{}] {}{}: {}", type_name, message_id_name, repeat, message)
        }
        ValidationLevel::Warning => {
            rhi_warn!(SOURCE, "[{}] {}{}: {}", type_name, message_id_name, repeat, message)
        }
        ValidationLevel::Info => {
            rhi_info!(SOURCE, "[{}] {}{}: {}", type_name, message_id_name, repeat, message)
        }
        ValidationLevel::Verbose => {
            rhi_debug!(SOURCE, "[{}] {}{}: {}", type_name, message_id_name, repeat, message)
        }
    }

    vk::FALSE
}

#[cfg(test)]
#[path = "debug_tests.rs"]
mod tests;
