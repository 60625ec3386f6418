//! Unit tests for the Vulkan debug messenger helpers

use super::*;

// ============================================================================
// MESSAGE FILTER TESTS
// ============================================================================

#[test]
fn test_severity_flags_match_filter() {
    assert_eq!(
        messenger_severity_flags(DebugSeverity::ErrorsOnly),
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
    );
    let all = messenger_severity_flags(DebugSeverity::All);
    assert!(all.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
}

#[test]
fn test_validation_level_picks_highest_bit() {
    assert_eq!(
        validation_level(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        ),
        ValidationLevel::Error
    );
    assert_eq!(
        validation_level(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE),
        ValidationLevel::Verbose
    );
}

#[test]
fn test_message_type_names() {
    assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE), "Performance");
    assert_eq!(message_type_name(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "General");
}
