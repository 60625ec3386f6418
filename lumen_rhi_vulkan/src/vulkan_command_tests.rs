//! Unit tests for vulkan_command.rs

use super::*;

// ============================================================================
// BARRIER TESTS
// ============================================================================

#[test]
fn test_last_use_of_undefined_image_waits_on_nothing() {
    let (stage, access) = last_use(vk::ImageLayout::UNDEFINED);
    assert_eq!(stage, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert!(access.is_empty());

    let (stage, access) = last_use(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(stage, vk::PipelineStageFlags::ALL_COMMANDS);
    assert_eq!(access, vk::AccessFlags::MEMORY_WRITE);
}

#[test]
fn test_shader_read_covers_both_stages() {
    assert!(SHADER_READ.0.contains(vk::PipelineStageFlags::VERTEX_SHADER));
    assert!(SHADER_READ.0.contains(vk::PipelineStageFlags::FRAGMENT_SHADER));
    assert_eq!(SHADER_READ.1, vk::AccessFlags::SHADER_READ);
}
