//! Unit tests for vulkan_shader.rs

use super::*;

// ============================================================================
// REFLECTION TESTS
// ============================================================================

#[test]
fn test_reflected_kind_accepts_matching_layout_types() {
    let uniform = BindingType::UniformBuffer { has_dynamic_offset: true, min_binding_size: None };
    let storage = BindingType::StorageBuffer { read_only: false, has_dynamic_offset: false };
    assert!(ReflectedKind::UniformBuffer.accepts(&uniform));
    assert!(!ReflectedKind::UniformBuffer.accepts(&storage));
    assert!(ReflectedKind::StorageBuffer.accepts(&storage));
    assert!(ReflectedKind::CombinedImageSampler.accepts(&BindingType::CombinedImageSampler));
    assert!(!ReflectedKind::CombinedImageSampler.accepts(&uniform));
}
