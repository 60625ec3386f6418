//! Unit tests for gl_shader.rs

use super::*;

// ============================================================================
// SHADER TYPE TESTS
// ============================================================================

#[test]
fn test_shader_type() {
    assert_eq!(shader_type(ShaderStage::Vertex), glow::VERTEX_SHADER);
    assert_eq!(shader_type(ShaderStage::Fragment), glow::FRAGMENT_SHADER);
}
