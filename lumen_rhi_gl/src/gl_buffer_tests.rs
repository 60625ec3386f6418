//! Unit tests for gl_buffer.rs

use super::*;

// ============================================================================
// USAGE HINT TESTS
// ============================================================================

fn desc(usage: BufferUsage, mapped_at_creation: bool) -> BufferDesc {
    BufferDesc { label: None, size: 16, usage, mapped_at_creation }
}

#[test]
fn test_usage_hint() {
    assert_eq!(usage_hint(&desc(BufferUsage::VERTEX, false)), glow::STATIC_DRAW);
    assert_eq!(usage_hint(&desc(BufferUsage::VERTEX, true)), glow::DYNAMIC_DRAW);
    assert_eq!(usage_hint(&desc(BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC, false)), glow::DYNAMIC_DRAW);
    assert_eq!(usage_hint(&desc(BufferUsage::MAP_READ | BufferUsage::COPY_DST, false)), glow::STREAM_READ);
}
