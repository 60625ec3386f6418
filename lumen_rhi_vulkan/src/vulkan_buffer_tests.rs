//! Unit tests for vulkan_buffer.rs

use super::*;

// ============================================================================
// MEMORY LOCATION TESTS
// ============================================================================

fn desc(usage: BufferUsage, mapped_at_creation: bool) -> BufferDesc {
    BufferDesc { label: None, size: 64, usage, mapped_at_creation }
}

#[test]
fn test_memory_location_selection() {
    assert_eq!(memory_location(&desc(BufferUsage::VERTEX, false)), MemoryLocation::GpuOnly);
    assert_eq!(memory_location(&desc(BufferUsage::VERTEX, true)), MemoryLocation::CpuToGpu);
    assert_eq!(
        memory_location(&desc(BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC, false)),
        MemoryLocation::CpuToGpu
    );
    assert_eq!(
        memory_location(&desc(BufferUsage::MAP_READ | BufferUsage::COPY_DST, false)),
        MemoryLocation::GpuToCpu
    );
}
