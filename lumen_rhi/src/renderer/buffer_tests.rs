//! Unit tests for buffer.rs

use crate::error::Error;
use crate::renderer::{check_buffer_range, BufferDesc, BufferUsage};

fn desc(size: u64, usage: BufferUsage, mapped_at_creation: bool) -> BufferDesc {
    BufferDesc {
        label: None,
        size,
        usage,
        mapped_at_creation,
    }
}

// ============================================================================
// VALIDATION TESTS
// ============================================================================

#[test]
fn test_valid_vertex_buffer() {
    assert!(desc(80, BufferUsage::VERTEX, true).validate().is_ok());
}

#[test]
fn test_zero_size_rejected() {
    let result = desc(0, BufferUsage::VERTEX, false).validate();
    assert!(matches!(result, Err(Error::CreationFailed(_))));
}

#[test]
fn test_empty_usage_rejected() {
    let result = desc(16, BufferUsage::empty(), false).validate();
    assert!(matches!(result, Err(Error::CreationFailed(_))));
}

#[test]
fn test_map_read_and_write_rejected() {
    let usage = BufferUsage::MAP_READ | BufferUsage::MAP_WRITE;
    assert!(desc(16, usage, false).validate().is_err());
}

#[test]
fn test_default_desc_is_invalid() {
    assert!(BufferDesc::default().validate().is_err());
}

// ============================================================================
// HOST VISIBILITY TESTS
// ============================================================================

#[test]
fn test_host_visibility() {
    assert!(desc(4, BufferUsage::INDEX, true).is_host_visible());
    assert!(desc(4, BufferUsage::MAP_READ | BufferUsage::COPY_DST, false).is_host_visible());
    assert!(desc(4, BufferUsage::MAP_WRITE | BufferUsage::COPY_SRC, false).is_host_visible());
    assert!(!desc(4, BufferUsage::VERTEX | BufferUsage::COPY_DST, false).is_host_visible());
}

// ============================================================================
// RANGE TESTS
// ============================================================================

#[test]
fn test_range_inside_buffer() {
    assert!(check_buffer_range(64, 0, 64).is_ok());
    assert!(check_buffer_range(64, 60, 4).is_ok());
    assert!(check_buffer_range(64, 64, 0).is_ok());
}

#[test]
fn test_range_outside_buffer() {
    assert!(matches!(check_buffer_range(64, 60, 8), Err(Error::InvalidUsage(_))));
    assert!(check_buffer_range(64, u64::MAX, 2).is_err());
}
