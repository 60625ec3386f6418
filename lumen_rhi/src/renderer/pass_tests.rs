//! Unit tests for pass.rs

use crate::error::Error;
use crate::renderer::{common_attachment_extent, Color, Extent2D, LoadOp, Operations, StoreOp};

#[test]
fn test_operations_helpers() {
    let ops = Operations::clear(Color::BLACK);
    assert_eq!(ops.load, LoadOp::Clear(Color::BLACK));
    assert_eq!(ops.store, StoreOp::Store);
    assert!(!ops.is_load());

    let ops: Operations<f32> = Operations::load();
    assert!(ops.is_load());
}

#[test]
fn test_color_to_f32() {
    assert_eq!(Color::new(1.0, 0.5, 0.25, 1.0).to_f32_array(), [1.0, 0.5, 0.25, 1.0]);
}

#[test]
fn test_common_extent_matches() {
    let extent = Extent2D::new(800, 600);
    assert_eq!(common_attachment_extent([extent, extent]).unwrap(), extent);
}

#[test]
fn test_common_extent_mismatch_rejected() {
    let result = common_attachment_extent([Extent2D::new(800, 600), Extent2D::new(640, 480)]);
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_common_extent_empty_rejected() {
    assert!(common_attachment_extent(std::iter::empty()).is_err());
}
