//! Unit tests for command.rs

use crate::error::Error;
use crate::renderer::{
    check_texture_region, Extent3D, ImageDataLayout, Origin3D, Rect2D, TextureDesc,
    TextureDimension, TextureFormat, TextureUsage, Viewport,
};

// ============================================================================
// BUFFER LAYOUT TESTS
// ============================================================================

#[test]
fn test_tight_rgba8_layout() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 16, rows_per_image: None };
    let bytes = layout
        .required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(4, 4, 1))
        .unwrap();
    assert_eq!(bytes, 64);
    assert_eq!(layout.row_length_texels(TextureFormat::Rgba8Unorm), 4);
}

#[test]
fn test_padded_rows_count_only_last_row_tight() {
    // 256-byte rows, 2 rows of 4 texels: the last row needs only 16 bytes
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 256, rows_per_image: None };
    let bytes = layout
        .required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(4, 2, 1))
        .unwrap();
    assert_eq!(bytes, 256 + 16);
}

#[test]
fn test_single_texel_layout() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 4, rows_per_image: Some(1) };
    let bytes = layout
        .required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(1, 1, 1))
        .unwrap();
    assert_eq!(bytes, 4);
}

#[test]
fn test_unaligned_bytes_per_row_rejected() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 18, rows_per_image: None };
    let result = layout.required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(4, 4, 1));
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

#[test]
fn test_short_row_rejected() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 12, rows_per_image: None };
    assert!(layout
        .required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(4, 4, 1))
        .is_err());
}

#[test]
fn test_short_rows_per_image_rejected() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 16, rows_per_image: Some(2) };
    assert!(layout
        .required_bytes(TextureFormat::Rgba8Unorm, Extent3D::new(4, 4, 1))
        .is_err());
}

#[test]
fn test_depth_stencil_not_copyable() {
    let layout = ImageDataLayout { offset: 0, bytes_per_row: 16, rows_per_image: None };
    assert!(layout
        .required_bytes(TextureFormat::Depth24PlusStencil8, Extent3D::new(4, 4, 1))
        .is_err());
}

// ============================================================================
// TEXTURE REGION TESTS
// ============================================================================

fn texture_64() -> TextureDesc {
    let mut desc = TextureDesc::new_2d(64, 64, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST);
    desc.mip_level_count = 3;
    desc
}

#[test]
fn test_region_inside_mip() {
    let desc = texture_64();
    assert!(check_texture_region(&desc, 0, Origin3D::default(), Extent3D::new(64, 64, 1)).is_ok());
    assert!(check_texture_region(&desc, 2, Origin3D { x: 8, y: 8, z: 0 }, Extent3D::new(8, 8, 1)).is_ok());
}

#[test]
fn test_region_outside_mip_rejected() {
    let desc = texture_64();
    assert!(check_texture_region(&desc, 2, Origin3D::default(), Extent3D::new(32, 32, 1)).is_err());
    assert!(check_texture_region(&desc, 3, Origin3D::default(), Extent3D::new(1, 1, 1)).is_err());
}

#[test]
fn test_region_origin_overflow_rejected() {
    let desc = texture_64();
    let origin = Origin3D { x: u32::MAX, y: 0, z: 0 };
    assert!(check_texture_region(&desc, 0, origin, Extent3D::new(2, 1, 1)).is_err());
}

#[test]
fn test_region_on_3d_mip_uses_reduced_depth() {
    let desc = TextureDesc {
        size: Extent3D::new(16, 16, 16),
        mip_level_count: 3,
        dimension: TextureDimension::D3,
        ..texture_64()
    };
    // Mip 2 is 4x4x4
    assert!(check_texture_region(&desc, 2, Origin3D::default(), Extent3D::new(4, 4, 4)).is_ok());
    assert!(check_texture_region(&desc, 2, Origin3D::default(), Extent3D::new(4, 4, 8)).is_err());
    assert!(check_texture_region(&desc, 2, Origin3D { x: 0, y: 0, z: 3 }, Extent3D::new(1, 1, 2)).is_err());
}

#[test]
fn test_region_on_array_mip_keeps_all_layers() {
    let mut desc = texture_64();
    desc.size.depth_or_array_layers = 6;
    assert!(check_texture_region(&desc, 2, Origin3D { x: 0, y: 0, z: 5 }, Extent3D::new(16, 16, 1)).is_ok());
}

// ============================================================================
// DYNAMIC STATE TESTS
// ============================================================================

#[test]
fn test_full_viewport_and_scissor() {
    let viewport = Viewport::full(1280, 720);
    assert_eq!(viewport.width, 1280.0);
    assert_eq!(viewport.max_depth, 1.0);
    assert_eq!(Rect2D::full(1280, 720), Rect2D { x: 0, y: 0, width: 1280, height: 720 });
}
