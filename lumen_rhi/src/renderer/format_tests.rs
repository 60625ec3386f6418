//! Unit tests for format.rs

use crate::renderer::{IndexFormat, TextureFormat, VertexFormat};

// ============================================================================
// TEXTURE FORMAT TESTS
// ============================================================================

#[test]
fn test_texel_sizes() {
    assert_eq!(TextureFormat::R8Unorm.texel_size(), Some(1));
    assert_eq!(TextureFormat::Rg8Unorm.texel_size(), Some(2));
    assert_eq!(TextureFormat::Rgba8Unorm.texel_size(), Some(4));
    assert_eq!(TextureFormat::Bgra8UnormSrgb.texel_size(), Some(4));
    assert_eq!(TextureFormat::Rgba16Float.texel_size(), Some(8));
    assert_eq!(TextureFormat::Rgba32Float.texel_size(), Some(16));
    assert_eq!(TextureFormat::Presentation.texel_size(), None);
}

#[test]
fn test_depth_and_stencil_classification() {
    assert!(TextureFormat::Depth32Float.is_depth());
    assert!(!TextureFormat::Depth32Float.has_stencil());
    assert!(TextureFormat::Depth24PlusStencil8.is_depth());
    assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
    assert!(TextureFormat::Depth32FloatStencil8.has_stencil());
    assert!(!TextureFormat::Rgba8Unorm.is_depth());
    assert!(!TextureFormat::Presentation.is_depth());
}

#[test]
fn test_srgb_classification() {
    assert!(TextureFormat::Rgba8UnormSrgb.is_srgb());
    assert!(TextureFormat::Bgra8UnormSrgb.is_srgb());
    assert!(!TextureFormat::Rgba8Unorm.is_srgb());
}

// ============================================================================
// VERTEX FORMAT TESTS
// ============================================================================

#[test]
fn test_vertex_format_sizes_match_interleaved_layout() {
    // Vec2 position followed by Vec3 color: stride 20, color at offset 8
    let position = VertexFormat::Float32x2;
    let color = VertexFormat::Float32x3;
    assert_eq!(position.size(), 8);
    assert_eq!(position.size() + color.size(), 20);
}

#[test]
fn test_vertex_format_components() {
    assert_eq!(VertexFormat::Float32.components(), 1);
    assert_eq!(VertexFormat::Sint32x3.components(), 3);
    assert_eq!(VertexFormat::Unorm8x4.components(), 4);
    assert_eq!(VertexFormat::Unorm8x4.size(), 4);
    assert_eq!(VertexFormat::Uint32x4.size(), 16);
}

#[test]
fn test_vertex_format_integer_flag() {
    assert!(!VertexFormat::Float32x4.is_integer());
    assert!(!VertexFormat::Unorm8x4.is_integer());
    assert!(VertexFormat::Uint8x4.is_integer());
    assert!(VertexFormat::Sint32.is_integer());
}

// ============================================================================
// INDEX FORMAT TESTS
// ============================================================================

#[test]
fn test_index_format_sizes() {
    assert_eq!(IndexFormat::Uint16.size_bytes(), 2);
    assert_eq!(IndexFormat::Uint32.size_bytes(), 4);
}
