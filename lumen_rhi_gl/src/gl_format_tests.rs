//! Unit tests for GL format conversion functions
//!
//! Pure lookups, no GL context needed.

use super::*;

// ============================================================================
// TEXTURE FORMAT TESTS
// ============================================================================

#[test]
fn test_every_concrete_format_has_gl_triple() {
    let formats = [
        TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb,
        TextureFormat::R32Float,
        TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float,
        TextureFormat::Depth16Unorm,
        TextureFormat::Depth32Float,
        TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32FloatStencil8,
    ];
    for format in formats {
        assert!(texture_format_to_gl(format).is_some(), "{:?} has no GL format", format);
    }
    assert_eq!(texture_format_to_gl(TextureFormat::Presentation), None);
}

#[test]
fn test_srgb_formats_use_srgb_storage() {
    let desc = texture_format_to_gl(TextureFormat::Rgba8UnormSrgb).unwrap();
    assert_eq!(desc.internal, glow::SRGB8_ALPHA8);
    assert_eq!(desc.format, glow::RGBA);

    let bgra = texture_format_to_gl(TextureFormat::Bgra8UnormSrgb).unwrap();
    assert_eq!(bgra.internal, glow::SRGB8_ALPHA8);
    assert_eq!(bgra.format, glow::BGRA);
}

#[test]
fn test_depth_formats() {
    let d24s8 = texture_format_to_gl(TextureFormat::Depth24PlusStencil8).unwrap();
    assert_eq!(d24s8.format, glow::DEPTH_STENCIL);
    assert_eq!(d24s8.ty, glow::UNSIGNED_INT_24_8);

    assert_eq!(depth_attachment_point(TextureFormat::Depth24PlusStencil8), glow::DEPTH_STENCIL_ATTACHMENT);
    assert_eq!(depth_attachment_point(TextureFormat::Depth32Float), glow::DEPTH_ATTACHMENT);
}

// ============================================================================
// VERTEX / INDEX TESTS
// ============================================================================

#[test]
fn test_vertex_formats() {
    assert_eq!(vertex_format_to_gl(VertexFormat::Float32x3), (3, glow::FLOAT, false));
    assert_eq!(vertex_format_to_gl(VertexFormat::Unorm8x4), (4, glow::UNSIGNED_BYTE, true));
    assert_eq!(vertex_format_to_gl(VertexFormat::Uint8x4), (4, glow::UNSIGNED_BYTE, false));
    assert_eq!(vertex_format_to_gl(VertexFormat::Sint32x2), (2, glow::INT, false));
}

#[test]
fn test_index_formats() {
    assert_eq!(index_format_to_gl(IndexFormat::Uint16), glow::UNSIGNED_SHORT);
    assert_eq!(index_format_to_gl(IndexFormat::Uint32), glow::UNSIGNED_INT);
}

// ============================================================================
// FIXED FUNCTION TESTS
// ============================================================================

#[test]
fn test_cull_mode_none_disables_culling() {
    assert_eq!(cull_mode_to_gl(CullMode::None), None);
    assert_eq!(cull_mode_to_gl(CullMode::Back), Some(glow::BACK));
}

#[test]
fn test_min_filter_folds_mipmap_filter() {
    assert_eq!(min_filter_to_gl(FilterMode::Linear, FilterMode::Linear), glow::LINEAR_MIPMAP_LINEAR);
    assert_eq!(min_filter_to_gl(FilterMode::Nearest, FilterMode::Linear), glow::NEAREST_MIPMAP_LINEAR);
    assert_eq!(mag_filter_to_gl(FilterMode::Linear), glow::LINEAR);
}

#[test]
fn test_compare_and_blend() {
    assert_eq!(compare_to_gl(CompareFunction::LessEqual), glow::LEQUAL);
    assert_eq!(blend_factor_to_gl(BlendFactor::OneMinusSrcAlpha), glow::ONE_MINUS_SRC_ALPHA);
    assert_eq!(blend_op_to_gl(BlendOperation::ReverseSubtract), glow::FUNC_REVERSE_SUBTRACT);
    assert_eq!(address_mode_to_gl(AddressMode::MirrorRepeat), glow::MIRRORED_REPEAT);
    assert_eq!(topology_to_gl(PrimitiveTopology::TriangleStrip), glow::TRIANGLE_STRIP);
}
