//! Unit tests for gl_texture.rs

use super::*;
use lumen_rhi::lumen::render::Extent3D;

// ============================================================================
// TEXTURE TARGET TESTS
// ============================================================================

fn desc(dimension: TextureDimension, layers: u32, samples: u32) -> TextureDesc {
    TextureDesc {
        label: None,
        size: Extent3D::new(16, if dimension == TextureDimension::D1 { 1 } else { 16 }, layers),
        mip_level_count: 1,
        sample_count: samples,
        dimension,
        format: TextureFormat::Rgba8Unorm,
        usage: TextureUsage::TEXTURE_BINDING,
    }
}

#[test]
fn test_texture_targets() {
    assert_eq!(texture_target(&desc(TextureDimension::D2, 1, 1)), glow::TEXTURE_2D);
    assert_eq!(texture_target(&desc(TextureDimension::D2, 4, 1)), glow::TEXTURE_2D_ARRAY);
    assert_eq!(texture_target(&desc(TextureDimension::D2, 1, 4)), glow::TEXTURE_2D_MULTISAMPLE);
    assert_eq!(texture_target(&desc(TextureDimension::D1, 1, 1)), glow::TEXTURE_1D);
    assert_eq!(texture_target(&desc(TextureDimension::D1, 3, 1)), glow::TEXTURE_1D_ARRAY);
    assert_eq!(texture_target(&desc(TextureDimension::D3, 8, 1)), glow::TEXTURE_3D);
}
