//! Unit tests for surface.rs
//!
//! Swapchain parameter selection, independent of any GPU.

use crate::error::Error;
use crate::renderer::{
    ColorSpace, Extent2D, PresentMode, SurfaceCapabilities, SurfaceFormat, SwapchainConfig,
    TextureFormat,
};

fn caps(min: u32, max: u32) -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: min,
        max_image_count: max,
        current_extent: None,
        min_extent: Extent2D::new(1, 1),
        max_extent: Extent2D::new(4096, 4096),
    }
}

fn srgb(format: TextureFormat) -> SurfaceFormat {
    SurfaceFormat { format, color_space: ColorSpace::SrgbNonlinear }
}

// ============================================================================
// FORMAT SELECTION
// ============================================================================

#[test]
fn test_prefers_rgba8_srgb_nonlinear() {
    let formats = [srgb(TextureFormat::Bgra8UnormSrgb), srgb(TextureFormat::Rgba8Unorm)];
    let chosen = SwapchainConfig::select_format(&formats).unwrap();
    assert_eq!(chosen.format, TextureFormat::Rgba8Unorm);
}

#[test]
fn test_rgba8_in_other_color_space_not_preferred() {
    let formats = [
        srgb(TextureFormat::Bgra8Unorm),
        SurfaceFormat {
            format: TextureFormat::Rgba8Unorm,
            color_space: ColorSpace::ExtendedSrgbLinear,
        },
    ];
    let chosen = SwapchainConfig::select_format(&formats).unwrap();
    assert_eq!(chosen.format, TextureFormat::Bgra8Unorm);
}

#[test]
fn test_no_format_is_query_failure() {
    assert!(matches!(SwapchainConfig::select_format(&[]), Err(Error::QueryFailed(_))));
}

// ============================================================================
// PRESENT MODE SELECTION
// ============================================================================

#[test]
fn test_mailbox_preferred_when_available() {
    let modes = [PresentMode::Fifo, PresentMode::Mailbox, PresentMode::Immediate];
    assert_eq!(SwapchainConfig::select_present_mode(&modes, true), PresentMode::Mailbox);
}

#[test]
fn test_fifo_fallback() {
    let modes = [PresentMode::Fifo, PresentMode::Immediate];
    assert_eq!(SwapchainConfig::select_present_mode(&modes, true), PresentMode::Fifo);
}

#[test]
fn test_fifo_when_low_latency_not_wanted() {
    let modes = [PresentMode::Fifo, PresentMode::Mailbox];
    assert_eq!(SwapchainConfig::select_present_mode(&modes, false), PresentMode::Fifo);
}

// ============================================================================
// IMAGE COUNT SELECTION
// ============================================================================

#[test]
fn test_image_count_at_least_two() {
    assert_eq!(SwapchainConfig::select_image_count(&caps(1, 0)), 2);
    assert_eq!(SwapchainConfig::select_image_count(&caps(1, 8)), 2);
}

#[test]
fn test_image_count_keeps_larger_minimum() {
    assert_eq!(SwapchainConfig::select_image_count(&caps(3, 0)), 3);
}

#[test]
fn test_image_count_clamped_to_max() {
    assert_eq!(SwapchainConfig::select_image_count(&caps(1, 1)), 1);
}

// ============================================================================
// EXTENT SELECTION
// ============================================================================

#[test]
fn test_current_extent_wins() {
    let mut capabilities = caps(2, 0);
    capabilities.current_extent = Some(Extent2D::new(1024, 768));
    let extent = SwapchainConfig::select_extent(&capabilities, Extent2D::new(800, 600));
    assert_eq!(extent, Extent2D::new(1024, 768));
}

#[test]
fn test_requested_extent_clamped() {
    let capabilities = caps(2, 0);
    let extent = SwapchainConfig::select_extent(&capabilities, Extent2D::new(10000, 0));
    assert_eq!(extent, Extent2D::new(4096, 1));
}

#[test]
fn test_full_selection() {
    let config = SwapchainConfig::select(
        &caps(2, 3),
        &[srgb(TextureFormat::Rgba8Unorm)],
        &[PresentMode::Fifo],
        Extent2D::new(800, 600),
        true,
    )
    .unwrap();
    assert_eq!(config.image_count, 2);
    assert_eq!(config.present_mode, PresentMode::Fifo);
    assert_eq!(config.extent, Extent2D::new(800, 600));
}
