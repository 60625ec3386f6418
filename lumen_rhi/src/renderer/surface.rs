/// Surface capabilities and swapchain parameter selection
///
/// Backends translate their native capability queries into these structs;
/// `SwapchainConfig::select` then decides format, present mode, image count
/// and extent the same way for every backend.

use crate::error::{Error, Result};
use crate::renderer::{Extent2D, TextureFormat};

/// Color space of a presentable format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    SrgbNonlinear,
    ExtendedSrgbLinear,
    DisplayP3Nonlinear,
}

/// A format/color space pair the surface can present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceFormat {
    pub format: TextureFormat,
    pub color_space: ColorSpace,
}

/// Presentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentMode {
    /// No vsync, may tear
    Immediate,
    /// Triple-buffered vsync, newest image wins
    Mailbox,
    /// Vsync queue, always supported
    Fifo,
    /// Vsync that tears when late
    FifoRelaxed,
}

/// Backend-neutral surface capability query result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 = no upper limit
    pub max_image_count: u32,
    /// `None` when the surface lets the swapchain choose its size
    pub current_extent: Option<Extent2D>,
    pub min_extent: Extent2D,
    pub max_extent: Extent2D,
}

/// Parameters a swapchain is (re)built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: SurfaceFormat,
    pub present_mode: PresentMode,
    pub image_count: u32,
    pub extent: Extent2D,
}

impl SwapchainConfig {
    pub fn select(
        capabilities: &SurfaceCapabilities,
        formats: &[SurfaceFormat],
        present_modes: &[PresentMode],
        requested: Extent2D,
        prefer_low_latency: bool,
    ) -> Result<Self> {
        Ok(Self {
            format: Self::select_format(formats)?,
            present_mode: Self::select_present_mode(present_modes, prefer_low_latency),
            image_count: Self::select_image_count(capabilities),
            extent: Self::select_extent(capabilities, requested),
        })
    }

    /// Prefer RGBA8 in sRGB-nonlinear color space, else the first format offered
    pub fn select_format(formats: &[SurfaceFormat]) -> Result<SurfaceFormat> {
        formats
            .iter()
            .find(|f| f.format == TextureFormat::Rgba8Unorm && f.color_space == ColorSpace::SrgbNonlinear)
            .or_else(|| formats.first())
            .copied()
            .ok_or_else(|| Error::QueryFailed("Surface reports no usable format".to_string()))
    }

    /// Mailbox when available and low latency is wanted, Fifo otherwise
    pub fn select_present_mode(present_modes: &[PresentMode], prefer_low_latency: bool) -> PresentMode {
        if prefer_low_latency && present_modes.contains(&PresentMode::Mailbox) {
            PresentMode::Mailbox
        } else {
            PresentMode::Fifo
        }
    }

    /// `max(2, min)`, clamped to `max` when the surface sets one
    pub fn select_image_count(capabilities: &SurfaceCapabilities) -> u32 {
        let count = capabilities.min_image_count.max(2);
        if capabilities.max_image_count != 0 {
            count.min(capabilities.max_image_count)
        } else {
            count
        }
    }

    pub fn select_extent(capabilities: &SurfaceCapabilities, requested: Extent2D) -> Extent2D {
        match capabilities.current_extent {
            Some(extent) => extent,
            None => Extent2D::new(
                requested
                    .width
                    .max(capabilities.min_extent.width)
                    .min(capabilities.max_extent.width),
                requested
                    .height
                    .max(capabilities.min_extent.height)
                    .min(capabilities.max_extent.height),
            ),
        }
    }
}

#[cfg(test)]
#[path = "surface_tests.rs"]
mod tests;
