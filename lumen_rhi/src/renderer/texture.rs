/// Texture descriptor, texture view descriptor and view identity

use bitflags::bitflags;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::error::{Error, Result};
use crate::renderer::TextureFormat;

bitflags! {
    /// Texture usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Source of copy commands
        const COPY_SRC = 1 << 0;
        /// Destination of copy commands
        const COPY_DST = 1 << 1;
        /// Can be sampled in shaders
        const TEXTURE_BINDING = 1 << 2;
        /// Can be written as a storage image
        const STORAGE_BINDING = 1 << 3;
        /// Can be used as a color or depth/stencil attachment
        const RENDER_ATTACHMENT = 1 << 4;
    }
}

/// Texture dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

/// View dimensionality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureViewDimension {
    D1,
    D2,
    D2Array,
    Cube,
    D3,
}

/// Width/height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A surface with zero drawable area (e.g. a minimized window)
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Width/height/depth-or-layers in texels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth_or_array_layers: u32,
}

impl Extent3D {
    pub fn new(width: u32, height: u32, depth_or_array_layers: u32) -> Self {
        Self { width, height, depth_or_array_layers }
    }

    pub fn extent_2d(&self) -> Extent2D {
        Extent2D::new(self.width, self.height)
    }
}

impl From<Extent2D> for Extent3D {
    fn from(extent: Extent2D) -> Self {
        Self::new(extent.width, extent.height, 1)
    }
}

/// Descriptor for creating a texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Debug label
    pub label: Option<String>,
    /// Size in texels (depth for 3D textures, layers otherwise)
    pub size: Extent3D,
    /// Number of mip levels (>= 1)
    pub mip_level_count: u32,
    /// Samples per texel (1 = no multisampling)
    pub sample_count: u32,
    /// Dimensionality
    pub dimension: TextureDimension,
    /// Pixel format
    pub format: TextureFormat,
    /// Usage flags
    pub usage: TextureUsage,
}

impl TextureDesc {
    /// Descriptor for a simple 2D texture with one mip level
    pub fn new_2d(width: u32, height: u32, format: TextureFormat, usage: TextureUsage) -> Self {
        Self {
            label: None,
            size: Extent3D::new(width, height, 1),
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage,
        }
    }

    /// Backend-independent validation
    pub fn validate(&self) -> Result<()> {
        if self.size.width == 0 || self.size.height == 0 || self.size.depth_or_array_layers == 0 {
            return Err(Error::CreationFailed(format!("Texture size {:?} has a zero extent", self.size)));
        }
        if self.format == TextureFormat::Presentation {
            return Err(Error::CreationFailed(
                "Presentation format is owned by the swapchain; use Device::surface_view()".to_string(),
            ));
        }
        if self.usage.is_empty() {
            return Err(Error::CreationFailed("Texture usage must not be empty".to_string()));
        }
        if self.mip_level_count == 0 || self.mip_level_count > self.max_mip_levels() {
            return Err(Error::CreationFailed(format!(
                "Mip level count {} outside [1, {}]",
                self.mip_level_count,
                self.max_mip_levels()
            )));
        }
        if self.sample_count == 0 || !self.sample_count.is_power_of_two() {
            return Err(Error::CreationFailed(format!("Invalid sample count {}", self.sample_count)));
        }
        if self.dimension == TextureDimension::D1 && self.size.height != 1 {
            return Err(Error::CreationFailed("1D textures must have height 1".to_string()));
        }
        if self.format.is_depth() && self.dimension == TextureDimension::D3 {
            return Err(Error::CreationFailed("Depth formats cannot be 3D".to_string()));
        }
        Ok(())
    }

    /// Full mip chain length for the largest extent
    pub fn max_mip_levels(&self) -> u32 {
        let largest = match self.dimension {
            TextureDimension::D3 => self
                .size
                .width
                .max(self.size.height)
                .max(self.size.depth_or_array_layers),
            _ => self.size.width.max(self.size.height),
        };
        32 - largest.max(1).leading_zeros()
    }

    /// Array layers (1 for 3D textures)
    pub fn array_layer_count(&self) -> u32 {
        match self.dimension {
            TextureDimension::D3 => 1,
            _ => self.size.depth_or_array_layers,
        }
    }
}

/// Descriptor for creating a texture view. Defaults cover the whole texture.
#[derive(Debug, Clone, Default)]
pub struct TextureViewDesc {
    /// Debug label
    pub label: Option<String>,
    /// Dimensionality, inferred from the texture when `None`
    pub dimension: Option<TextureViewDimension>,
    pub base_mip_level: u32,
    /// `None` = every level from `base_mip_level`
    pub mip_level_count: Option<u32>,
    pub base_array_layer: u32,
    /// `None` = every layer from `base_array_layer`
    pub array_layer_count: Option<u32>,
}

/// View range after defaults have been applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedViewRange {
    pub dimension: TextureViewDimension,
    pub base_mip_level: u32,
    pub mip_level_count: u32,
    pub base_array_layer: u32,
    pub array_layer_count: u32,
}

impl TextureViewDesc {
    /// Apply defaults against the texture and check the range fits
    pub fn resolve(&self, texture: &TextureDesc) -> Result<ResolvedViewRange> {
        let layers = texture.array_layer_count();
        let mip_level_count = self
            .mip_level_count
            .unwrap_or(texture.mip_level_count.saturating_sub(self.base_mip_level));
        let array_layer_count = self
            .array_layer_count
            .unwrap_or(layers.saturating_sub(self.base_array_layer));

        let mip_end = self.base_mip_level.checked_add(mip_level_count);
        if mip_level_count == 0 || mip_end.map_or(true, |end| end > texture.mip_level_count) {
            return Err(Error::CreationFailed(format!(
                "View mip range {}+{} outside texture's {} levels",
                self.base_mip_level, mip_level_count, texture.mip_level_count
            )));
        }
        let layer_end = self.base_array_layer.checked_add(array_layer_count);
        if array_layer_count == 0 || layer_end.map_or(true, |end| end > layers) {
            return Err(Error::CreationFailed(format!(
                "View layer range {}+{} outside texture's {} layers",
                self.base_array_layer, array_layer_count, layers
            )));
        }

        let dimension = match self.dimension {
            Some(dimension) => dimension,
            None => match texture.dimension {
                TextureDimension::D1 => TextureViewDimension::D1,
                TextureDimension::D3 => TextureViewDimension::D3,
                TextureDimension::D2 if array_layer_count > 1 => TextureViewDimension::D2Array,
                TextureDimension::D2 => TextureViewDimension::D2,
            },
        };
        if dimension == TextureViewDimension::Cube && array_layer_count != 6 {
            return Err(Error::CreationFailed("Cube views need exactly 6 layers".to_string()));
        }

        Ok(ResolvedViewRange {
            dimension,
            base_mip_level: self.base_mip_level,
            mip_level_count,
            base_array_layer: self.base_array_layer,
            array_layer_count,
        })
    }
}

/// Process-unique identity of a texture view
///
/// Cached render passes and framebuffers register the ids of the views they
/// were built from, so destroying a view (or a whole swapchain) can find and
/// drop every dependent object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u64);

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

impl ViewId {
    /// Mint a fresh id
    pub fn next() -> Self {
        ViewId(NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
