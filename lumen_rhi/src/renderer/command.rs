/// Copy command descriptors, dynamic state rectangles and copy validation

use crate::error::{Error, Result};
use crate::renderer::{Api, Extent3D, ResourceMap, TextureDesc, TextureDimension, TextureFormat};

/// Texel offset of a copy region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Origin3D {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

/// Layout of texel data inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageDataLayout {
    /// Byte offset of the first texel
    pub offset: u64,
    /// Bytes between the start of two consecutive rows
    pub bytes_per_row: u32,
    /// Rows between two consecutive images; `None` = copy height
    pub rows_per_image: Option<u32>,
}

impl ImageDataLayout {
    /// Check the layout for a copy of `size` texels of `format`
    ///
    /// Returns the number of bytes the copy touches, starting at `offset`.
    pub fn required_bytes(&self, format: TextureFormat, size: Extent3D) -> Result<u64> {
        if format.has_stencil() {
            return Err(Error::InvalidUsage(format!(
                "Combined depth/stencil format {:?} cannot be copied through a buffer",
                format
            )));
        }
        let texel = format.texel_size().ok_or_else(|| {
            Error::InvalidUsage(format!("Format {:?} cannot be copied through a buffer", format))
        })?;
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(Error::InvalidUsage(format!("Copy size {:?} is empty", size)));
        }
        if self.bytes_per_row % texel != 0 {
            return Err(Error::InvalidUsage(format!(
                "bytes_per_row {} is not a multiple of the {}-byte texel",
                self.bytes_per_row, texel
            )));
        }
        let row_bytes = size.width as u64 * texel as u64;
        if (self.bytes_per_row as u64) < row_bytes {
            return Err(Error::InvalidUsage(format!(
                "bytes_per_row {} is smaller than one row ({} bytes)",
                self.bytes_per_row, row_bytes
            )));
        }
        let rows_per_image = self.rows_per_image.unwrap_or(size.height);
        if rows_per_image < size.height {
            return Err(Error::InvalidUsage(format!(
                "rows_per_image {} is smaller than the copy height {}",
                rows_per_image, size.height
            )));
        }
        let stride = self.bytes_per_row as u64;
        let image_stride = stride * rows_per_image as u64;
        Ok(image_stride * (size.depth_or_array_layers as u64 - 1)
            + stride * (size.height as u64 - 1)
            + row_bytes)
    }

    /// `bytes_per_row` expressed in texels (Vulkan's `bufferRowLength`)
    pub fn row_length_texels(&self, format: TextureFormat) -> u32 {
        format.texel_size().map(|texel| self.bytes_per_row / texel).unwrap_or(0)
    }
}

pub struct ImageCopyBuffer<'a, A: Api> {
    pub buffer: &'a A::Buffer,
    pub layout: ImageDataLayout,
}

pub struct ImageCopyTexture<'a, A: Api> {
    pub texture: &'a A::Texture,
    pub mip_level: u32,
    pub origin: Origin3D,
}

impl<'a, A: Api> ImageCopyBuffer<'a, A> {
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<ImageCopyBuffer<'a, B>> {
        Ok(ImageCopyBuffer { buffer: map.buffer(self.buffer)?, layout: self.layout })
    }
}

impl<'a, A: Api> ImageCopyTexture<'a, A> {
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<ImageCopyTexture<'a, B>> {
        Ok(ImageCopyTexture {
            texture: map.texture(self.texture)?,
            mip_level: self.mip_level,
            origin: self.origin,
        })
    }
}

/// Check that `origin + size` at `mip_level` lies inside the texture
pub fn check_texture_region(
    desc: &TextureDesc,
    mip_level: u32,
    origin: Origin3D,
    size: Extent3D,
) -> Result<()> {
    if mip_level >= desc.mip_level_count {
        return Err(Error::InvalidUsage(format!(
            "Mip level {} outside texture's {} levels",
            mip_level, desc.mip_level_count
        )));
    }
    let width = (desc.size.width >> mip_level).max(1);
    let height = (desc.size.height >> mip_level).max(1);
    // Array layers stay whole across mips; 3D depth shrinks with them
    let depth = match desc.dimension {
        TextureDimension::D3 => (desc.size.depth_or_array_layers >> mip_level).max(1),
        _ => desc.size.depth_or_array_layers,
    };
    let fits = |o: u32, s: u32, limit: u32| o.checked_add(s).map(|end| end <= limit).unwrap_or(false);
    if !fits(origin.x, size.width, width)
        || !fits(origin.y, size.height, height)
        || !fits(origin.z, size.depth_or_array_layers, depth)
    {
        return Err(Error::InvalidUsage(format!(
            "Copy region {:?}+{:?} exceeds mip {} extent {}x{}x{}",
            origin, size, mip_level, width, height, depth
        )));
    }
    Ok(())
}

/// Viewport (floating-point, with depth range)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    /// Viewport covering `width x height` with depth [0, 1]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Integer rectangle (scissor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    pub fn full(width: u32, height: u32) -> Self {
        Self { x: 0, y: 0, width, height }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
