/// Texture / TextureView - GL immutable-storage textures
///
/// A view is a mip/layer range of its texture: attachments use the range
/// directly and sampling clamps the base and max level at bind time. The
/// surface view stands for the default framebuffer.

use glow::HasContext;
use lumen_rhi::lumen::render::{
    Extent2D, ResolvedViewRange, TextureDesc, TextureDimension, TextureFormat, TextureUsage,
    TextureViewDesc, TextureViewDimension, ViewId,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error, rhi_trace};
use std::sync::Arc;

use crate::gl_context::GlContext;
use crate::gl_format::{depth_attachment_point, texture_format_to_gl, FormatDesc};
use crate::gl_framebuffer::{AttachmentSource, FramebufferCache};

/// Texture target a descriptor maps to
pub(crate) fn texture_target(desc: &TextureDesc) -> u32 {
    let layers = desc.array_layer_count();
    match desc.dimension {
        TextureDimension::D1 if layers > 1 => glow::TEXTURE_1D_ARRAY,
        TextureDimension::D1 => glow::TEXTURE_1D,
        TextureDimension::D2 if desc.sample_count > 1 => glow::TEXTURE_2D_MULTISAMPLE,
        TextureDimension::D2 if layers > 1 => glow::TEXTURE_2D_ARRAY,
        TextureDimension::D2 => glow::TEXTURE_2D,
        TextureDimension::D3 => glow::TEXTURE_3D,
    }
}

/// GL texture implementation
pub struct Texture {
    ctx: Arc<GlContext>,
    fbo_cache: Arc<FramebufferCache>,
    pub(crate) raw: glow::Texture,
    pub(crate) target: u32,
    pub(crate) gl_format: FormatDesc,
    desc: TextureDesc,
}

impl Texture {
    pub(crate) fn new(ctx: Arc<GlContext>, fbo_cache: Arc<FramebufferCache>, desc: &TextureDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        let gl_format = texture_format_to_gl(desc.format)
            .ok_or_else(|| rhi_err!(CreationFailed, "lumen::gl", "Format {:?} has no GL equivalent", desc.format))?;

        let limits = ctx.limits;
        if desc.size.width > limits.max_texture_size || desc.size.height > limits.max_texture_size {
            rhi_bail!(
                CreationFailed,
                "lumen::gl",
                "Texture {}x{} exceeds GL_MAX_TEXTURE_SIZE {}",
                desc.size.width,
                desc.size.height,
                limits.max_texture_size
            );
        }
        if desc.sample_count > limits.max_samples {
            rhi_bail!(CreationFailed, "lumen::gl", "Sample count {} exceeds GL_MAX_SAMPLES {}", desc.sample_count, limits.max_samples);
        }
        if desc.sample_count > 1 && (desc.dimension != TextureDimension::D2 || desc.array_layer_count() > 1 || desc.mip_level_count > 1) {
            rhi_bail!(CreationFailed, "lumen::gl", "Multisampled textures must be single-level, single-layer 2D");
        }

        let target = texture_target(desc);
        let width = desc.size.width as i32;
        let height = desc.size.height as i32;
        let levels = desc.mip_level_count as i32;

        let raw = unsafe {
            let gl = &ctx.gl;
            let raw = gl
                .create_texture()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create texture: {}", e))?;
            gl.bind_texture(target, Some(raw));
            match target {
                glow::TEXTURE_1D => gl.tex_storage_1d(target, levels, gl_format.internal, width),
                glow::TEXTURE_1D_ARRAY => gl.tex_storage_2d(
                    target,
                    levels,
                    gl_format.internal,
                    width,
                    desc.size.depth_or_array_layers as i32,
                ),
                glow::TEXTURE_2D => gl.tex_storage_2d(target, levels, gl_format.internal, width, height),
                glow::TEXTURE_2D_MULTISAMPLE => gl.tex_storage_2d_multisample(
                    target,
                    desc.sample_count as i32,
                    gl_format.internal,
                    width,
                    height,
                    true,
                ),
                _ => gl.tex_storage_3d(
                    target,
                    levels,
                    gl_format.internal,
                    width,
                    height,
                    desc.size.depth_or_array_layers as i32,
                ),
            }
            if target != glow::TEXTURE_2D_MULTISAMPLE {
                gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, levels - 1);
            }
            gl.bind_texture(target, None);

            let error = gl.get_error();
            if error != glow::NO_ERROR {
                gl.delete_texture(raw);
                if error == glow::OUT_OF_MEMORY {
                    rhi_error!("lumen::gl", "Out of memory allocating texture {:?}", desc.size);
                    return Err(lumen_rhi::lumen::Error::OutOfMemory);
                }
                rhi_bail!(CreationFailed, "lumen::gl", "Texture storage allocation failed: GL error 0x{:04X}", error);
            }
            if let Some(label) = &desc.label {
                if gl.supports_debug() {
                    gl.object_label(glow::TEXTURE, raw.0.get(), Some(label.as_str()));
                }
            }
            raw
        };

        Ok(Self {
            ctx,
            fbo_cache,
            raw,
            target,
            gl_format,
            desc: desc.clone(),
        })
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    /// Create a view over a mip/layer range of the texture
    pub fn create_view(self: &Arc<Self>, desc: &TextureViewDesc) -> Result<TextureView> {
        let range = desc
            .resolve(&self.desc)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        if range.dimension == TextureViewDimension::Cube {
            rhi_bail!(CreationFailed, "lumen::gl", "Cube views are not supported by the GL backend");
        }

        let extent = Extent2D::new(
            (self.desc.size.width >> range.base_mip_level).max(1),
            (self.desc.size.height >> range.base_mip_level).max(1),
        );
        Ok(TextureView {
            fbo_cache: Arc::clone(&self.fbo_cache),
            id: ViewId::next(),
            format: self.desc.format,
            extent,
            sample_count: self.desc.sample_count,
            usage: self.desc.usage,
            source: ViewSource::Texture {
                texture: Arc::clone(self),
                range,
            },
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe { self.ctx.gl.delete_texture(self.raw) };
    }
}

pub(crate) enum ViewSource {
    Texture {
        texture: Arc<Texture>,
        range: ResolvedViewRange,
    },
    /// The default framebuffer
    Surface,
}

/// GL texture view implementation
pub struct TextureView {
    fbo_cache: Arc<FramebufferCache>,
    id: ViewId,
    format: TextureFormat,
    extent: Extent2D,
    sample_count: u32,
    usage: TextureUsage,
    pub(crate) source: ViewSource,
}

impl TextureView {
    /// View standing for the default framebuffer at `extent`
    pub(crate) fn for_surface(fbo_cache: Arc<FramebufferCache>, format: TextureFormat, extent: Extent2D) -> Self {
        Self {
            fbo_cache,
            id: ViewId::next(),
            format,
            extent,
            sample_count: 1,
            usage: TextureUsage::RENDER_ATTACHMENT,
            source: ViewSource::Surface,
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    /// Mip/layer range of a texture view; `None` for the surface
    pub fn range(&self) -> Option<ResolvedViewRange> {
        match &self.source {
            ViewSource::Texture { range, .. } => Some(*range),
            ViewSource::Surface => None,
        }
    }

    pub fn is_surface(&self) -> bool {
        matches!(self.source, ViewSource::Surface)
    }

    /// Texture this view was created from; `None` for the surface
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        match &self.source {
            ViewSource::Texture { texture, .. } => Some(texture),
            ViewSource::Surface => None,
        }
    }

    /// FBO attachment for this view at color index `index` (ignored for depth)
    pub(crate) fn attachment_source(&self, index: u32) -> Option<(AttachmentSource, u32)> {
        let ViewSource::Texture { texture, range } = &self.source else {
            return None;
        };
        let attachment_point = if self.format.is_depth() {
            depth_attachment_point(self.format)
        } else {
            glow::COLOR_ATTACHMENT0 + index
        };
        let layered = matches!(
            texture.target,
            glow::TEXTURE_1D_ARRAY | glow::TEXTURE_2D_ARRAY | glow::TEXTURE_3D
        );
        Some((
            AttachmentSource {
                texture: texture.raw,
                attachment_point,
                mip_level: range.base_mip_level as i32,
                layer: layered.then_some(range.base_array_layer as i32),
            },
            texture.target,
        ))
    }

    /// Bind for sampling on the active texture unit
    pub(crate) unsafe fn bind_for_sampling(&self, gl: &glow::Context) {
        if let ViewSource::Texture { texture, range } = &self.source {
            gl.bind_texture(texture.target, Some(texture.raw));
            if texture.target != glow::TEXTURE_2D_MULTISAMPLE {
                gl.tex_parameter_i32(texture.target, glow::TEXTURE_BASE_LEVEL, range.base_mip_level as i32);
                gl.tex_parameter_i32(
                    texture.target,
                    glow::TEXTURE_MAX_LEVEL,
                    (range.base_mip_level + range.mip_level_count - 1) as i32,
                );
            }
        }
    }
}

impl Drop for TextureView {
    fn drop(&mut self) {
        let released = self.fbo_cache.release_view(self.id);
        if released > 0 {
            rhi_trace!("lumen::gl", "View {:?} dropped {} cached framebuffers", self.id, released);
        }
    }
}

#[cfg(test)]
#[path = "gl_texture_tests.rs"]
mod tests;
