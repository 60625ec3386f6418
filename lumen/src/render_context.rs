/// RenderContext - shared rendering defaults on top of a Device
///
/// Owns the sampler cache, the default sampler, 1x1 white/black textures and
/// the depth target sized to the surface. Shaders are loaded from
/// per-backend paths without conversion.

use lumen_rhi::lumen::render::{
    AddressMode, ApiPreference, BufferDesc, BufferUsage, Extent2D, Extent3D, FilterMode,
    ImageCopyBuffer, ImageCopyTexture, ImageDataLayout, Origin3D, SamplerDesc, SamplerKey,
    ShaderModuleDesc, ShaderStage, TextureDesc, TextureFormat, TextureUsage, TextureViewDesc,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_debug, rhi_err, rhi_info};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

use crate::device::Device;
use crate::handle::{LumenApi, Sampler, ShaderModule, Texture, TextureView};

/// Format of the depth target
pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;

// ============================================================================
// SamplerCache
// ============================================================================

/// Samplers keyed by `SamplerKey`, created on first request
pub struct SamplerCache<S> {
    samplers: FxHashMap<SamplerKey, S>,
}

impl<S: Clone> SamplerCache<S> {
    pub fn new() -> Self {
        Self { samplers: FxHashMap::default() }
    }

    /// Cached sampler for `key`, or one built by `create` from the key's descriptor
    pub fn get_or_create<F>(&mut self, key: SamplerKey, create: F) -> Result<S>
    where
        F: FnOnce(&SamplerDesc) -> Result<S>,
    {
        if let Some(sampler) = self.samplers.get(&key) {
            return Ok(sampler.clone());
        }
        let sampler = create(&key.to_desc())?;
        self.samplers.insert(key, sampler.clone());
        Ok(sampler)
    }

    pub fn len(&self) -> usize {
        self.samplers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samplers.is_empty()
    }

    pub fn clear(&mut self) {
        self.samplers.clear();
    }
}

impl<S: Clone> Default for SamplerCache<S> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Shader paths
// ============================================================================

/// Shader file per backend: SPIR-V for Vulkan, GLSL source for GL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vulkan: PathBuf,
    pub gl: PathBuf,
}

impl ShaderPaths {
    pub fn new(vulkan: impl Into<PathBuf>, gl: impl Into<PathBuf>) -> Self {
        Self { vulkan: vulkan.into(), gl: gl.into() }
    }

    /// `<source>.spv` for Vulkan next to the GLSL `source`
    pub fn from_source(source: impl Into<PathBuf>) -> Self {
        let gl = source.into();
        let mut vulkan = gl.clone().into_os_string();
        vulkan.push(".spv");
        Self { vulkan: vulkan.into(), gl }
    }

    pub fn for_api(&self, api: ApiPreference) -> &Path {
        match api {
            ApiPreference::Vulkan => &self.vulkan,
            ApiPreference::Gl => &self.gl,
        }
    }
}

/// Read the shader for `device`'s backend and create a module with `main` as entry point
pub fn load_shader(device: &Device, paths: &ShaderPaths, stage: ShaderStage) -> Result<ShaderModule> {
    let path = paths.for_api(device.api());
    let code = std::fs::read(path)
        .map_err(|e| rhi_err!(CreationFailed, "lumen::context", "Failed to read shader '{}': {}", path.display(), e))?;
    rhi_debug!("lumen::context", "Loaded {:?} shader '{}' ({} bytes)", stage, path.display(), code.len());
    device.create_shader_module(&ShaderModuleDesc {
        label: Some(path.display().to_string()),
        ..ShaderModuleDesc::new(stage, code)
    })
}

// ============================================================================
// RenderContext
// ============================================================================

/// A texture together with its full view
#[derive(Debug, Clone)]
pub struct TextureWithView {
    pub texture: Texture,
    pub view: TextureView,
}

pub struct RenderContext {
    samplers: SamplerCache<Sampler>,
    default_sampler: Sampler,
    white: TextureWithView,
    black: TextureWithView,
    depth: TextureWithView,
}

impl RenderContext {
    /// Build the defaults; uploads go through the queue, so call outside a frame
    pub fn new(device: &Device) -> Result<Self> {
        let mut samplers = SamplerCache::new();
        let default_key = SamplerKey::new(
            AddressMode::Repeat,
            AddressMode::Repeat,
            FilterMode::Linear,
            FilterMode::Linear,
        );
        let default_sampler = samplers.get_or_create(default_key, |desc| device.create_sampler(desc))?;
        let white = Self::create_single_value_texture(device, [255, 255, 255, 255])?;
        let black = Self::create_single_value_texture(device, [0, 0, 0, 255])?;
        let depth = Self::create_depth_target(device, device.surface_extent())?;

        rhi_info!("lumen::context", "Render context ready ({} backend)", device.api());
        Ok(Self {
            samplers,
            default_sampler,
            white,
            black,
            depth,
        })
    }

    /// Shared sampler for `key`; identical keys return the same sampler
    pub fn sampler(&mut self, device: &Device, key: SamplerKey) -> Result<Sampler> {
        self.samplers.get_or_create(key, |desc| device.create_sampler(desc))
    }

    pub fn sampler_count(&self) -> usize {
        self.samplers.len()
    }

    /// Repeat addressing, linear filtering
    pub fn default_sampler(&self) -> &Sampler {
        &self.default_sampler
    }

    pub fn white_texture(&self) -> &TextureWithView {
        &self.white
    }

    pub fn black_texture(&self) -> &TextureWithView {
        &self.black
    }

    pub fn depth_target(&self) -> &TextureWithView {
        &self.depth
    }

    /// Rebuild the depth target; zero-area sizes keep the old one
    pub fn on_window_resize(&mut self, device: &Device, size: Extent2D) -> Result<()> {
        if size.is_degenerate() {
            return Ok(());
        }
        self.depth = Self::create_depth_target(device, size)?;
        Ok(())
    }

    /// 1x1 RGBA8 texture holding `rgba`, uploaded through a staging buffer
    pub fn create_single_value_texture(device: &Device, rgba: [u8; 4]) -> Result<TextureWithView> {
        let staging = device.create_buffer(&BufferDesc {
            label: Some("single value staging".to_string()),
            size: rgba.len() as u64,
            usage: BufferUsage::COPY_SRC,
            mapped_at_creation: true,
        })?;
        staging.get_mapped_range()?.copy_from_slice(&rgba);
        staging.unmap()?;

        let texture = device.create_texture(&TextureDesc {
            label: Some(format!("single value {:?}", rgba)),
            ..TextureDesc::new_2d(1, 1, TextureFormat::Rgba8Unorm, TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST)
        })?;

        let mut encoder = device.create_command_encoder()?;
        encoder.copy_buffer_to_texture(
            &ImageCopyBuffer::<LumenApi> {
                buffer: &staging,
                layout: ImageDataLayout { offset: 0, bytes_per_row: 4, rows_per_image: None },
            },
            &ImageCopyTexture { texture: &texture, mip_level: 0, origin: Origin3D::default() },
            Extent3D::new(1, 1, 1),
        )?;
        device.queue().submit(vec![encoder.finish()?])?;

        let view = texture.create_view(&TextureViewDesc::default())?;
        Ok(TextureWithView { texture, view })
    }

    fn create_depth_target(device: &Device, size: Extent2D) -> Result<TextureWithView> {
        let texture = device.create_texture(&TextureDesc {
            label: Some("depth target".to_string()),
            ..TextureDesc::new_2d(size.width.max(1), size.height.max(1), DEPTH_FORMAT, TextureUsage::RENDER_ATTACHMENT)
        })?;
        let view = texture.create_view(&TextureViewDesc::default())?;
        rhi_debug!("lumen::context", "Depth target {}x{}", size.width, size.height);
        Ok(TextureWithView { texture, view })
    }
}

#[cfg(test)]
#[path = "render_context_tests.rs"]
mod tests;
