/// Device / Queue - backend selection and the frame boundary
///
/// `Device::new` binds to one backend for its whole life. Every call then
/// forwards to that backend; descriptors are mapped with `ToVulkan` /
/// `ToGl`, so a handle from the other backend fails with `InvalidUsage`.

use lumen_rhi::lumen::render::{
    ApiPreference, BindGroupDesc, BindGroupLayoutDesc, BufferDesc, Extent2D, FrameStatus,
    PipelineLayoutDesc, RenderPipelineDesc, SamplerDesc, ShaderModuleDesc, TextureDesc,
    TextureFormat, TextureViewDesc, ViewId,
};
use lumen_rhi::lumen::{Config, Result};
use lumen_rhi::rhi_info;
use lumen_rhi_gl::{self as gl, GlSurface};
use lumen_rhi_vulkan as vulkan;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::command::{CommandBuffer, CommandEncoder};
use crate::handle::{
    backend_mismatch, dispatch, BindGroup, BindGroupLayout, Buffer, LumenApi, PipelineLayout,
    RenderPipeline, Sampler, ShaderModule, Texture, TextureView, ToGl, ToVulkan,
};

/// A window Vulkan can create a surface for
pub trait WindowHandle: HasDisplayHandle + HasWindowHandle {}

impl<T: HasDisplayHandle + HasWindowHandle + ?Sized> WindowHandle for T {}

/// What the device presents to
pub enum SurfaceTarget<'w> {
    /// Any raw-window-handle window
    Vulkan(&'w dyn WindowHandle),
    /// A loaded `glow` context, current on this thread, and its swap surface
    Gl {
        context: glow::Context,
        surface: Box<dyn GlSurface>,
    },
}

impl SurfaceTarget<'_> {
    pub fn api(&self) -> ApiPreference {
        match self {
            SurfaceTarget::Vulkan(_) => ApiPreference::Vulkan,
            SurfaceTarget::Gl { .. } => ApiPreference::Gl,
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

/// Submission queue of a device
#[derive(Clone)]
pub enum Queue {
    Vulkan(Arc<vulkan::Queue>),
    Gl(Arc<gl::Queue>),
}

impl Queue {
    pub fn api(&self) -> ApiPreference {
        match self {
            Queue::Vulkan(_) => ApiPreference::Vulkan,
            Queue::Gl(_) => ApiPreference::Gl,
        }
    }

    /// Submit finished command buffers
    ///
    /// Vulkan defers buffers recorded inside a frame to `end_frame` and runs
    /// upload buffers immediately; GL replays everything immediately.
    pub fn submit(&self, buffers: Vec<CommandBuffer>) -> Result<()> {
        match self {
            Queue::Vulkan(queue) => {
                let buffers = buffers
                    .into_iter()
                    .map(|buffer| match buffer {
                        CommandBuffer::Vulkan(buffer) => Ok(buffer),
                        other => Err(backend_mismatch("CommandBuffer", other.api(), ApiPreference::Vulkan)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                queue.submit(buffers)
            }
            Queue::Gl(queue) => {
                let buffers = buffers
                    .into_iter()
                    .map(|buffer| match buffer {
                        CommandBuffer::Gl(buffer) => Ok(buffer),
                        other => Err(backend_mismatch("CommandBuffer", other.api(), ApiPreference::Gl)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                queue.submit(buffers)
            }
        }
    }
}

// ============================================================================
// Device
// ============================================================================

/// Rendering device bound to one backend
pub enum Device {
    Vulkan(vulkan::Device),
    Gl(gl::Device),
}

impl Device {
    /// Create a device for `target`, whose drawable size is `size`
    pub fn new(target: SurfaceTarget<'_>, size: Extent2D, config: &Config) -> Result<Self> {
        let api = target.api();
        let device = match target {
            SurfaceTarget::Vulkan(window) => Device::Vulkan(vulkan::Device::new(window, size, config.clone())?),
            SurfaceTarget::Gl { context, surface } => {
                Device::Gl(gl::Device::new(context, surface, size, config.clone())?)
            }
        };
        rhi_info!(
            "lumen::device",
            "{} device created for '{}' at {}x{}",
            api,
            config.app_name,
            size.width,
            size.height
        );
        Ok(device)
    }

    pub fn api(&self) -> ApiPreference {
        match self {
            Device::Vulkan(_) => ApiPreference::Vulkan,
            Device::Gl(_) => ApiPreference::Gl,
        }
    }

    // ===== Frames =====

    /// Open a frame; `Skipped` frames must still be closed with `end_frame`
    pub fn begin_frame(&self) -> Result<FrameStatus> {
        dispatch!(self, device => device.begin_frame())
    }

    pub fn end_frame(&self) -> Result<()> {
        dispatch!(self, device => device.end_frame())
    }

    pub fn on_window_resize(&self, size: Extent2D) -> Result<()> {
        dispatch!(self, device => device.on_window_resize(size))
    }

    pub fn wait_idle(&self) -> Result<()> {
        dispatch!(self, device => device.wait_idle())
    }

    pub fn queue(&self) -> Queue {
        match self {
            Device::Vulkan(device) => Queue::Vulkan(device.queue()),
            Device::Gl(device) => Queue::Gl(device.queue()),
        }
    }

    /// Surface view of the open frame; `None` outside a frame or when skipped
    pub fn surface_view(&self) -> Option<TextureView> {
        match self {
            Device::Vulkan(device) => device.surface_view().map(TextureView::Vulkan),
            Device::Gl(device) => device.surface_view().map(TextureView::Gl),
        }
    }

    // ===== Resource creation =====

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Buffer> {
        match self {
            Device::Vulkan(device) => device.create_buffer(desc).map(Buffer::Vulkan),
            Device::Gl(device) => device.create_buffer(desc).map(Buffer::Gl),
        }
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Texture> {
        match self {
            Device::Vulkan(device) => device.create_texture(desc).map(Texture::Vulkan),
            Device::Gl(device) => device.create_texture(desc).map(Texture::Gl),
        }
    }

    pub fn create_texture_view(&self, texture: &Texture, desc: &TextureViewDesc) -> Result<TextureView> {
        match (self, texture) {
            (Device::Vulkan(device), Texture::Vulkan(texture)) => {
                device.create_texture_view(texture, desc).map(TextureView::Vulkan)
            }
            (Device::Gl(device), Texture::Gl(texture)) => device.create_texture_view(texture, desc).map(TextureView::Gl),
            (device, texture) => Err(backend_mismatch("Texture", texture.api(), device.api())),
        }
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler> {
        match self {
            Device::Vulkan(device) => device.create_sampler(desc).map(Sampler::Vulkan),
            Device::Gl(device) => device.create_sampler(desc).map(Sampler::Gl),
        }
    }

    /// SPIR-V for Vulkan, GLSL source for GL
    pub fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<ShaderModule> {
        match self {
            Device::Vulkan(device) => device.create_shader_module(desc).map(ShaderModule::Vulkan),
            Device::Gl(device) => device.create_shader_module(desc).map(ShaderModule::Gl),
        }
    }

    pub fn create_bind_group_layout(&self, desc: &BindGroupLayoutDesc) -> Result<BindGroupLayout> {
        match self {
            Device::Vulkan(device) => device.create_bind_group_layout(desc).map(BindGroupLayout::Vulkan),
            Device::Gl(device) => device.create_bind_group_layout(desc).map(BindGroupLayout::Gl),
        }
    }

    pub fn create_bind_group(&self, desc: &BindGroupDesc<'_, LumenApi>) -> Result<BindGroup> {
        match self {
            Device::Vulkan(device) => device.create_bind_group(&desc.map(&ToVulkan)?).map(BindGroup::Vulkan),
            Device::Gl(device) => device.create_bind_group(&desc.map(&ToGl)?).map(BindGroup::Gl),
        }
    }

    pub fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc<'_, LumenApi>) -> Result<PipelineLayout> {
        match self {
            Device::Vulkan(device) => device.create_pipeline_layout(&desc.map(&ToVulkan)?).map(PipelineLayout::Vulkan),
            Device::Gl(device) => device.create_pipeline_layout(&desc.map(&ToGl)?).map(PipelineLayout::Gl),
        }
    }

    pub fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, LumenApi>) -> Result<RenderPipeline> {
        match self {
            Device::Vulkan(device) => device.create_render_pipeline(&desc.map(&ToVulkan)?).map(RenderPipeline::Vulkan),
            Device::Gl(device) => device.create_render_pipeline(&desc.map(&ToGl)?).map(RenderPipeline::Gl),
        }
    }

    /// Start recording; encoders for a frame are created after `begin_frame`
    pub fn create_command_encoder(&self) -> Result<CommandEncoder> {
        match self {
            Device::Vulkan(device) => device.create_command_encoder().map(CommandEncoder::Vulkan),
            Device::Gl(device) => device.create_command_encoder().map(CommandEncoder::Gl),
        }
    }

    // ===== Introspection =====

    pub fn frame_index(&self) -> usize {
        dispatch!(self, device => device.frame_index())
    }

    pub fn image_count(&self) -> usize {
        dispatch!(self, device => device.image_count())
    }

    pub fn surface_format(&self) -> TextureFormat {
        dispatch!(self, device => device.surface_format())
    }

    pub fn surface_extent(&self) -> Extent2D {
        dispatch!(self, device => device.surface_extent())
    }

    pub fn is_degenerate(&self) -> bool {
        dispatch!(self, device => device.is_degenerate())
    }

    pub fn tracked_attachment_views(&self) -> FxHashSet<ViewId> {
        dispatch!(self, device => device.tracked_attachment_views())
    }

    pub fn surface_views(&self) -> Vec<ViewId> {
        dispatch!(self, device => device.surface_views())
    }

    pub fn in_flight_command_buffers(&self) -> usize {
        dispatch!(self, device => device.in_flight_command_buffers())
    }

    pub fn config(&self) -> &Config {
        dispatch!(self, device => device.config())
    }
}
