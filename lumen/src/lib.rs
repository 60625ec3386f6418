/*!
# Lumen

Caller-facing layer of the Lumen rendering hardware interface.

One `Device` talks to either the Vulkan or the OpenGL backend, chosen once
at startup. Resources come back as backend-tagged handles (enums over the
backends' reference-counted objects), so renderer code records and submits
the same way whatever the backend.

## Frame loop

```no_run
use lumen::{Device, SurfaceTarget};
use lumen::render::{Color, Extent2D, FrameStatus, Operations, RenderPassColorAttachment};
use lumen_rhi::lumen::{Config, Result};

# fn run(window: &winit::window::Window) -> Result<()> {
let size = window.inner_size();
let device = Device::new(SurfaceTarget::Vulkan(window), Extent2D::new(size.width, size.height), &Config::default())?;

if device.begin_frame()? == FrameStatus::Ready {
    if let Some(view) = device.surface_view() {
        let mut encoder = device.create_command_encoder()?;
        encoder
            .begin_render_pass(&lumen::RenderPassDesc {
                label: None,
                color_attachments: vec![RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations::clear(Color::BLACK),
                }],
                depth_stencil_attachment: None,
            })?
            .end()?;
        device.queue().submit(vec![encoder.finish()?])?;
    }
}
device.end_frame()?;
# Ok(())
# }
```
*/

mod command;
mod device;
mod handle;
mod render_context;

pub use command::{CommandBuffer, CommandEncoder, RenderPass};
pub use device::{Device, Queue, SurfaceTarget, WindowHandle};
pub use handle::{
    BindGroup, BindGroupLayout, Buffer, LumenApi, MappedRange, PipelineLayout, RenderPipeline,
    Sampler, ShaderModule, Texture, TextureView,
};
pub use render_context::{load_shader, RenderContext, SamplerCache, ShaderPaths, TextureWithView, DEPTH_FORMAT};

pub use lumen_rhi_gl::GlSurface;

/// Backend-neutral descriptors and helpers
pub mod render {
    pub use lumen_rhi::lumen::render::*;
}

// Descriptors bound to the caller-facing handles
pub type BindGroupDesc<'a> = render::BindGroupDesc<'a, LumenApi>;
pub type BindGroupEntry<'a> = render::BindGroupEntry<'a, LumenApi>;
pub type BindingResource<'a> = render::BindingResource<'a, LumenApi>;
pub type BufferBinding<'a> = render::BufferBinding<'a, LumenApi>;
pub type PipelineLayoutDesc<'a> = render::PipelineLayoutDesc<'a, LumenApi>;
pub type RenderPipelineDesc<'a> = render::RenderPipelineDesc<'a, LumenApi>;
pub type VertexState<'a> = render::VertexState<'a, LumenApi>;
pub type FragmentState<'a> = render::FragmentState<'a, LumenApi>;
pub type RenderPassDesc<'a> = render::RenderPassDesc<'a, LumenApi>;
pub type ImageCopyBuffer<'a> = render::ImageCopyBuffer<'a, LumenApi>;
pub type ImageCopyTexture<'a> = render::ImageCopyTexture<'a, LumenApi>;
