/*!
# Lumen RHI - OpenGL Backend

OpenGL 4.3 core implementation of the Lumen rendering hardware interface,
built on `glow`.

GL has no command buffers or explicit synchronization. Encoders validate and
record commands into a list that `Queue::submit` replays on the context; the
driver handles hazards. The default framebuffer stands in for the swapchain
and is exposed as the surface view of an open frame.

Differences from the Vulkan backend:

- shaders are GLSL source with a `main` entry point
- binding numbers are GL binding points shared by every bind group, so a
  pipeline layout may not use one point twice
- push constants live in a uniform block named `PushConstants` at uniform
  binding `PUSH_CONSTANT_BINDING`
- cube views and buffer copies of 1D textures are not supported
- the caller keeps the context current on the thread using the device

## Example

```no_run
use lumen_rhi::lumen::{Config, Result};
use lumen_rhi::lumen::render::{Extent2D, FrameStatus};
use lumen_rhi_gl::{Device, GlSurface};

struct Window;

impl GlSurface for Window {
    fn swap_buffers(&self) -> Result<()> {
        Ok(())
    }
}

# fn run(gl: glow::Context) -> Result<()> {
let device = Device::new(gl, Box::new(Window), Extent2D::new(800, 600), Config::default())?;
if device.begin_frame()? == FrameStatus::Ready {
    // record and submit
}
device.end_frame()?;
# Ok(())
# }
```
*/

mod debug;
mod gl_format;
mod gl_context;
mod gl_buffer;
mod gl_framebuffer;
mod gl_texture;
mod gl_sampler;
mod gl_shader;
mod gl_binding;
mod gl_pipeline;
mod gl_command;
mod gl_frame;
mod gl_device;

use std::sync::Arc;
use lumen_rhi::lumen::render::Api;

pub use gl_binding::{BindGroup, BindGroupLayout, PipelineLayout};
pub use gl_buffer::{Buffer, MappedRange};
pub use gl_command::{CommandBuffer, CommandEncoder};
pub use gl_context::{GlLimits, MAX_PUSH_CONSTANT_SIZE, PUSH_CONSTANT_BINDING};
pub use gl_device::{Device, GlSurface, Queue, SURFACE_FORMAT};
pub use gl_pipeline::{RenderPipeline, PUSH_CONSTANT_BLOCK};
pub use gl_sampler::Sampler;
pub use gl_shader::ShaderModule;
pub use gl_texture::{Texture, TextureView};

/// Handle family of the GL backend
pub struct GlApi;

impl Api for GlApi {
    type Buffer = Arc<Buffer>;
    type Texture = Arc<Texture>;
    type TextureView = Arc<TextureView>;
    type Sampler = Arc<Sampler>;
    type ShaderModule = Arc<ShaderModule>;
    type BindGroupLayout = Arc<BindGroupLayout>;
    type PipelineLayout = Arc<PipelineLayout>;
}
