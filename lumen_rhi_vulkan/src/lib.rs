/*!
# Lumen RHI - Vulkan Backend

Vulkan implementation of the Lumen rendering hardware interface.

Built on `ash` for the Vulkan bindings and `gpu-allocator` for memory
management. Synchronization is explicit: one fence and semaphore pair per
swapchain image, with command buffers and the resources they reference kept
alive until the fence of the frame that submitted them has been waited.

## Example

```no_run
use lumen_rhi::lumen::Config;
use lumen_rhi::lumen::render::{Extent2D, FrameStatus};
use lumen_rhi_vulkan::Device;
# fn run(window: &winit::window::Window) -> lumen_rhi::lumen::Result<()> {
let size = window.inner_size();
let device = Device::new(window, Extent2D::new(size.width, size.height), Config::default())?;
if device.begin_frame()? == FrameStatus::Ready {
    // record and submit
}
device.end_frame()?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan_format;
mod vulkan_context;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_sampler;
mod vulkan_shader;
mod vulkan_binding;
mod vulkan_render_pass;
mod vulkan_pipeline;
mod vulkan_swapchain;
mod vulkan_frame;
mod vulkan_command;
mod vulkan_device;

use std::sync::Arc;
use lumen_rhi::lumen::render::Api;

pub use vulkan_binding::{BindGroup, BindGroupLayout, PipelineLayout};
pub use vulkan_buffer::{Buffer, MappedRange};
pub use vulkan_command::{CommandBuffer, CommandEncoder};
pub use vulkan_device::{Device, Queue};
pub use vulkan_pipeline::RenderPipeline;
pub use vulkan_sampler::Sampler;
pub use vulkan_shader::ShaderModule;
pub use vulkan_swapchain::SwapchainHandle;
pub use vulkan_texture::{Texture, TextureView};

/// Handle family of the Vulkan backend
///
/// Resources are reference counted so command buffers can keep them alive
/// until the GPU is done with them.
pub struct VulkanApi;

impl Api for VulkanApi {
    type Buffer = Arc<Buffer>;
    type Texture = Arc<Texture>;
    type TextureView = Arc<TextureView>;
    type Sampler = Arc<Sampler>;
    type ShaderModule = Arc<ShaderModule>;
    type BindGroupLayout = Arc<BindGroupLayout>;
    type PipelineLayout = Arc<PipelineLayout>;
}
