/// CommandEncoder / RenderPass / CommandBuffer - caller-facing recording
///
/// A `RenderPass` mutably borrows its encoder, so nothing else can be
/// recorded and `finish()` cannot be called until the pass ends, either
/// through `end()` or by dropping the scope.

use lumen_rhi::lumen::render::{
    ApiPreference, Extent3D, ImageCopyBuffer, ImageCopyTexture, IndexFormat, Rect2D, RenderPassDesc,
    ResourceMap, ShaderStages, Viewport,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::rhi_warn;
use lumen_rhi_gl as gl;
use lumen_rhi_vulkan as vulkan;

use crate::handle::{backend_mismatch, dispatch, BindGroup, Buffer, LumenApi, RenderPipeline, ToGl, ToVulkan};

// ============================================================================
// CommandEncoder
// ============================================================================

/// Records commands for one submission
pub enum CommandEncoder {
    Vulkan(vulkan::CommandEncoder),
    Gl(gl::CommandEncoder),
}

impl CommandEncoder {
    pub fn api(&self) -> ApiPreference {
        match self {
            CommandEncoder::Vulkan(_) => ApiPreference::Vulkan,
            CommandEncoder::Gl(_) => ApiPreference::Gl,
        }
    }

    /// Begin a render pass; viewport and scissor cover the attachments
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, LumenApi>) -> Result<RenderPass<'_>> {
        match self {
            CommandEncoder::Vulkan(encoder) => encoder.begin_render_pass(&desc.map(&ToVulkan)?)?,
            CommandEncoder::Gl(encoder) => encoder.begin_render_pass(&desc.map(&ToGl)?)?,
        }
        Ok(RenderPass { encoder: self, ended: false })
    }

    fn end_render_pass(&mut self) -> Result<()> {
        dispatch!(self, encoder => encoder.end_render_pass())
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Buffer,
        source_offset: u64,
        destination: &Buffer,
        destination_offset: u64,
        size: u64,
    ) -> Result<()> {
        match self {
            CommandEncoder::Vulkan(encoder) => encoder.copy_buffer_to_buffer(
                ToVulkan.buffer(source)?,
                source_offset,
                ToVulkan.buffer(destination)?,
                destination_offset,
                size,
            ),
            CommandEncoder::Gl(encoder) => encoder.copy_buffer_to_buffer(
                ToGl.buffer(source)?,
                source_offset,
                ToGl.buffer(destination)?,
                destination_offset,
                size,
            ),
        }
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        source: &ImageCopyBuffer<'_, LumenApi>,
        destination: &ImageCopyTexture<'_, LumenApi>,
        size: Extent3D,
    ) -> Result<()> {
        match self {
            CommandEncoder::Vulkan(encoder) => {
                encoder.copy_buffer_to_texture(&source.map(&ToVulkan)?, &destination.map(&ToVulkan)?, size)
            }
            CommandEncoder::Gl(encoder) => {
                encoder.copy_buffer_to_texture(&source.map(&ToGl)?, &destination.map(&ToGl)?, size)
            }
        }
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        source: &ImageCopyTexture<'_, LumenApi>,
        destination: &ImageCopyBuffer<'_, LumenApi>,
        size: Extent3D,
    ) -> Result<()> {
        match self {
            CommandEncoder::Vulkan(encoder) => {
                encoder.copy_texture_to_buffer(&source.map(&ToVulkan)?, &destination.map(&ToVulkan)?, size)
            }
            CommandEncoder::Gl(encoder) => {
                encoder.copy_texture_to_buffer(&source.map(&ToGl)?, &destination.map(&ToGl)?, size)
            }
        }
    }

    /// End recording
    pub fn finish(self) -> Result<CommandBuffer> {
        match self {
            CommandEncoder::Vulkan(encoder) => encoder.finish().map(CommandBuffer::Vulkan),
            CommandEncoder::Gl(encoder) => encoder.finish().map(CommandBuffer::Gl),
        }
    }
}

// ============================================================================
// RenderPass
// ============================================================================

/// Open render pass; ends on `end()` or drop
pub struct RenderPass<'e> {
    encoder: &'e mut CommandEncoder,
    ended: bool,
}

impl RenderPass<'_> {
    pub fn set_pipeline(&mut self, pipeline: &RenderPipeline) -> Result<()> {
        match (&mut *self.encoder, pipeline) {
            (CommandEncoder::Vulkan(encoder), RenderPipeline::Vulkan(pipeline)) => encoder.set_pipeline(pipeline),
            (CommandEncoder::Gl(encoder), RenderPipeline::Gl(pipeline)) => encoder.set_pipeline(pipeline),
            (encoder, pipeline) => Err(backend_mismatch("RenderPipeline", pipeline.api(), encoder.api())),
        }
    }

    pub fn set_bind_group(&mut self, index: u32, group: &BindGroup, dynamic_offsets: &[u32]) -> Result<()> {
        match (&mut *self.encoder, group) {
            (CommandEncoder::Vulkan(encoder), BindGroup::Vulkan(group)) => {
                encoder.set_bind_group(index, group, dynamic_offsets)
            }
            (CommandEncoder::Gl(encoder), BindGroup::Gl(group)) => encoder.set_bind_group(index, group, dynamic_offsets),
            (encoder, group) => Err(backend_mismatch("BindGroup", group.api(), encoder.api())),
        }
    }

    /// Bind `size` bytes (the rest of the buffer when `None`) at `offset`
    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Buffer, offset: u64, size: Option<u64>) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.set_vertex_buffer(slot, ToVulkan.buffer(buffer)?, offset, size),
            CommandEncoder::Gl(encoder) => encoder.set_vertex_buffer(slot, ToGl.buffer(buffer)?, offset, size),
        }
    }

    pub fn set_index_buffer(&mut self, buffer: &Buffer, format: IndexFormat, offset: u64, size: Option<u64>) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.set_index_buffer(ToVulkan.buffer(buffer)?, format, offset, size),
            CommandEncoder::Gl(encoder) => encoder.set_index_buffer(ToGl.buffer(buffer)?, format, offset, size),
        }
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.set_viewport(viewport),
            CommandEncoder::Gl(encoder) => encoder.set_viewport(viewport),
        }
    }

    pub fn set_scissor(&mut self, rect: &Rect2D) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.set_scissor(rect),
            CommandEncoder::Gl(encoder) => encoder.set_scissor(rect),
        }
    }

    pub fn set_push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.set_push_constants(stages, offset, data),
            CommandEncoder::Gl(encoder) => encoder.set_push_constants(stages, offset, data),
        }
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => encoder.draw(vertex_count, instance_count, first_vertex, first_instance),
            CommandEncoder::Gl(encoder) => encoder.draw(vertex_count, instance_count, first_vertex, first_instance),
        }
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        match &mut *self.encoder {
            CommandEncoder::Vulkan(encoder) => {
                encoder.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance)
            }
            CommandEncoder::Gl(encoder) => {
                encoder.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance)
            }
        }
    }

    /// Close the pass
    pub fn end(mut self) -> Result<()> {
        self.ended = true;
        self.encoder.end_render_pass()
    }
}

impl Drop for RenderPass<'_> {
    fn drop(&mut self) {
        if !self.ended && self.encoder.end_render_pass().is_err() {
            rhi_warn!("lumen::device", "Render pass could not be closed on drop");
        }
    }
}

// ============================================================================
// CommandBuffer
// ============================================================================

/// Finished recording, ready for `Queue::submit`
pub enum CommandBuffer {
    Vulkan(vulkan::CommandBuffer),
    Gl(gl::CommandBuffer),
}

impl CommandBuffer {
    pub fn api(&self) -> ApiPreference {
        match self {
            CommandBuffer::Vulkan(_) => ApiPreference::Vulkan,
            CommandBuffer::Gl(_) => ApiPreference::Gl,
        }
    }

    /// Resources kept alive until the submission completes
    pub fn retained_count(&self) -> usize {
        dispatch!(self, buffer => buffer.retained_count())
    }
}
