/// CommandEncoder / CommandBuffer - Vulkan command recording
///
/// An encoder records straight into a primary command buffer. Inside a frame
/// the buffer comes from the frame slot's transient pool and is recycled with
/// the slot; outside a frame it comes from the upload pool and is freed when
/// the finished `CommandBuffer` is dropped.
///
/// Every resource a recorded command references is retained by the command
/// buffer until the submission using it has completed.

use ash::vk;
use lumen_rhi::lumen::render::{
    check_buffer_range, check_texture_region, common_attachment_extent, BufferUsage, Extent3D,
    ImageCopyBuffer, ImageCopyTexture, IndexFormat, LoadOp, Rect2D, RenderPassDesc,
    ShaderStages, TextureDimension, TextureUsage, Viewport,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::sync::Arc;

use crate::vulkan_binding::BindGroup;
use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    copy_aspect, index_format_to_vk, load_op_to_vk, sample_count_to_vk, shader_stages_to_vk,
    store_op_to_vk,
};
use crate::vulkan_pipeline::RenderPipeline;
use crate::vulkan_render_pass::{AttachmentKey, FramebufferObject, PassCache, PassKey, RenderPassObject};
use crate::vulkan_texture::{read_layout, write_layout, Texture, TextureView};
use crate::VulkanApi;

// ============================================================================
// Raw command buffer
// ============================================================================

/// Pool a command buffer was allocated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandOrigin {
    /// Frame slot pool of the frame with this serial
    Frame { serial: u64 },
    /// Upload pool (outside a frame, submitted immediately)
    Upload,
}

/// Native command buffer; upload-pool buffers are freed on drop
pub(crate) struct RawCommandBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::CommandBuffer,
    pub(crate) origin: CommandOrigin,
}

impl RawCommandBuffer {
    fn allocate(ctx: Arc<GpuContext>, pool: vk::CommandPool, origin: CommandOrigin) -> Result<Self> {
        let allocate_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            ctx.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to allocate command buffer: {:?}", e))?
        };
        let raw = buffers
            .first()
            .copied()
            .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "Command buffer allocation returned nothing"))?;
        Ok(Self { ctx, raw, origin })
    }
}

impl Drop for RawCommandBuffer {
    fn drop(&mut self) {
        // Frame buffers die with their pool's reset
        if self.origin == CommandOrigin::Upload {
            if let Ok(pool) = self.ctx.upload_command_pool.lock() {
                unsafe {
                    self.ctx.device.free_command_buffers(*pool, &[self.raw]);
                }
            }
        }
    }
}

/// Resource kept alive by a command buffer; only ever dropped, never read
pub(crate) enum Retained {
    Buffer { _buffer: Arc<Buffer> },
    Texture { _texture: Arc<Texture> },
    View { _view: Arc<TextureView> },
    BindGroup { _group: Arc<BindGroup> },
    Pipeline { _pipeline: Arc<RenderPipeline> },
    RenderPass { _render_pass: Arc<RenderPassObject> },
    Framebuffer { _framebuffer: Arc<FramebufferObject> },
}

/// Record an image layout transition
#[allow(clippy::too_many_arguments)]
pub(crate) fn image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src: (vk::PipelineStageFlags, vk::AccessFlags),
    dst: (vk::PipelineStageFlags, vk::AccessFlags),
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src.1)
        .dst_access_mask(dst.1);
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src.0,
            dst.0,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Stage/access pair that waits on whatever last touched an image in `layout`
fn last_use(layout: vk::ImageLayout) -> (vk::PipelineStageFlags, vk::AccessFlags) {
    if layout == vk::ImageLayout::UNDEFINED {
        (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty())
    } else {
        (vk::PipelineStageFlags::ALL_COMMANDS, vk::AccessFlags::MEMORY_WRITE)
    }
}

const SHADER_READ: (vk::PipelineStageFlags, vk::AccessFlags) = (
    vk::PipelineStageFlags::from_raw(
        vk::PipelineStageFlags::VERTEX_SHADER.as_raw() | vk::PipelineStageFlags::FRAGMENT_SHADER.as_raw(),
    ),
    vk::AccessFlags::SHADER_READ,
);

// ============================================================================
// Render pass state
// ============================================================================

struct BoundGroup {
    group: Arc<BindGroup>,
    dynamic_offsets: Vec<u32>,
    dirty: bool,
}

struct PendingPushConstants {
    stages: ShaderStages,
    offset: u32,
    data: Vec<u8>,
}

/// State of the open render pass
struct PassState {
    color_formats: Vec<vk::Format>,
    depth_format: Option<vk::Format>,
    sample_count: u32,
    pipeline: Option<Arc<RenderPipeline>>,
    bind_groups: Vec<Option<BoundGroup>>,
    push_constants: Vec<PendingPushConstants>,
    index_format: Option<IndexFormat>,
    /// Bit N set when vertex buffer slot N is bound
    vertex_slots: u64,
}

// ============================================================================
// CommandEncoder
// ============================================================================

/// Vulkan command encoder implementation
pub struct CommandEncoder {
    ctx: Arc<GpuContext>,
    pass_cache: Arc<PassCache>,
    raw: RawCommandBuffer,
    retained: Vec<Retained>,
    pass: Option<PassState>,
}

impl CommandEncoder {
    /// Start recording a buffer allocated from `pool`
    ///
    /// For `CommandOrigin::Upload` the pool must be the context's upload pool.
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pass_cache: Arc<PassCache>,
        pool: vk::CommandPool,
        origin: CommandOrigin,
    ) -> Result<Self> {
        let raw = RawCommandBuffer::allocate(Arc::clone(&ctx), pool, origin)?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            ctx.device.begin_command_buffer(raw.raw, &begin_info)
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to begin command buffer: {:?}", e))?;
        }
        Ok(Self {
            ctx,
            pass_cache,
            raw,
            retained: Vec::new(),
            pass: None,
        })
    }

    fn cmd(&self) -> vk::CommandBuffer {
        self.raw.raw
    }

    fn pass_mut(&mut self, operation: &str) -> Result<&mut PassState> {
        self.pass.as_mut().ok_or_else(|| {
            rhi_err!(InvalidUsage, "lumen::vulkan", "{} called outside a render pass", operation)
        })
    }

    fn require_outside_pass(&self, operation: &str) -> Result<()> {
        if self.pass.is_some() {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "{} called inside a render pass", operation);
        }
        Ok(())
    }

    pub fn in_render_pass(&self) -> bool {
        self.pass.is_some()
    }

    // ===== Render passes =====

    /// Begin a render pass over the described attachments
    ///
    /// Viewport and scissor cover the whole attachment extent.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, VulkanApi>) -> Result<()> {
        self.require_outside_pass("begin_render_pass")?;

        let extent = common_attachment_extent(
            desc.color_attachments
                .iter()
                .map(|attachment| attachment.view.extent())
                .chain(desc.depth_stencil_attachment.iter().map(|attachment| attachment.view.extent())),
        )
        .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let mut colors = Vec::with_capacity(desc.color_attachments.len());
        let mut attachments = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut clear_values = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut views: Vec<Arc<TextureView>> = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut final_layouts = Vec::with_capacity(desc.color_attachments.len() + 1);
        let mut targets_surface = false;
        let mut sample_count = None;

        for (index, attachment) in desc.color_attachments.iter().enumerate() {
            let view = attachment.view;
            if view.format().is_depth() {
                rhi_bail!(InvalidUsage, "lumen::vulkan", "Color attachment {} has depth format {:?}", index, view.format());
            }
            if !view.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                rhi_bail!(InvalidUsage, "lumen::vulkan", "Color attachment {} lacks RENDER_ATTACHMENT usage", index);
            }
            Self::check_sample_count(&mut sample_count, view.sample_count())?;
            targets_surface |= view.is_surface();

            let initial_layout = if attachment.ops.is_load() {
                read_layout(&view.layout)
            } else {
                vk::ImageLayout::UNDEFINED
            };
            let final_layout = if view.is_surface() {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else if view.usage().contains(TextureUsage::TEXTURE_BINDING) {
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            } else {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            };

            colors.push(AttachmentKey {
                format: view.vk_format,
                samples: sample_count_to_vk(view.sample_count()),
                load_op: load_op_to_vk(&attachment.ops.load),
                store_op: store_op_to_vk(attachment.ops.store),
                stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                initial_layout,
                final_layout,
            });
            let clear = match attachment.ops.load {
                LoadOp::Clear(color) => color.to_f32_array(),
                _ => [0.0; 4],
            };
            clear_values.push(vk::ClearValue { color: vk::ClearColorValue { float32: clear } });
            attachments.push((view.id(), view.raw));
            final_layouts.push(final_layout);
            views.push(Arc::clone(view));
        }

        let depth_stencil = match &desc.depth_stencil_attachment {
            Some(attachment) => {
                let view = attachment.view;
                if !view.format().is_depth() {
                    rhi_bail!(InvalidUsage, "lumen::vulkan", "Depth attachment has color format {:?}", view.format());
                }
                if !view.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                    rhi_bail!(InvalidUsage, "lumen::vulkan", "Depth attachment lacks RENDER_ATTACHMENT usage");
                }
                Self::check_sample_count(&mut sample_count, view.sample_count())?;

                // No operations means the aspect is left untouched
                let (depth_load, depth_store, depth_clear) = match &attachment.depth_ops {
                    Some(ops) => (
                        load_op_to_vk(&ops.load),
                        store_op_to_vk(ops.store),
                        match ops.load {
                            LoadOp::Clear(depth) => depth,
                            _ => 1.0,
                        },
                    ),
                    None => (vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE, 1.0),
                };
                let (stencil_load, stencil_store, stencil_clear) = match (&attachment.stencil_ops, view.format().has_stencil()) {
                    (_, false) => (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE, 0),
                    (Some(ops), true) => (
                        load_op_to_vk(&ops.load),
                        store_op_to_vk(ops.store),
                        match ops.load {
                            LoadOp::Clear(stencil) => stencil,
                            _ => 0,
                        },
                    ),
                    (None, true) => (vk::AttachmentLoadOp::LOAD, vk::AttachmentStoreOp::STORE, 0),
                };

                let initial_layout = if depth_load == vk::AttachmentLoadOp::LOAD || stencil_load == vk::AttachmentLoadOp::LOAD {
                    read_layout(&view.layout)
                } else {
                    vk::ImageLayout::UNDEFINED
                };
                let final_layout = if view.usage().contains(TextureUsage::TEXTURE_BINDING) {
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
                } else {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                };

                clear_values.push(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue { depth: depth_clear, stencil: stencil_clear },
                });
                attachments.push((view.id(), view.raw));
                final_layouts.push(final_layout);
                views.push(Arc::clone(view));

                Some(AttachmentKey {
                    format: view.vk_format,
                    samples: sample_count_to_vk(view.sample_count()),
                    load_op: depth_load,
                    store_op: depth_store,
                    stencil_load_op: stencil_load,
                    stencil_store_op: stencil_store,
                    initial_layout,
                    final_layout,
                })
            }
            None => None,
        };

        let key = PassKey { colors, depth_stencil };
        let view_ids: Vec<_> = attachments.iter().map(|(id, _)| *id).collect();
        let render_pass = self.pass_cache.render_pass(&key, &view_ids, targets_surface)?;
        let framebuffer = self.pass_cache.framebuffer(&render_pass, &attachments, extent)?;

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D { width: extent.width, height: extent.height },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.raw)
            .framebuffer(framebuffer.raw)
            .render_area(render_area)
            .clear_values(&clear_values);

        unsafe {
            self.ctx.device.cmd_begin_render_pass(self.cmd(), &begin_info, vk::SubpassContents::INLINE);
            self.ctx.device.cmd_set_viewport(self.cmd(), 0, &[vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }]);
            self.ctx.device.cmd_set_scissor(self.cmd(), 0, &[render_area]);
        }

        // Layouts as they will be once the pass has executed
        for (view, layout) in views.iter().zip(&final_layouts) {
            write_layout(&view.layout, *layout);
        }

        self.pass = Some(PassState {
            color_formats: key.colors.iter().map(|color| color.format).collect(),
            depth_format: key.depth_stencil.map(|depth| depth.format),
            sample_count: sample_count.unwrap_or(1),
            pipeline: None,
            bind_groups: Vec::new(),
            push_constants: Vec::new(),
            index_format: None,
            vertex_slots: 0,
        });
        self.retained.push(Retained::RenderPass { _render_pass: render_pass });
        self.retained.push(Retained::Framebuffer { _framebuffer: framebuffer });
        self.retained.extend(views.into_iter().map(|view| Retained::View { _view: view }));
        Ok(())
    }

    fn check_sample_count(common: &mut Option<u32>, count: u32) -> Result<()> {
        match *common {
            Some(expected) if expected != count => {
                rhi_bail!(InvalidUsage, "lumen::vulkan", "Attachments mix sample counts {} and {}", expected, count);
            }
            _ => *common = Some(count),
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        if self.pass.take().is_none() {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "end_render_pass called outside a render pass");
        }
        unsafe {
            self.ctx.device.cmd_end_render_pass(self.cmd());
        }
        Ok(())
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<RenderPipeline>) -> Result<()> {
        let cmd = self.cmd();
        let pass = self.pass_mut("set_pipeline")?;
        if pipeline.color_formats != pass.color_formats
            || pipeline.depth_format != pass.depth_format
            || pipeline.sample_count != pass.sample_count
        {
            rhi_bail!(
                InvalidUsage,
                "lumen::vulkan",
                "Pipeline targets {:?}/{:?} x{} but the pass has {:?}/{:?} x{}",
                pipeline.color_formats,
                pipeline.depth_format,
                pipeline.sample_count,
                pass.color_formats,
                pass.depth_format,
                pass.sample_count
            );
        }
        pass.pipeline = Some(Arc::clone(pipeline));
        // Sets bound under a different layout must be re-bound
        for group in pass.bind_groups.iter_mut().flatten() {
            group.dirty = true;
        }
        unsafe {
            self.ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline.raw);
        }
        self.retained.push(Retained::Pipeline { _pipeline: Arc::clone(pipeline) });
        Ok(())
    }

    pub fn set_bind_group(&mut self, index: u32, group: &Arc<BindGroup>, dynamic_offsets: &[u32]) -> Result<()> {
        let pass = self.pass_mut("set_bind_group")?;
        if dynamic_offsets.len() != group.dynamic_offset_count() {
            rhi_bail!(
                InvalidUsage,
                "lumen::vulkan",
                "Bind group {} needs {} dynamic offsets, got {}",
                index,
                group.dynamic_offset_count(),
                dynamic_offsets.len()
            );
        }
        let slot = index as usize;
        if pass.bind_groups.len() <= slot {
            pass.bind_groups.resize_with(slot + 1, || None);
        }
        pass.bind_groups[slot] = Some(BoundGroup {
            group: Arc::clone(group),
            dynamic_offsets: dynamic_offsets.to_vec(),
            dirty: true,
        });
        self.retained.push(Retained::BindGroup { _group: Arc::clone(group) });
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64, size: Option<u64>) -> Result<()> {
        let cmd = self.cmd();
        let pass = self.pass_mut("set_vertex_buffer")?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Vertex buffer at slot {} lacks VERTEX usage", slot);
        }
        if slot >= 64 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Vertex buffer slot {} out of range", slot);
        }
        let len = size.unwrap_or(buffer.size().saturating_sub(offset));
        check_buffer_range(buffer.size(), offset, len)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        pass.vertex_slots |= 1 << slot;
        unsafe {
            self.ctx.device.cmd_bind_vertex_buffers(cmd, slot, &[buffer.raw], &[offset]);
        }
        self.retained.push(Retained::Buffer { _buffer: Arc::clone(buffer) });
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64, size: Option<u64>) -> Result<()> {
        let cmd = self.cmd();
        let pass = self.pass_mut("set_index_buffer")?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Index buffer lacks INDEX usage");
        }
        if offset % format.size_bytes() as u64 != 0 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Index buffer offset {} is not aligned to {:?}", offset, format);
        }
        let len = size.unwrap_or(buffer.size().saturating_sub(offset));
        check_buffer_range(buffer.size(), offset, len)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        pass.index_format = Some(format);
        unsafe {
            self.ctx.device.cmd_bind_index_buffer(cmd, buffer.raw, offset, index_format_to_vk(format));
        }
        self.retained.push(Retained::Buffer { _buffer: Arc::clone(buffer) });
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        let cmd = self.cmd();
        self.pass_mut("set_viewport")?;
        unsafe {
            self.ctx.device.cmd_set_viewport(cmd, 0, &[vk::Viewport {
                x: viewport.x,
                y: viewport.y,
                width: viewport.width,
                height: viewport.height,
                min_depth: viewport.min_depth,
                max_depth: viewport.max_depth,
            }]);
        }
        Ok(())
    }

    pub fn set_scissor(&mut self, rect: &Rect2D) -> Result<()> {
        let cmd = self.cmd();
        self.pass_mut("set_scissor")?;
        if rect.x < 0 || rect.y < 0 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Scissor offset ({}, {}) is negative", rect.x, rect.y);
        }
        unsafe {
            self.ctx.device.cmd_set_scissor(cmd, 0, &[vk::Rect2D {
                offset: vk::Offset2D { x: rect.x, y: rect.y },
                extent: vk::Extent2D { width: rect.width, height: rect.height },
            }]);
        }
        Ok(())
    }

    /// Queue push constant bytes; they are written at the next draw
    pub fn set_push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> Result<()> {
        let pass = self.pass_mut("set_push_constants")?;
        if data.is_empty() || offset % 4 != 0 || data.len() % 4 != 0 {
            rhi_bail!(
                InvalidUsage,
                "lumen::vulkan",
                "Push constants need a non-empty, 4-byte aligned range (offset {}, {} bytes)",
                offset,
                data.len()
            );
        }
        pass.push_constants.push(PendingPushConstants { stages, offset, data: data.to_vec() });
        Ok(())
    }

    /// Bind dirty sets and write queued push constants for the current pipeline
    fn flush_draw_state(&mut self, indexed: bool) -> Result<()> {
        let cmd = self.cmd();
        let device = self.ctx.device.clone();
        let pass = self.pass_mut("draw")?;
        let pipeline = match &pass.pipeline {
            Some(pipeline) => Arc::clone(pipeline),
            None => rhi_bail!(InvalidUsage, "lumen::vulkan", "Draw without a pipeline"),
        };
        if indexed && pass.index_format.is_none() {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Indexed draw without an index buffer");
        }
        let required_slots = pipeline.vertex_buffer_count();
        if required_slots > 0 {
            let mask = if required_slots >= 64 { u64::MAX } else { (1u64 << required_slots) - 1 };
            if pass.vertex_slots & mask != mask {
                rhi_bail!(InvalidUsage, "lumen::vulkan", "Pipeline reads {} vertex buffers but not all are bound", required_slots);
            }
        }

        let layout = pipeline.layout();
        for (index, bound) in pass.bind_groups.iter_mut().enumerate() {
            let Some(bound) = bound.as_mut().filter(|bound| bound.dirty) else {
                continue;
            };
            let expected = layout.bind_group_layouts.get(index).ok_or_else(|| {
                rhi_err!(InvalidUsage, "lumen::vulkan", "Bind group {} is beyond the pipeline layout", index)
            })?;
            if !Arc::ptr_eq(bound.group.layout(), expected)
                && bound.group.layout().desc().entries != expected.desc().entries
            {
                rhi_bail!(InvalidUsage, "lumen::vulkan", "Bind group {} does not match the pipeline layout", index);
            }
            unsafe {
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout.raw,
                    index as u32,
                    &[bound.group.raw],
                    &bound.dynamic_offsets,
                );
            }
            bound.dirty = false;
        }

        for pending in pass.push_constants.drain(..) {
            let end = u64::from(pending.offset) + pending.data.len() as u64;
            let covering = layout
                .push_constant_ranges()
                .iter()
                .filter(|range| u64::from(range.offset) < end && u64::from(pending.offset) < range.end())
                .fold(ShaderStages::empty(), |stages, range| stages | range.stages);
            if end > u64::from(layout.push_constant_size()) || !covering.contains(pending.stages) {
                rhi_bail!(
                    InvalidUsage,
                    "lumen::vulkan",
                    "Push constants [{}, {}) for {:?} are not covered by the pipeline layout",
                    pending.offset,
                    end,
                    pending.stages
                );
            }
            unsafe {
                device.cmd_push_constants(cmd, layout.raw, shader_stages_to_vk(covering), pending.offset, &pending.data);
            }
        }
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.flush_draw_state(false)?;
        unsafe {
            self.ctx.device.cmd_draw(self.cmd(), vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.flush_draw_state(true)?;
        unsafe {
            self.ctx.device.cmd_draw_indexed(self.cmd(), index_count, instance_count, first_index, base_vertex, first_instance);
        }
        Ok(())
    }

    // ===== Copies =====

    /// Make transfer writes visible to every later reader, host included
    fn transfer_write_barrier(&self) {
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(
                vk::AccessFlags::HOST_READ
                    | vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                    | vk::AccessFlags::INDEX_READ
                    | vk::AccessFlags::UNIFORM_READ
                    | vk::AccessFlags::SHADER_READ
                    | vk::AccessFlags::TRANSFER_READ,
            );
        unsafe {
            self.ctx.device.cmd_pipeline_barrier(
                self.cmd(),
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST
                    | vk::PipelineStageFlags::VERTEX_INPUT
                    | vk::PipelineStageFlags::VERTEX_SHADER
                    | vk::PipelineStageFlags::FRAGMENT_SHADER
                    | vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[barrier],
                &[],
                &[],
            );
        }
    }

    pub fn copy_buffer_to_buffer(
        &mut self,
        source: &Arc<Buffer>,
        source_offset: u64,
        destination: &Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.require_outside_pass("copy_buffer_to_buffer")?;
        if !source.usage().contains(BufferUsage::COPY_SRC) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy source buffer lacks COPY_SRC usage");
        }
        if !destination.usage().contains(BufferUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy destination buffer lacks COPY_DST usage");
        }
        if size == 0 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Buffer copy of 0 bytes");
        }
        check_buffer_range(source.size(), source_offset, size)
            .and_then(|_| check_buffer_range(destination.size(), destination_offset, size))
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let region = vk::BufferCopy { src_offset: source_offset, dst_offset: destination_offset, size };
        unsafe {
            self.ctx.device.cmd_copy_buffer(self.cmd(), source.raw, destination.raw, &[region]);
        }
        self.transfer_write_barrier();
        self.retained.push(Retained::Buffer { _buffer: Arc::clone(source) });
        self.retained.push(Retained::Buffer { _buffer: Arc::clone(destination) });
        Ok(())
    }

    /// Validate a buffer/texture copy and build its region
    fn image_copy_region(
        buffer: &ImageCopyBuffer<'_, VulkanApi>,
        texture: &ImageCopyTexture<'_, VulkanApi>,
        size: Extent3D,
    ) -> Result<vk::BufferImageCopy> {
        let desc = texture.texture.desc();
        if desc.sample_count != 1 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Multisampled textures cannot be copied through a buffer");
        }
        buffer
            .layout
            .required_bytes(desc.format, size)
            .and_then(|bytes| check_buffer_range(buffer.buffer.size(), buffer.layout.offset, bytes))
            .and_then(|_| check_texture_region(desc, texture.mip_level, texture.origin, size))
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        let texel = desc.format.texel_size().unwrap_or(4) as u64;
        let alignment = if desc.format.is_depth() { 4 } else { texel };
        if buffer.layout.offset % alignment != 0 {
            rhi_bail!(
                InvalidUsage,
                "lumen::vulkan",
                "Buffer offset {} is not a multiple of {} for {:?}",
                buffer.layout.offset,
                alignment,
                desc.format
            );
        }

        let is_3d = desc.dimension == TextureDimension::D3;
        Ok(vk::BufferImageCopy {
            buffer_offset: buffer.layout.offset,
            buffer_row_length: buffer.layout.row_length_texels(desc.format),
            buffer_image_height: buffer.layout.rows_per_image.unwrap_or(0),
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: copy_aspect(desc.format),
                mip_level: texture.mip_level,
                base_array_layer: if is_3d { 0 } else { texture.origin.z },
                layer_count: if is_3d { 1 } else { size.depth_or_array_layers },
            },
            image_offset: vk::Offset3D {
                x: texture.origin.x as i32,
                y: texture.origin.y as i32,
                z: if is_3d { texture.origin.z as i32 } else { 0 },
            },
            image_extent: vk::Extent3D {
                width: size.width,
                height: size.height,
                depth: if is_3d { size.depth_or_array_layers } else { 1 },
            },
        })
    }

    /// Transition a copied texture to where it is read next
    fn after_copy(&self, texture: &Texture, from: vk::ImageLayout, access: vk::AccessFlags) {
        if texture.desc().usage.contains(TextureUsage::TEXTURE_BINDING) {
            image_barrier(
                &self.ctx.device,
                self.cmd(),
                texture.raw,
                texture.full_range(),
                from,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                (vk::PipelineStageFlags::TRANSFER, access),
                SHADER_READ,
            );
            write_layout(&texture.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        } else {
            write_layout(&texture.layout, from);
        }
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        source: &ImageCopyBuffer<'_, VulkanApi>,
        destination: &ImageCopyTexture<'_, VulkanApi>,
        size: Extent3D,
    ) -> Result<()> {
        self.require_outside_pass("copy_buffer_to_texture")?;
        if !source.buffer.usage().contains(BufferUsage::COPY_SRC) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy source buffer lacks COPY_SRC usage");
        }
        if !destination.texture.desc().usage.contains(TextureUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy destination texture lacks COPY_DST usage");
        }
        let region = Self::image_copy_region(source, destination, size)?;

        let texture = destination.texture;
        let old_layout = read_layout(&texture.layout);
        image_barrier(
            &self.ctx.device,
            self.cmd(),
            texture.raw,
            texture.full_range(),
            old_layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            last_use(old_layout),
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE),
        );
        unsafe {
            self.ctx.device.cmd_copy_buffer_to_image(
                self.cmd(),
                source.buffer.raw,
                texture.raw,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        self.after_copy(texture, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::AccessFlags::TRANSFER_WRITE);

        self.retained.push(Retained::Buffer { _buffer: Arc::clone(source.buffer) });
        self.retained.push(Retained::Texture { _texture: Arc::clone(texture) });
        Ok(())
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        source: &ImageCopyTexture<'_, VulkanApi>,
        destination: &ImageCopyBuffer<'_, VulkanApi>,
        size: Extent3D,
    ) -> Result<()> {
        self.require_outside_pass("copy_texture_to_buffer")?;
        if !source.texture.desc().usage.contains(TextureUsage::COPY_SRC) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy source texture lacks COPY_SRC usage");
        }
        if !destination.buffer.usage().contains(BufferUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Copy destination buffer lacks COPY_DST usage");
        }
        let region = Self::image_copy_region(destination, source, size)?;

        let texture = source.texture;
        let old_layout = read_layout(&texture.layout);
        image_barrier(
            &self.ctx.device,
            self.cmd(),
            texture.raw,
            texture.full_range(),
            old_layout,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            last_use(old_layout),
            (vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_READ),
        );
        unsafe {
            self.ctx.device.cmd_copy_image_to_buffer(
                self.cmd(),
                texture.raw,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                destination.buffer.raw,
                &[region],
            );
        }
        self.transfer_write_barrier();
        self.after_copy(texture, vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::AccessFlags::empty());

        self.retained.push(Retained::Texture { _texture: Arc::clone(texture) });
        self.retained.push(Retained::Buffer { _buffer: Arc::clone(destination.buffer) });
        Ok(())
    }

    /// Move a swapchain image from its tracked layout to PRESENT_SRC
    pub(crate) fn transition_for_present(&mut self, view: &Arc<TextureView>) {
        let old_layout = read_layout(&view.layout);
        image_barrier(
            &self.ctx.device,
            self.cmd(),
            view.image,
            view.full_range,
            old_layout,
            vk::ImageLayout::PRESENT_SRC_KHR,
            (vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT, vk::AccessFlags::COLOR_ATTACHMENT_WRITE),
            (vk::PipelineStageFlags::BOTTOM_OF_PIPE, vk::AccessFlags::empty()),
        );
        write_layout(&view.layout, vk::ImageLayout::PRESENT_SRC_KHR);
        self.retained.push(Retained::View { _view: Arc::clone(view) });
    }

    /// End recording
    pub fn finish(self) -> Result<CommandBuffer> {
        if self.pass.is_some() {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "finish() called with an open render pass");
        }
        unsafe {
            self.ctx.device.end_command_buffer(self.raw.raw)
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to end command buffer: {:?}", e))?;
        }
        Ok(CommandBuffer {
            raw: self.raw,
            retained: self.retained,
        })
    }
}

// ============================================================================
// CommandBuffer
// ============================================================================

/// Finished command buffer, ready for `Queue::submit`
pub struct CommandBuffer {
    pub(crate) raw: RawCommandBuffer,
    retained: Vec<Retained>,
}

impl CommandBuffer {
    pub(crate) fn origin(&self) -> CommandOrigin {
        self.raw.origin
    }

    /// Number of resources kept alive until the buffer's submission completes
    pub fn retained_count(&self) -> usize {
        self.retained.len()
    }
}

#[cfg(test)]
#[path = "vulkan_command_tests.rs"]
mod tests;
