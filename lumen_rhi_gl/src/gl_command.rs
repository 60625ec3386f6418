/// CommandEncoder / CommandBuffer - GL command lists
///
/// GL has no command buffers: the encoder validates each call and appends a
/// `Command` to a list, and `Queue::submit` replays the list on the context.
/// Commands hold the resources they use, so a finished buffer keeps them
/// alive until it has been replayed and dropped.

use glow::HasContext;
use lumen_rhi::lumen::render::{
    check_buffer_range, check_texture_region, common_attachment_extent, BufferUsage, Extent2D,
    Extent3D, ImageCopyBuffer, ImageCopyTexture, ImageDataLayout, IndexFormat, LoadOp, Origin3D,
    Rect2D, RenderPassDesc, ShaderStages, StoreOp, TextureFormat, TextureUsage, Viewport,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::sync::Arc;

use crate::gl_binding::BindGroup;
use crate::gl_buffer::Buffer;
use crate::gl_context::{GlContext, PUSH_CONSTANT_BINDING};
use crate::gl_format::index_format_to_gl;
use crate::gl_framebuffer::{FramebufferCache, FramebufferKey};
use crate::gl_pipeline::{RenderPipeline, VertexBinding};
use crate::gl_texture::{Texture, TextureView};
use crate::GlApi;

/// Where a command list was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandOrigin {
    /// Inside the frame with this serial
    Frame { serial: u64 },
    /// Outside any frame
    Upload,
}

// ============================================================================
// Commands
// ============================================================================

/// Clear applied when a pass begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ClearOp {
    Color { draw_buffer: u32, value: [f32; 4] },
    Depth(f32),
    Stencil(u32),
    DepthStencil(f32, u32),
}

pub(crate) enum Command {
    BeginPass {
        /// `None` is the default framebuffer
        framebuffer: Option<glow::Framebuffer>,
        extent: Extent2D,
        clears: Vec<ClearOp>,
        /// Attachments whose contents are discarded at the end of the pass
        discards: Vec<u32>,
        views: Vec<Arc<TextureView>>,
    },
    EndPass,
    SetPipeline(Arc<RenderPipeline>),
    SetBindGroup {
        group: Arc<BindGroup>,
        dynamic_offsets: Vec<u32>,
    },
    SetVertexBuffer {
        slot: u32,
        buffer: Arc<Buffer>,
        offset: u64,
    },
    SetIndexBuffer {
        buffer: Arc<Buffer>,
        format: IndexFormat,
        offset: u64,
    },
    SetViewport(Viewport),
    SetScissor(Rect2D),
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    CopyBufferToBuffer {
        source: Arc<Buffer>,
        source_offset: u64,
        destination: Arc<Buffer>,
        destination_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        source: Arc<Buffer>,
        layout: ImageDataLayout,
        destination: Arc<Texture>,
        mip_level: u32,
        origin: Origin3D,
        size: Extent3D,
    },
    CopyTextureToBuffer {
        source: Arc<Texture>,
        mip_level: u32,
        origin: Origin3D,
        destination: Arc<Buffer>,
        layout: ImageDataLayout,
        size: Extent3D,
    },
}

impl Command {
    /// Number of resources the command keeps alive
    fn retained(&self) -> usize {
        match self {
            Command::BeginPass { views, .. } => views.len(),
            Command::SetPipeline(_)
            | Command::SetBindGroup { .. }
            | Command::SetVertexBuffer { .. }
            | Command::SetIndexBuffer { .. } => 1,
            Command::CopyBufferToBuffer { .. }
            | Command::CopyBufferToTexture { .. }
            | Command::CopyTextureToBuffer { .. } => 2,
            _ => 0,
        }
    }
}

// ============================================================================
// Render pass state
// ============================================================================

struct PendingPushConstants {
    stages: ShaderStages,
    offset: u32,
    data: Vec<u8>,
}

/// State of the open render pass
struct PassState {
    color_formats: Vec<TextureFormat>,
    depth_format: Option<TextureFormat>,
    sample_count: u32,
    pipeline: Option<Arc<RenderPipeline>>,
    bind_groups: Vec<Option<Arc<BindGroup>>>,
    push_constants: Vec<PendingPushConstants>,
    index_format: Option<IndexFormat>,
    /// Bit N set when vertex buffer slot N is bound
    vertex_slots: u64,
}

// ============================================================================
// CommandEncoder
// ============================================================================

/// GL command encoder implementation
pub struct CommandEncoder {
    fbo_cache: Arc<FramebufferCache>,
    origin: CommandOrigin,
    commands: Vec<Command>,
    pass: Option<PassState>,
}

impl CommandEncoder {
    pub(crate) fn new(fbo_cache: Arc<FramebufferCache>, origin: CommandOrigin) -> Self {
        Self {
            fbo_cache,
            origin,
            commands: Vec::new(),
            pass: None,
        }
    }

    fn pass_mut(&mut self, operation: &str) -> Result<&mut PassState> {
        self.pass.as_mut().ok_or_else(|| {
            rhi_err!(InvalidUsage, "lumen::gl", "{} called outside a render pass", operation)
        })
    }

    fn require_outside_pass(&self, operation: &str) -> Result<()> {
        if self.pass.is_some() {
            rhi_bail!(InvalidUsage, "lumen::gl", "{} called inside a render pass", operation);
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
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_, GlApi>) -> Result<()> {
        self.require_outside_pass("begin_render_pass")?;

        let extent = common_attachment_extent(
            desc.color_attachments
                .iter()
                .map(|attachment| attachment.view.extent())
                .chain(desc.depth_stencil_attachment.iter().map(|attachment| attachment.view.extent())),
        )
        .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;

        let mut clears = Vec::new();
        let mut discards = Vec::new();
        let mut views: Vec<Arc<TextureView>> = Vec::new();
        let mut sources = Vec::new();
        let mut key = FramebufferKey { colors: Vec::new(), depth_stencil: None };
        let mut sample_count = None;
        let mut surface_pass = false;

        for (index, attachment) in desc.color_attachments.iter().enumerate() {
            let view = attachment.view;
            if view.format().is_depth() {
                rhi_bail!(InvalidUsage, "lumen::gl", "Color attachment {} has depth format {:?}", index, view.format());
            }
            if !view.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                rhi_bail!(InvalidUsage, "lumen::gl", "Color attachment {} lacks RENDER_ATTACHMENT usage", index);
            }
            Self::check_sample_count(&mut sample_count, view.sample_count())?;
            if view.is_surface() {
                // The default framebuffer cannot be combined with texture attachments
                if desc.color_attachments.len() != 1 || desc.depth_stencil_attachment.is_some() {
                    rhi_bail!(
                        InvalidUsage,
                        "lumen::gl",
                        "The surface view must be the only attachment of a GL render pass"
                    );
                }
                surface_pass = true;
            } else if let Some(source) = view.attachment_source(index as u32) {
                sources.push(source);
            }

            if let LoadOp::Clear(color) = attachment.ops.load {
                clears.push(ClearOp::Color { draw_buffer: index as u32, value: color.to_f32_array() });
            }
            if attachment.ops.store == StoreOp::Discard {
                discards.push(if view.is_surface() { glow::COLOR } else { glow::COLOR_ATTACHMENT0 + index as u32 });
            }
            key.colors.push(view.id());
            views.push(Arc::clone(view));
        }

        let mut depth_format = None;
        if let Some(attachment) = &desc.depth_stencil_attachment {
            let view = attachment.view;
            if !view.format().is_depth() {
                rhi_bail!(InvalidUsage, "lumen::gl", "Depth attachment has color format {:?}", view.format());
            }
            if !view.usage().contains(TextureUsage::RENDER_ATTACHMENT) {
                rhi_bail!(InvalidUsage, "lumen::gl", "Depth attachment lacks RENDER_ATTACHMENT usage");
            }
            Self::check_sample_count(&mut sample_count, view.sample_count())?;
            if let Some(source) = view.attachment_source(0) {
                sources.push(source);
            }

            let has_stencil = view.format().has_stencil();
            let depth_clear = attachment.depth_ops.and_then(|ops| match ops.load {
                LoadOp::Clear(depth) => Some(depth),
                _ => None,
            });
            let stencil_clear = attachment.stencil_ops.filter(|_| has_stencil).and_then(|ops| match ops.load {
                LoadOp::Clear(stencil) => Some(stencil),
                _ => None,
            });
            match (depth_clear, stencil_clear) {
                (Some(depth), Some(stencil)) => clears.push(ClearOp::DepthStencil(depth, stencil)),
                (Some(depth), None) => clears.push(ClearOp::Depth(depth)),
                (None, Some(stencil)) => clears.push(ClearOp::Stencil(stencil)),
                (None, None) => {}
            }
            if attachment.depth_ops.map(|ops| ops.store == StoreOp::Discard).unwrap_or(false) {
                discards.push(glow::DEPTH_ATTACHMENT);
            }
            if has_stencil && attachment.stencil_ops.map(|ops| ops.store == StoreOp::Discard).unwrap_or(false) {
                discards.push(glow::STENCIL_ATTACHMENT);
            }

            depth_format = Some(view.format());
            key.depth_stencil = Some(view.id());
            views.push(Arc::clone(view));
        }

        let framebuffer = if surface_pass {
            None
        } else {
            Some(self.fbo_cache.framebuffer(&key, &sources)?)
        };

        self.pass = Some(PassState {
            color_formats: desc.color_attachments.iter().map(|attachment| attachment.view.format()).collect(),
            depth_format,
            sample_count: sample_count.unwrap_or(1),
            pipeline: None,
            bind_groups: Vec::new(),
            push_constants: Vec::new(),
            index_format: None,
            vertex_slots: 0,
        });
        self.commands.push(Command::BeginPass { framebuffer, extent, clears, discards, views });
        Ok(())
    }

    fn check_sample_count(common: &mut Option<u32>, count: u32) -> Result<()> {
        match *common {
            Some(expected) if expected != count => {
                rhi_bail!(InvalidUsage, "lumen::gl", "Attachments mix sample counts {} and {}", expected, count);
            }
            _ => *common = Some(count),
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        if self.pass.take().is_none() {
            rhi_bail!(InvalidUsage, "lumen::gl", "end_render_pass called outside a render pass");
        }
        self.commands.push(Command::EndPass);
        Ok(())
    }

    pub fn set_pipeline(&mut self, pipeline: &Arc<RenderPipeline>) -> Result<()> {
        let pass = self.pass_mut("set_pipeline")?;
        if pipeline.color_formats != pass.color_formats
            || pipeline.depth_format != pass.depth_format
            || pipeline.sample_count != pass.sample_count
        {
            rhi_bail!(
                InvalidUsage,
                "lumen::gl",
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
        self.commands.push(Command::SetPipeline(Arc::clone(pipeline)));
        Ok(())
    }

    pub fn set_bind_group(&mut self, index: u32, group: &Arc<BindGroup>, dynamic_offsets: &[u32]) -> Result<()> {
        let pass = self.pass_mut("set_bind_group")?;
        if dynamic_offsets.len() != group.dynamic_offset_count() {
            rhi_bail!(
                InvalidUsage,
                "lumen::gl",
                "Bind group {} needs {} dynamic offsets, got {}",
                index,
                group.dynamic_offset_count(),
                dynamic_offsets.len()
            );
        }
        group.check_dynamic_offsets(dynamic_offsets)?;
        let slot = index as usize;
        if pass.bind_groups.len() <= slot {
            pass.bind_groups.resize_with(slot + 1, || None);
        }
        pass.bind_groups[slot] = Some(Arc::clone(group));
        self.commands.push(Command::SetBindGroup {
            group: Arc::clone(group),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
        Ok(())
    }

    pub fn set_vertex_buffer(&mut self, slot: u32, buffer: &Arc<Buffer>, offset: u64, size: Option<u64>) -> Result<()> {
        let pass = self.pass_mut("set_vertex_buffer")?;
        if !buffer.usage().contains(BufferUsage::VERTEX) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Vertex buffer at slot {} lacks VERTEX usage", slot);
        }
        if slot >= 64 {
            rhi_bail!(InvalidUsage, "lumen::gl", "Vertex buffer slot {} out of range", slot);
        }
        let len = size.unwrap_or(buffer.size().saturating_sub(offset));
        check_buffer_range(buffer.size(), offset, len)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        pass.vertex_slots |= 1 << slot;
        self.commands.push(Command::SetVertexBuffer { slot, buffer: Arc::clone(buffer), offset });
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: &Arc<Buffer>, format: IndexFormat, offset: u64, size: Option<u64>) -> Result<()> {
        let pass = self.pass_mut("set_index_buffer")?;
        if !buffer.usage().contains(BufferUsage::INDEX) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Index buffer lacks INDEX usage");
        }
        if offset % format.size_bytes() as u64 != 0 {
            rhi_bail!(InvalidUsage, "lumen::gl", "Index buffer offset {} is not aligned to {:?}", offset, format);
        }
        let len = size.unwrap_or(buffer.size().saturating_sub(offset));
        check_buffer_range(buffer.size(), offset, len)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        pass.index_format = Some(format);
        self.commands.push(Command::SetIndexBuffer { buffer: Arc::clone(buffer), format, offset });
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.pass_mut("set_viewport")?;
        self.commands.push(Command::SetViewport(*viewport));
        Ok(())
    }

    pub fn set_scissor(&mut self, rect: &Rect2D) -> Result<()> {
        self.pass_mut("set_scissor")?;
        if rect.x < 0 || rect.y < 0 {
            rhi_bail!(InvalidUsage, "lumen::gl", "Scissor offset ({}, {}) is negative", rect.x, rect.y);
        }
        self.commands.push(Command::SetScissor(*rect));
        Ok(())
    }

    /// Queue push constant bytes; they are written at the next draw
    pub fn set_push_constants(&mut self, stages: ShaderStages, offset: u32, data: &[u8]) -> Result<()> {
        let pass = self.pass_mut("set_push_constants")?;
        if data.is_empty() || offset % 4 != 0 || data.len() % 4 != 0 {
            rhi_bail!(
                InvalidUsage,
                "lumen::gl",
                "Push constants need a non-empty, 4-byte aligned range (offset {}, {} bytes)",
                offset,
                data.len()
            );
        }
        pass.push_constants.push(PendingPushConstants { stages, offset, data: data.to_vec() });
        Ok(())
    }

    /// Check the draw state and emit queued push constants
    fn flush_draw_state(&mut self, indexed: bool) -> Result<()> {
        let pass = self.pass_mut("draw")?;
        let pipeline = match &pass.pipeline {
            Some(pipeline) => Arc::clone(pipeline),
            None => rhi_bail!(InvalidUsage, "lumen::gl", "Draw without a pipeline"),
        };
        if indexed && pass.index_format.is_none() {
            rhi_bail!(InvalidUsage, "lumen::gl", "Indexed draw without an index buffer");
        }
        let required_slots = pipeline.vertex_buffer_count();
        if required_slots > 0 {
            let mask = if required_slots >= 64 { u64::MAX } else { (1u64 << required_slots) - 1 };
            if pass.vertex_slots & mask != mask {
                rhi_bail!(InvalidUsage, "lumen::gl", "Pipeline reads {} vertex buffers but not all are bound", required_slots);
            }
        }

        let layout = pipeline.layout();
        for (index, bound) in pass.bind_groups.iter().enumerate() {
            let Some(group) = bound else {
                continue;
            };
            let expected = layout.bind_group_layouts.get(index).ok_or_else(|| {
                rhi_err!(InvalidUsage, "lumen::gl", "Bind group {} is beyond the pipeline layout", index)
            })?;
            if !Arc::ptr_eq(group.layout(), expected) && group.layout().desc().entries != expected.desc().entries {
                rhi_bail!(InvalidUsage, "lumen::gl", "Bind group {} does not match the pipeline layout", index);
            }
        }

        let mut uploads = Vec::with_capacity(pass.push_constants.len());
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
                    "lumen::gl",
                    "Push constants [{}, {}) for {:?} are not covered by the pipeline layout",
                    pending.offset,
                    end,
                    pending.stages
                );
            }
            uploads.push(Command::PushConstants { offset: pending.offset, data: pending.data });
        }
        self.commands.extend(uploads);
        Ok(())
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        self.flush_draw_state(false)?;
        self.commands.push(Command::Draw { vertex_count, instance_count, first_vertex, first_instance });
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
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        });
        Ok(())
    }

    // ===== Copies =====

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
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy source buffer lacks COPY_SRC usage");
        }
        if !destination.usage().contains(BufferUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy destination buffer lacks COPY_DST usage");
        }
        if size == 0 {
            rhi_bail!(InvalidUsage, "lumen::gl", "Buffer copy of 0 bytes");
        }
        check_buffer_range(source.size(), source_offset, size)
            .and_then(|_| check_buffer_range(destination.size(), destination_offset, size))
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;

        self.commands.push(Command::CopyBufferToBuffer {
            source: Arc::clone(source),
            source_offset,
            destination: Arc::clone(destination),
            destination_offset,
            size,
        });
        Ok(())
    }

    /// Validate a buffer/texture copy
    fn check_image_copy(
        buffer: &ImageCopyBuffer<'_, GlApi>,
        texture: &ImageCopyTexture<'_, GlApi>,
        size: Extent3D,
    ) -> Result<()> {
        let desc = texture.texture.desc();
        if desc.sample_count != 1 {
            rhi_bail!(InvalidUsage, "lumen::gl", "Multisampled textures cannot be copied through a buffer");
        }
        if !matches!(texture.texture.target, glow::TEXTURE_2D | glow::TEXTURE_2D_ARRAY | glow::TEXTURE_3D) {
            rhi_bail!(InvalidUsage, "lumen::gl", "The GL backend only copies 2D, 2D array and 3D textures");
        }
        buffer
            .layout
            .required_bytes(desc.format, size)
            .and_then(|bytes| check_buffer_range(buffer.buffer.size(), buffer.layout.offset, bytes))
            .and_then(|_| check_texture_region(desc, texture.mip_level, texture.origin, size))
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        let texel = desc.format.texel_size().unwrap_or(4) as u64;
        let alignment = if desc.format.is_depth() { 4 } else { texel };
        if buffer.layout.offset % alignment != 0 {
            rhi_bail!(
                InvalidUsage,
                "lumen::gl",
                "Buffer offset {} is not a multiple of {} for {:?}",
                buffer.layout.offset,
                alignment,
                desc.format
            );
        }
        Ok(())
    }

    pub fn copy_buffer_to_texture(
        &mut self,
        source: &ImageCopyBuffer<'_, GlApi>,
        destination: &ImageCopyTexture<'_, GlApi>,
        size: Extent3D,
    ) -> Result<()> {
        self.require_outside_pass("copy_buffer_to_texture")?;
        if !source.buffer.usage().contains(BufferUsage::COPY_SRC) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy source buffer lacks COPY_SRC usage");
        }
        if !destination.texture.desc().usage.contains(TextureUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy destination texture lacks COPY_DST usage");
        }
        Self::check_image_copy(source, destination, size)?;

        self.commands.push(Command::CopyBufferToTexture {
            source: Arc::clone(source.buffer),
            layout: source.layout,
            destination: Arc::clone(destination.texture),
            mip_level: destination.mip_level,
            origin: destination.origin,
            size,
        });
        Ok(())
    }

    pub fn copy_texture_to_buffer(
        &mut self,
        source: &ImageCopyTexture<'_, GlApi>,
        destination: &ImageCopyBuffer<'_, GlApi>,
        size: Extent3D,
    ) -> Result<()> {
        self.require_outside_pass("copy_texture_to_buffer")?;
        if !source.texture.desc().usage.contains(TextureUsage::COPY_SRC) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy source texture lacks COPY_SRC usage");
        }
        if !destination.buffer.usage().contains(BufferUsage::COPY_DST) {
            rhi_bail!(InvalidUsage, "lumen::gl", "Copy destination buffer lacks COPY_DST usage");
        }
        Self::check_image_copy(destination, source, size)?;

        self.commands.push(Command::CopyTextureToBuffer {
            source: Arc::clone(source.texture),
            mip_level: source.mip_level,
            origin: source.origin,
            destination: Arc::clone(destination.buffer),
            layout: destination.layout,
            size,
        });
        Ok(())
    }

    /// End recording
    pub fn finish(self) -> Result<CommandBuffer> {
        if self.pass.is_some() {
            rhi_bail!(InvalidUsage, "lumen::gl", "finish() called with an open render pass");
        }
        Ok(CommandBuffer {
            origin: self.origin,
            commands: self.commands,
        })
    }
}

// ============================================================================
// CommandBuffer
// ============================================================================

/// Finished command list, ready for `Queue::submit`
pub struct CommandBuffer {
    origin: CommandOrigin,
    pub(crate) commands: Vec<Command>,
}

impl CommandBuffer {
    pub(crate) fn origin(&self) -> CommandOrigin {
        self.origin
    }

    /// Number of resources kept alive until the buffer is replayed and dropped
    pub fn retained_count(&self) -> usize {
        self.commands.iter().map(Command::retained).sum()
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

// ============================================================================
// Replay
// ============================================================================

/// Bindings accumulated while replaying one command list
#[derive(Default)]
struct ReplayState {
    pipeline: Option<Arc<RenderPipeline>>,
    vertex_buffers: Vec<Option<VertexBinding>>,
    index: Option<(glow::Buffer, IndexFormat, u64)>,
    /// Framebuffer height, for flipping rectangles to GL's bottom-left origin
    target_height: u32,
    discards: Vec<u32>,
    /// Whether the bound framebuffer is the default one
    default_framebuffer: bool,
}

/// Flip a top-left-origin rectangle into GL window coordinates
pub(crate) fn flip_y(target_height: u32, y: i32, height: u32) -> i32 {
    target_height as i32 - (y + height as i32)
}

/// Replays command lists on the context
pub(crate) struct Replayer<'a> {
    ctx: &'a GlContext,
    push_constant_buffer: glow::Buffer,
}

impl<'a> Replayer<'a> {
    pub(crate) fn new(ctx: &'a GlContext, push_constant_buffer: glow::Buffer) -> Self {
        Self { ctx, push_constant_buffer }
    }

    pub(crate) fn execute(&self, buffer: &CommandBuffer) -> Result<()> {
        let gl = &self.ctx.gl;
        let mut state = ReplayState::default();
        for command in &buffer.commands {
            unsafe { self.execute_command(gl, &mut state, command)? };
        }
        unsafe {
            gl.bind_vertex_array(None);
            gl.use_program(None);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
        }
        self.ctx.check_error("Command list replay")
    }

    unsafe fn execute_command(&self, gl: &glow::Context, state: &mut ReplayState, command: &Command) -> Result<()> {
        match command {
            Command::BeginPass { framebuffer, extent, clears, discards, .. } => {
                gl.bind_framebuffer(glow::FRAMEBUFFER, *framebuffer);
                state.target_height = extent.height;
                state.discards = discards.clone();
                state.default_framebuffer = framebuffer.is_none();
                state.pipeline = None;
                state.vertex_buffers.clear();
                state.index = None;

                // Clears honor masks and the scissor test
                gl.disable(glow::SCISSOR_TEST);
                gl.color_mask(true, true, true, true);
                gl.depth_mask(true);
                gl.stencil_mask(0xFF);
                for clear in clears {
                    match *clear {
                        ClearOp::Color { draw_buffer, value } => {
                            gl.clear_buffer_f32_slice(glow::COLOR, draw_buffer, &value)
                        }
                        ClearOp::Depth(depth) => gl.clear_buffer_f32_slice(glow::DEPTH, 0, &[depth]),
                        ClearOp::Stencil(stencil) => gl.clear_buffer_i32_slice(glow::STENCIL, 0, &[stencil as i32]),
                        ClearOp::DepthStencil(depth, stencil) => {
                            gl.clear_buffer_depth_stencil(glow::DEPTH_STENCIL, 0, depth, stencil as i32)
                        }
                    }
                }
                gl.viewport(0, 0, extent.width as i32, extent.height as i32);
                gl.depth_range_f32(0.0, 1.0);
                gl.enable(glow::SCISSOR_TEST);
                gl.scissor(0, 0, extent.width as i32, extent.height as i32);
            }
            Command::EndPass => {
                if !state.discards.is_empty() {
                    gl.invalidate_framebuffer(glow::FRAMEBUFFER, &state.discards);
                }
                gl.disable(glow::SCISSOR_TEST);
                state.discards.clear();
            }
            Command::SetPipeline(pipeline) => {
                pipeline.apply(gl);
                state.pipeline = Some(Arc::clone(pipeline));
            }
            Command::SetBindGroup { group, dynamic_offsets } => group.apply(gl, dynamic_offsets),
            Command::SetVertexBuffer { slot, buffer, offset } => {
                let slot = *slot as usize;
                if state.vertex_buffers.len() <= slot {
                    state.vertex_buffers.resize(slot + 1, None);
                }
                state.vertex_buffers[slot] = Some(VertexBinding { buffer: buffer.raw, offset: *offset });
            }
            Command::SetIndexBuffer { buffer, format, offset } => {
                state.index = Some((buffer.raw, *format, *offset));
            }
            Command::SetViewport(viewport) => {
                let y = flip_y(state.target_height, viewport.y as i32, viewport.height as u32);
                gl.viewport(viewport.x as i32, y, viewport.width as i32, viewport.height as i32);
                gl.depth_range_f32(viewport.min_depth, viewport.max_depth);
            }
            Command::SetScissor(rect) => {
                let y = flip_y(state.target_height, rect.y, rect.height);
                gl.scissor(rect.x, y, rect.width as i32, rect.height as i32);
            }
            Command::PushConstants { offset, data } => {
                gl.bind_buffer(glow::UNIFORM_BUFFER, Some(self.push_constant_buffer));
                gl.buffer_sub_data_u8_slice(glow::UNIFORM_BUFFER, *offset as i32, data);
                gl.bind_buffer_base(glow::UNIFORM_BUFFER, PUSH_CONSTANT_BINDING, Some(self.push_constant_buffer));
            }
            Command::Draw { vertex_count, instance_count, first_vertex, first_instance } => {
                let pipeline = state
                    .pipeline
                    .as_ref()
                    .ok_or_else(|| rhi_err!(BackendError, "lumen::gl", "Replayed draw without a pipeline"))?;
                pipeline.bind_vertex_buffers(gl, &state.vertex_buffers, *first_instance);
                gl.draw_arrays_instanced(
                    pipeline.topology,
                    *first_vertex as i32,
                    *vertex_count as i32,
                    *instance_count as i32,
                );
            }
            Command::DrawIndexed { index_count, instance_count, first_index, base_vertex, first_instance } => {
                let pipeline = state
                    .pipeline
                    .as_ref()
                    .ok_or_else(|| rhi_err!(BackendError, "lumen::gl", "Replayed draw without a pipeline"))?;
                let (buffer, format, offset) = state
                    .index
                    .ok_or_else(|| rhi_err!(BackendError, "lumen::gl", "Replayed indexed draw without an index buffer"))?;
                pipeline.bind_vertex_buffers(gl, &state.vertex_buffers, *first_instance);
                // Element buffer binding is vertex array state
                gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer));
                let byte_offset = offset + *first_index as u64 * format.size_bytes() as u64;
                gl.draw_elements_instanced_base_vertex(
                    pipeline.topology,
                    *index_count as i32,
                    index_format_to_gl(format),
                    byte_offset as i32,
                    *instance_count as i32,
                    *base_vertex,
                );
            }
            Command::CopyBufferToBuffer { source, source_offset, destination, destination_offset, size } => {
                gl.bind_buffer(glow::COPY_READ_BUFFER, Some(source.raw));
                gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(destination.raw));
                gl.copy_buffer_sub_data(
                    glow::COPY_READ_BUFFER,
                    glow::COPY_WRITE_BUFFER,
                    *source_offset as i32,
                    *destination_offset as i32,
                    *size as i32,
                );
                gl.bind_buffer(glow::COPY_READ_BUFFER, None);
                gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            }
            Command::CopyBufferToTexture { source, layout, destination, mip_level, origin, size } => {
                self.upload_texture(gl, source, layout, destination, *mip_level, *origin, *size);
            }
            Command::CopyTextureToBuffer { source, mip_level, origin, destination, layout, size } => {
                self.read_texture(gl, source, *mip_level, *origin, destination, layout, *size)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    unsafe fn upload_texture(
        &self,
        gl: &glow::Context,
        source: &Buffer,
        layout: &ImageDataLayout,
        texture: &Texture,
        mip_level: u32,
        origin: Origin3D,
        size: Extent3D,
    ) {
        let format = texture.gl_format;
        let level = mip_level as i32;
        gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, Some(source.raw));
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, layout.row_length_texels(texture.format()) as i32);
        gl.pixel_store_i32(glow::UNPACK_IMAGE_HEIGHT, layout.rows_per_image.unwrap_or(0) as i32);
        gl.bind_texture(texture.target, Some(texture.raw));
        let pixels = glow::PixelUnpackData::BufferOffset(layout.offset as u32);
        if texture.target == glow::TEXTURE_2D {
            gl.tex_sub_image_2d(
                texture.target,
                level,
                origin.x as i32,
                origin.y as i32,
                size.width as i32,
                size.height as i32,
                format.format,
                format.ty,
                pixels,
            );
        } else {
            gl.tex_sub_image_3d(
                texture.target,
                level,
                origin.x as i32,
                origin.y as i32,
                origin.z as i32,
                size.width as i32,
                size.height as i32,
                size.depth_or_array_layers as i32,
                format.format,
                format.ty,
                pixels,
            );
        }
        gl.bind_texture(texture.target, None);
        gl.pixel_store_i32(glow::UNPACK_ROW_LENGTH, 0);
        gl.pixel_store_i32(glow::UNPACK_IMAGE_HEIGHT, 0);
        gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 4);
        gl.bind_buffer(glow::PIXEL_UNPACK_BUFFER, None);
    }

    /// Read back through the scratch framebuffer, one layer or slice at a time
    #[allow(clippy::too_many_arguments)]
    unsafe fn read_texture(
        &self,
        gl: &glow::Context,
        texture: &Texture,
        mip_level: u32,
        origin: Origin3D,
        destination: &Buffer,
        layout: &ImageDataLayout,
        size: Extent3D,
    ) -> Result<()> {
        let framebuffer = self.ctx.copy_framebuffer()?;
        let format = texture.gl_format;
        let attachment_point = if texture.format().is_depth() {
            crate::gl_format::depth_attachment_point(texture.format())
        } else {
            glow::COLOR_ATTACHMENT0
        };
        let image_stride = layout.bytes_per_row as u64 * layout.rows_per_image.unwrap_or(size.height) as u64;

        gl.bind_framebuffer(glow::READ_FRAMEBUFFER, Some(framebuffer));
        gl.bind_buffer(glow::PIXEL_PACK_BUFFER, Some(destination.raw));
        gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
        gl.pixel_store_i32(glow::PACK_ROW_LENGTH, layout.row_length_texels(texture.format()) as i32);
        if attachment_point == glow::COLOR_ATTACHMENT0 {
            gl.read_buffer(glow::COLOR_ATTACHMENT0);
        } else {
            gl.read_buffer(glow::NONE);
        }

        for slice in 0..size.depth_or_array_layers {
            if texture.target == glow::TEXTURE_2D {
                gl.framebuffer_texture_2d(glow::READ_FRAMEBUFFER, attachment_point, texture.target, Some(texture.raw), mip_level as i32);
            } else {
                gl.framebuffer_texture_layer(
                    glow::READ_FRAMEBUFFER,
                    attachment_point,
                    Some(texture.raw),
                    mip_level as i32,
                    (origin.z + slice) as i32,
                );
            }
            let status = gl.check_framebuffer_status(glow::READ_FRAMEBUFFER);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
                gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
                rhi_bail!(BackendError, "lumen::gl", "Texture read-back framebuffer incomplete: 0x{:04X}", status);
            }
            let offset = layout.offset + image_stride * slice as u64;
            gl.read_pixels(
                origin.x as i32,
                origin.y as i32,
                size.width as i32,
                size.height as i32,
                format.format,
                format.ty,
                glow::PixelPackData::BufferOffset(offset as u32),
            );
        }

        gl.framebuffer_texture_2d(glow::READ_FRAMEBUFFER, attachment_point, glow::TEXTURE_2D, None, 0);
        gl.pixel_store_i32(glow::PACK_ROW_LENGTH, 0);
        gl.pixel_store_i32(glow::PACK_ALIGNMENT, 4);
        gl.bind_buffer(glow::PIXEL_PACK_BUFFER, None);
        gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
        Ok(())
    }
}

#[cfg(test)]
#[path = "gl_command_tests.rs"]
mod tests;
