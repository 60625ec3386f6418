/// Device / Queue - OpenGL backend entry points
///
/// GL synchronizes implicitly, so the frame protocol is bookkeeping only:
/// `begin_frame` opens the frame (or skips it while the surface is
/// degenerate), `Queue::submit` replays command lists as they arrive and
/// `end_frame` swaps the default framebuffer and advances the frame ring.

use glow::HasContext;
use lumen_rhi::lumen::render::{
    BindGroupDesc, BindGroupLayoutDesc, BufferDesc, Extent2D, FrameStatus, PipelineLayoutDesc, RenderPipelineDesc, SamplerDesc, ShaderModuleDesc, TextureDesc,
    TextureFormat, TextureViewDesc, ViewId,
};
use lumen_rhi::lumen::{Config, Result};
use lumen_rhi::{rhi_bail, rhi_debug, rhi_err, rhi_info};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::debug;
use crate::gl_binding::{BindGroup, BindGroupLayout, PipelineLayout};
use crate::gl_buffer::Buffer;
use crate::gl_command::{CommandBuffer, CommandEncoder, CommandOrigin, Replayer};
use crate::gl_context::{GlContext, GlLimits, MAX_PUSH_CONSTANT_SIZE};
use crate::gl_frame::FrameClock;
use crate::gl_framebuffer::FramebufferCache;
use crate::gl_pipeline::RenderPipeline;
use crate::gl_sampler::Sampler;
use crate::gl_shader::ShaderModule;
use crate::gl_texture::{Texture, TextureView};
use crate::GlApi;

/// Format of the default framebuffer
pub const SURFACE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Frames the driver is assumed to buffer
const FRAME_COUNT: usize = 2;

/// The window-system side of a GL context
///
/// Implemented by the caller over whatever created the context.
pub trait GlSurface {
    /// Present the default framebuffer
    fn swap_buffers(&self) -> Result<()>;

    /// Called after the drawable was resized to `size`
    fn resize(&self, _size: Extent2D) {}
}

// ============================================================================
// Frame state
// ============================================================================

type FrameState = FrameClock<Arc<TextureView>>;

fn lock_state(state: &Mutex<FrameState>) -> Result<MutexGuard<'_, FrameState>> {
    state
        .lock()
        .map_err(|_| rhi_err!(BackendError, "lumen::gl", "Frame state lock poisoned"))
}

// ============================================================================
// Queue
// ============================================================================

/// GL queue implementation
pub struct Queue {
    ctx: Arc<GlContext>,
    state: Arc<Mutex<FrameState>>,
    /// Uniform buffer backing push constants
    push_constant_buffer: glow::Buffer,
}

impl Queue {
    fn new(ctx: Arc<GlContext>, state: Arc<Mutex<FrameState>>) -> Result<Self> {
        let push_constant_buffer = unsafe {
            let gl = &ctx.gl;
            let buffer = gl
                .create_buffer()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create push constant buffer: {}", e))?;
            gl.bind_buffer(glow::UNIFORM_BUFFER, Some(buffer));
            gl.buffer_data_size(glow::UNIFORM_BUFFER, MAX_PUSH_CONSTANT_SIZE as i32, glow::DYNAMIC_DRAW);
            gl.bind_buffer(glow::UNIFORM_BUFFER, None);
            buffer
        };
        Ok(Self { ctx, state, push_constant_buffer })
    }

    /// Replay finished command lists now
    ///
    /// Lists recorded for a frame are accepted only while that frame is open;
    /// outside a frame only upload lists are.
    pub fn submit(&self, buffers: Vec<CommandBuffer>) -> Result<()> {
        if buffers.is_empty() {
            return Ok(());
        }
        {
            let state = lock_state(&self.state)?;
            if state.is_recording() {
                let serial = state.serial();
                if let Some(stale) = buffers
                    .iter()
                    .find(|buffer| matches!(buffer.origin(), CommandOrigin::Frame { serial: s } if s != serial))
                {
                    rhi_bail!(
                        InvalidUsage,
                        "lumen::gl",
                        "Command buffer recorded in frame {:?} submitted in frame {}",
                        stale.origin(),
                        serial
                    );
                }
            } else if buffers.iter().any(|buffer| buffer.origin() != CommandOrigin::Upload) {
                rhi_bail!(InvalidUsage, "lumen::gl", "Frame command buffer submitted after its frame ended");
            }
        }

        let replayer = Replayer::new(&self.ctx, self.push_constant_buffer);
        for buffer in &buffers {
            replayer.execute(buffer)?;
        }
        // Replayed: release retained resources
        drop(buffers);
        Ok(())
    }
}

impl Drop for Queue {
    fn drop(&mut self) {
        unsafe { self.ctx.gl.delete_buffer(self.push_constant_buffer) };
    }
}

// ============================================================================
// Device
// ============================================================================

/// GL device implementation
pub struct Device {
    ctx: Arc<GlContext>,
    fbo_cache: Arc<FramebufferCache>,
    state: Arc<Mutex<FrameState>>,
    queue: Arc<Queue>,
    config: Config,
    /// Dropped last: it may own the context every other field deletes through
    surface: Box<dyn GlSurface>,
}

impl Device {
    /// Wrap a loaded, current context whose default framebuffer is `size`
    pub fn new(mut gl: glow::Context, surface: Box<dyn GlSurface>, size: Extent2D, config: Config) -> Result<Self> {
        if config.enable_validation || cfg!(feature = "gl-debug") {
            if debug::install(&mut gl, config.debug_severity) {
                rhi_info!("lumen::gl", "GL debug output enabled");
            } else {
                rhi_debug!("lumen::gl", "GL debug output unavailable on this context");
            }
        }

        let ctx = Arc::new(GlContext::new(gl)?);
        let fbo_cache = Arc::new(FramebufferCache::new(Arc::clone(&ctx)));
        let surface_view = Arc::new(TextureView::for_surface(Arc::clone(&fbo_cache), SURFACE_FORMAT, size));
        fbo_cache.set_surface_view(surface_view.id())?;

        let state = Arc::new(Mutex::new(FrameClock::new(FRAME_COUNT, size, surface_view)));
        let queue = Arc::new(Queue::new(Arc::clone(&ctx), Arc::clone(&state))?);

        rhi_info!(
            "lumen::gl",
            "GL device ready: {}x{} default framebuffer, {} frames",
            size.width,
            size.height,
            FRAME_COUNT
        );

        Ok(Self {
            ctx,
            fbo_cache,
            state,
            queue,
            config,
            surface,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, FrameState>> {
        lock_state(&self.state)
    }

    // ===== Frames =====

    /// Open a frame; `Skipped` while the surface is degenerate
    pub fn begin_frame(&self) -> Result<FrameStatus> {
        self.lock()?.begin()
    }

    /// Close the frame: swap buffers and advance the ring
    pub fn end_frame(&self) -> Result<()> {
        self.lock()?.end(|| self.surface.swap_buffers())
    }

    /// Record the new drawable size and mint a new default-framebuffer view
    ///
    /// A zero-area size marks the surface degenerate until a non-zero resize.
    pub fn on_window_resize(&self, size: Extent2D) -> Result<()> {
        let mut state = self.lock()?;
        let retired = state.resize(size, |size| {
            Arc::new(TextureView::for_surface(Arc::clone(&self.fbo_cache), SURFACE_FORMAT, size))
        })?;
        let Some(old) = retired else {
            rhi_debug!("lumen::gl", "Surface resized to {}x{}, deferring", size.width, size.height);
            return Ok(());
        };

        self.surface.resize(size);
        self.fbo_cache.set_surface_view(state.surface().id())?;
        let swept = self.fbo_cache.sweep(&[old.id()]);
        rhi_debug!(
            "lumen::gl",
            "Surface resized to {}x{}, swept {} framebuffers",
            size.width,
            size.height,
            swept
        );
        Ok(())
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.ctx.finish();
        self.ctx.check_error("wait_idle")
    }

    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    /// The default framebuffer while a frame is open
    pub fn surface_view(&self) -> Option<Arc<TextureView>> {
        self.lock().ok()?.frame_surface().cloned()
    }

    // ===== Resource creation =====

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<Buffer>> {
        Buffer::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<Texture>> {
        Texture::new(Arc::clone(&self.ctx), Arc::clone(&self.fbo_cache), desc).map(Arc::new)
    }

    pub fn create_texture_view(&self, texture: &Arc<Texture>, desc: &TextureViewDesc) -> Result<Arc<TextureView>> {
        texture.create_view(desc).map(Arc::new)
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<Sampler>> {
        Sampler::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Arc<ShaderModule>> {
        ShaderModule::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_bind_group_layout(&self, desc: &BindGroupLayoutDesc) -> Result<Arc<BindGroupLayout>> {
        BindGroupLayout::new(desc).map(Arc::new)
    }

    pub fn create_bind_group(&self, desc: &BindGroupDesc<'_, GlApi>) -> Result<Arc<BindGroup>> {
        BindGroup::new(&self.ctx, desc).map(Arc::new)
    }

    pub fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc<'_, GlApi>) -> Result<Arc<PipelineLayout>> {
        PipelineLayout::new(desc).map(Arc::new)
    }

    pub fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, GlApi>) -> Result<Arc<RenderPipeline>> {
        RenderPipeline::new(Arc::clone(&self.ctx), desc, SURFACE_FORMAT).map(Arc::new)
    }

    /// Start a command list; inside a frame it is tagged with the frame
    pub fn create_command_encoder(&self) -> Result<CommandEncoder> {
        let state = self.lock()?;
        let origin = if state.is_recording() {
            CommandOrigin::Frame { serial: state.serial() }
        } else {
            CommandOrigin::Upload
        };
        Ok(CommandEncoder::new(Arc::clone(&self.fbo_cache), origin))
    }

    // ===== Introspection =====

    pub fn frame_index(&self) -> usize {
        self.lock().map(|state| state.frame_index()).unwrap_or(0)
    }

    pub fn image_count(&self) -> usize {
        self.lock().map(|state| state.frame_count()).unwrap_or(0)
    }

    pub fn surface_format(&self) -> TextureFormat {
        SURFACE_FORMAT
    }

    pub fn surface_extent(&self) -> Extent2D {
        self.lock().map(|state| state.extent()).unwrap_or_default()
    }

    pub fn is_degenerate(&self) -> bool {
        self.lock().map(|state| state.is_degenerate()).unwrap_or(true)
    }

    /// View ids every cached framebuffer depends on
    pub fn tracked_attachment_views(&self) -> FxHashSet<ViewId> {
        self.fbo_cache.tracked_views()
    }

    /// Id of the current default-framebuffer view
    pub fn surface_views(&self) -> Vec<ViewId> {
        self.fbo_cache.surface_view().into_iter().collect()
    }

    /// Always 0: command lists are released once replayed
    pub fn in_flight_command_buffers(&self) -> usize {
        0
    }

    pub fn limits(&self) -> GlLimits {
        self.ctx.limits()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.ctx.finish();
        self.fbo_cache.clear();
    }
}
