/// FramebufferCache - GL framebuffer objects keyed by attachment view ids
///
/// The default framebuffer is the surface view and never gets an FBO. Every
/// other attachment set gets one FBO, registered under the view ids it was
/// built from so a dropped view or a resize sweeps it.

use glow::HasContext;
use lumen_rhi::lumen::render::{AttachmentTracker, ViewId};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_trace};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::gl_context::GlContext;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FramebufferKey {
    pub colors: Vec<ViewId>,
    pub depth_stencil: Option<ViewId>,
}

impl FramebufferKey {
    fn views(&self) -> Vec<ViewId> {
        self.colors.iter().copied().chain(self.depth_stencil).collect()
    }
}

/// One texture level (and layer) attached to an FBO
#[derive(Debug, Clone, Copy)]
pub(crate) struct AttachmentSource {
    pub texture: glow::Texture,
    pub attachment_point: u32,
    pub mip_level: i32,
    /// `Some` for array and 3D textures
    pub layer: Option<i32>,
}

impl AttachmentSource {
    /// Attach to whatever is bound at `target`
    pub(crate) unsafe fn attach(&self, gl: &glow::Context, target: u32, texture_target: u32) {
        match self.layer {
            Some(layer) => gl.framebuffer_texture_layer(
                target,
                self.attachment_point,
                Some(self.texture),
                self.mip_level,
                layer,
            ),
            None => gl.framebuffer_texture_2d(
                target,
                self.attachment_point,
                texture_target,
                Some(self.texture),
                self.mip_level,
            ),
        }
    }
}

struct CacheInner {
    framebuffers: AttachmentTracker<FramebufferKey, glow::Framebuffer>,
    surface_view: Option<ViewId>,
}

pub struct FramebufferCache {
    ctx: Arc<GlContext>,
    inner: Mutex<CacheInner>,
}

impl FramebufferCache {
    pub(crate) fn new(ctx: Arc<GlContext>) -> Self {
        Self {
            ctx,
            inner: Mutex::new(CacheInner {
                framebuffers: AttachmentTracker::new(),
                surface_view: None,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheInner>> {
        self.inner
            .lock()
            .map_err(|_| rhi_err!(BackendError, "lumen::gl", "Framebuffer cache lock poisoned"))
    }

    pub(crate) fn set_surface_view(&self, view: ViewId) -> Result<()> {
        self.lock()?.surface_view = Some(view);
        Ok(())
    }

    pub(crate) fn surface_view(&self) -> Option<ViewId> {
        self.lock().ok().and_then(|inner| inner.surface_view)
    }

    /// Cached FBO for `key`, created from `sources` on first use
    ///
    /// `sources` pairs each attachment with its texture target, colors first.
    pub(crate) fn framebuffer(
        &self,
        key: &FramebufferKey,
        sources: &[(AttachmentSource, u32)],
    ) -> Result<glow::Framebuffer> {
        let mut inner = self.lock()?;
        if let Some(framebuffer) = inner.framebuffers.get(key) {
            return Ok(*framebuffer);
        }

        let framebuffer = unsafe {
            let gl = &self.ctx.gl;
            let framebuffer = gl
                .create_framebuffer()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create framebuffer: {}", e))?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(framebuffer));
            for (source, texture_target) in sources {
                source.attach(gl, glow::FRAMEBUFFER, *texture_target);
            }
            let draw_buffers: Vec<u32> = (0..key.colors.len() as u32)
                .map(|index| glow::COLOR_ATTACHMENT0 + index)
                .collect();
            if draw_buffers.is_empty() {
                gl.draw_buffers(&[glow::NONE]);
            } else {
                gl.draw_buffers(&draw_buffers);
            }
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(framebuffer);
                rhi_bail!(CreationFailed, "lumen::gl", "Framebuffer incomplete: status 0x{:04X}", status);
            }
            framebuffer
        };

        rhi_trace!("lumen::gl", "Created framebuffer for {} color attachments", key.colors.len());
        inner.framebuffers.insert(key.clone(), key.views(), framebuffer);
        Ok(framebuffer)
    }

    /// Delete every FBO depending on any of `views`
    pub(crate) fn sweep(&self, views: &[ViewId]) -> usize {
        let removed = match self.inner.lock() {
            Ok(mut inner) => inner.framebuffers.sweep(views),
            Err(_) => return 0,
        };
        for framebuffer in &removed {
            unsafe { self.ctx.gl.delete_framebuffer(*framebuffer) };
        }
        removed.len()
    }

    pub(crate) fn release_view(&self, view: ViewId) -> usize {
        self.sweep(&[view])
    }

    pub(crate) fn tracked_views(&self) -> FxHashSet<ViewId> {
        self.inner
            .lock()
            .map(|inner| inner.framebuffers.tracked_views())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&self) {
        let removed = match self.inner.lock() {
            Ok(mut inner) => inner.framebuffers.drain(),
            Err(_) => return,
        };
        for framebuffer in removed {
            unsafe { self.ctx.gl.delete_framebuffer(framebuffer) };
        }
    }
}

impl Drop for FramebufferCache {
    fn drop(&mut self) {
        self.clear();
    }
}
