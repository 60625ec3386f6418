/// Render pass and framebuffer caches
///
/// Native render passes are cached by attachment formats, operations and
/// layouts; framebuffers by render pass, attachment view ids and extent. Both
/// register the view ids they depend on in an attachment tracker so that a
/// swapchain rebuild or a dropped view destroys every object that references
/// a dead image view.

use ash::vk;
use lumen_rhi::lumen::render::{AttachmentTracker, Extent2D, ViewId};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_err, rhi_trace};
use rustc_hash::FxHashSet;
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;

/// One attachment of a render pass key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AttachmentKey {
    pub format: vk::Format,
    pub samples: vk::SampleCountFlags,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl AttachmentKey {
    /// Attachment used only for pipeline compatibility (ops and layouts are irrelevant)
    pub(crate) fn compatible(format: vk::Format, samples: vk::SampleCountFlags, depth: bool) -> Self {
        let layout = if depth {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        };
        Self {
            format,
            samples,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: layout,
        }
    }
}

/// Render pass cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PassKey {
    pub colors: Vec<AttachmentKey>,
    pub depth_stencil: Option<AttachmentKey>,
}

/// Framebuffer cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct FramebufferKey {
    pub render_pass: vk::RenderPass,
    pub views: Vec<ViewId>,
    pub extent: Extent2D,
}

/// Native render pass, destroyed on drop
pub(crate) struct RenderPassObject {
    ctx: Arc<GpuContext>,
    pub raw: vk::RenderPass,
}

impl RenderPassObject {
    pub(crate) fn new(ctx: Arc<GpuContext>, key: &PassKey) -> Result<Self> {
        let mut attachments = Vec::with_capacity(key.colors.len() + 1);
        let mut color_attachment_refs = Vec::with_capacity(key.colors.len());

        for (i, color) in key.colors.iter().enumerate() {
            attachments.push(Self::describe(color));
            color_attachment_refs.push(vk::AttachmentReference::default()
                .attachment(i as u32)
                .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
        }

        let depth_attachment_ref = key.depth_stencil.as_ref().map(|depth| {
            let index = attachments.len() as u32;
            attachments.push(Self::describe(depth));
            vk::AttachmentReference::default()
                .attachment(index)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachment_refs);
        if let Some(ref depth_ref) = depth_attachment_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let attachment_stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        let attachment_access = vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;

        // Prior attachment writes and copies, then later sampling and copies
        let dependencies = [
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(attachment_stages | vk::PipelineStageFlags::TRANSFER)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
                        | vk::AccessFlags::TRANSFER_WRITE,
                )
                .dst_stage_mask(attachment_stages)
                .dst_access_mask(attachment_access),
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(vk::SUBPASS_EXTERNAL)
                .src_stage_mask(attachment_stages)
                .src_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER | vk::PipelineStageFlags::TRANSFER)
                .dst_access_mask(vk::AccessFlags::SHADER_READ | vk::AccessFlags::TRANSFER_READ),
        ];

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);

        let raw = unsafe {
            ctx.device.create_render_pass(&render_pass_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create render pass: {:?}", e))?
        };

        Ok(Self { ctx, raw })
    }

    fn describe(key: &AttachmentKey) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(key.format)
            .samples(key.samples)
            .load_op(key.load_op)
            .store_op(key.store_op)
            .stencil_load_op(key.stencil_load_op)
            .stencil_store_op(key.stencil_store_op)
            .initial_layout(key.initial_layout)
            .final_layout(key.final_layout)
    }
}

impl Drop for RenderPassObject {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_render_pass(self.raw, None);
        }
    }
}

/// Native framebuffer; keeps its render pass alive
pub(crate) struct FramebufferObject {
    ctx: Arc<GpuContext>,
    pub raw: vk::Framebuffer,
    _render_pass: Arc<RenderPassObject>,
}

impl Drop for FramebufferObject {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_framebuffer(self.raw, None);
        }
    }
}

struct PassCacheInner {
    passes: AttachmentTracker<PassKey, Arc<RenderPassObject>>,
    framebuffers: AttachmentTracker<FramebufferKey, Arc<FramebufferObject>>,
    /// Views of the current swapchain images
    surface_views: Vec<ViewId>,
}

/// Cache of render passes and framebuffers, swept by view id
pub struct PassCache {
    ctx: Arc<GpuContext>,
    inner: Mutex<PassCacheInner>,
}

impl PassCache {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            ctx,
            inner: Mutex::new(PassCacheInner {
                passes: AttachmentTracker::new(),
                framebuffers: AttachmentTracker::new(),
                surface_views: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, PassCacheInner>> {
        self.inner
            .lock()
            .map_err(|_| rhi_err!(BackendError, "lumen::vulkan", "Pass cache lock poisoned"))
    }

    /// Record the view ids of the current swapchain images
    pub(crate) fn set_surface_views(&self, views: Vec<ViewId>) -> Result<()> {
        self.lock()?.surface_views = views;
        Ok(())
    }

    pub(crate) fn surface_views(&self) -> Vec<ViewId> {
        self.lock().map(|inner| inner.surface_views.clone()).unwrap_or_default()
    }

    /// Cached render pass for `key`, created on first use
    ///
    /// A pass that targets a swapchain image depends on every swapchain view.
    pub(crate) fn render_pass(&self, key: &PassKey, views: &[ViewId], targets_surface: bool) -> Result<Arc<RenderPassObject>> {
        let mut inner = self.lock()?;
        if let Some(pass) = inner.passes.get(key) {
            return Ok(Arc::clone(pass));
        }
        let pass = Arc::new(RenderPassObject::new(Arc::clone(&self.ctx), key)?);
        let mut depends_on = views.to_vec();
        if targets_surface {
            depends_on.extend(inner.surface_views.iter().copied());
        }
        rhi_trace!("lumen::vulkan", "Created render pass for {} color attachments", key.colors.len());
        inner.passes.insert(key.clone(), depends_on, Arc::clone(&pass));
        Ok(pass)
    }

    /// Cached framebuffer for `render_pass` and the given attachments
    pub(crate) fn framebuffer(
        &self,
        render_pass: &Arc<RenderPassObject>,
        attachments: &[(ViewId, vk::ImageView)],
        extent: Extent2D,
    ) -> Result<Arc<FramebufferObject>> {
        let key = FramebufferKey {
            render_pass: render_pass.raw,
            views: attachments.iter().map(|(id, _)| *id).collect(),
            extent,
        };
        let mut inner = self.lock()?;
        if let Some(framebuffer) = inner.framebuffers.get(&key) {
            return Ok(Arc::clone(framebuffer));
        }

        let image_views: Vec<vk::ImageView> = attachments.iter().map(|(_, view)| *view).collect();
        let framebuffer_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.raw)
            .attachments(&image_views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let raw = unsafe {
            self.ctx.device.create_framebuffer(&framebuffer_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create framebuffer: {:?}", e))?
        };
        let framebuffer = Arc::new(FramebufferObject {
            ctx: Arc::clone(&self.ctx),
            raw,
            _render_pass: Arc::clone(render_pass),
        });
        let views = key.views.clone();
        inner.framebuffers.insert(key, views, Arc::clone(&framebuffer));
        Ok(framebuffer)
    }

    /// Destroy every cached object depending on any of `views`
    ///
    /// Returns how many objects were removed. Objects still retained by an
    /// in-flight command buffer are destroyed when that buffer releases them.
    pub(crate) fn sweep(&self, views: &[ViewId]) -> usize {
        let (passes, framebuffers) = match self.inner.lock() {
            Ok(mut inner) => (inner.passes.sweep(views), inner.framebuffers.sweep(views)),
            Err(_) => return 0,
        };
        passes.len() + framebuffers.len()
    }

    /// Sweep a single view (called when a texture view is dropped)
    pub(crate) fn release_view(&self, view: ViewId) -> usize {
        self.sweep(&[view])
    }

    /// View ids every tracked pass/framebuffer depends on
    pub(crate) fn tracked_views(&self) -> FxHashSet<ViewId> {
        match self.inner.lock() {
            Ok(inner) => {
                let mut views = inner.passes.tracked_views();
                views.extend(inner.framebuffers.tracked_views());
                views
            }
            Err(_) => FxHashSet::default(),
        }
    }

    pub(crate) fn clear(&self) {
        let drained = match self.inner.lock() {
            Ok(mut inner) => (inner.passes.drain(), inner.framebuffers.drain()),
            Err(_) => return,
        };
        drop(drained);
    }
}
