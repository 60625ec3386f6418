/// Surface and Swapchain - presentation objects
///
/// The surface lives as long as the device. The swapchain is rebuilt on
/// resize: the views of the old images are released (and every cached
/// framebuffer that used them swept), the old swapchain is destroyed, then the
/// new one is created. A swapchain whose views are still held elsewhere is
/// retired instead and destroyed when the last of those views goes.

use ash::vk;
use lumen_rhi::lumen::render::{
    Extent2D, PresentMode, SurfaceCapabilities, SurfaceFormat, SwapchainConfig, TextureFormat, ViewId,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_debug, rhi_err, rhi_error, rhi_info};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    color_space_from_vk, color_space_to_vk, present_mode_from_vk, present_mode_to_vk,
    texture_format_from_vk, texture_format_to_vk,
};
use crate::vulkan_render_pass::PassCache;
use crate::vulkan_texture::{write_layout, TextureView};

/// Presentation surface, destroyed on drop
pub(crate) struct Surface {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::SurfaceKHR,
}

impl Surface {
    pub(crate) fn new(ctx: Arc<GpuContext>, raw: vk::SurfaceKHR) -> Self {
        Self { ctx, raw }
    }

    /// Translate the native capability query into the backend-neutral form
    pub(crate) fn capabilities(&self) -> Result<(SurfaceCapabilities, vk::SurfaceCapabilitiesKHR)> {
        let caps = unsafe {
            self.ctx.surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.raw)
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get surface capabilities: {:?}", e))?
        };
        // u32::MAX means the swapchain decides the size
        let current_extent = if caps.current_extent.width == u32::MAX {
            None
        } else {
            Some(Extent2D::new(caps.current_extent.width, caps.current_extent.height))
        };
        let capabilities = SurfaceCapabilities {
            min_image_count: caps.min_image_count,
            max_image_count: caps.max_image_count,
            current_extent,
            min_extent: Extent2D::new(caps.min_image_extent.width, caps.min_image_extent.height),
            max_extent: Extent2D::new(caps.max_image_extent.width, caps.max_image_extent.height),
        };
        Ok((capabilities, caps))
    }

    /// Formats the surface offers that have a backend-neutral equivalent
    pub(crate) fn formats(&self) -> Result<Vec<SurfaceFormat>> {
        let formats = unsafe {
            self.ctx.surface_loader
                .get_physical_device_surface_formats(self.ctx.physical_device, self.raw)
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get surface formats: {:?}", e))?
        };
        Ok(formats
            .iter()
            .filter_map(|f| {
                Some(SurfaceFormat {
                    format: texture_format_from_vk(f.format)?,
                    color_space: color_space_from_vk(f.color_space)?,
                })
            })
            .collect())
    }

    pub(crate) fn present_modes(&self) -> Result<Vec<PresentMode>> {
        let modes = unsafe {
            self.ctx.surface_loader
                .get_physical_device_surface_present_modes(self.ctx.physical_device, self.raw)
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get present modes: {:?}", e))?
        };
        Ok(modes.into_iter().filter_map(present_mode_from_vk).collect())
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.ctx.surface_loader.destroy_surface(self.raw, None);
        }
    }
}

/// Native swapchain handle, destroyed when the last image view lets go of it
pub struct SwapchainHandle {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::SwapchainKHR,
    _surface: Arc<Surface>,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe {
            self.ctx.swapchain_loader.destroy_swapchain(self.raw, None);
        }
    }
}

/// Result of `Swapchain::acquire`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

/// Swapchain images and their views
pub(crate) struct Swapchain {
    ctx: Arc<GpuContext>,
    pass_cache: Arc<PassCache>,
    surface: Arc<Surface>,
    handle: Option<Arc<SwapchainHandle>>,
    images: Vec<vk::Image>,
    views: Vec<Arc<TextureView>>,
    config: Option<SwapchainConfig>,
    vk_format: vk::Format,
    prefer_low_latency: bool,
}

impl Swapchain {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pass_cache: Arc<PassCache>,
        surface: Arc<Surface>,
        prefer_low_latency: bool,
    ) -> Self {
        Self {
            ctx,
            pass_cache,
            surface,
            handle: None,
            images: Vec::new(),
            views: Vec::new(),
            config: None,
            vk_format: vk::Format::UNDEFINED,
            prefer_low_latency,
        }
    }

    /// Format the swapchain will use, known before any image exists
    pub(crate) fn select_format(&self) -> Result<(TextureFormat, vk::Format)> {
        let chosen = SwapchainConfig::select_format(&self.surface.formats()?)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        let vk_format = texture_format_to_vk(chosen.format).ok_or_else(|| {
            rhi_err!(CreationFailed, "lumen::vulkan", "Surface format {:?} has no Vulkan equivalent", chosen.format)
        })?;
        Ok((chosen.format, vk_format))
    }

    /// Build (or rebuild) the swapchain for `requested`
    ///
    /// Returns the chosen configuration. The caller must make sure no
    /// submitted work still uses the old images.
    pub(crate) fn build(&mut self, requested: Extent2D) -> Result<SwapchainConfig> {
        let (capabilities, caps) = self.surface.capabilities()?;
        let formats = self.surface.formats()?;
        let present_modes = self.surface.present_modes()?;
        let config = SwapchainConfig::select(&capabilities, &formats, &present_modes, requested, self.prefer_low_latency)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        if config.extent.width == 0 || config.extent.height == 0 {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Cannot build a swapchain of size {}x{}", config.extent.width, config.extent.height);
        }

        let vk_format = texture_format_to_vk(config.format.format).ok_or_else(|| {
            rhi_err!(CreationFailed, "lumen::vulkan", "Surface format {:?} has no Vulkan equivalent", config.format.format)
        })?;

        // Old views go first so their framebuffers are swept, then the old
        // swapchain unless a caller still holds one of its views (it is then
        // retired through `old_swapchain`)
        let old_handle = self.handle.take();
        self.release_views();
        let retired = old_handle.and_then(|handle| Arc::try_unwrap(handle).err());

        let image_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | (caps.supported_usage_flags & (vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST));
        let composite_alpha = [
            vk::CompositeAlphaFlagsKHR::OPAQUE,
            vk::CompositeAlphaFlagsKHR::INHERIT,
            vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        ]
        .into_iter()
        .find(|&mode| caps.supported_composite_alpha.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE);

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.raw)
            .min_image_count(config.image_count)
            .image_format(vk_format)
            .image_color_space(color_space_to_vk(config.format.color_space))
            .image_extent(vk::Extent2D { width: config.extent.width, height: config.extent.height })
            .image_array_layers(1)
            .image_usage(image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(composite_alpha)
            .present_mode(present_mode_to_vk(config.present_mode))
            .clipped(true)
            .old_swapchain(retired.as_ref().map(|h| h.raw).unwrap_or(vk::SwapchainKHR::null()));

        let raw = unsafe {
            self.ctx.swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create swapchain: {:?}", e))?
        };
        drop(retired);

        let handle = Arc::new(SwapchainHandle {
            ctx: Arc::clone(&self.ctx),
            raw,
            _surface: Arc::clone(&self.surface),
        });

        let images = unsafe {
            self.ctx.swapchain_loader
                .get_swapchain_images(raw)
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get swapchain images: {:?}", e))?
        };

        let views = images
            .iter()
            .map(|&image| {
                TextureView::for_swapchain_image(
                    Arc::clone(&self.ctx),
                    Arc::clone(&self.pass_cache),
                    Arc::clone(&handle),
                    image,
                    config.format.format,
                    vk_format,
                    config.extent,
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        self.pass_cache.set_surface_views(views.iter().map(|view| view.id()).collect())?;

        rhi_info!(
            "lumen::vulkan",
            "Swapchain built: {}x{}, {} images, {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            images.len(),
            config.format.format,
            config.present_mode
        );

        self.handle = Some(handle);
        self.images = images;
        self.views = views;
        self.vk_format = vk_format;
        self.config = Some(config);
        Ok(config)
    }

    fn release_views(&mut self) {
        let ids: Vec<ViewId> = self.views.iter().map(|view| view.id()).collect();
        let swept = self.pass_cache.sweep(&ids);
        if swept > 0 {
            rhi_debug!("lumen::vulkan", "Swept {} pass objects of the old swapchain", swept);
        }
        self.views.clear();
        self.images.clear();
        self.pass_cache.set_surface_views(Vec::new()).ok();
    }

    /// Release views then the swapchain; the surface is kept
    ///
    /// Calling it again is a no-op.
    pub(crate) fn destroy(&mut self) {
        if self.handle.is_none() && self.views.is_empty() {
            return;
        }
        self.release_views();
        self.handle = None;
        self.config = None;
    }

    /// Extent the surface currently reports, `None` when the swapchain decides
    pub(crate) fn surface_extent(&self) -> Result<Option<Extent2D>> {
        Ok(self.surface.capabilities()?.0.current_extent)
    }

    pub(crate) fn is_built(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub(crate) fn image_views(&self) -> &[Arc<TextureView>] {
        &self.views
    }

    pub(crate) fn image_count(&self) -> usize {
        self.images.len()
    }

    pub(crate) fn config(&self) -> Option<SwapchainConfig> {
        self.config
    }

    pub(crate) fn vk_format(&self) -> vk::Format {
        self.vk_format
    }

    pub(crate) fn extent(&self) -> Extent2D {
        self.config.map(|config| config.extent).unwrap_or_default()
    }

    /// Acquire the next image, signaling `semaphore`
    ///
    /// The acquired image's tracked layout is reset to UNDEFINED: its previous
    /// contents were presented and are not kept.
    pub(crate) fn acquire(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> Result<Acquired> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            rhi_err!(InvalidUsage, "lumen::vulkan", "Acquire on a destroyed swapchain")
        })?;
        let result = unsafe {
            self.ctx.swapchain_loader
                .acquire_next_image(handle.raw, timeout_ns, semaphore, vk::Fence::null())
        };
        match result {
            Ok((index, suboptimal)) => {
                if let Some(view) = self.views.get(index as usize) {
                    write_layout(&view.layout, vk::ImageLayout::UNDEFINED);
                }
                Ok(Acquired::Image { index, suboptimal })
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(rhi_err!(BackendError, "lumen::vulkan", "Swapchain image acquire timed out"))
            }
            Err(e) => Err(rhi_err!(BackendError, "lumen::vulkan", "Failed to acquire swapchain image: {:?}", e)),
        }
    }

    /// Queue image `index` for presentation
    ///
    /// Returns `true` when the swapchain should be rebuilt.
    pub(crate) fn present(&self, index: u32, wait: vk::Semaphore) -> Result<bool> {
        let handle = self.handle.as_ref().ok_or_else(|| {
            rhi_err!(InvalidUsage, "lumen::vulkan", "Present on a destroyed swapchain")
        })?;
        let swapchains = [handle.raw];
        let indices = [index];
        let wait_semaphores = [wait];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        match unsafe { self.ctx.swapchain_loader.queue_present(self.ctx.present_queue, &present_info) } {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(rhi_err!(BackendError, "lumen::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy();
    }
}
