/// Texture / TextureView - Vulkan images and image views
///
/// Image layouts are tracked per image in a shared cell: command recording
/// reads the cell to pick the old layout of a transition and writes the new
/// one, so render passes and copies always start from the real layout.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use lumen_rhi::lumen::render::{
    Extent2D, ResolvedViewRange, TextureDesc, TextureDimension, TextureFormat, TextureUsage,
    TextureViewDesc, ViewId,
};
use lumen_rhi::lumen::{Error, Result};
use lumen_rhi::{rhi_bail, rhi_err, rhi_error, rhi_trace};
use std::sync::{Arc, Mutex};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    aspect_flags, image_type_to_vk, required_format_features, sample_count_to_vk,
    texture_format_to_vk, texture_usage_to_vk, view_type_to_vk,
};
use crate::vulkan_render_pass::PassCache;
use crate::vulkan_swapchain::SwapchainHandle;

/// Current layout of one image, shared by the image and all its views
pub(crate) type LayoutCell = Arc<Mutex<vk::ImageLayout>>;

pub(crate) fn new_layout_cell() -> LayoutCell {
    Arc::new(Mutex::new(vk::ImageLayout::UNDEFINED))
}

pub(crate) fn read_layout(cell: &LayoutCell) -> vk::ImageLayout {
    cell.lock().map(|layout| *layout).unwrap_or(vk::ImageLayout::UNDEFINED)
}

pub(crate) fn write_layout(cell: &LayoutCell, layout: vk::ImageLayout) {
    if let Ok(mut current) = cell.lock() {
        *current = layout;
    }
}

/// Native format for `format` that supports every feature `usage` implies
///
/// `Depth24PlusStencil8` falls back to a 32-bit float depth format on devices
/// without D24S8 support.
pub(crate) fn supported_vk_format(ctx: &GpuContext, format: TextureFormat, usage: TextureUsage) -> Result<vk::Format> {
    let native = texture_format_to_vk(format).ok_or_else(|| {
        rhi_err!(CreationFailed, "lumen::vulkan", "Format {:?} has no Vulkan equivalent", format)
    })?;
    let required = required_format_features(usage, format);
    let features = |format: vk::Format| unsafe {
        ctx.instance
            .get_physical_device_format_properties(ctx.physical_device, format)
            .optimal_tiling_features
    };

    let mut candidates = vec![native];
    if format == TextureFormat::Depth24PlusStencil8 {
        candidates.push(vk::Format::D32_SFLOAT_S8_UINT);
    }
    candidates
        .into_iter()
        .find(|&candidate| features(candidate).contains(required))
        .ok_or_else(|| {
            rhi_err!(
                CreationFailed,
                "lumen::vulkan",
                "Format {:?} does not support usage {:?} (missing {:?})",
                format,
                usage,
                required & !features(native)
            )
        })
}

/// Vulkan texture implementation
pub struct Texture {
    ctx: Arc<GpuContext>,
    pass_cache: Arc<PassCache>,
    /// Vulkan image
    pub(crate) raw: vk::Image,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    desc: TextureDesc,
    pub(crate) vk_format: vk::Format,
    pub(crate) layout: LayoutCell,
}

impl Texture {
    pub(crate) fn new(ctx: Arc<GpuContext>, pass_cache: Arc<PassCache>, desc: &TextureDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let format = supported_vk_format(&ctx, desc.format, desc.usage)?;

        unsafe {
            let samples = sample_count_to_vk(desc.sample_count);
            let supported_samples = if desc.format.is_depth() {
                ctx.limits.framebuffer_depth_sample_counts
            } else {
                ctx.limits.framebuffer_color_sample_counts
            };
            if !supported_samples.contains(samples) {
                rhi_bail!(CreationFailed, "lumen::vulkan", "Sample count {} not supported for {:?}", desc.sample_count, desc.format);
            }

            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(image_type_to_vk(desc.dimension))
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.size.width,
                    height: desc.size.height,
                    depth: if desc.dimension == TextureDimension::D3 {
                        desc.size.depth_or_array_layers
                    } else {
                        1
                    },
                })
                .mip_levels(desc.mip_level_count)
                .array_layers(desc.array_layer_count())
                .samples(samples)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(texture_usage_to_vk(desc.usage, desc.format))
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .flags(if desc.dimension == TextureDimension::D2
                    && desc.array_layer_count() >= 6
                    && desc.size.width == desc.size.height
                {
                    vk::ImageCreateFlags::CUBE_COMPATIBLE
                } else {
                    vk::ImageCreateFlags::empty()
                });

            let image = ctx.device.create_image(&image_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create texture image: {:?}", e))?;

            let requirements = ctx.device.get_image_memory_requirements(image);

            let allocation = match ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("texture"),
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }),
                Err(_) => {
                    ctx.device.destroy_image(image, None);
                    rhi_bail!(BackendError, "lumen::vulkan", "Allocator lock poisoned");
                }
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    ctx.device.destroy_image(image, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    rhi_error!(
                        "lumen::vulkan",
                        "Out of GPU memory for texture (size: {}x{}, layers: {}, {:.2} MB)",
                        desc.size.width,
                        desc.size.height,
                        desc.size.depth_or_array_layers,
                        size_mb
                    );
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_image(image, None);
                rhi_bail!(CreationFailed, "lumen::vulkan", "Failed to bind texture image memory: {:?}", e);
            }

            Ok(Self {
                ctx,
                pass_cache,
                raw: image,
                allocation: Some(allocation),
                desc: desc.clone(),
                vk_format: format,
                layout: new_layout_cell(),
            })
        }
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> TextureFormat {
        self.desc.format
    }

    /// Subresource range covering every mip and layer
    pub(crate) fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_flags(self.desc.format),
            base_mip_level: 0,
            level_count: self.desc.mip_level_count,
            base_array_layer: 0,
            layer_count: self.desc.array_layer_count(),
        }
    }

    /// Create a view over a mip/layer range of the texture
    pub fn create_view(self: &Arc<Self>, desc: &TextureViewDesc) -> Result<TextureView> {
        let range = desc
            .resolve(&self.desc)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: aspect_flags(self.desc.format),
            base_mip_level: range.base_mip_level,
            level_count: range.mip_level_count,
            base_array_layer: range.base_array_layer,
            layer_count: range.array_layer_count,
        };
        let view_create_info = vk::ImageViewCreateInfo::default()
            .image(self.raw)
            .view_type(view_type_to_vk(range.dimension))
            .format(self.vk_format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(subresource_range);

        let view = unsafe {
            self.ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create texture image view: {:?}", e))?
        };

        let extent = Extent2D::new(
            (self.desc.size.width >> range.base_mip_level).max(1),
            (self.desc.size.height >> range.base_mip_level).max(1),
        );

        Ok(TextureView {
            ctx: Arc::clone(&self.ctx),
            pass_cache: Arc::clone(&self.pass_cache),
            raw: view,
            image: self.raw,
            id: ViewId::next(),
            format: self.desc.format,
            vk_format: self.vk_format,
            extent,
            sample_count: self.desc.sample_count,
            usage: self.desc.usage,
            range: Some(range),
            full_range: self.full_range(),
            layout: Arc::clone(&self.layout),
            owner: ViewOwner::Texture(Arc::clone(self)),
        })
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_image(self.raw, None);
        }
    }
}

/// What keeps the image behind a view alive
pub(crate) enum ViewOwner {
    Texture(Arc<Texture>),
    Swapchain(Arc<SwapchainHandle>),
}

/// Vulkan texture view implementation
pub struct TextureView {
    ctx: Arc<GpuContext>,
    pass_cache: Arc<PassCache>,
    pub(crate) raw: vk::ImageView,
    pub(crate) image: vk::Image,
    id: ViewId,
    format: TextureFormat,
    pub(crate) vk_format: vk::Format,
    extent: Extent2D,
    sample_count: u32,
    usage: TextureUsage,
    range: Option<ResolvedViewRange>,
    /// Range used by layout transitions (layouts are tracked per image)
    pub(crate) full_range: vk::ImageSubresourceRange,
    pub(crate) layout: LayoutCell,
    owner: ViewOwner,
}

impl TextureView {
    /// Wrap a swapchain image; the view shares the swapchain's lifetime
    pub(crate) fn for_swapchain_image(
        ctx: Arc<GpuContext>,
        pass_cache: Arc<PassCache>,
        swapchain: Arc<SwapchainHandle>,
        image: vk::Image,
        format: TextureFormat,
        vk_format: vk::Format,
        extent: Extent2D,
    ) -> Result<Self> {
        let full_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        };
        let view_create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(vk_format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(full_range);

        let view = unsafe {
            ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create swapchain image view: {:?}", e))?
        };

        Ok(Self {
            ctx,
            pass_cache,
            raw: view,
            image,
            id: ViewId::next(),
            format,
            vk_format,
            extent,
            sample_count: 1,
            usage: TextureUsage::RENDER_ATTACHMENT,
            range: None,
            full_range,
            layout: new_layout_cell(),
            owner: ViewOwner::Swapchain(swapchain),
        })
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn extent(&self) -> Extent2D {
        self.extent
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn usage(&self) -> TextureUsage {
        self.usage
    }

    /// Mip/layer range of a texture view; `None` for swapchain images
    pub fn range(&self) -> Option<ResolvedViewRange> {
        self.range
    }

    pub fn is_surface(&self) -> bool {
        matches!(self.owner, ViewOwner::Swapchain(_))
    }

    /// Texture this view was created from; `None` for swapchain images
    pub fn texture(&self) -> Option<&Arc<Texture>> {
        match &self.owner {
            ViewOwner::Texture(texture) => Some(texture),
            ViewOwner::Swapchain(_) => None,
        }
    }
}

impl Drop for TextureView {
    fn drop(&mut self) {
        // Framebuffers referencing the view must go before the view itself
        let released = self.pass_cache.release_view(self.id);
        if released > 0 {
            rhi_trace!("lumen::vulkan", "View {:?} dropped {} cached pass objects", self.id, released);
        }
        unsafe {
            self.ctx.device.destroy_image_view(self.raw, None);
        }
    }
}
