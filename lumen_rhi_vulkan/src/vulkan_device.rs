/// Device / Queue - Vulkan backend entry points
///
/// The device owns the swapchain, one synchronization slot per swapchain image
/// and the render pass cache. Frame protocol per slot:
///
/// 1. `begin_frame` waits on the slot fence, recycles the slot's command pool
///    and acquires an image (signaling the slot's image-available semaphore)
/// 2. command buffers submitted while the frame is open are deferred
/// 3. `end_frame` transitions the image to PRESENT_SRC, resets the fence and
///    submits the whole batch, then presents and advances the frame ring
///
/// No per-frame whole-device wait: the device only idles on resize and drop.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use lumen_rhi::lumen::render::{
    BindGroupDesc, BindGroupLayoutDesc, BufferDesc, Extent2D, FramePhase, FrameRing, FrameStatus,
    PipelineLayoutDesc, RenderPipelineDesc, SamplerDesc, ShaderModuleDesc, TextureDesc,
    TextureFormat, TextureViewDesc, ViewId,
};
use lumen_rhi::lumen::{Config, Result};
use lumen_rhi::{rhi_bail, rhi_debug, rhi_err, rhi_error, rhi_info, rhi_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashSet;
use std::ffi::CString;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_binding::{BindGroup, BindGroupLayout, PipelineLayout};
use crate::vulkan_buffer::Buffer;
use crate::vulkan_command::{CommandBuffer, CommandEncoder, CommandOrigin};
use crate::vulkan_context::{GpuContext, GpuContextParts};
use crate::vulkan_frame::FrameSlot;
use crate::vulkan_pipeline::RenderPipeline;
use crate::vulkan_render_pass::PassCache;
use crate::vulkan_sampler::Sampler;
use crate::vulkan_shader::ShaderModule;
use crate::vulkan_swapchain::{Acquired, Surface, Swapchain};
use crate::vulkan_texture::{Texture, TextureView};

const VALIDATION_LAYER: &std::ffi::CStr = c"VK_LAYER_KHRONOS_validation";

// ============================================================================
// Frame state
// ============================================================================

/// Everything the frame protocol mutates, shared by the device and its queue
struct FrameState {
    swapchain: Swapchain,
    slots: Vec<FrameSlot>,
    ring: FrameRing,
    phase: FramePhase,
    /// Image acquired by the open frame
    acquired: Option<u32>,
    /// Incremented on each acquired frame; tags frame-pool command buffers
    serial: u64,
    /// Command buffers deferred to the frame batch
    pending: Vec<CommandBuffer>,
    /// Zero-area surface: frames are skipped until a non-zero resize
    degenerate: bool,
    /// Acquire or present reported a suboptimal swapchain
    needs_rebuild: bool,
    requested_extent: Extent2D,
    surface_format: TextureFormat,
    surface_vk_format: vk::Format,
}

// ============================================================================
// Queue
// ============================================================================

/// Vulkan queue implementation
pub struct Queue {
    ctx: Arc<GpuContext>,
    state: Arc<Mutex<FrameState>>,
    fence_timeout_ns: u64,
}

impl Queue {
    /// Submit finished command buffers
    ///
    /// Inside a frame the buffers join the batch `end_frame` submits. Outside
    /// a frame they are submitted now and the call waits for completion.
    pub fn submit(&self, buffers: Vec<CommandBuffer>) -> Result<()> {
        if buffers.is_empty() {
            return Ok(());
        }
        let mut state = lock_state(&self.state)?;
        if state.phase.is_recording() {
            let serial = state.serial;
            if let Some(stale) = buffers
                .iter()
                .find(|buffer| matches!(buffer.origin(), CommandOrigin::Frame { serial: s } if s != serial))
            {
                rhi_bail!(
                    InvalidUsage,
                    "lumen::vulkan",
                    "Command buffer recorded in frame {:?} submitted in frame {}",
                    stale.origin(),
                    serial
                );
            }
            state.pending.extend(buffers);
            return Ok(());
        }

        if buffers.iter().any(|buffer| buffer.origin() != CommandOrigin::Upload) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Frame command buffer submitted after its frame ended");
        }
        drop(state);
        self.submit_immediate(buffers)
    }

    fn submit_immediate(&self, buffers: Vec<CommandBuffer>) -> Result<()> {
        let raws: Vec<vk::CommandBuffer> = buffers.iter().map(|buffer| buffer.raw.raw).collect();
        let submit_info = vk::SubmitInfo::default().command_buffers(&raws);
        unsafe {
            self.ctx.device.reset_fences(&[self.ctx.immediate_fence])
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to reset immediate fence: {:?}", e))?;
            self.ctx.device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], self.ctx.immediate_fence)
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to submit command buffers: {:?}", e))?;
        }
        self.ctx.wait_fence(self.ctx.immediate_fence, self.fence_timeout_ns)?;
        // Completed: release retained resources and free the buffers
        drop(buffers);
        Ok(())
    }
}

fn lock_state(state: &Mutex<FrameState>) -> Result<MutexGuard<'_, FrameState>> {
    state
        .lock()
        .map_err(|_| rhi_err!(BackendError, "lumen::vulkan", "Frame state lock poisoned"))
}

// ============================================================================
// Device
// ============================================================================

/// Vulkan device implementation
pub struct Device {
    ctx: Arc<GpuContext>,
    pass_cache: Arc<PassCache>,
    state: Arc<Mutex<FrameState>>,
    queue: Arc<Queue>,
    config: Config,
}

impl Device {
    /// Create a device presenting to `window`, whose drawable size is `size`
    pub fn new<W: HasDisplayHandle + HasWindowHandle + ?Sized>(window: &W, size: Extent2D, config: Config) -> Result<Self> {
        let enable_validation = config.enable_validation || cfg!(feature = "vulkan-validation");

        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to load Vulkan library: {:?}", e))?;

            let app_name = CString::new(config.app_name.as_str())
                .map_err(|_| rhi_err!(CreationFailed, "lumen::vulkan", "Application name contains a NUL byte"))?;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(
                    0,
                    config.app_version.0,
                    config.app_version.1,
                    config.app_version.2,
                ))
                .engine_name(c"Lumen")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_2);

            let display_handle = window.display_handle()
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get display handle: {}", e))?;
            let window_handle = window.window_handle()
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get window handle: {}", e))?;
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to get required extensions: {:?}", e))?
                .to_vec();

            // Validation needs the layer to be installed
            let validation = enable_validation && {
                let available = entry.enumerate_instance_layer_properties().unwrap_or_default();
                let found = available
                    .iter()
                    .any(|layer| layer.layer_name_as_c_str().map(|name| name == VALIDATION_LAYER).unwrap_or(false));
                if !found {
                    rhi_warn!("lumen::vulkan", "Validation requested but {:?} is not installed", VALIDATION_LAYER);
                }
                found
            };
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }
            let layer_names = if validation {
                vec![VALIDATION_LAYER.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);
            let instance = entry.create_instance(&create_info, None)
                .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to create Vulkan instance: {:?}", e))?;

            let debug_utils = if validation {
                crate::debug::init_debug_severity(config.debug_severity);
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
                    .message_severity(crate::debug::messenger_severity_flags(config.debug_severity))
                    .message_type(
                        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                    )
                    .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));
                match loader.create_debug_utils_messenger(&debug_info, None) {
                    Ok(messenger) => Some((loader, messenger)),
                    Err(e) => {
                        instance.destroy_instance(None);
                        rhi_bail!(QueryFailed, "lumen::vulkan", "Failed to create debug messenger: {:?}", e);
                    }
                }
            } else {
                None
            };
            // Releases the instance-level objects if device setup fails below
            let destroy_instance = |debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>| {
                if let Some((loader, messenger)) = debug_utils {
                    loader.destroy_debug_utils_messenger(messenger, None);
                }
                instance.destroy_instance(None);
            };

            let raw_surface = match ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            ) {
                Ok(surface) => surface,
                Err(e) => {
                    destroy_instance(debug_utils);
                    rhi_bail!(QueryFailed, "lumen::vulkan", "Failed to create surface: {:?}", e);
                }
            };
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            let (physical_device, queue_family) = match Self::pick_physical_device(&instance, &surface_loader, raw_surface) {
                Ok(choice) => choice,
                Err(e) => {
                    surface_loader.destroy_surface(raw_surface, None);
                    destroy_instance(debug_utils);
                    return Err(e);
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            rhi_info!(
                "lumen::vulkan",
                "Using GPU '{}' ({:?})",
                properties.device_name_as_c_str().map(|name| name.to_string_lossy()).unwrap_or_default(),
                properties.device_type
            );

            let supported_features = instance.get_physical_device_features(physical_device);
            let sampler_anisotropy = supported_features.sampler_anisotropy == vk::TRUE;
            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(sampler_anisotropy)
                .fill_mode_non_solid(supported_features.fill_mode_non_solid == vk::TRUE);

            let queue_priorities = [1.0];
            let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
                .queue_family_index(queue_family)
                .queue_priorities(&queue_priorities)];
            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];
            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = match instance.create_device(physical_device, &device_create_info, None) {
                Ok(device) => device,
                Err(e) => {
                    surface_loader.destroy_surface(raw_surface, None);
                    destroy_instance(debug_utils);
                    rhi_bail!(QueryFailed, "lumen::vulkan", "Failed to create logical device: {:?}", e);
                }
            };

            let allocator = match Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            }) {
                Ok(allocator) => allocator,
                Err(e) => {
                    device.destroy_device(None);
                    surface_loader.destroy_surface(raw_surface, None);
                    destroy_instance(debug_utils);
                    rhi_bail!(CreationFailed, "lumen::vulkan", "Failed to create GPU allocator: {:?}", e);
                }
            };

            // From here on the context owns (and destroys) the instance and device
            let ctx = match GpuContext::new(GpuContextParts {
                entry,
                instance,
                physical_device,
                device,
                allocator,
                graphics_queue_family: queue_family,
                present_queue_family: queue_family,
                sampler_anisotropy,
                debug_utils,
            }) {
                Ok(ctx) => Arc::new(ctx),
                Err(e) => {
                    surface_loader.destroy_surface(raw_surface, None);
                    return Err(e);
                }
            };
            let surface = Arc::new(Surface::new(Arc::clone(&ctx), raw_surface));

            let pass_cache = Arc::new(PassCache::new(Arc::clone(&ctx)));
            let swapchain = Swapchain::new(
                Arc::clone(&ctx),
                Arc::clone(&pass_cache),
                surface,
                config.prefer_low_latency,
            );
            // Chosen up front so pipelines targeting Presentation work while
            // the window has no area yet
            let (surface_format, surface_vk_format) = swapchain.select_format()?;

            let state = Arc::new(Mutex::new(FrameState {
                swapchain,
                slots: Vec::new(),
                ring: FrameRing::new(1),
                phase: FramePhase::Idle,
                acquired: None,
                serial: 0,
                pending: Vec::new(),
                degenerate: true,
                needs_rebuild: false,
                requested_extent: size,
                surface_format,
                surface_vk_format,
            }));
            {
                let mut guard = lock_state(&state)?;
                Self::rebuild(&ctx, &mut guard)?;
            }

            let queue = Arc::new(Queue {
                ctx: Arc::clone(&ctx),
                state: Arc::clone(&state),
                fence_timeout_ns: config.fence_timeout_ns(),
            });

            Ok(Self {
                ctx,
                pass_cache,
                state,
                queue,
                config,
            })
        }
    }

    /// First suitable GPU, discrete preferred, with one family for graphics and present
    unsafe fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let physical_devices = instance.enumerate_physical_devices()
            .map_err(|e| rhi_err!(QueryFailed, "lumen::vulkan", "Failed to enumerate physical devices: {:?}", e))?;

        let mut candidates: Vec<(u32, vk::PhysicalDevice, u32)> = physical_devices
            .into_iter()
            .filter_map(|physical_device| {
                let has_swapchain = instance
                    .enumerate_device_extension_properties(physical_device)
                    .unwrap_or_default()
                    .iter()
                    .any(|ext| ext.extension_name_as_c_str().map(|name| name == ash::khr::swapchain::NAME).unwrap_or(false));
                if !has_swapchain {
                    return None;
                }
                let family = instance
                    .get_physical_device_queue_family_properties(physical_device)
                    .iter()
                    .enumerate()
                    .find(|(index, family)| {
                        family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
                            && surface_loader
                                .get_physical_device_surface_support(physical_device, *index as u32, surface)
                                .unwrap_or(false)
                    })
                    .map(|(index, _)| index as u32)?;
                let rank = match instance.get_physical_device_properties(physical_device).device_type {
                    vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                    vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                    vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                    _ => 3,
                };
                Some((rank, physical_device, family))
            })
            .collect();
        candidates.sort_by_key(|(rank, _, _)| *rank);
        candidates
            .first()
            .map(|&(_, physical_device, family)| (physical_device, family))
            .ok_or_else(|| {
                rhi_err!(QueryFailed, "lumen::vulkan", "No GPU with a graphics queue that can present to the surface")
            })
    }

    /// Rebuild the swapchain (and slots when the image count changes)
    /// for the last requested extent
    fn rebuild(ctx: &Arc<GpuContext>, state: &mut FrameState) -> Result<()> {
        ctx.wait_idle()?;
        // Idle: every slot's work has completed
        for slot in state.slots.iter_mut() {
            slot.recycle()?;
        }
        state.pending.clear();
        state.needs_rebuild = false;

        let surface_extent = state.swapchain.surface_extent()?;
        if state.requested_extent.is_degenerate() || surface_extent.map(|e| e.is_degenerate()).unwrap_or(false) {
            state.swapchain.destroy();
            if !state.degenerate {
                rhi_debug!("lumen::vulkan", "Surface is degenerate, frames are skipped until a resize");
            }
            state.degenerate = true;
            return Ok(());
        }

        let config = state.swapchain.build(state.requested_extent)?;
        let image_count = state.swapchain.image_count();
        if image_count != state.slots.len() {
            state.slots = FrameSlot::create_ring(ctx, image_count)?;
            state.ring.resize(image_count);
        }
        state.surface_format = config.format.format;
        state.surface_vk_format = state.swapchain.vk_format();
        state.degenerate = false;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, FrameState>> {
        lock_state(&self.state)
    }

    // ===== Frames =====

    /// Open a frame
    ///
    /// Returns `Skipped` while the surface is degenerate or when the swapchain
    /// was out of date and had to be rebuilt; `end_frame` must still be called.
    pub fn begin_frame(&self) -> Result<FrameStatus> {
        let mut state = self.lock()?;
        if state.phase != FramePhase::Idle {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "begin_frame called twice without end_frame");
        }

        let current = state.ring.current();
        if let Some(slot) = state.slots.get_mut(current) {
            slot.wait(self.config.fence_timeout_ns())?;
            slot.recycle()?;
        }

        if state.degenerate {
            state.phase.begin(FrameStatus::Skipped)?;
            return Ok(FrameStatus::Skipped);
        }

        let image_available = state
            .slots
            .get(current)
            .map(|slot| slot.image_available)
            .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "No frame slot {}", current))?;

        match state.swapchain.acquire(image_available, self.config.fence_timeout_ns())? {
            Acquired::Image { index, suboptimal } => {
                state.acquired = Some(index);
                state.needs_rebuild = suboptimal;
                state.serial += 1;
                state.phase.begin(FrameStatus::Ready)?;
                Ok(FrameStatus::Ready)
            }
            Acquired::OutOfDate => {
                rhi_debug!("lumen::vulkan", "Swapchain out of date on acquire, rebuilding");
                Self::rebuild(&self.ctx, &mut state)?;
                state.phase.begin(FrameStatus::Skipped)?;
                Ok(FrameStatus::Skipped)
            }
        }
    }

    /// Close the frame: submit the batch, present and advance the ring
    pub fn end_frame(&self) -> Result<()> {
        let mut state = self.lock()?;
        let phase = state.phase.end().inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        match phase {
            FramePhase::Recording => self.submit_and_present(&mut state),
            _ => {
                // Nothing was acquired; only the slot fence is waited
                let current = state.ring.current();
                if let Some(slot) = state.slots.get(current) {
                    slot.wait(self.config.fence_timeout_ns())?;
                }
                Ok(())
            }
        }
    }

    fn submit_and_present(&self, state: &mut FrameState) -> Result<()> {
        let index = state
            .acquired
            .take()
            .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "Frame has no acquired image"))?;
        let current = state.ring.current();
        let view = state
            .swapchain
            .image_views()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "Acquired image {} out of range", index))?;
        let (pool, fence, image_available) = match state.slots.get(current) {
            Some(slot) => (slot.command_pool, slot.fence, slot.image_available),
            None => rhi_bail!(BackendError, "lumen::vulkan", "No frame slot {}", current),
        };
        let render_finished = state
            .slots
            .get(index as usize)
            .map(|slot| slot.render_finished)
            .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "No semaphore for image {}", index))?;

        let mut present = CommandEncoder::new(
            Arc::clone(&self.ctx),
            Arc::clone(&self.pass_cache),
            pool,
            CommandOrigin::Frame { serial: state.serial },
        )?;
        present.transition_for_present(&view);
        let mut batch = std::mem::take(&mut state.pending);
        batch.push(present.finish()?);

        let raws: Vec<vk::CommandBuffer> = batch.iter().map(|buffer| buffer.raw.raw).collect();
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&raws)
            .signal_semaphores(&signal_semaphores);

        // Reset right before the submit that signals it
        if let Some(slot) = state.slots.get(current) {
            slot.reset_fence()?;
        }
        let submitted = unsafe {
            self.ctx.device.queue_submit(self.ctx.graphics_queue, &[submit_info], fence)
        };
        if let Err(e) = submitted {
            // Signal the fence anyway so the slot's next wait does not hang
            unsafe {
                self.ctx.device.queue_submit(self.ctx.graphics_queue, &[], fence).ok();
            }
            rhi_bail!(BackendError, "lumen::vulkan", "Failed to submit frame: {:?}", e);
        }
        if let Some(slot) = state.slots.get_mut(current) {
            slot.retain(batch);
        }
        drop(view);

        let suboptimal = state.swapchain.present(index, render_finished)?;
        state.ring.advance();

        if suboptimal || state.needs_rebuild {
            rhi_debug!("lumen::vulkan", "Swapchain suboptimal on present, rebuilding");
            Self::rebuild(&self.ctx, state)?;
        }
        Ok(())
    }

    /// Rebuild the swapchain for a new drawable size
    ///
    /// A zero-area size marks the surface degenerate until a non-zero resize.
    pub fn on_window_resize(&self, size: Extent2D) -> Result<()> {
        let mut state = self.lock()?;
        if state.phase != FramePhase::Idle {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "on_window_resize called inside a frame");
        }
        state.requested_extent = size;
        Self::rebuild(&self.ctx, &mut state)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.ctx.wait_idle()
    }

    pub fn queue(&self) -> Arc<Queue> {
        Arc::clone(&self.queue)
    }

    /// View of the image acquired by the open frame
    pub fn surface_view(&self) -> Option<Arc<TextureView>> {
        let state = self.lock().ok()?;
        if !state.phase.is_recording() {
            return None;
        }
        let index = state.acquired?;
        state.swapchain.image_views().get(index as usize).cloned()
    }

    // ===== Resource creation =====

    pub fn create_buffer(&self, desc: &BufferDesc) -> Result<Arc<Buffer>> {
        Buffer::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_texture(&self, desc: &TextureDesc) -> Result<Arc<Texture>> {
        Texture::new(Arc::clone(&self.ctx), Arc::clone(&self.pass_cache), desc).map(Arc::new)
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
        BindGroupLayout::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_bind_group(&self, desc: &BindGroupDesc<'_, crate::VulkanApi>) -> Result<Arc<BindGroup>> {
        BindGroup::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc<'_, crate::VulkanApi>) -> Result<Arc<PipelineLayout>> {
        PipelineLayout::new(Arc::clone(&self.ctx), desc).map(Arc::new)
    }

    pub fn create_render_pipeline(&self, desc: &RenderPipelineDesc<'_, crate::VulkanApi>) -> Result<Arc<RenderPipeline>> {
        let surface_format = self.lock()?.surface_vk_format;
        if surface_format == vk::Format::UNDEFINED {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Surface format is not known yet");
        }
        RenderPipeline::new(Arc::clone(&self.ctx), desc, surface_format).map(Arc::new)
    }

    /// Start recording; inside a frame the buffer comes from the frame slot
    pub fn create_command_encoder(&self) -> Result<CommandEncoder> {
        let state = self.lock()?;
        if state.phase.is_recording() {
            let current = state.ring.current();
            let pool = state
                .slots
                .get(current)
                .map(|slot| slot.command_pool)
                .ok_or_else(|| rhi_err!(BackendError, "lumen::vulkan", "No frame slot {}", current))?;
            CommandEncoder::new(
                Arc::clone(&self.ctx),
                Arc::clone(&self.pass_cache),
                pool,
                CommandOrigin::Frame { serial: state.serial },
            )
        } else {
            drop(state);
            let pool = self
                .ctx
                .upload_command_pool
                .lock()
                .map_err(|_| rhi_err!(BackendError, "lumen::vulkan", "Upload pool lock poisoned"))?;
            CommandEncoder::new(Arc::clone(&self.ctx), Arc::clone(&self.pass_cache), *pool, CommandOrigin::Upload)
        }
    }

    // ===== Introspection =====

    pub fn frame_index(&self) -> usize {
        self.lock().map(|state| state.ring.current()).unwrap_or(0)
    }

    pub fn image_count(&self) -> usize {
        self.lock().map(|state| state.ring.count()).unwrap_or(0)
    }

    pub fn surface_format(&self) -> TextureFormat {
        self.lock().map(|state| state.surface_format).unwrap_or(TextureFormat::Bgra8Unorm)
    }

    pub fn surface_extent(&self) -> Extent2D {
        self.lock().map(|state| state.swapchain.extent()).unwrap_or_default()
    }

    pub fn is_degenerate(&self) -> bool {
        self.lock().map(|state| state.degenerate).unwrap_or(true)
    }

    /// View ids every cached render pass and framebuffer depends on
    pub fn tracked_attachment_views(&self) -> FxHashSet<ViewId> {
        self.pass_cache.tracked_views()
    }

    /// Ids of all current swapchain image views
    pub fn surface_views(&self) -> Vec<ViewId> {
        self.pass_cache.surface_views()
    }

    /// Command buffers held by the slots until their fences are waited
    pub fn in_flight_command_buffers(&self) -> usize {
        self.lock()
            .map(|state| state.slots.iter().map(FrameSlot::in_flight_count).sum())
            .unwrap_or(0)
    }

    pub fn limits(&self) -> vk::PhysicalDeviceLimits {
        self.ctx.limits
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.ctx.wait_idle().ok();
        if let Ok(mut state) = self.state.lock() {
            state.pending.clear();
            state.slots.clear();
            state.swapchain.destroy();
        }
        self.pass_cache.clear();
    }
}
