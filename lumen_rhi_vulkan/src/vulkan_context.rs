/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything a resource needs for its own creation and destruction:
/// - Instance and logical device for Vulkan API calls
/// - Allocator for memory management
/// - Queues for command submission and presentation
/// - Command pool and fence for immediate (outside-a-frame) submissions
/// - Descriptor pools for bind groups

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use lumen_rhi::lumen::Result;
use lumen_rhi::rhi_err;
use std::mem::ManuallyDrop;
use std::sync::Mutex;

const DESCRIPTOR_POOL_SETS: u32 = 1024;

/// Shared GPU context for all Vulkan resources.
///
/// Every resource holds an `Arc<GpuContext>`, so the logical device and the
/// instance are destroyed only once the last resource created from them is
/// gone.
pub struct GpuContext {
    /// Vulkan entry (keeps the loader library alive)
    _entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    /// Vulkan logical device
    pub device: ash::Device,
    /// GPU memory allocator
    /// Wrapped in ManuallyDrop to ensure it's dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue: vk::Queue,
    pub(crate) surface_loader: ash::khr::surface::Instance,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,
    /// Pool for command buffers recorded outside a frame
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    pub(crate) upload_command_pool: Mutex<vk::CommandPool>,
    /// Fence for immediate submissions
    pub(crate) immediate_fence: vk::Fence,
    /// Descriptor pools for bind group allocation (grows when exhausted)
    pub(crate) descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,
    pub(crate) limits: vk::PhysicalDeviceLimits,
    /// Whether the samplerAnisotropy feature was enabled
    pub(crate) sampler_anisotropy: bool,
    pub(crate) debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

/// Parts assembled by `Device::new` before the context exists
pub(crate) struct GpuContextParts {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub allocator: Allocator,
    pub graphics_queue_family: u32,
    pub present_queue_family: u32,
    pub sampler_anisotropy: bool,
    pub debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl GpuContext {
    pub(crate) fn new(parts: GpuContextParts) -> Result<Self> {
        let GpuContextParts {
            entry,
            instance,
            physical_device,
            device,
            allocator,
            graphics_queue_family,
            present_queue_family,
            sampler_anisotropy,
            debug_utils,
        } = parts;

        unsafe {
            let graphics_queue = device.get_device_queue(graphics_queue_family, 0);
            let present_queue = device.get_device_queue(present_queue_family, 0);
            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);
            let limits = instance.get_physical_device_properties(physical_device).limits;

            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            let upload_command_pool = device
                .create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create upload command pool: {:?}", e))?;

            let immediate_fence = device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create immediate fence: {:?}", e))?;

            let descriptor_pool = Self::create_descriptor_pool(&device)?;

            Ok(Self {
                _entry: entry,
                instance,
                physical_device,
                device,
                allocator: ManuallyDrop::new(Mutex::new(allocator)),
                graphics_queue,
                graphics_queue_family,
                present_queue,
                surface_loader,
                swapchain_loader,
                upload_command_pool: Mutex::new(upload_command_pool),
                immediate_fence,
                descriptor_pools: Mutex::new(vec![descriptor_pool]),
                limits,
                sampler_anisotropy,
                debug_utils,
            })
        }
    }

    /// Create a descriptor pool with fixed capacity.
    /// Called during init and when every existing pool is exhausted.
    pub(crate) fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2 * DESCRIPTOR_POOL_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: DESCRIPTOR_POOL_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: DESCRIPTOR_POOL_SETS / 4,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: DESCRIPTOR_POOL_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                descriptor_count: DESCRIPTOR_POOL_SETS / 4,
            },
        ];
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(DESCRIPTOR_POOL_SETS);

        unsafe {
            device
                .create_descriptor_pool(&info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create descriptor pool: {:?}", e))
        }
    }

    /// Block until the device has finished all submitted work
    pub(crate) fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }

    /// Wait on `fence` for at most `timeout_ns`; expiry is a backend error
    pub(crate) fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
        unsafe {
            match self.device.wait_for_fences(&[fence], true, timeout_ns) {
                Ok(()) => Ok(()),
                Err(vk::Result::TIMEOUT) => Err(rhi_err!(
                    BackendError,
                    "lumen::vulkan",
                    "Fence wait timed out after {} ms",
                    timeout_ns / 1_000_000
                )),
                Err(e) => Err(rhi_err!(BackendError, "lumen::vulkan", "Failed to wait for fence: {:?}", e)),
            }
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            self.device.device_wait_idle().ok();

            if let Ok(pools) = self.descriptor_pools.get_mut() {
                for pool in pools.drain(..) {
                    self.device.destroy_descriptor_pool(pool, None);
                }
            }
            if let Ok(pool) = self.upload_command_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }
            self.device.destroy_fence(self.immediate_fence, None);

            // Allocator must release its memory blocks while the device is alive
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}
