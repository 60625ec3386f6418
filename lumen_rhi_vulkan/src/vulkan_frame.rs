/// FrameSlot - per swapchain image synchronization and command allocation
///
/// Protocol for one slot:
/// 1. wait on the fence of the slot's previous submission
/// 2. release the command buffers (and the resources they retain)
/// 3. reset the slot's transient command pool
/// 4. acquire, signaling `image_available`
/// 5. reset the fence right before the frame's submit, which signals it

use ash::vk;
use lumen_rhi::lumen::Result;
use lumen_rhi::rhi_err;
use std::sync::Arc;

use crate::vulkan_command::CommandBuffer;
use crate::vulkan_context::GpuContext;

pub(crate) struct FrameSlot {
    ctx: Arc<GpuContext>,
    pub(crate) fence: vk::Fence,
    pub(crate) image_available: vk::Semaphore,
    /// Signaled by the frame submit, waited by present (indexed by acquired image)
    pub(crate) render_finished: vk::Semaphore,
    pub(crate) command_pool: vk::CommandPool,
    /// Command buffers submitted with the slot's last frame
    in_flight: Vec<CommandBuffer>,
}

impl FrameSlot {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        unsafe {
            // Created signaled so the first wait returns immediately
            let fence = ctx.device
                .create_fence(&vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED), None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create frame fence: {:?}", e))?;

            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            let image_available = match ctx.device.create_semaphore(&semaphore_create_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    ctx.device.destroy_fence(fence, None);
                    return Err(rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create image-available semaphore: {:?}", e));
                }
            };
            let render_finished = match ctx.device.create_semaphore(&semaphore_create_info, None) {
                Ok(semaphore) => semaphore,
                Err(e) => {
                    ctx.device.destroy_semaphore(image_available, None);
                    ctx.device.destroy_fence(fence, None);
                    return Err(rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create render-finished semaphore: {:?}", e));
                }
            };

            let pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(ctx.graphics_queue_family)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT);
            let command_pool = match ctx.device.create_command_pool(&pool_create_info, None) {
                Ok(pool) => pool,
                Err(e) => {
                    ctx.device.destroy_semaphore(render_finished, None);
                    ctx.device.destroy_semaphore(image_available, None);
                    ctx.device.destroy_fence(fence, None);
                    return Err(rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create frame command pool: {:?}", e));
                }
            };

            Ok(Self {
                ctx,
                fence,
                image_available,
                render_finished,
                command_pool,
                in_flight: Vec::new(),
            })
        }
    }

    /// Create one slot per swapchain image
    pub(crate) fn create_ring(ctx: &Arc<GpuContext>, count: usize) -> Result<Vec<Self>> {
        (0..count).map(|_| Self::new(Arc::clone(ctx))).collect()
    }

    /// Wait for the slot's previous submission
    pub(crate) fn wait(&self, timeout_ns: u64) -> Result<()> {
        self.ctx.wait_fence(self.fence, timeout_ns)
    }

    /// Drop retained command buffers and recycle the pool
    ///
    /// Only valid once the fence has been waited.
    pub(crate) fn recycle(&mut self) -> Result<()> {
        self.in_flight.clear();
        unsafe {
            self.ctx.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to reset frame command pool: {:?}", e))
        }
    }

    /// Keep `buffers` alive until the slot is recycled
    pub(crate) fn retain(&mut self, buffers: impl IntoIterator<Item = CommandBuffer>) {
        self.in_flight.extend(buffers);
    }

    pub(crate) fn reset_fence(&self) -> Result<()> {
        unsafe {
            self.ctx.device
                .reset_fences(&[self.fence])
                .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to reset frame fence: {:?}", e))
        }
    }

    pub(crate) fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        unsafe {
            // Buffers allocated from the pool die with it
            self.in_flight.clear();
            self.ctx.device.destroy_command_pool(self.command_pool, None);
            self.ctx.device.destroy_semaphore(self.render_finished, None);
            self.ctx.device.destroy_semaphore(self.image_available, None);
            self.ctx.device.destroy_fence(self.fence, None);
        }
    }
}
