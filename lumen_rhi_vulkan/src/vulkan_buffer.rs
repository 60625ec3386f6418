/// Buffer - Vulkan buffer with persistent host mapping
///
/// Host-visible buffers stay mapped for their whole lifetime; `map()`/`unmap()`
/// only switch the logical map state and perform the cache maintenance needed
/// for non-coherent memory.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use lumen_rhi::lumen::render::{check_buffer_range, BufferDesc, BufferUsage, MapState};
use lumen_rhi::lumen::{Error, Result};
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::buffer_usage_to_vk;

/// Memory location for a buffer descriptor
pub(crate) fn memory_location(desc: &BufferDesc) -> MemoryLocation {
    if desc.mapped_at_creation || desc.usage.contains(BufferUsage::MAP_WRITE) {
        MemoryLocation::CpuToGpu
    } else if desc.usage.contains(BufferUsage::MAP_READ) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::GpuOnly
    }
}

/// Vulkan buffer implementation
pub struct Buffer {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer
    pub(crate) raw: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    desc: BufferDesc,
    /// Logical map state
    state: Mutex<MapState>,
    coherent: bool,
}

impl Buffer {
    /// Create a buffer and allocate its memory
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BufferDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(buffer_usage_to_vk(desc.usage))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx.device.create_buffer(&buffer_create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create buffer of size {} bytes: {:?}", desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let location = memory_location(desc);

            let allocation = {
                let mut allocator = match ctx.allocator.lock() {
                    Ok(allocator) => allocator,
                    Err(_) => {
                        ctx.device.destroy_buffer(buffer, None);
                        rhi_bail!(BackendError, "lumen::vulkan", "Allocator lock poisoned");
                    }
                };
                allocator.allocate(&AllocationCreateDesc {
                    name: desc.label.as_deref().unwrap_or("buffer"),
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(_) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    rhi_error!("lumen::vulkan", "Out of GPU memory for buffer (required: {:.2} MB)", size_mb);
                    return Err(Error::OutOfMemory);
                }
            };

            if let Err(e) = ctx.device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_buffer(buffer, None);
                rhi_bail!(CreationFailed, "lumen::vulkan", "Failed to bind buffer memory: {:?}", e);
            }

            if location != MemoryLocation::GpuOnly && allocation.mapped_ptr().is_none() {
                if let Ok(mut allocator) = ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
                ctx.device.destroy_buffer(buffer, None);
                rhi_bail!(CreationFailed, "lumen::vulkan", "Host-visible buffer memory could not be mapped");
            }

            let coherent = allocation
                .memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT);
            let state = if desc.mapped_at_creation {
                MapState::Mapped
            } else {
                MapState::Unmapped
            };

            Ok(Self {
                ctx,
                raw: buffer,
                allocation: Some(allocation),
                desc: desc.clone(),
                state: Mutex::new(state),
                coherent,
            })
        }
    }

    pub fn size(&self) -> u64 {
        self.desc.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.desc
    }

    pub fn map_state(&self) -> MapState {
        self.state.lock().map(|state| *state).unwrap_or(MapState::Unmapped)
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, MapState>> {
        self.state.try_lock().map_err(|_| {
            rhi_err!(InvalidUsage, "lumen::vulkan", "Buffer mapping is borrowed by a live mapped range")
        })
    }

    fn mapped_ptr(&self) -> Result<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|allocation| allocation.mapped_ptr())
            .map(|ptr| ptr.as_ptr() as *mut u8)
            .ok_or_else(|| rhi_err!(InvalidUsage, "lumen::vulkan", "Buffer is not CPU-accessible"))
    }

    /// Flush (`invalidate == false`) or invalidate host caches for the whole buffer
    fn sync_host_range(&self, invalidate: bool) -> Result<()> {
        if self.coherent {
            return Ok(());
        }
        let Some(allocation) = self.allocation.as_ref() else {
            return Ok(());
        };
        let atom = self.ctx.limits.non_coherent_atom_size.max(1);
        let range = vk::MappedMemoryRange::default()
            .memory(unsafe { allocation.memory() })
            .offset(allocation.offset() / atom * atom)
            .size(vk::WHOLE_SIZE);
        unsafe {
            if invalidate {
                self.ctx.device.invalidate_mapped_memory_ranges(&[range])
                    .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to invalidate buffer memory: {:?}", e))
            } else {
                self.ctx.device.flush_mapped_memory_ranges(&[range])
                    .map_err(|e| rhi_err!(BackendError, "lumen::vulkan", "Failed to flush buffer memory: {:?}", e))
            }
        }
    }

    /// Borrow the mapped bytes (exactly `size` bytes)
    pub fn get_mapped_range(&self) -> Result<MappedRange<'_>> {
        let state = self.lock_state()?;
        if *state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "get_mapped_range() on an unmapped buffer");
        }
        let ptr = self.mapped_ptr()?;
        Ok(MappedRange {
            _state: state,
            ptr,
            len: self.desc.size as usize,
        })
    }

    /// End the mapping, flushing host writes when memory is not coherent
    pub fn unmap(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        if *state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "unmap() on a buffer that is not mapped");
        }
        self.sync_host_range(false)?;
        *state = MapState::Unmapped;
        Ok(())
    }

    /// Flush host writes without ending the mapping
    pub fn flush(&self) -> Result<()> {
        let state = self.lock_state()?;
        if *state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "flush() on a buffer that is not mapped");
        }
        self.sync_host_range(false)
    }

    /// Re-map a MAP_READ/MAP_WRITE buffer
    ///
    /// The caller must have waited for GPU work writing the buffer.
    pub fn map(&self) -> Result<()> {
        if !self.desc.usage.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "map() needs MAP_READ or MAP_WRITE usage");
        }
        let mut state = self.lock_state()?;
        if *state == MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "Buffer is already mapped");
        }
        self.sync_host_range(true)?;
        *state = MapState::Mapped;
        Ok(())
    }

    /// Copy `data` into the buffer at `offset` through the host mapping
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.desc.size, offset, data.len() as u64)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
        let state = self.lock_state()?;
        let mapped = *state == MapState::Mapped;
        if !mapped && !self.desc.usage.contains(BufferUsage::MAP_WRITE) {
            rhi_bail!(InvalidUsage, "lumen::vulkan", "write() needs a mapped buffer or MAP_WRITE usage");
        }
        let ptr = self.mapped_ptr()?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr.add(offset as usize), data.len());
        }
        if !mapped {
            self.sync_host_range(false)?;
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            // Free GPU memory
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if lock fails - we still need to destroy the buffer
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }

            self.ctx.device.destroy_buffer(self.raw, None);
        }
    }
}

/// Borrowed view of a mapped buffer
///
/// Holds the buffer's map-state lock: `unmap()` fails while a range is alive.
pub struct MappedRange<'a> {
    _state: MutexGuard<'a, MapState>,
    ptr: *mut u8,
    len: usize,
}

impl Deref for MappedRange<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for MappedRange<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
