/// Buffer - GL buffer object with a host shadow copy for mapping
///
/// GL mappings are replaced by a CPU-side copy: `get_mapped_range()` exposes
/// the shadow, `unmap()`/`flush()` upload it, and `map()` on a MAP_READ
/// buffer reads the GPU contents back into it.

use glow::HasContext;
use lumen_rhi::lumen::render::{check_buffer_range, BufferDesc, BufferUsage, MapState};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::gl_context::GlContext;

struct Shadow {
    state: MapState,
    data: Vec<u8>,
}

/// GL buffer implementation
pub struct Buffer {
    ctx: Arc<GlContext>,
    pub(crate) raw: glow::Buffer,
    desc: BufferDesc,
    shadow: Mutex<Shadow>,
}

/// Storage usage hint for `glBufferData`
fn usage_hint(desc: &BufferDesc) -> u32 {
    if desc.usage.contains(BufferUsage::MAP_READ) {
        glow::STREAM_READ
    } else if desc.usage.contains(BufferUsage::MAP_WRITE) || desc.mapped_at_creation {
        glow::DYNAMIC_DRAW
    } else {
        glow::STATIC_DRAW
    }
}

impl Buffer {
    pub(crate) fn new(ctx: Arc<GlContext>, desc: &BufferDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        let size = i32::try_from(desc.size)
            .map_err(|_| rhi_err!(CreationFailed, "lumen::gl", "Buffer size {} exceeds GL limits", desc.size))?;

        let raw = unsafe {
            let gl = &ctx.gl;
            let raw = gl
                .create_buffer()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create buffer: {}", e))?;
            // COPY_WRITE_BUFFER leaves the bound VAO's element buffer alone
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(raw));
            gl.buffer_data_size(glow::COPY_WRITE_BUFFER, size, usage_hint(desc));
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
            if gl.get_error() == glow::OUT_OF_MEMORY {
                gl.delete_buffer(raw);
                rhi_error!("lumen::gl", "Out of memory allocating a {}-byte buffer", desc.size);
                return Err(lumen_rhi::lumen::Error::OutOfMemory);
            }
            if let Some(label) = &desc.label {
                if gl.supports_debug() {
                    gl.object_label(glow::BUFFER, raw.0.get(), Some(label.as_str()));
                }
            }
            raw
        };

        let state = if desc.mapped_at_creation { MapState::Mapped } else { MapState::Unmapped };
        Ok(Self {
            ctx,
            raw,
            desc: desc.clone(),
            shadow: Mutex::new(Shadow {
                state,
                data: vec![0; desc.size as usize],
            }),
        })
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
        self.shadow.lock().map(|shadow| shadow.state).unwrap_or(MapState::Unmapped)
    }

    fn lock_shadow(&self) -> Result<MutexGuard<'_, Shadow>> {
        self.shadow
            .lock()
            .map_err(|_| rhi_err!(BackendError, "lumen::gl", "Buffer map state lock poisoned"))
    }

    fn upload(&self, offset: u64, data: &[u8]) {
        unsafe {
            let gl = &self.ctx.gl;
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, Some(self.raw));
            gl.buffer_sub_data_u8_slice(glow::COPY_WRITE_BUFFER, offset as i32, data);
            gl.bind_buffer(glow::COPY_WRITE_BUFFER, None);
        }
    }

    /// Borrow the mapped bytes (exactly `size` bytes)
    pub fn get_mapped_range(&self) -> Result<MappedRange<'_>> {
        let shadow = self.lock_shadow()?;
        if shadow.state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::gl", "get_mapped_range() on an unmapped buffer");
        }
        Ok(MappedRange { shadow })
    }

    /// End the mapping, uploading the host copy
    pub fn unmap(&self) -> Result<()> {
        let mut shadow = self.lock_shadow()?;
        if shadow.state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::gl", "unmap() on a buffer that is not mapped");
        }
        // Read-back mappings have nothing to upload
        if !self.desc.usage.contains(BufferUsage::MAP_READ) {
            self.upload(0, &shadow.data);
        }
        shadow.state = MapState::Unmapped;
        Ok(())
    }

    /// Upload host writes without ending the mapping
    pub fn flush(&self) -> Result<()> {
        let shadow = self.lock_shadow()?;
        if shadow.state != MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::gl", "flush() on a buffer that is not mapped");
        }
        self.upload(0, &shadow.data);
        Ok(())
    }

    /// Re-map a MAP_READ/MAP_WRITE buffer; MAP_READ pulls the GPU contents
    pub fn map(&self) -> Result<()> {
        if !self.desc.usage.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE) {
            rhi_bail!(InvalidUsage, "lumen::gl", "map() needs MAP_READ or MAP_WRITE usage");
        }
        let mut shadow = self.lock_shadow()?;
        if shadow.state == MapState::Mapped {
            rhi_bail!(InvalidUsage, "lumen::gl", "Buffer is already mapped");
        }
        if self.desc.usage.contains(BufferUsage::MAP_READ) {
            unsafe {
                let gl = &self.ctx.gl;
                gl.bind_buffer(glow::COPY_READ_BUFFER, Some(self.raw));
                gl.get_buffer_sub_data(glow::COPY_READ_BUFFER, 0, &mut shadow.data);
                gl.bind_buffer(glow::COPY_READ_BUFFER, None);
            }
        }
        shadow.state = MapState::Mapped;
        Ok(())
    }

    /// Copy `data` into the buffer at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        check_buffer_range(self.desc.size, offset, data.len() as u64)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        let mut shadow = self.lock_shadow()?;
        let mapped = shadow.state == MapState::Mapped;
        if !mapped && !self.desc.usage.contains(BufferUsage::MAP_WRITE) {
            rhi_bail!(InvalidUsage, "lumen::gl", "write() needs a mapped buffer or MAP_WRITE usage");
        }
        let start = offset as usize;
        shadow.data[start..start + data.len()].copy_from_slice(data);
        if !mapped {
            self.upload(offset, data);
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.ctx.gl.delete_buffer(self.raw) };
    }
}

/// Borrowed view of a mapped buffer
///
/// Holds the buffer's map-state lock: `unmap()` fails while a range is alive.
pub struct MappedRange<'a> {
    shadow: MutexGuard<'a, Shadow>,
}

impl Deref for MappedRange<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.shadow.data
    }
}

impl DerefMut for MappedRange<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.shadow.data
    }
}

#[cfg(test)]
#[path = "gl_buffer_tests.rs"]
mod tests;
