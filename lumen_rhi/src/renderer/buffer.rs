/// Buffer descriptor, usage flags and mapping helpers

use bitflags::bitflags;
use crate::error::{Error, Result};

bitflags! {
    /// Buffer usage flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Host can map the buffer for reading
        const MAP_READ = 1 << 0;
        /// Host can map the buffer for writing
        const MAP_WRITE = 1 << 1;
        /// Source of copy commands
        const COPY_SRC = 1 << 2;
        /// Destination of copy commands
        const COPY_DST = 1 << 3;
        /// Index buffer
        const INDEX = 1 << 4;
        /// Vertex buffer
        const VERTEX = 1 << 5;
        /// Uniform/constant buffer
        const UNIFORM = 1 << 6;
        /// Storage buffer
        const STORAGE = 1 << 7;
    }
}

/// Descriptor for creating a buffer
#[derive(Debug, Clone)]
pub struct BufferDesc {
    /// Debug label
    pub label: Option<String>,
    /// Size in bytes
    pub size: u64,
    /// Buffer usage
    pub usage: BufferUsage,
    /// Map the buffer immediately; `get_mapped_range()` is valid until `unmap()`
    pub mapped_at_creation: bool,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            label: None,
            size: 0,
            usage: BufferUsage::empty(),
            mapped_at_creation: false,
        }
    }
}

impl BufferDesc {
    /// Check the descriptor before any backend object is created
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::CreationFailed("Buffer size must be non-zero".to_string()));
        }
        if self.usage.is_empty() {
            return Err(Error::CreationFailed("Buffer usage must not be empty".to_string()));
        }
        if self.usage.contains(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE) {
            return Err(Error::CreationFailed(
                "Buffer usage cannot combine MAP_READ and MAP_WRITE".to_string(),
            ));
        }
        Ok(())
    }

    /// True when the host needs access to the memory at some point
    pub fn is_host_visible(&self) -> bool {
        self.mapped_at_creation
            || self.usage.intersects(BufferUsage::MAP_READ | BufferUsage::MAP_WRITE)
    }
}

/// Host mapping state of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    /// Not mapped; the GPU may use the buffer
    Unmapped,
    /// Mapped; the host may read/write the mapped range
    Mapped,
}

/// Validate a `[offset, offset + len)` range against a buffer of `size` bytes
pub fn check_buffer_range(size: u64, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidUsage(format!(
            "Range [{}, +{}) exceeds buffer size {}",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
