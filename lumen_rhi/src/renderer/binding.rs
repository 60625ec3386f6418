/// Binding model: bind group layouts, bind groups and pipeline layouts
///
/// A bind group layout is the blueprint of one descriptor set (Vulkan) or one
/// range of GL binding points. A bind group fills that blueprint with
/// resources and is immutable after creation.

use rustc_hash::FxHashSet;
use crate::error::{Error, Result};
use crate::renderer::{Api, ResourceMap, ShaderStages};

// ============================================================================
// Layout description
// ============================================================================

/// Type of resource bound at a given slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    /// Uniform buffer (read-only structured data)
    UniformBuffer {
        has_dynamic_offset: bool,
        min_binding_size: Option<u64>,
    },
    /// Storage buffer
    StorageBuffer {
        read_only: bool,
        has_dynamic_offset: bool,
    },
    /// Combined image sampler (texture + sampler in one binding)
    CombinedImageSampler,
}

impl BindingType {
    pub fn has_dynamic_offset(&self) -> bool {
        match self {
            BindingType::UniformBuffer { has_dynamic_offset, .. }
            | BindingType::StorageBuffer { has_dynamic_offset, .. } => *has_dynamic_offset,
            BindingType::CombinedImageSampler => false,
        }
    }
}

/// Description of a single binding slot within a bind group layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindGroupLayoutEntry {
    /// Binding number (corresponds to `layout(binding = N)` in GLSL)
    pub binding: u32,
    /// Shader stages that access this binding
    pub visibility: ShaderStages,
    /// Type of resource at this binding
    pub ty: BindingType,
    /// Number of descriptors at this binding (>1 for arrays)
    pub count: u32,
}

/// Descriptor for creating a bind group layout
#[derive(Debug, Clone, Default)]
pub struct BindGroupLayoutDesc {
    pub label: Option<String>,
    pub entries: Vec<BindGroupLayoutEntry>,
}

impl BindGroupLayoutDesc {
    pub fn validate(&self) -> Result<()> {
        let mut seen = FxHashSet::default();
        for entry in &self.entries {
            if !seen.insert(entry.binding) {
                return Err(Error::CreationFailed(format!(
                    "Binding {} declared twice in bind group layout",
                    entry.binding
                )));
            }
            if entry.count == 0 {
                return Err(Error::CreationFailed(format!("Binding {} has count 0", entry.binding)));
            }
            if entry.visibility.is_empty() {
                return Err(Error::CreationFailed(format!(
                    "Binding {} is visible to no shader stage",
                    entry.binding
                )));
            }
        }
        Ok(())
    }

    pub fn entry(&self, binding: u32) -> Option<&BindGroupLayoutEntry> {
        self.entries.iter().find(|entry| entry.binding == binding)
    }

    /// Number of bindings that take a dynamic offset at `set_bind_group` time
    pub fn dynamic_offset_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.ty.has_dynamic_offset()).count()
    }

    /// Check that a bind group provides exactly the resources this layout asks for
    pub fn check_bind_group<A: Api>(&self, entries: &[BindGroupEntry<'_, A>]) -> Result<()> {
        if entries.len() != self.entries.len() {
            return Err(Error::CreationFailed(format!(
                "Bind group has {} entries, layout expects {}",
                entries.len(),
                self.entries.len()
            )));
        }
        for entry in entries {
            let slot = self.entry(entry.binding).ok_or_else(|| {
                Error::CreationFailed(format!("Binding {} is not in the layout", entry.binding))
            })?;
            let compatible = matches!(
                (&slot.ty, &entry.resource),
                (BindingType::UniformBuffer { .. }, BindingResource::Buffer(_))
                    | (BindingType::StorageBuffer { .. }, BindingResource::Buffer(_))
                    | (BindingType::CombinedImageSampler, BindingResource::CombinedImageSampler { .. })
            );
            if !compatible {
                return Err(Error::CreationFailed(format!(
                    "Resource at binding {} does not match layout type {:?}",
                    entry.binding, slot.ty
                )));
            }
            if let (BindingType::UniformBuffer { min_binding_size: Some(min), .. }, BindingResource::Buffer(buffer)) =
                (&slot.ty, &entry.resource)
            {
                if let Some(size) = buffer.size {
                    if size < *min {
                        return Err(Error::CreationFailed(format!(
                            "Binding {} is {} bytes, layout requires at least {}",
                            entry.binding, size, min
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Bind groups
// ============================================================================

/// A buffer range bound to a slot
pub struct BufferBinding<'a, A: Api> {
    pub buffer: &'a A::Buffer,
    pub offset: u64,
    /// `None` = until the end of the buffer
    pub size: Option<u64>,
}

/// Resource bound to a slot
pub enum BindingResource<'a, A: Api> {
    Buffer(BufferBinding<'a, A>),
    CombinedImageSampler {
        view: &'a A::TextureView,
        sampler: &'a A::Sampler,
    },
}

/// One slot of a bind group
pub struct BindGroupEntry<'a, A: Api> {
    pub binding: u32,
    pub resource: BindingResource<'a, A>,
}

/// Descriptor for creating a bind group
pub struct BindGroupDesc<'a, A: Api> {
    pub label: Option<String>,
    pub layout: &'a A::BindGroupLayout,
    pub entries: Vec<BindGroupEntry<'a, A>>,
}

impl<'a, A: Api> BindGroupDesc<'a, A> {
    /// Resolve every referenced handle into another `Api`
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<BindGroupDesc<'a, B>> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let resource = match &entry.resource {
                BindingResource::Buffer(binding) => BindingResource::Buffer(BufferBinding {
                    buffer: map.buffer(binding.buffer)?,
                    offset: binding.offset,
                    size: binding.size,
                }),
                BindingResource::CombinedImageSampler { view, sampler } => {
                    BindingResource::CombinedImageSampler {
                        view: map.texture_view(*view)?,
                        sampler: map.sampler(*sampler)?,
                    }
                }
            };
            entries.push(BindGroupEntry { binding: entry.binding, resource });
        }
        Ok(BindGroupDesc {
            label: self.label.clone(),
            layout: map.bind_group_layout(self.layout)?,
            entries,
        })
    }
}

// ============================================================================
// Pipeline layouts
// ============================================================================

/// Push constant range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    /// Shader stages that can access these push constants
    pub stages: ShaderStages,
    /// Offset in bytes
    pub offset: u32,
    /// Size in bytes
    pub size: u32,
}

impl PushConstantRange {
    /// One past the last byte; computed in u64 so it cannot wrap
    pub fn end(&self) -> u64 {
        u64::from(self.offset) + u64::from(self.size)
    }
}

/// Bytes up to the end of the furthest range, saturated to `u32::MAX`
pub fn push_constant_block_size(ranges: &[PushConstantRange]) -> u32 {
    let end = ranges.iter().map(PushConstantRange::end).max().unwrap_or(0);
    u32::try_from(end).unwrap_or(u32::MAX)
}

/// Descriptor for creating a pipeline layout
pub struct PipelineLayoutDesc<'a, A: Api> {
    pub label: Option<String>,
    /// One layout per bind group index
    pub bind_group_layouts: Vec<&'a A::BindGroupLayout>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl<'a, A: Api> PipelineLayoutDesc<'a, A> {
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<PipelineLayoutDesc<'a, B>> {
        let bind_group_layouts = self
            .bind_group_layouts
            .iter()
            .map(|layout| map.bind_group_layout(*layout))
            .collect::<Result<Vec<_>>>()?;
        Ok(PipelineLayoutDesc {
            label: self.label.clone(),
            bind_group_layouts,
            push_constant_ranges: self.push_constant_ranges.clone(),
        })
    }

    /// Push constant ranges must be 4-byte aligned and fit `max_size`
    pub fn validate_push_constants(&self, max_size: u32) -> Result<()> {
        for range in &self.push_constant_ranges {
            if range.offset % 4 != 0 || range.size % 4 != 0 || range.size == 0 {
                return Err(Error::CreationFailed(format!(
                    "Push constant range {:?} must be non-empty and 4-byte aligned",
                    range
                )));
            }
            if range.end() > u64::from(max_size) {
                return Err(Error::CreationFailed(format!(
                    "Push constant range ends at {} bytes, device limit is {}",
                    range.end(),
                    max_size
                )));
            }
        }
        Ok(())
    }

    /// Total push constant block size
    pub fn push_constant_size(&self) -> u32 {
        push_constant_block_size(&self.push_constant_ranges)
    }
}

#[cfg(test)]
#[path = "binding_tests.rs"]
mod tests;
