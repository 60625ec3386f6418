/// BindGroupLayout / BindGroup / PipelineLayout - GL binding points
///
/// GL has no descriptor sets: a binding number is used directly as the
/// uniform buffer, shader storage buffer or texture unit index, whatever bind
/// group it belongs to. A pipeline layout therefore rejects groups that claim
/// the same binding point twice.

use glow::HasContext;
use lumen_rhi::lumen::render::{
    check_buffer_range, BindGroupDesc, BindGroupLayoutDesc, BindingResource, BindingType,
    push_constant_block_size, BufferUsage, PipelineLayoutDesc, PushConstantRange, TextureUsage,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::gl_buffer::Buffer;
use crate::gl_context::{GlContext, MAX_PUSH_CONSTANT_SIZE, PUSH_CONSTANT_BINDING};
use crate::gl_sampler::Sampler;
use crate::gl_texture::TextureView;
use crate::GlApi;

/// GL namespace a binding number lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum BindingPoint {
    Uniform(u32),
    Storage(u32),
    TextureUnit(u32),
}

impl BindingPoint {
    pub(crate) fn of(binding: u32, ty: &BindingType) -> Self {
        match ty {
            BindingType::UniformBuffer { .. } => BindingPoint::Uniform(binding),
            BindingType::StorageBuffer { .. } => BindingPoint::Storage(binding),
            BindingType::CombinedImageSampler => BindingPoint::TextureUnit(binding),
        }
    }
}

// ============================================================================
// BindGroupLayout
// ============================================================================

/// GL bind group layout implementation
pub struct BindGroupLayout {
    desc: BindGroupLayoutDesc,
}

impl BindGroupLayout {
    pub(crate) fn new(desc: &BindGroupLayoutDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        for entry in &desc.entries {
            if entry.count != 1 {
                rhi_bail!(
                    CreationFailed,
                    "lumen::gl",
                    "Binding {} is an array of {}; the GL backend binds single resources",
                    entry.binding,
                    entry.count
                );
            }
            if BindingPoint::of(entry.binding, &entry.ty) == BindingPoint::Uniform(PUSH_CONSTANT_BINDING) {
                rhi_bail!(
                    CreationFailed,
                    "lumen::gl",
                    "Uniform binding {} is reserved for push constants",
                    PUSH_CONSTANT_BINDING
                );
            }
        }
        Ok(Self { desc: desc.clone() })
    }

    pub fn desc(&self) -> &BindGroupLayoutDesc {
        &self.desc
    }
}

// ============================================================================
// BindGroup
// ============================================================================

pub(crate) enum BoundResource {
    Buffer {
        point: BindingPoint,
        buffer: Arc<Buffer>,
        offset: u64,
        size: u64,
        dynamic: bool,
    },
    Texture {
        unit: u32,
        view: Arc<TextureView>,
        sampler: Arc<Sampler>,
    },
}

/// GL bind group implementation
pub struct BindGroup {
    /// Sorted by binding number, the order dynamic offsets are consumed in
    pub(crate) resources: Vec<BoundResource>,
    layout: Arc<BindGroupLayout>,
}

impl BindGroup {
    pub(crate) fn new(ctx: &GlContext, desc: &BindGroupDesc<'_, GlApi>) -> Result<Self> {
        let layout = Arc::clone(desc.layout);
        layout
            .desc
            .check_bind_group(&desc.entries)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;

        let mut entries: Vec<_> = desc.entries.iter().collect();
        entries.sort_by_key(|entry| entry.binding);

        let mut resources = Vec::with_capacity(entries.len());
        for entry in entries {
            let ty = layout
                .desc
                .entry(entry.binding)
                .map(|slot| slot.ty)
                .ok_or_else(|| rhi_err!(CreationFailed, "lumen::gl", "Binding {} is not in the layout", entry.binding))?;
            match &entry.resource {
                BindingResource::Buffer(binding) => {
                    let (required, alignment) = match ty {
                        BindingType::UniformBuffer { .. } => {
                            (BufferUsage::UNIFORM, ctx.limits.uniform_buffer_offset_alignment)
                        }
                        _ => (BufferUsage::STORAGE, ctx.limits.storage_buffer_offset_alignment),
                    };
                    if !binding.buffer.usage().contains(required) {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::gl",
                            "Buffer at binding {} lacks {:?} usage",
                            entry.binding,
                            required
                        );
                    }
                    if binding.offset % alignment.max(1) as u64 != 0 {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::gl",
                            "Offset {} at binding {} is not aligned to {}",
                            binding.offset,
                            entry.binding,
                            alignment
                        );
                    }
                    let size = binding
                        .size
                        .unwrap_or(binding.buffer.size().saturating_sub(binding.offset));
                    check_buffer_range(binding.buffer.size(), binding.offset, size)
                        .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
                    if size == 0 {
                        rhi_bail!(CreationFailed, "lumen::gl", "Binding {} has an empty buffer range", entry.binding);
                    }
                    resources.push(BoundResource::Buffer {
                        point: BindingPoint::of(entry.binding, &ty),
                        buffer: Arc::clone(binding.buffer),
                        offset: binding.offset,
                        size,
                        dynamic: ty.has_dynamic_offset(),
                    });
                }
                BindingResource::CombinedImageSampler { view, sampler } => {
                    if !view.usage().contains(TextureUsage::TEXTURE_BINDING) {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::gl",
                            "View at binding {} was not created with TEXTURE_BINDING usage",
                            entry.binding
                        );
                    }
                    if view.is_surface() {
                        rhi_bail!(CreationFailed, "lumen::gl", "The surface view cannot be sampled");
                    }
                    resources.push(BoundResource::Texture {
                        unit: entry.binding,
                        view: Arc::clone(view),
                        sampler: Arc::clone(sampler),
                    });
                }
            }
        }

        Ok(Self { resources, layout })
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }

    /// Number of dynamic offsets `set_bind_group` must supply
    pub fn dynamic_offset_count(&self) -> usize {
        self.layout.desc.dynamic_offset_count()
    }

    /// Bind every resource to its binding point
    pub(crate) unsafe fn apply(&self, gl: &glow::Context, dynamic_offsets: &[u32]) {
        let mut dynamic = dynamic_offsets.iter();
        for resource in &self.resources {
            match resource {
                BoundResource::Buffer { point, buffer, offset, size, dynamic: is_dynamic } => {
                    let extra = if *is_dynamic { dynamic.next().copied().unwrap_or(0) as u64 } else { 0 };
                    let (target, index) = match point {
                        BindingPoint::Uniform(index) => (glow::UNIFORM_BUFFER, *index),
                        BindingPoint::Storage(index) => (glow::SHADER_STORAGE_BUFFER, *index),
                        BindingPoint::TextureUnit(_) => continue,
                    };
                    gl.bind_buffer_range(target, index, Some(buffer.raw), (offset + extra) as i32, *size as i32);
                }
                BoundResource::Texture { unit, view, sampler } => {
                    gl.active_texture(glow::TEXTURE0 + unit);
                    view.bind_for_sampling(gl);
                    gl.bind_sampler(*unit, Some(sampler.raw));
                }
            }
        }
    }

    /// Dynamic offsets must keep each range inside its buffer
    pub(crate) fn check_dynamic_offsets(&self, dynamic_offsets: &[u32]) -> Result<()> {
        let mut dynamic = dynamic_offsets.iter();
        for resource in &self.resources {
            if let BoundResource::Buffer { buffer, offset, size, dynamic: true, .. } = resource {
                let extra = dynamic.next().copied().unwrap_or(0) as u64;
                check_buffer_range(buffer.size(), offset + extra, *size)
                    .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// PipelineLayout
// ============================================================================

/// GL pipeline layout implementation
pub struct PipelineLayout {
    pub(crate) bind_group_layouts: Vec<Arc<BindGroupLayout>>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    pub(crate) fn new(desc: &PipelineLayoutDesc<'_, GlApi>) -> Result<Self> {
        desc.validate_push_constants(MAX_PUSH_CONSTANT_SIZE)
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;

        let mut claimed = FxHashSet::default();
        for (group, layout) in desc.bind_group_layouts.iter().enumerate() {
            for entry in &layout.desc.entries {
                if !claimed.insert(BindingPoint::of(entry.binding, &entry.ty)) {
                    rhi_bail!(
                        CreationFailed,
                        "lumen::gl",
                        "Bind group {} reuses GL binding point {:?}",
                        group,
                        BindingPoint::of(entry.binding, &entry.ty)
                    );
                }
            }
        }

        Ok(Self {
            bind_group_layouts: desc.bind_group_layouts.iter().map(|layout| Arc::clone(*layout)).collect(),
            push_constant_ranges: desc.push_constant_ranges.clone(),
        })
    }

    pub fn push_constant_ranges(&self) -> &[PushConstantRange] {
        &self.push_constant_ranges
    }

    /// Bytes covered by push constant ranges
    pub fn push_constant_size(&self) -> u32 {
        push_constant_block_size(&self.push_constant_ranges)
    }
}

#[cfg(test)]
#[path = "gl_binding_tests.rs"]
mod tests;
