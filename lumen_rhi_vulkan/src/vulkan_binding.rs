/// BindGroupLayout / BindGroup / PipelineLayout - Vulkan descriptor model
///
/// A bind group is one descriptor set allocated from the context's growable
/// pool list. It keeps every resource it references alive, so a command
/// buffer that retains the group retains the resources too.

use ash::vk;
use lumen_rhi::lumen::render::{
    check_buffer_range, BindGroupDesc, BindGroupLayoutDesc, BindingResource, BindingType,
    push_constant_block_size, BufferUsage, PipelineLayoutDesc, PushConstantRange, TextureUsage,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_debug, rhi_err, rhi_error};
use std::sync::Arc;

use crate::vulkan_buffer::Buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{binding_type_to_vk, shader_stages_to_vk};
use crate::vulkan_sampler::Sampler;
use crate::vulkan_texture::TextureView;
use crate::VulkanApi;

// ============================================================================
// BindGroupLayout
// ============================================================================

/// Vulkan bind group layout implementation
pub struct BindGroupLayout {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::DescriptorSetLayout,
    desc: BindGroupLayoutDesc,
}

impl BindGroupLayout {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BindGroupLayoutDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(binding_type_to_vk(entry.ty))
                    .descriptor_count(entry.count)
                    .stage_flags(shader_stages_to_vk(entry.visibility))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let raw = unsafe {
            ctx.device.create_descriptor_set_layout(&create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create descriptor set layout: {:?}", e))?
        };

        Ok(Self { ctx, raw, desc: desc.clone() })
    }

    pub fn desc(&self) -> &BindGroupLayoutDesc {
        &self.desc
    }
}

impl Drop for BindGroupLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_set_layout(self.raw, None);
        }
    }
}

// ============================================================================
// BindGroup
// ============================================================================

/// Resources a bind group keeps alive
enum BoundResource {
    Buffer(Arc<Buffer>),
    Image(Arc<TextureView>, Arc<Sampler>),
}

/// Vulkan bind group implementation (one descriptor set)
pub struct BindGroup {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::DescriptorSet,
    pool: vk::DescriptorPool,
    layout: Arc<BindGroupLayout>,
    _resources: Vec<BoundResource>,
}

impl BindGroup {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &BindGroupDesc<'_, VulkanApi>) -> Result<Self> {
        let layout = Arc::clone(desc.layout);
        layout
            .desc
            .check_bind_group(&desc.entries)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        // Validate resources before allocating anything
        let mut resources = Vec::with_capacity(desc.entries.len());
        for entry in &desc.entries {
            let ty = layout
                .desc
                .entry(entry.binding)
                .map(|slot| slot.ty)
                .ok_or_else(|| rhi_err!(CreationFailed, "lumen::vulkan", "Binding {} is not in the layout", entry.binding))?;
            match &entry.resource {
                BindingResource::Buffer(binding) => {
                    let (required, alignment) = match ty {
                        BindingType::UniformBuffer { .. } => {
                            (BufferUsage::UNIFORM, ctx.limits.min_uniform_buffer_offset_alignment)
                        }
                        _ => (BufferUsage::STORAGE, ctx.limits.min_storage_buffer_offset_alignment),
                    };
                    if !binding.buffer.usage().contains(required) {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::vulkan",
                            "Buffer at binding {} lacks {:?} usage",
                            entry.binding,
                            required
                        );
                    }
                    if binding.offset % alignment.max(1) != 0 {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::vulkan",
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
                        .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;
                    if size == 0 {
                        rhi_bail!(CreationFailed, "lumen::vulkan", "Binding {} has an empty buffer range", entry.binding);
                    }
                    resources.push(BoundResource::Buffer(Arc::clone(binding.buffer)));
                }
                BindingResource::CombinedImageSampler { view, sampler } => {
                    if !view.usage().contains(TextureUsage::TEXTURE_BINDING) {
                        rhi_bail!(
                            CreationFailed,
                            "lumen::vulkan",
                            "View at binding {} was not created with TEXTURE_BINDING usage",
                            entry.binding
                        );
                    }
                    resources.push(BoundResource::Image(Arc::clone(view), Arc::clone(sampler)));
                }
            }
        }

        let (raw, pool) = Self::allocate_set(&ctx, layout.raw)?;

        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for entry in &desc.entries {
            match &entry.resource {
                BindingResource::Buffer(binding) => {
                    let range = binding
                        .size
                        .unwrap_or(binding.buffer.size() - binding.offset);
                    buffer_infos.push((
                        entry.binding,
                        vk::DescriptorBufferInfo {
                            buffer: binding.buffer.raw,
                            offset: binding.offset,
                            range,
                        },
                    ));
                }
                BindingResource::CombinedImageSampler { view, sampler } => {
                    image_infos.push((
                        entry.binding,
                        vk::DescriptorImageInfo {
                            sampler: sampler.raw,
                            image_view: view.raw,
                            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                        },
                    ));
                }
            }
        }

        let mut writes = Vec::with_capacity(desc.entries.len());
        for (binding, info) in &buffer_infos {
            let ty = layout.desc.entry(*binding).map(|slot| slot.ty);
            if let Some(ty) = ty {
                writes.push(
                    vk::WriteDescriptorSet::default()
                        .dst_set(raw)
                        .dst_binding(*binding)
                        .descriptor_type(binding_type_to_vk(ty))
                        .buffer_info(std::slice::from_ref(info)),
                );
            }
        }
        for (binding, info) in &image_infos {
            writes.push(
                vk::WriteDescriptorSet::default()
                    .dst_set(raw)
                    .dst_binding(*binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(info)),
            );
        }

        unsafe {
            ctx.device.update_descriptor_sets(&writes, &[]);
        }

        Ok(Self {
            ctx,
            raw,
            pool,
            layout,
            _resources: resources,
        })
    }

    /// Allocate from the first pool with room, growing the pool list when all are full
    fn allocate_set(ctx: &GpuContext, layout: vk::DescriptorSetLayout) -> Result<(vk::DescriptorSet, vk::DescriptorPool)> {
        let mut pools = ctx
            .descriptor_pools
            .lock()
            .map_err(|_| rhi_err!(BackendError, "lumen::vulkan", "Descriptor pool lock poisoned"))?;
        let layouts = [layout];

        for &pool in pools.iter().rev() {
            let info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);
            match unsafe { ctx.device.allocate_descriptor_sets(&info) } {
                Ok(sets) => {
                    if let Some(&set) = sets.first() {
                        return Ok((set, pool));
                    }
                }
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => continue,
                Err(e) => {
                    rhi_bail!(CreationFailed, "lumen::vulkan", "Failed to allocate descriptor set: {:?}", e);
                }
            }
        }

        let pool = GpuContext::create_descriptor_pool(&ctx.device)?;
        pools.push(pool);
        rhi_debug!("lumen::vulkan", "Descriptor pools exhausted, now using {} pools", pools.len());

        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            ctx.device.allocate_descriptor_sets(&info)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to allocate descriptor set: {:?}", e))?
        };
        sets.first()
            .map(|&set| (set, pool))
            .ok_or_else(|| rhi_err!(CreationFailed, "lumen::vulkan", "Descriptor set allocation returned nothing"))
    }

    pub fn layout(&self) -> &Arc<BindGroupLayout> {
        &self.layout
    }

    /// Number of dynamic offsets `set_bind_group` must supply
    pub fn dynamic_offset_count(&self) -> usize {
        self.layout.desc.dynamic_offset_count()
    }
}

impl Drop for BindGroup {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.free_descriptor_sets(self.pool, &[self.raw]).ok();
        }
    }
}

// ============================================================================
// PipelineLayout
// ============================================================================

/// Vulkan pipeline layout implementation
pub struct PipelineLayout {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::PipelineLayout,
    pub(crate) bind_group_layouts: Vec<Arc<BindGroupLayout>>,
    push_constant_ranges: Vec<PushConstantRange>,
}

impl PipelineLayout {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &PipelineLayoutDesc<'_, VulkanApi>) -> Result<Self> {
        desc.validate_push_constants(ctx.limits.max_push_constants_size)
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let set_layouts: Vec<vk::DescriptorSetLayout> =
            desc.bind_group_layouts.iter().map(|layout| layout.raw).collect();
        let ranges: Vec<vk::PushConstantRange> = desc
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: shader_stages_to_vk(range.stages),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&ranges);
        let raw = unsafe {
            ctx.device.create_pipeline_layout(&create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create pipeline layout: {:?}", e))?
        };

        Ok(Self {
            ctx,
            raw,
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

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline_layout(self.raw, None);
        }
    }
}
