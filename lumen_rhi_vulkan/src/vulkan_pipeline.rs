/// RenderPipeline - Vulkan graphics pipeline
///
/// Built against a temporary render pass that is compatible with every pass
/// sharing the same attachment formats and sample count. Viewport and scissor
/// are dynamic state.

use ash::vk;
use lumen_rhi::lumen::render::{
    RenderPipelineDesc, ShaderStage, ShaderStages, TextureFormat, TextureUsage,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::sync::Arc;

use crate::vulkan_binding::PipelineLayout;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    blend_factor_to_vk, blend_op_to_vk, color_writes_to_vk, compare_to_vk, cull_mode_to_vk,
    front_face_to_vk, polygon_mode_to_vk, sample_count_to_vk, step_mode_to_vk, topology_to_vk,
    vertex_format_to_vk,
};
use crate::vulkan_render_pass::{AttachmentKey, PassKey, RenderPassObject};
use crate::vulkan_shader::ShaderModule;
use crate::vulkan_texture::supported_vk_format;
use crate::VulkanApi;

/// Vulkan render pipeline implementation
pub struct RenderPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::Pipeline,
    pub(crate) layout: Arc<PipelineLayout>,
    pub(crate) color_formats: Vec<vk::Format>,
    pub(crate) depth_format: Option<vk::Format>,
    pub(crate) sample_count: u32,
    vertex_buffer_count: usize,
}

impl RenderPipeline {
    /// Create a pipeline; `Presentation` color targets resolve to `surface_format`
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        desc: &RenderPipelineDesc<'_, VulkanApi>,
        surface_format: vk::Format,
    ) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        let layout = Arc::clone(desc.layout);
        let vertex_module: &ShaderModule = desc.vertex.module;
        if vertex_module.stage != ShaderStage::Vertex {
            rhi_bail!(CreationFailed, "lumen::vulkan", "Vertex state uses a {:?} shader", vertex_module.stage);
        }
        Self::check_against_layout(vertex_module, &layout)?;
        if let Some(fragment) = &desc.fragment {
            if fragment.module.stage != ShaderStage::Fragment {
                rhi_bail!(CreationFailed, "lumen::vulkan", "Fragment state uses a {:?} shader", fragment.module.stage);
            }
            Self::check_against_layout(fragment.module, &layout)?;
        }

        // ===== Attachment formats =====
        let mut color_formats = Vec::new();
        if let Some(fragment) = &desc.fragment {
            for target in &fragment.targets {
                color_formats.push(match target.format {
                    TextureFormat::Presentation => surface_format,
                    format => supported_vk_format(&ctx, format, TextureUsage::RENDER_ATTACHMENT)?,
                });
            }
        }
        let depth_format = match &desc.depth_stencil {
            Some(depth) => Some(supported_vk_format(&ctx, depth.format, TextureUsage::RENDER_ATTACHMENT)?),
            None => None,
        };
        let samples = sample_count_to_vk(desc.sample_count);

        let compatible_pass = RenderPassObject::new(
            Arc::clone(&ctx),
            &PassKey {
                colors: color_formats
                    .iter()
                    .map(|&format| AttachmentKey::compatible(format, samples, false))
                    .collect(),
                depth_stencil: depth_format.map(|format| AttachmentKey::compatible(format, samples, true)),
            },
        )?;

        // ===== Shader stages =====
        let mut stages = vec![vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_module.raw)
            .name(vertex_module.entry_point.as_c_str())];
        if let Some(fragment) = &desc.fragment {
            stages.push(vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.module.raw)
                .name(fragment.module.entry_point.as_c_str()));
        }

        // ===== Vertex input =====
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex
            .buffers
            .iter()
            .enumerate()
            .map(|(slot, buffer)| vk::VertexInputBindingDescription {
                binding: slot as u32,
                stride: buffer.array_stride,
                input_rate: step_mode_to_vk(buffer.step_mode),
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex
            .buffers
            .iter()
            .enumerate()
            .flat_map(|(slot, buffer)| {
                buffer.attributes.iter().map(move |attribute| vk::VertexInputAttributeDescription {
                    location: attribute.shader_location,
                    binding: slot as u32,
                    format: vertex_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.primitive.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are set at record time
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(desc.primitive.polygon_mode))
            .cull_mode(cull_mode_to_vk(desc.primitive.cull_mode))
            .front_face(front_face_to_vk(desc.primitive.front_face))
            .depth_bias_enable(false)
            .line_width(1.0);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(samples)
            .sample_shading_enable(false);

        let depth_stencil = match &desc.depth_stencil {
            Some(depth) => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(depth.depth_write_enabled)
                .depth_compare_op(compare_to_vk(depth.depth_compare))
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),
            None => vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(false)
                .depth_write_enable(false),
        };

        // ===== Color blending =====
        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .fragment
            .iter()
            .flat_map(|fragment| fragment.targets.iter())
            .map(|target| {
                let state = vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(color_writes_to_vk(target.write_mask));
                match target.blend {
                    Some(blend) => state
                        .blend_enable(true)
                        .src_color_blend_factor(blend_factor_to_vk(blend.color.src_factor))
                        .dst_color_blend_factor(blend_factor_to_vk(blend.color.dst_factor))
                        .color_blend_op(blend_op_to_vk(blend.color.operation))
                        .src_alpha_blend_factor(blend_factor_to_vk(blend.alpha.src_factor))
                        .dst_alpha_blend_factor(blend_factor_to_vk(blend.alpha.dst_factor))
                        .alpha_blend_op(blend_op_to_vk(blend.alpha.operation)),
                    None => state.blend_enable(false),
                }
            })
            .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.raw)
            .render_pass(compatible_pass.raw)
            .subpass(0);

        let raw = unsafe {
            ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
                .map_err(|(_, e)| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create graphics pipeline: {:?}", e))?
        };
        let raw = raw
            .first()
            .copied()
            .ok_or_else(|| rhi_err!(CreationFailed, "lumen::vulkan", "Pipeline creation returned nothing"))?;

        Ok(Self {
            ctx,
            raw,
            layout,
            color_formats,
            depth_format,
            sample_count: desc.sample_count,
            vertex_buffer_count: desc.vertex.buffers.len(),
        })
    }

    /// Every descriptor and push constant the shader reads must exist in the layout
    fn check_against_layout(module: &ShaderModule, layout: &PipelineLayout) -> Result<()> {
        let stage = ShaderStages::from(module.stage);
        for binding in &module.bindings {
            let group = layout.bind_group_layouts.get(binding.set as usize).ok_or_else(|| {
                rhi_err!(
                    CreationFailed,
                    "lumen::vulkan",
                    "Shader '{}' uses set {} but the layout has {} bind groups",
                    binding.name,
                    binding.set,
                    layout.bind_group_layouts.len()
                )
            })?;
            let entry = group.desc().entry(binding.binding).ok_or_else(|| {
                rhi_err!(
                    CreationFailed,
                    "lumen::vulkan",
                    "Shader '{}' uses binding ({}, {}) missing from the layout",
                    binding.name,
                    binding.set,
                    binding.binding
                )
            })?;
            if !binding.kind.accepts(&entry.ty) {
                rhi_bail!(
                    CreationFailed,
                    "lumen::vulkan",
                    "Binding ({}, {}) is {:?} in the shader but {:?} in the layout",
                    binding.set,
                    binding.binding,
                    binding.kind,
                    entry.ty
                );
            }
            if !entry.visibility.contains(stage) {
                rhi_bail!(
                    CreationFailed,
                    "lumen::vulkan",
                    "Binding ({}, {}) is not visible to the {:?} stage",
                    binding.set,
                    binding.binding,
                    module.stage
                );
            }
        }
        if module.push_constant_size > layout.push_constant_size() {
            rhi_bail!(
                CreationFailed,
                "lumen::vulkan",
                "Shader push constant block is {} bytes, layout covers {}",
                module.push_constant_size,
                layout.push_constant_size()
            );
        }
        Ok(())
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.vertex_buffer_count
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.raw, None);
        }
    }
}
