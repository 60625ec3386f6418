/// Sampler - Vulkan sampler object

use ash::vk;
use lumen_rhi::lumen::render::{AddressMode, SamplerDesc};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err};
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{address_mode_to_vk, compare_to_vk, filter_to_vk, mipmap_mode_to_vk};

/// Vulkan sampler implementation
pub struct Sampler {
    ctx: Arc<GpuContext>,
    pub(crate) raw: vk::Sampler,
    desc: SamplerDesc,
}

impl Sampler {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SamplerDesc) -> Result<Self> {
        if desc.lod_min_clamp < 0.0 || desc.lod_max_clamp < desc.lod_min_clamp {
            rhi_bail!(
                CreationFailed,
                "lumen::vulkan",
                "Invalid sampler LOD range [{}, {}]",
                desc.lod_min_clamp,
                desc.lod_max_clamp
            );
        }
        if desc.max_anisotropy == 0 {
            rhi_bail!(CreationFailed, "lumen::vulkan", "Sampler max_anisotropy must be at least 1");
        }

        let uses_border = [desc.address_mode_u, desc.address_mode_v, desc.address_mode_w]
            .contains(&AddressMode::ClampToBorder);
        let border = if desc.compare.is_some() {
            vk::BorderColor::FLOAT_OPAQUE_WHITE
        } else if uses_border {
            vk::BorderColor::FLOAT_TRANSPARENT_BLACK
        } else {
            vk::BorderColor::FLOAT_OPAQUE_BLACK
        };

        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mipmap_filter))
            .address_mode_u(address_mode_to_vk(desc.address_mode_u))
            .address_mode_v(address_mode_to_vk(desc.address_mode_v))
            .address_mode_w(address_mode_to_vk(desc.address_mode_w))
            .mip_lod_bias(0.0)
            .min_lod(desc.lod_min_clamp)
            .max_lod(desc.lod_max_clamp)
            .border_color(border)
            .unnormalized_coordinates(false);

        create_info = match desc.compare {
            Some(function) => create_info.compare_enable(true).compare_op(compare_to_vk(function)),
            None => create_info.compare_enable(false).compare_op(vk::CompareOp::ALWAYS),
        };

        let anisotropy = (desc.max_anisotropy as f32).min(ctx.limits.max_sampler_anisotropy);
        create_info = if desc.max_anisotropy > 1 && ctx.sampler_anisotropy {
            create_info.anisotropy_enable(true).max_anisotropy(anisotropy)
        } else {
            create_info.anisotropy_enable(false).max_anisotropy(1.0)
        };

        let raw = unsafe {
            ctx.device.create_sampler(&create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create VkSampler: {:?}", e))?
        };

        Ok(Self { ctx, raw, desc: desc.clone() })
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.raw, None);
        }
    }
}
