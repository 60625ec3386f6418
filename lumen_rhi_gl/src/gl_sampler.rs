/// Sampler - GL sampler object

use glow::HasContext;
use lumen_rhi::lumen::render::SamplerDesc;
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err};
use std::sync::Arc;

use crate::gl_context::{GlContext, TEXTURE_MAX_ANISOTROPY};
use crate::gl_format::{address_mode_to_gl, compare_to_gl, mag_filter_to_gl, min_filter_to_gl};

/// GL sampler implementation
pub struct Sampler {
    ctx: Arc<GlContext>,
    pub(crate) raw: glow::Sampler,
    desc: SamplerDesc,
}

impl Sampler {
    pub(crate) fn new(ctx: Arc<GlContext>, desc: &SamplerDesc) -> Result<Self> {
        if desc.lod_min_clamp < 0.0 || desc.lod_max_clamp < desc.lod_min_clamp {
            rhi_bail!(
                CreationFailed,
                "lumen::gl",
                "Invalid sampler LOD range [{}, {}]",
                desc.lod_min_clamp,
                desc.lod_max_clamp
            );
        }
        if desc.max_anisotropy == 0 {
            rhi_bail!(CreationFailed, "lumen::gl", "Sampler max_anisotropy must be at least 1");
        }

        let raw = unsafe {
            let gl = &ctx.gl;
            let raw = gl
                .create_sampler()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create sampler: {}", e))?;
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_S, address_mode_to_gl(desc.address_mode_u) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_T, address_mode_to_gl(desc.address_mode_v) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_WRAP_R, address_mode_to_gl(desc.address_mode_w) as i32);
            gl.sampler_parameter_i32(raw, glow::TEXTURE_MAG_FILTER, mag_filter_to_gl(desc.mag_filter) as i32);
            gl.sampler_parameter_i32(
                raw,
                glow::TEXTURE_MIN_FILTER,
                min_filter_to_gl(desc.min_filter, desc.mipmap_filter) as i32,
            );
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MIN_LOD, desc.lod_min_clamp);
            gl.sampler_parameter_f32(raw, glow::TEXTURE_MAX_LOD, desc.lod_max_clamp);

            match desc.compare {
                Some(function) => {
                    gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_MODE, glow::COMPARE_REF_TO_TEXTURE as i32);
                    gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_FUNC, compare_to_gl(function) as i32);
                }
                None => gl.sampler_parameter_i32(raw, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32),
            }

            if desc.max_anisotropy > 1 && ctx.limits.max_anisotropy > 1.0 {
                let anisotropy = (desc.max_anisotropy as f32).min(ctx.limits.max_anisotropy);
                gl.sampler_parameter_f32(raw, TEXTURE_MAX_ANISOTROPY, anisotropy);
            }

            if let Some(label) = &desc.label {
                if gl.supports_debug() {
                    gl.object_label(glow::SAMPLER, raw.0.get(), Some(label.as_str()));
                }
            }
            raw
        };

        Ok(Self { ctx, raw, desc: desc.clone() })
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.ctx.gl.delete_sampler(self.raw) };
    }
}
