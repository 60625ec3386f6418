/// ShaderModule - GLSL shader object
///
/// Modules carry GLSL source and are compiled on creation. Linking happens per
/// pipeline, so one module can feed any number of programs.

use glow::HasContext;
use lumen_rhi::lumen::render::{ShaderModuleDesc, ShaderStage};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error, rhi_warn};
use std::sync::Arc;

use crate::gl_context::GlContext;

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

/// GL shader module implementation
pub struct ShaderModule {
    ctx: Arc<GlContext>,
    pub(crate) raw: glow::Shader,
    pub(crate) stage: ShaderStage,
}

impl ShaderModule {
    pub(crate) fn new(ctx: Arc<GlContext>, desc: &ShaderModuleDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;
        // GLSL has no named entry points
        if desc.entry_point != "main" {
            rhi_bail!(
                CreationFailed,
                "lumen::gl",
                "GLSL shaders must use the 'main' entry point, got '{}'",
                desc.entry_point
            );
        }
        let source = std::str::from_utf8(&desc.code)
            .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Shader source is not UTF-8: {}", e))?;

        let raw = unsafe {
            let gl = &ctx.gl;
            let raw = gl
                .create_shader(shader_type(desc.stage))
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create shader: {}", e))?;
            gl.shader_source(raw, source);
            gl.compile_shader(raw);
            let log = gl.get_shader_info_log(raw);
            if !gl.get_shader_compile_status(raw) {
                gl.delete_shader(raw);
                rhi_bail!(
                    CreationFailed,
                    "lumen::gl",
                    "{:?} shader '{}' failed to compile: {}",
                    desc.stage,
                    desc.label.as_deref().unwrap_or("unnamed"),
                    log.trim()
                );
            }
            if !log.trim().is_empty() {
                rhi_warn!("lumen::gl", "{:?} shader compiled with warnings: {}", desc.stage, log.trim());
            }
            if let Some(label) = &desc.label {
                if gl.supports_debug() {
                    gl.object_label(glow::SHADER, raw.0.get(), Some(label.as_str()));
                }
            }
            raw
        };

        Ok(Self { ctx, raw, stage: desc.stage })
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.ctx.gl.delete_shader(self.raw) };
    }
}

#[cfg(test)]
#[path = "gl_shader_tests.rs"]
mod tests;
