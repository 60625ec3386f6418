/// GlContext - the loaded GL function table shared by every GL object
///
/// Every resource holds an `Arc<GlContext>`, so the context outlives them.
/// The caller keeps the native context current on the recording thread.

use glow::HasContext;
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_info};
use std::sync::Mutex;

/// Binding point of the uniform buffer emulating push constants
pub const PUSH_CONSTANT_BINDING: u32 = 15;

/// Size of the push constant block, the minimum Vulkan guarantees
pub const MAX_PUSH_CONSTANT_SIZE: u32 = 128;

/// `GL_TEXTURE_MAX_ANISOTROPY` (core in 4.6, EXT before)
pub(crate) const TEXTURE_MAX_ANISOTROPY: u32 = 0x84FE;
const MAX_TEXTURE_MAX_ANISOTROPY: u32 = 0x84FF;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlLimits {
    pub max_texture_size: u32,
    pub max_samples: u32,
    /// 1.0 when anisotropic filtering is unavailable
    pub max_anisotropy: f32,
    pub max_uniform_block_size: u32,
    pub uniform_buffer_offset_alignment: u32,
    pub storage_buffer_offset_alignment: u32,
}

pub struct GlContext {
    pub(crate) gl: glow::Context,
    pub(crate) limits: GlLimits,
    /// Framebuffer used as the read source of texture-to-buffer copies
    copy_framebuffer: Mutex<Option<glow::Framebuffer>>,
}

impl GlContext {
    /// Wrap a loaded context; GL 4.3 is required
    pub(crate) fn new(gl: glow::Context) -> Result<Self> {
        let version = gl.version();
        if (version.major, version.minor) < (4, 3) || version.is_embedded {
            rhi_bail!(
                QueryFailed,
                "lumen::gl",
                "OpenGL 4.3 core is required, context reports {}.{}{}",
                version.major,
                version.minor,
                if version.is_embedded { " ES" } else { "" }
            );
        }

        let limits = unsafe {
            let anisotropic = gl.supported_extensions().contains("GL_EXT_texture_filter_anisotropic")
                || (version.major, version.minor) >= (4, 6);
            GlLimits {
                max_texture_size: gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE).max(0) as u32,
                max_samples: gl.get_parameter_i32(glow::MAX_SAMPLES).max(1) as u32,
                max_anisotropy: if anisotropic {
                    gl.get_parameter_f32(MAX_TEXTURE_MAX_ANISOTROPY).max(1.0)
                } else {
                    1.0
                },
                max_uniform_block_size: gl.get_parameter_i32(glow::MAX_UNIFORM_BLOCK_SIZE).max(0) as u32,
                uniform_buffer_offset_alignment: gl.get_parameter_i32(glow::UNIFORM_BUFFER_OFFSET_ALIGNMENT).max(1) as u32,
                storage_buffer_offset_alignment: gl
                    .get_parameter_i32(glow::SHADER_STORAGE_BUFFER_OFFSET_ALIGNMENT)
                    .max(1) as u32,
            }
        };

        unsafe {
            rhi_info!(
                "lumen::gl",
                "Using OpenGL {}.{} on '{}'",
                version.major,
                version.minor,
                gl.get_parameter_string(glow::RENDERER)
            );
        }

        Ok(Self {
            gl,
            limits,
            copy_framebuffer: Mutex::new(None),
        })
    }

    pub fn limits(&self) -> GlLimits {
        self.limits
    }

    /// The scratch read framebuffer, created on first use
    pub(crate) fn copy_framebuffer(&self) -> Result<glow::Framebuffer> {
        let mut slot = self
            .copy_framebuffer
            .lock()
            .map_err(|_| rhi_err!(BackendError, "lumen::gl", "Copy framebuffer lock poisoned"))?;
        if let Some(framebuffer) = *slot {
            return Ok(framebuffer);
        }
        let framebuffer = unsafe {
            self.gl
                .create_framebuffer()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create copy framebuffer: {}", e))?
        };
        *slot = Some(framebuffer);
        Ok(framebuffer)
    }

    /// Block until every issued command has completed
    pub(crate) fn finish(&self) {
        unsafe { self.gl.finish() }
    }

    /// Turn a pending GL error into `BackendError`
    pub(crate) fn check_error(&self, what: &str) -> Result<()> {
        let code = unsafe { self.gl.get_error() };
        if code != glow::NO_ERROR {
            rhi_bail!(BackendError, "lumen::gl", "{} failed with GL error 0x{:04X}", what, code);
        }
        Ok(())
    }
}

impl Drop for GlContext {
    fn drop(&mut self) {
        if let Ok(slot) = self.copy_framebuffer.get_mut() {
            if let Some(framebuffer) = slot.take() {
                unsafe { self.gl.delete_framebuffer(framebuffer) };
            }
        }
    }
}
