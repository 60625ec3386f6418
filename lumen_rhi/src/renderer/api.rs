/// Backend API selection and the handle-type family used by descriptors

use std::fmt;
use std::str::FromStr;
use crate::error::{Error, Result};

/// The native graphics API a Device is bound to, chosen once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiPreference {
    /// Explicit API (fences, semaphores, swapchain images)
    Vulkan,
    /// Immediate-mode API (implicit synchronization, default framebuffer)
    Gl,
}

impl ApiPreference {
    /// Parse the `--api=<name>` command-line form, ignoring other arguments
    pub fn from_args<I, S>(args: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        args.into_iter()
            .filter_map(|arg| arg.as_ref().strip_prefix("--api=").map(str::to_owned))
            .find_map(|name| name.parse().ok())
    }
}

impl FromStr for ApiPreference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(ApiPreference::Vulkan),
            "gl" | "opengl" | "gl4" => Ok(ApiPreference::Gl),
            other => Err(Error::InvalidUsage(format!("Unknown graphics API '{}'", other))),
        }
    }
}

impl fmt::Display for ApiPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiPreference::Vulkan => write!(f, "Vulkan"),
            ApiPreference::Gl => write!(f, "OpenGL"),
        }
    }
}

/// Family of handle types a descriptor can reference
///
/// Each backend implements this with its own resource types; the
/// caller-facing layer implements it with the enum-dispatched handles. The
/// same descriptor structs therefore serve every layer.
pub trait Api: Sized + 'static {
    type Buffer;
    type Texture;
    type TextureView;
    type Sampler;
    type ShaderModule;
    type BindGroupLayout;
    type PipelineLayout;
}

/// Resolves handles of one `Api` into handles of another
///
/// Used to turn a caller-facing descriptor into a backend descriptor without
/// copying the descriptor shape by hand.
pub trait ResourceMap<Src: Api, Dst: Api> {
    fn buffer<'r>(&self, buffer: &'r Src::Buffer) -> Result<&'r Dst::Buffer>;
    fn texture<'r>(&self, texture: &'r Src::Texture) -> Result<&'r Dst::Texture>;
    fn texture_view<'r>(&self, view: &'r Src::TextureView) -> Result<&'r Dst::TextureView>;
    fn sampler<'r>(&self, sampler: &'r Src::Sampler) -> Result<&'r Dst::Sampler>;
    fn shader_module<'r>(&self, module: &'r Src::ShaderModule) -> Result<&'r Dst::ShaderModule>;
    fn bind_group_layout<'r>(&self, layout: &'r Src::BindGroupLayout) -> Result<&'r Dst::BindGroupLayout>;
    fn pipeline_layout<'r>(&self, layout: &'r Src::PipelineLayout) -> Result<&'r Dst::PipelineLayout>;
}
