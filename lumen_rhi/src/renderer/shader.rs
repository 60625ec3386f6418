/// Shader module descriptor and stage flags

use bitflags::bitflags;
use crate::error::{Error, Result};

/// Shader stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

bitflags! {
    /// Shader stage visibility flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const VERTEX_FRAGMENT = Self::VERTEX.bits() | Self::FRAGMENT.bits();
    }
}

impl From<ShaderStage> for ShaderStages {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => ShaderStages::VERTEX,
            ShaderStage::Fragment => ShaderStages::FRAGMENT,
        }
    }
}

/// Descriptor for creating a shader module
///
/// `code` is handed to the backend untouched: SPIR-V for Vulkan, GLSL source
/// for OpenGL.
#[derive(Debug, Clone)]
pub struct ShaderModuleDesc {
    pub label: Option<String>,
    pub stage: ShaderStage,
    pub entry_point: String,
    pub code: Vec<u8>,
}

impl ShaderModuleDesc {
    pub fn new(stage: ShaderStage, code: Vec<u8>) -> Self {
        Self {
            label: None,
            stage,
            entry_point: "main".to_string(),
            code,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.code.is_empty() {
            return Err(Error::CreationFailed("Shader code is empty".to_string()));
        }
        if self.entry_point.is_empty() {
            return Err(Error::CreationFailed("Shader entry point is empty".to_string()));
        }
        Ok(())
    }
}
