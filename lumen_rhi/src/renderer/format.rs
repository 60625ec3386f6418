/// Texture, vertex and index formats shared by every backend

/// Texture format
///
/// `Presentation` stands for "whatever format the swapchain ended up with".
/// It is only valid as a pipeline color target; the backend resolves it at
/// pipeline creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    R32Float,
    Rgba16Float,
    Rgba32Float,
    Depth16Unorm,
    Depth32Float,
    Depth24PlusStencil8,
    Depth32FloatStencil8,
    Presentation,
}

impl TextureFormat {
    /// Size in bytes of one texel, `None` for `Presentation`
    ///
    /// Combined depth/stencil formats report the size used when copying the
    /// depth aspect.
    pub fn texel_size(&self) -> Option<u32> {
        match self {
            TextureFormat::R8Unorm => Some(1),
            TextureFormat::Rg8Unorm | TextureFormat::Depth16Unorm => Some(2),
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Bgra8UnormSrgb
            | TextureFormat::R32Float
            | TextureFormat::Depth32Float
            | TextureFormat::Depth24PlusStencil8
            | TextureFormat::Depth32FloatStencil8 => Some(4),
            TextureFormat::Rgba16Float => Some(8),
            TextureFormat::Rgba32Float => Some(16),
            TextureFormat::Presentation => None,
        }
    }

    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth16Unorm
                | TextureFormat::Depth32Float
                | TextureFormat::Depth24PlusStencil8
                | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24PlusStencil8 | TextureFormat::Depth32FloatStencil8
        )
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, TextureFormat::Rgba8UnormSrgb | TextureFormat::Bgra8UnormSrgb)
    }
}

/// Vertex attribute format (data type and component count)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
    Sint32x2,
    Sint32x3,
    Sint32x4,
    /// Four normalized bytes (packed colors)
    Unorm8x4,
    Uint8x4,
}

impl VertexFormat {
    /// Number of components (1 to 4)
    pub fn components(&self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 1,
            VertexFormat::Float32x2 | VertexFormat::Uint32x2 | VertexFormat::Sint32x2 => 2,
            VertexFormat::Float32x3 | VertexFormat::Uint32x3 | VertexFormat::Sint32x3 => 3,
            VertexFormat::Float32x4
            | VertexFormat::Uint32x4
            | VertexFormat::Sint32x4
            | VertexFormat::Unorm8x4
            | VertexFormat::Uint8x4 => 4,
        }
    }

    /// Size in bytes of one attribute
    pub fn size(&self) -> u32 {
        match self {
            VertexFormat::Unorm8x4 | VertexFormat::Uint8x4 => 4,
            _ => self.components() * 4,
        }
    }

    /// True when the shader reads the attribute as an integer (no conversion)
    pub fn is_integer(&self) -> bool {
        !matches!(
            self,
            VertexFormat::Float32
                | VertexFormat::Float32x2
                | VertexFormat::Float32x3
                | VertexFormat::Float32x4
                | VertexFormat::Unorm8x4
        )
    }
}

/// Index buffer element type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    /// 16-bit indices (max 65535 vertices)
    Uint16,
    /// 32-bit indices
    Uint32,
}

impl IndexFormat {
    /// Size in bytes of one index element
    pub fn size_bytes(&self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[cfg(test)]
#[path = "format_tests.rs"]
mod tests;
