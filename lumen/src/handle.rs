/// Backend-tagged resource handles
///
/// Every handle is an enum over the two backends' reference-counted objects.
/// Cloning a handle shares the object; the backend object is destroyed with
/// the last clone. Descriptors referencing handles use `LumenApi` and are
/// mapped onto a backend with `ToVulkan` / `ToGl`, which reject handles of
/// the other backend.

use lumen_rhi::lumen::render::{
    Api, ApiPreference, BindGroupLayoutDesc, BufferDesc, BufferUsage, Extent2D, MapState,
    ResourceMap, SamplerDesc, ShaderStage, TextureDesc, TextureFormat, TextureViewDesc, ViewId,
};
use lumen_rhi::lumen::{Error, Result};
use lumen_rhi::rhi_err;
use lumen_rhi_gl as gl;
use lumen_rhi_vulkan as vulkan;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Error for a handle used with a device or encoder of the other backend
pub(crate) fn backend_mismatch(what: &str, found: ApiPreference, expected: ApiPreference) -> Error {
    rhi_err!(
        InvalidUsage,
        "lumen::device",
        "{} belongs to the {} backend but was used with {}",
        what,
        found,
        expected
    )
}

/// Run `$body` on the inner object whatever the backend
macro_rules! dispatch {
    ($value:expr, $inner:ident => $body:expr) => {
        match $value {
            Self::Vulkan($inner) => $body,
            Self::Gl($inner) => $body,
        }
    };
}
pub(crate) use dispatch;

macro_rules! backend_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone)]
        pub enum $name {
            Vulkan(Arc<vulkan::$name>),
            Gl(Arc<gl::$name>),
        }

        impl $name {
            pub fn api(&self) -> ApiPreference {
                match self {
                    Self::Vulkan(_) => ApiPreference::Vulkan,
                    Self::Gl(_) => ApiPreference::Gl,
                }
            }

            /// Whether both handles share one backend object
            pub fn ptr_eq(&self, other: &Self) -> bool {
                match (self, other) {
                    (Self::Vulkan(a), Self::Vulkan(b)) => Arc::ptr_eq(a, b),
                    (Self::Gl(a), Self::Gl(b)) => Arc::ptr_eq(a, b),
                    _ => false,
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.api())
            }
        }
    };
}

backend_handle!(
    /// GPU buffer
    Buffer
);
backend_handle!(
    /// GPU texture
    Texture
);
backend_handle!(
    /// View of a texture or of the surface
    TextureView
);
backend_handle!(Sampler);
backend_handle!(ShaderModule);
backend_handle!(BindGroupLayout);
backend_handle!(
    /// Resources bound together against a bind group layout
    BindGroup
);
backend_handle!(PipelineLayout);
backend_handle!(RenderPipeline);

// ===== Buffer =====

impl Buffer {
    pub fn size(&self) -> u64 {
        dispatch!(self, buffer => buffer.size())
    }

    pub fn usage(&self) -> BufferUsage {
        dispatch!(self, buffer => buffer.usage())
    }

    pub fn desc(&self) -> &BufferDesc {
        dispatch!(self, buffer => buffer.desc())
    }

    pub fn map_state(&self) -> MapState {
        dispatch!(self, buffer => buffer.map_state())
    }

    /// Host view of the mapped buffer, exactly `size()` bytes
    pub fn get_mapped_range(&self) -> Result<MappedRange<'_>> {
        match self {
            Self::Vulkan(buffer) => buffer.get_mapped_range().map(MappedRange::Vulkan),
            Self::Gl(buffer) => buffer.get_mapped_range().map(MappedRange::Gl),
        }
    }

    pub fn unmap(&self) -> Result<()> {
        dispatch!(self, buffer => buffer.unmap())
    }

    pub fn flush(&self) -> Result<()> {
        dispatch!(self, buffer => buffer.flush())
    }

    pub fn map(&self) -> Result<()> {
        dispatch!(self, buffer => buffer.map())
    }

    /// Copy `data` in at `offset` through a temporary mapping
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        dispatch!(self, buffer => buffer.write(offset, data))
    }
}

/// Mapped bytes of a buffer
pub enum MappedRange<'a> {
    Vulkan(vulkan::MappedRange<'a>),
    Gl(gl::MappedRange<'a>),
}

impl Deref for MappedRange<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            MappedRange::Vulkan(range) => range,
            MappedRange::Gl(range) => range,
        }
    }
}

impl DerefMut for MappedRange<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        match self {
            MappedRange::Vulkan(range) => range,
            MappedRange::Gl(range) => range,
        }
    }
}

// ===== Textures =====

impl Texture {
    pub fn desc(&self) -> &TextureDesc {
        dispatch!(self, texture => texture.desc())
    }

    pub fn format(&self) -> TextureFormat {
        dispatch!(self, texture => texture.format())
    }

    pub fn create_view(&self, desc: &TextureViewDesc) -> Result<TextureView> {
        match self {
            Self::Vulkan(texture) => texture.create_view(desc).map(|view| TextureView::Vulkan(Arc::new(view))),
            Self::Gl(texture) => texture.create_view(desc).map(|view| TextureView::Gl(Arc::new(view))),
        }
    }
}

impl TextureView {
    pub fn id(&self) -> ViewId {
        dispatch!(self, view => view.id())
    }

    pub fn format(&self) -> TextureFormat {
        dispatch!(self, view => view.format())
    }

    pub fn extent(&self) -> Extent2D {
        dispatch!(self, view => view.extent())
    }

    pub fn sample_count(&self) -> u32 {
        dispatch!(self, view => view.sample_count())
    }

    /// Whether this is the surface (swapchain image or default framebuffer)
    pub fn is_surface(&self) -> bool {
        dispatch!(self, view => view.is_surface())
    }
}

// ===== Other resources =====

impl Sampler {
    pub fn desc(&self) -> &SamplerDesc {
        dispatch!(self, sampler => sampler.desc())
    }
}

impl ShaderModule {
    pub fn stage(&self) -> ShaderStage {
        dispatch!(self, module => module.stage())
    }
}

impl BindGroupLayout {
    pub fn desc(&self) -> &BindGroupLayoutDesc {
        dispatch!(self, layout => layout.desc())
    }
}

impl BindGroup {
    pub fn dynamic_offset_count(&self) -> usize {
        dispatch!(self, group => group.dynamic_offset_count())
    }
}

impl PipelineLayout {
    pub fn push_constant_size(&self) -> u32 {
        dispatch!(self, layout => layout.push_constant_size())
    }
}

impl RenderPipeline {
    pub fn vertex_buffer_count(&self) -> usize {
        dispatch!(self, pipeline => pipeline.vertex_buffer_count())
    }
}

// ============================================================================
// Api and backend maps
// ============================================================================

/// Handle family of the caller-facing layer
pub struct LumenApi;

impl Api for LumenApi {
    type Buffer = Buffer;
    type Texture = Texture;
    type TextureView = TextureView;
    type Sampler = Sampler;
    type ShaderModule = ShaderModule;
    type BindGroupLayout = BindGroupLayout;
    type PipelineLayout = PipelineLayout;
}

macro_rules! resource_map {
    ($(#[$meta:meta])* $map:ident, $api:ty, $variant:ident) => {
        $(#[$meta])*
        pub(crate) struct $map;

        impl $map {
            fn unwrap<'r, T>(what: &str, found: ApiPreference, inner: Option<&'r T>) -> Result<&'r T> {
                inner.ok_or_else(|| backend_mismatch(what, found, ApiPreference::$variant))
            }
        }

        impl ResourceMap<LumenApi, $api> for $map {
            fn buffer<'r>(&self, buffer: &'r Buffer) -> Result<&'r <$api as Api>::Buffer> {
                let inner = match buffer { Buffer::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("Buffer", buffer.api(), inner)
            }

            fn texture<'r>(&self, texture: &'r Texture) -> Result<&'r <$api as Api>::Texture> {
                let inner = match texture { Texture::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("Texture", texture.api(), inner)
            }

            fn texture_view<'r>(&self, view: &'r TextureView) -> Result<&'r <$api as Api>::TextureView> {
                let inner = match view { TextureView::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("TextureView", view.api(), inner)
            }

            fn sampler<'r>(&self, sampler: &'r Sampler) -> Result<&'r <$api as Api>::Sampler> {
                let inner = match sampler { Sampler::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("Sampler", sampler.api(), inner)
            }

            fn shader_module<'r>(&self, module: &'r ShaderModule) -> Result<&'r <$api as Api>::ShaderModule> {
                let inner = match module { ShaderModule::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("ShaderModule", module.api(), inner)
            }

            fn bind_group_layout<'r>(&self, layout: &'r BindGroupLayout) -> Result<&'r <$api as Api>::BindGroupLayout> {
                let inner = match layout { BindGroupLayout::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("BindGroupLayout", layout.api(), inner)
            }

            fn pipeline_layout<'r>(&self, layout: &'r PipelineLayout) -> Result<&'r <$api as Api>::PipelineLayout> {
                let inner = match layout { PipelineLayout::$variant(inner) => Some(inner), _ => None };
                Self::unwrap("PipelineLayout", layout.api(), inner)
            }
        }
    };
}

resource_map!(
    /// Resolves handles to Vulkan objects
    ToVulkan,
    vulkan::VulkanApi,
    Vulkan
);
resource_map!(
    /// Resolves handles to GL objects
    ToGl,
    gl::GlApi,
    Gl
);
