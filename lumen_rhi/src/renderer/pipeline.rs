/// Render pipeline descriptor and fixed-function state

use bitflags::bitflags;
use rustc_hash::FxHashSet;
use crate::error::{Error, Result};
use crate::renderer::{Api, ResourceMap, TextureFormat, VertexFormat};

// ===== VERTEX INPUT =====

/// Vertex input rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexStepMode {
    /// Data is per-vertex
    Vertex,
    /// Data is per-instance
    Instance,
}

/// Vertex attribute description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    /// Format of the attribute (data type and component count)
    pub format: VertexFormat,
    /// Offset in bytes from the start of the element
    pub offset: u32,
    /// Attribute location in shader
    pub shader_location: u32,
}

/// Layout of one vertex buffer slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    /// Stride in bytes between consecutive elements
    pub array_stride: u32,
    pub step_mode: VertexStepMode,
    pub attributes: Vec<VertexAttribute>,
}

// ===== RASTERIZATION =====

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    TriangleList,
    TriangleStrip,
}

/// Face culling mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    Front,
    Back,
}

/// Front face winding order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrontFace {
    CounterClockwise,
    Clockwise,
}

/// Polygon rasterization mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrimitiveState {
    pub topology: PrimitiveTopology,
    pub front_face: FrontFace,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
}

impl Default for PrimitiveState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            front_face: FrontFace::CounterClockwise,
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Fill,
        }
    }
}

// ===== DEPTH =====

/// Comparison function for depth tests and comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub format: TextureFormat,
    pub depth_write_enabled: bool,
    pub depth_compare: CompareFunction,
}

// ===== BLENDING =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    Src,
    OneMinusSrc,
    SrcAlpha,
    OneMinusSrcAlpha,
    Dst,
    OneMinusDst,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOperation {
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Blend equation for one channel group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponent {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub operation: BlendOperation,
}

impl BlendComponent {
    pub const REPLACE: Self = Self {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        operation: BlendOperation::Add,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub color: BlendComponent,
    pub alpha: BlendComponent,
}

impl BlendState {
    /// Classic `src * a + dst * (1 - a)` blending
    pub const ALPHA_BLENDING: Self = Self {
        color: BlendComponent {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
        alpha: BlendComponent {
            src_factor: BlendFactor::One,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            operation: BlendOperation::Add,
        },
    };
}

bitflags! {
    /// Color write mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrites: u32 {
        const RED = 1 << 0;
        const GREEN = 1 << 1;
        const BLUE = 1 << 2;
        const ALPHA = 1 << 3;
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// One fragment output target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColorTargetState {
    pub format: TextureFormat,
    pub blend: Option<BlendState>,
    pub write_mask: ColorWrites,
}

// ===== PIPELINE DESC =====

pub struct VertexState<'a, A: Api> {
    pub module: &'a A::ShaderModule,
    pub buffers: Vec<VertexBufferLayout>,
}

pub struct FragmentState<'a, A: Api> {
    pub module: &'a A::ShaderModule,
    pub targets: Vec<ColorTargetState>,
}

/// Descriptor for creating a render pipeline
pub struct RenderPipelineDesc<'a, A: Api> {
    pub label: Option<String>,
    pub layout: &'a A::PipelineLayout,
    pub vertex: VertexState<'a, A>,
    pub fragment: Option<FragmentState<'a, A>>,
    pub primitive: PrimitiveState,
    pub depth_stencil: Option<DepthStencilState>,
    pub sample_count: u32,
}

impl<'a, A: Api> RenderPipelineDesc<'a, A> {
    pub fn map<B: Api>(&self, map: &impl ResourceMap<A, B>) -> Result<RenderPipelineDesc<'a, B>> {
        let fragment = match &self.fragment {
            Some(fragment) => Some(FragmentState {
                module: map.shader_module(fragment.module)?,
                targets: fragment.targets.clone(),
            }),
            None => None,
        };
        Ok(RenderPipelineDesc {
            label: self.label.clone(),
            layout: map.pipeline_layout(self.layout)?,
            vertex: VertexState {
                module: map.shader_module(self.vertex.module)?,
                buffers: self.vertex.buffers.clone(),
            },
            fragment,
            primitive: self.primitive,
            depth_stencil: self.depth_stencil,
            sample_count: self.sample_count,
        })
    }

    /// Backend-independent validation of the fixed-function state
    pub fn validate(&self) -> Result<()> {
        let mut locations = FxHashSet::default();
        for (slot, buffer) in self.vertex.buffers.iter().enumerate() {
            for attribute in &buffer.attributes {
                if !locations.insert(attribute.shader_location) {
                    return Err(Error::CreationFailed(format!(
                        "Vertex location {} is declared twice",
                        attribute.shader_location
                    )));
                }
                if buffer.array_stride != 0
                    && u64::from(attribute.offset) + u64::from(attribute.format.size()) > u64::from(buffer.array_stride)
                {
                    return Err(Error::CreationFailed(format!(
                        "Attribute at location {} overflows the {}-byte stride of slot {}",
                        attribute.shader_location, buffer.array_stride, slot
                    )));
                }
            }
        }
        if let Some(fragment) = &self.fragment {
            for target in &fragment.targets {
                if target.format.is_depth() {
                    return Err(Error::CreationFailed(format!(
                        "Color target cannot use depth format {:?}",
                        target.format
                    )));
                }
            }
        }
        if let Some(depth) = &self.depth_stencil {
            if !depth.format.is_depth() {
                return Err(Error::CreationFailed(format!(
                    "Depth/stencil state uses non-depth format {:?}",
                    depth.format
                )));
            }
        }
        if self.sample_count == 0 || !self.sample_count.is_power_of_two() {
            return Err(Error::CreationFailed(format!("Invalid sample count {}", self.sample_count)));
        }
        Ok(())
    }

    /// Resolve `TextureFormat::Presentation` targets to the surface format
    pub fn color_formats(&self, surface_format: TextureFormat) -> Vec<TextureFormat> {
        self.fragment
            .as_ref()
            .map(|fragment| {
                fragment
                    .targets
                    .iter()
                    .map(|target| match target.format {
                        TextureFormat::Presentation => surface_format,
                        format => format,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
