//! Unit tests for pipeline.rs

use crate::renderer::{
    Api, BlendState, ColorTargetState, ColorWrites, CompareFunction, DepthStencilState,
    FragmentState, PrimitiveState, RenderPipelineDesc, TextureFormat, VertexAttribute,
    VertexBufferLayout, VertexFormat, VertexState, VertexStepMode,
};

struct Ids;

impl Api for Ids {
    type Buffer = u32;
    type Texture = u32;
    type TextureView = u32;
    type Sampler = u32;
    type ShaderModule = u32;
    type BindGroupLayout = u32;
    type PipelineLayout = u32;
}

/// Position (Vec2) + color (Vec3), stride 20
fn quad_layout() -> VertexBufferLayout {
    VertexBufferLayout {
        array_stride: 20,
        step_mode: VertexStepMode::Vertex,
        attributes: vec![
            VertexAttribute { format: VertexFormat::Float32x2, offset: 0, shader_location: 0 },
            VertexAttribute { format: VertexFormat::Float32x3, offset: 8, shader_location: 1 },
        ],
    }
}

fn quad_pipeline(targets: Vec<ColorTargetState>) -> RenderPipelineDesc<'static, Ids> {
    RenderPipelineDesc {
        label: None,
        layout: &0,
        vertex: VertexState { module: &1, buffers: vec![quad_layout()] },
        fragment: Some(FragmentState { module: &2, targets }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        sample_count: 1,
    }
}

fn presentation_target() -> ColorTargetState {
    ColorTargetState {
        format: TextureFormat::Presentation,
        blend: Some(BlendState::ALPHA_BLENDING),
        write_mask: ColorWrites::ALL,
    }
}

// ============================================================================
// VALIDATION TESTS
// ============================================================================

#[test]
fn test_quad_pipeline_valid() {
    assert!(quad_pipeline(vec![presentation_target()]).validate().is_ok());
}

#[test]
fn test_attribute_overflowing_stride_rejected() {
    let mut desc = quad_pipeline(vec![presentation_target()]);
    desc.vertex.buffers[0].array_stride = 16;
    assert!(desc.validate().is_err());
}

#[test]
fn test_attribute_offset_near_u32_limit_rejected() {
    let mut desc = quad_pipeline(vec![presentation_target()]);
    desc.vertex.buffers[0].attributes[1].offset = u32::MAX - 4;
    assert!(desc.validate().is_err());
}

#[test]
fn test_duplicate_location_rejected() {
    let mut desc = quad_pipeline(vec![presentation_target()]);
    desc.vertex.buffers[0].attributes[1].shader_location = 0;
    assert!(desc.validate().is_err());
}

#[test]
fn test_depth_color_target_rejected() {
    let mut target = presentation_target();
    target.format = TextureFormat::Depth32Float;
    assert!(quad_pipeline(vec![target]).validate().is_err());
}

#[test]
fn test_depth_state_requires_depth_format() {
    let mut desc = quad_pipeline(vec![presentation_target()]);
    desc.depth_stencil = Some(DepthStencilState {
        format: TextureFormat::Rgba8Unorm,
        depth_write_enabled: true,
        depth_compare: CompareFunction::Less,
    });
    assert!(desc.validate().is_err());

    desc.depth_stencil = Some(DepthStencilState {
        format: TextureFormat::Depth24PlusStencil8,
        depth_write_enabled: true,
        depth_compare: CompareFunction::Less,
    });
    assert!(desc.validate().is_ok());
}

// ============================================================================
// PRESENTATION FORMAT RESOLUTION
// ============================================================================

#[test]
fn test_presentation_targets_resolve_to_surface_format() {
    let mut other = presentation_target();
    other.format = TextureFormat::Rgba16Float;
    let desc = quad_pipeline(vec![presentation_target(), other]);
    assert_eq!(
        desc.color_formats(TextureFormat::Bgra8UnormSrgb),
        vec![TextureFormat::Bgra8UnormSrgb, TextureFormat::Rgba16Float]
    );
}

#[test]
fn test_no_fragment_stage_has_no_color_formats() {
    let mut desc = quad_pipeline(vec![]);
    desc.fragment = None;
    assert!(desc.color_formats(TextureFormat::Rgba8Unorm).is_empty());
}
