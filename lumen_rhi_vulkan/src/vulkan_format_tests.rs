//! Unit tests for Vulkan format conversion functions
//!
//! Tests pure conversion functions without requiring GPU.
//! Validates correct mapping between lumen descriptor types and Vulkan enums.

use ash::vk;
use lumen_rhi::lumen::render::{
    BindingType, BufferUsage, ColorSpace, ColorWrites, LoadOp, PresentMode, ShaderStages,
    StoreOp, TextureFormat, TextureUsage, VertexFormat,
};
use super::*;

// ============================================================================
// TEXTURE FORMAT CONVERSION TESTS
// ============================================================================

#[test]
fn test_texture_format_round_trip() {
    let formats = [
        TextureFormat::R8Unorm,
        TextureFormat::Rg8Unorm,
        TextureFormat::Rgba8Unorm,
        TextureFormat::Rgba8UnormSrgb,
        TextureFormat::Bgra8Unorm,
        TextureFormat::Bgra8UnormSrgb,
        TextureFormat::R32Float,
        TextureFormat::Rgba16Float,
        TextureFormat::Rgba32Float,
        TextureFormat::Depth16Unorm,
        TextureFormat::Depth32Float,
        TextureFormat::Depth24PlusStencil8,
        TextureFormat::Depth32FloatStencil8,
    ];
    for format in formats {
        let vk_format = texture_format_to_vk(format).unwrap();
        assert_eq!(texture_format_from_vk(vk_format), Some(format));
    }
}

#[test]
fn test_presentation_format_has_no_vk_format() {
    assert_eq!(texture_format_to_vk(TextureFormat::Presentation), None);
}

#[test]
fn test_unknown_vk_format_is_none() {
    assert_eq!(texture_format_from_vk(vk::Format::A2B10G10R10_UNORM_PACK32), None);
}

#[test]
fn test_aspect_flags() {
    assert_eq!(aspect_flags(TextureFormat::Rgba8Unorm), vk::ImageAspectFlags::COLOR);
    assert_eq!(aspect_flags(TextureFormat::Depth32Float), vk::ImageAspectFlags::DEPTH);
    assert_eq!(
        aspect_flags(TextureFormat::Depth24PlusStencil8),
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    );
    assert_eq!(copy_aspect(TextureFormat::Depth24PlusStencil8), vk::ImageAspectFlags::DEPTH);
}

// ============================================================================
// USAGE CONVERSION TESTS
// ============================================================================

#[test]
fn test_buffer_usage_mapping() {
    let flags = buffer_usage_to_vk(BufferUsage::VERTEX | BufferUsage::COPY_DST);
    assert_eq!(flags, vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST);
}

#[test]
fn test_map_only_buffer_gets_transfer_usage() {
    assert_eq!(buffer_usage_to_vk(BufferUsage::MAP_READ), vk::BufferUsageFlags::TRANSFER_SRC);
}

#[test]
fn test_render_attachment_usage_depends_on_format() {
    assert_eq!(
        texture_usage_to_vk(TextureUsage::RENDER_ATTACHMENT, TextureFormat::Rgba8Unorm),
        vk::ImageUsageFlags::COLOR_ATTACHMENT
    );
    assert_eq!(
        texture_usage_to_vk(TextureUsage::RENDER_ATTACHMENT, TextureFormat::Depth32Float),
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
    );
    assert_eq!(
        required_format_features(TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST, TextureFormat::Rgba8Unorm),
        vk::FormatFeatureFlags::SAMPLED_IMAGE | vk::FormatFeatureFlags::TRANSFER_DST
    );
}

#[test]
fn test_shader_stages_mapping() {
    assert_eq!(
        shader_stages_to_vk(ShaderStages::VERTEX_FRAGMENT),
        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
    );
}

#[test]
fn test_dynamic_binding_types() {
    assert_eq!(
        binding_type_to_vk(BindingType::UniformBuffer { has_dynamic_offset: true, min_binding_size: None }),
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
    );
    assert_eq!(
        binding_type_to_vk(BindingType::StorageBuffer { read_only: true, has_dynamic_offset: false }),
        vk::DescriptorType::STORAGE_BUFFER
    );
    assert_eq!(
        binding_type_to_vk(BindingType::CombinedImageSampler),
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER
    );
}

// ============================================================================
// PIPELINE STATE CONVERSION TESTS
// ============================================================================

#[test]
fn test_vertex_formats() {
    assert_eq!(vertex_format_to_vk(VertexFormat::Float32x2), vk::Format::R32G32_SFLOAT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Sint32x3), vk::Format::R32G32B32_SINT);
    assert_eq!(vertex_format_to_vk(VertexFormat::Unorm8x4), vk::Format::R8G8B8A8_UNORM);
}

#[test]
fn test_color_writes() {
    assert_eq!(color_writes_to_vk(ColorWrites::ALL), vk::ColorComponentFlags::RGBA);
    assert_eq!(
        color_writes_to_vk(ColorWrites::RED | ColorWrites::ALPHA),
        vk::ColorComponentFlags::R | vk::ColorComponentFlags::A
    );
}

#[test]
fn test_load_store_ops() {
    assert_eq!(load_op_to_vk(&LoadOp::Clear(0.0f32)), vk::AttachmentLoadOp::CLEAR);
    assert_eq!(load_op_to_vk::<f32>(&LoadOp::Load), vk::AttachmentLoadOp::LOAD);
    assert_eq!(load_op_to_vk::<f32>(&LoadOp::DontCare), vk::AttachmentLoadOp::DONT_CARE);
    assert_eq!(store_op_to_vk(StoreOp::Discard), vk::AttachmentStoreOp::DONT_CARE);
}

// ============================================================================
// SURFACE CONVERSION TESTS
// ============================================================================

#[test]
fn test_present_modes_round_trip() {
    for mode in [PresentMode::Immediate, PresentMode::Mailbox, PresentMode::Fifo, PresentMode::FifoRelaxed] {
        assert_eq!(present_mode_from_vk(present_mode_to_vk(mode)), Some(mode));
    }
    assert_eq!(present_mode_from_vk(vk::PresentModeKHR::SHARED_DEMAND_REFRESH), None);
}

#[test]
fn test_color_space_round_trip() {
    for space in [ColorSpace::SrgbNonlinear, ColorSpace::ExtendedSrgbLinear, ColorSpace::DisplayP3Nonlinear] {
        assert_eq!(color_space_from_vk(color_space_to_vk(space)), Some(space));
    }
}
