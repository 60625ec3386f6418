//! Unit tests for binding.rs
//!
//! Uses a plain-integer handle family so descriptors can be built without a GPU.

use crate::error::{Error, Result};
use crate::renderer::{
    Api, BindGroupDesc, BindGroupEntry, BindGroupLayoutDesc, BindGroupLayoutEntry,
    BindingResource, BindingType, BufferBinding, PipelineLayoutDesc, PushConstantRange,
    ResourceMap, ShaderStages,
};

// ============================================================================
// TEST HANDLE FAMILIES
// ============================================================================

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

/// Identity resolution that rejects ids at or above `limit`
struct Below {
    limit: u32,
}

impl Below {
    fn check<'r>(&self, id: &'r u32) -> Result<&'r u32> {
        if *id < self.limit {
            Ok(id)
        } else {
            Err(Error::InvalidUsage(format!("unknown id {}", id)))
        }
    }
}

impl ResourceMap<Ids, Ids> for Below {
    fn buffer<'r>(&self, buffer: &'r u32) -> Result<&'r u32> {
        self.check(buffer)
    }
    fn texture<'r>(&self, texture: &'r u32) -> Result<&'r u32> {
        self.check(texture)
    }
    fn texture_view<'r>(&self, view: &'r u32) -> Result<&'r u32> {
        self.check(view)
    }
    fn sampler<'r>(&self, sampler: &'r u32) -> Result<&'r u32> {
        self.check(sampler)
    }
    fn shader_module<'r>(&self, module: &'r u32) -> Result<&'r u32> {
        self.check(module)
    }
    fn bind_group_layout<'r>(&self, layout: &'r u32) -> Result<&'r u32> {
        self.check(layout)
    }
    fn pipeline_layout<'r>(&self, layout: &'r u32) -> Result<&'r u32> {
        self.check(layout)
    }
}

fn camera_layout() -> BindGroupLayoutDesc {
    BindGroupLayoutDesc {
        label: Some("camera".to_string()),
        entries: vec![
            BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::UniformBuffer {
                    has_dynamic_offset: true,
                    min_binding_size: Some(64),
                },
                count: 1,
            },
            BindGroupLayoutEntry {
                binding: 1,
                visibility: ShaderStages::FRAGMENT,
                ty: BindingType::CombinedImageSampler,
                count: 1,
            },
        ],
    }
}

// ============================================================================
// LAYOUT VALIDATION TESTS
// ============================================================================

#[test]
fn test_layout_valid() {
    let layout = camera_layout();
    assert!(layout.validate().is_ok());
    assert_eq!(layout.dynamic_offset_count(), 1);
    assert!(layout.entry(1).is_some());
    assert!(layout.entry(2).is_none());
}

#[test]
fn test_layout_duplicate_binding_rejected() {
    let mut layout = camera_layout();
    layout.entries[1].binding = 0;
    assert!(matches!(layout.validate(), Err(Error::CreationFailed(_))));
}

#[test]
fn test_layout_zero_count_rejected() {
    let mut layout = camera_layout();
    layout.entries[0].count = 0;
    assert!(layout.validate().is_err());
}

#[test]
fn test_layout_invisible_binding_rejected() {
    let mut layout = camera_layout();
    layout.entries[0].visibility = ShaderStages::empty();
    assert!(layout.validate().is_err());
}

// ============================================================================
// BIND GROUP CHECK TESTS
// ============================================================================

#[test]
fn test_bind_group_matches_layout() {
    let layout = camera_layout();
    let entries: Vec<BindGroupEntry<'_, Ids>> = vec![
        BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding { buffer: &7, offset: 0, size: Some(64) }),
        },
        BindGroupEntry {
            binding: 1,
            resource: BindingResource::CombinedImageSampler { view: &3, sampler: &4 },
        },
    ];
    assert!(layout.check_bind_group(&entries).is_ok());
}

#[test]
fn test_bind_group_type_mismatch_rejected() {
    let layout = camera_layout();
    let entries: Vec<BindGroupEntry<'_, Ids>> = vec![
        BindGroupEntry {
            binding: 0,
            resource: BindingResource::CombinedImageSampler { view: &3, sampler: &4 },
        },
        BindGroupEntry {
            binding: 1,
            resource: BindingResource::CombinedImageSampler { view: &3, sampler: &4 },
        },
    ];
    assert!(layout.check_bind_group(&entries).is_err());
}

#[test]
fn test_bind_group_too_small_buffer_rejected() {
    let layout = camera_layout();
    let entries: Vec<BindGroupEntry<'_, Ids>> = vec![
        BindGroupEntry {
            binding: 0,
            resource: BindingResource::Buffer(BufferBinding { buffer: &7, offset: 0, size: Some(16) }),
        },
        BindGroupEntry {
            binding: 1,
            resource: BindingResource::CombinedImageSampler { view: &3, sampler: &4 },
        },
    ];
    assert!(layout.check_bind_group(&entries).is_err());
}

#[test]
fn test_bind_group_missing_entry_rejected() {
    let layout = camera_layout();
    let entries: Vec<BindGroupEntry<'_, Ids>> = vec![BindGroupEntry {
        binding: 1,
        resource: BindingResource::CombinedImageSampler { view: &3, sampler: &4 },
    }];
    assert!(layout.check_bind_group(&entries).is_err());
}

// ============================================================================
// MAPPING TESTS
// ============================================================================

#[test]
fn test_bind_group_desc_map_resolves_every_handle() {
    let resolver = Below { limit: 4 };
    let desc: BindGroupDesc<'_, Ids> = BindGroupDesc {
        label: None,
        layout: &0,
        entries: vec![
            BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer(BufferBinding { buffer: &1, offset: 16, size: None }),
            },
            BindGroupEntry {
                binding: 1,
                resource: BindingResource::CombinedImageSampler { view: &2, sampler: &3 },
            },
        ],
    };

    let mapped = desc.map(&resolver).unwrap();
    assert_eq!(*mapped.layout, 0);
    match &mapped.entries[0].resource {
        BindingResource::Buffer(binding) => {
            assert_eq!(*binding.buffer, 1);
            assert_eq!(binding.offset, 16);
        }
        _ => panic!("expected buffer binding"),
    }
    match &mapped.entries[1].resource {
        BindingResource::CombinedImageSampler { view, sampler } => {
            assert_eq!(**view, 2);
            assert_eq!(**sampler, 3);
        }
        _ => panic!("expected combined image sampler"),
    }
}

#[test]
fn test_map_propagates_resolution_failure() {
    let resolver = Below { limit: 1 };
    let desc: PipelineLayoutDesc<'_, Ids> = PipelineLayoutDesc {
        label: None,
        bind_group_layouts: vec![&0, &9],
        push_constant_ranges: vec![],
    };
    assert!(matches!(desc.map(&resolver), Err(Error::InvalidUsage(_))));
}

// ============================================================================
// PUSH CONSTANT TESTS
// ============================================================================

#[test]
fn test_push_constant_validation() {
    let mut desc: PipelineLayoutDesc<'_, Ids> = PipelineLayoutDesc {
        label: None,
        bind_group_layouts: vec![],
        push_constant_ranges: vec![
            PushConstantRange { stages: ShaderStages::VERTEX, offset: 0, size: 64 },
            PushConstantRange { stages: ShaderStages::FRAGMENT, offset: 64, size: 16 },
        ],
    };
    assert!(desc.validate_push_constants(128).is_ok());
    assert_eq!(desc.push_constant_size(), 80);
    assert!(desc.validate_push_constants(72).is_err());

    desc.push_constant_ranges[1].offset = 66;
    assert!(desc.validate_push_constants(128).is_err());
}

#[test]
fn test_push_constant_range_at_u32_limit_rejected() {
    let range = PushConstantRange { stages: ShaderStages::VERTEX, offset: u32::MAX - 3, size: 4 };
    assert_eq!(range.end(), u64::from(u32::MAX) + 1);

    let desc: PipelineLayoutDesc<'_, Ids> = PipelineLayoutDesc {
        label: None,
        bind_group_layouts: vec![],
        push_constant_ranges: vec![range],
    };
    assert!(matches!(desc.validate_push_constants(128), Err(Error::CreationFailed(_))));
    assert_eq!(desc.push_constant_size(), u32::MAX);
}
