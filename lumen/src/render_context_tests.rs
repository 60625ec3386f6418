//! Unit tests for render_context.rs
//!
//! The sampler cache is exercised with a counting factory instead of a device.

use super::*;
use lumen_rhi::lumen::Error;
use std::cell::Cell;

fn key(u: AddressMode, min: FilterMode) -> SamplerKey {
    SamplerKey::new(u, AddressMode::Repeat, min, FilterMode::Linear)
}

// ============================================================================
// SAMPLER CACHE TESTS
// ============================================================================

#[test]
fn test_identical_keys_share_one_sampler() {
    let created = Cell::new(0u32);
    let mut cache = SamplerCache::new();
    let factory = |_: &SamplerDesc| -> Result<u32> {
        created.set(created.get() + 1);
        Ok(created.get())
    };

    let first = cache.get_or_create(key(AddressMode::Repeat, FilterMode::Linear), factory).unwrap();
    let second = cache.get_or_create(key(AddressMode::Repeat, FilterMode::Linear), factory).unwrap();

    assert_eq!(first, second);
    assert_eq!(created.get(), 1);
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_each_key_field_yields_a_distinct_sampler() {
    let created = Cell::new(0u32);
    let mut cache = SamplerCache::new();
    let factory = |_: &SamplerDesc| -> Result<u32> {
        created.set(created.get() + 1);
        Ok(created.get())
    };

    let base = key(AddressMode::Repeat, FilterMode::Linear);
    let variants = [
        base,
        SamplerKey { address_mode_u: AddressMode::ClampToEdge, ..base },
        SamplerKey { address_mode_v: AddressMode::MirrorRepeat, ..base },
        SamplerKey { min_filter: FilterMode::Nearest, ..base },
        SamplerKey { mag_filter: FilterMode::Nearest, ..base },
    ];
    let samplers: Vec<u32> = variants
        .iter()
        .map(|variant| cache.get_or_create(*variant, factory).unwrap())
        .collect();

    assert_eq!(samplers, vec![1, 2, 3, 4, 5]);
    assert_eq!(cache.len(), variants.len());
}

#[test]
fn test_factory_receives_key_fields() {
    let mut cache = SamplerCache::new();
    let requested = SamplerKey::new(
        AddressMode::ClampToEdge,
        AddressMode::MirrorRepeat,
        FilterMode::Nearest,
        FilterMode::Linear,
    );
    let desc = cache.get_or_create(requested, |desc| Ok(desc.clone())).unwrap();

    assert_eq!(desc.address_mode_u, AddressMode::ClampToEdge);
    assert_eq!(desc.address_mode_v, AddressMode::MirrorRepeat);
    assert_eq!(desc.min_filter, FilterMode::Nearest);
    assert_eq!(desc.mag_filter, FilterMode::Linear);
}

#[test]
fn test_failed_creation_is_not_cached() {
    let mut cache: SamplerCache<u32> = SamplerCache::new();
    let requested = key(AddressMode::Repeat, FilterMode::Nearest);

    let result = cache.get_or_create(requested, |_| Err(Error::OutOfMemory));
    assert!(matches!(result, Err(Error::OutOfMemory)));
    assert!(cache.is_empty());

    assert_eq!(cache.get_or_create(requested, |_| Ok(7)).unwrap(), 7);
    cache.clear();
    assert!(cache.is_empty());
}

// ============================================================================
// SHADER PATH TESTS
// ============================================================================

#[test]
fn test_shader_paths_from_source() {
    let paths = ShaderPaths::from_source("shaders/quad.vert");
    assert_eq!(paths.for_api(ApiPreference::Gl), Path::new("shaders/quad.vert"));
    assert_eq!(paths.for_api(ApiPreference::Vulkan), Path::new("shaders/quad.vert.spv"));
}

#[test]
fn test_shader_paths_explicit() {
    let paths = ShaderPaths::new("spirv/mesh.spv", "glsl/mesh.glsl");
    assert_eq!(paths.for_api(ApiPreference::Vulkan), Path::new("spirv/mesh.spv"));
    assert_eq!(paths.for_api(ApiPreference::Gl), Path::new("glsl/mesh.glsl"));
}
