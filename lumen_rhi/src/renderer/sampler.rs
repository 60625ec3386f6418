/// Sampler descriptor and the key used by sampler caches

use crate::renderer::CompareFunction;

/// Texture coordinate addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    ClampToEdge,
    Repeat,
    MirrorRepeat,
    ClampToBorder,
}

/// Texel filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

/// Descriptor for creating a sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerDesc {
    pub label: Option<String>,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    /// Depth comparison sampler when set
    pub compare: Option<CompareFunction>,
    /// 1 disables anisotropic filtering
    pub max_anisotropy: u16,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            label: None,
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: FilterMode::Nearest,
            lod_min_clamp: 0.0,
            lod_max_clamp: 32.0,
            compare: None,
            max_anisotropy: 1,
        }
    }
}

/// Cache key for samplers: (address_mode_u, address_mode_v, min_filter, mag_filter)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
}

impl SamplerKey {
    pub fn new(
        address_mode_u: AddressMode,
        address_mode_v: AddressMode,
        min_filter: FilterMode,
        mag_filter: FilterMode,
    ) -> Self {
        Self { address_mode_u, address_mode_v, min_filter, mag_filter }
    }

    /// Full descriptor for the key; unkeyed fields take their defaults
    pub fn to_desc(&self) -> SamplerDesc {
        SamplerDesc {
            address_mode_u: self.address_mode_u,
            address_mode_v: self.address_mode_v,
            min_filter: self.min_filter,
            mag_filter: self.mag_filter,
            ..Default::default()
        }
    }
}
