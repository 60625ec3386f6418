/// ShaderModule - SPIR-V module with spirq reflection
///
/// Reflection provides the entry points, the descriptor slots the shader reads
/// and its push constant block size. Pipeline creation checks these against the
/// pipeline layout so mismatches fail at creation rather than at draw time.

use ash::vk;
use lumen_rhi::lumen::render::{BindingType, ShaderModuleDesc, ShaderStage};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error};
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Kind of descriptor a shader declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReflectedKind {
    UniformBuffer,
    StorageBuffer,
    CombinedImageSampler,
}

impl ReflectedKind {
    /// Whether a layout entry of type `ty` can feed this descriptor
    pub fn accepts(&self, ty: &BindingType) -> bool {
        matches!(
            (self, ty),
            (ReflectedKind::UniformBuffer, BindingType::UniformBuffer { .. })
                | (ReflectedKind::StorageBuffer, BindingType::StorageBuffer { .. })
                | (ReflectedKind::CombinedImageSampler, BindingType::CombinedImageSampler)
        )
    }
}

/// Descriptor slot declared by a shader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: ReflectedKind,
}

/// Vulkan shader module implementation
pub struct ShaderModule {
    ctx: Arc<GpuContext>,
    /// Vulkan shader module
    pub(crate) raw: vk::ShaderModule,
    pub(crate) stage: ShaderStage,
    /// Entry point name (NUL-terminated for the pipeline create info)
    pub(crate) entry_point: CString,
    pub(crate) bindings: Vec<ReflectedBinding>,
    /// Size of the push constant block, 0 if none
    pub(crate) push_constant_size: u32,
}

impl ShaderModule {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ShaderModuleDesc) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::vulkan", "{}", e))?;

        // read_spv checks the length and magic number and fixes alignment/endianness
        let code = ash::util::read_spv(&mut Cursor::new(&desc.code))
            .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Invalid SPIR-V ({} bytes): {}", desc.code.len(), e))?;

        let entry_points = spirq::ReflectConfig::new()
            .spv(code.as_slice())
            .ref_all_rscs(true)
            .reflect()
            .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "SPIR-V reflection failed: {:?}", e))?;

        let entry = entry_points
            .iter()
            .find(|entry| entry.name == desc.entry_point)
            .ok_or_else(|| {
                let available: Vec<&str> = entry_points.iter().map(|entry| entry.name.as_str()).collect();
                rhi_err!(
                    CreationFailed,
                    "lumen::vulkan",
                    "Entry point '{}' not found in shader (available: {:?})",
                    desc.entry_point,
                    available
                )
            })?;

        let mut bindings = Vec::new();
        let mut push_constant_size = 0u32;
        for var in entry.vars.iter() {
            match var {
                spirq::var::Variable::Descriptor { name, desc_bind, desc_ty, .. } => {
                    bindings.push(ReflectedBinding {
                        name: name.clone().unwrap_or_default(),
                        set: desc_bind.set(),
                        binding: desc_bind.bind(),
                        kind: Self::reflected_kind(desc_ty)?,
                    });
                }
                spirq::var::Variable::PushConstant { ty, .. } => {
                    push_constant_size = push_constant_size.max(ty.nbyte().unwrap_or(0) as u32);
                }
                _ => {}
            }
        }

        let entry_point = CString::new(desc.entry_point.as_str())
            .map_err(|_| rhi_err!(CreationFailed, "lumen::vulkan", "Entry point name contains a NUL byte"))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let raw = unsafe {
            ctx.device.create_shader_module(&create_info, None)
                .map_err(|e| rhi_err!(CreationFailed, "lumen::vulkan", "Failed to create shader module: {:?}", e))?
        };

        Ok(Self {
            ctx,
            raw,
            stage: desc.stage,
            entry_point,
            bindings,
            push_constant_size,
        })
    }

    fn reflected_kind(desc_ty: &spirq::ty::DescriptorType) -> Result<ReflectedKind> {
        use spirq::ty::DescriptorType;
        match desc_ty {
            DescriptorType::UniformBuffer() => Ok(ReflectedKind::UniformBuffer),
            DescriptorType::StorageBuffer(..) => Ok(ReflectedKind::StorageBuffer),
            DescriptorType::CombinedImageSampler() => Ok(ReflectedKind::CombinedImageSampler),
            other => {
                rhi_bail!(CreationFailed, "lumen::vulkan", "Unsupported SPIR-V descriptor type: {:?}", other);
            }
        }
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn bindings(&self) -> &[ReflectedBinding] {
        &self.bindings
    }

    pub fn push_constant_size(&self) -> u32 {
        self.push_constant_size
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.raw, None);
        }
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
