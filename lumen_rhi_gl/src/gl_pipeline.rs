/// RenderPipeline - linked GL program plus fixed-function state
///
/// The program is linked from the vertex and fragment modules. Each pipeline
/// owns a vertex array object; attribute pointers are set at draw time from
/// whatever vertex buffers are bound, since GL ties them to the buffer.

use glow::HasContext;
use lumen_rhi::lumen::render::{
    ColorTargetState, ColorWrites, DepthStencilState, PrimitiveState, RenderPipelineDesc, ShaderStage,
    TextureFormat, VertexBufferLayout, VertexStepMode,
};
use lumen_rhi::lumen::Result;
use lumen_rhi::{rhi_bail, rhi_err, rhi_error, rhi_warn};
use std::sync::Arc;

use crate::gl_binding::PipelineLayout;
use crate::gl_context::{GlContext, PUSH_CONSTANT_BINDING};
use crate::gl_format::{
    blend_factor_to_gl, blend_op_to_gl, compare_to_gl, cull_mode_to_gl, front_face_to_gl,
    polygon_mode_to_gl, texture_format_to_gl, topology_to_gl, vertex_format_to_gl,
};
use crate::GlApi;

/// Name of the uniform block standing in for push constants
pub const PUSH_CONSTANT_BLOCK: &str = "PushConstants";

/// A vertex buffer bound at draw time
#[derive(Debug, Clone, Copy)]
pub(crate) struct VertexBinding {
    pub buffer: glow::Buffer,
    pub offset: u64,
}

/// GL render pipeline implementation
pub struct RenderPipeline {
    ctx: Arc<GlContext>,
    pub(crate) program: glow::Program,
    vertex_array: glow::VertexArray,
    pub(crate) layout: Arc<PipelineLayout>,
    buffers: Vec<VertexBufferLayout>,
    primitive: PrimitiveState,
    depth_stencil: Option<DepthStencilState>,
    targets: Vec<ColorTargetState>,
    pub(crate) topology: u32,
    pub(crate) color_formats: Vec<TextureFormat>,
    pub(crate) depth_format: Option<TextureFormat>,
    pub(crate) sample_count: u32,
}

impl RenderPipeline {
    /// Create a pipeline; `Presentation` color targets resolve to `surface_format`
    pub(crate) fn new(
        ctx: Arc<GlContext>,
        desc: &RenderPipelineDesc<'_, GlApi>,
        surface_format: TextureFormat,
    ) -> Result<Self> {
        desc.validate()
            .inspect_err(|e| rhi_error!("lumen::gl", "{}", e))?;

        let layout = Arc::clone(desc.layout);
        if desc.vertex.module.stage != ShaderStage::Vertex {
            rhi_bail!(CreationFailed, "lumen::gl", "Vertex state uses a {:?} shader", desc.vertex.module.stage);
        }
        if let Some(fragment) = &desc.fragment {
            if fragment.module.stage != ShaderStage::Fragment {
                rhi_bail!(CreationFailed, "lumen::gl", "Fragment state uses a {:?} shader", fragment.module.stage);
            }
        }

        let color_formats = desc.color_formats(surface_format);
        for format in color_formats.iter().chain(desc.depth_stencil.as_ref().map(|depth| &depth.format)) {
            if texture_format_to_gl(*format).is_none() {
                rhi_bail!(CreationFailed, "lumen::gl", "Format {:?} cannot be rendered to", format);
            }
        }
        if desc.sample_count > ctx.limits.max_samples {
            rhi_bail!(CreationFailed, "lumen::gl", "Sample count {} exceeds GL_MAX_SAMPLES", desc.sample_count);
        }

        let (program, vertex_array) = unsafe {
            let gl = &ctx.gl;
            let program = gl
                .create_program()
                .map_err(|e| rhi_err!(CreationFailed, "lumen::gl", "Failed to create program: {}", e))?;
            let mut shaders = vec![desc.vertex.module.raw];
            if let Some(fragment) = &desc.fragment {
                shaders.push(fragment.module.raw);
            }
            for &shader in &shaders {
                gl.attach_shader(program, shader);
            }
            gl.link_program(program);
            for &shader in &shaders {
                gl.detach_shader(program, shader);
            }
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                rhi_bail!(CreationFailed, "lumen::gl", "Program link failed: {}", log.trim());
            }

            if let Err(e) = Self::bind_push_constant_block(gl, program, &layout) {
                gl.delete_program(program);
                return Err(e);
            }

            let vertex_array = match gl.create_vertex_array() {
                Ok(vertex_array) => vertex_array,
                Err(e) => {
                    gl.delete_program(program);
                    rhi_bail!(CreationFailed, "lumen::gl", "Failed to create vertex array: {}", e);
                }
            };
            if let Some(label) = &desc.label {
                if gl.supports_debug() {
                    gl.object_label(glow::PROGRAM, program.0.get(), Some(label.as_str()));
                }
            }
            (program, vertex_array)
        };

        Ok(Self {
            ctx,
            program,
            vertex_array,
            layout,
            buffers: desc.vertex.buffers.clone(),
            primitive: desc.primitive,
            depth_stencil: desc.depth_stencil,
            targets: desc.fragment.as_ref().map(|fragment| fragment.targets.clone()).unwrap_or_default(),
            topology: topology_to_gl(desc.primitive.topology),
            color_formats,
            depth_format: desc.depth_stencil.map(|depth| depth.format),
            sample_count: desc.sample_count,
        })
    }

    /// Point the program's push constant block at the reserved binding
    unsafe fn bind_push_constant_block(gl: &glow::Context, program: glow::Program, layout: &PipelineLayout) -> Result<()> {
        let Some(index) = gl.get_uniform_block_index(program, PUSH_CONSTANT_BLOCK) else {
            return Ok(());
        };
        let size = gl.get_active_uniform_block_parameter_i32(program, index, glow::UNIFORM_BLOCK_DATA_SIZE).max(0) as u32;
        if size > layout.push_constant_size() {
            rhi_bail!(
                CreationFailed,
                "lumen::gl",
                "Shader push constant block is {} bytes, layout covers {}",
                size,
                layout.push_constant_size()
            );
        }
        gl.uniform_block_binding(program, index, PUSH_CONSTANT_BINDING);
        Ok(())
    }

    pub fn layout(&self) -> &Arc<PipelineLayout> {
        &self.layout
    }

    pub fn vertex_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Program, vertex array and fixed-function state
    pub(crate) unsafe fn apply(&self, gl: &glow::Context) {
        gl.use_program(Some(self.program));
        gl.bind_vertex_array(Some(self.vertex_array));

        match cull_mode_to_gl(self.primitive.cull_mode) {
            Some(face) => {
                gl.enable(glow::CULL_FACE);
                gl.cull_face(face);
            }
            None => gl.disable(glow::CULL_FACE),
        }
        gl.front_face(front_face_to_gl(self.primitive.front_face));
        gl.polygon_mode(glow::FRONT_AND_BACK, polygon_mode_to_gl(self.primitive.polygon_mode));

        match &self.depth_stencil {
            Some(depth) => {
                gl.enable(glow::DEPTH_TEST);
                gl.depth_func(compare_to_gl(depth.depth_compare));
                gl.depth_mask(depth.depth_write_enabled);
            }
            None => {
                gl.disable(glow::DEPTH_TEST);
                gl.depth_mask(false);
            }
        }

        if self.sample_count > 1 {
            gl.enable(glow::MULTISAMPLE);
        } else {
            gl.disable(glow::MULTISAMPLE);
        }

        for (index, target) in self.targets.iter().enumerate() {
            let index = index as u32;
            match target.blend {
                Some(blend) => {
                    gl.enable_draw_buffer(glow::BLEND, index);
                    gl.blend_equation_separate_draw_buffer(
                        index,
                        blend_op_to_gl(blend.color.operation),
                        blend_op_to_gl(blend.alpha.operation),
                    );
                    gl.blend_func_separate_draw_buffer(
                        index,
                        blend_factor_to_gl(blend.color.src_factor),
                        blend_factor_to_gl(blend.color.dst_factor),
                        blend_factor_to_gl(blend.alpha.src_factor),
                        blend_factor_to_gl(blend.alpha.dst_factor),
                    );
                }
                None => gl.disable_draw_buffer(glow::BLEND, index),
            }
            let mask = target.write_mask;
            gl.color_mask_draw_buffer(
                index,
                mask.contains(ColorWrites::RED),
                mask.contains(ColorWrites::GREEN),
                mask.contains(ColorWrites::BLUE),
                mask.contains(ColorWrites::ALPHA),
            );
        }
    }

    /// Attribute pointers for the bound vertex buffers
    ///
    /// `first_instance` is folded into the offset of per-instance attributes,
    /// which GL 4.3 cannot pass to the draw call.
    pub(crate) unsafe fn bind_vertex_buffers(
        &self,
        gl: &glow::Context,
        vertex_buffers: &[Option<VertexBinding>],
        first_instance: u32,
    ) {
        for (slot, layout) in self.buffers.iter().enumerate() {
            let Some(binding) = vertex_buffers.get(slot).copied().flatten() else {
                rhi_warn!("lumen::gl", "Vertex buffer slot {} is not bound", slot);
                continue;
            };
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(binding.buffer));
            let stride = layout.array_stride as i32;
            let (divisor, instance_offset) = match layout.step_mode {
                VertexStepMode::Vertex => (0, 0),
                VertexStepMode::Instance => (1, first_instance as u64 * layout.array_stride as u64),
            };
            for attribute in &layout.attributes {
                let location = attribute.shader_location;
                let offset = (binding.offset + instance_offset + attribute.offset as u64) as i32;
                let (components, data_type, normalized) = vertex_format_to_gl(attribute.format);
                gl.enable_vertex_attrib_array(location);
                if attribute.format.is_integer() {
                    gl.vertex_attrib_pointer_i32(location, components, data_type, stride, offset);
                } else {
                    gl.vertex_attrib_pointer_f32(location, components, data_type, normalized, stride, offset);
                }
                gl.vertex_attrib_divisor(location, divisor);
            }
        }
        gl.bind_buffer(glow::ARRAY_BUFFER, None);
    }
}

impl Drop for RenderPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.gl.delete_vertex_array(self.vertex_array);
            self.ctx.gl.delete_program(self.program);
        }
    }
}
