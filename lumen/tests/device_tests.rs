//! Integration tests for the caller-facing Device
//!
//! All tests require a GPU and run on the Vulkan backend through a hidden
//! window; they are marked with #[ignore].
//!
//! Run with: cargo test -p lumen --test device_tests -- --ignored

use glam::Vec2;
use lumen::render::{
    AddressMode, BufferDesc, BufferUsage, Color, ColorTargetState, ColorWrites, Extent2D, Extent3D,
    FilterMode, FrameStatus, IndexFormat, ImageDataLayout, Operations, Origin3D, PrimitiveState,
    RenderPassColorAttachment, SamplerKey, ShaderStage, TextureDesc, TextureFormat, TextureUsage,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexStepMode,
};
use lumen::{
    load_shader, Buffer, Device, FragmentState, ImageCopyBuffer, ImageCopyTexture, PipelineLayoutDesc,
    RenderContext, RenderPassDesc, RenderPipeline, RenderPipelineDesc, ShaderPaths, SurfaceTarget, VertexState, DEPTH_FORMAT,
};
use lumen_rhi::lumen::render::ApiPreference;
use lumen_rhi::lumen::{reset_validation_stats, validation_stats, Config, Error};
use serial_test::serial;
use std::time::Instant;
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Helper to create a hidden test window
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Lumen Device Test")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn create_device(window: &Window, config: &Config) -> Device {
    let size = window.inner_size();
    Device::new(SurfaceTarget::Vulkan(window), Extent2D::new(size.width, size.height), config).unwrap()
}

fn shader_paths(name: &str) -> ShaderPaths {
    ShaderPaths::from_source(format!("{}/tests/shaders/{}", env!("CARGO_MANIFEST_DIR"), name))
}

fn upload_buffer(device: &Device, usage: BufferUsage, bytes: &[u8]) -> Buffer {
    let buffer = device
        .create_buffer(&BufferDesc {
            label: None,
            size: bytes.len() as u64,
            usage,
            mapped_at_creation: true,
        })
        .unwrap();
    buffer.get_mapped_range().unwrap().copy_from_slice(bytes);
    buffer.unmap().unwrap();
    buffer
}

/// Quad pipeline drawing into the surface format
fn create_quad_pipeline(device: &Device) -> RenderPipeline {
    let vertex_shader = load_shader(device, &shader_paths("quad.vert"), ShaderStage::Vertex).unwrap();
    let fragment_shader = load_shader(device, &shader_paths("quad.frag"), ShaderStage::Fragment).unwrap();
    let layout = device
        .create_pipeline_layout(&PipelineLayoutDesc {
            label: None,
            bind_group_layouts: vec![],
            push_constant_ranges: vec![],
        })
        .unwrap();
    device
        .create_render_pipeline(&RenderPipelineDesc {
            label: Some("quad".to_string()),
            layout: &layout,
            vertex: VertexState {
                module: &vertex_shader,
                buffers: vec![VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vec2>() as u32,
                    step_mode: VertexStepMode::Vertex,
                    attributes: vec![VertexAttribute {
                        format: VertexFormat::Float32x2,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            fragment: Some(FragmentState {
                module: &fragment_shader,
                targets: vec![ColorTargetState {
                    format: TextureFormat::Presentation,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                }],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            sample_count: 1,
        })
        .unwrap()
}

/// Run one frame that only clears the surface
fn clear_frame(device: &Device) -> FrameStatus {
    let status = device.begin_frame().unwrap();
    if let Some(view) = device.surface_view() {
        let mut encoder = device.create_command_encoder().unwrap();
        encoder
            .begin_render_pass(&RenderPassDesc {
                label: None,
                color_attachments: vec![RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations::clear(Color::new(0.0, 0.0, 0.0, 1.0)),
                }],
                depth_stencil_attachment: None,
            })
            .unwrap()
            .end()
            .unwrap();
        device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();
    }
    device.end_frame().unwrap();
    status
}

// ============================================================================
// FRAME TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_device_reports_api() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());
    assert_eq!(device.api(), ApiPreference::Vulkan);
    assert_eq!(device.queue().api(), ApiPreference::Vulkan);
}

#[test]
#[ignore] // Requires GPU
fn test_empty_frame_advances_index() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    let start = device.frame_index();
    assert_eq!(device.begin_frame().unwrap(), FrameStatus::Ready);
    device.end_frame().unwrap();
    assert_eq!(device.frame_index(), (start + 1) % device.image_count());
}

#[test]
#[ignore] // Requires GPU
fn test_frame_index_wraps_after_image_count_frames() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    let start = device.frame_index();
    for _ in 0..device.image_count() {
        assert_eq!(clear_frame(&device), FrameStatus::Ready);
    }
    assert_eq!(device.frame_index(), start);
}

#[test]
#[ignore] // Requires GPU
fn test_resize_leaves_no_stale_attachment() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    clear_frame(&device);
    let old_views = device.surface_views();
    device.on_window_resize(Extent2D::new(160, 120)).unwrap();

    let tracked = device.tracked_attachment_views();
    assert!(old_views.iter().all(|view| !tracked.contains(view)));
    assert_eq!(device.surface_extent(), Extent2D::new(160, 120));
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
}

#[test]
#[ignore] // Requires GPU
fn test_degenerate_surface_recovers() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    device.on_window_resize(Extent2D::new(0, 0)).unwrap();
    for _ in 0..device.image_count() + 1 {
        assert_eq!(clear_frame(&device), FrameStatus::Skipped);
    }

    device.on_window_resize(Extent2D::new(320, 240)).unwrap();
    assert!(!device.is_degenerate());
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
    device.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_zero_area_window_accepts_surface_pipelines() {
    let (window, _event_loop) = create_test_window();
    let device = Device::new(SurfaceTarget::Vulkan(&window), Extent2D::new(0, 0), &Config::default()).unwrap();
    assert!(device.is_degenerate());
    let format = device.surface_format();

    // Built against the surface format before any swapchain image exists
    let pipeline = create_quad_pipeline(&device);
    let triangle = [Vec2::new(-0.5, -0.5), Vec2::new(0.5, -0.5), Vec2::new(0.0, 0.5)];
    let vertex_buffer = upload_buffer(&device, BufferUsage::VERTEX, bytemuck::cast_slice(&triangle));
    assert_eq!(clear_frame(&device), FrameStatus::Skipped);

    device.on_window_resize(Extent2D::new(320, 240)).unwrap();
    assert_eq!(device.surface_format(), format);
    assert_eq!(device.begin_frame().unwrap(), FrameStatus::Ready);
    let view = device.surface_view().unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassDesc {
                label: None,
                color_attachments: vec![RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations::clear(Color::new(0.0, 0.0, 0.0, 1.0)),
                }],
                depth_stencil_attachment: None,
            })
            .unwrap();
        pass.set_pipeline(&pipeline).unwrap();
        pass.set_vertex_buffer(0, &vertex_buffer, 0, None).unwrap();
        pass.draw(3, 1, 0, 0).unwrap();
    }
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();
    drop(view);
    device.end_frame().unwrap();
    device.wait_idle().unwrap();
}

// ============================================================================
// RESOURCE TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_buffer_texture_round_trip() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    let (width, height) = (4u32, 4u32);
    let bytes: Vec<u8> = (0..width * height * 4).map(|i| (i * 7 % 256) as u8).collect();
    let upload = upload_buffer(&device, BufferUsage::COPY_SRC, &bytes);
    assert_eq!(upload.size(), bytes.len() as u64);

    let texture = device
        .create_texture(&TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::COPY_DST | TextureUsage::COPY_SRC,
        ))
        .unwrap();
    let readback = device
        .create_buffer(&BufferDesc {
            label: None,
            size: bytes.len() as u64,
            usage: BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            mapped_at_creation: false,
        })
        .unwrap();

    let layout = ImageDataLayout { offset: 0, bytes_per_row: width * 4, rows_per_image: None };
    let size = Extent3D::new(width, height, 1);
    let mut encoder = device.create_command_encoder().unwrap();
    encoder
        .copy_buffer_to_texture(
            &ImageCopyBuffer { buffer: &upload, layout },
            &ImageCopyTexture { texture: &texture, mip_level: 0, origin: Origin3D::default() },
            size,
        )
        .unwrap();
    encoder
        .copy_texture_to_buffer(
            &ImageCopyTexture { texture: &texture, mip_level: 0, origin: Origin3D::default() },
            &ImageCopyBuffer { buffer: &readback, layout },
            size,
        )
        .unwrap();
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();

    readback.map().unwrap();
    assert_eq!(&*readback.get_mapped_range().unwrap(), bytes.as_slice());
}

#[test]
#[ignore] // Requires GPU
fn test_render_context_defaults() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());
    let mut context = RenderContext::new(&device).unwrap();

    assert_eq!(context.white_texture().texture.format(), TextureFormat::Rgba8Unorm);
    assert_eq!(context.depth_target().texture.format(), DEPTH_FORMAT);
    assert_eq!(context.depth_target().view.extent(), device.surface_extent());

    let linear = SamplerKey::new(AddressMode::Repeat, AddressMode::Repeat, FilterMode::Linear, FilterMode::Linear);
    let shared = context.sampler(&device, linear).unwrap();
    assert!(shared.ptr_eq(context.default_sampler()));

    let nearest = SamplerKey { mag_filter: FilterMode::Nearest, ..linear };
    let other = context.sampler(&device, nearest).unwrap();
    assert!(!other.ptr_eq(&shared));
    assert_eq!(context.sampler_count(), 2);

    context.on_window_resize(&device, Extent2D::new(64, 32)).unwrap();
    assert_eq!(context.depth_target().view.extent(), Extent2D::new(64, 32));
}

#[test]
#[ignore] // Requires GPU
fn test_render_pass_requires_attachment() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window, &Config::default());

    let mut encoder = device.create_command_encoder().unwrap();
    let result = encoder.begin_render_pass(&RenderPassDesc {
        label: None,
        color_attachments: vec![],
        depth_stencil_attachment: None,
    });
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

// ============================================================================
// SCENARIO
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_indexed_quad_frame() {
    let (window, _event_loop) = create_test_window();
    let config = Config { enable_validation: true, ..Config::default() };
    let device = create_device(&window, &config);
    reset_validation_stats();

    let vertices = [
        Vec2::new(-0.5, -0.5),
        Vec2::new(0.5, -0.5),
        Vec2::new(0.5, 0.5),
        Vec2::new(-0.5, 0.5),
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    let vertex_buffer = upload_buffer(&device, BufferUsage::VERTEX, bytemuck::cast_slice(&vertices));
    let index_buffer = upload_buffer(&device, BufferUsage::INDEX, bytemuck::cast_slice(&indices));

    let pipeline = create_quad_pipeline(&device);

    assert_eq!(device.begin_frame().unwrap(), FrameStatus::Ready);
    let view = device.surface_view().unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    {
        let mut pass = encoder
            .begin_render_pass(&RenderPassDesc {
                label: None,
                color_attachments: vec![RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations::clear(Color::new(0.1, 0.1, 0.1, 1.0)),
                }],
                depth_stencil_attachment: None,
            })
            .unwrap();
        // Draw before any pipeline is bound is rejected
        assert!(matches!(pass.draw_indexed(6, 1, 0, 0, 0), Err(Error::InvalidUsage(_))));
        pass.set_pipeline(&pipeline).unwrap();
        pass.set_vertex_buffer(0, &vertex_buffer, 0, None).unwrap();
        pass.set_index_buffer(&index_buffer, IndexFormat::Uint16, 0, None).unwrap();
        pass.draw_indexed(indices.len() as u32, 1, 0, 0, 0).unwrap();
        // Dropped here, ending the pass
    }
    let commands = encoder.finish().unwrap();
    assert!(commands.retained_count() >= 3);
    device.queue().submit(vec![commands]).unwrap();
    drop(view);
    device.end_frame().unwrap();

    let start = Instant::now();
    device.wait_idle().unwrap();
    assert!(start.elapsed() < config.fence_timeout);
    assert_eq!(validation_stats().errors, 0);
}
