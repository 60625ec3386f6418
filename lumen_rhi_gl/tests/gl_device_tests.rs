//! Integration tests for the GL Device
//!
//! All tests require a GPU and are marked with #[ignore]. They share one
//! hidden window (winit allows a single event loop per process) and each
//! creates its own context on it.
//!
//! Run with: cargo test -p lumen_rhi_gl --test gl_device_tests -- --ignored

use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version};
use glutin::display::{Display, DisplayApiPreference};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, WindowSurface};
use lumen_rhi::lumen::render::{
    BufferDesc, BufferUsage, Color, ColorTargetState, ColorWrites, Extent2D, Extent3D, FrameStatus,
    ImageCopyBuffer, ImageCopyTexture, ImageDataLayout, IndexFormat, Operations, Origin3D,
    PipelineLayoutDesc, PrimitiveState, RenderPassColorAttachment, RenderPassDesc, RenderPipelineDesc,
    ShaderModuleDesc, ShaderStage, TextureDesc, TextureFormat, TextureUsage, TextureViewDesc,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexState, VertexStepMode, FragmentState,
};
use lumen_rhi::lumen::{Config, Error, Result};
use lumen_rhi_gl::{Buffer, Device, GlApi};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use serial_test::serial;
use std::num::NonZeroU32;
use std::sync::{Arc, OnceLock};
use winit::event_loop::EventLoop;
use winit::window::Window;

#[cfg(target_os = "linux")]
use winit::platform::x11::EventLoopBuilderExtX11;
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

/// Hidden window kept for the whole test run; its event loop is leaked
static TEST_WINDOW: OnceLock<Window> = OnceLock::new();

#[allow(deprecated)]
fn test_window() -> &'static Window {
    TEST_WINDOW.get_or_init(|| {
        // Tests run off the main thread
        let mut builder = EventLoop::builder();
        #[cfg(target_os = "linux")]
        EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
        #[cfg(target_os = "windows")]
        EventLoopBuilderExtWindows::with_any_thread(&mut builder, true);
        let event_loop = builder.build().unwrap();

        let window_attrs = Window::default_attributes()
            .with_title("Lumen GL Device Test")
            .with_inner_size(winit::dpi::PhysicalSize::new(WIDTH, HEIGHT))
            .with_visible(false);
        let window = event_loop.create_window(window_attrs).unwrap();
        std::mem::forget(event_loop);
        window
    })
}

/// Window side of the test context
struct TestSurface {
    context: PossiblyCurrentContext,
    surface: Surface<WindowSurface>,
}

impl lumen_rhi_gl::GlSurface for TestSurface {
    fn swap_buffers(&self) -> Result<()> {
        self.surface
            .swap_buffers(&self.context)
            .map_err(|e| Error::BackendError(e.to_string()))
    }

    fn resize(&self, size: Extent2D) {
        if let (Some(width), Some(height)) = (NonZeroU32::new(size.width), NonZeroU32::new(size.height)) {
            self.surface.resize(&self.context, width, height);
        }
    }
}

/// Make a fresh GL 4.3 core context current on this thread and wrap it
fn create_device() -> Device {
    let window = test_window();
    let raw_display = window.display_handle().unwrap().as_raw();
    let raw_window = window.window_handle().unwrap().as_raw();

    #[cfg(target_os = "windows")]
    let preference = DisplayApiPreference::WglThenEgl(Some(raw_window));
    #[cfg(target_os = "macos")]
    let preference = DisplayApiPreference::Cgl;
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let preference = DisplayApiPreference::Egl;

    let display = unsafe { Display::new(raw_display, preference).unwrap() };
    let template = ConfigTemplateBuilder::new()
        .compatible_with_native_window(raw_window)
        .build();
    let config = unsafe { display.find_configs(template).unwrap() }
        .max_by_key(|config| config.num_samples() == 0)
        .unwrap();

    let context_attributes = ContextAttributesBuilder::new()
        .with_profile(GlProfile::Core)
        .with_context_api(ContextApi::OpenGl(Some(Version::new(4, 3))))
        .build(Some(raw_window));
    let not_current = unsafe { display.create_context(&config, &context_attributes).unwrap() };
    let surface_attributes = SurfaceAttributesBuilder::<WindowSurface>::new().build(
        raw_window,
        NonZeroU32::new(WIDTH).unwrap(),
        NonZeroU32::new(HEIGHT).unwrap(),
    );
    let surface = unsafe { display.create_window_surface(&config, &surface_attributes).unwrap() };
    let context = not_current.make_current(&surface).unwrap();

    let gl = unsafe { glow::Context::from_loader_function_cstr(|symbol| display.get_proc_address(symbol)) };
    Device::new(
        gl,
        Box::new(TestSurface { context, surface }),
        Extent2D::new(WIDTH, HEIGHT),
        Config::default(),
    )
    .unwrap()
}

fn upload_buffer(device: &Device, usage: BufferUsage, bytes: &[u8]) -> Arc<Buffer> {
    let buffer = device
        .create_buffer(&BufferDesc { label: None, size: bytes.len() as u64, usage, mapped_at_creation: true })
        .unwrap();
    buffer.get_mapped_range().unwrap().copy_from_slice(bytes);
    buffer.unmap().unwrap();
    buffer
}

/// Run one frame that clears the default framebuffer
fn clear_frame(device: &Device) -> FrameStatus {
    let status = device.begin_frame().unwrap();
    if let Some(view) = device.surface_view() {
        let mut encoder = device.create_command_encoder().unwrap();
        encoder
            .begin_render_pass(&RenderPassDesc::<GlApi> {
                label: None,
                color_attachments: vec![RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations::clear(Color::new(0.1, 0.2, 0.3, 1.0)),
                }],
                depth_stencil_attachment: None,
            })
            .unwrap();
        encoder.end_render_pass().unwrap();
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
#[serial]
fn test_gl_frames_advance_ring() {
    let device = create_device();

    assert_eq!(device.image_count(), 2);
    assert_eq!(device.frame_index(), 0);
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
    assert_eq!(device.frame_index(), 1);
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
    assert_eq!(device.frame_index(), 0);

    device.begin_frame().unwrap();
    assert!(matches!(device.begin_frame(), Err(Error::InvalidUsage(_))));
    device.end_frame().unwrap();
    assert!(matches!(device.end_frame(), Err(Error::InvalidUsage(_))));
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_gl_degenerate_surface_skips_frames() {
    let device = create_device();

    device.on_window_resize(Extent2D::new(0, 0)).unwrap();
    assert!(device.is_degenerate());
    for _ in 0..3 {
        assert_eq!(device.begin_frame().unwrap(), FrameStatus::Skipped);
        assert!(device.surface_view().is_none());
        device.end_frame().unwrap();
    }
    assert_eq!(device.frame_index(), 0);

    device.on_window_resize(Extent2D::new(WIDTH, HEIGHT)).unwrap();
    assert!(!device.is_degenerate());
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
}

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_gl_resize_sweeps_old_surface_view() {
    let device = create_device();

    assert_eq!(clear_frame(&device), FrameStatus::Ready);
    let texture = device
        .create_texture(&TextureDesc::new_2d(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_ATTACHMENT))
        .unwrap();
    let offscreen = device.create_texture_view(&texture, &TextureViewDesc::default()).unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    encoder
        .begin_render_pass(&RenderPassDesc::<GlApi> {
            label: None,
            color_attachments: vec![RenderPassColorAttachment {
                view: &offscreen,
                resolve_target: None,
                ops: Operations::clear(Color::BLACK),
            }],
            depth_stencil_attachment: None,
        })
        .unwrap();
    encoder.end_render_pass().unwrap();
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();
    assert!(device.tracked_attachment_views().contains(&offscreen.id()));

    // The default framebuffer cannot share a pass with a texture
    device.begin_frame().unwrap();
    let surface = device.surface_view().unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    let mixed = encoder.begin_render_pass(&RenderPassDesc::<GlApi> {
        label: None,
        color_attachments: vec![
            RenderPassColorAttachment { view: &surface, resolve_target: None, ops: Operations::load() },
            RenderPassColorAttachment { view: &offscreen, resolve_target: None, ops: Operations::load() },
        ],
        depth_stencil_attachment: None,
    });
    assert!(matches!(mixed, Err(Error::InvalidUsage(_))));
    drop(encoder);
    drop(surface);
    device.end_frame().unwrap();

    let old = device.surface_views();
    assert_eq!(old.len(), 1);
    device.on_window_resize(Extent2D::new(200, 150)).unwrap();

    let current = device.surface_views();
    assert_ne!(current, old);
    let tracked = device.tracked_attachment_views();
    assert!(!tracked.contains(&old[0]));
    assert!(tracked.contains(&offscreen.id()));
    assert_eq!(device.surface_extent(), Extent2D::new(200, 150));
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_gl_buffer_copy_round_trip() {
    let device = create_device();

    let bytes: Vec<u8> = (0..64u8).collect();
    let source = upload_buffer(&device, BufferUsage::COPY_SRC, &bytes);
    let readback = device
        .create_buffer(&BufferDesc {
            label: None,
            size: 64,
            usage: BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            mapped_at_creation: false,
        })
        .unwrap();

    let mut encoder = device.create_command_encoder().unwrap();
    encoder.copy_buffer_to_buffer(&source, 16, &readback, 0, 48).unwrap();
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();

    readback.map().unwrap();
    assert_eq!(&readback.get_mapped_range().unwrap()[..48], &bytes[16..]);
    readback.unmap().unwrap();
    assert!(matches!(readback.get_mapped_range(), Err(Error::InvalidUsage(_))));
}

// ============================================================================
// DRAW TESTS
// ============================================================================

const QUAD_VERTEX: &str = "#version 430 core
layout(location = 0) in vec2 position;
void main() {
    gl_Position = vec4(position, 0.0, 1.0);
}
";

const QUAD_FRAGMENT: &str = "#version 430 core
layout(location = 0) out vec4 out_color;
void main() {
    out_color = vec4(1.0, 0.0, 0.0, 1.0);
}
";

#[test]
#[ignore] // Requires GPU
#[serial]
fn test_gl_indexed_quad_replays_into_texture() {
    let device = create_device();
    let size = 16u32;

    let vertices: [f32; 8] = [-0.5, -0.5, 0.5, -0.5, 0.5, 0.5, -0.5, 0.5];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    let vertex_bytes: Vec<u8> = vertices.iter().flat_map(|v| v.to_ne_bytes()).collect();
    let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_ne_bytes()).collect();
    let vertex_buffer = upload_buffer(&device, BufferUsage::VERTEX, &vertex_bytes);
    let index_buffer = upload_buffer(&device, BufferUsage::INDEX, &index_bytes);

    let vertex_shader = device
        .create_shader_module(&ShaderModuleDesc::new(ShaderStage::Vertex, QUAD_VERTEX.as_bytes().to_vec()))
        .unwrap();
    let fragment_shader = device
        .create_shader_module(&ShaderModuleDesc::new(ShaderStage::Fragment, QUAD_FRAGMENT.as_bytes().to_vec()))
        .unwrap();
    let layout = device
        .create_pipeline_layout(&PipelineLayoutDesc { label: None, bind_group_layouts: vec![], push_constant_ranges: vec![] })
        .unwrap();
    let pipeline = device
        .create_render_pipeline(&RenderPipelineDesc {
            label: Some("quad".to_string()),
            layout: &layout,
            vertex: VertexState {
                module: &vertex_shader,
                buffers: vec![VertexBufferLayout {
                    array_stride: 8,
                    step_mode: VertexStepMode::Vertex,
                    attributes: vec![VertexAttribute { format: VertexFormat::Float32x2, offset: 0, shader_location: 0 }],
                }],
            },
            fragment: Some(FragmentState {
                module: &fragment_shader,
                targets: vec![ColorTargetState {
                    format: TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                }],
            }),
            primitive: PrimitiveState::default(),
            depth_stencil: None,
            sample_count: 1,
        })
        .unwrap();

    let target = device
        .create_texture(&TextureDesc::new_2d(
            size,
            size,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::COPY_SRC,
        ))
        .unwrap();
    let view = device.create_texture_view(&target, &TextureViewDesc::default()).unwrap();
    let readback = device
        .create_buffer(&BufferDesc {
            label: None,
            size: u64::from(size * size * 4),
            usage: BufferUsage::COPY_DST | BufferUsage::MAP_READ,
            mapped_at_creation: false,
        })
        .unwrap();

    let mut encoder = device.create_command_encoder().unwrap();
    encoder
        .begin_render_pass(&RenderPassDesc::<GlApi> {
            label: None,
            color_attachments: vec![RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: Operations::clear(Color::BLACK),
            }],
            depth_stencil_attachment: None,
        })
        .unwrap();
    // Draw before any pipeline is bound is rejected
    assert!(matches!(encoder.draw_indexed(6, 1, 0, 0, 0), Err(Error::InvalidUsage(_))));
    encoder.set_pipeline(&pipeline).unwrap();
    encoder.set_vertex_buffer(0, &vertex_buffer, 0, None).unwrap();
    encoder.set_index_buffer(&index_buffer, IndexFormat::Uint16, 0, None).unwrap();
    encoder.draw_indexed(indices.len() as u32, 1, 0, 0, 0).unwrap();
    encoder.end_render_pass().unwrap();
    encoder
        .copy_texture_to_buffer(
            &ImageCopyTexture::<GlApi> { texture: &target, mip_level: 0, origin: Origin3D::default() },
            &ImageCopyBuffer {
                buffer: &readback,
                layout: ImageDataLayout { offset: 0, bytes_per_row: size * 4, rows_per_image: None },
            },
            Extent3D::new(size, size, 1),
        )
        .unwrap();
    let commands = encoder.finish().unwrap();
    assert!(commands.retained_count() >= 3);
    device.queue().submit(vec![commands]).unwrap();

    readback.map().unwrap();
    let pixels = readback.get_mapped_range().unwrap();
    let pixel = |x: u32, y: u32| {
        let at = ((y * size + x) * 4) as usize;
        [pixels[at], pixels[at + 1], pixels[at + 2], pixels[at + 3]]
    };
    // The quad covers the middle half of the target
    assert_eq!(pixel(size / 2, size / 2), [255, 0, 0, 255]);
    assert_eq!(pixel(0, 0), [0, 0, 0, 255]);
    assert_eq!(pixel(size - 1, size - 1), [0, 0, 0, 255]);
}
