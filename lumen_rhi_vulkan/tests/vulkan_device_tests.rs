//! Integration tests for the Vulkan Device
//!
//! All tests require a GPU and are marked with #[ignore].
//!
//! Run with: cargo test -p lumen_rhi_vulkan --test vulkan_device_tests -- --ignored

use lumen_rhi::lumen::render::{
    BufferDesc, BufferUsage, Color, Extent2D, Extent3D, FrameStatus, ImageCopyBuffer,
    ImageCopyTexture, ImageDataLayout, Operations, Origin3D, RenderPassColorAttachment,
    RenderPassDesc, ShaderModuleDesc, ShaderStage, TextureDesc, TextureFormat, TextureUsage,
    TextureViewDesc,
};
use lumen_rhi::lumen::{Config, Error};
use lumen_rhi_vulkan::{Device, VulkanApi};
use winit::event_loop::EventLoop;
use winit::window::Window;

/// Helper to create a hidden test window
#[allow(deprecated)]
fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = EventLoop::new().unwrap();
    let window_attrs = Window::default_attributes()
        .with_title("Lumen Vulkan Device Test")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .with_visible(false);
    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}

fn create_device(window: &Window) -> Device {
    let size = window.inner_size();
    Device::new(window, Extent2D::new(size.width, size.height), Config::default()).unwrap()
}

/// Run one frame that clears the surface
fn clear_frame(device: &Device) -> FrameStatus {
    let status = device.begin_frame().unwrap();
    if status == FrameStatus::Ready {
        let view = device.surface_view().unwrap();
        let mut encoder = device.create_command_encoder().unwrap();
        encoder
            .begin_render_pass(&RenderPassDesc::<VulkanApi> {
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
fn test_vulkan_empty_frame_advances_index() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    assert_eq!(device.frame_index(), 0);
    assert_eq!(device.begin_frame().unwrap(), FrameStatus::Ready);
    device.end_frame().unwrap();
    assert_eq!(device.frame_index(), 1 % device.image_count());
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_frame_index_wraps() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let count = device.image_count();
    assert!(count >= 2);
    let start = device.frame_index();
    for _ in 0..count {
        assert_eq!(clear_frame(&device), FrameStatus::Ready);
    }
    assert_eq!(device.frame_index(), start);
    assert!(device.in_flight_command_buffers() > 0);
    device.wait_idle().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_begin_frame_twice_is_invalid() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    device.begin_frame().unwrap();
    assert!(matches!(device.begin_frame(), Err(Error::InvalidUsage(_))));
    device.end_frame().unwrap();
    assert!(matches!(device.end_frame(), Err(Error::InvalidUsage(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_resize_sweeps_surface_attachments() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    clear_frame(&device);
    let old_views = device.surface_views();
    assert!(old_views.iter().any(|view| device.tracked_attachment_views().contains(view)));

    device.on_window_resize(Extent2D::new(200, 150)).unwrap();
    let tracked = device.tracked_attachment_views();
    assert!(old_views.iter().all(|view| !tracked.contains(view)));

    assert_eq!(clear_frame(&device), FrameStatus::Ready);
    assert!(device.surface_views().iter().any(|view| device.tracked_attachment_views().contains(view)));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_degenerate_surface_skips_frames() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    device.on_window_resize(Extent2D::new(0, 0)).unwrap();
    assert!(device.is_degenerate());
    let index = device.frame_index();
    for _ in 0..3 {
        assert_eq!(device.begin_frame().unwrap(), FrameStatus::Skipped);
        assert!(device.surface_view().is_none());
        device.end_frame().unwrap();
    }
    assert_eq!(device.frame_index(), index);

    let size = window.inner_size();
    device.on_window_resize(Extent2D::new(size.width, size.height)).unwrap();
    assert!(!device.is_degenerate());
    assert_eq!(clear_frame(&device), FrameStatus::Ready);
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_resize_inside_frame_is_invalid() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    device.begin_frame().unwrap();
    assert!(matches!(
        device.on_window_resize(Extent2D::new(100, 100)),
        Err(Error::InvalidUsage(_))
    ));
    device.end_frame().unwrap();
}

// ============================================================================
// BUFFER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_mapped_at_creation_exposes_size() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let buffer = device
        .create_buffer(&BufferDesc {
            label: Some("staging".to_string()),
            size: 100,
            usage: BufferUsage::COPY_SRC,
            mapped_at_creation: true,
        })
        .unwrap();
    {
        let mut range = buffer.get_mapped_range().unwrap();
        assert_eq!(range.len(), 100);
        range.fill(0xAB);
    }
    buffer.unmap().unwrap();
    assert!(matches!(buffer.get_mapped_range(), Err(Error::InvalidUsage(_))));
    assert!(matches!(buffer.unmap(), Err(Error::InvalidUsage(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_zero_size_buffer_fails() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let result = device.create_buffer(&BufferDesc {
        size: 0,
        usage: BufferUsage::VERTEX,
        ..Default::default()
    });
    assert!(matches!(result, Err(Error::CreationFailed(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_texture_copy_round_trip() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let (width, height) = (8u32, 4u32);
    let bytes: Vec<u8> = (0..width * height * 4).map(|i| (i % 251) as u8).collect();

    let upload = device
        .create_buffer(&BufferDesc {
            label: None,
            size: bytes.len() as u64,
            usage: BufferUsage::COPY_SRC,
            mapped_at_creation: true,
        })
        .unwrap();
    upload.get_mapped_range().unwrap().copy_from_slice(&bytes);
    upload.unmap().unwrap();

    let texture = device
        .create_texture(&TextureDesc::new_2d(
            width,
            height,
            TextureFormat::Rgba8Unorm,
            TextureUsage::COPY_DST | TextureUsage::COPY_SRC | TextureUsage::TEXTURE_BINDING,
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
            &ImageCopyBuffer::<VulkanApi> { buffer: &upload, layout },
            &ImageCopyTexture { texture: &texture, mip_level: 0, origin: Origin3D::default() },
            size,
        )
        .unwrap();
    encoder
        .copy_texture_to_buffer(
            &ImageCopyTexture::<VulkanApi> { texture: &texture, mip_level: 0, origin: Origin3D::default() },
            &ImageCopyBuffer { buffer: &readback, layout },
            size,
        )
        .unwrap();
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();

    readback.map().unwrap();
    assert_eq!(&*readback.get_mapped_range().unwrap(), bytes.as_slice());
    readback.unmap().unwrap();
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_copy_with_short_rows_fails() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let buffer = device
        .create_buffer(&BufferDesc { size: 256, usage: BufferUsage::COPY_SRC, ..Default::default() })
        .unwrap();
    let texture = device
        .create_texture(&TextureDesc::new_2d(8, 8, TextureFormat::Rgba8Unorm, TextureUsage::COPY_DST))
        .unwrap();
    let mut encoder = device.create_command_encoder().unwrap();
    let result = encoder.copy_buffer_to_texture(
        &ImageCopyBuffer::<VulkanApi> {
            buffer: &buffer,
            layout: ImageDataLayout { offset: 0, bytes_per_row: 16, rows_per_image: None },
        },
        &ImageCopyTexture { texture: &texture, mip_level: 0, origin: Origin3D::default() },
        Extent3D::new(8, 8, 1),
    );
    assert!(matches!(result, Err(Error::InvalidUsage(_))));
}

// ============================================================================
// TEXTURE / SHADER TESTS
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_vulkan_dropped_view_leaves_tracker() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let texture = device
        .create_texture(&TextureDesc::new_2d(
            64,
            64,
            TextureFormat::Rgba8Unorm,
            TextureUsage::RENDER_ATTACHMENT,
        ))
        .unwrap();
    let view = device.create_texture_view(&texture, &TextureViewDesc::default()).unwrap();
    let id = view.id();

    let mut encoder = device.create_command_encoder().unwrap();
    encoder
        .begin_render_pass(&RenderPassDesc::<VulkanApi> {
            label: None,
            color_attachments: vec![RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: Operations::clear(Color::BLACK),
            }],
            depth_stencil_attachment: None,
        })
        .unwrap();
    encoder.end_render_pass().unwrap();
    device.queue().submit(vec![encoder.finish().unwrap()]).unwrap();
    assert!(device.tracked_attachment_views().contains(&id));

    drop(view);
    assert!(!device.tracked_attachment_views().contains(&id));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_zero_extent_texture_fails() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    let result = device.create_texture(&TextureDesc::new_2d(
        0,
        16,
        TextureFormat::Rgba8Unorm,
        TextureUsage::TEXTURE_BINDING,
    ));
    assert!(matches!(result, Err(Error::CreationFailed(_))));
}

#[test]
#[ignore] // Requires GPU
fn test_vulkan_invalid_spirv_fails() {
    let (window, _event_loop) = create_test_window();
    let device = create_device(&window);

    // Magic number and version only
    let code = vec![0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
    let result = device.create_shader_module(&ShaderModuleDesc::new(ShaderStage::Vertex, code));
    assert!(matches!(result, Err(Error::CreationFailed(_))));
}
