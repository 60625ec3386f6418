//! Unit tests for gl_frame.rs
//!
//! The clock is driven with plain view ids, so no context is needed.

use super::*;
use lumen_rhi::lumen::render::{AttachmentTracker, ViewId};
use lumen_rhi::lumen::Error;
use std::cell::Cell;

fn clock(width: u32, height: u32) -> FrameClock<ViewId> {
    FrameClock::new(2, Extent2D::new(width, height), ViewId::next())
}

// ============================================================================
// FRAME TESTS
// ============================================================================

#[test]
fn test_recorded_frames_advance_the_ring() {
    let mut clock = clock(320, 240);
    let swaps = Cell::new(0);

    for expected in [1, 0, 1] {
        assert_eq!(clock.begin().unwrap(), FrameStatus::Ready);
        assert!(clock.frame_surface().is_some());
        clock.end(|| {
            swaps.set(swaps.get() + 1);
            Ok(())
        })
        .unwrap();
        assert_eq!(clock.frame_index(), expected);
    }
    assert_eq!(swaps.get(), 3);
    assert_eq!(clock.serial(), 3);
}

#[test]
fn test_begin_twice_and_end_without_begin_rejected() {
    let mut clock = clock(320, 240);
    clock.begin().unwrap();
    assert!(matches!(clock.begin(), Err(Error::InvalidUsage(_))));
    clock.end(|| Ok(())).unwrap();
    assert!(matches!(clock.end(|| Ok(())), Err(Error::InvalidUsage(_))));
}

#[test]
fn test_failed_swap_keeps_ring_slot() {
    let mut clock = clock(320, 240);
    clock.begin().unwrap();
    let result = clock.end(|| Err(Error::BackendError("lost".to_string())));
    assert!(matches!(result, Err(Error::BackendError(_))));
    assert_eq!(clock.frame_index(), 0);
    // The frame is closed either way
    assert_eq!(clock.begin().unwrap(), FrameStatus::Ready);
}

#[test]
fn test_degenerate_surface_skips_without_swapping() {
    let mut clock = clock(320, 240);
    assert!(clock.resize(Extent2D::new(0, 240), |_| ViewId::next()).unwrap().is_none());
    assert!(clock.is_degenerate());

    for _ in 0..3 {
        assert_eq!(clock.begin().unwrap(), FrameStatus::Skipped);
        assert!(clock.frame_surface().is_none());
        assert!(!clock.is_recording());
        clock.end(|| panic!("skipped frames are not presented")).unwrap();
    }
    assert_eq!(clock.frame_index(), 0);
    assert_eq!(clock.serial(), 0);

    assert!(clock.resize(Extent2D::new(320, 240), |_| ViewId::next()).unwrap().is_some());
    assert_eq!(clock.begin().unwrap(), FrameStatus::Ready);
}

#[test]
fn test_zero_area_device_starts_degenerate() {
    let mut clock = clock(0, 0);
    assert!(clock.is_degenerate());
    assert_eq!(clock.begin().unwrap(), FrameStatus::Skipped);
}

// ============================================================================
// RESIZE TESTS
// ============================================================================

#[test]
fn test_resize_inside_frame_rejected() {
    let mut clock = clock(320, 240);
    clock.begin().unwrap();
    let before = *clock.surface();
    assert!(matches!(
        clock.resize(Extent2D::new(100, 100), |_| ViewId::next()),
        Err(Error::InvalidUsage(_))
    ));
    assert_eq!(*clock.surface(), before);
    assert_eq!(clock.extent(), Extent2D::new(320, 240));
}

#[test]
fn test_resize_sweep_leaves_no_old_surface_view() {
    let mut clock = clock(320, 240);
    let offscreen = ViewId::next();
    let mut framebuffers: AttachmentTracker<&str, u32> = AttachmentTracker::new();
    framebuffers.insert("surface", vec![*clock.surface()], 0);
    framebuffers.insert("surface+depth", vec![*clock.surface(), offscreen], 1);
    framebuffers.insert("offscreen", vec![offscreen], 2);

    let sizes = Cell::new(Extent2D::default());
    let old = clock
        .resize(Extent2D::new(200, 150), |size| {
            sizes.set(size);
            ViewId::next()
        })
        .unwrap()
        .unwrap();
    assert_eq!(sizes.get(), Extent2D::new(200, 150));
    assert_ne!(*clock.surface(), old);

    let mut swept = framebuffers.sweep(&[old]);
    swept.sort();
    assert_eq!(swept, vec![0, 1]);
    let tracked = framebuffers.tracked_views();
    assert!(!tracked.contains(&old));
    assert!(tracked.contains(&offscreen));
    assert_eq!(clock.extent(), Extent2D::new(200, 150));
}
