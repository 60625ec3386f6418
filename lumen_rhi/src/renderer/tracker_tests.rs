//! Unit tests for tracker.rs
//!
//! The tracker is what guarantees no cached pass or framebuffer outlives the
//! swapchain views it was built from.

use crate::renderer::{AttachmentTracker, ViewId};

fn swapchain_views(count: usize) -> Vec<ViewId> {
    (0..count).map(|_| ViewId::next()).collect()
}

// ============================================================================
// CACHE BEHAVIOR
// ============================================================================

#[test]
fn test_insert_and_get() {
    let mut tracker: AttachmentTracker<&str, u32> = AttachmentTracker::new();
    let views = swapchain_views(1);
    assert!(tracker.insert("pass", views, 7).is_none());
    assert_eq!(tracker.get(&"pass"), Some(&7));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_insert_same_key_replaces() {
    let mut tracker: AttachmentTracker<&str, u32> = AttachmentTracker::new();
    tracker.insert("pass", swapchain_views(1), 1);
    assert_eq!(tracker.insert("pass", swapchain_views(1), 2), Some(1));
    assert_eq!(tracker.get(&"pass"), Some(&2));
    assert_eq!(tracker.len(), 1);
}

#[test]
fn test_remove() {
    let mut tracker: AttachmentTracker<u8, u8> = AttachmentTracker::new();
    tracker.insert(1, swapchain_views(1), 10);
    assert_eq!(tracker.remove(&1), Some(10));
    assert!(tracker.get(&1).is_none());
    assert!(tracker.is_empty());
}

// ============================================================================
// SWEEP BEHAVIOR
// ============================================================================

#[test]
fn test_sweep_removes_only_dependents() {
    let old = swapchain_views(3);
    let offscreen = ViewId::next();

    let mut tracker: AttachmentTracker<u32, &str> = AttachmentTracker::new();
    // Render pass built for the surface depends on every surface view
    tracker.insert(0, old.clone(), "surface pass");
    tracker.insert(1, vec![old[1]], "framebuffer 1");
    tracker.insert(2, vec![offscreen], "offscreen framebuffer");

    let mut removed = tracker.sweep(&old);
    removed.sort();
    assert_eq!(removed, vec!["framebuffer 1", "surface pass"]);
    assert_eq!(tracker.len(), 1);
    assert_eq!(tracker.get(&2), Some(&"offscreen framebuffer"));
}

#[test]
fn test_no_stale_view_after_sweep() {
    let old = swapchain_views(2);
    let new = swapchain_views(2);
    let depth = ViewId::next();

    let mut tracker: AttachmentTracker<u32, ()> = AttachmentTracker::new();
    tracker.insert(0, vec![old[0], depth], ());
    tracker.insert(1, vec![old[1], depth], ());
    tracker.sweep(&old);
    tracker.insert(2, vec![new[0], depth], ());

    let tracked = tracker.tracked_views();
    assert!(old.iter().all(|view| !tracked.contains(view)));
    assert!(tracked.contains(&new[0]));
    assert!(tracked.contains(&depth));
}

#[test]
fn test_swept_key_can_be_reinserted() {
    let old = swapchain_views(1);
    let mut tracker: AttachmentTracker<u32, u32> = AttachmentTracker::new();
    tracker.insert(5, old.clone(), 1);
    tracker.sweep(&old);
    assert!(tracker.get(&5).is_none());
    assert!(tracker.insert(5, swapchain_views(1), 2).is_none());
}

#[test]
fn test_drain_empties_tracker() {
    let mut tracker: AttachmentTracker<u32, u32> = AttachmentTracker::new();
    tracker.insert(0, swapchain_views(1), 1);
    tracker.insert(1, swapchain_views(1), 2);
    let mut drained = tracker.drain();
    drained.sort();
    assert_eq!(drained, vec![1, 2]);
    assert!(tracker.is_empty());
    assert!(tracker.tracked_views().is_empty());
}
