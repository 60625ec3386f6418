//! Unit tests for gl_command.rs

use super::*;

// ============================================================================
// COMMAND REPLAY TESTS
// ============================================================================

#[test]
fn test_flip_y_maps_top_left_to_bottom_left() {
    // Full-height rectangle stays put
    assert_eq!(flip_y(600, 0, 600), 0);
    // Top strip of a 600-pixel target starts 500 pixels up
    assert_eq!(flip_y(600, 0, 100), 500);
    assert_eq!(flip_y(600, 500, 100), 0);
}

#[test]
fn test_retained_counts() {
    let command = Command::Draw { vertex_count: 3, instance_count: 1, first_vertex: 0, first_instance: 0 };
    assert_eq!(command.retained(), 0);
    assert_eq!(Command::EndPass.retained(), 0);
}
