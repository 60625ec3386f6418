//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_query_failed_display() {
    let err = Error::QueryFailed("No present queue family found".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Query failed"));
    assert!(display.contains("No present queue family found"));
}

#[test]
fn test_creation_failed_display() {
    let err = Error::CreationFailed("Unsupported texture format".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Creation failed"));
    assert!(display.contains("Unsupported texture format"));
}

#[test]
fn test_out_of_memory_display() {
    let err = Error::OutOfMemory;
    assert_eq!(format!("{}", err), "Out of GPU memory");
}

#[test]
fn test_invalid_usage_display() {
    let err = Error::InvalidUsage("Draw without pipeline".to_string());
    let display = format!("{}", err);
    assert!(display.starts_with("Invalid usage: "));
    assert!(display.ends_with("Draw without pipeline"));
}

#[test]
fn test_backend_error_display() {
    let err = Error::BackendError("Fence wait timed out".to_string());
    assert_eq!(format!("{}", err), "Backend error: Fence wait timed out");
}

// ============================================================================
// TRAIT TESTS
// ============================================================================

#[test]
fn test_error_clone_keeps_message() {
    let err = Error::CreationFailed("buffer".to_string());
    let cloned = err.clone();
    assert_eq!(format!("{}", err), format!("{}", cloned));
}

#[test]
fn test_error_debug() {
    let err = Error::InvalidUsage("x".to_string());
    assert_eq!(format!("{:?}", err), "InvalidUsage(\"x\")");
}

#[test]
fn test_error_is_std_error() {
    fn takes_std_error(_: &dyn std::error::Error) {}
    takes_std_error(&Error::OutOfMemory);
}

#[test]
fn test_result_question_mark_propagation() {
    fn inner() -> Result<u32> {
        Err(Error::QueryFailed("no device".to_string()))
    }
    fn outer() -> Result<u32> {
        let value = inner()?;
        Ok(value + 1)
    }
    assert!(matches!(outer(), Err(Error::QueryFailed(_))));
}
