//! Error types for the Lumen RHI
//!
//! Every fallible operation of the RHI returns [`Result`]. A zero-area surface
//! is not an error: frame calls report it through `FrameStatus::Skipped`.

use std::fmt;

/// Result type for Lumen RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lumen RHI errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Capability, device, surface or queue enumeration failed (fatal at startup)
    QueryFailed(String),

    /// A descriptor could not be realized as a backend object
    CreationFailed(String),

    /// Out of GPU memory
    OutOfMemory,

    /// A precondition enforced by the layer was violated
    /// (backend mismatch, draw without pipeline, buffer not mapped, ...)
    InvalidUsage(String),

    /// A backend call failed at runtime (submit, present, fence timeout)
    BackendError(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueryFailed(msg) => write!(f, "Query failed: {}", msg),
            Error::CreationFailed(msg) => write!(f, "Creation failed: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidUsage(msg) => write!(f, "Invalid usage: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
