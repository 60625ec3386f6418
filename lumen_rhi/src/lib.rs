/*!
# Lumen RHI

Backend-neutral core of the Lumen rendering hardware interface.

This crate holds everything the Vulkan and OpenGL backends share: the error
type, the logging system, device configuration, resource descriptors and the
pure frame/surface/attachment-tracking logic. Backend crates implement the
descriptors against their native API; the `lumen` crate ties them together
behind enum-dispatched handles.

## Architecture

- **Api**: family of handle types a descriptor refers to
- **ResourceMap**: resolves caller-facing handles into backend handles
- **Descriptors**: `BufferDesc`, `TextureDesc`, `RenderPipelineDesc`, ...
- **SwapchainConfig**: format/present mode/image count/extent selection
- **FrameRing** / **FramePhase**: frame-in-flight bookkeeping
- **AttachmentTracker**: cached pass/framebuffer objects keyed by view ids
*/

// Internal modules
mod error;
pub mod config;
pub mod log;
pub mod renderer;

// Main lumen namespace module
pub mod lumen {
    // Error types
    pub use crate::error::{Error, Result};

    // Configuration
    pub use crate::config::{
        Config, DebugSeverity, ValidationLevel, ValidationStats,
        record_validation_message, reset_validation_stats, validation_stats,
    };

    // Logging sub-module (types and sink control, NOT macros)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, set_min_severity,
        };
    }

    // Render sub-module with all descriptor types
    pub mod render {
        pub use crate::renderer::*;
    }
}
