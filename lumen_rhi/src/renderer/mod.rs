/// Renderer module - descriptors and backend-neutral logic shared by every backend

// Module declarations
pub mod api;
pub mod format;
pub mod buffer;
pub mod texture;
pub mod sampler;
pub mod shader;
pub mod binding;
pub mod pipeline;
pub mod pass;
pub mod command;
pub mod surface;
pub mod frame;
pub mod tracker;

// Re-exports
pub use api::*;
pub use format::*;
pub use buffer::*;
pub use texture::*;
pub use sampler::*;
pub use shader::*;
pub use binding::*;
pub use pipeline::*;
pub use pass::*;
pub use command::*;
pub use surface::*;
pub use frame::*;
pub use tracker::*;
