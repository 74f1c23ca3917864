// Backend module - Vulkan bootstrap layer
//
// Thin wrappers around ash, one module per bootstrap stage, tied together
// by the lifecycle module.

pub mod device;
pub mod error;
pub mod frame;
pub mod instance;
pub mod lifecycle;
pub mod pipeline;
pub mod probe;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use lifecycle::{Renderer, RendererSettings};
