// Bootstrap error taxonomy
//
// Every stage of the bootstrap chain fails with its own variant so the
// orchestrator can report exactly where the chain stopped.

use ash::vk;
use std::ffi::CString;
use std::path::PathBuf;
use thiserror::Error;

/// A capability the driver or device does not offer.
#[derive(Debug, Error)]
pub enum CapabilityQueryError {
    #[error("extension {} is not supported", .0.to_string_lossy())]
    MissingExtension(CString),

    #[error("layer {} is not supported", .0.to_string_lossy())]
    MissingLayer(CString),

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("surface reports no supported present modes")]
    NoPresentModes,

    #[error("capability query rejected by the driver: {0}")]
    Driver(#[from] vk::Result),
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("capability check failed: {0}")]
    CapabilityQuery(#[from] CapabilityQueryError),

    #[error("failed to create Vulkan instance: {0}")]
    InstanceCreation(vk::Result),

    #[error("window handle unavailable: {0}")]
    WindowHandle(String),

    #[error("failed to create window surface: {0}")]
    SurfaceCreation(vk::Result),

    #[error("no Vulkan-capable physical device found")]
    NoDevice,

    #[error("none of the {candidates} physical device(s) is suitable")]
    DeviceUnsuitable { candidates: usize },

    #[error("failed to create logical device: {0}")]
    LogicalDeviceCreation(vk::Result),

    #[error("failed to create swapchain: {0}")]
    SwapchainCreation(vk::Result),

    #[error("failed to create swapchain image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("failed to read shader {}: {source}", .path.display())]
    ShaderFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create render pass: {0}")]
    RenderPass(vk::Result),

    #[error("failed to create pipeline layout: {0}")]
    PipelineLayout(vk::Result),

    #[error("failed to create graphics pipeline: {0}")]
    GraphicsPipeline(vk::Result),

    #[error("failed to create framebuffer: {0}")]
    FramebufferCreation(vk::Result),

    #[error("failed to create command pool: {0}")]
    CommandPool(vk::Result),

    #[error("failed to allocate command buffers: {0}")]
    CommandBufferAllocation(vk::Result),

    #[error("failed to record command buffer: {0}")]
    CommandRecording(vk::Result),

    #[error("failed to create frame synchronization objects: {0}")]
    SyncObjectCreation(vk::Result),

    #[error("waiting for the device to go idle failed: {0}")]
    DeviceWait(vk::Result),
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_extension_message_names_the_extension() {
        let err = BootstrapError::from(CapabilityQueryError::MissingExtension(
            CString::new("VK_KHR_surface").unwrap(),
        ));
        assert_eq!(
            err.to_string(),
            "capability check failed: extension VK_KHR_surface is not supported"
        );
    }

    #[test]
    fn shader_error_names_the_path() {
        let err = BootstrapError::ShaderFile {
            path: PathBuf::from("shaders/vertex.spv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("shaders/vertex.spv"));
    }
}
