// Per-frame GPU resources
//
// One framebuffer and one primary command buffer per swapchain image,
// a command pool on the graphics family, and FrameSync per frame in flight.

use ash::vk;

use super::error::{BootstrapError, BootstrapResult};
use super::swapchain::SwapchainImage;
use super::sync::FrameSync;

#[derive(Debug, Default)]
pub struct FrameResources {
    pub framebuffers: Vec<vk::Framebuffer>,
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub frame_sync: Vec<FrameSync>,
}

impl FrameResources {
    pub fn new(
        device: &ash::Device,
        images: &[SwapchainImage],
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        graphics_family: u32,
        frames_in_flight: usize,
    ) -> BootstrapResult<Self> {
        let mut frames = Self::default();
        let built = frames.build(
            device,
            images,
            render_pass,
            extent,
            graphics_family,
            frames_in_flight,
        );

        if let Err(e) = built {
            frames.destroy(device);
            return Err(e);
        }

        log::info!(
            "Frame resources ready: {} framebuffers, {} frames in flight",
            frames.framebuffers.len(),
            frames.frame_sync.len()
        );
        Ok(frames)
    }

    fn build(
        &mut self,
        device: &ash::Device,
        images: &[SwapchainImage],
        render_pass: vk::RenderPass,
        extent: vk::Extent2D,
        graphics_family: u32,
        frames_in_flight: usize,
    ) -> BootstrapResult<()> {
        for image in images {
            let attachments = &[image.view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }
                .map_err(BootstrapError::FramebufferCreation)?;
            self.framebuffers.push(framebuffer);
        }

        let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(graphics_family);
        self.command_pool = unsafe { device.create_command_pool(&pool_info, None) }
            .map_err(BootstrapError::CommandPool)?;

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(self.framebuffers.len() as u32);
        self.command_buffers = unsafe { device.allocate_command_buffers(&alloc_info) }
            .map_err(BootstrapError::CommandBufferAllocation)?;

        record_command_buffers(device, &self.command_buffers)?;

        for _ in 0..frames_in_flight {
            self.frame_sync.push(FrameSync::new(device)?);
        }

        Ok(())
    }

    /// Reverse of creation. Command buffers go back with their pool.
    pub fn destroy(&mut self, device: &ash::Device) {
        for sync in &mut self.frame_sync {
            sync.destroy(device);
        }
        self.frame_sync.clear();

        unsafe {
            self.command_buffers.clear();
            if self.command_pool != vk::CommandPool::null() {
                device.destroy_command_pool(self.command_pool, None);
                self.command_pool = vk::CommandPool::null();
            }

            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
        }
    }
}

/// Begin/end scaffolding; no commands are recorded in between yet.
fn record_command_buffers(
    device: &ash::Device,
    command_buffers: &[vk::CommandBuffer],
) -> BootstrapResult<()> {
    let begin_info =
        vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

    for &command_buffer in command_buffers {
        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(BootstrapError::CommandRecording)?;
            device
                .end_command_buffer(command_buffer)
                .map_err(BootstrapError::CommandRecording)?;
        }
    }

    Ok(())
}
