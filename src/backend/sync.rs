// Synchronization primitives
//
// Semaphores for GPU-GPU ordering and a fence for GPU-CPU, one set per
// frame in flight. Nothing waits on them until a draw loop exists.

use ash::vk;

use super::error::{BootstrapError, BootstrapResult};

/// Frame synchronization - one per frame in flight
#[derive(Debug, Default)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device) -> BootstrapResult<Self> {
        let mut sync = Self::default();
        if let Err(e) = sync.create_objects(device) {
            sync.destroy(device);
            return Err(BootstrapError::SyncObjectCreation(e));
        }
        Ok(sync)
    }

    fn create_objects(&mut self, device: &ash::Device) -> Result<(), vk::Result> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED); // Start signaled

        unsafe {
            self.image_available = device.create_semaphore(&semaphore_info, None)?;
            self.render_finished = device.create_semaphore(&semaphore_info, None)?;
            self.in_flight_fence = device.create_fence(&fence_info, None)?;
        }
        Ok(())
    }

    /// Null handles are skipped; everything is nulled afterwards.
    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            if self.in_flight_fence != vk::Fence::null() {
                device.destroy_fence(self.in_flight_fence, None);
            }
            if self.render_finished != vk::Semaphore::null() {
                device.destroy_semaphore(self.render_finished, None);
            }
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
        }
        *self = Self::default();
    }
}
