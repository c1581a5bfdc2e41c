// Synchronization primitives
//
// One frame in flight: a semaphore pair for GPU-GPU ordering
// (acquire -> draw -> present) and a fence for CPU-GPU ordering.

use ash::vk;
use std::sync::Arc;

use super::GraphicsContext;
use crate::error::{Result, VkResultExt};

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
    context: Arc<GraphicsContext>,
}

impl FrameSync {
    pub fn new(context: &Arc<GraphicsContext>) -> Result<Self> {
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight_fence: vk::Fence::null(),
            context: Arc::clone(context),
        };

        let semaphore_info = vk::SemaphoreCreateInfo::default();
        // Start signaled so the first frame does not wait forever.
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        let device = &context.device;
        sync.image_available =
            unsafe { device.create_semaphore(&semaphore_info, None) }.vk_create("semaphore")?;
        sync.render_finished =
            unsafe { device.create_semaphore(&semaphore_info, None) }.vk_create("semaphore")?;
        sync.in_flight_fence = unsafe { device.create_fence(&fence_info, None) }.vk_create("fence")?;

        Ok(sync)
    }

    /// Block until the previous submission finished, then rearm the fence.
    pub fn wait_and_reset(&self) -> Result<()> {
        let fences = [self.in_flight_fence];
        unsafe {
            self.context
                .device
                .wait_for_fences(&fences, true, u64::MAX)
                .vk_call("vkWaitForFences")?;
            self.context.device.reset_fences(&fences).vk_call("vkResetFences")
        }
    }

    /// Replace the fence and the acquire semaphore after a submission that
    /// never reached the queue.
    ///
    /// The fence was reset for that submission and nothing will signal it,
    /// and the semaphore may still carry the acquire's signal. Both come back
    /// as `new` creates them. Call with the device idle.
    pub fn rearm(&mut self) -> Result<()> {
        let device = &self.context.device;
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
        let fence = unsafe { device.create_fence(&fence_info, None) }.vk_create("fence")?;
        let semaphore = match unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
            .vk_create("semaphore")
        {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.destroy_fence(fence, None) };
                return Err(e);
            }
        };

        unsafe {
            device.destroy_fence(std::mem::replace(&mut self.in_flight_fence, fence), None);
            device.destroy_semaphore(std::mem::replace(&mut self.image_available, semaphore), None);
        }
        log::debug!("Frame sync rearmed after a failed submission");
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        let device = &self.context.device;
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
