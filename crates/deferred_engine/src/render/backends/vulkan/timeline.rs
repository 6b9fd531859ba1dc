//! Timeline semaphore fence

use ash::vk;

use crate::render::api::GpuFence;
use crate::render::error::{RenderError, RenderResult};

fn api_error(what: &str, result: vk::Result) -> RenderError {
    RenderError::BackendError(format!("{what}: {result:?}"))
}

/// [`GpuFence`] backed by a Vulkan 1.2 timeline semaphore
///
/// `signal` submits an empty batch that signals the value, so it completes
/// after everything submitted to the queue before it.
pub struct VulkanTimelineFence {
    device: ash::Device,
    queue: vk::Queue,
    semaphore: vk::Semaphore,
}

impl VulkanTimelineFence {
    /// Create the semaphore at value 0
    pub fn new(device: ash::Device, queue: vk::Queue) -> RenderResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_info);
        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(|e| api_error("create timeline semaphore", e))?
        };
        log::debug!("Created frame timeline semaphore");
        Ok(Self {
            device,
            queue,
            semaphore,
        })
    }

    /// Semaphore handle, for waits in other submissions
    pub fn semaphore(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl GpuFence for VulkanTimelineFence {
    fn completed_value(&self) -> RenderResult<u64> {
        unsafe {
            self.device
                .get_semaphore_counter_value(self.semaphore)
                .map_err(|e| api_error("query timeline value", e))
        }
    }

    fn signal(&mut self, value: u64) -> RenderResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::builder().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::builder()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info)
            .build();
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], vk::Fence::null())
                .map_err(|e| api_error("signal timeline semaphore", e))
        }
    }

    fn wait_for_value(&mut self, value: u64) -> RenderResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::builder()
            .semaphores(&semaphores)
            .values(&values);
        unsafe {
            self.device
                .wait_semaphores(&wait_info, u64::MAX)
                .map_err(|e| api_error("wait on timeline semaphore", e))
        }
    }
}

impl Drop for VulkanTimelineFence {
    fn drop(&mut self) {
        unsafe {
            // The semaphore may still be pending on the queue
            let _ = self.device.queue_wait_idle(self.queue);
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}
