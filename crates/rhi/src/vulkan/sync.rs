//! Timeline semaphore fence.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use super::{VulkanShared, map_device_error};
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// A `VK_SEMAPHORE_TYPE_TIMELINE` semaphore used as a completion counter.
pub struct TimelineFence {
    shared: Arc<VulkanShared>,
    semaphore: vk::Semaphore,
}

impl TimelineFence {
    pub(crate) fn new(shared: Arc<VulkanShared>, initial_value: u64) -> RhiResult<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);

        let semaphore = unsafe { shared.device.create_semaphore(&create_info, None)? };

        debug!("Created timeline semaphore (initial value {})", initial_value);

        Ok(Self { shared, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Fence for TimelineFence {
    fn completed_value(&self) -> RhiResult<u64> {
        unsafe {
            self.shared
                .device
                .get_semaphore_counter_value(self.semaphore)
                .map_err(map_device_error)
        }
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        let timeout_ns = timeout.map_or(u64::MAX, |t| t.as_nanos().min(u64::MAX as u128) as u64);

        match unsafe { self.shared.device.wait_semaphores(&wait_info, timeout_ns) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::FenceTimeout {
                value,
                completed: self.completed_value()?,
                timeout: timeout.unwrap_or(Duration::MAX),
            }),
            Err(e) => Err(map_device_error(e)),
        }
    }
}

impl Drop for TimelineFence {
    fn drop(&mut self) {
        unsafe {
            self.shared.device.destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed timeline semaphore");
    }
}
