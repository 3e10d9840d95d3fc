//! Vulkan backend.
//!
//! [`VulkanDevice`] wraps a logical device created by the application and
//! implements [`Device`] on one graphics queue:
//! - buffers are host-visible (`CpuToGpu`) gpu-allocator allocations, bound to
//!   shaders by device address
//! - each command context owns a transient command pool with one primary
//!   command buffer, reset as a whole at the start of every reuse
//! - the fence is a timeline semaphore, signaled by an empty queue submission
//!
//! Draws pass the three bound buffer addresses as a 24-byte push constant
//! block (`Pass`, `Materials`, `Instances` in that order), visible to vertex
//! and fragment stages. The pipeline layout supplied at construction must
//! declare that range, and the device must have `bufferDeviceAddress` and
//! `timelineSemaphore` enabled.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use cullframe_rhi::vulkan::VulkanDevice;
//!
//! # fn example(
//! #     instance: &ash::Instance,
//! #     device: ash::Device,
//! #     physical_device: vk::PhysicalDevice,
//! #     layout: vk::PipelineLayout,
//! # ) -> Result<(), cullframe_rhi::RhiError> {
//! let graphics_family = 0;
//! let device = VulkanDevice::new(instance, device, physical_device, graphics_family, layout)?;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod command;
mod sync;

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use tracing::{debug, info};

pub use buffer::VulkanBuffer;
pub use command::VulkanCommandContext;
pub use sync::TimelineFence;

use crate::buffer::BufferUsage;
use crate::command::{CommandContext, CommandState};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Size of the push constant block holding the bound buffer addresses.
pub const BINDING_PUSH_CONSTANT_SIZE: u32 = 24;

/// Device state shared by every resource created from it.
pub(crate) struct VulkanShared {
    pub(crate) device: ash::Device,
    /// GPU memory allocator. Dropped before the device handle is released.
    pub(crate) allocator: Mutex<Option<Allocator>>,
    /// Queue submissions must be externally synchronized.
    pub(crate) queue: Mutex<vk::Queue>,
    pub(crate) queue_family_index: u32,
    pub(crate) pipeline_layout: vk::PipelineLayout,
}

/// A Vulkan logical device used through the [`Device`] verbs.
///
/// Does not take ownership of the `ash::Device`: the application destroys it
/// after dropping this wrapper and everything created from it.
pub struct VulkanDevice {
    shared: Arc<VulkanShared>,
}

impl VulkanDevice {
    /// Wraps a logical device.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance the device was created from
    /// * `device` - The logical device
    /// * `physical_device` - The adapter backing `device`
    /// * `queue_family_index` - Graphics queue family; queue 0 is used
    /// * `pipeline_layout` - Layout with the buffer address push constant range
    ///
    /// # Errors
    ///
    /// Returns an error if allocator initialization fails.
    pub fn new(
        instance: &ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        queue_family_index: u32,
        pipeline_layout: vk::PipelineLayout,
    ) -> RhiResult<Self> {
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };
        debug!("Graphics queue retrieved from family {}", queue_family_index);

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        info!("GPU memory allocator initialized");

        Ok(Self {
            shared: Arc::new(VulkanShared {
                device,
                allocator: Mutex::new(Some(allocator)),
                queue: Mutex::new(queue),
                queue_family_index,
                pipeline_layout,
            }),
        })
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.shared.device
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.shared.device.device_wait_idle()? };
        Ok(())
    }

    fn queue_submit(&self, submit: vk::SubmitInfo<'_>) -> RhiResult<()> {
        let queue = self.shared.queue.lock();
        unsafe {
            self.shared
                .device
                .queue_submit(*queue, &[submit], vk::Fence::null())
                .map_err(map_device_error)?;
        }
        Ok(())
    }
}

/// Convert device-loss results into [`RhiError::DeviceLost`].
pub(crate) fn map_device_error(result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost("VK_ERROR_DEVICE_LOST".to_string()),
        other => RhiError::VulkanError(other),
    }
}

impl Device for VulkanDevice {
    type Buffer = VulkanBuffer;
    type CommandContext = VulkanCommandContext;
    type Fence = TimelineFence;

    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> RhiResult<VulkanBuffer> {
        VulkanBuffer::new(self.shared.clone(), usage, size, label)
    }

    fn create_command_context(&self) -> RhiResult<VulkanCommandContext> {
        VulkanCommandContext::new(self.shared.clone())
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<TimelineFence> {
        TimelineFence::new(self.shared.clone(), initial_value)
    }

    fn submit(&self, commands: &mut VulkanCommandContext) -> RhiResult<()> {
        commands.state().expect(CommandState::Executable)?;
        let command_buffers = [commands.handle()];
        self.queue_submit(vk::SubmitInfo::default().command_buffers(&command_buffers))?;
        commands.mark_submitted();
        Ok(())
    }

    fn signal(&self, fence: &TimelineFence, value: u64) -> RhiResult<()> {
        let semaphores = [fence.handle()];
        let values = [value];
        let mut timeline_info =
            vk::TimelineSemaphoreSubmitInfo::default().signal_semaphore_values(&values);
        let submit = vk::SubmitInfo::default()
            .signal_semaphores(&semaphores)
            .push_next(&mut timeline_info);
        self.queue_submit(submit)
    }
}

impl Drop for VulkanShared {
    fn drop(&mut self) {
        // Free allocator memory before the application destroys the device.
        drop(self.allocator.lock().take());
        info!("Vulkan device wrapper destroyed");
    }
}
