//! Command pool + command buffer pairs.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use super::buffer::VulkanBuffer;
use super::{VulkanShared, map_device_error};
use crate::command::{BindPoint, CommandContext, CommandState, DrawIndexedArgs};
use crate::error::{RhiError, RhiResult};

/// A transient command pool owning one primary command buffer.
///
/// Resetting the context resets the whole pool, which is only legal once
/// the device has finished executing the buffer.
pub struct VulkanCommandContext {
    shared: Arc<VulkanShared>,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    state: CommandState,
    /// Device addresses pushed with each draw, indexed by [`BindPoint`].
    addresses: [vk::DeviceAddress; BindPoint::COUNT],
}

impl VulkanCommandContext {
    pub(crate) fn new(shared: Arc<VulkanShared>) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(shared.queue_family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);

        let pool = unsafe { shared.device.create_command_pool(&create_info, None)? };

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = match unsafe { shared.device.allocate_command_buffers(&alloc_info) } {
            Ok(buffers) => buffers.first().copied(),
            Err(e) => {
                unsafe { shared.device.destroy_command_pool(pool, None) };
                return Err(e.into());
            }
        };
        let Some(buffer) = buffer else {
            unsafe { shared.device.destroy_command_pool(pool, None) };
            return Err(RhiError::InvalidHandle(
                "No command buffer allocated".to_string(),
            ));
        };

        debug!(
            "Command context created for queue family {}",
            shared.queue_family_index
        );

        Ok(Self {
            shared,
            pool,
            buffer,
            state: CommandState::Initial,
            addresses: [0; BindPoint::COUNT],
        })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = CommandState::Pending;
    }
}

impl CommandContext for VulkanCommandContext {
    type Buffer = VulkanBuffer;

    fn state(&self) -> CommandState {
        self.state
    }

    fn reset(&mut self) -> RhiResult<()> {
        if matches!(self.state, CommandState::Recording | CommandState::Pending) {
            return Err(RhiError::CommandContextInUse(self.state));
        }
        unsafe {
            self.shared
                .device
                .reset_command_pool(self.pool, vk::CommandPoolResetFlags::empty())
                .map_err(map_device_error)?;
        }
        self.addresses = [0; BindPoint::COUNT];
        self.state = CommandState::Initial;
        Ok(())
    }

    fn begin(&mut self) -> RhiResult<()> {
        self.state.expect(CommandState::Initial)?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.shared
                .device
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        self.state = CommandState::Recording;
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        unsafe {
            self.shared.device.end_command_buffer(self.buffer)?;
        }
        self.state = CommandState::Executable;
        Ok(())
    }

    fn mark_retired(&mut self) {
        if self.state == CommandState::Pending {
            self.state = CommandState::Executable;
        }
    }

    fn bind_buffer(&mut self, point: BindPoint, buffer: &VulkanBuffer) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        self.addresses[point.index()] = buffer.device_address();
        Ok(())
    }

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        unsafe {
            self.shared.device.cmd_push_constants(
                self.buffer,
                self.shared.pipeline_layout,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                0,
                bytemuck::cast_slice(&self.addresses),
            );
            self.shared.device.cmd_draw_indexed(
                self.buffer,
                args.index_count,
                args.instance_count,
                args.first_index,
                args.vertex_offset,
                args.first_instance,
            );
        }
        Ok(())
    }
}

impl Drop for VulkanCommandContext {
    fn drop(&mut self) {
        // Destroying the pool frees its command buffer.
        unsafe {
            self.shared.device.destroy_command_pool(self.pool, None);
        }
        debug!("Command context destroyed");
    }
}
