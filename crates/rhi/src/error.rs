//! RHI-specific error types.

use std::time::Duration;

use thiserror::Error;

use crate::command::CommandState;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// GPU allocator error
    #[cfg(feature = "vulkan")]
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The device stopped executing work
    #[error("Device lost: {0}")]
    DeviceLost(String),

    /// A fence did not reach the requested value in time
    #[error("Fence wait for value {value} timed out after {timeout:?} (completed {completed})")]
    FenceTimeout {
        value: u64,
        completed: u64,
        timeout: Duration,
    },

    /// A command context was reset while still recording or executing
    #[error("Command context still in use ({0:?})")]
    CommandContextInUse(CommandState),

    /// A command context operation was called in the wrong state
    #[error("Invalid command context state: expected {expected:?}, found {actual:?}")]
    InvalidCommandState {
        expected: CommandState,
        actual: CommandState,
    },

    /// A buffer write or read would leave the allocation
    #[error("Access out of bounds: offset {offset} + len {len} > buffer {size}")]
    OutOfBounds { offset: u64, len: u64, size: u64 },

    /// Typed element index past the end of an upload buffer
    #[error("Element {index} out of range for buffer of {count} elements")]
    ElementOutOfRange { index: usize, count: usize },

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

impl RhiError {
    /// Whether the device can no longer be trusted to make progress.
    pub fn is_device_failure(&self) -> bool {
        match self {
            RhiError::DeviceLost(_) | RhiError::FenceTimeout { .. } => true,
            #[cfg(feature = "vulkan")]
            RhiError::VulkanError(result) => *result == ash::vk::Result::ERROR_DEVICE_LOST,
            _ => false,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
