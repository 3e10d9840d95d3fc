//! Device and queue abstraction.
//!
//! [`Device`] is the narrow surface the frame pipeline needs from a GPU:
//! allocate host-visible buffers, create recording contexts and fences,
//! submit closed contexts to the single graphics queue, and enqueue a fence
//! signal behind everything submitted so far. Adapter selection, swapchains,
//! and pipeline state are set up by whoever constructs the device.

use crate::buffer::{BufferUsage, GpuBuffer};
use crate::command::CommandContext;
use crate::error::RhiResult;
use crate::sync::Fence;

/// A logical device with one in-order submission queue.
pub trait Device: Send + Sync {
    /// Host-visible buffer type.
    type Buffer: GpuBuffer;
    /// Recording context type.
    type CommandContext: CommandContext<Buffer = Self::Buffer>;
    /// Completion counter type.
    type Fence: Fence;

    /// Short backend name for logging.
    fn name(&self) -> &str;

    /// Allocate a host-visible buffer of `size` bytes.
    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str)
    -> RhiResult<Self::Buffer>;

    /// Create a command context in the `Initial` state.
    fn create_command_context(&self) -> RhiResult<Self::CommandContext>;

    /// Create a fence whose completed value starts at `initial_value`.
    fn create_fence(&self, initial_value: u64) -> RhiResult<Self::Fence>;

    /// Submit a closed context to the queue. The context becomes `Pending`.
    fn submit(&self, commands: &mut Self::CommandContext) -> RhiResult<()>;

    /// Enqueue a signal that sets `fence` to `value` once all previously
    /// submitted work has executed.
    fn signal(&self, fence: &Self::Fence, value: u64) -> RhiResult<()>;
}
