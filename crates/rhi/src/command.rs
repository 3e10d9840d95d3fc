//! Command recording contexts.
//!
//! A [`CommandContext`] is the per-frame recording object: an allocator plus
//! the list recorded into it. It moves through a fixed state machine:
//!
//! ```text
//! Initial --begin--> Recording --end--> Executable --submit--> Pending
//!    ^                                      |                     |
//!    +------------------reset---------------+-----(retired)-------+
//! ```
//!
//! Resetting a context that is `Recording`, or `Pending` on work the device
//! has not retired, fails with [`RhiError::CommandContextInUse`].
//!
//! [`RhiError::CommandContextInUse`]: crate::RhiError::CommandContextInUse

use crate::buffer::GpuBuffer;
use crate::error::{RhiError, RhiResult};

/// Lifecycle state of a command context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandState {
    /// Reset and ready for `begin`.
    Initial,
    /// Between `begin` and `end`.
    Recording,
    /// Closed and ready for submission.
    Executable,
    /// Submitted; the device may still be reading it.
    Pending,
}

impl CommandState {
    /// Check that the current state matches `expected`.
    pub fn expect(self, expected: CommandState) -> RhiResult<()> {
        if self == expected {
            Ok(())
        } else {
            Err(RhiError::InvalidCommandState {
                expected,
                actual: self,
            })
        }
    }
}

/// Shader-visible slot a buffer is bound to for subsequent draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindPoint {
    /// Per-pass constants (camera, lights, timing).
    Pass = 0,
    /// Material constant array.
    Materials = 1,
    /// Visible instance array.
    Instances = 2,
}

impl BindPoint {
    /// Number of bind points.
    pub const COUNT: usize = 3;

    /// Slot index for table lookups.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Arguments for an indexed, instanced draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawIndexedArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

/// A recording context owned by exactly one frame resource set.
pub trait CommandContext: Send {
    /// Buffer type accepted by [`bind_buffer`](Self::bind_buffer).
    type Buffer: GpuBuffer;

    /// Current lifecycle state.
    fn state(&self) -> CommandState;

    /// Return the context to [`CommandState::Initial`], reclaiming its memory.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CommandContextInUse`] if the context is recording
    /// or its last submission has not been retired.
    fn reset(&mut self) -> RhiResult<()>;

    /// Open the context for recording.
    fn begin(&mut self) -> RhiResult<()>;

    /// Close the context so it can be submitted.
    fn end(&mut self) -> RhiResult<()>;

    /// Tell the context that the fence has passed its last submission.
    ///
    /// Moves a `Pending` context back to `Executable` so it may be reset.
    fn mark_retired(&mut self);

    /// Bind `buffer` to `point` for subsequent draws.
    fn bind_buffer(&mut self, point: BindPoint, buffer: &Self::Buffer) -> RhiResult<()>;

    /// Record an indexed, instanced draw.
    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> RhiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_expect() {
        assert!(CommandState::Recording.expect(CommandState::Recording).is_ok());

        let err = CommandState::Pending
            .expect(CommandState::Initial)
            .unwrap_err();
        assert!(matches!(
            err,
            RhiError::InvalidCommandState {
                expected: CommandState::Initial,
                actual: CommandState::Pending,
            }
        ));
    }

    #[test]
    fn test_bind_point_indices_are_dense() {
        let points = [BindPoint::Pass, BindPoint::Materials, BindPoint::Instances];
        for (i, point) in points.iter().enumerate() {
            assert_eq!(point.index(), i);
        }
        assert_eq!(points.len(), BindPoint::COUNT);
    }
}
