//! CPU/GPU synchronization.
//!
//! Frame pacing uses a single monotonically increasing value rather than a
//! pool of binary fences. The device advances the fence's completed value as
//! it retires queued signals; the host waits until the value reaches a
//! target. A slot stamped with value `v` may be reused once
//! `completed_value() >= v`.

use std::time::Duration;

use crate::error::RhiResult;

/// A monotonic GPU-to-CPU completion counter.
pub trait Fence: Send + Sync {
    /// Highest value the device has signaled so far.
    fn completed_value(&self) -> RhiResult<u64>;

    /// Block until `completed_value() >= value`.
    ///
    /// With `timeout == None` this waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceTimeout`] if the value is not reached within
    /// `timeout`, or [`RhiError::DeviceLost`] if the device fails while
    /// waiting.
    ///
    /// [`RhiError::FenceTimeout`]: crate::RhiError::FenceTimeout
    /// [`RhiError::DeviceLost`]: crate::RhiError::DeviceLost
    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()>;

    /// True if `value` has been reached.
    fn is_complete(&self, value: u64) -> RhiResult<bool> {
        Ok(self.completed_value()? >= value)
    }
}
