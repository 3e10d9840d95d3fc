//! Frame resource ring.
//!
//! # Overview
//!
//! The ring holds N [`FrameResources`] and one fence. Every submission is
//! followed by a fence signal with a monotonically increasing counter value,
//! and the value is stored on the slot as its stamp. Before a slot is
//! reused, [`FrameRing::advance`] waits until the fence has reached that
//! stamp, so the CPU never runs more than N - 1 frames ahead of the GPU and
//! never overwrites buffers the GPU may still read.
//!
//! ```text
//! frame:   1   2   3   4   5
//! slot:    0   1   2   0   1
//! waits:   -   -   -  >=1 >=2
//! ```
//!
//! `advance` is the only place the CPU blocks.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cullframe_rhi::{CommandContext, Device, Fence};

use crate::error::{RenderError, RenderResult};
use crate::frame_resources::FrameResources;

/// Ring of per-frame resource sets with a completion fence.
pub struct FrameRing<D: Device> {
    device: Arc<D>,
    frames: Vec<FrameResources<D>>,
    fence: D::Fence,
    /// Last value signalled on the queue.
    counter: u64,
    current: usize,
    wait_timeout: Option<Duration>,
}

impl<D: Device> FrameRing<D> {
    /// Creates a ring of `frame_count` slots.
    ///
    /// # Arguments
    ///
    /// * `device` - Device that executes the submissions
    /// * `frame_count` - Ring depth N, at least 1
    /// * `material_count` - Material constant blocks per slot
    /// * `instance_capacity` - Instance entries per slot
    /// * `wait_timeout` - Upper bound on a wait in [`advance`](Self::advance);
    ///   `None` waits forever
    ///
    /// # Errors
    ///
    /// Returns an error if resource or fence creation fails.
    pub fn new(
        device: Arc<D>,
        frame_count: usize,
        material_count: usize,
        instance_capacity: usize,
        wait_timeout: Option<Duration>,
    ) -> RenderResult<Self> {
        if frame_count == 0 {
            return Err(RenderError::FrameIndexOutOfRange { index: 0, count: 0 });
        }

        let frames = (0..frame_count)
            .map(|slot| FrameResources::new(device.as_ref(), slot, material_count, instance_capacity))
            .collect::<Result<Vec<_>, _>>()?;
        let fence = device.create_fence(0)?;

        info!(
            "Frame ring created on '{}' with {} frames in flight",
            device.name(),
            frame_count
        );

        Ok(Self {
            device,
            frames,
            fence,
            counter: 0,
            // The first advance lands on slot 0.
            current: frame_count - 1,
            wait_timeout,
        })
    }

    /// Moves to the next slot, waiting for the GPU if it still uses it.
    ///
    /// A slot whose stamp is zero was never submitted and is returned
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FenceTimeout`](cullframe_rhi::RhiError::FenceTimeout)
    /// if a timeout is configured and the GPU does not catch up in time, or
    /// a device error if the fence cannot be queried.
    pub fn advance(&mut self) -> RenderResult<&mut FrameResources<D>> {
        let next = (self.current + 1) % self.frames.len();
        let stamp = self.frames[next].stamp();

        if stamp != 0 {
            let completed = self.fence.completed_value()?;
            if completed < stamp {
                debug!(
                    "Waiting for GPU: slot {} needs {}, completed {}",
                    next, stamp, completed
                );
                self.fence.wait(stamp, self.wait_timeout)?;
            }
            self.frames[next].commands_mut().mark_retired();
        }

        self.current = next;
        Ok(&mut self.frames[next])
    }

    /// Resets the command context of `slot` for a new recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CommandContextInUse`](cullframe_rhi::RhiError::CommandContextInUse)
    /// if the context is still recording or its submission has not retired.
    pub fn reset_recording(&mut self, slot: usize) -> RenderResult<()> {
        self.frame_mut(slot)?.commands_mut().reset()?;
        Ok(())
    }

    /// Submits the commands of `slot`, then stamps the slot with the next
    /// counter value and signals the fence with it.
    ///
    /// Returns the stamped value.
    pub fn submit_and_stamp(&mut self, slot: usize) -> RenderResult<u64> {
        let count = self.frames.len();
        let frame = self
            .frames
            .get_mut(slot)
            .ok_or(RenderError::FrameIndexOutOfRange { index: slot, count })?;

        self.device.submit(frame.commands_mut())?;

        self.counter += 1;
        frame.set_stamp(self.counter);
        self.device.signal(&self.fence, self.counter)?;

        Ok(self.counter)
    }

    /// Waits until the GPU has finished all submitted work.
    ///
    /// Signals a fresh counter value so the wait also covers work that was
    /// submitted without a stamp.
    pub fn flush(&mut self) -> RenderResult<()> {
        self.counter += 1;
        self.device.signal(&self.fence, self.counter)?;
        self.fence.wait(self.counter, self.wait_timeout)?;

        for frame in &mut self.frames {
            if frame.stamp() != 0 {
                frame.commands_mut().mark_retired();
            }
        }

        debug!("Flushed GPU queue at fence value {}", self.counter);
        Ok(())
    }

    /// Number of signalled values the GPU has not reached yet.
    pub fn in_flight(&self) -> RenderResult<u64> {
        let completed = self.fence.completed_value()?;
        if completed > self.counter {
            warn!(
                "Fence reports {} but only {} was signalled",
                completed, self.counter
            );
        }
        Ok(self.counter.saturating_sub(completed))
    }

    /// Value the GPU has completed.
    pub fn completed_value(&self) -> RenderResult<u64> {
        Ok(self.fence.completed_value()?)
    }

    /// Slot returned by the most recent [`advance`](Self::advance).
    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Last value signalled on the queue.
    #[inline]
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Ring depth N.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Resources of `slot`.
    pub fn frame(&self, slot: usize) -> RenderResult<&FrameResources<D>> {
        let count = self.frames.len();
        self.frames
            .get(slot)
            .ok_or(RenderError::FrameIndexOutOfRange { index: slot, count })
    }

    pub fn frame_mut(&mut self, slot: usize) -> RenderResult<&mut FrameResources<D>> {
        let count = self.frames.len();
        self.frames
            .get_mut(slot)
            .ok_or(RenderError::FrameIndexOutOfRange { index: slot, count })
    }
}
