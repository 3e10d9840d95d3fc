//! Host-side timeline fence.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

#[derive(Debug, Default)]
struct FenceValue {
    completed: u64,
    lost: Option<String>,
}

/// State shared between a fence handle and the queue that signals it.
#[derive(Debug, Default)]
pub(crate) struct FenceState {
    value: Mutex<FenceValue>,
    cond: Condvar,
}

impl FenceState {
    pub(crate) fn with_value(initial: u64) -> Self {
        Self {
            value: Mutex::new(FenceValue {
                completed: initial,
                lost: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Raise the completed value. Values never move backwards.
    pub(crate) fn signal(&self, value: u64) {
        let mut guard = self.value.lock();
        if value > guard.completed {
            guard.completed = value;
        }
        self.cond.notify_all();
    }

    /// Wake all waiters with a device-lost error.
    pub(crate) fn mark_lost(&self, reason: &str) {
        let mut guard = self.value.lock();
        guard.lost = Some(reason.to_string());
        self.cond.notify_all();
    }
}

/// Fence of a [`HeadlessDevice`](super::HeadlessDevice).
#[derive(Clone, Debug)]
pub struct HeadlessFence {
    pub(crate) state: Arc<FenceState>,
}

impl Fence for HeadlessFence {
    fn completed_value(&self) -> RhiResult<u64> {
        let guard = self.state.value.lock();
        match &guard.lost {
            Some(reason) => Err(RhiError::DeviceLost(reason.clone())),
            None => Ok(guard.completed),
        }
    }

    fn wait(&self, value: u64, timeout: Option<Duration>) -> RhiResult<()> {
        let start = Instant::now();
        let mut guard = self.state.value.lock();
        loop {
            if let Some(reason) = &guard.lost {
                return Err(RhiError::DeviceLost(reason.clone()));
            }
            if guard.completed >= value {
                return Ok(());
            }
            match timeout {
                None => self.state.cond.wait(&mut guard),
                Some(timeout) => {
                    let result = self.state.cond.wait_until(&mut guard, start + timeout);
                    if result.timed_out() && guard.completed < value && guard.lost.is_none() {
                        return Err(RhiError::FenceTimeout {
                            value,
                            completed: guard.completed,
                            timeout,
                        });
                    }
                }
            }
        }
    }
}
