//! Software GPU.
//!
//! [`HeadlessDevice`] implements [`Device`] without any graphics API. Submitted
//! command lists are executed on the host in submission order: every draw
//! is recorded as an [`ExecutedDraw`] together with a snapshot of the buffers
//! it had bound, taken at execution time. Fence signals are processed in the
//! same queue, so a signal completes only after everything submitted before
//! it.
//!
//! Two timelines are available:
//! - [`GpuTimeline::Manual`] queues work until the caller runs it with
//!   [`HeadlessDevice::run_next`], [`HeadlessDevice::run_until_signal`] or
//!   [`HeadlessDevice::run_all`]. Deterministic, for tests.
//! - [`GpuTimeline::Threaded`] drains the queue on a worker thread, sleeping
//!   `latency` per command list to model GPU execution time.

mod buffer;
mod command;
mod fence;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info};

pub use buffer::HeadlessBuffer;
pub use command::HeadlessCommandContext;
pub use fence::HeadlessFence;

use crate::buffer::{BufferId, BufferUsage};
use crate::command::{BindPoint, DrawIndexedArgs};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use command::{BoundBuffer, Recorded};
use fence::FenceState;

/// How the software queue makes progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpuTimeline {
    /// Work runs only when the owner calls one of the `run_*` methods.
    Manual,
    /// A worker thread runs work as it arrives.
    Threaded {
        /// Simulated execution time per command list.
        latency: Duration,
    },
}

/// A draw as the software queue executed it.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutedDraw {
    /// 1-based index of the submission that contained the draw.
    pub submission: u64,
    pub args: DrawIndexedArgs,
    /// Buffer bound to each [`BindPoint`] at the time of the draw.
    pub bindings: [Option<BufferId>; BindPoint::COUNT],
    /// Contents of the pass constant buffer when the draw executed.
    pub pass_data: Vec<u8>,
    /// Contents of the instance buffer when the draw executed.
    pub instance_data: Vec<u8>,
}

impl ExecutedDraw {
    /// Buffer bound at `point`, if any.
    pub fn binding(&self, point: BindPoint) -> Option<BufferId> {
        self.bindings[point.index()]
    }
}

enum GpuWork {
    Execute {
        submission: u64,
        commands: Vec<Recorded>,
        retired: Arc<AtomicBool>,
    },
    Signal {
        fence: Arc<FenceState>,
        value: u64,
    },
}

/// State shared with the worker thread.
#[derive(Default)]
struct Shared {
    next_buffer_id: AtomicU64,
    submissions: AtomicU64,
    executed: Mutex<Vec<ExecutedDraw>>,
    lost: Mutex<Option<String>>,
    fences: Mutex<Vec<Weak<FenceState>>>,
}

impl Shared {
    fn execute(&self, work: GpuWork) -> Option<u64> {
        match work {
            GpuWork::Execute {
                submission,
                commands,
                retired,
            } => {
                let mut bound: [Option<BoundBuffer>; BindPoint::COUNT] = Default::default();
                let mut executed = Vec::new();
                for command in commands {
                    match command {
                        Recorded::Bind(point, buffer) => bound[point.index()] = Some(buffer),
                        Recorded::Draw(args) => executed.push(ExecutedDraw {
                            submission,
                            args,
                            bindings: [0, 1, 2].map(|i| bound[i].as_ref().map(|b| b.id)),
                            pass_data: snapshot(&bound[BindPoint::Pass.index()]),
                            instance_data: snapshot(&bound[BindPoint::Instances.index()]),
                        }),
                    }
                }
                self.executed.lock().extend(executed);
                retired.store(true, Ordering::Release);
                None
            }
            GpuWork::Signal { fence, value } => {
                fence.signal(value);
                Some(value)
            }
        }
    }
}

fn snapshot(buffer: &Option<BoundBuffer>) -> Vec<u8> {
    buffer
        .as_ref()
        .map(|b| b.data.read().clone())
        .unwrap_or_default()
}

enum Queue {
    Manual(Mutex<VecDeque<GpuWork>>),
    Threaded {
        sender: Option<Sender<GpuWork>>,
        worker: Option<JoinHandle<()>>,
    },
}

/// A device whose GPU is emulated on the host.
pub struct HeadlessDevice {
    shared: Arc<Shared>,
    queue: Queue,
    timeline: GpuTimeline,
}

impl HeadlessDevice {
    /// Creates a device with the given timeline.
    pub fn new(timeline: GpuTimeline) -> Self {
        let shared = Arc::new(Shared::default());
        let queue = match timeline {
            GpuTimeline::Manual => Queue::Manual(Mutex::new(VecDeque::new())),
            GpuTimeline::Threaded { latency } => {
                let (sender, receiver) = crossbeam_channel::unbounded();
                let worker_shared = shared.clone();
                let worker = std::thread::Builder::new()
                    .name("headless-gpu".to_string())
                    .spawn(move || run_worker(worker_shared, receiver, latency))
                    .ok();
                if worker.is_none() {
                    error!("Failed to spawn headless GPU worker");
                }
                Queue::Threaded {
                    sender: Some(sender),
                    worker,
                }
            }
        };

        info!("Headless device created ({:?})", timeline);

        Self {
            shared,
            queue,
            timeline,
        }
    }

    /// Device with a manually driven queue.
    pub fn manual() -> Self {
        Self::new(GpuTimeline::Manual)
    }

    /// Device with a worker-thread queue.
    pub fn threaded(latency: Duration) -> Self {
        Self::new(GpuTimeline::Threaded { latency })
    }

    /// The timeline this device was created with.
    pub fn timeline(&self) -> GpuTimeline {
        self.timeline
    }

    /// Number of queued items not yet executed. Always 0 for a threaded queue.
    pub fn pending_work(&self) -> usize {
        match &self.queue {
            Queue::Manual(queue) => queue.lock().len(),
            Queue::Threaded { .. } => 0,
        }
    }

    /// Execute one queued item. Returns false if the queue was empty.
    pub fn run_next(&self) -> bool {
        let Queue::Manual(queue) = &self.queue else {
            return false;
        };
        let work = queue.lock().pop_front();
        match work {
            Some(work) => {
                self.shared.execute(work);
                true
            }
            None => false,
        }
    }

    /// Execute queued items up to and including the next fence signal.
    ///
    /// Returns the signaled value, or `None` if the queue ran dry first.
    pub fn run_until_signal(&self) -> Option<u64> {
        let Queue::Manual(queue) = &self.queue else {
            return None;
        };
        loop {
            let work = queue.lock().pop_front()?;
            if let Some(value) = self.shared.execute(work) {
                return Some(value);
            }
        }
    }

    /// Execute everything queued. Returns the number of items run.
    pub fn run_all(&self) -> usize {
        let mut count = 0;
        while self.run_next() {
            count += 1;
        }
        count
    }

    /// Remove and return every draw executed so far.
    pub fn take_executed(&self) -> Vec<ExecutedDraw> {
        std::mem::take(&mut *self.shared.executed.lock())
    }

    /// Number of command lists submitted so far.
    pub fn submission_count(&self) -> u64 {
        self.shared.submissions.load(Ordering::Acquire)
    }

    /// Simulate device removal: fail all waiters and reject further work.
    pub fn lose_device(&self, reason: &str) {
        error!("Headless device lost: {}", reason);
        *self.shared.lost.lock() = Some(reason.to_string());
        if let Queue::Manual(queue) = &self.queue {
            queue.lock().clear();
        }
        for fence in self.shared.fences.lock().iter().filter_map(Weak::upgrade) {
            fence.mark_lost(reason);
        }
    }

    fn check_alive(&self) -> RhiResult<()> {
        match &*self.shared.lost.lock() {
            Some(reason) => Err(RhiError::DeviceLost(reason.clone())),
            None => Ok(()),
        }
    }

    fn enqueue(&self, work: GpuWork) -> RhiResult<()> {
        match &self.queue {
            Queue::Manual(queue) => {
                queue.lock().push_back(work);
                Ok(())
            }
            Queue::Threaded { sender, .. } => sender
                .as_ref()
                .ok_or_else(|| RhiError::DeviceLost("queue closed".to_string()))?
                .send(work)
                .map_err(|_| RhiError::DeviceLost("GPU worker stopped".to_string())),
        }
    }
}

fn run_worker(shared: Arc<Shared>, receiver: Receiver<GpuWork>, latency: Duration) {
    debug!("Headless GPU worker started");
    while let Ok(work) = receiver.recv() {
        if matches!(work, GpuWork::Execute { .. }) && !latency.is_zero() {
            std::thread::sleep(latency);
        }
        shared.execute(work);
    }
    debug!("Headless GPU worker stopped");
}

impl Device for HeadlessDevice {
    type Buffer = HeadlessBuffer;
    type CommandContext = HeadlessCommandContext;
    type Fence = HeadlessFence;

    fn name(&self) -> &str {
        "headless"
    }

    fn create_buffer(&self, usage: BufferUsage, size: u64, label: &str) -> RhiResult<HeadlessBuffer> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }
        let id = BufferId(self.shared.next_buffer_id.fetch_add(1, Ordering::Relaxed) + 1);
        debug!("Created {} buffer '{}': {} bytes", usage.name(), label, size);
        Ok(HeadlessBuffer::new(id, usage, size, label))
    }

    fn create_command_context(&self) -> RhiResult<HeadlessCommandContext> {
        self.check_alive()?;
        Ok(HeadlessCommandContext::new())
    }

    fn create_fence(&self, initial_value: u64) -> RhiResult<HeadlessFence> {
        self.check_alive()?;
        let state = Arc::new(FenceState::with_value(initial_value));
        let mut fences = self.shared.fences.lock();
        fences.retain(|f| f.strong_count() > 0);
        fences.push(Arc::downgrade(&state));
        Ok(HeadlessFence { state })
    }

    fn submit(&self, commands: &mut HeadlessCommandContext) -> RhiResult<()> {
        self.check_alive()?;
        let (recorded, retired) = commands.take_for_submit()?;
        let submission = self.shared.submissions.fetch_add(1, Ordering::AcqRel) + 1;
        self.enqueue(GpuWork::Execute {
            submission,
            commands: recorded,
            retired,
        })
    }

    fn signal(&self, fence: &HeadlessFence, value: u64) -> RhiResult<()> {
        self.check_alive()?;
        self.enqueue(GpuWork::Signal {
            fence: fence.state.clone(),
            value,
        })
    }
}

impl Drop for HeadlessDevice {
    fn drop(&mut self) {
        if let Queue::Threaded { sender, worker } = &mut self.queue {
            // Closing the channel lets the worker drain and exit.
            drop(sender.take());
            if let Some(worker) = worker.take() {
                if worker.join().is_err() {
                    error!("Headless GPU worker panicked");
                }
            }
        }
        debug!("Headless device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::GpuBuffer;
    use crate::command::{CommandContext, CommandState};
    use crate::sync::Fence;

    fn record_draw(
        device: &HeadlessDevice,
        instances: &HeadlessBuffer,
        count: u32,
    ) -> HeadlessCommandContext {
        let mut ctx = device.create_command_context().unwrap();
        ctx.begin().unwrap();
        ctx.bind_buffer(BindPoint::Instances, instances).unwrap();
        ctx.draw_indexed(DrawIndexedArgs {
            index_count: 36,
            instance_count: count,
            ..Default::default()
        })
        .unwrap();
        ctx.end().unwrap();
        ctx
    }

    #[test]
    fn test_manual_queue_executes_in_order() {
        let device = HeadlessDevice::manual();
        let fence = device.create_fence(0).unwrap();
        let buffer = device
            .create_buffer(BufferUsage::Storage, 4, "instances")
            .unwrap();

        let mut ctx = record_draw(&device, &buffer, 3);
        device.submit(&mut ctx).unwrap();
        device.signal(&fence, 1).unwrap();
        assert_eq!(ctx.state(), CommandState::Pending);
        assert_eq!(device.pending_work(), 2);
        assert_eq!(fence.completed_value().unwrap(), 0);

        assert_eq!(device.run_until_signal(), Some(1));
        assert_eq!(fence.completed_value().unwrap(), 1);

        let draws = device.take_executed();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].submission, 1);
        assert_eq!(draws[0].args.instance_count, 3);
        assert_eq!(draws[0].binding(BindPoint::Instances), Some(buffer.id()));
        assert_eq!(draws[0].binding(BindPoint::Pass), None);

        ctx.mark_retired();
        ctx.reset().unwrap();
    }

    #[test]
    fn test_snapshot_taken_at_execution_time() {
        let device = HeadlessDevice::manual();
        let buffer = device
            .create_buffer(BufferUsage::Storage, 4, "instances")
            .unwrap();

        buffer.write(0, &[1, 1, 1, 1]).unwrap();
        let mut ctx = record_draw(&device, &buffer, 1);
        device.submit(&mut ctx).unwrap();

        // Written after submission but before execution: the GPU sees it.
        buffer.write(0, &[2, 2, 2, 2]).unwrap();
        device.run_all();

        let draws = device.take_executed();
        assert_eq!(draws[0].instance_data, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_submit_requires_closed_context() {
        let device = HeadlessDevice::manual();
        let mut ctx = device.create_command_context().unwrap();
        ctx.begin().unwrap();

        assert!(matches!(
            device.submit(&mut ctx),
            Err(RhiError::InvalidCommandState { .. })
        ));
        assert_eq!(device.submission_count(), 0);
    }

    #[test]
    fn test_threaded_queue_completes() {
        let device = HeadlessDevice::threaded(Duration::from_millis(1));
        let fence = device.create_fence(0).unwrap();
        let buffer = device
            .create_buffer(BufferUsage::Storage, 4, "instances")
            .unwrap();

        for value in 1..=3 {
            let mut ctx = record_draw(&device, &buffer, 1);
            device.submit(&mut ctx).unwrap();
            device.signal(&fence, value).unwrap();
        }

        fence.wait(3, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(device.take_executed().len(), 3);
        assert_eq!(device.pending_work(), 0);
    }

    #[test]
    fn test_lost_device_rejects_work() {
        let device = HeadlessDevice::manual();
        let fence = device.create_fence(0).unwrap();
        device.lose_device("removed");

        assert!(matches!(fence.wait(1, None), Err(RhiError::DeviceLost(_))));
        assert!(matches!(
            device.signal(&fence, 1),
            Err(RhiError::DeviceLost(_))
        ));
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let device = HeadlessDevice::manual();
        assert!(device.create_buffer(BufferUsage::Uniform, 0, "empty").is_err());
    }

    #[test]
    fn test_headless_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HeadlessDevice>();
        assert_send_sync::<HeadlessBuffer>();
        assert_send_sync::<HeadlessFence>();
    }
}
