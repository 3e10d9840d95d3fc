//! Recorded command lists.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::warn;

use super::buffer::HeadlessBuffer;
use crate::buffer::BufferId;
use crate::command::{BindPoint, CommandContext, CommandState, DrawIndexedArgs};
use crate::error::{RhiError, RhiResult};

/// A buffer binding captured at record time.
#[derive(Clone, Debug)]
pub(crate) struct BoundBuffer {
    pub(crate) id: BufferId,
    pub(crate) data: Arc<RwLock<Vec<u8>>>,
}

#[derive(Clone, Debug)]
pub(crate) enum Recorded {
    Bind(BindPoint, BoundBuffer),
    Draw(DrawIndexedArgs),
}

/// Command context of a [`HeadlessDevice`](super::HeadlessDevice).
#[derive(Debug)]
pub struct HeadlessCommandContext {
    state: CommandState,
    commands: Vec<Recorded>,
    /// Set by the queue once the last submission has executed.
    retired: Option<Arc<AtomicBool>>,
}

impl HeadlessCommandContext {
    pub(crate) fn new() -> Self {
        Self {
            state: CommandState::Initial,
            commands: Vec::new(),
            retired: None,
        }
    }

    /// Hand the recorded list to the queue and move to `Pending`.
    pub(crate) fn take_for_submit(&mut self) -> RhiResult<(Vec<Recorded>, Arc<AtomicBool>)> {
        self.state.expect(CommandState::Executable)?;
        let retired = Arc::new(AtomicBool::new(false));
        self.retired = Some(retired.clone());
        self.state = CommandState::Pending;
        Ok((std::mem::take(&mut self.commands), retired))
    }

    fn has_retired(&self) -> bool {
        self.retired
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// Number of commands recorded since the last `begin`.
    pub fn recorded_len(&self) -> usize {
        self.commands.len()
    }
}

impl CommandContext for HeadlessCommandContext {
    type Buffer = HeadlessBuffer;

    fn state(&self) -> CommandState {
        self.state
    }

    fn reset(&mut self) -> RhiResult<()> {
        match self.state {
            CommandState::Recording => {
                return Err(RhiError::CommandContextInUse(CommandState::Recording));
            }
            CommandState::Pending if !self.has_retired() => {
                return Err(RhiError::CommandContextInUse(CommandState::Pending));
            }
            _ => {}
        }
        self.commands.clear();
        self.retired = None;
        self.state = CommandState::Initial;
        Ok(())
    }

    fn begin(&mut self) -> RhiResult<()> {
        self.state.expect(CommandState::Initial)?;
        self.state = CommandState::Recording;
        Ok(())
    }

    fn end(&mut self) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        self.state = CommandState::Executable;
        Ok(())
    }

    fn mark_retired(&mut self) {
        if self.state != CommandState::Pending {
            return;
        }
        if self.has_retired() {
            self.state = CommandState::Executable;
        } else {
            warn!("Command context marked retired before the queue executed it");
        }
    }

    fn bind_buffer(&mut self, point: BindPoint, buffer: &HeadlessBuffer) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        self.commands.push(Recorded::Bind(
            point,
            BoundBuffer {
                id: buffer.id,
                data: buffer.data.clone(),
            },
        ));
        Ok(())
    }

    fn draw_indexed(&mut self, args: DrawIndexedArgs) -> RhiResult<()> {
        self.state.expect(CommandState::Recording)?;
        self.commands.push(Recorded::Draw(args));
        Ok(())
    }
}
