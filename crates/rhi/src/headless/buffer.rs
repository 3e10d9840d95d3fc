//! Host memory buffers.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferId, BufferUsage, GpuBuffer, check_range};
use crate::error::RhiResult;

/// Buffer of a [`HeadlessDevice`](super::HeadlessDevice).
///
/// The bytes are shared with any command list that bound the buffer, so the
/// software queue reads whatever is in memory at execution time, the same as
/// a mapped upload heap on a real device.
#[derive(Debug)]
pub struct HeadlessBuffer {
    pub(crate) id: BufferId,
    usage: BufferUsage,
    label: String,
    pub(crate) data: Arc<RwLock<Vec<u8>>>,
}

impl HeadlessBuffer {
    pub(crate) fn new(id: BufferId, usage: BufferUsage, size: u64, label: &str) -> Self {
        Self {
            id,
            usage,
            label: label.to_string(),
            data: Arc::new(RwLock::new(vec![0; size as usize])),
        }
    }

    /// Debug label given at creation.
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl GpuBuffer for HeadlessBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn usage(&self) -> BufferUsage {
        self.usage
    }

    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()> {
        let mut bytes = self.data.write();
        check_range(offset, data.len(), bytes.len() as u64)?;
        let start = offset as usize;
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> RhiResult<()> {
        let bytes = self.data.read();
        check_range(offset, out.len(), bytes.len() as u64)?;
        let start = offset as usize;
        out.copy_from_slice(&bytes[start..start + out.len()]);
        Ok(())
    }
}
