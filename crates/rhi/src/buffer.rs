//! GPU buffer management.
//!
//! - [`BufferUsage`] defines how a buffer will be used and how its elements are laid out
//! - [`GpuBuffer`] is the byte-level interface every backend buffer implements
//! - [`UploadBuffer`] is a typed, host-visible array of `Pod` elements
//!
//! # Example
//!
//! ```no_run
//! use cullframe_rhi::buffer::{BufferUsage, UploadBuffer};
//! use cullframe_rhi::headless::HeadlessDevice;
//!
//! # fn example() -> Result<(), cullframe_rhi::RhiError> {
//! let device = HeadlessDevice::manual();
//! let constants: UploadBuffer<_, [f32; 4]> =
//!     UploadBuffer::new(&device, BufferUsage::Uniform, 4, "tint")?;
//! constants.copy_data(2, &[1.0, 0.5, 0.25, 1.0])?;
//! # Ok(())
//! # }
//! ```

use std::marker::PhantomData;

use bytemuck::Pod;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Required alignment of each element of a uniform (constant) buffer.
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Buffer usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores index data
    Index,
    /// Uniform buffer - elements padded to [`CONSTANT_BUFFER_ALIGNMENT`]
    Uniform,
    /// Storage buffer - tightly packed elements
    Storage,
}

impl BufferUsage {
    /// Byte distance between consecutive elements of `element_size` bytes.
    pub fn element_stride(self, element_size: u64) -> u64 {
        match self {
            BufferUsage::Uniform => align_up(element_size, CONSTANT_BUFFER_ALIGNMENT),
            _ => element_size,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Storage => "storage",
        }
    }
}

/// Round `value` up to a multiple of `alignment` (a power of two).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Device-unique buffer identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Host-visible GPU buffer.
///
/// Writes go straight to memory the device reads. The caller is responsible
/// for not writing a region the device is still reading; the frame ring
/// guarantees this for per-frame buffers.
pub trait GpuBuffer: Send + Sync {
    /// Identifier, unique per device.
    fn id(&self) -> BufferId;

    /// Size in bytes.
    fn size(&self) -> u64;

    /// Usage the buffer was created with.
    fn usage(&self) -> BufferUsage;

    /// Copy `data` into the buffer at `offset`.
    fn write(&self, offset: u64, data: &[u8]) -> RhiResult<()>;

    /// Copy `out.len()` bytes starting at `offset` out of the buffer.
    fn read(&self, offset: u64, out: &mut [u8]) -> RhiResult<()>;
}

/// Bounds check shared by backend buffer implementations.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> RhiResult<()> {
    let len = len as u64;
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::OutOfBounds { offset, len, size }),
    }
}

/// Typed array of `T` in a host-visible buffer.
///
/// Element `i` lives at byte offset `i * stride`. For uniform buffers the
/// stride is rounded up to [`CONSTANT_BUFFER_ALIGNMENT`] so each element can
/// be bound on its own.
pub struct UploadBuffer<B, T> {
    buffer: B,
    element_count: usize,
    stride: u64,
    _marker: PhantomData<T>,
}

impl<B: GpuBuffer, T: Pod> UploadBuffer<B, T> {
    /// Allocate room for `element_count` elements.
    ///
    /// A zero-length buffer still owns one element of backing storage so it
    /// can be bound, but every index is out of range.
    ///
    /// # Errors
    ///
    /// Returns an error if the device cannot allocate the buffer.
    pub fn new<D>(
        device: &D,
        usage: BufferUsage,
        element_count: usize,
        label: &str,
    ) -> RhiResult<Self>
    where
        D: Device<Buffer = B>,
    {
        let stride = usage.element_stride(std::mem::size_of::<T>() as u64);
        let size = stride * element_count.max(1) as u64;
        let buffer = device.create_buffer(usage, size, label)?;

        debug!(
            "Created upload buffer '{}': {} x {} bytes",
            label, element_count, stride
        );

        Ok(Self {
            buffer,
            element_count,
            stride,
            _marker: PhantomData,
        })
    }

    /// Overwrite element `index` with `data`.
    pub fn copy_data(&self, index: usize, data: &T) -> RhiResult<()> {
        let offset = self.offset_of(index)?;
        self.buffer.write(offset, bytemuck::bytes_of(data))
    }

    /// Read element `index` back.
    pub fn read(&self, index: usize) -> RhiResult<T> {
        let offset = self.offset_of(index)?;
        let mut value = T::zeroed();
        self.buffer
            .read(offset, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    fn offset_of(&self, index: usize) -> RhiResult<u64> {
        if index >= self.element_count {
            return Err(RhiError::ElementOutOfRange {
                index,
                count: self.element_count,
            });
        }
        Ok(index as u64 * self.stride)
    }

    /// Number of addressable elements.
    #[inline]
    pub fn len(&self) -> usize {
        self.element_count
    }

    /// True if the buffer holds no addressable elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.element_count == 0
    }

    /// Byte distance between elements.
    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// The underlying device buffer.
    #[inline]
    pub fn buffer(&self) -> &B {
        &self.buffer
    }
}
