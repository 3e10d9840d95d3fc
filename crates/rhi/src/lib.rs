//! Render Hardware Interface.
//!
//! This crate defines the device verbs the frame pipeline is written against
//! and provides two backends:
//! - [`headless`] - a software GPU that executes recorded draws on the host,
//!   either on demand (deterministic tests) or on a worker thread
//! - `vulkan` - `ash` + `gpu-allocator`, enabled by the `vulkan` feature
//!
//! The traits cover:
//! - Host-visible buffers and typed upload buffers ([`buffer`])
//! - Command recording contexts ([`command`])
//! - Timeline fences ([`sync`])
//! - Device and queue submission ([`device`])

mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod headless;
pub mod sync;
#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use buffer::{BufferId, BufferUsage, CONSTANT_BUFFER_ALIGNMENT, GpuBuffer, UploadBuffer};
pub use command::{BindPoint, CommandContext, CommandState, DrawIndexedArgs};
pub use device::Device;
pub use error::{RhiError, RhiResult};
pub use sync::Fence;

// Re-export ash types that users might need
#[cfg(feature = "vulkan")]
pub use ash::vk;
