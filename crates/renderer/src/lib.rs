//! Pipelined frame rendering.
//!
//! This crate drives the CPU side of a frame loop:
//! - A ring of per-frame resource sets guarded by a completion fence
//! - Per-instance frustum culling with compaction into the frame's instance buffer
//! - Per-frame scene updates (pass constants, dirty materials)
//! - The [`Renderer`] that ties the stages together

pub mod culler;
mod error;
pub mod frame_resources;
pub mod frame_ring;
pub mod renderer;
pub mod scene_update;

pub use culler::{CullStats, InstanceCuller, ItemCullStats, instance_visible};
pub use error::{RenderError, RenderResult};
pub use frame_resources::FrameResources;
pub use frame_ring::FrameRing;
pub use renderer::{DrawContext, FrameHandle, Renderer};
pub use scene_update::{FrameSnapshot, FrameUpdate, SceneUpdater};
