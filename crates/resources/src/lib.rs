//! Resource definitions shared by the scene and the renderer.
//!
//! This crate handles:
//! - GPU constant buffer layouts ([`ubo`])
//! - Material definitions and the material registry
//! - Mesh geometry and the geometry arena

mod error;

pub mod material;
pub mod model;
pub mod ubo;

pub use error::{ResourceError, ResourceResult};
pub use material::{Material, MaterialHandle, MaterialRegistry};
pub use model::{GeometryArena, MeshGeometry, MeshHandle, SubmeshGeometry, Vertex};
pub use ubo::{InstanceConstants, Light, MAX_LIGHTS, MaterialConstants, PassConstants};
