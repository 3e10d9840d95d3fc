//! Scene data consumed by the frame pipeline.
//!
//! This crate provides:
//! - Bounding boxes and view frustums with containment tests
//! - The camera
//! - Light definitions
//! - Instanced render items and the scene that owns them

mod error;

pub mod bounds;
pub mod camera;
pub mod frustum;
pub mod light;
pub mod render_item;

pub use bounds::Aabb;
pub use camera::{Camera, Projection};
pub use error::{SceneError, SceneResult};
pub use frustum::{Containment, Frustum, Plane, checked_inverse};
pub use light::{DEMO_AMBIENT_LIGHT, DirectionalLight, PointLight, SpotLight};
pub use render_item::{DrawArgs, InstanceData, RenderItem, RenderItemId, Scene, instance_grid};
