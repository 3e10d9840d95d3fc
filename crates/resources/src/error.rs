//! Error types for resource management.

use thiserror::Error;

use crate::material::MaterialHandle;
use crate::model::MeshHandle;

/// Error type for resource operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Handle does not refer to a registered material.
    #[error("Unknown material handle {0:?}")]
    UnknownMaterial(MaterialHandle),

    /// Handle does not refer to a stored mesh.
    #[error("Unknown mesh handle {0:?}")]
    UnknownMesh(MeshHandle),

    /// Mesh has no submesh with this name.
    #[error("Mesh '{mesh}' has no submesh '{submesh}'")]
    UnknownSubmesh {
        /// Name of the mesh.
        mesh: String,
        /// Requested submesh name.
        submesh: String,
    },

    /// A resource with this name is already registered.
    #[error("Duplicate resource name '{0}'")]
    DuplicateName(String),

    /// Geometry has no vertices or no indices.
    #[error("Mesh '{0}' has no geometry")]
    EmptyGeometry(String),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
