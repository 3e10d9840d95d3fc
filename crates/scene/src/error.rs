//! Scene error types.

use thiserror::Error;

/// Error type for scene operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// A matrix that must be inverted has a (near) zero determinant.
    #[error("{0} matrix is not invertible")]
    SingularMatrix(&'static str),

    /// Render item id does not exist in the scene.
    #[error("Unknown render item {0}")]
    UnknownItem(usize),
}

/// Result type alias for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
