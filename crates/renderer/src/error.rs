//! Renderer error types.

use thiserror::Error;

use cullframe_resources::ResourceError;
use cullframe_rhi::RhiError;
use cullframe_scene::SceneError;

/// Error type for the frame pipeline.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device, queue, or buffer failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Scene data could not be processed
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Material or mesh lookup failed
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Invalid renderer configuration
    #[error(transparent)]
    Config(#[from] cullframe_core::Error),

    /// Ring slot index past the end of the ring
    #[error("Frame resource index {index} out of range for ring of {count}")]
    FrameIndexOutOfRange { index: usize, count: usize },

    /// A frame handle that no longer owns its slot was used
    #[error("Stale frame handle: frame {frame} (slot {slot}) is not the open frame")]
    StaleFrame { slot: usize, frame: u64 },

    /// The scene holds more instances than the instance buffers were sized for
    #[error("Scene needs {required} instance slots but frame buffers hold {capacity}")]
    InstanceCapacityExceeded { required: usize, capacity: usize },

    /// More materials are registered than the material buffers were sized for
    #[error("Registry holds {required} materials but frame buffers hold {capacity}")]
    MaterialCapacityExceeded { required: usize, capacity: usize },

    /// Material countdowns do not match the ring depth
    #[error("Material registry tracks {registry} frames but the ring has {ring}")]
    RingDepthMismatch { registry: usize, ring: usize },

    /// A previous fatal error stopped the renderer
    #[error("Renderer halted: {0}")]
    Halted(String),
}

impl RenderError {
    /// Whether the renderer must stop after this error.
    ///
    /// Every device-level failure is fatal, as are singular camera or
    /// instance transforms and misuse of ring slots or frame handles.
    pub fn is_fatal(&self) -> bool {
        match self {
            RenderError::Rhi(_)
            | RenderError::FrameIndexOutOfRange { .. }
            | RenderError::StaleFrame { .. }
            | RenderError::Halted(_) => true,
            RenderError::Scene(e) => matches!(e, SceneError::SingularMatrix(_)),
            RenderError::Resource(_)
            | RenderError::Config(_)
            | RenderError::InstanceCapacityExceeded { .. }
            | RenderError::MaterialCapacityExceeded { .. }
            | RenderError::RingDepthMismatch { .. } => false,
        }
    }
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use cullframe_rhi::CommandState;
    use std::time::Duration;

    #[test]
    fn test_fatal_classification() {
        assert!(RenderError::from(RhiError::DeviceLost("gone".into())).is_fatal());
        assert!(
            RenderError::from(RhiError::FenceTimeout {
                value: 4,
                completed: 1,
                timeout: Duration::from_millis(5),
            })
            .is_fatal()
        );
        assert!(
            RenderError::from(RhiError::CommandContextInUse(CommandState::Recording)).is_fatal()
        );
        assert!(RenderError::from(SceneError::SingularMatrix("world")).is_fatal());
        assert!(RenderError::StaleFrame { slot: 0, frame: 1 }.is_fatal());

        assert!(!RenderError::from(SceneError::UnknownItem(3)).is_fatal());
        assert!(
            !RenderError::InstanceCapacityExceeded {
                required: 10,
                capacity: 5
            }
            .is_fatal()
        );
        assert!(
            !RenderError::MaterialCapacityExceeded {
                required: 9,
                capacity: 8
            }
            .is_fatal()
        );
    }
}
