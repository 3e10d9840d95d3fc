//! Renderer configuration.
//!
//! [`RendererConfig`] is read from a TOML file at start-up. Every key is
//! optional; missing keys take the defaults below.
//!
//! ```toml
//! frame_resource_count = 3
//! frustum_culling = true
//! parallel_culling = false
//! fence_timeout_ms = 2000
//! width = 1280
//! height = 720
//! fov_y_degrees = 45.0
//! near_z = 1.0
//! far_z = 1000.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Number of per-frame resource sets in the ring when not configured.
pub const DEFAULT_FRAME_RESOURCE_COUNT: usize = 3;

/// Upper bound on the ring depth. Deeper rings only add latency.
const MAX_FRAME_RESOURCE_COUNT: usize = 8;

/// Renderer settings.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Ring depth N. The CPU may run at most N - 1 frames ahead of the GPU.
    pub frame_resource_count: usize,
    /// Cull instances against the view frustum. When false every instance is drawn.
    pub frustum_culling: bool,
    /// Evaluate instance visibility on the rayon thread pool.
    pub parallel_culling: bool,
    /// Maximum time to wait for the GPU in `advance()`. `None` waits forever.
    pub fence_timeout_ms: Option<u64>,
    /// Render target width in pixels.
    pub width: u32,
    /// Render target height in pixels.
    pub height: u32,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    /// Near clip distance.
    pub near_z: f32,
    /// Far clip distance.
    pub far_z: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frame_resource_count: DEFAULT_FRAME_RESOURCE_COUNT,
            frustum_culling: true,
            parallel_culling: false,
            fence_timeout_ms: None,
            width: 800,
            height: 600,
            fov_y_degrees: 45.0,
            near_z: 1.0,
            far_z: 1000.0,
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// contains out-of-range values.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Check that all values are usable.
    pub fn validate(&self) -> Result<()> {
        if self.frame_resource_count == 0 || self.frame_resource_count > MAX_FRAME_RESOURCE_COUNT {
            return Err(Error::Config(format!(
                "frame_resource_count must be in 1..={}, got {}",
                MAX_FRAME_RESOURCE_COUNT, self.frame_resource_count
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "render target extent must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if !(self.fov_y_degrees > 0.0 && self.fov_y_degrees < 180.0) {
            return Err(Error::Config(format!(
                "fov_y_degrees must be in (0, 180), got {}",
                self.fov_y_degrees
            )));
        }
        if !(self.near_z > 0.0 && self.near_z < self.far_z) {
            return Err(Error::Config(format!(
                "clip range must satisfy 0 < near < far, got near={} far={}",
                self.near_z, self.far_z
            )));
        }
        Ok(())
    }

    /// Fence wait timeout as a [`Duration`].
    pub fn fence_timeout(&self) -> Option<Duration> {
        self.fence_timeout_ms.map(Duration::from_millis)
    }

    /// Width divided by height.
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame_resource_count, 3);
        assert!(config.fence_timeout().is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            frame_resource_count = 2
            fence_timeout_ms = 250
            "#,
        )
        .expect("valid config");

        assert_eq!(config.frame_resource_count, 2);
        assert_eq!(config.fence_timeout(), Some(Duration::from_millis(250)));
        assert!(config.frustum_culling);
        assert_eq!(config.width, 800);
    }

    #[test]
    fn test_zero_ring_depth_rejected() {
        let err = RendererConfig::from_toml_str("frame_resource_count = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_inverted_clip_range_rejected() {
        let err = RendererConfig::from_toml_str("near_z = 10.0\nfar_z = 5.0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = RendererConfig::from_toml_str("width = \"wide\"").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_aspect_ratio() {
        let config = RendererConfig {
            width: 1280,
            height: 720,
            ..Default::default()
        };
        assert!((config.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
    }
}
