//! Shared foundations for the cullframe crates.
//!
//! - [`Error`] and [`Result`] for start-up and configuration failures
//! - [`init_logging`] for the `tracing` subscriber
//! - [`Timer`] and [`FrameTiming`] for per-frame total and delta time
//! - [`RendererConfig`], loaded from TOML

mod config;
mod error;
mod logging;
mod timer;

pub use config::{DEFAULT_FRAME_RESOURCE_COUNT, RendererConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::{FrameTiming, Timer};
