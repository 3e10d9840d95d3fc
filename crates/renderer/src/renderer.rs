//! Frame loop orchestration.
//!
//! # Overview
//!
//! [`Renderer`] drives one frame at a time through three stages:
//!
//! 1. [`begin_frame`](Renderer::begin_frame) advances the ring (waiting for
//!    the GPU if the slot is still in use), resets the slot's command
//!    context and starts recording. It returns a [`FrameHandle`] that owns
//!    the slot until the frame ends.
//! 2. [`update_scene`](Renderer::update_scene) samples the camera, writes
//!    pass and material constants, and culls instances into the slot.
//! 3. [`end_frame`](Renderer::end_frame) lets the caller record draws,
//!    closes the command list, submits it and stamps the slot.
//!
//! Any fatal error halts the renderer; every later call returns
//! [`RenderError::Halted`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cullframe_core::RendererConfig;
//! use cullframe_renderer::Renderer;
//! use cullframe_resources::MaterialRegistry;
//! use cullframe_rhi::headless::HeadlessDevice;
//! use cullframe_scene::Scene;
//!
//! # fn main() -> Result<(), cullframe_renderer::RenderError> {
//! let config = RendererConfig::default();
//! let device = Arc::new(HeadlessDevice::manual());
//! let mut scene = Scene::new();
//! let mut materials = MaterialRegistry::new(config.frame_resource_count);
//! let mut renderer = Renderer::new(Arc::clone(&device), &config, &scene, &materials)?;
//!
//! let frame = renderer.begin_frame()?;
//! renderer.update_scene(&frame, &mut scene, &mut materials)?;
//! let fence_value = renderer.end_frame(frame, |draw| draw.draw_scene(&scene))?;
//! assert_eq!(fence_value, 1);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use cullframe_core::RendererConfig;
use cullframe_resources::MaterialRegistry;
use cullframe_rhi::{CommandContext, Device, DrawIndexedArgs};
use cullframe_scene::{Camera, RenderItem, Scene};

use crate::culler::CullStats;
use crate::error::{RenderError, RenderResult};
use crate::frame_resources::FrameResources;
use crate::frame_ring::FrameRing;
use crate::scene_update::{FrameSnapshot, SceneUpdater};

/// Ownership of the ring slot for one frame.
///
/// Returned by [`Renderer::begin_frame`] and consumed by
/// [`Renderer::end_frame`]. A handle from an earlier frame is rejected.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameHandle {
    slot: usize,
    frame_number: u64,
}

impl FrameHandle {
    /// Ring slot the frame records into.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// 1-based frame number.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }
}

/// Draw recording for the open frame.
pub struct DrawContext<'a, D: Device> {
    frame: &'a mut FrameResources<D>,
}

impl<D: Device> DrawContext<'_, D> {
    /// Binds the slot's pass, material and instance buffers.
    pub fn bind_frame_buffers(&mut self) -> RenderResult<()> {
        self.frame.bind_buffers()?;
        Ok(())
    }

    /// Records one instanced draw for the visible instances of `item`.
    ///
    /// Returns false without recording if no instance survived culling.
    pub fn draw_item(&mut self, item: &RenderItem) -> RenderResult<bool> {
        let visible = item.visible_count();
        if visible == 0 {
            return Ok(false);
        }
        self.frame.commands_mut().draw_indexed(DrawIndexedArgs {
            index_count: item.draw.index_count,
            instance_count: visible as u32,
            first_index: item.draw.start_index,
            vertex_offset: item.draw.base_vertex,
            first_instance: item.instance_base() as u32,
        })?;
        Ok(true)
    }

    /// Binds the frame buffers and draws every item with visible instances.
    pub fn draw_scene(&mut self, scene: &Scene) -> RenderResult<()> {
        self.bind_frame_buffers()?;
        let mut draws = 0;
        for item in scene.items() {
            if self.draw_item(item)? {
                draws += 1;
            }
        }
        trace!("Recorded {} draws", draws);
        Ok(())
    }

    /// The slot being recorded.
    pub fn frame(&mut self) -> &mut FrameResources<D> {
        &mut *self.frame
    }
}

/// Pipelined renderer over a [`Device`].
pub struct Renderer<D: Device> {
    ring: FrameRing<D>,
    updater: SceneUpdater,
    /// Number of the last frame begun.
    frame_number: u64,
    open_frame: Option<(usize, u64)>,
    last_snapshot: Option<FrameSnapshot>,
    halted: Option<String>,
}

impl<D: Device> Renderer<D> {
    /// Creates a renderer sized for `scene` and `materials`.
    ///
    /// # Arguments
    ///
    /// * `device` - Device that executes the frames
    /// * `config` - Ring depth, culling mode, camera and screen settings
    /// * `scene` - Scene whose instance count sizes the instance buffers
    /// * `materials` - Registry whose size sizes the material buffers
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the registry's
    /// countdown depth differs from the ring depth, or resource creation fails.
    pub fn new(
        device: Arc<D>,
        config: &RendererConfig,
        scene: &Scene,
        materials: &MaterialRegistry,
    ) -> RenderResult<Self> {
        config.validate()?;
        if materials.frame_resource_count() != config.frame_resource_count {
            return Err(RenderError::RingDepthMismatch {
                registry: materials.frame_resource_count(),
                ring: config.frame_resource_count,
            });
        }

        let ring = FrameRing::new(
            device,
            config.frame_resource_count,
            materials.len(),
            scene.instance_capacity(),
            config.fence_timeout(),
        )?;

        let mut camera = Camera::new();
        camera.set_perspective(
            config.fov_y_degrees.to_radians(),
            config.aspect_ratio(),
            config.near_z,
            config.far_z,
        );
        let updater = SceneUpdater::new(
            camera,
            config.width,
            config.height,
            config.frustum_culling,
            config.parallel_culling,
        )?;

        info!(
            "Renderer created: {} frames, {} instances, {} materials, culling {}",
            config.frame_resource_count,
            scene.instance_capacity(),
            materials.len(),
            if config.frustum_culling { "on" } else { "off" }
        );

        Ok(Self {
            ring,
            updater,
            frame_number: 0,
            open_frame: None,
            last_snapshot: None,
            halted: None,
        })
    }

    /// Starts a frame on the next ring slot.
    ///
    /// Blocks while the GPU still uses the slot. An unfinished previous
    /// frame is abandoned; its slot stays in the recording state and fails
    /// when the ring comes back to it.
    ///
    /// # Errors
    ///
    /// Fatal on fence timeout, device loss, or if the slot's command context
    /// is still in use.
    pub fn begin_frame(&mut self) -> RenderResult<FrameHandle> {
        self.ensure_running()?;
        if let Some((slot, frame)) = self.open_frame.take() {
            warn!("Frame {} on slot {} abandoned without end_frame", frame, slot);
        }

        let result = self.begin_recording();
        let slot = self.check(result)?;

        self.frame_number += 1;
        self.open_frame = Some((slot, self.frame_number));
        trace!("Frame {} begun on slot {}", self.frame_number, slot);

        Ok(FrameHandle {
            slot,
            frame_number: self.frame_number,
        })
    }

    fn begin_recording(&mut self) -> RenderResult<usize> {
        self.ring.advance()?;
        let slot = self.ring.current_index();
        self.ring.reset_recording(slot)?;
        self.ring.frame_mut(slot)?.commands_mut().begin()?;
        Ok(slot)
    }

    /// Writes the frame's scene data into its slot and returns the culling
    /// statistics.
    pub fn update_scene(
        &mut self,
        frame: &FrameHandle,
        scene: &mut Scene,
        materials: &mut MaterialRegistry,
    ) -> RenderResult<CullStats> {
        self.ensure_running()?;
        let result = self.validate(frame).and_then(|()| {
            let resources = self.ring.frame(frame.slot)?;
            self.updater
                .update(resources, frame.frame_number, scene, materials)
        });
        let update = self.check(result)?;

        self.last_snapshot = Some(update.snapshot);
        Ok(update.cull)
    }

    /// Records draws with `record`, then submits the frame.
    ///
    /// Returns the fence value stamped on the slot.
    pub fn end_frame<F>(&mut self, frame: FrameHandle, record: F) -> RenderResult<u64>
    where
        F: FnOnce(&mut DrawContext<'_, D>) -> RenderResult<()>,
    {
        self.ensure_running()?;
        let result = self.validate(&frame).and_then(|()| {
            let resources = self.ring.frame_mut(frame.slot)?;
            record(&mut DrawContext {
                frame: &mut *resources,
            })?;
            resources.commands_mut().end()?;
            self.ring.submit_and_stamp(frame.slot)
        });
        let value = self.check(result)?;

        self.open_frame = None;
        trace!("Frame {} submitted with fence value {}", frame.frame_number, value);
        Ok(value)
    }

    /// Changes the render target size after draining the GPU.
    ///
    /// A zero extent (minimized window) is ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.ensure_running()?;
        if width == 0 || height == 0 {
            debug!("Ignoring resize to {}x{}", width, height);
            return Ok(());
        }
        let result = self.ring.flush();
        self.check(result)?;

        self.updater.resize(width, height);
        info!("Resized to {}x{}", width, height);
        Ok(())
    }

    pub fn set_culling_enabled(&mut self, enabled: bool) {
        if enabled != self.updater.culling_enabled() {
            warn!(
                "Frustum culling {}",
                if enabled { "enabled" } else { "disabled" }
            );
        }
        self.updater.set_culling_enabled(enabled);
    }

    /// Flips frustum culling and returns the new setting.
    pub fn toggle_culling(&mut self) -> bool {
        let enabled = !self.updater.culling_enabled();
        self.set_culling_enabled(enabled);
        enabled
    }

    #[inline]
    pub fn culling_enabled(&self) -> bool {
        self.updater.culling_enabled()
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        self.updater.camera()
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        self.updater.camera_mut()
    }

    /// Waits for the GPU and stops the renderer.
    pub fn shutdown(&mut self) -> RenderResult<()> {
        self.ensure_running()?;
        let result = self.ring.flush();
        self.check(result)?;

        self.halted = Some("renderer shut down".to_string());
        info!("Renderer shut down after {} frames", self.frame_number);
        Ok(())
    }

    /// Submitted frames the GPU has not completed.
    pub fn in_flight(&self) -> RenderResult<u64> {
        self.ring.in_flight()
    }

    /// Number of the last frame begun.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.ring.frame_count()
    }

    /// Resources of ring slot `slot`.
    pub fn frame(&self, slot: usize) -> RenderResult<&FrameResources<D>> {
        self.ring.frame(slot)
    }

    #[inline]
    pub fn ring(&self) -> &FrameRing<D> {
        &self.ring
    }

    /// Snapshot of the last successful scene update.
    #[inline]
    pub fn last_snapshot(&self) -> Option<&FrameSnapshot> {
        self.last_snapshot.as_ref()
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    fn ensure_running(&self) -> RenderResult<()> {
        match &self.halted {
            Some(reason) => Err(RenderError::Halted(reason.clone())),
            None => Ok(()),
        }
    }

    fn validate(&self, frame: &FrameHandle) -> RenderResult<()> {
        match self.open_frame {
            Some(open) if open == (frame.slot, frame.frame_number) => Ok(()),
            _ => Err(RenderError::StaleFrame {
                slot: frame.slot,
                frame: frame.frame_number,
            }),
        }
    }

    /// Halts the renderer if `result` is a fatal error.
    fn check<T>(&mut self, result: RenderResult<T>) -> RenderResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                error!("Fatal render error, halting: {}", err);
                self.halted = Some(err.to_string());
                self.open_frame = None;
            }
        }
        result
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        if self.halted.is_none() {
            if let Ok(pending) = self.ring.in_flight() {
                if pending > 0 {
                    warn!(
                        "Renderer dropped with {} frames in flight, call shutdown() first",
                        pending
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cullframe_rhi::headless::HeadlessDevice;
    use cullframe_rhi::{CommandState, RhiError};

    fn renderer(device: &Arc<HeadlessDevice>) -> Renderer<HeadlessDevice> {
        let config = RendererConfig::default();
        let materials = MaterialRegistry::new(config.frame_resource_count);
        Renderer::new(Arc::clone(device), &config, &Scene::new(), &materials).unwrap()
    }

    #[test]
    fn test_frame_handles_cycle_slots() {
        let device = Arc::new(HeadlessDevice::manual());
        let mut renderer = renderer(&device);

        for expected in 0..3 {
            let frame = renderer.begin_frame().unwrap();
            assert_eq!(frame.slot(), expected);
            assert_eq!(frame.frame_number(), expected as u64 + 1);
            renderer.end_frame(frame, |_| Ok(())).unwrap();
        }
        assert_eq!(renderer.in_flight().unwrap(), 3);
    }

    #[test]
    fn test_abandoned_handle_is_stale() {
        let device = Arc::new(HeadlessDevice::manual());
        let mut renderer = renderer(&device);

        let first = renderer.begin_frame().unwrap();
        let _second = renderer.begin_frame().unwrap();

        let err = renderer.end_frame(first, |_| Ok(())).unwrap_err();
        assert!(matches!(err, RenderError::StaleFrame { slot: 0, frame: 1 }));
        assert!(renderer.is_halted());
    }

    #[test]
    fn test_halted_renderer_rejects_calls() {
        let device = Arc::new(HeadlessDevice::manual());
        let mut renderer = renderer(&device);

        device.lose_device("test");
        let frame = renderer.begin_frame().unwrap();
        let err = renderer.end_frame(frame, |_| Ok(())).unwrap_err();
        assert!(matches!(err, RenderError::Rhi(RhiError::DeviceLost(_))));

        assert!(matches!(renderer.begin_frame(), Err(RenderError::Halted(_))));
        assert!(matches!(renderer.resize(10, 10), Err(RenderError::Halted(_))));
    }

    #[test]
    fn test_failed_recording_halts() {
        let device = Arc::new(HeadlessDevice::manual());
        let mut renderer = renderer(&device);

        let frame = renderer.begin_frame().unwrap();
        let err = renderer
            .end_frame(frame, |draw| {
                draw.frame().commands_mut().end()?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::Rhi(RhiError::InvalidCommandState {
                actual: CommandState::Executable,
                ..
            })
        ));
        assert!(renderer.is_halted());
    }

    #[test]
    fn test_toggle_culling() {
        let device = Arc::new(HeadlessDevice::manual());
        let mut renderer = renderer(&device);

        assert!(renderer.culling_enabled());
        assert!(!renderer.toggle_culling());
        assert!(renderer.toggle_culling());
    }

    #[test]
    fn test_resize_flushes_and_updates_camera() {
        let device = Arc::new(HeadlessDevice::threaded(std::time::Duration::from_millis(1)));
        let mut renderer = renderer(&device);

        let frame = renderer.begin_frame().unwrap();
        renderer.end_frame(frame, |_| Ok(())).unwrap();
        renderer.resize(1000, 500).unwrap();

        assert_eq!(renderer.in_flight().unwrap(), 0);
        let proj = renderer.camera().projection_matrix();
        assert!((proj.y_axis.y / proj.x_axis.x - 2.0).abs() < 1e-4);

        // Zero extent is ignored.
        renderer.resize(0, 500).unwrap();
        let proj = renderer.camera().projection_matrix();
        assert!((proj.y_axis.y / proj.x_axis.x - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_ring_depth_must_match_registry() {
        let device = Arc::new(HeadlessDevice::manual());
        let config = RendererConfig::default();
        let materials = MaterialRegistry::new(2);

        let err = Renderer::new(device, &config, &Scene::new(), &materials)
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::RingDepthMismatch {
                registry: 2,
                ring: 3
            }
        ));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_shutdown_stops_renderer() {
        let device = Arc::new(HeadlessDevice::threaded(std::time::Duration::from_millis(1)));
        let mut renderer = renderer(&device);

        renderer.shutdown().unwrap();
        assert!(matches!(renderer.begin_frame(), Err(RenderError::Halted(_))));
    }
}
