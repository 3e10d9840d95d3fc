//! Per-frame scene update.
//!
//! [`SceneUpdater`] owns the camera and turns it into an immutable
//! [`FrameSnapshot`] once per frame. The snapshot drives everything written
//! into the current slot: pass constants, dirty materials, and the culled
//! instance list.

use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, warn};

use cullframe_core::{FrameTiming, Timer};
use cullframe_resources::MaterialRegistry;
use cullframe_resources::ubo::{Light, MAX_LIGHTS, PassConstants};
use cullframe_rhi::Device;
use cullframe_scene::{
    Camera, DEMO_AMBIENT_LIGHT, DirectionalLight, Frustum, Scene, SceneResult, checked_inverse,
};

use crate::culler::{CullStats, InstanceCuller};
use crate::error::{RenderError, RenderResult};
use crate::frame_resources::FrameResources;

/// Camera and screen state sampled at the start of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSnapshot {
    pub frame_number: u64,
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    /// Camera position in world space.
    pub eye: Vec3,
    /// Frustum of `proj` in view space.
    pub view_frustum: Frustum,
    pub near_z: f32,
    pub far_z: f32,
    pub width: u32,
    pub height: u32,
    pub timing: FrameTiming,
    pub culling_enabled: bool,
}

impl FrameSnapshot {
    /// Builds a snapshot directly from a camera, with zero timing.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::SingularMatrix`](cullframe_scene::SceneError::SingularMatrix)
    /// if the view or projection cannot be inverted.
    pub fn from_camera(
        camera: &Camera,
        frame_number: u64,
        width: u32,
        height: u32,
        culling_enabled: bool,
    ) -> SceneResult<Self> {
        let proj = camera.projection_matrix();
        let view_frustum = Frustum::from_projection(&proj)?;
        Self::capture(
            camera,
            proj,
            view_frustum,
            frame_number,
            (width, height),
            FrameTiming::default(),
            culling_enabled,
        )
    }

    fn capture(
        camera: &Camera,
        proj: Mat4,
        view_frustum: Frustum,
        frame_number: u64,
        (width, height): (u32, u32),
        timing: FrameTiming,
        culling_enabled: bool,
    ) -> SceneResult<Self> {
        let view = camera.view_matrix();
        let inv_view = checked_inverse(&view, "view")?;
        Ok(Self {
            frame_number,
            view,
            inv_view,
            proj,
            eye: camera.position,
            view_frustum,
            near_z: camera.projection.near(),
            far_z: camera.projection.far(),
            width,
            height,
            timing,
            culling_enabled,
        })
    }

    /// Pass constants for this snapshot with the given lighting.
    ///
    /// Light slots past `lights` keep their defaults.
    pub fn pass_constants(&self, ambient_light: Vec4, lights: &[Light]) -> PassConstants {
        let mut pass = PassConstants::default();
        pass.set_camera(self.view, self.proj, self.eye);
        pass.set_render_target_size(self.width, self.height);
        pass.near_z = self.near_z;
        pass.far_z = self.far_z;
        pass.total_time = self.timing.total_secs;
        pass.delta_time = self.timing.delta_secs;
        pass.ambient_light = ambient_light;
        for (slot, light) in pass.lights.iter_mut().zip(lights) {
            *slot = *light;
        }
        pass
    }
}

/// What one scene update wrote into the current slot.
#[derive(Clone, Debug)]
pub struct FrameUpdate {
    pub snapshot: FrameSnapshot,
    pub cull: CullStats,
    /// Number of material blocks written.
    pub materials_written: usize,
}

/// Camera owner and writer of per-frame scene data.
pub struct SceneUpdater {
    camera: Camera,
    /// Projection the cached frustum was built from.
    projection: Mat4,
    view_frustum: Frustum,
    width: u32,
    height: u32,
    culling_enabled: bool,
    culler: InstanceCuller,
    ambient_light: Vec4,
    lights: Vec<Light>,
    timer: Timer,
}

impl SceneUpdater {
    /// Creates an updater lit by the demo ambient term and three-light rig.
    ///
    /// # Errors
    ///
    /// Returns an error if the camera projection cannot be inverted.
    pub fn new(
        camera: Camera,
        width: u32,
        height: u32,
        culling_enabled: bool,
        parallel_culling: bool,
    ) -> RenderResult<Self> {
        let projection = camera.projection_matrix();
        let view_frustum = Frustum::from_projection(&projection)?;
        Ok(Self {
            camera,
            projection,
            view_frustum,
            width,
            height,
            culling_enabled,
            culler: InstanceCuller::new(parallel_culling),
            ambient_light: DEMO_AMBIENT_LIGHT,
            lights: DirectionalLight::demo_rig().iter().map(DirectionalLight::to_gpu).collect(),
            timer: Timer::new(),
        })
    }

    #[inline]
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Updates the screen size and the camera aspect ratio.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.camera
            .set_aspect(self.width as f32 / self.height as f32);
    }

    #[inline]
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn culling_enabled(&self) -> bool {
        self.culling_enabled
    }

    pub fn set_culling_enabled(&mut self, enabled: bool) {
        self.culling_enabled = enabled;
    }

    #[inline]
    pub fn culler(&self) -> &InstanceCuller {
        &self.culler
    }

    pub fn set_ambient_light(&mut self, ambient: Vec4) {
        self.ambient_light = ambient;
    }

    /// Replaces the scene lights. Extra lights past the pass constant slots
    /// are dropped.
    pub fn set_lights(&mut self, lights: impl IntoIterator<Item = Light>) {
        self.lights = lights.into_iter().collect();
        if self.lights.len() > MAX_LIGHTS {
            warn!(
                "{} lights given, only the first {} are used",
                self.lights.len(),
                MAX_LIGHTS
            );
            self.lights.truncate(MAX_LIGHTS);
        }
    }

    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Samples the camera and timer for frame `frame_number`.
    ///
    /// The view frustum is rebuilt only if the projection changed since the
    /// previous snapshot.
    pub fn snapshot(&mut self, frame_number: u64) -> RenderResult<FrameSnapshot> {
        let projection = self.camera.projection_matrix();
        if projection != self.projection {
            self.view_frustum = Frustum::from_projection(&projection)?;
            self.projection = projection;
            debug!("Projection changed, rebuilt view frustum");
        }

        let timing = self.timer.tick();
        Ok(FrameSnapshot::capture(
            &self.camera,
            self.projection,
            self.view_frustum,
            frame_number,
            (self.width, self.height),
            timing,
            self.culling_enabled,
        )?)
    }

    /// Writes pass constants, dirty materials, and culled instances for
    /// `frame_number` into `frame`.
    ///
    /// # Errors
    ///
    /// Fails before writing anything if the registry holds more materials
    /// than `frame` has blocks for. Otherwise stops at the first failure;
    /// a material is only marked current in the slot once its block was
    /// written.
    pub fn update<D: Device>(
        &mut self,
        frame: &FrameResources<D>,
        frame_number: u64,
        scene: &mut Scene,
        materials: &mut MaterialRegistry,
    ) -> RenderResult<FrameUpdate> {
        let capacity = frame.material_constants().len();
        if materials.len() > capacity {
            return Err(RenderError::MaterialCapacityExceeded {
                required: materials.len(),
                capacity,
            });
        }

        let snapshot = self.snapshot(frame_number)?;

        frame.update_pass_constants(&snapshot.pass_constants(self.ambient_light, &self.lights))?;

        let materials_written = materials.write_dirty(frame.slot(), |handle, constants| {
            frame.update_material_constants(handle.index(), constants)
        })?;

        let cull = self.culler.cull(&snapshot, scene, frame)?;

        Ok(FrameUpdate {
            snapshot,
            cull,
            materials_written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cullframe_resources::Material;
    use cullframe_rhi::headless::HeadlessDevice;
    use cullframe_scene::SceneError;
    use std::f32::consts::FRAC_PI_2;

    fn updater() -> SceneUpdater {
        SceneUpdater::new(Camera::new(), 800, 600, true, false).unwrap()
    }

    #[test]
    fn test_snapshot_matches_camera() {
        let mut updater = updater();
        updater.camera_mut().position = Vec3::new(1.0, 2.0, 3.0);

        let snapshot = updater.snapshot(5).unwrap();
        assert_eq!(snapshot.frame_number, 5);
        assert_eq!(snapshot.eye, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(snapshot.view, updater.camera().view_matrix());
        assert!((snapshot.view * snapshot.inv_view).abs_diff_eq(Mat4::IDENTITY, 1e-5));
        assert_eq!((snapshot.near_z, snapshot.far_z), (1.0, 1000.0));
        assert!(snapshot.culling_enabled);
    }

    #[test]
    fn test_frustum_follows_projection_changes() {
        let mut updater = updater();
        let before = updater.snapshot(1).unwrap().view_frustum;

        updater
            .camera_mut()
            .set_perspective(FRAC_PI_2, 1.0, 1.0, 1000.0);
        let after = updater.snapshot(2).unwrap().view_frustum;

        assert_ne!(before, after);
        let expected = Frustum::from_projection(&updater.camera().projection_matrix()).unwrap();
        assert_eq!(after, expected);
    }

    #[test]
    fn test_resize_updates_aspect() {
        let mut updater = updater();
        updater.resize(1920, 1080);

        let snapshot = updater.snapshot(1).unwrap();
        assert_eq!((snapshot.width, snapshot.height), (1920, 1080));
        let ratio = snapshot.proj.y_axis.y / snapshot.proj.x_axis.x;
        assert!((ratio - 1920.0 / 1080.0).abs() < 1e-4);
    }

    #[test]
    fn test_singular_view_is_fatal() {
        let mut updater = updater();
        updater.camera_mut().rotation = glam::Quat::from_xyzw(0.0, 0.0, 0.0, 0.0);

        let err = updater.snapshot(1).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            crate::error::RenderError::Scene(SceneError::SingularMatrix(_))
        ));
    }

    #[test]
    fn test_pass_constants_carry_lights() {
        let updater = updater();
        let snapshot = FrameSnapshot::from_camera(updater.camera(), 1, 800, 600, true).unwrap();
        let pass = snapshot.pass_constants(DEMO_AMBIENT_LIGHT, updater.lights());

        assert_eq!(pass.ambient_light, DEMO_AMBIENT_LIGHT);
        assert_eq!(pass.lights[0].strength, Vec3::splat(0.6));
        assert_eq!(pass.lights[2].strength, Vec3::splat(0.15));
        assert_eq!(pass.lights[3], Light::default());
        assert_eq!(pass.render_target_size, glam::Vec2::new(800.0, 600.0));
        assert_eq!(pass.view, snapshot.view.transpose());
    }

    #[test]
    fn test_set_lights_truncates() {
        let mut updater = updater();
        updater.set_lights(std::iter::repeat_n(Light::default(), MAX_LIGHTS + 4));
        assert_eq!(updater.lights().len(), MAX_LIGHTS);
    }

    #[test]
    fn test_update_writes_dirty_materials_once_per_frame() {
        let device = HeadlessDevice::manual();
        let frame = FrameResources::new(&device, 0, 2, 0).unwrap();
        let mut materials = MaterialRegistry::new(3);
        let handles = materials
            .register_all(Material::demo_set().into_iter().take(2))
            .unwrap();
        let mut scene = Scene::new();
        let mut updater = updater();

        let update = updater.update(&frame, 1, &mut scene, &mut materials).unwrap();
        assert_eq!(update.materials_written, 2);
        assert_eq!(materials.frames_dirty(handles[0]).unwrap(), 2);
        assert_eq!(
            frame.material_constants().read(1).unwrap(),
            materials.get(handles[1]).unwrap().to_constants()
        );
        assert_eq!(update.cull.total, 0);

        // Same slot again: nothing left to write there.
        let update = updater.update(&frame, 2, &mut scene, &mut materials).unwrap();
        assert_eq!(update.materials_written, 0);
        assert_eq!(materials.frames_dirty(handles[0]).unwrap(), 2);
    }

    #[test]
    fn test_update_rejects_unsized_material() {
        let device = HeadlessDevice::manual();
        let frame = FrameResources::new(&device, 0, 1, 0).unwrap();
        let mut materials = MaterialRegistry::new(3);
        materials
            .register_all(Material::demo_set().into_iter().take(2))
            .unwrap();
        let mut scene = Scene::new();
        let mut updater = updater();

        let err = updater
            .update(&frame, 1, &mut scene, &mut materials)
            .unwrap_err();
        assert!(matches!(
            err,
            RenderError::MaterialCapacityExceeded {
                required: 2,
                capacity: 1
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(frame.pass_constants().read(0).unwrap().far_z, 0.0);
    }
}
