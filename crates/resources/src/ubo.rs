//! GPU constant buffer structures.
//!
//! All structures use `#[repr(C)]` for a fixed memory layout and implement
//! `bytemuck::Pod` and `bytemuck::Zeroable` so they can be copied straight
//! into upload buffers.
//!
//! # Matrix Convention
//!
//! Shaders multiply row vectors (`mul(v, M)`), so every matrix is stored
//! transposed relative to glam's column-vector convention. The `new`
//! constructors take glam matrices and transpose them.
//!
//! # Overview
//!
//! - [`PassConstants`] - camera, render target, timing, and lights; one per frame
//! - [`MaterialConstants`] - surface parameters; one element per material
//! - [`InstanceConstants`] - per-instance transforms; one element per visible instance
//! - [`Light`] - a directional, point, or spot light
//!
//! # Example
//!
//! ```
//! use cullframe_resources::ubo::InstanceConstants;
//! use glam::{Mat4, Vec3};
//!
//! let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
//! let instance = InstanceConstants::new(world, Mat4::IDENTITY, 4);
//!
//! assert_eq!(instance.world, world.transpose());
//! let bytes: &[u8] = bytemuck::bytes_of(&instance);
//! assert_eq!(bytes.len(), 144);
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Number of light slots in [`PassConstants`].
pub const MAX_LIGHTS: usize = 16;

/// Light source parameters.
///
/// Directional lights use `direction` and `strength`; point lights add
/// `position` and the falloff range; spot lights use all fields.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 12   | strength |
/// | 12     | 4    | falloff_start |
/// | 16     | 12   | direction |
/// | 28     | 4    | falloff_end |
/// | 32     | 12   | position |
/// | 44     | 4    | spot_power |
///
/// Total size: 48 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Light {
    /// Light color and intensity.
    pub strength: Vec3,
    /// Distance at which attenuation begins (point/spot).
    pub falloff_start: f32,
    /// Direction the light travels (directional/spot).
    pub direction: Vec3,
    /// Distance at which the light reaches zero (point/spot).
    pub falloff_end: f32,
    /// World position (point/spot).
    pub position: Vec3,
    /// Spot cone exponent.
    pub spot_power: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            strength: Vec3::splat(0.5),
            falloff_start: 1.0,
            direction: Vec3::NEG_Y,
            falloff_end: 10.0,
            position: Vec3::ZERO,
            spot_power: 64.0,
        }
    }
}

impl Light {
    /// Creates a directional light.
    #[inline]
    pub fn directional(direction: Vec3, strength: Vec3) -> Self {
        Self {
            direction,
            strength,
            ..Default::default()
        }
    }
}

/// Per-pass constants.
///
/// # Memory Layout
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 384  | view, inv_view, proj, inv_proj, view_proj, inv_view_proj |
/// | 384    | 12   | eye_pos_w |
/// | 396    | 4    | _padding |
/// | 400    | 8    | render_target_size |
/// | 408    | 8    | inv_render_target_size |
/// | 416    | 16   | near_z, far_z, total_time, delta_time |
/// | 432    | 16   | ambient_light |
/// | 448    | 768  | lights |
///
/// Total size: 1216 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    pub view: Mat4,
    pub inv_view: Mat4,
    pub proj: Mat4,
    pub inv_proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    /// Camera position in world space.
    pub eye_pos_w: Vec3,
    pub _padding: f32,
    pub render_target_size: Vec2,
    pub inv_render_target_size: Vec2,
    pub near_z: f32,
    pub far_z: f32,
    pub total_time: f32,
    pub delta_time: f32,
    pub ambient_light: Vec4,
    pub lights: [Light; MAX_LIGHTS],
}

impl Default for PassConstants {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            inv_view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            inv_proj: Mat4::IDENTITY,
            view_proj: Mat4::IDENTITY,
            inv_view_proj: Mat4::IDENTITY,
            eye_pos_w: Vec3::ZERO,
            _padding: 0.0,
            render_target_size: Vec2::ZERO,
            inv_render_target_size: Vec2::ZERO,
            near_z: 0.0,
            far_z: 0.0,
            total_time: 0.0,
            delta_time: 0.0,
            ambient_light: Vec4::new(0.0, 0.0, 0.0, 1.0),
            lights: [Light::default(); MAX_LIGHTS],
        }
    }
}

impl PassConstants {
    /// Fills the camera matrices from column-vector `view` and `proj`.
    ///
    /// Inverses of singular matrices are not checked here; callers validate
    /// the camera first.
    pub fn set_camera(&mut self, view: Mat4, proj: Mat4, eye: Vec3) {
        let view_proj = proj * view;
        self.view = view.transpose();
        self.inv_view = view.inverse().transpose();
        self.proj = proj.transpose();
        self.inv_proj = proj.inverse().transpose();
        self.view_proj = view_proj.transpose();
        self.inv_view_proj = view_proj.inverse().transpose();
        self.eye_pos_w = eye;
    }

    /// Sets the render target size and its reciprocal.
    pub fn set_render_target_size(&mut self, width: u32, height: u32) {
        let size = Vec2::new(width as f32, height as f32);
        self.render_target_size = size;
        self.inv_render_target_size = size.recip();
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Per-material constants.
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 16   | diffuse_albedo |
/// | 16     | 12   | fresnel_r0 |
/// | 28     | 4    | roughness |
/// | 32     | 64   | mat_transform |
/// | 96     | 4    | diffuse_map_index |
/// | 100    | 12   | _padding |
///
/// Total size: 112 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialConstants {
    pub diffuse_albedo: Vec4,
    pub fresnel_r0: Vec3,
    pub roughness: f32,
    /// Texture coordinate transform, stored transposed.
    pub mat_transform: Mat4,
    pub diffuse_map_index: u32,
    pub _padding: [u32; 3],
}

impl Default for MaterialConstants {
    fn default() -> Self {
        Self {
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            mat_transform: Mat4::IDENTITY,
            diffuse_map_index: 0,
            _padding: [0; 3],
        }
    }
}

impl MaterialConstants {
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Per-instance data read by the vertex shader through `SV_InstanceID`.
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | world |
/// | 64     | 64   | tex_transform |
/// | 128    | 4    | material_index |
/// | 132    | 12   | _padding |
///
/// Total size: 144 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceConstants {
    /// Object-to-world transform, stored transposed.
    pub world: Mat4,
    /// Texture coordinate transform, stored transposed.
    pub tex_transform: Mat4,
    /// Index into the material constant array.
    pub material_index: u32,
    pub _padding: [u32; 3],
}

impl Default for InstanceConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, 0)
    }
}

impl InstanceConstants {
    /// Creates instance constants from column-vector matrices.
    #[inline]
    pub fn new(world: Mat4, tex_transform: Mat4, material_index: u32) -> Self {
        Self {
            world: world.transpose(),
            tex_transform: tex_transform.transpose(),
            material_index,
            _padding: [0; 3],
        }
    }

    /// World matrix in glam's column-vector convention.
    #[inline]
    pub fn world_matrix(&self) -> Mat4 {
        self.world.transpose()
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_light_size() {
        // 3 x (Vec3 + f32) = 48 bytes
        assert_eq!(size_of::<Light>(), 48);
        assert!(align_of::<Light>() >= 4);
    }

    #[test]
    fn test_pass_constants_size() {
        // 6 Mat4 (384) + 16 + 16 + 16 + 16 + 16 lights (768)
        assert_eq!(size_of::<PassConstants>(), 1216);
        assert_eq!(PassConstants::size(), 1216);
    }

    #[test]
    fn test_material_constants_size() {
        assert_eq!(size_of::<MaterialConstants>(), 112);
        assert_eq!(MaterialConstants::size(), 112);
    }

    #[test]
    fn test_instance_constants_size() {
        assert_eq!(size_of::<InstanceConstants>(), 144);
        assert_eq!(InstanceConstants::size(), 144);
        assert!(align_of::<InstanceConstants>() >= 4);
    }

    #[test]
    fn test_instance_constants_store_transposed() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let tex = Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));
        let instance = InstanceConstants::new(world, tex, 5);

        // Row-major: translation lands in the last row.
        assert_eq!(instance.world.row(3), Vec4::new(1.0, 2.0, 3.0, 1.0));
        assert_eq!(instance.world_matrix(), world);
        assert_eq!(instance.tex_transform, tex.transpose());
        assert_eq!(instance.material_index, 5);
    }

    #[test]
    fn test_pass_constants_camera() {
        let eye = Vec3::new(0.0, 2.0, -5.0);
        let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 1.0, 1000.0);

        let mut pass = PassConstants::default();
        pass.set_camera(view, proj, eye);

        assert_eq!(pass.view, view.transpose());
        assert_eq!(pass.view_proj, (proj * view).transpose());
        assert_eq!(pass.eye_pos_w, eye);

        let identity = pass.view.transpose() * pass.inv_view.transpose();
        assert!(identity.abs_diff_eq(Mat4::IDENTITY, 1e-4));
    }

    #[test]
    fn test_render_target_size() {
        let mut pass = PassConstants::default();
        pass.set_render_target_size(800, 400);

        assert_eq!(pass.render_target_size, Vec2::new(800.0, 400.0));
        assert_eq!(pass.inv_render_target_size, Vec2::new(1.0 / 800.0, 1.0 / 400.0));
    }

    #[test]
    fn test_directional_light() {
        let light = Light::directional(Vec3::new(0.0, -0.707, -0.707), Vec3::splat(0.15));
        assert_eq!(light.strength, Vec3::splat(0.15));
        assert_eq!(light.falloff_end, 10.0);
    }
}
