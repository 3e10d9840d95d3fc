//! View frustum and containment tests.
//!
//! A [`Frustum`] is six inward-facing planes plus its eight corners. It is
//! built once from a projection matrix (view space) and then moved into any
//! other space with [`Frustum::transformed`], which is how per-instance
//! culling tests a box in the instance's own local space instead of moving
//! the box into view space.
//!
//! # Example
//!
//! ```
//! use cullframe_scene::{Aabb, Containment, Frustum};
//! use glam::{Mat4, Vec3};
//!
//! let proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 1.0, 1000.0);
//! let frustum = Frustum::from_projection(&proj).unwrap();
//!
//! let ahead = Aabb::new(Vec3::new(0.0, 0.0, -10.0), Vec3::splat(0.5));
//! let behind = Aabb::new(Vec3::new(0.0, 0.0, 10.0), Vec3::splat(0.5));
//! assert_eq!(frustum.contains_aabb(&ahead), Containment::Contains);
//! assert_eq!(frustum.contains_aabb(&behind), Containment::Disjoint);
//! ```

use glam::{Mat4, Vec3, Vec4};

use crate::bounds::Aabb;
use crate::error::{SceneError, SceneResult};

/// Determinants at or below this magnitude are treated as singular.
const SINGULAR_EPSILON: f32 = 1e-12;

/// Inverts `matrix`, failing if it is singular or not finite.
///
/// `what` names the matrix in the error.
pub fn checked_inverse(matrix: &Mat4, what: &'static str) -> SceneResult<Mat4> {
    let det = matrix.determinant();
    if !det.is_finite() || det.abs() <= SINGULAR_EPSILON {
        return Err(SceneError::SingularMatrix(what));
    }
    Ok(matrix.inverse())
}

/// A plane `normal · p + d = 0`. Points with positive distance are inside.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub d: f32,
}

impl Plane {
    #[inline]
    pub fn new(normal: Vec3, d: f32) -> Self {
        Self { normal, d }
    }

    #[inline]
    fn from_vec4(v: Vec4) -> Self {
        Self {
            normal: v.truncate(),
            d: v.w,
        }
    }

    #[inline]
    fn to_vec4(self) -> Vec4 {
        self.normal.extend(self.d)
    }

    /// Rescales so the normal has unit length. Degenerate planes are returned as-is.
    pub fn normalized(self) -> Self {
        let len = self.normal.length();
        if len > 0.0 && len.is_finite() {
            Self {
                normal: self.normal / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }

    /// Plane after points are moved by some matrix `M`, given `(M⁻¹)ᵀ`.
    pub fn transformed(&self, inverse_transpose: &Mat4) -> Self {
        Self::from_vec4(*inverse_transpose * self.to_vec4()).normalized()
    }
}

/// Result of a containment test.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Containment {
    /// No overlap.
    Disjoint,
    /// Partial overlap, or overlap that could not be ruled out.
    Intersects,
    /// Fully inside.
    Contains,
}

/// Six planes and eight corners of a view volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Frustum {
    /// Inward-facing, in [`Frustum::LEFT`]..=[`Frustum::FAR`] order.
    pub planes: [Plane; 6],
    /// Bit 0/1/2 of the index selects right/top/far corners.
    pub corners: [Vec3; 8],
}

impl Frustum {
    pub const LEFT: usize = 0;
    pub const RIGHT: usize = 1;
    pub const BOTTOM: usize = 2;
    pub const TOP: usize = 3;
    pub const NEAR: usize = 4;
    pub const FAR: usize = 5;

    /// View-space frustum of a projection with `[0, 1]` clip depth.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::SingularMatrix`] if the projection cannot be inverted.
    pub fn from_projection(proj: &Mat4) -> SceneResult<Self> {
        Self::from_clip_matrix(proj, "projection")
    }

    /// World-space frustum of `proj * view`.
    pub fn from_view_projection(view_proj: &Mat4) -> SceneResult<Self> {
        Self::from_clip_matrix(view_proj, "view-projection")
    }

    fn from_clip_matrix(m: &Mat4, what: &'static str) -> SceneResult<Self> {
        let inverse = checked_inverse(m, what)?;
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));

        // Clip-space inequalities -w <= x <= w, -w <= y <= w, 0 <= z <= w.
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2]
            .map(|v| Plane::from_vec4(v).normalized());

        let corners = std::array::from_fn(|i| {
            let ndc = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { 0.0 } else { 1.0 },
            );
            inverse.project_point3(ndc)
        });

        Ok(Self { planes, corners })
    }

    /// Frustum after points are moved by `matrix`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::SingularMatrix`] if `matrix` cannot be inverted.
    pub fn transformed(&self, matrix: &Mat4) -> SceneResult<Self> {
        let inverse = checked_inverse(matrix, "frustum transform")?;
        Ok(self.transformed_with_inverse(matrix, &inverse))
    }

    /// Like [`transformed`](Self::transformed) when the caller already has the inverse.
    pub fn transformed_with_inverse(&self, matrix: &Mat4, inverse: &Mat4) -> Self {
        let inverse_transpose = inverse.transpose();
        Self {
            planes: self.planes.map(|p| p.transformed(&inverse_transpose)),
            corners: self.corners.map(|c| matrix.transform_point3(c)),
        }
    }

    /// True if `point` is inside or on every plane.
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// Conservative box test.
    ///
    /// Never reports `Disjoint` for a box that overlaps the frustum. A box
    /// that is outside but close to an edge may report `Intersects`.
    pub fn contains_aabb(&self, aabb: &Aabb) -> Containment {
        let mut inside_all = true;
        for plane in &self.planes {
            let distance = plane.signed_distance(aabb.center);
            let radius = plane.normal.abs().dot(aabb.extents);
            if distance < -radius {
                return Containment::Disjoint;
            }
            if distance < radius {
                inside_all = false;
            }
        }
        if inside_all {
            return Containment::Contains;
        }

        // Box faces as separating axes: all frustum corners beyond one face.
        let (min, max) = (aabb.min(), aabb.max());
        for axis in 0..3 {
            if self.corners.iter().all(|c| c[axis] > max[axis])
                || self.corners.iter().all(|c| c[axis] < min[axis])
            {
                return Containment::Disjoint;
            }
        }

        Containment::Intersects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < EPSILON
    }

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        approx_eq(a.x, b.x) && approx_eq(a.y, b.y) && approx_eq(a.z, b.z)
    }

    fn square_frustum() -> Frustum {
        let proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 1.0, 100.0);
        Frustum::from_projection(&proj).unwrap()
    }

    fn unit_box(center: Vec3) -> Aabb {
        Aabb::new(center, Vec3::splat(0.5))
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = square_frustum();
        for plane in frustum.planes {
            assert!(approx_eq(plane.normal.length(), 1.0));
        }
    }

    #[test]
    fn test_near_and_far_planes() {
        let frustum = square_frustum();
        let near = frustum.planes[Frustum::NEAR];
        let far = frustum.planes[Frustum::FAR];

        assert!(approx_eq(near.signed_distance(Vec3::new(0.0, 0.0, -1.0)), 0.0));
        assert!(approx_eq(far.signed_distance(Vec3::new(0.0, 0.0, -100.0)), 0.0));
        assert!(near.signed_distance(Vec3::new(0.0, 0.0, -2.0)) > 0.0);
        assert!(far.signed_distance(Vec3::new(0.0, 0.0, -101.0)) < 0.0);
    }

    #[test]
    fn test_corners() {
        let frustum = square_frustum();
        // 90 degree FOV, aspect 1: half-width equals depth.
        assert!(approx_eq_vec3(frustum.corners[0], Vec3::new(-1.0, -1.0, -1.0)));
        assert!(approx_eq_vec3(frustum.corners[3], Vec3::new(1.0, 1.0, -1.0)));
        assert!(approx_eq_vec3(
            frustum.corners[7],
            Vec3::new(100.0, 100.0, -100.0)
        ));
    }

    #[test]
    fn test_contains_point() {
        let frustum = square_frustum();
        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
        assert!(frustum.contains_point(Vec3::new(9.0, -9.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(11.0, 0.0, -10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -0.5)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
    }

    #[test]
    fn test_contains_aabb() {
        let frustum = square_frustum();

        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(0.0, 0.0, -10.0))),
            Containment::Contains
        );
        // Straddles the right plane.
        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(10.0, 0.0, -10.0))),
            Containment::Intersects
        );
        // Straddles the near plane.
        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(0.0, 0.0, -1.0))),
            Containment::Intersects
        );
        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(20.0, 0.0, -10.0))),
            Containment::Disjoint
        );
        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(0.0, 0.0, 5.0))),
            Containment::Disjoint
        );
        assert_eq!(
            frustum.contains_aabb(&unit_box(Vec3::new(0.0, 0.0, -200.0))),
            Containment::Disjoint
        );
    }

    #[test]
    fn test_box_enclosing_frustum_intersects() {
        let frustum = square_frustum();
        let huge = Aabb::new(Vec3::ZERO, Vec3::splat(1000.0));
        assert_eq!(frustum.contains_aabb(&huge), Containment::Intersects);
    }

    #[test]
    fn test_corner_refinement_rejects_box_past_far_edge() {
        // Passes every plane test, but every frustum corner lies left of the box.
        let frustum = square_frustum();
        let aabb = Aabb::new(Vec3::new(110.0, 0.0, -110.0), Vec3::splat(9.0));
        assert_eq!(frustum.contains_aabb(&aabb), Containment::Disjoint);
    }

    #[test]
    fn test_transformed_frustum_matches_moved_box() {
        let frustum = square_frustum();
        let world = Mat4::from_translation(Vec3::new(5.0, 0.0, -20.0));
        let local_box = unit_box(Vec3::ZERO);

        // Moving the frustum into the box's local space must agree with
        // moving the box into view space.
        let to_local = world.inverse();
        let local_frustum = frustum.transformed(&to_local).unwrap();
        let view_box = local_box.transformed(&world);

        assert_eq!(
            local_frustum.contains_aabb(&local_box),
            frustum.contains_aabb(&view_box)
        );
        assert_eq!(local_frustum.contains_aabb(&local_box), Containment::Contains);
    }

    #[test]
    fn test_transformed_with_scale_renormalizes() {
        let frustum = square_frustum();
        let to_local = Mat4::from_scale(Vec3::new(0.5, 2.0, 1.0));
        let moved = frustum.transformed(&to_local).unwrap();
        for plane in moved.planes {
            assert!(approx_eq(plane.normal.length(), 1.0));
        }
        assert!(moved.contains_point(to_local.transform_point3(Vec3::new(0.0, 0.0, -10.0))));
    }

    #[test]
    fn test_singular_projection_rejected() {
        let err = Frustum::from_projection(&Mat4::ZERO).unwrap_err();
        assert_eq!(err, SceneError::SingularMatrix("projection"));

        let frustum = square_frustum();
        assert!(frustum.transformed(&Mat4::from_scale(Vec3::ZERO)).is_err());
    }

    #[test]
    fn test_world_space_frustum() {
        let view = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 1.0, 100.0);
        let frustum = Frustum::from_view_projection(&(proj * view)).unwrap();

        assert!(frustum.contains_point(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, -10.0)));
    }
}
