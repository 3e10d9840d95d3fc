//! Axis-aligned bounding boxes.

use glam::{Mat4, Vec3};

/// An axis-aligned box stored as center and half-extents.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub center: Vec3,
    /// Half the edge length along each axis. Never negative.
    pub extents: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self {
            center: Vec3::ZERO,
            extents: Vec3::ZERO,
        }
    }
}

impl Aabb {
    #[inline]
    pub fn new(center: Vec3, extents: Vec3) -> Self {
        Self {
            center,
            extents: extents.abs(),
        }
    }

    /// Box spanning `min` to `max`. The corners may be given in any order.
    pub fn from_min_max(min: Vec3, max: Vec3) -> Self {
        let (lo, hi) = (min.min(max), min.max(max));
        Self {
            center: (lo + hi) * 0.5,
            extents: (hi - lo) * 0.5,
        }
    }

    #[inline]
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    #[inline]
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// The eight corners; bit 0/1/2 of the index selects +x/+y/+z.
    pub fn corners(&self) -> [Vec3; 8] {
        std::array::from_fn(|i| {
            let sign = Vec3::new(
                if i & 1 == 0 { -1.0 } else { 1.0 },
                if i & 2 == 0 { -1.0 } else { 1.0 },
                if i & 4 == 0 { -1.0 } else { 1.0 },
            );
            self.center + self.extents * sign
        })
    }

    /// True if `point` lies inside or on the boundary.
    pub fn contains_point(&self, point: Vec3) -> bool {
        let d = (point - self.center).abs();
        d.cmple(self.extents).all()
    }

    /// Bounding box of this box after an affine transform.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let center = matrix.transform_point3(self.center);
        let extents = Vec3::new(
            matrix.row(0).truncate().abs().dot(self.extents),
            matrix.row(1).truncate().abs().dot(self.extents),
            matrix.row(2).truncate().abs().dot(self.extents),
        );
        Self { center, extents }
    }
}
