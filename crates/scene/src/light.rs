//! Light definitions for the scene.
//!
//! Scene lights are plain values; [`to_gpu`](DirectionalLight::to_gpu)
//! converts them into the shared [`Light`] slot layout of the pass constants.

use cullframe_resources::ubo::Light;
use glam::{Vec3, Vec4};

/// Ambient term of the instancing demo.
pub const DEMO_AMBIENT_LIGHT: Vec4 = Vec4::new(0.25, 0.25, 0.35, 1.0);

/// A directional light (sun-like).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels
    pub direction: Vec3,
    /// Light color times intensity
    pub strength: Vec3,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::NEG_Y,
            strength: Vec3::ONE,
        }
    }
}

impl DirectionalLight {
    pub fn new(direction: Vec3, strength: Vec3) -> Self {
        Self {
            direction,
            strength,
        }
    }

    pub fn to_gpu(&self) -> Light {
        Light::directional(self.direction.normalize_or_zero(), self.strength)
    }

    /// Key, fill, and back lights of the instancing demo.
    pub fn demo_rig() -> [DirectionalLight; 3] {
        [
            Self::new(Vec3::new(0.57735, -0.57735, 0.57735), Vec3::splat(0.6)),
            Self::new(Vec3::new(-0.57735, -0.57735, 0.57735), Vec3::splat(0.3)),
            Self::new(Vec3::new(0.0, -0.707, -0.707), Vec3::splat(0.15)),
        ]
    }
}

/// A point light (omnidirectional).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointLight {
    /// Light position in world space
    pub position: Vec3,
    pub strength: Vec3,
    /// Distance at which attenuation starts
    pub falloff_start: f32,
    /// Distance at which the light is fully attenuated
    pub falloff_end: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            strength: Vec3::ONE,
            falloff_start: 1.0,
            falloff_end: 10.0,
        }
    }
}

impl PointLight {
    pub fn to_gpu(&self) -> Light {
        Light {
            strength: self.strength,
            falloff_start: self.falloff_start,
            position: self.position,
            falloff_end: self.falloff_end,
            ..Default::default()
        }
    }
}

/// A spot light (cone-shaped).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpotLight {
    pub position: Vec3,
    pub direction: Vec3,
    pub strength: Vec3,
    pub falloff_start: f32,
    pub falloff_end: f32,
    /// Cone exponent; larger is narrower
    pub spot_power: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::NEG_Y,
            strength: Vec3::ONE,
            falloff_start: 1.0,
            falloff_end: 10.0,
            spot_power: 64.0,
        }
    }
}

impl SpotLight {
    pub fn to_gpu(&self) -> Light {
        Light {
            strength: self.strength,
            falloff_start: self.falloff_start,
            direction: self.direction.normalize_or_zero(),
            falloff_end: self.falloff_end,
            position: self.position,
            spot_power: self.spot_power,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_rig() {
        let rig = DirectionalLight::demo_rig();
        assert_eq!(rig[0].strength, Vec3::splat(0.6));
        assert_eq!(rig[1].strength, Vec3::splat(0.3));
        assert_eq!(rig[2].strength, Vec3::splat(0.15));
        assert!(rig.iter().all(|l| l.direction.y < 0.0));
    }

    #[test]
    fn test_directional_to_gpu_normalizes() {
        let light = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), Vec3::ONE).to_gpu();
        assert_eq!(light.direction, Vec3::NEG_Y);
        assert_eq!(light.strength, Vec3::ONE);
    }

    #[test]
    fn test_zero_direction_does_not_produce_nan() {
        let light = DirectionalLight::new(Vec3::ZERO, Vec3::ONE).to_gpu();
        assert_eq!(light.direction, Vec3::ZERO);
    }

    #[test]
    fn test_point_and_spot_to_gpu() {
        let point = PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            ..Default::default()
        }
        .to_gpu();
        assert_eq!(point.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(point.falloff_end, 10.0);

        let spot = SpotLight {
            spot_power: 8.0,
            ..Default::default()
        }
        .to_gpu();
        assert_eq!(spot.spot_power, 8.0);
        assert_eq!(spot.direction, Vec3::NEG_Y);
    }
}
