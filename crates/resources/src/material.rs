//! Material definitions and the material registry.
//!
//! Materials live in a [`MaterialRegistry`] arena and are referred to by
//! [`MaterialHandle`]. A handle's index is also the material's element in
//! every frame's material constant buffer.
//!
//! # Dirty Tracking
//!
//! Each frame resource set holds its own copy of the material constants, so
//! a change must be written once per ring slot. Every material carries a
//! bitmask of the slots still holding an old version. Registration and
//! [`MaterialRegistry::modify`] set all N bits; writing the material into
//! slot `k` clears bit `k`. Writing the same slot twice clears nothing new,
//! so after N consecutive frames every slot holds the new values.
//!
//! Rings deeper than [`MAX_TRACKED_SLOTS`] are not tracked past that depth.

use glam::{Mat4, Vec3, Vec4};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};
use crate::ubo::MaterialConstants;

/// Surface properties for the lighting model.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Unique name.
    pub name: String,
    /// Diffuse reflectance; alpha drives blending.
    pub diffuse_albedo: Vec4,
    /// Reflectance at normal incidence.
    pub fresnel_r0: Vec3,
    /// 0.0 = mirror, 1.0 = fully rough.
    pub roughness: f32,
    /// Texture coordinate transform (animated water, etc.).
    pub mat_transform: Mat4,
    /// Index of the diffuse texture in the shader-visible texture table.
    pub diffuse_map_index: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            diffuse_albedo: Vec4::ONE,
            fresnel_r0: Vec3::splat(0.01),
            roughness: 0.25,
            mat_transform: Mat4::IDENTITY,
            diffuse_map_index: 0,
        }
    }
}

impl Material {
    /// Creates a material with the given surface parameters.
    pub fn new(
        name: impl Into<String>,
        diffuse_albedo: Vec4,
        fresnel_r0: Vec3,
        roughness: f32,
        diffuse_map_index: u32,
    ) -> Self {
        Self {
            name: name.into(),
            diffuse_albedo,
            fresnel_r0,
            roughness,
            diffuse_map_index,
            ..Default::default()
        }
    }

    /// GPU representation.
    pub fn to_constants(&self) -> MaterialConstants {
        MaterialConstants {
            diffuse_albedo: self.diffuse_albedo,
            fresnel_r0: self.fresnel_r0,
            roughness: self.roughness,
            mat_transform: self.mat_transform.transpose(),
            diffuse_map_index: self.diffuse_map_index,
            _padding: [0; 3],
        }
    }

    /// The eight materials of the instancing demo, in constant buffer order.
    pub fn demo_set() -> Vec<Material> {
        vec![
            Material::new("grass", Vec4::ONE, Vec3::splat(0.01), 0.125, 0),
            Material::new("water", Vec4::new(1.0, 1.0, 1.0, 0.5), Vec3::splat(0.2), 0.0, 1),
            Material::new("wirefence", Vec4::ONE, Vec3::splat(0.1), 0.25, 2),
            Material::new("white1x1", Vec4::ONE, Vec3::splat(0.05), 0.3, 3),
            Material::new("shadowMat", Vec4::new(0.0, 0.0, 0.0, 0.5), Vec3::splat(0.001), 0.0, 3),
            Material::new("ice", Vec4::new(1.0, 1.0, 1.0, 0.3), Vec3::splat(0.1), 0.5, 4),
            Material::new("checkertile", Vec4::ONE, Vec3::splat(0.07), 0.3, 5),
            Material::new("bricks", Vec4::ONE, Vec3::splat(0.05), 0.25, 6),
        ]
    }
}

/// Typed index of a registered material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialHandle(u32);

impl MaterialHandle {
    /// Element index in the material constant buffer.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Value written into [`InstanceConstants::material_index`](crate::InstanceConstants).
    #[inline]
    pub fn gpu_index(self) -> u32 {
        self.0
    }
}

/// Number of ring slots a stale mask can track.
pub const MAX_TRACKED_SLOTS: usize = u64::BITS as usize;

#[derive(Debug)]
struct MaterialEntry {
    material: Material,
    /// Bit `k` set: slot `k` holds an old version.
    stale_slots: u64,
}

fn all_slots(count: usize) -> u64 {
    if count >= MAX_TRACKED_SLOTS {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

fn slot_bit(slot: usize) -> u64 {
    1u64.checked_shl(slot as u32).unwrap_or(0)
}

/// Arena of materials with per-slot dirty tracking.
#[derive(Debug)]
pub struct MaterialRegistry {
    entries: Vec<MaterialEntry>,
    frame_resource_count: usize,
}

impl MaterialRegistry {
    /// Creates an empty registry for a ring of `frame_resource_count` slots.
    pub fn new(frame_resource_count: usize) -> Self {
        Self {
            entries: Vec::new(),
            frame_resource_count,
        }
    }

    /// Registers a material. It is dirty in every slot.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateName`] if a material with the same
    /// name exists.
    pub fn register(&mut self, material: Material) -> ResourceResult<MaterialHandle> {
        if self.find(&material.name).is_some() {
            return Err(ResourceError::DuplicateName(material.name));
        }
        let handle = MaterialHandle(self.entries.len() as u32);
        debug!("Registered material '{}' as {:?}", material.name, handle);
        self.entries.push(MaterialEntry {
            material,
            stale_slots: all_slots(self.frame_resource_count),
        });
        Ok(handle)
    }

    /// Registers every material in order.
    pub fn register_all(
        &mut self,
        materials: impl IntoIterator<Item = Material>,
    ) -> ResourceResult<Vec<MaterialHandle>> {
        materials.into_iter().map(|m| self.register(m)).collect()
    }

    /// Looks up a material.
    pub fn get(&self, handle: MaterialHandle) -> ResourceResult<&Material> {
        self.entries
            .get(handle.index())
            .map(|entry| &entry.material)
            .ok_or(ResourceError::UnknownMaterial(handle))
    }

    /// Finds a material by name.
    pub fn find(&self, name: &str) -> Option<MaterialHandle> {
        self.entries
            .iter()
            .position(|entry| entry.material.name == name)
            .map(|index| MaterialHandle(index as u32))
    }

    /// Handle of the `index`-th registered material.
    pub fn handle_at(&self, index: usize) -> Option<MaterialHandle> {
        (index < self.entries.len()).then_some(MaterialHandle(index as u32))
    }

    /// Edits a material and marks it dirty in every slot.
    pub fn modify(
        &mut self,
        handle: MaterialHandle,
        edit: impl FnOnce(&mut Material),
    ) -> ResourceResult<()> {
        let stale = all_slots(self.frame_resource_count);
        let entry = self
            .entries
            .get_mut(handle.index())
            .ok_or(ResourceError::UnknownMaterial(handle))?;
        edit(&mut entry.material);
        entry.stale_slots = stale;
        Ok(())
    }

    /// Number of slots that do not yet hold the current version of `handle`.
    pub fn frames_dirty(&self, handle: MaterialHandle) -> ResourceResult<usize> {
        self.entries
            .get(handle.index())
            .map(|entry| entry.stale_slots.count_ones() as usize)
            .ok_or(ResourceError::UnknownMaterial(handle))
    }

    /// True if slot `slot` still holds an old version of `handle`.
    pub fn is_stale_in(&self, handle: MaterialHandle, slot: usize) -> ResourceResult<bool> {
        self.entries
            .get(handle.index())
            .map(|entry| entry.stale_slots & slot_bit(slot) != 0)
            .ok_or(ResourceError::UnknownMaterial(handle))
    }

    /// Calls `write` for every material that is stale in ring slot `slot`
    /// and marks it current there once the write succeeds. Returns the
    /// number of materials written.
    ///
    /// Stops at the first failed write; that material stays stale.
    pub fn write_dirty<E>(
        &mut self,
        slot: usize,
        mut write: impl FnMut(MaterialHandle, &MaterialConstants) -> Result<(), E>,
    ) -> Result<usize, E> {
        let bit = slot_bit(slot);
        let mut written = 0;
        for (index, entry) in self.entries.iter_mut().enumerate() {
            if entry.stale_slots & bit == 0 {
                continue;
            }
            write(MaterialHandle(index as u32), &entry.material.to_constants())?;
            entry.stale_slots &= !bit;
            written += 1;
        }
        Ok(written)
    }

    /// Number of registered materials.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no materials are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ring depth the countdowns are reset to.
    #[inline]
    pub fn frame_resource_count(&self) -> usize {
        self.frame_resource_count
    }

    /// Iterates over all materials with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (MaterialHandle, &Material)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (MaterialHandle(index as u32), &entry.material))
    }
}
