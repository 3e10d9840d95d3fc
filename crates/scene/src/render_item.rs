//! Instanced render items.
//!
//! A [`RenderItem`] draws one submesh many times. Each item owns a fixed,
//! disjoint region of the per-frame instance buffer starting at
//! `instance_base`; after culling, the first `visible_count` entries of the
//! region hold the surviving instances and the draw uses `instance_base` as
//! its first instance.
//!
//! Once an item is in a [`Scene`] only its instance data and visible count
//! can change; the region layout is fixed by [`Scene::add_item`].

use cullframe_resources::{MaterialHandle, MeshHandle, SubmeshGeometry, ubo::InstanceConstants};
use glam::{Mat4, Vec3};
use tracing::debug;

use crate::bounds::Aabb;
use crate::error::{SceneError, SceneResult};

/// Index range of a submesh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrawArgs {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
}

/// One instance of a render item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InstanceData {
    pub world: Mat4,
    pub tex_transform: Mat4,
    pub material: MaterialHandle,
}

impl InstanceData {
    pub fn new(world: Mat4, tex_transform: Mat4, material: MaterialHandle) -> Self {
        Self {
            world,
            tex_transform,
            material,
        }
    }

    /// GPU representation, matrices transposed.
    #[inline]
    pub fn to_constants(&self) -> InstanceConstants {
        InstanceConstants::new(self.world, self.tex_transform, self.material.gpu_index())
    }
}

/// A submesh drawn once per visible instance.
#[derive(Clone, Debug)]
pub struct RenderItem {
    pub name: String,
    pub mesh: MeshHandle,
    pub draw: DrawArgs,
    /// Object-space bounds shared by all instances.
    pub bounds: Aabb,
    instances: Vec<InstanceData>,
    instance_base: usize,
    visible_count: usize,
}

impl RenderItem {
    pub fn new(
        name: impl Into<String>,
        mesh: MeshHandle,
        draw: DrawArgs,
        bounds: Aabb,
        instances: Vec<InstanceData>,
    ) -> Self {
        Self {
            name: name.into(),
            mesh,
            draw,
            bounds,
            instances,
            instance_base: 0,
            visible_count: 0,
        }
    }

    /// Item drawing a submesh, with bounds and draw args taken from it.
    pub fn from_submesh(
        name: impl Into<String>,
        mesh: MeshHandle,
        submesh: &SubmeshGeometry,
        instances: Vec<InstanceData>,
    ) -> Self {
        Self::new(
            name,
            mesh,
            DrawArgs {
                index_count: submesh.index_count,
                start_index: submesh.start_index,
                base_vertex: submesh.base_vertex,
            },
            Aabb::from_min_max(submesh.aabb_min, submesh.aabb_max),
            instances,
        )
    }

    /// Instances in stable order.
    #[inline]
    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    /// Mutable access to instance data.
    #[inline]
    pub fn instances_mut(&mut self) -> &mut [InstanceData] {
        &mut self.instances
    }

    /// Offset of this item's region in the instance buffer.
    #[inline]
    pub fn instance_base(&self) -> usize {
        self.instance_base
    }

    /// Instances that survived the last cull.
    #[inline]
    pub fn visible_count(&self) -> usize {
        self.visible_count
    }

    fn set_visible_count(&mut self, count: usize) {
        debug_assert!(count <= self.instances.len());
        self.visible_count = count.min(self.instances.len());
    }
}

/// Handle of an item in a [`Scene`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderItemId(usize);

impl RenderItemId {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// The set of render items drawn each frame.
#[derive(Debug, Default)]
pub struct Scene {
    items: Vec<RenderItem>,
    instance_capacity: usize,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an item and assigns its instance buffer region.
    pub fn add_item(&mut self, mut item: RenderItem) -> RenderItemId {
        item.instance_base = self.instance_capacity;
        item.visible_count = 0;
        self.instance_capacity += item.instances.len();
        debug!(
            "Added render item '{}': {} instances at base {}",
            item.name,
            item.instances.len(),
            item.instance_base
        );
        let id = RenderItemId(self.items.len());
        self.items.push(item);
        id
    }

    pub fn item(&self, id: RenderItemId) -> SceneResult<&RenderItem> {
        self.items.get(id.0).ok_or(SceneError::UnknownItem(id.0))
    }

    /// Instance data of item `id`. The count and region stay fixed.
    pub fn instances_mut(&mut self, id: RenderItemId) -> SceneResult<&mut [InstanceData]> {
        self.items
            .get_mut(id.0)
            .map(RenderItem::instances_mut)
            .ok_or(SceneError::UnknownItem(id.0))
    }

    /// Records how many instances of item `id` survived the last cull.
    /// Counts past the item's instance count are clamped.
    pub fn set_visible_count(&mut self, id: RenderItemId, count: usize) -> SceneResult<()> {
        let item = self.items.get_mut(id.0).ok_or(SceneError::UnknownItem(id.0))?;
        item.set_visible_count(count);
        Ok(())
    }

    #[inline]
    pub fn items(&self) -> &[RenderItem] {
        &self.items
    }

    /// Ids of all items, in scene order.
    pub fn ids(&self) -> impl Iterator<Item = RenderItemId> + use<> {
        (0..self.items.len()).map(RenderItemId)
    }

    /// Worst-case number of instances: the sum over all items.
    #[inline]
    pub fn instance_capacity(&self) -> usize {
        self.instance_capacity
    }

    /// Sum of the items' visible counts from the last cull.
    pub fn visible_count(&self) -> usize {
        self.items.iter().map(RenderItem::visible_count).sum()
    }
}

/// An `n × n × n` lattice of instances filling a cube of edge `2 * half_extent`
/// centered on the origin.
///
/// Instance `k * n * n + i * n + j` sits at
/// `(-h + j * d, -h + i * d, -h + k * d)` with `d = 2h / (n - 1)`. Materials
/// are assigned round-robin and every instance gets a 2× texture tiling.
pub fn instance_grid(n: usize, half_extent: f32, materials: &[MaterialHandle]) -> Vec<InstanceData> {
    if n == 0 || materials.is_empty() {
        return Vec::new();
    }
    let spacing = if n > 1 {
        2.0 * half_extent / (n - 1) as f32
    } else {
        0.0
    };
    let origin = Vec3::splat(-half_extent);
    let tex_transform = Mat4::from_scale(Vec3::new(2.0, 2.0, 1.0));

    let mut instances = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for i in 0..n {
            for j in 0..n {
                let index = instances.len();
                let offset = Vec3::new(j as f32, i as f32, k as f32) * spacing;
                instances.push(InstanceData::new(
                    Mat4::from_translation(origin + offset),
                    tex_transform,
                    materials[index % materials.len()],
                ));
            }
        }
    }
    instances
}
