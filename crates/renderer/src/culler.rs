//! Per-instance frustum culling.
//!
//! For every instance the view-space frustum is carried into the instance's
//! local space with `world⁻¹ · view⁻¹` and tested against the item's
//! object-space bounds. Surviving instances are compacted to the front of
//! the item's region in the instance buffer, in scene order.
//!
//! Testing in local space keeps the bounds exact for rotated and
//! non-uniformly scaled instances, where a world-space box would grow.

use glam::Mat4;
use rayon::prelude::*;
use tracing::trace;

use cullframe_rhi::Device;
use cullframe_scene::{Aabb, Containment, Frustum, InstanceData, RenderItem, Scene, checked_inverse};

use crate::error::{RenderError, RenderResult};
use crate::frame_resources::FrameResources;
use crate::scene_update::FrameSnapshot;

/// Result of culling one render item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ItemCullStats {
    pub name: String,
    pub total: usize,
    pub visible: usize,
}

impl ItemCullStats {
    #[inline]
    pub fn culled(&self) -> usize {
        self.total - self.visible
    }
}

/// Result of culling a whole scene.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CullStats {
    /// One entry per render item, in scene order.
    pub items: Vec<ItemCullStats>,
    pub total: usize,
    pub visible: usize,
}

impl CullStats {
    fn push(&mut self, item: ItemCullStats) {
        self.total += item.total;
        self.visible += item.visible;
        self.items.push(item);
    }

    #[inline]
    pub fn culled(&self) -> usize {
        self.total - self.visible
    }
}

/// Whether an instance with transform `world` and object bounds `bounds`
/// overlaps the view-space `frustum`.
///
/// # Errors
///
/// Returns [`SceneError::SingularMatrix`](cullframe_scene::SceneError::SingularMatrix)
/// if `world` cannot be inverted.
pub fn instance_visible(
    frustum: &Frustum,
    view: &Mat4,
    inv_view: &Mat4,
    world: &Mat4,
    bounds: &Aabb,
) -> RenderResult<bool> {
    let inv_world = checked_inverse(world, "instance world")?;
    let to_local = inv_world * *inv_view;
    let from_local = *view * *world;
    let local = frustum.transformed_with_inverse(&to_local, &from_local);
    Ok(local.contains_aabb(bounds) != Containment::Disjoint)
}

/// Visibility test and compaction for the instances of a scene.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstanceCuller {
    parallel: bool,
}

impl InstanceCuller {
    /// `parallel` evaluates visibility on the rayon pool. The output is
    /// identical to the sequential path.
    pub fn new(parallel: bool) -> Self {
        Self { parallel }
    }

    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn set_parallel(&mut self, parallel: bool) {
        self.parallel = parallel;
    }

    /// Culls every item of `scene` and writes the survivors into the
    /// instance buffer of `frame`.
    ///
    /// With culling disabled in `snapshot` every instance is written. Each
    /// item's visible count is updated.
    ///
    /// # Errors
    ///
    /// Fails without touching the buffer if the scene does not fit in
    /// `frame`. A singular instance transform aborts the cull, whether or
    /// not culling is enabled.
    pub fn cull<D: Device>(
        &self,
        snapshot: &FrameSnapshot,
        scene: &mut Scene,
        frame: &FrameResources<D>,
    ) -> RenderResult<CullStats> {
        let required = scene.instance_capacity();
        if required > frame.instance_capacity() {
            return Err(RenderError::InstanceCapacityExceeded {
                required,
                capacity: frame.instance_capacity(),
            });
        }

        let mut stats = CullStats::default();
        for id in scene.ids() {
            let item = scene.item(id)?;
            let visibility = self.visibility(snapshot, item)?;

            let base = item.instance_base();
            let mut visible = 0;
            for (instance, _) in item
                .instances()
                .iter()
                .zip(&visibility)
                .filter(|(_, visible)| **visible)
            {
                frame.update_instance(base + visible, &instance.to_constants())?;
                visible += 1;
            }

            trace!(
                "Culled '{}': {} of {} visible",
                item.name,
                visible,
                item.instances().len()
            );
            stats.push(ItemCullStats {
                name: item.name.clone(),
                total: item.instances().len(),
                visible,
            });
            scene.set_visible_count(id, visible)?;
        }

        Ok(stats)
    }

    fn visibility(&self, snapshot: &FrameSnapshot, item: &RenderItem) -> RenderResult<Vec<bool>> {
        let instances = item.instances();
        if !snapshot.culling_enabled {
            for instance in instances {
                checked_inverse(&instance.world, "instance world")?;
            }
            return Ok(vec![true; instances.len()]);
        }

        let test = |instance: &InstanceData| {
            instance_visible(
                &snapshot.view_frustum,
                &snapshot.view,
                &snapshot.inv_view,
                &instance.world,
                &item.bounds,
            )
        };

        if self.parallel {
            instances.par_iter().map(test).collect()
        } else {
            instances.iter().map(test).collect()
        }
    }
}
