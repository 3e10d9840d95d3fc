//! Integration tests for the frame ring and renderer stages on the
//! headless device.

use std::sync::Arc;
use std::time::Duration;

use glam::{Mat4, Vec3, Vec4};

use cullframe_core::RendererConfig;
use cullframe_renderer::{RenderError, Renderer};
use cullframe_resources::ubo::{InstanceConstants, PassConstants};
use cullframe_resources::{GeometryArena, Material, MaterialRegistry, MeshGeometry};
use cullframe_rhi::headless::{ExecutedDraw, HeadlessDevice};
use cullframe_rhi::{BindPoint, CommandState, GpuBuffer, RhiError};
use cullframe_scene::{InstanceData, RenderItem, RenderItemId, Scene};

struct Fixture {
    device: Arc<HeadlessDevice>,
    renderer: Renderer<HeadlessDevice>,
    scene: Scene,
    item: RenderItemId,
    materials: MaterialRegistry,
}

impl Fixture {
    fn new(device: HeadlessDevice, config: RendererConfig) -> Self {
        let device = Arc::new(device);
        let mut materials = MaterialRegistry::new(config.frame_resource_count);
        let handles = materials.register_all(Material::demo_set()).unwrap();

        let mut geometry = GeometryArena::new();
        let mesh_handle = geometry
            .insert(MeshGeometry::cuboid("shapes", 1.0, 1.0, 1.0).unwrap())
            .unwrap();
        let mesh = geometry.get(mesh_handle).unwrap();
        let mut scene = Scene::new();
        let item = scene.add_item(RenderItem::from_submesh(
            "box",
            mesh_handle,
            mesh.submesh("box").unwrap(),
            vec![InstanceData::new(
                Mat4::from_translation(Vec3::new(0.0, 0.0, -10.0)),
                Mat4::IDENTITY,
                handles[0],
            )],
        ));

        let renderer = Renderer::new(Arc::clone(&device), &config, &scene, &materials).unwrap();
        Self {
            device,
            renderer,
            scene,
            item,
            materials,
        }
    }

    fn manual() -> Self {
        Self::new(HeadlessDevice::manual(), RendererConfig::default())
    }

    /// Runs one full frame and returns the stamped fence value.
    fn move_box_to(&mut self, position: Vec3) {
        self.scene.instances_mut(self.item).unwrap()[0].world = Mat4::from_translation(position);
    }

    fn roughness(&self, slot: usize, material: usize) -> f32 {
        self.renderer
            .frame(slot)
            .unwrap()
            .material_constants()
            .read(material)
            .unwrap()
            .roughness
    }

    fn frame(&mut self) -> Result<u64, RenderError> {
        let frame = self.renderer.begin_frame()?;
        self.renderer
            .update_scene(&frame, &mut self.scene, &mut self.materials)?;
        let scene = &self.scene;
        self.renderer
            .end_frame(frame, |draw| draw.draw_scene(scene))
    }
}

fn decode_instance(draw: &ExecutedDraw) -> InstanceConstants {
    let size = std::mem::size_of::<InstanceConstants>();
    bytemuck::pod_read_unaligned(&draw.instance_data[..size])
}

fn decode_pass(draw: &ExecutedDraw) -> PassConstants {
    let size = std::mem::size_of::<PassConstants>();
    bytemuck::pod_read_unaligned(&draw.pass_data[..size])
}

#[test]
fn test_cpu_never_runs_more_than_n_minus_one_frames_ahead() {
    let config = RendererConfig {
        fence_timeout_ms: Some(5_000),
        ..RendererConfig::default()
    };
    let mut fixture = Fixture::new(HeadlessDevice::threaded(Duration::from_millis(2)), config);
    let depth = fixture.renderer.frame_count() as u64;

    for _ in 0..20 {
        let frame = fixture.renderer.begin_frame().unwrap();
        assert!(fixture.renderer.in_flight().unwrap() <= depth - 1);
        fixture
            .renderer
            .update_scene(&frame, &mut fixture.scene, &mut fixture.materials)
            .unwrap();
        let scene = &fixture.scene;
        fixture
            .renderer
            .end_frame(frame, |draw| draw.draw_scene(scene))
            .unwrap();
    }

    fixture.renderer.shutdown().unwrap();
    assert_eq!(fixture.renderer.in_flight().unwrap(), 0);
    assert_eq!(fixture.device.submission_count(), 20);
}

#[test]
fn test_draws_read_their_own_slot() {
    let mut fixture = Fixture::manual();

    fixture.frame().unwrap();

    fixture.move_box_to(Vec3::new(0.0, 0.0, -20.0));
    fixture.renderer.camera_mut().position = Vec3::new(0.0, 0.0, 1.0);
    fixture.frame().unwrap();

    // The GPU runs both frames only after the CPU wrote both slots.
    fixture.device.run_all();
    let draws = fixture.device.take_executed();
    assert_eq!(draws.len(), 2);

    let slot0 = fixture.renderer.frame(0).unwrap();
    let slot1 = fixture.renderer.frame(1).unwrap();
    assert_eq!(
        draws[0].binding(BindPoint::Instances),
        Some(slot0.instances().buffer().id())
    );
    assert_eq!(
        draws[1].binding(BindPoint::Instances),
        Some(slot1.instances().buffer().id())
    );
    assert_eq!(
        draws[1].binding(BindPoint::Pass),
        Some(slot1.pass_constants().buffer().id())
    );

    assert_eq!(decode_instance(&draws[0]).world_matrix().w_axis.z, -10.0);
    assert_eq!(decode_instance(&draws[1]).world_matrix().w_axis.z, -20.0);
    assert_eq!(decode_pass(&draws[0]).eye_pos_w, Vec3::ZERO);
    assert_eq!(decode_pass(&draws[1]).eye_pos_w, Vec3::new(0.0, 0.0, 1.0));
}

#[test]
fn test_draw_uses_culled_instance_range() {
    let mut fixture = Fixture::manual();

    fixture.frame().unwrap();
    fixture.device.run_all();
    let draws = fixture.device.take_executed();

    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].args.instance_count, 1);
    assert_eq!(draws[0].args.first_instance, 0);
    assert_eq!(draws[0].args.index_count, 36);
}

#[test]
fn test_fully_culled_item_records_no_draw() {
    let mut fixture = Fixture::manual();
    fixture.move_box_to(Vec3::new(0.0, 0.0, 50.0));

    fixture.frame().unwrap();
    fixture.device.run_all();

    assert!(fixture.device.take_executed().is_empty());
    assert_eq!(fixture.scene.visible_count(), 0);
}

#[test]
fn test_material_change_reaches_each_slot_in_turn() {
    let mut fixture = Fixture::manual();
    let handle = fixture.materials.find("grass").unwrap();
    let original = fixture.materials.get(handle).unwrap().roughness;

    for _ in 0..3 {
        fixture.frame().unwrap();
        fixture.device.run_all();
    }
    assert_eq!(fixture.materials.frames_dirty(handle).unwrap(), 0);

    fixture
        .materials
        .modify(handle, |material| material.roughness = 0.99)
        .unwrap();

    let roughness = |fixture: &Fixture, slot: usize| fixture.roughness(slot, handle.index());

    fixture.frame().unwrap();
    fixture.device.run_all();
    assert_eq!(roughness(&fixture, 0), 0.99);
    assert_eq!(roughness(&fixture, 1), original);
    assert_eq!(roughness(&fixture, 2), original);

    fixture.frame().unwrap();
    fixture.device.run_all();
    assert_eq!(roughness(&fixture, 1), 0.99);
    assert_eq!(roughness(&fixture, 2), original);

    fixture.frame().unwrap();
    fixture.device.run_all();
    assert_eq!(roughness(&fixture, 2), 0.99);
    assert_eq!(fixture.materials.frames_dirty(handle).unwrap(), 0);
}

#[test]
fn test_repeated_scene_update_still_reaches_every_slot() {
    let mut fixture = Fixture::manual();
    let handle = fixture.materials.find("grass").unwrap();
    for _ in 0..3 {
        fixture.frame().unwrap();
        fixture.device.run_all();
    }

    fixture
        .materials
        .modify(handle, |material| material.roughness = 0.99)
        .unwrap();

    let frame = fixture.renderer.begin_frame().unwrap();
    for _ in 0..2 {
        fixture
            .renderer
            .update_scene(&frame, &mut fixture.scene, &mut fixture.materials)
            .unwrap();
    }
    let scene = &fixture.scene;
    fixture
        .renderer
        .end_frame(frame, |draw| draw.draw_scene(scene))
        .unwrap();
    fixture.device.run_all();
    assert_eq!(fixture.materials.frames_dirty(handle).unwrap(), 2);

    for _ in 0..2 {
        fixture.frame().unwrap();
        fixture.device.run_all();
    }

    let slots: Vec<f32> = (0..3).map(|slot| fixture.roughness(slot, handle.index())).collect();
    assert_eq!(slots, vec![0.99; 3]);
    assert_eq!(fixture.materials.frames_dirty(handle).unwrap(), 0);
}

#[test]
fn test_material_registered_after_creation_is_not_fatal() {
    let mut fixture = Fixture::manual();
    fixture.frame().unwrap();
    fixture.device.run_all();

    let late = fixture
        .materials
        .register(Material::new("late", Vec4::ONE, Vec3::splat(0.02), 0.5, 0))
        .unwrap();

    let frame = fixture.renderer.begin_frame().unwrap();
    let err = fixture
        .renderer
        .update_scene(&frame, &mut fixture.scene, &mut fixture.materials)
        .unwrap_err();
    assert!(matches!(
        err,
        RenderError::MaterialCapacityExceeded {
            required: 9,
            capacity: 8
        }
    ));
    assert!(!err.is_fatal());
    assert!(!fixture.renderer.is_halted());
    assert_eq!(fixture.materials.frames_dirty(late).unwrap(), 3);

    let scene = &fixture.scene;
    fixture
        .renderer
        .end_frame(frame, |draw| draw.draw_scene(scene))
        .unwrap();
}

#[test]
fn test_begin_without_end_fails_on_fourth_frame() {
    let mut fixture = Fixture::manual();

    let results: Vec<_> = (0..10).map(|_| fixture.renderer.begin_frame()).collect();

    for result in &results[..3] {
        assert!(result.is_ok());
    }
    assert!(matches!(
        results[3],
        Err(RenderError::Rhi(RhiError::CommandContextInUse(
            CommandState::Recording
        )))
    ));
    for result in &results[4..] {
        assert!(matches!(result, Err(RenderError::Halted(_))));
    }
    assert!(fixture.renderer.is_halted());
}

#[test]
fn test_stalled_gpu_times_out_on_fourth_frame() {
    let config = RendererConfig {
        fence_timeout_ms: Some(20),
        ..RendererConfig::default()
    };
    let mut fixture = Fixture::new(HeadlessDevice::manual(), config);

    for expected in 1..=3 {
        assert_eq!(fixture.frame().unwrap(), expected);
    }

    let err = fixture.renderer.begin_frame().unwrap_err();
    assert!(matches!(
        err,
        RenderError::Rhi(RhiError::FenceTimeout { value: 1, .. })
    ));
    assert!(err.is_fatal());
    assert!(matches!(
        fixture.renderer.begin_frame(),
        Err(RenderError::Halted(_))
    ));
}

#[test]
fn test_lost_device_halts_renderer() {
    let mut fixture = Fixture::new(
        HeadlessDevice::threaded(Duration::from_millis(1)),
        RendererConfig::default(),
    );
    fixture.frame().unwrap();

    fixture.device.lose_device("driver reset");
    let err = fixture.frame().unwrap_err();
    assert!(err.is_fatal());
    assert!(fixture.renderer.is_halted());
}
