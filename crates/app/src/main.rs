//! cullframe - Main Entry Point
//!
//! Runs the instanced box-grid demo on the headless device. Input is a
//! scripted sequence of events routed to an [`App`] that owns the renderer.
//!
//! Usage: `cullframe [config.toml]`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{error, info};

use cullframe_core::RendererConfig;
use cullframe_renderer::Renderer;
use cullframe_resources::{GeometryArena, Material, MaterialRegistry, MeshGeometry};
use cullframe_rhi::Device;
use cullframe_rhi::headless::HeadlessDevice;
use cullframe_scene::{RenderItem, Scene, instance_grid};

/// Camera speed in world units per second.
const MOVE_SPEED: f32 = 30.0;
/// Fixed time step of the scripted input.
const FRAME_DT: f32 = 1.0 / 60.0;
/// Simulated GPU time per frame.
const GPU_LATENCY: Duration = Duration::from_millis(4);
/// Mouse look sensitivity.
const DEGREES_PER_PIXEL: f32 = 0.25;

/// Input delivered to the app once per tick.
#[derive(Clone, Copy, Debug, PartialEq)]
enum AppEvent {
    Resize { width: u32, height: u32 },
    /// Move along the view direction for `dt` seconds; negative walks back.
    Walk(f32),
    Strafe(f32),
    /// Mouse movement with a button held, in pixels. `dx` yaws, `dy` pitches.
    MouseDrag { dx: f32, dy: f32 },
    ToggleCulling,
    Redraw,
    Quit,
}

/// Frame counter for the once-per-second status line.
#[derive(Debug, Default)]
struct FrameRate {
    frames: u32,
    window_start: f32,
}

impl FrameRate {
    /// Counts a frame that started at `total_secs`. Returns the frames per
    /// second once at least a second has passed since the last report.
    fn tick(&mut self, total_secs: f32) -> Option<f32> {
        self.frames += 1;
        let elapsed = total_secs - self.window_start;
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frames as f32 / elapsed;
        self.frames = 0;
        self.window_start = total_secs;
        Some(fps)
    }
}

struct App<D: Device> {
    renderer: Renderer<D>,
    scene: Scene,
    materials: MaterialRegistry,
    frame_rate: FrameRate,
    running: bool,
}

impl<D: Device> App<D> {
    fn new(device: Arc<D>, config: &RendererConfig) -> Result<Self> {
        let (scene, materials) = build_scene(config)?;
        let renderer = Renderer::new(device, config, &scene, &materials)
            .context("failed to create renderer")?;
        Ok(Self {
            renderer,
            scene,
            materials,
            frame_rate: FrameRate::default(),
            running: true,
        })
    }

    fn handle(&mut self, event: AppEvent) -> Result<()> {
        match event {
            AppEvent::Resize { width, height } => self.renderer.resize(width, height)?,
            AppEvent::Walk(dt) => self.renderer.camera_mut().walk(MOVE_SPEED * dt),
            AppEvent::Strafe(dt) => self.renderer.camera_mut().strafe(MOVE_SPEED * dt),
            AppEvent::MouseDrag { dx, dy } => {
                let camera = self.renderer.camera_mut();
                camera.pitch((DEGREES_PER_PIXEL * dy).to_radians());
                camera.rotate_y((DEGREES_PER_PIXEL * dx).to_radians());
            }
            AppEvent::ToggleCulling => {
                self.renderer.toggle_culling();
            }
            AppEvent::Redraw => self.render_frame()?,
            AppEvent::Quit => {
                info!("Quit requested, shutting down");
                self.renderer.shutdown()?;
                self.running = false;
            }
        }
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let frame = self.renderer.begin_frame()?;
        let stats = self
            .renderer
            .update_scene(&frame, &mut self.scene, &mut self.materials)?;
        let scene = &self.scene;
        self.renderer
            .end_frame(frame, |draw| draw.draw_scene(scene))?;

        let total_secs = self
            .renderer
            .last_snapshot()
            .map_or(0.0, |snapshot| snapshot.timing.total_secs);
        if let Some(fps) = self.frame_rate.tick(total_secs) {
            info!(
                "fps: {:.0}, mspf: {:.3}, {} of {} instances visible, culling {}",
                fps,
                1000.0 / fps,
                stats.visible,
                stats.total,
                if self.renderer.culling_enabled() { "on" } else { "off" }
            );
        }
        Ok(())
    }
}

/// Demo materials and a 5x5x5 grid of boxes spread over [-100, 100]^3.
fn build_scene(config: &RendererConfig) -> Result<(Scene, MaterialRegistry)> {
    let mut materials = MaterialRegistry::new(config.frame_resource_count);
    let handles = materials.register_all(Material::demo_set())?;

    let mut geometry = GeometryArena::new();
    let mesh = geometry.insert(MeshGeometry::cuboid("shapeGeo", 1.0, 1.0, 1.0)?)?;
    let submesh = geometry.get(mesh)?.submesh("box")?;

    let mut scene = Scene::new();
    scene.add_item(RenderItem::from_submesh(
        "boxes",
        mesh,
        submesh,
        instance_grid(5, 100.0, &handles),
    ));
    Ok((scene, materials))
}

/// A fly-through: walk in, look around, toggle culling, resize, quit.
fn script() -> Vec<AppEvent> {
    let mut events = Vec::new();
    for tick in 0..600 {
        match tick {
            120..240 => events.push(AppEvent::Walk(FRAME_DT)),
            240..300 => events.push(AppEvent::MouseDrag {
                dx: 2.0,
                dy: if tick < 270 { 1.0 } else { -1.0 },
            }),
            300..360 => events.push(AppEvent::Strafe(FRAME_DT)),
            _ => {}
        }
        if tick == 360 || tick == 480 {
            events.push(AppEvent::ToggleCulling);
        }
        if tick == 420 {
            events.push(AppEvent::Resize {
                width: 1280,
                height: 720,
            });
        }
        events.push(AppEvent::Redraw);
    }
    events.push(AppEvent::Quit);
    events
}

fn main() -> Result<()> {
    cullframe_core::init_logging();
    info!("Starting cullframe");

    let config = match std::env::args().nth(1) {
        Some(path) => RendererConfig::load(Path::new(&path))?,
        None => RendererConfig::default(),
    };

    let device = Arc::new(HeadlessDevice::threaded(GPU_LATENCY));
    let mut app = App::new(device, &config)?;
    app.renderer.camera_mut().position = Vec3::new(0.0, 0.0, -150.0);
    app.renderer.camera_mut().look_at(Vec3::ZERO);

    for event in script() {
        if !app.running {
            break;
        }
        if let Err(e) = app.handle(event) {
            error!("Render error: {:?}", e);
            return Err(e);
        }
    }

    info!("Exited after {} frames", app.renderer.frame_number());
    Ok(())
}
