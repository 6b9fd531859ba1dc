//! Headless scene viewer
//!
//! Builds a demo scene (a grid of multi-LOD objects, point and spot lights and
//! a sun), orbits the camera around it and drives the deferred renderer
//! through the recording backend, logging what every frame did.
//!
//! Usage: `scene_viewer [settings.toml|settings.ron] [frame count]`

use deferred_engine::foundation::logging;
use deferred_engine::foundation::math::utils;
use deferred_engine::prelude::*;
use deferred_engine::render::api::BufferHandle;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

const DEFAULT_FRAME_COUNT: u64 = 240;
const GRID_SIZE: i32 = 8;
const GRID_SPACING: f32 = 6.0;
const POINT_LIGHT_COUNT: usize = 12;
const SPOT_LIGHT_COUNT: usize = 4;

#[derive(Error, Debug)]
enum ViewerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Everything the viewer owns besides the renderer
struct SceneViewer {
    registry: ResourceRegistry,
    renderer: DeferredRenderer,
    camera: Camera,
    fence: HostFence,
    lights: Vec<LightKey>,
    objects: Vec<ObjectKey>,
    rng: StdRng,
}

impl SceneViewer {
    fn new(settings: RendererSettings) -> Result<Self, ViewerError> {
        let mut registry = ResourceRegistry::new();
        register_meshes(&mut registry);

        let mut camera = Camera::new();
        camera.set_lens(
            utils::deg_to_rad(60.0),
            settings.aspect_ratio(),
            0.5,
            400.0,
        );
        camera.set_jitter(settings.post.taa, settings.width, settings.height);

        let renderer = DeferredRenderer::new(settings, &mut registry, GpuAddress(0x10_0000))?;

        Ok(Self {
            registry,
            renderer,
            camera,
            fence: HostFence::new(),
            lights: Vec::new(),
            objects: Vec::new(),
            rng: StdRng::seed_from_u64(0x5eed),
        })
    }

    fn populate(&mut self) -> Result<(), ViewerError> {
        let half = GRID_SIZE as f32 * GRID_SPACING * 0.5;

        self.objects.push(self.renderer.add_object(ObjectDesc {
            transform: Transform::new(
                Vec3::new(0.0, -1.0, 0.0),
                Quat::identity(),
                Vec3::new(half * 2.0, 0.1, half * 2.0),
            ),
            local_bounds: unit_box(),
            lods: vec![lod("plane", 0, 6, 1)],
            flags: ObjectFlags::empty(),
        })?);

        for row in 0..GRID_SIZE {
            for column in 0..GRID_SIZE {
                let position = Vec3::new(
                    column as f32 * GRID_SPACING - half,
                    0.0,
                    row as f32 * GRID_SPACING - half,
                );
                let mut flags = ObjectFlags::CAST_SHADOWS;
                if (row + column) % 5 == 0 {
                    flags |= ObjectFlags::TESSELLATED;
                }
                let key = self.renderer.add_object(ObjectDesc {
                    transform: Transform::from_euler(
                        position,
                        Vec3::new(0.0, self.rng.gen_range(0.0..std::f32::consts::TAU), 0.0),
                        Vec3::new(1.0, self.rng.gen_range(0.5..2.5), 1.0),
                    ),
                    local_bounds: unit_box(),
                    lods: vec![
                        lod("rock", 0, 2880, 0),
                        lod("rock", 2880, 720, 0),
                        lod("rock", 3600, 180, 0),
                        lod("cube", 0, 36, 0),
                    ],
                    flags,
                })?;
                self.objects.push(key);
            }
        }

        for _ in 0..POINT_LIGHT_COUNT {
            let position = Vec3::new(
                self.rng.gen_range(-half..half),
                self.rng.gen_range(0.5..4.0),
                self.rng.gen_range(-half..half),
            );
            let color = Vec3::new(
                self.rng.gen_range(0.3..1.0),
                self.rng.gen_range(0.3..1.0),
                self.rng.gen_range(0.3..1.0),
            );
            let desc = LightDesc::point(position, self.rng.gen_range(4.0..10.0), color, 3.0);
            self.lights.push(self.renderer.add_light(desc)?);
        }

        for i in 0..SPOT_LIGHT_COUNT {
            let angle = i as f32 * std::f32::consts::TAU / SPOT_LIGHT_COUNT as f32;
            let position = Vec3::new(angle.cos() * half * 0.5, 12.0, angle.sin() * half * 0.5);
            let desc = LightDesc::spot(
                position,
                (Vec3::zeros() - position).normalize(),
                30.0,
                utils::deg_to_rad(25.0),
                Vec3::new(1.0, 0.95, 0.8),
                8.0,
            );
            self.lights.push(self.renderer.add_light(desc)?);
        }

        self.renderer
            .sun_mut()
            .set_direction(Vec3::new(0.4, -1.0, 0.3));

        log::info!(
            "Scene ready: {} objects, {} local lights",
            self.objects.len(),
            self.lights.len()
        );
        Ok(())
    }

    fn orbit_camera(&mut self, frame: u64) {
        let t = frame as f32 * 0.01;
        let radius = 30.0 + 20.0 * (t * 0.7).sin();
        let eye = Vec3::new(t.cos() * radius, 8.0 + 4.0 * (t * 1.3).sin(), t.sin() * radius);
        self.camera
            .look_at(eye, Vec3::zeros(), Vec3::new(0.0, 1.0, 0.0));
    }

    fn run(&mut self, frame_count: u64) -> Result<FrameStats, ViewerError> {
        let mut totals = FrameStats::default();
        let mut last = FrameStats::default();

        for frame in 0..frame_count {
            self.orbit_camera(frame);

            if frame == frame_count / 2 {
                self.edit_scene()?;
            }

            let mut recorder = RecordingCommandList::new();
            let context = RenderContext {
                geometry: &self.registry,
                total_time: frame as f32 / 60.0,
            };
            let stats =
                self.renderer
                    .render_frame(&mut self.camera, &context, &mut recorder, &mut self.fence)?;

            // The simulated GPU runs one frame behind the CPU
            self.fence
                .retire_up_to(self.fence.last_signalled().saturating_sub(1));

            log::debug!(
                "Frame {}: {} commands, {} draws, {} LOD changes",
                stats.frame_number,
                recorder.commands().len(),
                recorder.draw_count(),
                stats.lod_changes
            );
            accumulate(&mut totals, &stats);
            last = stats;
        }

        log::info!(
            "Rendered {} frames: {} G-buffer draws, {} shadow draws, {} light volumes, {} LOD changes, {} ring waits",
            frame_count,
            totals.gbuffer_draws,
            totals.shadow_draws,
            totals.lighting.volume_draws,
            totals.lod_changes,
            self.fence.wait_count()
        );
        Ok(last)
    }

    /// Mid-run edits the editor would make: delete a light, move an object, resize
    fn edit_scene(&mut self) -> Result<(), ViewerError> {
        if let Some(light) = self.lights.pop() {
            self.renderer.remove_light(light, &mut self.fence)?;
            log::info!("Removed a light, {} left", self.lights.len());
        }
        if let Some(key) = self.objects.get(1).copied() {
            if let Some(object) = self.renderer.object_mut(key) {
                let mut transform = object.transform().clone();
                transform.translation.y += 2.0;
                object.set_transform(transform);
            }
        }

        let width = self.renderer.settings().width / 2;
        let height = self.renderer.settings().height / 2;
        self.renderer
            .resize(&mut self.registry, &mut self.fence, width, height)?;
        self.camera.set_lens(
            self.camera.fov_y(),
            width as f32 / height as f32,
            self.camera.near_z(),
            self.camera.far_z(),
        );
        self.camera.set_jitter(self.renderer.settings().post.taa, width, height);
        log::info!("Resized render targets to {}x{}", width, height);
        Ok(())
    }
}

fn unit_box() -> Aabb {
    Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
}

fn lod(mesh: &str, index_start: u32, index_count: u32, material_index: u32) -> LodLevel {
    LodLevel::single(
        mesh,
        SubmeshRange {
            vertex_start: 0,
            vertex_count: 0,
            index_start,
            index_count,
        },
        material_index,
    )
}

fn register_meshes(registry: &mut ResourceRegistry) {
    let meshes = [
        ("plane", 6),
        ("cube", 36),
        ("rock", 3780),
        ("light_sphere", 960),
        ("light_cone", 192),
    ];
    for (i, (name, index_count)) in meshes.into_iter().enumerate() {
        let base = i as u64 * 2;
        registry.register_mesh(
            name,
            MeshBuffers {
                vertex_buffer: BufferHandle(base + 1),
                index_buffer: BufferHandle(base + 2),
                vertex_stride: 32,
                index_count,
            },
        );
    }
}

fn accumulate(totals: &mut FrameStats, stats: &FrameStats) {
    totals.gbuffer_draws += stats.gbuffer_draws;
    totals.shadow_draws += stats.shadow_draws;
    totals.lod_changes += stats.lod_changes;
    totals.lighting.volume_draws += stats.lighting.volume_draws;
    totals.lighting.fullscreen_draws += stats.lighting.fullscreen_draws;
}

fn parse_args() -> Result<(RendererSettings, u64), ViewerError> {
    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => {
            log::info!("Loading renderer settings from {}", path);
            RendererSettings::load_from_file(&path)?
        }
        None => RendererSettings::default(),
    };
    let frame_count = match args.next() {
        Some(count) => count
            .parse()
            .map_err(|_| ViewerError::InvalidArgument(format!("frame count '{}'", count)))?,
        None => DEFAULT_FRAME_COUNT,
    };
    Ok((settings, frame_count))
}

fn run() -> Result<(), ViewerError> {
    let (settings, frame_count) = parse_args()?;
    settings.validate()?;

    let mut viewer = SceneViewer::new(settings)?;
    viewer.populate()?;
    let last = viewer.run(frame_count)?;

    log::info!(
        "Last frame: {} visible, {} culled, {} + {} lights, {} shadow views ({} skipped)",
        last.visible_objects,
        last.culled_objects,
        last.containing_lights,
        last.inside_lights,
        last.shadow_views_rendered,
        last.shadow_views_skipped
    );
    Ok(())
}

fn main() {
    logging::init_with_level(log::LevelFilter::Info);
    log::info!("Starting scene viewer");

    if let Err(e) = run() {
        log::error!("Scene viewer failed: {}", e);
        std::process::exit(1);
    }
}
