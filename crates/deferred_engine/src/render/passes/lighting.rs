//! Deferred lighting composite
//!
//! Reads the G-buffer and the shadow atlas and accumulates into an HDR target:
//! 1. the sun as one fullscreen draw with the cascades bound,
//! 2. every local light containing the camera in one fullscreen draw that walks
//!    the containing index list,
//! 3. every other visible local light as a draw of its bounding volume mesh.
//!
//! Lights whose volume holds the camera cannot be drawn as volumes because
//! the front faces are behind the near plane.

use crate::render::api::{
    CommandRecorder, ConstantSlot, GeometryProvider, PassBeginInfo, PipelineKind,
    TextureProvider, Viewport,
};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::FrameResource;
use crate::render::resources::{
    GBuffer, GBufferTarget, ResourceState, ShadowAtlas, TextureDesc, TextureFormat,
    TrackedTexture,
};
use crate::render::systems::lighting::LightingManager;

/// First shader input slot of the G-buffer colour targets
pub const GBUFFER_TEXTURE_SLOT: u32 = 0;
/// Shader input slot of the G-buffer depth
pub const DEPTH_TEXTURE_SLOT: u32 = GBufferTarget::ALL.len() as u32;
/// Shader input slot of the shadow atlas
pub const SHADOW_ATLAS_TEXTURE_SLOT: u32 = DEPTH_TEXTURE_SLOT + 1;

const OUTPUT_NAME: &str = "lighting.hdr";

/// Draw counts of one lighting pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LightingStats {
    /// Fullscreen draws (sun plus the containing-camera batch)
    pub fullscreen_draws: usize,
    /// Light volume draws
    pub volume_draws: usize,
}

/// Lighting pass and its HDR output
#[derive(Debug)]
pub struct LightingPass {
    output: TrackedTexture,
    width: u32,
    height: u32,
}

impl LightingPass {
    /// Create the HDR output at `width` x `height`
    pub fn new(textures: &mut dyn TextureProvider, width: u32, height: u32) -> Self {
        let handle = textures.create_texture(
            OUTPUT_NAME,
            TextureDesc::new_2d(TextureFormat::Rgba16Float, width, height),
        );
        Self {
            output: TrackedTexture::new(OUTPUT_NAME, handle, ResourceState::Undefined),
            width,
            height,
        }
    }

    /// Recreate the output at a new size
    pub fn resize(&mut self, textures: &mut dyn TextureProvider, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        let handle = textures.create_texture(
            OUTPUT_NAME,
            TextureDesc::new_2d(TextureFormat::Rgba16Float, width, height),
        );
        self.output.replace(handle);
        self.width = width;
        self.height = height;
    }

    /// The HDR output
    pub fn output(&self) -> &TrackedTexture {
        &self.output
    }

    pub(crate) fn output_mut(&mut self) -> &mut TrackedTexture {
        &mut self.output
    }

    /// Record the composite
    pub fn record(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        gbuffer: &mut GBuffer,
        atlas: &mut ShadowAtlas,
        lights: &LightingManager,
        frame: &FrameResource,
        geometry: &dyn GeometryProvider,
    ) -> RenderResult<LightingStats> {
        gbuffer.bind_for_lighting(recorder)?;
        atlas.bind_for_lighting(recorder)?;
        self.output.transition(recorder, ResourceState::RenderTarget)?;

        recorder.begin_pass(&PassBeginInfo {
            label: "lighting",
            color_targets: vec![self.output.handle()],
            depth: None,
            clear: true,
            width: self.width,
            height: self.height,
        })?;
        recorder.set_viewport(Viewport::full(self.width, self.height))?;

        for (i, target) in GBufferTarget::ALL.iter().enumerate() {
            recorder.bind_texture(GBUFFER_TEXTURE_SLOT + i as u32, gbuffer.target(*target).handle())?;
        }
        recorder.bind_texture(DEPTH_TEXTURE_SLOT, gbuffer.depth().handle())?;
        recorder.bind_texture(SHADOW_ATLAS_TEXTURE_SLOT, atlas.texture().handle())?;
        recorder.bind_constants(ConstantSlot::Pass, frame.pass.gpu_address(0)?)?;

        let mut stats = LightingStats::default();

        recorder.bind_pipeline(PipelineKind::DirectionalLight)?;
        recorder.bind_constants(
            ConstantSlot::DirectionalLight,
            frame.directional_light.gpu_address(0)?,
        )?;
        recorder.bind_constants(ConstantSlot::Cascades, frame.cascades.base_address())?;
        recorder.draw_fullscreen()?;
        stats.fullscreen_draws += 1;

        let visibility = lights.visibility();
        if !visibility.containing.is_empty() || !visibility.inside.is_empty() {
            recorder.bind_constants(ConstantSlot::LocalLights, frame.local_lights.base_address())?;
        }

        if !visibility.containing.is_empty() {
            recorder.bind_pipeline(PipelineKind::LocalLightFullscreen)?;
            recorder.bind_constants(
                ConstantSlot::ContainingLightIndices,
                frame.containing_light_indices.base_address(),
            )?;
            recorder.draw_fullscreen()?;
            stats.fullscreen_draws += 1;
        }

        if !visibility.inside.is_empty() {
            recorder.bind_pipeline(PipelineKind::LocalLightVolume)?;
            recorder.bind_constants(
                ConstantSlot::InsideLightIndices,
                frame.inside_light_indices.base_address(),
            )?;
            for key in &visibility.inside {
                let light = lights.light(*key).ok_or(RenderError::UnknownLight)?;
                let mesh_name = light.light_type().volume_mesh();
                let mesh = geometry
                    .mesh(mesh_name)
                    .ok_or_else(|| RenderError::MissingGeometry(mesh_name.to_string()))?;
                let slot = light.slot().index() as usize;
                recorder.bind_constants(
                    ConstantSlot::LocalLightInstance,
                    frame.local_lights.gpu_address(slot)?,
                )?;
                recorder.bind_mesh(mesh)?;
                recorder.draw_indexed(&mesh.full_range())?;
                stats.volume_draws += 1;
            }
        }

        recorder.end_pass()?;
        log::debug!(
            "Lighting pass: {} fullscreen draws, {} volume draws",
            stats.fullscreen_draws,
            stats.volume_draws
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererSettings;
    use crate::foundation::math::Vec3;
    use crate::render::api::{
        BufferHandle, GpuAddress, MeshBuffers, RecordingCommandList, ResourceRegistry,
    };
    use crate::render::primitives::Camera;
    use crate::render::systems::lighting::LightDesc;

    struct Fixture {
        registry: ResourceRegistry,
        gbuffer: GBuffer,
        atlas: ShadowAtlas,
        lights: LightingManager,
        frame: FrameResource,
        pass: LightingPass,
        camera: Camera,
    }

    fn fixture() -> Fixture {
        let settings = RendererSettings {
            max_local_lights: 4,
            ..Default::default()
        };
        let mut registry = ResourceRegistry::new();
        let gbuffer = GBuffer::new(&mut registry, 64, 64);
        let atlas = ShadowAtlas::new(&mut registry, &settings.shadows, 4);
        let pass = LightingPass::new(&mut registry, 64, 64);
        let mut camera = Camera::new();
        camera.set_lens(1.0, 1.0, 1.0, 100.0);
        camera.update_view_matrix();
        Fixture {
            registry,
            gbuffer,
            atlas,
            lights: LightingManager::new(&settings),
            frame: FrameResource::new(GpuAddress(0), &settings),
            pass,
            camera,
        }
    }

    fn sphere_mesh() -> MeshBuffers {
        MeshBuffers {
            vertex_buffer: BufferHandle(10),
            index_buffer: BufferHandle(11),
            vertex_stride: 12,
            index_count: 960,
        }
    }

    #[test]
    fn test_sun_only_frame() {
        let mut f = fixture();
        f.lights.classify(&f.camera);
        let mut recorder = RecordingCommandList::new();
        let stats = f
            .pass
            .record(&mut recorder, &mut f.gbuffer, &mut f.atlas, &f.lights, &f.frame, &f.registry)
            .unwrap();

        assert_eq!(stats.fullscreen_draws, 1);
        assert_eq!(stats.volume_draws, 0);
        assert_eq!(f.atlas.texture().state(), ResourceState::ShaderResource);
        assert_eq!(f.gbuffer.depth().state(), ResourceState::ShaderResource);
        assert_eq!(f.pass.output().state(), ResourceState::RenderTarget);
    }

    #[test]
    fn test_containing_and_inside_lights_drawn_differently() {
        let mut f = fixture();
        f.registry.register_mesh("light_sphere", sphere_mesh());
        f.lights
            .add_light(LightDesc::point(Vec3::zeros(), 5.0, Vec3::zeros(), 1.0), &mut f.atlas)
            .unwrap();
        f.lights
            .add_light(
                LightDesc::point(Vec3::new(0.0, 0.0, 30.0), 2.0, Vec3::zeros(), 1.0),
                &mut f.atlas,
            )
            .unwrap();
        f.lights
            .add_light(
                LightDesc::point(Vec3::new(4.0, 0.0, 50.0), 2.0, Vec3::zeros(), 1.0),
                &mut f.atlas,
            )
            .unwrap();
        f.lights.classify(&f.camera);

        let mut recorder = RecordingCommandList::new();
        let stats = f
            .pass
            .record(&mut recorder, &mut f.gbuffer, &mut f.atlas, &f.lights, &f.frame, &f.registry)
            .unwrap();

        assert_eq!(stats.fullscreen_draws, 2);
        assert_eq!(stats.volume_draws, 2);
        assert_eq!(recorder.draws_in_pass("lighting"), 4);
    }

    #[test]
    fn test_missing_volume_mesh_reported() {
        let mut f = fixture();
        f.lights
            .add_light(
                LightDesc::spot(Vec3::new(0.0, 0.0, 20.0), Vec3::z(), 5.0, 0.4, Vec3::zeros(), 1.0),
                &mut f.atlas,
            )
            .unwrap();
        f.lights.classify(&f.camera);

        let mut recorder = RecordingCommandList::new();
        let result = f.pass.record(
            &mut recorder,
            &mut f.gbuffer,
            &mut f.atlas,
            &f.lights,
            &f.frame,
            &f.registry,
        );
        assert_eq!(
            result,
            Err(RenderError::MissingGeometry("light_cone".to_string()))
        );
    }
}
