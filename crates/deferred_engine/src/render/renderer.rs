//! Frame driver
//!
//! [`DeferredRenderer`] owns every piece of per-scene state and runs one frame
//! at a time on one thread:
//!
//! 1. wait for the frame slot, update the camera
//! 2. cascades, light classification, object culling for every view
//! 3. LOD selection for the camera-visible set
//! 4. dirty-gated constant writes into the frame slot
//! 5. shadow, G-buffer, lighting and post passes
//! 6. signal the frame fence
//!
//! Deleting objects or lights waits for the GPU to go idle first, so no frame
//! in flight can still read their constants or shadow layers.

use crate::config::RendererSettings;
use crate::foundation::math::Mat4;
use crate::render::api::{
    CommandRecorder, GeometryProvider, GpuAddress, GpuFence, TextureHandle, TextureProvider,
};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::constants::gpu_mat4;
use crate::render::frame::{FrameRing, PassConstants};
use crate::render::passes::{
    GBufferPass, LightingPass, LightingStats, PostProcessChain, ShadowPass, ShadowSource,
    ShadowView,
};
use crate::render::primitives::Camera;
use crate::render::resources::{GBuffer, ShadowAtlas};
use crate::render::systems::lighting::{
    DirectionalLight, LightDesc, LightKey, LightVisibility, LightingManager, LocalLight,
};
use crate::render::systems::visibility::{
    LodMode, ObjectDesc, ObjectKey, ObjectManager, ObjectVisibility, RenderItem,
};

/// Collaborators borrowed for one frame
pub struct RenderContext<'a> {
    /// Mesh lookup
    pub geometry: &'a dyn GeometryProvider,
    /// Seconds since the application started
    pub total_time: f32,
}

/// Visibility results of the current frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameVisibility {
    /// Objects seen by the camera
    pub objects: ObjectVisibility,
    /// Every shadow view with its casters, cascades first
    pub shadow_views: Vec<ShadowView>,
}

impl FrameVisibility {
    /// Bit mask of the cascades that have casters and render this frame
    pub fn rendered_cascades(&self) -> u32 {
        self.shadow_views
            .iter()
            .filter(|view| !view.casters.is_empty())
            .filter_map(|view| match view.source {
                ShadowSource::Cascade(i) => Some(1 << i),
                ShadowSource::Light(_) => None,
            })
            .fold(0, |mask, bit| mask | bit)
    }
}

/// Counters from one rendered frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameStats {
    /// Frames rendered so far, including this one
    pub frame_number: u64,
    /// Ring slot used
    pub frame_index: usize,
    /// Objects drawn in the G-buffer pass
    pub visible_objects: usize,
    /// Objects rejected by the camera frustum
    pub culled_objects: usize,
    /// Objects that switched LOD
    pub lod_changes: usize,
    /// Object constants written this frame
    pub objects_written: usize,
    /// Local light constants written this frame
    pub lights_written: usize,
    /// Lights whose volume contains the camera
    pub containing_lights: usize,
    /// Lights inside the frustum
    pub inside_lights: usize,
    /// Active lights outside the frustum
    pub culled_lights: usize,
    /// Shadow views rendered
    pub shadow_views_rendered: usize,
    /// Shadow views skipped for having no casters
    pub shadow_views_skipped: usize,
    /// Indexed draws in the shadow pass
    pub shadow_draws: usize,
    /// Indexed draws in the G-buffer pass
    pub gbuffer_draws: usize,
    /// Lighting pass draws
    pub lighting: LightingStats,
    /// Texture holding the finished frame
    pub output: Option<TextureHandle>,
}

/// Deferred renderer
#[derive(Debug)]
pub struct DeferredRenderer {
    settings: RendererSettings,
    frames: FrameRing,
    gbuffer: GBuffer,
    atlas: ShadowAtlas,
    lights: LightingManager,
    objects: ObjectManager,
    shadow_pass: ShadowPass,
    gbuffer_pass: GBufferPass,
    lighting_pass: LightingPass,
    post: PostProcessChain,
    visibility: FrameVisibility,
}

impl DeferredRenderer {
    /// Validate `settings` and create every renderer-owned resource
    ///
    /// Frame constants are laid out from `constants_base`, the device address
    /// of the backend's upload allocation.
    pub fn new(
        settings: RendererSettings,
        textures: &mut dyn TextureProvider,
        constants_base: GpuAddress,
    ) -> RenderResult<Self> {
        settings
            .validate()
            .map_err(|err| RenderError::InvalidConfiguration(err.to_string()))?;

        let frames = FrameRing::new(constants_base, &settings);
        let gbuffer = GBuffer::new(textures, settings.width, settings.height);
        let atlas = ShadowAtlas::new(textures, &settings.shadows, settings.max_local_lights);
        let lighting_pass = LightingPass::new(textures, settings.width, settings.height);
        let post = PostProcessChain::new(textures, settings.width, settings.height);

        log::info!(
            "Deferred renderer: {}x{}, {} frames in flight, {} objects, {} local lights",
            settings.width,
            settings.height,
            settings.frames_in_flight,
            settings.max_objects,
            settings.max_local_lights
        );

        Ok(Self {
            lights: LightingManager::new(&settings),
            objects: ObjectManager::new(&settings),
            frames,
            gbuffer,
            atlas,
            shadow_pass: ShadowPass::new(),
            gbuffer_pass: GBufferPass::new(),
            lighting_pass,
            post,
            visibility: FrameVisibility::default(),
            settings,
        })
    }

    /// Settings in use
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    /// Frame ring
    pub fn frames(&self) -> &FrameRing {
        &self.frames
    }

    /// G-buffer
    pub fn gbuffer(&self) -> &GBuffer {
        &self.gbuffer
    }

    /// Shadow atlas
    pub fn shadow_atlas(&self) -> &ShadowAtlas {
        &self.atlas
    }

    /// Visibility of the last computed frame
    pub fn visibility(&self) -> &FrameVisibility {
        &self.visibility
    }

    /// Light lists of the last computed frame
    pub fn light_visibility(&self) -> &LightVisibility {
        self.lights.visibility()
    }

    /// Add an object
    pub fn add_object(&mut self, desc: ObjectDesc) -> RenderResult<ObjectKey> {
        self.objects.add_object(desc)
    }

    /// Remove an object once the GPU is idle
    pub fn remove_object(&mut self, key: ObjectKey, fence: &mut dyn GpuFence) -> RenderResult<()> {
        if self.objects.object(key).is_none() {
            return Err(RenderError::UnknownObject);
        }
        self.frames.flush(fence)?;
        self.objects.remove_object(key)
    }

    /// An object by key
    pub fn object(&self, key: ObjectKey) -> Option<&RenderItem> {
        self.objects.object(key)
    }

    /// An object by key, for editing
    pub fn object_mut(&mut self, key: ObjectKey) -> Option<&mut RenderItem> {
        self.objects.object_mut(key)
    }

    /// Object storage
    pub fn objects(&self) -> &ObjectManager {
        &self.objects
    }

    /// Pin every object to one LOD, or go back to automatic selection
    pub fn set_lod_mode(&mut self, mode: LodMode) {
        self.objects.lod_selector_mut().set_mode(mode);
    }

    /// Add a local light
    pub fn add_light(&mut self, desc: LightDesc) -> RenderResult<LightKey> {
        self.lights.add_light(desc, &mut self.atlas)
    }

    /// Remove a local light once the GPU is idle
    pub fn remove_light(&mut self, key: LightKey, fence: &mut dyn GpuFence) -> RenderResult<()> {
        if self.lights.light(key).is_none() {
            return Err(RenderError::UnknownLight);
        }
        self.frames.flush(fence)?;
        self.lights.remove_light(key, &mut self.atlas)
    }

    /// A light by key
    pub fn light(&self, key: LightKey) -> Option<&LocalLight> {
        self.lights.light(key)
    }

    /// A light by key, for editing
    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut LocalLight> {
        self.lights.light_mut(key)
    }

    /// Light storage
    pub fn lights(&self) -> &LightingManager {
        &self.lights
    }

    /// The sun, for editing
    pub fn sun_mut(&mut self) -> &mut DirectionalLight {
        self.lights.sun_mut()
    }

    /// Recreate every screen-sized target once the GPU is idle
    pub fn resize(
        &mut self,
        textures: &mut dyn TextureProvider,
        fence: &mut dyn GpuFence,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidConfiguration(format!(
                "cannot resize to {}x{}",
                width, height
            )));
        }
        if width == self.settings.width && height == self.settings.height {
            return Ok(());
        }
        self.frames.flush(fence)?;
        self.gbuffer.resize(textures, width, height);
        self.lighting_pass.resize(textures, width, height);
        self.post.resize(textures, width, height);
        self.settings.width = width;
        self.settings.height = height;
        Ok(())
    }

    /// Rebuild every per-frame visibility set for `camera`
    ///
    /// The camera's view matrix must be up to date.
    pub fn compute_visibility(&mut self, camera: &Camera) -> RenderResult<&FrameVisibility> {
        self.objects.refresh_transforms();
        self.lights.update_cascades(camera);
        self.lights.classify(camera);

        let objects = self.objects.cull_camera(camera);

        let mut shadow_views = Vec::new();
        for (i, cascade) in self.lights.cascades().iter().enumerate() {
            shadow_views.push(ShadowView {
                source: ShadowSource::Cascade(i),
                layer: self.atlas.cascade_layer(i),
                casters: self.objects.cull_cascade(cascade),
            });
        }
        for key in &self.lights.visibility().shadow_casters {
            let light = self.lights.light(*key).ok_or(RenderError::UnknownLight)?;
            shadow_views.push(ShadowView {
                source: ShadowSource::Light(*key),
                layer: self.atlas.local_layer(light.shadow_layer())?,
                casters: self.objects.cull_light(light),
            });
        }

        self.visibility = FrameVisibility {
            objects,
            shadow_views,
        };
        Ok(&self.visibility)
    }

    /// Record one whole frame
    pub fn render_frame(
        &mut self,
        camera: &mut Camera,
        context: &RenderContext<'_>,
        recorder: &mut dyn CommandRecorder,
        fence: &mut dyn GpuFence,
    ) -> RenderResult<FrameStats> {
        let frame_index = self.frames.begin_frame(fence)?;
        camera.update_view_matrix();
        self.compute_visibility(camera)?;

        let mut stats = FrameStats {
            frame_number: self.frames.frame_number(),
            frame_index,
            visible_objects: self.visibility.objects.len(),
            culled_objects: self.visibility.objects.culled,
            ..Default::default()
        };
        stats.lod_changes =
            self.objects
                .select_lods(camera, self.settings.height, self.visibility.objects.iter());

        let frame = self.frames.current_mut();
        stats.objects_written = self.objects.write_constants(frame)?;
        stats.lights_written = self.lights.write_light_constants(frame, &self.atlas)?;
        let (containing, inside) = self.lights.write_visibility(frame)?;
        self.lights.write_shadow_constants(
            frame,
            &self.atlas,
            self.visibility.rendered_cascades(),
        )?;
        frame.pass.copy_element(
            0,
            &pass_constants(
                camera,
                self.settings.width,
                self.settings.height,
                context.total_time,
                containing,
                inside,
            ),
        )?;
        stats.containing_lights = containing as usize;
        stats.inside_lights = inside as usize;
        stats.culled_lights = self.lights.visibility().culled;

        let frame = self.frames.current();
        let shadow = self.shadow_pass.record(
            recorder,
            &mut self.atlas,
            &self.visibility.shadow_views,
            &self.objects,
            frame,
            context.geometry,
        )?;
        stats.shadow_views_rendered = shadow.views_rendered;
        stats.shadow_views_skipped = shadow.views_skipped;
        stats.shadow_draws = shadow.draws;

        stats.gbuffer_draws = self.gbuffer_pass.record(
            recorder,
            &mut self.gbuffer,
            &self.visibility.objects,
            &self.objects,
            frame,
            context.geometry,
        )?;

        stats.lighting = self.lighting_pass.record(
            recorder,
            &mut self.gbuffer,
            &mut self.atlas,
            &self.lights,
            frame,
            context.geometry,
        )?;

        let pass_address = frame.pass.gpu_address(0)?;
        stats.output = Some(self.post.record(
            recorder,
            self.lighting_pass.output_mut(),
            &self.gbuffer,
            &self.settings.post,
            pass_address,
        )?);

        self.frames.end_frame(fence)?;
        self.objects.end_frame();
        camera.end_frame();

        log::debug!(
            "Frame {}: {} objects visible, {} culled, {} + {} lights, {} shadow views",
            stats.frame_number,
            stats.visible_objects,
            stats.culled_objects,
            stats.containing_lights,
            stats.inside_lights,
            stats.shadow_views_rendered
        );
        Ok(stats)
    }
}

fn pass_constants(
    camera: &Camera,
    width: u32,
    height: u32,
    total_time: f32,
    containing_light_count: u32,
    inside_light_count: u32,
) -> PassConstants {
    let view_proj = camera.view_proj();
    let inv_view_proj = view_proj.try_inverse().unwrap_or_else(Mat4::identity);
    let position = camera.position();
    let jitter = camera.jitter();
    PassConstants {
        view: gpu_mat4(&camera.view()),
        inv_view: gpu_mat4(&camera.inv_view()),
        proj: gpu_mat4(&camera.proj()),
        inv_proj: gpu_mat4(&camera.inv_proj()),
        view_proj: gpu_mat4(&view_proj),
        inv_view_proj: gpu_mat4(&inv_view_proj),
        prev_view_proj: gpu_mat4(&camera.prev_view_proj()),
        eye_position: [position.x, position.y, position.z],
        total_time,
        render_target_size: [width as f32, height as f32],
        inv_render_target_size: [1.0 / width as f32, 1.0 / height as f32],
        near_z: camera.near_z(),
        far_z: camera.far_z(),
        containing_light_count,
        inside_light_count,
        jitter: [jitter.x, jitter.y],
        _padding: [0.0; 2],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{HostFence, RecordingCommandList, ResourceRegistry};

    #[test]
    fn test_invalid_settings_rejected() {
        let mut registry = ResourceRegistry::new();
        let settings = RendererSettings {
            frames_in_flight: 0,
            ..Default::default()
        };
        let result = DeferredRenderer::new(settings, &mut registry, GpuAddress(0));
        assert!(matches!(result, Err(RenderError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_empty_scene_renders() {
        let mut registry = ResourceRegistry::new();
        let mut renderer =
            DeferredRenderer::new(RendererSettings::default(), &mut registry, GpuAddress(0))
                .unwrap();
        let mut camera = Camera::new();
        let mut recorder = RecordingCommandList::new();
        let mut fence = HostFence::new();

        let stats = renderer
            .render_frame(
                &mut camera,
                &RenderContext {
                    geometry: &registry,
                    total_time: 0.0,
                },
                &mut recorder,
                &mut fence,
            )
            .unwrap();

        assert_eq!(stats.frame_number, 1);
        assert_eq!(stats.visible_objects, 0);
        assert_eq!(stats.shadow_views_rendered, 0);
        assert_eq!(stats.shadow_views_skipped, 3);
        assert_eq!(stats.lighting.fullscreen_draws, 1);
        assert_eq!(fence.last_signalled(), 1);
        assert!(stats.output.is_some());
    }

    #[test]
    fn test_rendered_cascades_skip_empty_views() {
        let view = |source, casters: Vec<ObjectKey>| ShadowView {
            source,
            layer: 0,
            casters,
        };
        let visibility = FrameVisibility {
            objects: ObjectVisibility::default(),
            shadow_views: vec![
                view(ShadowSource::Cascade(0), Vec::new()),
                view(ShadowSource::Cascade(1), vec![ObjectKey::default()]),
                view(ShadowSource::Cascade(2), Vec::new()),
                view(ShadowSource::Light(LightKey::default()), vec![ObjectKey::default()]),
            ],
        };
        assert_eq!(visibility.rendered_cascades(), 0b010);
        assert_eq!(FrameVisibility::default().rendered_cascades(), 0);
    }

    #[test]
    fn test_resize_rejects_zero() {
        let mut registry = ResourceRegistry::new();
        let mut renderer =
            DeferredRenderer::new(RendererSettings::default(), &mut registry, GpuAddress(0))
                .unwrap();
        let mut fence = HostFence::new();
        assert!(renderer.resize(&mut registry, &mut fence, 0, 10).is_err());
        renderer.resize(&mut registry, &mut fence, 800, 600).unwrap();
        assert_eq!(renderer.gbuffer().width(), 800);
        assert_eq!(renderer.settings().height, 600);
    }
}
