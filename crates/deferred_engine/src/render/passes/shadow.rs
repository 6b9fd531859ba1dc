//! Depth-only rendering of every shadow view into the shadow atlas
//!
//! One view per cascade plus one per visible shadow-casting spot light. A view
//! with no casters records nothing at all, and the atlas is only made writable
//! when at least one view has something to draw.

use crate::render::api::{
    CommandRecorder, ConstantSlot, DepthAttachment, GeometryProvider, PassBeginInfo,
    PipelineKind, Viewport,
};
use crate::render::error::RenderResult;
use crate::render::frame::FrameResource;
use crate::render::passes::{draw_objects, ObjectPipelines};
use crate::render::resources::ShadowAtlas;
use crate::render::systems::lighting::LightKey;
use crate::render::systems::visibility::{ObjectKey, ObjectManager};

/// What a shadow view renders for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowSource {
    /// Directional cascade by index
    Cascade(usize),
    /// Shadow-casting spot light
    Light(LightKey),
}

/// One shadow view of the frame and the casters culled against it
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowView {
    /// Whose shadow map this is
    pub source: ShadowSource,
    /// Atlas layer written
    pub layer: u32,
    /// Objects to draw
    pub casters: Vec<ObjectKey>,
}

/// Counters from one shadow pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShadowPassStats {
    /// Views that recorded a pass
    pub views_rendered: usize,
    /// Views skipped because nothing was inside them
    pub views_skipped: usize,
    /// Indexed draws
    pub draws: usize,
}

/// Shadow depth pass
///
/// A skipped view leaves its atlas layer holding whatever an earlier frame
/// rendered there, under a projection that no longer matches. Lighting must
/// not sample a layer that was skipped this frame. Cascades carry a
/// `rendered` flag in their constants for this. Spot light layers have no
/// per-frame flag, so a spot light whose view was skipped must be lit
/// unshadowed.
#[derive(Debug, Default)]
pub struct ShadowPass;

impl ShadowPass {
    const PIPELINES: ObjectPipelines = ObjectPipelines {
        regular: PipelineKind::ShadowDepth,
        tessellated: PipelineKind::ShadowDepthTessellated,
    };

    /// Create the pass
    pub fn new() -> Self {
        Self
    }

    /// Record every non-empty view
    pub fn record(
        &self,
        recorder: &mut dyn CommandRecorder,
        atlas: &mut ShadowAtlas,
        views: &[ShadowView],
        objects: &ObjectManager,
        frame: &FrameResource,
        geometry: &dyn GeometryProvider,
    ) -> RenderResult<ShadowPassStats> {
        let mut stats = ShadowPassStats::default();
        if views.iter().all(|view| view.casters.is_empty()) {
            stats.views_skipped = views.len();
            return Ok(stats);
        }

        atlas.begin_shadow_pass(recorder)?;

        for view in views {
            if view.casters.is_empty() {
                log::trace!("Shadow view {:?} has no casters, skipped", view.source);
                stats.views_skipped += 1;
                continue;
            }

            let size = match view.source {
                ShadowSource::Cascade(_) => atlas.resolution(),
                ShadowSource::Light(_) => atlas.local_resolution(),
            };
            recorder.begin_pass(&PassBeginInfo {
                label: "shadow",
                color_targets: Vec::new(),
                depth: Some(DepthAttachment {
                    texture: atlas.texture().handle(),
                    layer: Some(view.layer),
                    writable: true,
                }),
                clear: true,
                width: size,
                height: size,
            })?;
            recorder.set_viewport(Viewport::full(size, size))?;
            recorder.bind_constants(
                ConstantSlot::ShadowView,
                frame.shadow_views.gpu_address(view.layer as usize)?,
            )?;
            stats.draws += draw_objects(
                recorder,
                &view.casters,
                objects,
                frame,
                geometry,
                Self::PIPELINES,
            )?;
            recorder.end_pass()?;
            stats.views_rendered += 1;
        }

        log::debug!(
            "Shadow pass: {} views rendered, {} skipped, {} draws",
            stats.views_rendered,
            stats.views_skipped,
            stats.draws
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererSettings;
    use crate::foundation::bounds::Aabb;
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::api::{
        BufferHandle, GpuAddress, MeshBuffers, RecordedCommand, RecordingCommandList,
        ResourceRegistry, SubmeshRange,
    };
    use crate::render::error::RenderError;
    use crate::render::resources::ResourceState;
    use crate::render::systems::visibility::{LodLevel, ObjectDesc, ObjectFlags};

    struct Fixture {
        registry: ResourceRegistry,
        atlas: ShadowAtlas,
        objects: ObjectManager,
        frame: FrameResource,
    }

    fn fixture() -> Fixture {
        let settings = RendererSettings {
            max_objects: 4,
            max_local_lights: 2,
            ..Default::default()
        };
        let mut registry = ResourceRegistry::new();
        let atlas = ShadowAtlas::new(&mut registry, &settings.shadows, 2);
        registry.register_mesh(
            "cube",
            MeshBuffers {
                vertex_buffer: BufferHandle(1),
                index_buffer: BufferHandle(2),
                vertex_stride: 32,
                index_count: 36,
            },
        );
        Fixture {
            registry,
            atlas,
            objects: ObjectManager::new(&settings),
            frame: FrameResource::new(GpuAddress(0), &settings),
        }
    }

    fn add_cube(objects: &mut ObjectManager, mesh: &str, flags: ObjectFlags) -> ObjectKey {
        let range = SubmeshRange {
            vertex_start: 0,
            vertex_count: 24,
            index_start: 0,
            index_count: 36,
        };
        objects
            .add_object(ObjectDesc {
                transform: Transform::default(),
                local_bounds: Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0)),
                lods: vec![LodLevel::single(mesh, range, 0)],
                flags,
            })
            .unwrap()
    }

    #[test]
    fn test_empty_views_issue_no_work() {
        let mut f = fixture();
        let views = vec![
            ShadowView {
                source: ShadowSource::Cascade(0),
                layer: 0,
                casters: Vec::new(),
            },
            ShadowView {
                source: ShadowSource::Cascade(1),
                layer: 1,
                casters: Vec::new(),
            },
        ];
        let mut recorder = RecordingCommandList::new();
        let stats = ShadowPass::new()
            .record(&mut recorder, &mut f.atlas, &views, &f.objects, &f.frame, &f.registry)
            .unwrap();

        assert!(recorder.commands().is_empty());
        assert_eq!(stats.views_skipped, 2);
        assert_eq!(f.atlas.texture().state(), ResourceState::Undefined);
    }

    #[test]
    fn test_each_view_renders_its_layer() {
        let mut f = fixture();
        let regular = add_cube(&mut f.objects, "cube", ObjectFlags::CAST_SHADOWS);
        let tessellated = add_cube(
            &mut f.objects,
            "cube",
            ObjectFlags::CAST_SHADOWS | ObjectFlags::TESSELLATED,
        );
        let views = vec![
            ShadowView {
                source: ShadowSource::Cascade(0),
                layer: 0,
                casters: vec![regular, tessellated],
            },
            ShadowView {
                source: ShadowSource::Cascade(1),
                layer: 1,
                casters: Vec::new(),
            },
            ShadowView {
                source: ShadowSource::Cascade(2),
                layer: 2,
                casters: vec![regular],
            },
        ];
        let mut recorder = RecordingCommandList::new();
        let stats = ShadowPass::new()
            .record(&mut recorder, &mut f.atlas, &views, &f.objects, &f.frame, &f.registry)
            .unwrap();

        assert_eq!(stats.views_rendered, 2);
        assert_eq!(stats.views_skipped, 1);
        assert_eq!(stats.draws, 3);
        assert_eq!(recorder.draws_in_pass("shadow"), 3);
        assert_eq!(recorder.barriers().count(), 1);
        assert_eq!(f.atlas.texture().state(), ResourceState::DepthWrite);

        let layers: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BeginPass(info) => info.depth.and_then(|depth| depth.layer),
                _ => None,
            })
            .collect();
        assert_eq!(layers, vec![0, 2]);

        let pipelines: Vec<_> = recorder
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::BindPipeline(pipeline) => Some(*pipeline),
                _ => None,
            })
            .collect();
        assert_eq!(
            pipelines,
            vec![
                PipelineKind::ShadowDepth,
                PipelineKind::ShadowDepthTessellated,
                PipelineKind::ShadowDepth
            ]
        );
    }

    #[test]
    fn test_missing_mesh_reported() {
        let mut f = fixture();
        let key = add_cube(&mut f.objects, "not_registered", ObjectFlags::CAST_SHADOWS);
        let views = vec![ShadowView {
            source: ShadowSource::Cascade(0),
            layer: 0,
            casters: vec![key],
        }];
        let mut recorder = RecordingCommandList::new();
        let result = ShadowPass::new().record(
            &mut recorder,
            &mut f.atlas,
            &views,
            &f.objects,
            &f.frame,
            &f.registry,
        );
        assert_eq!(
            result,
            Err(RenderError::MissingGeometry("not_registered".to_string()))
        );
    }
}
