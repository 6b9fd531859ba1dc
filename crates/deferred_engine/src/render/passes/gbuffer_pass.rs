//! Geometry pass filling the G-buffer

use crate::render::api::{
    CommandRecorder, ConstantSlot, GeometryProvider, PipelineKind, Viewport,
};
use crate::render::error::RenderResult;
use crate::render::frame::FrameResource;
use crate::render::passes::{draw_objects, ObjectPipelines};
use crate::render::resources::GBuffer;
use crate::render::systems::visibility::{ObjectManager, ObjectVisibility};

/// G-buffer fill
#[derive(Debug, Default)]
pub struct GBufferPass;

impl GBufferPass {
    const PIPELINES: ObjectPipelines = ObjectPipelines {
        regular: PipelineKind::GBuffer,
        tessellated: PipelineKind::GBufferTessellated,
    };

    /// Create the pass
    pub fn new() -> Self {
        Self
    }

    /// Draw every camera-visible object, regular bucket first
    ///
    /// The targets are always cleared, even when nothing is visible, so the
    /// lighting pass never reads last frame's surfaces.
    pub fn record(
        &self,
        recorder: &mut dyn CommandRecorder,
        gbuffer: &mut GBuffer,
        visibility: &ObjectVisibility,
        objects: &ObjectManager,
        frame: &FrameResource,
        geometry: &dyn GeometryProvider,
    ) -> RenderResult<usize> {
        let info = gbuffer.begin_geometry_pass(recorder)?;
        recorder.begin_pass(&info)?;
        recorder.set_viewport(Viewport::full(gbuffer.width(), gbuffer.height()))?;
        recorder.bind_constants(ConstantSlot::Pass, frame.pass.gpu_address(0)?)?;

        let mut draws = draw_objects(
            recorder,
            &visibility.opaque,
            objects,
            frame,
            geometry,
            Self::PIPELINES,
        )?;
        draws += draw_objects(
            recorder,
            &visibility.tessellated,
            objects,
            frame,
            geometry,
            Self::PIPELINES,
        )?;
        recorder.end_pass()?;

        log::debug!("G-buffer pass: {} draws", draws);
        Ok(draws)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RendererSettings;
    use crate::render::api::{GpuAddress, RecordingCommandList, ResourceRegistry};
    use crate::render::resources::{GBufferTarget, ResourceState};

    #[test]
    fn test_empty_frame_still_clears_targets() {
        let settings = RendererSettings::default();
        let mut registry = ResourceRegistry::new();
        let mut gbuffer = GBuffer::new(&mut registry, 64, 64);
        let objects = ObjectManager::new(&settings);
        let frame = FrameResource::new(GpuAddress(0), &settings);
        let mut recorder = RecordingCommandList::new();

        let draws = GBufferPass::new()
            .record(
                &mut recorder,
                &mut gbuffer,
                &ObjectVisibility::default(),
                &objects,
                &frame,
                &registry,
            )
            .unwrap();

        assert_eq!(draws, 0);
        assert_eq!(recorder.pass_labels(), vec!["gbuffer"]);
        assert_eq!(
            gbuffer.target(GBufferTarget::Normals).state(),
            ResourceState::RenderTarget
        );
        assert_eq!(gbuffer.depth().state(), ResourceState::DepthWrite);
    }
}
