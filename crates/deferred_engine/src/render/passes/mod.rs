//! Render passes
//!
//! Each pass records through a [`CommandRecorder`] and moves the textures it
//! touches into the state it needs through their trackers. Passes never keep
//! per-frame lists themselves; the frame driver hands them the visibility
//! results of the current frame.

pub mod gbuffer_pass;
pub mod lighting;
pub mod post_process;
pub mod shadow;

pub use gbuffer_pass::GBufferPass;
pub use lighting::{LightingPass, LightingStats};
pub use post_process::PostProcessChain;
pub use shadow::{ShadowPass, ShadowPassStats, ShadowSource, ShadowView};

use crate::render::api::{CommandRecorder, ConstantSlot, GeometryProvider, PipelineKind};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::FrameResource;
use crate::render::systems::visibility::{ObjectKey, ObjectManager};

/// Pipelines used for regular and tessellated objects in one pass
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObjectPipelines {
    pub regular: PipelineKind,
    pub tessellated: PipelineKind,
}

/// Draw every listed object at its current LOD
///
/// Pipelines are only rebound when an object needs the other one. Returns the
/// number of indexed draws recorded.
pub(crate) fn draw_objects(
    recorder: &mut dyn CommandRecorder,
    keys: &[ObjectKey],
    objects: &ObjectManager,
    frame: &FrameResource,
    geometry: &dyn GeometryProvider,
    pipelines: ObjectPipelines,
) -> RenderResult<usize> {
    let mut bound = None;
    let mut draws = 0;
    for key in keys {
        let item = objects.object(*key).ok_or(RenderError::UnknownObject)?;
        let Some(lod) = item.current_lod_level() else {
            continue;
        };
        let mesh = geometry
            .mesh(&lod.mesh)
            .ok_or_else(|| RenderError::MissingGeometry(lod.mesh.clone()))?;

        let pipeline = if item.is_tessellated() {
            pipelines.tessellated
        } else {
            pipelines.regular
        };
        if bound != Some(pipeline) {
            recorder.bind_pipeline(pipeline)?;
            bound = Some(pipeline);
        }

        let slot = item.constant_slot().index() as usize;
        recorder.bind_constants(ConstantSlot::Object, frame.objects.gpu_address(slot)?)?;
        recorder.bind_mesh(mesh)?;
        for submesh in &lod.submeshes {
            recorder.draw_indexed(&submesh.range)?;
            draws += 1;
        }
    }
    Ok(draws)
}
