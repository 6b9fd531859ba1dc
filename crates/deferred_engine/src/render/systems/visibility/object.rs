//! Render items: placed meshes with LODs

use bitflags::bitflags;

use crate::foundation::bounds::{Aabb, BoundingSphere};
use crate::foundation::collections::SlotHandle;
use crate::foundation::math::{Mat4, Transform};
use crate::render::api::SubmeshRange;
use crate::render::frame::constants::{gpu_mat4, ObjectConstants, TransformConstants};
use crate::render::frame::DirtyFrames;

bitflags! {
    /// Per-object rendering flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        /// Drawn with the tessellation pipelines
        const TESSELLATED = 1 << 0;
        /// Rendered into shadow maps
        const CAST_SHADOWS = 1 << 1;
    }
}

/// One drawable range of a LOD with its material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submesh {
    /// Vertex and index range
    pub range: SubmeshRange,
    /// Material index
    pub material_index: u32,
}

/// One level of detail: a registered mesh and the ranges drawn from it
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    /// Name the geometry provider knows the mesh by
    pub mesh: String,
    /// Ranges to draw
    pub submeshes: Vec<Submesh>,
}

impl LodLevel {
    /// A LOD drawing a single range
    pub fn single(mesh: impl Into<String>, range: SubmeshRange, material_index: u32) -> Self {
        Self {
            mesh: mesh.into(),
            submeshes: vec![Submesh {
                range,
                material_index,
            }],
        }
    }
}

/// Everything needed to create a render item
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDesc {
    /// Placement
    pub transform: Transform,
    /// Bounds in object space
    pub local_bounds: Aabb,
    /// LODs, most detailed first; must not be empty
    pub lods: Vec<LodLevel>,
    /// Flags
    pub flags: ObjectFlags,
}

/// A placed object
#[derive(Debug, Clone)]
pub struct RenderItem {
    id: u64,
    transform: Transform,
    world: Mat4,
    inv_world: Mat4,
    prev_world: Mat4,
    local_bounds: Aabb,
    world_bounds: Aabb,
    lods: Vec<LodLevel>,
    current_lod: usize,
    flags: ObjectFlags,
    dirty: DirtyFrames,
    transform_stale: bool,
    constant_slot: SlotHandle,
}

impl RenderItem {
    pub(crate) fn new(id: u64, desc: ObjectDesc, constant_slot: SlotHandle, frames: usize) -> Self {
        let mut item = Self {
            id,
            transform: desc.transform,
            world: Mat4::identity(),
            inv_world: Mat4::identity(),
            prev_world: Mat4::identity(),
            local_bounds: desc.local_bounds,
            world_bounds: desc.local_bounds,
            lods: desc.lods,
            current_lod: 0,
            flags: desc.flags,
            dirty: DirtyFrames::new(frames),
            transform_stale: true,
            constant_slot,
        };
        item.refresh_transform();
        item.prev_world = item.world;
        item
    }

    /// Recompose world matrices and bounds if the transform changed
    pub(crate) fn refresh_transform(&mut self) {
        if !self.transform_stale {
            return;
        }
        self.world = self.transform.to_matrix();
        self.inv_world = self.world.try_inverse().unwrap_or_else(Mat4::identity);
        self.world_bounds = self.local_bounds.transform(&self.world);
        self.transform_stale = false;
    }

    /// Stable unique id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Decomposed transform
    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Replace the transform
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.transform_stale = true;
        self.dirty.mark();
    }

    /// Object to world
    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    /// World to object
    pub fn inv_world(&self) -> &Mat4 {
        &self.inv_world
    }

    /// Bounds in object space
    pub fn local_bounds(&self) -> &Aabb {
        &self.local_bounds
    }

    /// Bounds in world space (recomputed with the transform)
    pub fn world_bounds(&self) -> &Aabb {
        &self.world_bounds
    }

    /// Bounding sphere in world space
    pub fn world_sphere(&self) -> BoundingSphere {
        self.local_bounds.bounding_sphere().transform(&self.world)
    }

    /// LODs, most detailed first
    pub fn lods(&self) -> &[LodLevel] {
        &self.lods
    }

    /// Selected LOD index
    pub fn current_lod(&self) -> usize {
        self.current_lod
    }

    /// Selected LOD
    pub fn current_lod_level(&self) -> Option<&LodLevel> {
        self.lods.get(self.current_lod)
    }

    pub(crate) fn set_current_lod(&mut self, lod: usize) {
        if lod != self.current_lod {
            self.current_lod = lod;
            self.dirty.mark();
        }
    }

    /// Flags
    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    /// Replace the flags
    pub fn set_flags(&mut self, flags: ObjectFlags) {
        self.flags = flags;
        self.dirty.mark();
    }

    /// Whether the object uses the tessellation pipelines
    pub fn is_tessellated(&self) -> bool {
        self.flags.contains(ObjectFlags::TESSELLATED)
    }

    /// Whether the object is rendered into shadow maps
    pub fn casts_shadows(&self) -> bool {
        self.flags.contains(ObjectFlags::CAST_SHADOWS)
    }

    /// Slot in the object constant array
    pub fn constant_slot(&self) -> SlotHandle {
        self.constant_slot
    }

    /// Dirty-frame counter
    pub fn dirty(&self) -> &DirtyFrames {
        &self.dirty
    }

    pub(crate) fn dirty_mut(&mut self) -> &mut DirtyFrames {
        &mut self.dirty
    }

    /// Catch the previous-frame matrix up with the current one
    ///
    /// Returns whether it moved, in which case every frame copy is stale again.
    pub(crate) fn advance_prev_world(&mut self) -> bool {
        if self.prev_world == self.world {
            return false;
        }
        self.prev_world = self.world;
        self.dirty.mark();
        true
    }

    /// GPU constants
    pub fn constants(&self) -> ObjectConstants {
        let material_index = self
            .current_lod_level()
            .and_then(|lod| lod.submeshes.first())
            .map_or(0, |submesh| submesh.material_index);
        ObjectConstants {
            transform: TransformConstants::from_world(&self.world),
            prev_world: gpu_mat4(&self.prev_world),
            material_index,
            lod_index: self.current_lod as u32,
            flags: self.flags.bits(),
            _padding: 0,
        }
    }
}
