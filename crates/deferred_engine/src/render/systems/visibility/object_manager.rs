//! Object storage, culling against every view and LOD selection
//!
//! Culling results are rebuilt from scratch every frame. Objects keep their
//! AABB in object space and every test carries either the view volume or the
//! box into the space it needs; nothing derived from a transform is cached
//! across frames except the world matrix itself.

use slotmap::{new_key_type, SlotMap};

use crate::config::RendererSettings;
use crate::foundation::bounds::Containment;
use crate::foundation::collections::SlotPool;
use crate::foundation::math::Mat4Ext;
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::FrameResource;
use crate::render::primitives::Camera;
use crate::render::systems::lighting::{Cascade, LocalLight};
use crate::render::systems::visibility::lod::LodSelector;
use crate::render::systems::visibility::object::{ObjectDesc, RenderItem};

new_key_type! {
    /// Stable key of a render item
    pub struct ObjectKey;
}

/// Objects seen by the main camera, bucketed by pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectVisibility {
    /// Drawn with the regular pipelines
    pub opaque: Vec<ObjectKey>,
    /// Drawn with the tessellation pipelines
    pub tessellated: Vec<ObjectKey>,
    /// Rejected by the frustum
    pub culled: usize,
}

impl ObjectVisibility {
    /// Every visible object, opaque first
    pub fn iter(&self) -> impl Iterator<Item = ObjectKey> + '_ {
        self.opaque.iter().chain(&self.tessellated).copied()
    }

    /// Number of visible objects
    pub fn len(&self) -> usize {
        self.opaque.len() + self.tessellated.len()
    }

    /// Whether nothing is visible
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owns every render item, its constant slot and the LOD selector
#[derive(Debug)]
pub struct ObjectManager {
    objects: SlotMap<ObjectKey, RenderItem>,
    slots: SlotPool,
    lod: LodSelector,
    frames: usize,
    next_id: u64,
}

impl ObjectManager {
    /// Create an empty manager sized from `settings`
    pub fn new(settings: &RendererSettings) -> Self {
        Self {
            objects: SlotMap::with_key(),
            slots: SlotPool::new("object constants", settings.max_objects),
            lod: LodSelector::new(&settings.lod),
            frames: settings.frames_in_flight,
            next_id: 0,
        }
    }

    /// Add an object and reserve its constant slot
    pub fn add_object(&mut self, desc: ObjectDesc) -> RenderResult<ObjectKey> {
        if desc.lods.is_empty() {
            return Err(RenderError::InvalidConfiguration(
                "an object needs at least one LOD".to_string(),
            ));
        }
        if self.slots.available() == 0 {
            log::warn!(
                "Refusing to add object: all {} object slots are in use",
                self.slots.capacity()
            );
            return Err(RenderError::ObjectCapacityExceeded {
                max: self.slots.capacity(),
            });
        }
        let slot = self.slots.allocate()?;
        let id = self.next_id;
        self.next_id += 1;

        let item = RenderItem::new(id, desc, slot, self.frames);
        log::info!(
            "Added object {} with {} LODs in slot {}",
            id,
            item.lods().len(),
            slot.index()
        );
        Ok(self.objects.insert(item))
    }

    /// Remove an object and release its constant slot
    ///
    /// The caller must make sure the GPU no longer reads the object's data.
    pub fn remove_object(&mut self, key: ObjectKey) -> RenderResult<()> {
        let item = self.objects.remove(key).ok_or(RenderError::UnknownObject)?;
        self.slots.free(item.constant_slot())?;
        log::info!("Removed object {}", item.id());
        Ok(())
    }

    /// An object by key
    pub fn object(&self, key: ObjectKey) -> Option<&RenderItem> {
        self.objects.get(key)
    }

    /// An object by key, for editing
    pub fn object_mut(&mut self, key: ObjectKey) -> Option<&mut RenderItem> {
        self.objects.get_mut(key)
    }

    /// Every object
    pub fn objects(&self) -> impl Iterator<Item = (ObjectKey, &RenderItem)> {
        self.objects.iter()
    }

    /// Number of objects
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// The LOD selector
    pub fn lod_selector(&self) -> &LodSelector {
        &self.lod
    }

    /// The LOD selector, for switching modes
    pub fn lod_selector_mut(&mut self) -> &mut LodSelector {
        &mut self.lod
    }

    /// Recompose world matrices of every edited object
    pub fn refresh_transforms(&mut self) {
        for item in self.objects.values_mut() {
            item.refresh_transform();
        }
    }

    /// Objects overlapping the camera frustum
    ///
    /// The view-space frustum is carried into each object's local space and
    /// tested against the untransformed local box. Anything not disjoint is
    /// visible.
    pub fn cull_camera(&self, camera: &Camera) -> ObjectVisibility {
        let inv_view = camera.inv_view();
        let mut visibility = ObjectVisibility::default();
        for (key, item) in &self.objects {
            let to_local = item.inv_world() * inv_view;
            let local_frustum = camera.frustum().transform(&to_local);
            if local_frustum.contains_aabb(item.local_bounds()) == Containment::Disjoint {
                log::trace!("Object {} culled by camera", item.id());
                visibility.culled += 1;
            } else if item.is_tessellated() {
                visibility.tessellated.push(key);
            } else {
                visibility.opaque.push(key);
            }
        }
        log::debug!(
            "Objects: {} opaque, {} tessellated, {} culled",
            visibility.opaque.len(),
            visibility.tessellated.len(),
            visibility.culled
        );
        visibility
    }

    /// Shadow casters inside one cascade's light-space box
    pub fn cull_cascade(&self, cascade: &Cascade) -> Vec<ObjectKey> {
        self.objects
            .iter()
            .filter(|(_, item)| item.casts_shadows())
            .filter(|(_, item)| {
                let to_light = cascade.light_view * item.world();
                let light_space = item.local_bounds().transform(&to_light);
                cascade.light_space_aabb.contains_aabb(&light_space) != Containment::Disjoint
            })
            .map(|(key, _)| key)
            .collect()
    }

    /// Shadow casters touching a local light's bounding volume
    pub fn cull_light(&self, light: &LocalLight) -> Vec<ObjectKey> {
        let bound = light.world_bound();
        self.objects
            .iter()
            .filter(|(_, item)| item.casts_shadows())
            .filter(|(_, item)| bound.intersects_aabb(item.world_bounds()))
            .map(|(key, _)| key)
            .collect()
    }

    /// Pick a LOD for each listed object from its projected size
    ///
    /// Returns how many objects switched LOD.
    pub fn select_lods<I>(&mut self, camera: &Camera, screen_height: u32, keys: I) -> usize
    where
        I: IntoIterator<Item = ObjectKey>,
    {
        let view = camera.view();
        let mut changed = 0;
        for key in keys {
            let Some(item) = self.objects.get_mut(key) else {
                continue;
            };
            let sphere = item.world_sphere();
            let view_z = view.transform_position(&sphere.center).z;
            let lod = self.lod.select(
                sphere.radius,
                view_z,
                screen_height as f32,
                camera.fov_y(),
                item.lods().len(),
            );
            if lod != item.current_lod() {
                log::trace!(
                    "Object {}: LOD {} -> {}",
                    item.id(),
                    item.current_lod(),
                    lod
                );
                item.set_current_lod(lod);
                changed += 1;
            }
        }
        changed
    }

    /// Write dirty object constants into this frame's copy
    ///
    /// Returns the number of objects written.
    pub fn write_constants(&mut self, frame: &mut FrameResource) -> RenderResult<usize> {
        let mut written = 0;
        for item in self.objects.values_mut() {
            if !item.dirty().is_dirty() {
                continue;
            }
            let slot = item.constant_slot().index() as usize;
            frame.objects.copy_element(slot, &item.constants())?;
            item.dirty_mut().consume();
            written += 1;
        }
        Ok(written)
    }

    /// Close the frame: previous-frame matrices catch up with the current ones
    pub fn end_frame(&mut self) {
        for item in self.objects.values_mut() {
            item.advance_prev_world();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ShadowSettings;
    use crate::foundation::bounds::Aabb;
    use crate::foundation::math::{Transform, Vec3};
    use crate::render::api::{GpuAddress, SubmeshRange};
    use crate::render::systems::lighting::{CascadeEngine, LightDesc};
    use crate::render::systems::visibility::object::{LodLevel, ObjectFlags};

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 1.0, 1.0))
    }

    fn desc_at(position: Vec3, flags: ObjectFlags, lods: usize) -> ObjectDesc {
        let range = SubmeshRange {
            vertex_start: 0,
            vertex_count: 24,
            index_start: 0,
            index_count: 36,
        };
        ObjectDesc {
            transform: Transform::from_translation(position),
            local_bounds: unit_box(),
            lods: (0..lods)
                .map(|i| LodLevel::single(format!("cube_lod{}", i), range, 0))
                .collect(),
            flags,
        }
    }

    fn camera() -> Camera {
        let mut camera = Camera::new();
        camera.set_lens(45.0_f32.to_radians(), 1.0, 1.0, 100.0);
        camera.update_view_matrix();
        camera
    }

    fn manager(max_objects: usize) -> ObjectManager {
        ObjectManager::new(&RendererSettings {
            max_objects,
            ..Default::default()
        })
    }

    #[test]
    fn test_camera_culling_policy() {
        let mut objects = manager(8);
        let inside = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 20.0), ObjectFlags::empty(), 1))
            .unwrap();
        let behind = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, -20.0), ObjectFlags::empty(), 1))
            .unwrap();
        // Straddles the far plane
        let straddling = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 100.0), ObjectFlags::TESSELLATED, 1))
            .unwrap();

        let visibility = objects.cull_camera(&camera());
        assert_eq!(visibility.opaque, vec![inside]);
        assert_eq!(visibility.tessellated, vec![straddling]);
        assert_eq!(visibility.culled, 1);
        assert!(!visibility.iter().any(|key| key == behind));
    }

    #[test]
    fn test_scaled_and_rotated_object_culled_in_local_space() {
        let mut objects = manager(2);
        let mut desc = desc_at(Vec3::new(30.0, 0.0, 10.0), ObjectFlags::empty(), 1);
        // Stretched far enough along X to reach back into the frustum
        desc.transform.scale = Vec3::new(28.0, 1.0, 1.0);
        let key = objects.add_object(desc).unwrap();

        assert_eq!(objects.cull_camera(&camera()).opaque, vec![key]);
    }

    #[test]
    fn test_cascade_culling_only_takes_casters() {
        let mut objects = manager(4);
        let caster = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 10.0), ObjectFlags::CAST_SHADOWS, 1))
            .unwrap();
        objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 10.0), ObjectFlags::empty(), 1))
            .unwrap();
        let far_away = objects
            .add_object(desc_at(Vec3::new(5000.0, 0.0, 10.0), ObjectFlags::CAST_SHADOWS, 1))
            .unwrap();

        let mut engine = CascadeEngine::new(ShadowSettings::default());
        let cascades = engine.update(&camera(), &Vec3::new(0.3, -1.0, 0.2)).to_vec();
        let first = objects.cull_cascade(&cascades[0]);
        assert_eq!(first, vec![caster]);
        assert!(cascades.iter().all(|c| !objects.cull_cascade(c).contains(&far_away)));
    }

    #[test]
    fn test_light_culling_uses_world_bounds() {
        let mut objects = manager(4);
        let near = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 6.0), ObjectFlags::CAST_SHADOWS, 1))
            .unwrap();
        objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 40.0), ObjectFlags::CAST_SHADOWS, 1))
            .unwrap();

        let mut registry = crate::render::api::ResourceRegistry::new();
        let settings = RendererSettings::default();
        let mut atlas =
            crate::render::resources::ShadowAtlas::new(&mut registry, &settings.shadows, 1);
        let mut lights = crate::render::systems::lighting::LightingManager::new(&settings);
        let key = lights
            .add_light(
                LightDesc::spot(Vec3::zeros(), Vec3::z(), 10.0, 0.5, Vec3::zeros(), 1.0),
                &mut atlas,
            )
            .unwrap();

        let hit = objects.cull_light(lights.light(key).unwrap());
        assert_eq!(hit, vec![near]);
    }

    #[test]
    fn test_lod_selection_marks_changes() {
        let mut objects = manager(2);
        let key = objects
            .add_object(desc_at(Vec3::new(0.0, 0.0, 90.0), ObjectFlags::empty(), 6))
            .unwrap();
        let camera = camera();

        assert_eq!(objects.select_lods(&camera, 1080, [key]), 1);
        let far_lod = objects.object(key).unwrap().current_lod();
        assert!(far_lod > 0);

        // Same view, same answer
        assert_eq!(objects.select_lods(&camera, 1080, [key]), 0);

        objects
            .object_mut(key)
            .unwrap()
            .set_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 2.0)));
        objects.refresh_transforms();
        objects.select_lods(&camera, 1080, [key]);
        assert_eq!(objects.object(key).unwrap().current_lod(), 0);
    }

    #[test]
    fn test_capacity_and_removal() {
        let mut objects = manager(1);
        let key = objects
            .add_object(desc_at(Vec3::zeros(), ObjectFlags::empty(), 1))
            .unwrap();
        assert_eq!(
            objects.add_object(desc_at(Vec3::zeros(), ObjectFlags::empty(), 1)),
            Err(RenderError::ObjectCapacityExceeded { max: 1 })
        );
        objects.remove_object(key).unwrap();
        assert_eq!(objects.remove_object(key), Err(RenderError::UnknownObject));
        assert!(objects
            .add_object(desc_at(Vec3::zeros(), ObjectFlags::empty(), 1))
            .is_ok());
    }

    #[test]
    fn test_objects_without_lods_rejected() {
        let mut objects = manager(1);
        let desc = desc_at(Vec3::zeros(), ObjectFlags::empty(), 0);
        assert!(matches!(
            objects.add_object(desc),
            Err(RenderError::InvalidConfiguration(_))
        ));
        assert_eq!(objects.object_count(), 0);
    }

    #[test]
    fn test_moved_object_rewrites_previous_world() {
        let settings = RendererSettings {
            frames_in_flight: 2,
            max_objects: 2,
            ..Default::default()
        };
        let mut objects = ObjectManager::new(&settings);
        let mut frame = FrameResource::new(GpuAddress(0), &settings);
        let key = objects
            .add_object(desc_at(Vec3::zeros(), ObjectFlags::empty(), 1))
            .unwrap();
        assert_eq!(objects.write_constants(&mut frame).unwrap(), 1);
        assert_eq!(objects.write_constants(&mut frame).unwrap(), 1);
        objects.end_frame();
        assert_eq!(objects.write_constants(&mut frame).unwrap(), 0);

        objects
            .object_mut(key)
            .unwrap()
            .set_transform(Transform::from_translation(Vec3::new(3.0, 0.0, 0.0)));
        objects.refresh_transforms();
        objects.write_constants(&mut frame).unwrap();
        let staged = frame.objects.staged_element(0).unwrap();
        assert_eq!(staged.transform.world[3][0], 3.0);
        assert_eq!(staged.prev_world[3][0], 0.0);

        // The next frame sees the move as history
        objects.end_frame();
        assert!(objects.object(key).unwrap().dirty().is_dirty());
    }
}
