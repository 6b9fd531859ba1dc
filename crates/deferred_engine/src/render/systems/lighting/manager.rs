//! Light storage, per-frame light visibility and shadow caster selection

use slotmap::{new_key_type, SlotMap};

use crate::config::RendererSettings;
use crate::foundation::bounds::Containment;
use crate::foundation::collections::SlotPool;
use crate::foundation::math::{Mat4Ext, Vec3};
use crate::render::error::{RenderError, RenderResult};
use crate::render::frame::constants::{
    gpu_mat4, CascadeConstants, DirectionalLightConstants, ShadowViewConstants,
};
use crate::render::frame::FrameResource;
use crate::render::primitives::Camera;
use crate::render::resources::ShadowAtlas;
use crate::render::systems::lighting::cascade::{Cascade, CascadeEngine};
use crate::render::systems::lighting::light::{DirectionalLight, LightDesc, LocalLight};

new_key_type! {
    /// Stable key of a local light
    pub struct LightKey;
}

/// Where a light stands relative to the camera this frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightClass {
    /// The light volume does not touch the view frustum
    Outside,
    /// The camera position is inside the light volume
    ContainingCamera,
    /// The light volume overlaps the frustum but does not contain the camera
    InsideFrustum,
}

/// Per-frame light lists, rebuilt from scratch every frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LightVisibility {
    /// Lights whose volume contains the camera
    pub containing: Vec<LightKey>,
    /// Lights visible in the frustum that do not contain the camera
    pub inside: Vec<LightKey>,
    /// Visible, active spot lights that render a shadow map this frame
    pub shadow_casters: Vec<LightKey>,
    /// Active lights rejected by the frustum
    pub culled: usize,
}

/// Classify one light against the camera
///
/// A light around the camera position contains the camera even when its
/// volume ends before the near plane. Otherwise the view frustum is carried
/// into the light's local space, where the light volume is a fixed unit
/// shape, so the test never depends on the light's world transform.
pub fn classify_light(light: &LocalLight, camera: &Camera) -> LightClass {
    let eye = light.inv_world().transform_position(&camera.position());
    if light.local_bound().contains_point(&eye) {
        return LightClass::ContainingCamera;
    }

    let to_light = light.inv_world() * camera.inv_view();
    let local_frustum = camera.frustum().transform(&to_light);
    if local_frustum.contains_sphere(light.local_bound()) == Containment::Disjoint {
        LightClass::Outside
    } else {
        LightClass::InsideFrustum
    }
}

/// Owns every light and the cascade engine
#[derive(Debug)]
pub struct LightingManager {
    lights: SlotMap<LightKey, LocalLight>,
    slots: SlotPool,
    sun: DirectionalLight,
    cascades: CascadeEngine,
    visibility: LightVisibility,
    frames: usize,
}

impl LightingManager {
    /// Create an empty manager sized from `settings`
    pub fn new(settings: &RendererSettings) -> Self {
        Self {
            lights: SlotMap::with_key(),
            slots: SlotPool::new("local light array", settings.max_local_lights),
            sun: DirectionalLight::new(
                Vec3::new(0.3, -1.0, 0.2),
                Vec3::new(1.0, 0.96, 0.9),
                3.0,
                settings.frames_in_flight,
            ),
            cascades: CascadeEngine::new(settings.shadows.clone()),
            visibility: LightVisibility::default(),
            frames: settings.frames_in_flight,
        }
    }

    /// Add a light, reserving its array slot and shadow layer
    ///
    /// Fails without side effects when the light array is full.
    pub fn add_light(&mut self, desc: LightDesc, atlas: &mut ShadowAtlas) -> RenderResult<LightKey> {
        if self.slots.available() == 0 {
            log::warn!(
                "Refusing to add light: all {} light slots are in use",
                self.slots.capacity()
            );
            return Err(RenderError::LightCapacityExceeded {
                max: self.slots.capacity(),
            });
        }
        let slot = self.slots.allocate()?;
        let layer = match atlas.allocate_local() {
            Ok(layer) => layer,
            Err(err) => {
                self.slots.free(slot)?;
                return Err(err);
            }
        };

        let light = LocalLight::new(desc, slot, layer, self.frames);
        log::info!(
            "Added {:?} light in slot {} (radius {})",
            light.light_type(),
            slot.index(),
            light.desc().radius
        );
        Ok(self.lights.insert(light))
    }

    /// Remove a light and release its slot and layer
    ///
    /// The caller must make sure the GPU no longer reads the light's data.
    pub fn remove_light(&mut self, key: LightKey, atlas: &mut ShadowAtlas) -> RenderResult<()> {
        let light = self.lights.remove(key).ok_or(RenderError::UnknownLight)?;
        self.slots.free(light.slot())?;
        atlas.free_local(light.shadow_layer())?;
        log::info!("Removed light from slot {}", light.slot().index());
        Ok(())
    }

    /// A light by key
    pub fn light(&self, key: LightKey) -> Option<&LocalLight> {
        self.lights.get(key)
    }

    /// A light by key, for editing
    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut LocalLight> {
        self.lights.get_mut(key)
    }

    /// Every light
    pub fn lights(&self) -> impl Iterator<Item = (LightKey, &LocalLight)> {
        self.lights.iter()
    }

    /// Number of lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// The sun
    pub fn sun(&self) -> &DirectionalLight {
        &self.sun
    }

    /// The sun, for editing
    pub fn sun_mut(&mut self) -> &mut DirectionalLight {
        &mut self.sun
    }

    /// Cascades of the current frame
    pub fn cascades(&self) -> &[Cascade] {
        self.cascades.cascades()
    }

    /// Light lists of the current frame
    pub fn visibility(&self) -> &LightVisibility {
        &self.visibility
    }

    /// Recompute the directional cascades
    pub fn update_cascades(&mut self, camera: &Camera) -> &[Cascade] {
        let direction = self.sun.direction();
        self.cascades.update(camera, &direction)
    }

    /// Rebuild the light lists for this frame
    ///
    /// Every active light lands in at most one of the two lists.
    pub fn classify(&mut self, camera: &Camera) -> &LightVisibility {
        let mut visibility = LightVisibility::default();
        for (key, light) in self.lights.iter().filter(|(_, light)| light.is_active()) {
            let class = classify_light(light, camera);
            log::trace!("Light slot {}: {:?}", light.slot().index(), class);
            match class {
                LightClass::Outside => {
                    visibility.culled += 1;
                    continue;
                }
                LightClass::ContainingCamera => visibility.containing.push(key),
                LightClass::InsideFrustum => visibility.inside.push(key),
            }
            if light.casts_shadows() {
                visibility.shadow_casters.push(key);
            }
        }
        log::debug!(
            "Lights: {} containing camera, {} inside frustum, {} culled, {} casting shadows",
            visibility.containing.len(),
            visibility.inside.len(),
            visibility.culled,
            visibility.shadow_casters.len()
        );
        self.visibility = visibility;
        &self.visibility
    }

    /// Write dirty light constants into this frame's copy
    ///
    /// Returns the number of lights written.
    pub fn write_light_constants(
        &mut self,
        frame: &mut FrameResource,
        atlas: &ShadowAtlas,
    ) -> RenderResult<usize> {
        let mut written = 0;
        for light in self.lights.values_mut() {
            if !light.dirty().is_dirty() {
                continue;
            }
            let shadow_layer = if light.casts_shadows() {
                Some(atlas.local_layer(light.shadow_layer())?)
            } else {
                None
            };
            let slot = light.slot().index() as usize;
            frame
                .local_lights
                .copy_element(slot, &light.constants(shadow_layer))?;
            light.dirty_mut().consume();
            written += 1;
        }

        if self.sun.dirty_mut().consume() {
            frame.directional_light.copy_element(
                0,
                &DirectionalLightConstants::new(
                    &self.sun.direction(),
                    &self.sun.color(),
                    self.sun.intensity(),
                    self.cascades.settings().cascade_count as u32,
                ),
            )?;
        }
        Ok(written)
    }

    /// Write both visible-light index lists; returns (containing, inside) counts
    pub fn write_visibility(&self, frame: &mut FrameResource) -> RenderResult<(u32, u32)> {
        for (i, key) in self.visibility.containing.iter().enumerate() {
            let slot = self.slot_of(*key)?;
            frame.containing_light_indices.copy_element(i, &slot)?;
        }
        for (i, key) in self.visibility.inside.iter().enumerate() {
            let slot = self.slot_of(*key)?;
            frame.inside_light_indices.copy_element(i, &slot)?;
        }
        Ok((
            self.visibility.containing.len() as u32,
            self.visibility.inside.len() as u32,
        ))
    }

    /// Write cascade constants and every shadow view of this frame
    ///
    /// Bit `i` of `rendered_cascades` is set when cascade `i` renders its
    /// layer this frame.
    pub fn write_shadow_constants(
        &self,
        frame: &mut FrameResource,
        atlas: &ShadowAtlas,
        rendered_cascades: u32,
    ) -> RenderResult<()> {
        for (i, cascade) in self.cascades.cascades().iter().enumerate() {
            let layer = atlas.cascade_layer(i);
            frame.cascades.copy_element(
                i,
                &CascadeConstants {
                    view_proj: gpu_mat4(&cascade.view_proj),
                    split_near: cascade.split_near,
                    split_far: cascade.split_far,
                    layer,
                    rendered: (rendered_cascades >> i) & 1,
                },
            )?;
            frame.shadow_views.copy_element(
                layer as usize,
                &ShadowViewConstants {
                    view_proj: gpu_mat4(&cascade.view_proj),
                },
            )?;
        }
        for key in &self.visibility.shadow_casters {
            let light = self.lights.get(*key).ok_or(RenderError::UnknownLight)?;
            let layer = atlas.local_layer(light.shadow_layer())?;
            frame.shadow_views.copy_element(
                layer as usize,
                &ShadowViewConstants {
                    view_proj: gpu_mat4(&light.shadow_view_proj()),
                },
            )?;
        }
        Ok(())
    }

    fn slot_of(&self, key: LightKey) -> RenderResult<u32> {
        self.lights
            .get(key)
            .map(|light| light.slot().index())
            .ok_or(RenderError::UnknownLight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::{GpuAddress, ResourceRegistry};

    fn setup(max_lights: usize) -> (LightingManager, ShadowAtlas, Camera) {
        let settings = RendererSettings {
            max_local_lights: max_lights,
            ..Default::default()
        };
        let mut registry = ResourceRegistry::new();
        let atlas = ShadowAtlas::new(&mut registry, &settings.shadows, max_lights);
        let mut camera = Camera::new();
        camera.set_lens(1.0, 1.0, 1.0, 100.0);
        camera.update_view_matrix();
        (LightingManager::new(&settings), atlas, camera)
    }

    #[test]
    fn test_light_at_camera_contains_camera() {
        let (mut manager, mut atlas, camera) = setup(4);
        let key = manager
            .add_light(LightDesc::point(Vec3::zeros(), 5.0, Vec3::zeros(), 1.0), &mut atlas)
            .unwrap();

        let visibility = manager.classify(&camera);
        assert_eq!(visibility.containing, vec![key]);
        assert!(visibility.inside.is_empty());
    }

    #[test]
    fn test_light_ending_before_near_plane_contains_camera() {
        let (mut manager, mut atlas, mut camera) = setup(2);
        camera.set_lens(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 10.0, 1000.0);
        camera.update_view_matrix();

        let around = manager
            .add_light(LightDesc::point(Vec3::zeros(), 5.0, Vec3::zeros(), 1.0), &mut atlas)
            .unwrap();
        let behind = manager
            .add_light(LightDesc::point(Vec3::new(0.0, 0.0, -20.0), 5.0, Vec3::zeros(), 1.0), &mut atlas)
            .unwrap();

        assert_eq!(
            classify_light(manager.light(around).unwrap(), &camera),
            LightClass::ContainingCamera
        );
        let visibility = manager.classify(&camera);
        assert_eq!(visibility.containing, vec![around]);
        assert!(visibility.inside.is_empty());
        assert!(!visibility.containing.contains(&behind));
        assert_eq!(visibility.culled, 1);
    }

    #[test]
    fn test_lights_classified_exclusively() {
        let (mut manager, mut atlas, camera) = setup(4);
        let ahead = manager
            .add_light(LightDesc::point(Vec3::new(0.0, 0.0, 30.0), 2.0, Vec3::zeros(), 1.0), &mut atlas)
            .unwrap();
        let behind = manager
            .add_light(LightDesc::point(Vec3::new(0.0, 0.0, -30.0), 2.0, Vec3::zeros(), 1.0), &mut atlas)
            .unwrap();
        let spot = manager
            .add_light(
                LightDesc::spot(Vec3::new(1.0, 0.0, 10.0), Vec3::z(), 8.0, 0.4, Vec3::zeros(), 1.0),
                &mut atlas,
            )
            .unwrap();

        let visibility = manager.classify(&camera).clone();
        assert_eq!(visibility.inside.len(), 2);
        assert!(visibility.inside.contains(&ahead));
        assert!(visibility.inside.contains(&spot));
        assert!(!visibility.containing.contains(&behind));
        assert_eq!(visibility.culled, 1);
        assert_eq!(visibility.shadow_casters, vec![spot]);
    }

    #[test]
    fn test_inactive_lights_skipped() {
        let (mut manager, mut atlas, camera) = setup(2);
        let key = manager
            .add_light(
                LightDesc::spot(Vec3::new(0.0, 0.0, 10.0), Vec3::z(), 8.0, 0.4, Vec3::zeros(), 1.0),
                &mut atlas,
            )
            .unwrap();
        manager.light_mut(key).unwrap().set_active(false);

        let visibility = manager.classify(&camera);
        assert!(visibility.inside.is_empty());
        assert!(visibility.shadow_casters.is_empty());
        assert_eq!(visibility.culled, 0);
    }

    #[test]
    fn test_capacity_exceeded_is_reported() {
        let (mut manager, mut atlas, _) = setup(1);
        manager.add_light(LightDesc::default(), &mut atlas).unwrap();
        assert_eq!(
            manager.add_light(LightDesc::default(), &mut atlas),
            Err(RenderError::LightCapacityExceeded { max: 1 })
        );
        assert_eq!(manager.light_count(), 1);
    }

    #[test]
    fn test_removed_light_frees_slot_for_reuse() {
        let (mut manager, mut atlas, _) = setup(1);
        let key = manager.add_light(LightDesc::default(), &mut atlas).unwrap();
        manager.remove_light(key, &mut atlas).unwrap();
        assert_eq!(manager.remove_light(key, &mut atlas), Err(RenderError::UnknownLight));
        assert!(manager.add_light(LightDesc::default(), &mut atlas).is_ok());
    }

    #[test]
    fn test_constants_written_once_per_frame_copy() {
        let settings = RendererSettings {
            max_local_lights: 2,
            frames_in_flight: 2,
            ..Default::default()
        };
        let mut registry = ResourceRegistry::new();
        let mut atlas = ShadowAtlas::new(&mut registry, &settings.shadows, 2);
        let mut manager = LightingManager::new(&settings);
        let mut frame = FrameResource::new(GpuAddress(0), &settings);
        manager.add_light(LightDesc::default(), &mut atlas).unwrap();

        assert_eq!(manager.write_light_constants(&mut frame, &atlas).unwrap(), 1);
        assert_eq!(manager.write_light_constants(&mut frame, &atlas).unwrap(), 1);
        assert_eq!(manager.write_light_constants(&mut frame, &atlas).unwrap(), 0);
        assert_eq!(frame.local_lights.staged_element(0).unwrap().active, 1);
    }

    #[test]
    fn test_cascade_constants_flag_rendered_layers() {
        let (mut manager, atlas, camera) = setup(2);
        let settings = RendererSettings::default();
        let mut frame = FrameResource::new(GpuAddress(0), &settings);
        manager.update_cascades(&camera);
        assert_eq!(manager.cascades().len(), 3);

        manager.write_shadow_constants(&mut frame, &atlas, 0b101).unwrap();
        let rendered: Vec<_> = (0..3)
            .map(|i| frame.cascades.staged_element(i).unwrap().rendered)
            .collect();
        assert_eq!(rendered, vec![1, 0, 1]);
    }
}
