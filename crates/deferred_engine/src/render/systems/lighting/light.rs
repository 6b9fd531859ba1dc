//! Light types
//!
//! Local lights keep their editable parameters authoritative and derive the
//! world transform and bounding volume from them. Every edit marks all frame
//! copies of the light's constants stale.

use crate::foundation::bounds::BoundingSphere;
use crate::foundation::collections::SlotHandle;
use crate::foundation::math::{constants, Mat4, Mat4Ext, Quat, Vec3};
use crate::render::frame::constants::{gpu_mat4, LocalLightConstants};
use crate::render::frame::DirtyFrames;
use crate::render::resources::ShadowLayer;

/// Largest spot half-angle; the cone volume mesh degenerates beyond this
pub const MAX_SPOT_ANGLE: f32 = 89.0 * constants::DEG_TO_RAD;

/// Near plane of spot light shadow projections
pub const SPOT_SHADOW_NEAR: f32 = 0.1;

/// Local light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Omnidirectional light with a spherical volume (never casts shadows)
    Point,
    /// Cone of light along `direction`
    Spot,
}

impl LightType {
    /// Mesh drawn for the light volume
    pub fn volume_mesh(self) -> &'static str {
        match self {
            LightType::Point => "light_sphere",
            LightType::Spot => "light_cone",
        }
    }
}

/// Parameters of a local light
#[derive(Debug, Clone, PartialEq)]
pub struct LightDesc {
    /// Light type
    pub light_type: LightType,
    /// Position in world space
    pub position: Vec3,
    /// Direction (spot lights)
    pub direction: Vec3,
    /// Range in world units
    pub radius: f32,
    /// Spot half-angle in radians
    pub angle: f32,
    /// Linear color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
    /// Inactive lights are neither lit nor shadowed
    pub active: bool,
}

impl Default for LightDesc {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            position: Vec3::zeros(),
            direction: Vec3::new(0.0, -1.0, 0.0),
            radius: 10.0,
            angle: 30.0 * constants::DEG_TO_RAD,
            color: Vec3::new(1.0, 1.0, 1.0),
            intensity: 1.0,
            active: true,
        }
    }
}

impl LightDesc {
    /// Point light description
    pub fn point(position: Vec3, radius: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            radius,
            color,
            intensity,
            ..Default::default()
        }
    }

    /// Spot light description
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        radius: f32,
        angle: f32,
        color: Vec3,
        intensity: f32,
    ) -> Self {
        Self {
            light_type: LightType::Spot,
            position,
            direction,
            radius,
            angle,
            color,
            intensity,
            active: true,
        }
    }
}

/// Bounding sphere of a cone with unit slant length and half-angle `angle`
///
/// The cone's apex is at the origin and it opens along +Z. Wide cones are
/// bounded by the sphere through their rim; narrow cones by the sphere through
/// apex and rim.
pub fn cone_bound(angle: f32) -> BoundingSphere {
    if angle > constants::PI / 4.0 {
        BoundingSphere::new(Vec3::new(0.0, 0.0, angle.cos()), angle.sin())
    } else {
        let radius = 1.0 / (2.0 * angle.cos());
        BoundingSphere::new(Vec3::new(0.0, 0.0, radius), radius)
    }
}

fn rotation_from_z(direction: &Vec3) -> Quat {
    Quat::rotation_between(&Vec3::z(), direction)
        .unwrap_or_else(|| Quat::from_axis_angle(&Vec3::x_axis(), constants::PI))
}

/// A point or spot light
#[derive(Debug, Clone)]
pub struct LocalLight {
    desc: LightDesc,
    world: Mat4,
    inv_world: Mat4,
    local_bound: BoundingSphere,
    world_bound: BoundingSphere,
    dirty: DirtyFrames,
    slot: SlotHandle,
    shadow_layer: ShadowLayer,
}

impl LocalLight {
    /// Build a light in array slot `slot` with shadow layer `shadow_layer`
    pub fn new(desc: LightDesc, slot: SlotHandle, shadow_layer: ShadowLayer, frames: usize) -> Self {
        let mut light = Self {
            desc: LightDesc {
                angle: desc.angle.clamp(f32::EPSILON, MAX_SPOT_ANGLE),
                ..desc
            },
            world: Mat4::identity(),
            inv_world: Mat4::identity(),
            local_bound: BoundingSphere::new(Vec3::zeros(), 1.0),
            world_bound: BoundingSphere::new(Vec3::zeros(), 1.0),
            dirty: DirtyFrames::new(frames),
            slot,
            shadow_layer,
        };
        if light.desc.light_type == LightType::Spot && !light.has_valid_direction() {
            log::warn!("Spot light created with zero-length direction, pointing it down");
            light.desc.direction = Vec3::new(0.0, -1.0, 0.0);
        }
        light.rebuild();
        light
    }

    fn has_valid_direction(&self) -> bool {
        self.desc.direction.norm() > constants::DIRECTION_EPSILON
    }

    /// Recompute the world transform and bounds from the parameters
    ///
    /// A spot light with a zero-length direction keeps its previous transform.
    fn rebuild(&mut self) {
        if self.desc.light_type == LightType::Spot && !self.has_valid_direction() {
            log::debug!("Spot light direction is zero-length, keeping previous transform");
            return;
        }

        let rotation = match self.desc.light_type {
            LightType::Point => Quat::identity(),
            LightType::Spot => rotation_from_z(&self.desc.direction.normalize()),
        };
        let radius = self.desc.radius.max(f32::EPSILON);

        self.world = Mat4::new_translation(&self.desc.position)
            * rotation.to_homogeneous()
            * Mat4::new_scaling(radius);
        self.inv_world = self.world.try_inverse().unwrap_or_else(Mat4::identity);
        self.local_bound = match self.desc.light_type {
            LightType::Point => BoundingSphere::new(Vec3::zeros(), 1.0),
            LightType::Spot => cone_bound(self.desc.angle),
        };
        self.world_bound = self.local_bound.transform(&self.world);
    }

    fn edited(&mut self) {
        self.rebuild();
        self.dirty.mark();
    }

    /// Current parameters
    pub fn desc(&self) -> &LightDesc {
        &self.desc
    }

    /// Replace every parameter at once
    pub fn set_desc(&mut self, desc: LightDesc) {
        self.desc = LightDesc {
            angle: desc.angle.clamp(f32::EPSILON, MAX_SPOT_ANGLE),
            ..desc
        };
        self.edited();
    }

    /// Light type
    pub fn light_type(&self) -> LightType {
        self.desc.light_type
    }

    /// Change the light type
    pub fn set_type(&mut self, light_type: LightType) {
        self.desc.light_type = light_type;
        self.edited();
    }

    /// Move the light
    pub fn set_position(&mut self, position: Vec3) {
        self.desc.position = position;
        self.edited();
    }

    /// Aim the light; a zero-length direction leaves the transform unchanged
    pub fn set_direction(&mut self, direction: Vec3) {
        self.desc.direction = direction;
        self.edited();
    }

    /// Set the range
    pub fn set_radius(&mut self, radius: f32) {
        self.desc.radius = radius;
        self.edited();
    }

    /// Set the spot half-angle, clamped below [`MAX_SPOT_ANGLE`]
    pub fn set_angle(&mut self, angle: f32) {
        self.desc.angle = angle.clamp(f32::EPSILON, MAX_SPOT_ANGLE);
        self.edited();
    }

    /// Set the color
    pub fn set_color(&mut self, color: Vec3) {
        self.desc.color = color;
        self.dirty.mark();
    }

    /// Set the intensity
    pub fn set_intensity(&mut self, intensity: f32) {
        self.desc.intensity = intensity;
        self.dirty.mark();
    }

    /// Enable or disable the light
    pub fn set_active(&mut self, active: bool) {
        self.desc.active = active;
        self.dirty.mark();
    }

    /// Whether the light is active
    pub fn is_active(&self) -> bool {
        self.desc.active
    }

    /// Whether the light renders a shadow map this frame if visible
    pub fn casts_shadows(&self) -> bool {
        self.desc.active && self.desc.light_type == LightType::Spot
    }

    /// Light volume to world (`T * R * S(radius)`)
    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    /// World to light volume
    pub fn inv_world(&self) -> &Mat4 {
        &self.inv_world
    }

    /// Bounding sphere in light-local space
    pub fn local_bound(&self) -> &BoundingSphere {
        &self.local_bound
    }

    /// Bounding sphere in world space
    pub fn world_bound(&self) -> &BoundingSphere {
        &self.world_bound
    }

    /// Transform of the volume mesh (unit sphere or unit cone)
    pub fn volume_transform(&self) -> Mat4 {
        match self.desc.light_type {
            LightType::Point => self.world,
            LightType::Spot => {
                let spread = self.desc.angle.tan();
                self.world * Mat4::new_nonuniform_scaling(&Vec3::new(spread, spread, 1.0))
            }
        }
    }

    /// World to shadow clip for a spot light
    pub fn shadow_view_proj(&self) -> Mat4 {
        let direction = self.world.transform_vector(&Vec3::z()).normalize();
        let up = if direction.y.abs() > 0.9 {
            Vec3::new(0.0, 0.0, 1.0)
        } else {
            Vec3::new(0.0, 1.0, 0.0)
        };
        let position = self.desc.position;
        let view = Mat4::look_at_left_handed(position, position + direction, up);
        let far = self.desc.radius.max(SPOT_SHADOW_NEAR * 2.0);
        let proj = Mat4::perspective_lh(2.0 * self.desc.angle, 1.0, SPOT_SHADOW_NEAR, far);
        proj * view
    }

    /// Array slot handle
    pub fn slot(&self) -> SlotHandle {
        self.slot
    }

    /// Shadow atlas layer handle
    pub fn shadow_layer(&self) -> ShadowLayer {
        self.shadow_layer
    }

    /// Dirty-frame counter
    pub fn dirty(&self) -> &DirtyFrames {
        &self.dirty
    }

    pub(crate) fn dirty_mut(&mut self) -> &mut DirtyFrames {
        &mut self.dirty
    }

    /// GPU constants; `shadow_layer` is the atlas layer when the light casts shadows
    pub fn constants(&self, shadow_layer: Option<u32>) -> LocalLightConstants {
        let d = &self.desc;
        let shadow_view_proj = match shadow_layer {
            Some(_) => self.shadow_view_proj(),
            None => Mat4::identity(),
        };
        LocalLightConstants {
            world: gpu_mat4(&self.volume_transform()),
            shadow_view_proj: gpu_mat4(&shadow_view_proj),
            position: [d.position.x, d.position.y, d.position.z],
            radius: d.radius,
            direction: {
                let dir = self.world.transform_vector(&Vec3::z());
                let dir = if dir.norm() > 0.0 { dir.normalize() } else { dir };
                [dir.x, dir.y, dir.z]
            },
            angle: d.angle,
            color: [d.color.x, d.color.y, d.color.z],
            intensity: d.intensity,
            light_type: match d.light_type {
                LightType::Point => 0,
                LightType::Spot => 1,
            },
            shadow_layer: shadow_layer.map_or(-1, |layer| layer as i32),
            active: u32::from(d.active),
            _padding: 0,
        }
    }
}

/// The sun
#[derive(Debug, Clone)]
pub struct DirectionalLight {
    direction: Vec3,
    color: Vec3,
    intensity: f32,
    dirty: DirtyFrames,
}

impl DirectionalLight {
    /// Sun shining along `direction`
    pub fn new(direction: Vec3, color: Vec3, intensity: f32, frames: usize) -> Self {
        let direction = if direction.norm() > constants::DIRECTION_EPSILON {
            direction.normalize()
        } else {
            log::warn!("Directional light created with zero-length direction, pointing it down");
            Vec3::new(0.0, -1.0, 0.0)
        };
        Self {
            direction,
            color,
            intensity,
            dirty: DirtyFrames::new(frames),
        }
    }

    /// Normalized direction the light travels
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Re-aim the sun; a zero-length direction is ignored
    pub fn set_direction(&mut self, direction: Vec3) {
        if direction.norm() <= constants::DIRECTION_EPSILON {
            log::debug!("Ignoring zero-length sun direction");
            return;
        }
        self.direction = direction.normalize();
        self.dirty.mark();
    }

    /// Linear color
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Set the color
    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
        self.dirty.mark();
    }

    /// Intensity multiplier
    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    /// Set the intensity
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity;
        self.dirty.mark();
    }

    pub(crate) fn dirty_mut(&mut self) -> &mut DirtyFrames {
        &mut self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::SlotPool;
    use approx::assert_relative_eq;

    fn handles() -> (SlotHandle, ShadowLayer) {
        let mut slots = SlotPool::new("lights", 4);
        let mut layers = SlotPool::new("layers", 4);
        (
            slots.allocate().unwrap(),
            ShadowLayer::from_handle(layers.allocate().unwrap()),
        )
    }

    #[test]
    fn test_cone_bound_encloses_cone() {
        for degrees in [10.0_f32, 30.0, 45.0, 60.0, 85.0] {
            let angle = degrees.to_radians();
            let bound = cone_bound(angle);
            let apex = Vec3::zeros();
            let rim = Vec3::new(angle.sin(), 0.0, angle.cos());
            let tip = Vec3::new(0.0, 0.0, 1.0);
            for point in [apex, rim, tip] {
                assert!(
                    (point - bound.center).norm() <= bound.radius + 1e-5,
                    "{degrees} deg cone not enclosed"
                );
            }
        }
    }

    #[test]
    fn test_spot_transform_points_along_direction() {
        let (slot, layer) = handles();
        let light = LocalLight::new(
            LightDesc::spot(
                Vec3::new(1.0, 2.0, 3.0),
                Vec3::new(0.0, -2.0, 0.0),
                5.0,
                0.5,
                Vec3::new(1.0, 1.0, 1.0),
                1.0,
            ),
            slot,
            layer,
            3,
        );

        let tip = light.world().transform_position(&Vec3::z());
        assert_relative_eq!(tip, Vec3::new(1.0, -3.0, 3.0), epsilon = 1e-5);
        assert!(light.casts_shadows());
    }

    #[test]
    fn test_zero_direction_keeps_previous_transform() {
        let (slot, layer) = handles();
        let mut light = LocalLight::new(
            LightDesc::spot(Vec3::zeros(), Vec3::x(), 2.0, 0.3, Vec3::zeros(), 1.0),
            slot,
            layer,
            2,
        );
        let before = *light.world();

        light.set_direction(Vec3::zeros());
        assert_eq!(*light.world(), before);
        assert!(light.dirty().is_dirty());
    }

    #[test]
    fn test_edits_mark_every_frame_dirty() {
        let (slot, layer) = handles();
        let mut light = LocalLight::new(LightDesc::default(), slot, layer, 3);
        while light.dirty_mut().consume() {}

        light.set_intensity(4.0);
        assert_eq!(light.dirty().remaining(), 3);
    }

    #[test]
    fn test_point_light_bound_scales_with_radius() {
        let (slot, layer) = handles();
        let light = LocalLight::new(
            LightDesc::point(Vec3::new(0.0, 1.0, 0.0), 5.0, Vec3::zeros(), 1.0),
            slot,
            layer,
            1,
        );
        assert_relative_eq!(light.world_bound().radius, 5.0, epsilon = 1e-5);
        assert_relative_eq!(light.world_bound().center, Vec3::new(0.0, 1.0, 0.0));
        assert!(!light.casts_shadows());
        assert_eq!(light.constants(None).shadow_layer, -1);
    }

    #[test]
    fn test_sun_ignores_zero_direction() {
        let mut sun = DirectionalLight::new(Vec3::new(0.0, -2.0, 0.0), Vec3::zeros(), 1.0, 2);
        sun.set_direction(Vec3::zeros());
        assert_relative_eq!(sun.direction(), Vec3::new(0.0, -1.0, 0.0));
    }
}
