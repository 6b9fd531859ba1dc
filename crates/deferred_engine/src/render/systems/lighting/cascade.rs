//! Cascaded shadow maps for the directional light
//!
//! The view frustum is cut into equal depth slices. Each slice gets an
//! orthographic light-space box fitted around its eight world-space corners and
//! snapped to the shadow map's texel grid so shadow edges do not shimmer while
//! the camera moves.

use crate::config::ShadowSettings;
use crate::foundation::bounds::Aabb;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec2, Vec3};
use crate::render::primitives::Camera;

/// One depth slice of the view frustum and its light-space fit
#[derive(Debug, Clone, PartialEq)]
pub struct Cascade {
    /// Slice start along the view axis
    pub split_near: f32,
    /// Slice end along the view axis (shared with the next cascade's start)
    pub split_far: f32,
    /// World to light view
    pub light_view: Mat4,
    /// Light view to shadow clip
    pub light_proj: Mat4,
    /// `light_proj * light_view`
    pub view_proj: Mat4,
    /// Snapped light-space box covered by the cascade, used for caster culling
    pub light_space_aabb: Aabb,
}

/// Snap a light-space box to a texel grid in X and Y
///
/// Both the center and the half-extent are rounded to whole texels, so the
/// snapped box always spans an integer number of texels and starts on a texel
/// boundary. Snapping an already snapped box returns it unchanged. Z is left
/// alone.
pub fn snap_to_texel_grid(aabb: &Aabb, units_per_texel: Vec2) -> Aabb {
    let snap = |min: f32, max: f32, unit: f32| {
        if unit <= 0.0 || !unit.is_finite() {
            return (min, max);
        }
        let center = ((min + max) * 0.5 / unit).round() * unit;
        let half = ((max - min) * 0.5 / unit).round() * unit;
        (center - half, center + half)
    };
    let (min_x, max_x) = snap(aabb.min.x, aabb.max.x, units_per_texel.x);
    let (min_y, max_y) = snap(aabb.min.y, aabb.max.y, units_per_texel.y);
    Aabb::new(
        Vec3::new(min_x, min_y, aabb.min.z),
        Vec3::new(max_x, max_y, aabb.max.z),
    )
}

/// Computes cascades from the camera and the light direction
#[derive(Debug, Clone)]
pub struct CascadeEngine {
    settings: ShadowSettings,
    cascades: Vec<Cascade>,
}

impl CascadeEngine {
    /// Create an engine for `settings.cascade_count` cascades
    pub fn new(settings: ShadowSettings) -> Self {
        Self {
            settings,
            cascades: Vec::new(),
        }
    }

    /// Shadow settings in use
    pub fn settings(&self) -> &ShadowSettings {
        &self.settings
    }

    /// Cascades from the last [`CascadeEngine::update`]
    pub fn cascades(&self) -> &[Cascade] {
        &self.cascades
    }

    /// Up axis for the light view; swaps to +Z when the light is close to vertical
    pub fn light_up(&self, light_direction: &Vec3) -> Vec3 {
        if light_direction.dot(&Vec3::y()).abs() > self.settings.up_swap_threshold {
            Vec3::z()
        } else {
            Vec3::y()
        }
    }

    /// Split distances: `cascade_count + 1` boundaries from near to far
    pub fn split_distances(&self, near: f32, far: f32) -> Vec<f32> {
        let count = self.settings.cascade_count;
        (0..=count)
            .map(|i| utils::lerp(near, far, i as f32 / count as f32))
            .collect()
    }

    /// Recompute every cascade for this frame
    ///
    /// `light_direction` is the direction the light travels and must be
    /// normalized.
    pub fn update(&mut self, camera: &Camera, light_direction: &Vec3) -> &[Cascade] {
        let near = camera.near_z();
        let far = camera.far_z();
        let range = far - near;
        let corners = camera.frustum_corners_world();
        let splits = self.split_distances(near, far);
        let up = self.light_up(light_direction);
        let resolution = self.settings.cascade_resolution.max(3) as f32;

        self.cascades.clear();
        for window in splits.windows(2) {
            let (split_near, split_far) = (window[0], window[1]);
            let padded_far = split_far + self.settings.split_padding;
            let t_near = (split_near - near) / range;
            let t_far = (padded_far - near) / range;

            let mut slice = [Vec3::zeros(); 8];
            for j in 0..4 {
                let ray = corners[j + 4] - corners[j];
                slice[j] = corners[j] + ray * t_near;
                slice[j + 4] = corners[j] + ray * t_far;
            }
            let center = slice.iter().fold(Vec3::zeros(), |acc, c| acc + c) / 8.0;

            let eye = center - light_direction * self.settings.light_distance;
            let light_view = Mat4::look_at_left_handed(eye, center, up);

            let light_corners = slice.map(|corner| light_view.transform_position(&corner));
            let Some(mut bounds) = Aabb::from_points(&light_corners) else {
                continue;
            };
            bounds.min.z -= self.settings.z_padding;
            bounds.max.z += self.settings.z_padding;

            // One spare texel on each side absorbs the snap offset
            let size = bounds.max - bounds.min;
            let units_per_texel = Vec2::new(size.x, size.y) / (resolution - 2.0);
            bounds.min.x -= units_per_texel.x;
            bounds.min.y -= units_per_texel.y;
            bounds.max.x += units_per_texel.x;
            bounds.max.y += units_per_texel.y;
            let snapped = snap_to_texel_grid(&bounds, units_per_texel);

            let light_proj = Mat4::orthographic_off_center_lh(
                snapped.min.x,
                snapped.max.x,
                snapped.min.y,
                snapped.max.y,
                snapped.min.z,
                snapped.max.z,
            );

            self.cascades.push(Cascade {
                split_near,
                split_far,
                light_view,
                light_proj,
                view_proj: light_proj * light_view,
                light_space_aabb: snapped,
            });
        }

        log::trace!(
            "Cascades updated: splits {:?}",
            self.cascades.iter().map(|c| c.split_far).collect::<Vec<_>>()
        );
        &self.cascades
    }
}
