//! Math utilities and types
//!
//! Provides the vector, matrix and quaternion aliases used across the renderer,
//! plus the left-handed projection helpers the shadow and culling code relies on.
//!
//! # Conventions
//! - Column vectors: `p' = M * p`, so `A * B` applies `B` first.
//! - View space is left-handed: +X right, +Y up, +Z forward into the screen.
//! - Clip-space depth maps to `[0, 1]`.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Decomposed object transform (translation, rotation, scale)
///
/// Stored decomposed so the editor can tweak each part independently; the
/// world matrix is recomposed as `T * R * S` whenever the owner is dirty.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Translation in world space
    pub translation: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Per-axis scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a transform with only a translation
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Create a transform from all three parts
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            translation,
            rotation,
            scale,
        }
    }

    /// Create a transform from Euler angles in radians (roll, pitch, yaw)
    pub fn from_euler(translation: Vec3, euler: Vec3, scale: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::from_euler_angles(euler.x, euler.y, euler.z),
            scale,
        }
    }

    /// Recompose into a world matrix (`T * R * S`)
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.translation)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;

    /// Tolerance below which a direction vector is treated as zero-length
    pub const DIRECTION_EPSILON: f32 = 1.0e-6;
}

/// Math utility functions
pub mod utils {
    use super::constants;

    /// Convert degrees to radians
    pub fn deg_to_rad(degrees: f32) -> f32 {
        degrees * constants::DEG_TO_RAD
    }

    /// Linear interpolation
    pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
        a + (b - a) * t
    }

    /// Element `index` (1-based) of the Halton low-discrepancy sequence in `base`
    pub fn halton(mut index: u32, base: u32) -> f32 {
        let mut fraction = 1.0;
        let mut result = 0.0;
        while index > 0 {
            fraction /= base as f32;
            result += fraction * (index % base) as f32;
            index /= base;
        }
        result
    }
}

/// Extension trait for Mat4 with the left-handed helpers used by the renderer
pub trait Mat4Ext {
    /// Left-handed perspective projection, depth mapped to `[0, 1]`
    fn perspective_lh(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;

    /// Left-handed off-center orthographic projection, depth mapped to `[0, 1]`
    fn orthographic_off_center_lh(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Mat4;

    /// Left-handed look-at view matrix
    fn look_at_left_handed(eye: Vec3, target: Vec3, up: Vec3) -> Mat4;

    /// Transform a position, including the homogeneous divide
    fn transform_position(&self, position: &Vec3) -> Vec3;
}

impl Mat4Ext for Mat4 {
    fn perspective_lh(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        // P = [1/(a*tan)  0        0            0          ]
        //     [0          1/tan    0            0          ]
        //     [0          0        f/(f-n)      -nf/(f-n)  ]
        //     [0          0        1            0          ]
        let tan_half_fovy = (fov_y * 0.5).tan();
        let range = far / (far - near);

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = range;
        result[(2, 3)] = -near * range;
        result[(3, 2)] = 1.0;
        result
    }

    #[rustfmt::skip]
    fn orthographic_off_center_lh(
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) -> Mat4 {
        let width = right - left;
        let height = top - bottom;
        let depth = far - near;

        Mat4::new(
            2.0 / width, 0.0, 0.0, -(right + left) / width,
            0.0, 2.0 / height, 0.0, -(top + bottom) / height,
            0.0, 0.0, 1.0 / depth, -near / depth,
            0.0, 0.0, 0.0, 1.0,
        )
    }

    #[rustfmt::skip]
    fn look_at_left_handed(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
        let forward = (target - eye).normalize();
        let right = up.cross(&forward).normalize();
        let camera_up = forward.cross(&right);

        Mat4::new(
            right.x, right.y, right.z, -right.dot(&eye),
            camera_up.x, camera_up.y, camera_up.z, -camera_up.dot(&eye),
            forward.x, forward.y, forward.z, -forward.dot(&eye),
            0.0, 0.0, 0.0, 1.0,
        )
    }

    fn transform_position(&self, position: &Vec3) -> Vec3 {
        let h = self * Vec4::new(position.x, position.y, position.z, 1.0);
        if h.w.abs() > f32::EPSILON && (h.w - 1.0).abs() > f32::EPSILON {
            Vec3::new(h.x / h.w, h.y / h.w, h.z / h.w)
        } else {
            Vec3::new(h.x, h.y, h.z)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_maps_near_and_far_to_unit_depth() {
        let proj = Mat4::perspective_lh(utils::deg_to_rad(60.0), 1.5, 1.0, 100.0);

        let near = proj.transform_position(&Vec3::new(0.0, 0.0, 1.0));
        let far = proj.transform_position(&Vec3::new(0.0, 0.0, 100.0));

        assert_relative_eq!(near.z, 0.0, epsilon = 1e-5);
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_look_at_places_target_on_positive_z() {
        let view = Mat4::look_at_left_handed(
            Vec3::new(0.0, 0.0, -10.0),
            Vec3::zeros(),
            Vec3::new(0.0, 1.0, 0.0),
        );

        let target = view.transform_position(&Vec3::zeros());
        assert_relative_eq!(target, Vec3::new(0.0, 0.0, 10.0), epsilon = 1e-5);

        // Right stays right in a left-handed basis
        let right = view.transform_position(&Vec3::new(1.0, 0.0, -10.0));
        assert_relative_eq!(right.x, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_orthographic_maps_box_to_clip_volume() {
        let proj = Mat4::orthographic_off_center_lh(-4.0, 2.0, -1.0, 3.0, 5.0, 25.0);

        let min = proj.transform_position(&Vec3::new(-4.0, -1.0, 5.0));
        let max = proj.transform_position(&Vec3::new(2.0, 3.0, 25.0));

        assert_relative_eq!(min, Vec3::new(-1.0, -1.0, 0.0), epsilon = 1e-5);
        assert_relative_eq!(max, Vec3::new(1.0, 1.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_transform_recomposition_order() {
        let transform = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Quat::from_axis_angle(&Vec3::y_axis(), constants::PI / 2.0),
            Vec3::new(2.0, 2.0, 2.0),
        );

        // Scale first, then rotate +X onto -Z, then translate
        let p = transform.to_matrix().transform_position(&Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p, Vec3::new(1.0, 2.0, 1.0), epsilon = 1e-5);
    }

    #[test]
    fn test_halton_sequence() {
        assert_relative_eq!(utils::halton(1, 2), 0.5);
        assert_relative_eq!(utils::halton(2, 2), 0.25);
        assert_relative_eq!(utils::halton(1, 3), 1.0 / 3.0);
    }
}
