//! # 3D Camera System
//!
//! First-person camera holding an explicit orthonormal basis and cached
//! view/projection matrices for the current and the previous frame.
//!
//! ## Design Principles
//! - **Dirty-gated**: mutators only record intent; the view matrix is rebuilt by
//!   [`Camera::update_view_matrix`] and is stale until then
//! - **No GPU state**: pure math, shared read-only by every culling stage
//! - **Stable culling**: TAA jitter offsets the rendering projection only, the
//!   culling frustum is always built from the unjittered lens

use crate::foundation::bounds::Frustum;
use crate::foundation::math::{utils, Mat4, Mat4Ext, Vec2, Vec3};

/// Fallback up axis when the requested one is parallel to the view direction
const SECONDARY_UP: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Length of the Halton jitter cycle
const JITTER_SEQUENCE_LENGTH: u32 = 8;

/// Perspective camera with a left-handed view space
///
/// # Coordinate System
/// - X+ = Right
/// - Y+ = Up
/// - Z+ = Forward (view-space depth is positive in front of the camera)
///
/// Depth maps to `[0, 1]` between the near and far planes.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    right: Vec3,
    up: Vec3,
    look: Vec3,

    near_z: f32,
    far_z: f32,
    fov_y: f32,
    aspect: f32,

    view: Mat4,
    proj: Mat4,
    inv_view: Mat4,
    inv_proj: Mat4,

    prev_view: Mat4,
    prev_proj: Mat4,
    prev_view_proj: Mat4,

    frustum: Frustum,
    view_dirty: bool,

    jitter_enabled: bool,
    jitter_index: u32,
    jitter: Vec2,
    viewport: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

impl Camera {
    /// Create a camera at the origin looking down +Z
    ///
    /// Starts with a 45 degree vertical field of view, square aspect and a
    /// `[1, 1000]` depth range.
    pub fn new() -> Self {
        let mut camera = Self {
            position: Vec3::zeros(),
            right: Vec3::new(1.0, 0.0, 0.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            look: Vec3::new(0.0, 0.0, 1.0),
            near_z: 1.0,
            far_z: 1000.0,
            fov_y: utils::deg_to_rad(45.0),
            aspect: 1.0,
            view: Mat4::identity(),
            proj: Mat4::identity(),
            inv_view: Mat4::identity(),
            inv_proj: Mat4::identity(),
            prev_view: Mat4::identity(),
            prev_proj: Mat4::identity(),
            prev_view_proj: Mat4::identity(),
            frustum: Frustum::from_perspective(utils::deg_to_rad(45.0), 1.0, 1.0, 1000.0),
            view_dirty: true,
            jitter_enabled: false,
            jitter_index: 0,
            jitter: Vec2::zeros(),
            viewport: Vec2::new(1.0, 1.0),
        };
        camera.set_lens(camera.fov_y, camera.aspect, camera.near_z, camera.far_z);
        camera.update_view_matrix();
        camera.end_frame();
        camera
    }

    /// Configure the projection
    ///
    /// # Arguments
    /// * `fov_y` - Vertical field of view in radians
    /// * `aspect` - Width / height
    /// * `near_z` - Distance to the near plane (must be > 0)
    /// * `far_z` - Distance to the far plane (must be > `near_z`)
    ///
    /// Rebuilds the projection, its inverse and the view-space culling frustum.
    pub fn set_lens(&mut self, fov_y: f32, aspect: f32, near_z: f32, far_z: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near_z = near_z;
        self.far_z = far_z;

        self.frustum = Frustum::from_perspective(fov_y, aspect, near_z, far_z);
        self.rebuild_projection();
        log::debug!(
            "Camera lens: fov {:.1} deg, aspect {:.3}, depth [{}, {}]",
            fov_y.to_degrees(),
            aspect,
            near_z,
            far_z
        );
    }

    /// Set the camera position, keeping the orientation
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.view_dirty = true;
    }

    /// Place the camera at `position` looking at `target`
    ///
    /// If `up` is (nearly) parallel to the view direction the basis is built
    /// from a secondary up axis instead; interactive editing hits this whenever
    /// the user looks straight down.
    pub fn look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        let look = target - position;
        if look.norm() <= f32::EPSILON {
            log::warn!("Camera look_at target equals position, orientation unchanged");
            self.set_position(position);
            return;
        }
        let look = look.normalize();

        let mut right = up.cross(&look);
        if right.norm() <= 1.0e-4 {
            log::debug!("Camera up vector parallel to view direction, using secondary up axis");
            right = SECONDARY_UP.cross(&look);
            if right.norm() <= 1.0e-4 {
                right = Vec3::new(1.0, 0.0, 0.0).cross(&look);
            }
        }
        let right = right.normalize();

        self.position = position;
        self.look = look;
        self.right = right;
        self.up = look.cross(&right);
        self.view_dirty = true;
    }

    /// Move along the look vector
    pub fn walk(&mut self, distance: f32) {
        self.position += self.look * distance;
        self.view_dirty = true;
    }

    /// Move along the right vector
    pub fn strafe(&mut self, distance: f32) {
        self.position += self.right * distance;
        self.view_dirty = true;
    }

    /// Rotate up and look around the right vector
    pub fn pitch(&mut self, angle: f32) {
        let rotation = nalgebra::Rotation3::from_axis_angle(
            &nalgebra::Unit::new_normalize(self.right),
            angle,
        );
        self.up = rotation * self.up;
        self.look = rotation * self.look;
        self.view_dirty = true;
    }

    /// Rotate the whole basis around world +Y
    pub fn rotate_y(&mut self, angle: f32) {
        let rotation = nalgebra::Rotation3::from_axis_angle(&Vec3::y_axis(), angle);
        self.right = rotation * self.right;
        self.up = rotation * self.up;
        self.look = rotation * self.look;
        self.view_dirty = true;
    }

    /// Rebuild the view matrix if any position or orientation mutation happened
    ///
    /// The basis is re-orthonormalised first so accumulated rotations never
    /// drift into a skewed view.
    pub fn update_view_matrix(&mut self) {
        if !self.view_dirty {
            return;
        }

        let look = self.look.normalize();
        let up = look.cross(&self.right).normalize();
        let right = up.cross(&look);
        self.look = look;
        self.up = up;
        self.right = right;

        let p = self.position;
        #[rustfmt::skip]
        let view = Mat4::new(
            right.x, right.y, right.z, -p.dot(&right),
            up.x, up.y, up.z, -p.dot(&up),
            look.x, look.y, look.z, -p.dot(&look),
            0.0, 0.0, 0.0, 1.0,
        );
        self.view = view;
        self.inv_view = self.view.try_inverse().unwrap_or_else(Mat4::identity);
        self.view_dirty = false;
    }

    /// Copy the current matrices into the previous-frame slots and advance jitter
    ///
    /// Call once per frame after every consumer has read this frame's matrices.
    pub fn end_frame(&mut self) {
        self.prev_view = self.view;
        self.prev_proj = self.proj;
        self.prev_view_proj = self.view_proj();

        if self.jitter_enabled {
            self.jitter_index = self.jitter_index % JITTER_SEQUENCE_LENGTH + 1;
            self.update_jitter();
        }
    }

    /// Enable or disable sub-pixel projection jitter for a viewport size
    pub fn set_jitter(&mut self, enabled: bool, width: u32, height: u32) {
        self.jitter_enabled = enabled;
        self.viewport = Vec2::new(width.max(1) as f32, height.max(1) as f32);
        if enabled {
            self.jitter_index = self.jitter_index.max(1);
        }
        self.update_jitter();
    }

    fn update_jitter(&mut self) {
        self.jitter = if self.jitter_enabled {
            // Halton(2,3) in [-0.5, 0.5) pixels, converted to clip-space offsets
            let x = utils::halton(self.jitter_index, 2) - 0.5;
            let y = utils::halton(self.jitter_index, 3) - 0.5;
            Vec2::new(2.0 * x / self.viewport.x, 2.0 * y / self.viewport.y)
        } else {
            Vec2::zeros()
        };
        self.rebuild_projection();
    }

    fn rebuild_projection(&mut self) {
        let mut proj = Mat4::perspective_lh(self.fov_y, self.aspect, self.near_z, self.far_z);
        // Offset scales with w so it is constant in NDC
        proj[(0, 2)] += self.jitter.x;
        proj[(1, 2)] += self.jitter.y;
        self.proj = proj;
        self.inv_proj = proj.try_inverse().unwrap_or_else(Mat4::identity);
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Right basis vector
    pub fn right(&self) -> Vec3 {
        self.right
    }

    /// Up basis vector
    pub fn up(&self) -> Vec3 {
        self.up
    }

    /// Look basis vector
    pub fn look(&self) -> Vec3 {
        self.look
    }

    /// Near plane distance
    pub fn near_z(&self) -> f32 {
        self.near_z
    }

    /// Far plane distance
    pub fn far_z(&self) -> f32 {
        self.far_z
    }

    /// Vertical field of view in radians
    pub fn fov_y(&self) -> f32 {
        self.fov_y
    }

    /// Aspect ratio
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Whether a mutation is waiting for [`Camera::update_view_matrix`]
    pub fn is_view_dirty(&self) -> bool {
        self.view_dirty
    }

    /// World-to-view matrix
    pub fn view(&self) -> Mat4 {
        self.view
    }

    /// Projection matrix, jittered when TAA jitter is enabled
    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    /// View-to-world matrix
    pub fn inv_view(&self) -> Mat4 {
        self.inv_view
    }

    /// Inverse projection
    pub fn inv_proj(&self) -> Mat4 {
        self.inv_proj
    }

    /// `proj * view`
    pub fn view_proj(&self) -> Mat4 {
        self.proj * self.view
    }

    /// Previous frame's view matrix
    pub fn prev_view(&self) -> Mat4 {
        self.prev_view
    }

    /// Previous frame's projection
    pub fn prev_proj(&self) -> Mat4 {
        self.prev_proj
    }

    /// Previous frame's view-projection
    pub fn prev_view_proj(&self) -> Mat4 {
        self.prev_view_proj
    }

    /// Current jitter offset in clip space
    pub fn jitter(&self) -> Vec2 {
        self.jitter
    }

    /// View-space culling frustum (never jittered)
    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    /// The eight frustum corners in world space
    pub fn frustum_corners_world(&self) -> [Vec3; 8] {
        self.frustum
            .corners()
            .map(|corner| self.inv_view.transform_position(&corner))
    }
}
