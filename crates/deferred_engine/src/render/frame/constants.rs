//! GPU-visible constant layouts
//!
//! All structs are `#[repr(C)]`, `Pod` and padded by hand to 16-byte rows so
//! the shader-side declarations can mirror them field for field. Object
//! constants embed the transform block by value rather than extending it.

use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec3};

/// Column-major 4x4 matrix as laid out in GPU memory
pub type GpuMat4 = [[f32; 4]; 4];

/// Convert a matrix into its GPU layout
pub fn gpu_mat4(matrix: &Mat4) -> GpuMat4 {
    (*matrix).into()
}

fn gpu_vec3(v: &Vec3) -> [f32; 3] {
    [v.x, v.y, v.z]
}

/// Per-pass camera constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct PassConstants {
    /// World to view
    pub view: GpuMat4,
    /// View to world
    pub inv_view: GpuMat4,
    /// View to clip (jittered when TAA is on)
    pub proj: GpuMat4,
    /// Clip to view
    pub inv_proj: GpuMat4,
    /// World to clip
    pub view_proj: GpuMat4,
    /// Clip to world
    pub inv_view_proj: GpuMat4,
    /// Previous frame's world to clip, for motion vectors
    pub prev_view_proj: GpuMat4,
    /// Camera position
    pub eye_position: [f32; 3],
    /// Seconds since start
    pub total_time: f32,
    /// Render target size in pixels
    pub render_target_size: [f32; 2],
    /// Reciprocal render target size
    pub inv_render_target_size: [f32; 2],
    /// Near plane distance
    pub near_z: f32,
    /// Far plane distance
    pub far_z: f32,
    /// Entries used in the containing-camera light list
    pub containing_light_count: u32,
    /// Entries used in the inside-frustum light list
    pub inside_light_count: u32,
    /// Projection jitter in clip space
    pub jitter: [f32; 2],
    /// Padding
    pub _padding: [f32; 2],
}

/// Transform block shared by every drawable
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TransformConstants {
    /// Object to world
    pub world: GpuMat4,
    /// Inverse transpose of `world`, for normals
    pub inv_transpose_world: GpuMat4,
}

impl TransformConstants {
    /// Build from a world matrix
    pub fn from_world(world: &Mat4) -> Self {
        let inv_transpose = world
            .try_inverse()
            .map(|inverse| inverse.transpose())
            .unwrap_or_else(Mat4::identity);
        Self {
            world: gpu_mat4(world),
            inv_transpose_world: gpu_mat4(&inv_transpose),
        }
    }
}

/// Per-object constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ObjectConstants {
    /// Current transform
    pub transform: TransformConstants,
    /// Previous frame's object to world, for motion vectors
    pub prev_world: GpuMat4,
    /// Material index of the selected LOD
    pub material_index: u32,
    /// Selected LOD
    pub lod_index: u32,
    /// `ObjectFlags` bits
    pub flags: u32,
    /// Padding
    pub _padding: u32,
}

/// Sun constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DirectionalLightConstants {
    /// Direction the light travels (normalized)
    pub direction: [f32; 3],
    /// Intensity multiplier
    pub intensity: f32,
    /// Linear color
    pub color: [f32; 3],
    /// Number of valid cascades
    pub cascade_count: u32,
}

impl DirectionalLightConstants {
    /// Build from light parameters
    pub fn new(direction: &Vec3, color: &Vec3, intensity: f32, cascade_count: u32) -> Self {
        Self {
            direction: gpu_vec3(direction),
            intensity,
            color: gpu_vec3(color),
            cascade_count,
        }
    }
}

/// One cascade as sampled by the directional lighting shader
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CascadeConstants {
    /// World to shadow clip
    pub view_proj: GpuMat4,
    /// Near split distance along the view axis
    pub split_near: f32,
    /// Far split distance along the view axis
    pub split_far: f32,
    /// Shadow atlas layer
    pub layer: u32,
    /// 1 when the layer was rendered this frame; 0 means its depth is stale
    pub rendered: u32,
}

/// Local light constants
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LocalLightConstants {
    /// World transform of the light volume
    pub world: GpuMat4,
    /// World to shadow clip, identity when the light casts no shadow
    pub shadow_view_proj: GpuMat4,
    /// Position
    pub position: [f32; 3],
    /// Range
    pub radius: f32,
    /// Direction (spot lights)
    pub direction: [f32; 3],
    /// Spot half-angle in radians
    pub angle: f32,
    /// Linear color
    pub color: [f32; 3],
    /// Intensity multiplier
    pub intensity: f32,
    /// 0 = point, 1 = spot
    pub light_type: u32,
    /// Shadow atlas layer, -1 when the light casts no shadow
    pub shadow_layer: i32,
    /// Non-zero when the light is active
    pub active: u32,
    /// Padding
    pub _padding: u32,
}

/// View-projection of one shadow view (a cascade or a spot light)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ShadowViewConstants {
    /// World to shadow clip
    pub view_proj: GpuMat4,
}

const _: () = assert!(std::mem::size_of::<PassConstants>() == 7 * 64 + 64);
const _: () = assert!(std::mem::size_of::<ObjectConstants>() == 3 * 64 + 16);
const _: () = assert!(std::mem::size_of::<DirectionalLightConstants>() == 32);
const _: () = assert!(std::mem::size_of::<CascadeConstants>() == 80);
const _: () = assert!(std::mem::size_of::<LocalLightConstants>() == 2 * 64 + 64);

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_matrix_layout_is_column_major() {
        let m = Mat4::new_translation(&Vec3::new(1.0, 2.0, 3.0));
        let gpu = gpu_mat4(&m);
        assert_eq!(gpu[3], [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn test_transform_normal_matrix() {
        let world = Mat4::new_nonuniform_scaling(&Vec3::new(2.0, 1.0, 1.0));
        let constants = TransformConstants::from_world(&world);
        assert_relative_eq!(constants.inv_transpose_world[0][0], 0.5);
    }
}
