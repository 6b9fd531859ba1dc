//! Bounding volumes and containment tests
//!
//! Hand-written frustum, box and sphere tests used by every culling stage.
//! All tests are conservative: they may report `Intersects` for a volume that is
//! actually outside, but never `Disjoint` for a volume that overlaps.

use crate::foundation::math::{Mat4, Mat4Ext, Vec3};

/// Result of a containment query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    /// The volumes do not overlap
    Disjoint,
    /// The volumes overlap partially
    Intersects,
    /// The tested volume lies entirely inside the container
    Contains,
}

impl Containment {
    /// Whether anything of the tested volume may be inside
    pub fn is_visible(self) -> bool {
        self != Containment::Disjoint
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Create a box from a center and half extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
        Self {
            min: center - extents,
            max: center + extents,
        }
    }

    /// Smallest box enclosing every point, `None` for an empty slice
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let first = points.first()?;
        let mut aabb = Self::new(*first, *first);
        for p in &points[1..] {
            aabb.min = aabb.min.inf(p);
            aabb.max = aabb.max.sup(p);
        }
        Some(aabb)
    }

    /// Box center
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half extents
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// The eight corners, bit `i` of the index selecting max on axis `i`
    pub fn corners(&self) -> [Vec3; 8] {
        let mut corners = [Vec3::zeros(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            *corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
        }
        corners
    }

    /// Axis-aligned box enclosing this box after an affine transform
    pub fn transform(&self, matrix: &Mat4) -> Aabb {
        let corners = self.corners().map(|c| matrix.transform_position(&c));
        // Eight corners are always present
        Aabb::from_points(&corners).unwrap_or(*self)
    }

    /// Box-box overlap; touching faces count as intersecting
    pub fn contains_aabb(&self, other: &Aabb) -> Containment {
        let separated = (0..3).any(|i| other.max[i] < self.min[i] || other.min[i] > self.max[i]);
        if separated {
            return Containment::Disjoint;
        }
        let inside = (0..3).all(|i| other.min[i] >= self.min[i] && other.max[i] <= self.max[i]);
        if inside {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    /// Whether a point lies inside or on the box
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] && point[i] <= self.max[i])
    }

    /// Sphere enclosing the box
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.center(), self.extents().norm())
    }
}

/// Bounding sphere
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: Vec3,
    /// Sphere radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Create a sphere
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Transform the sphere; non-uniform scale is bounded by the largest axis scale
    pub fn transform(&self, matrix: &Mat4) -> BoundingSphere {
        let center = matrix.transform_position(&self.center);
        let axis_scale = (0..3)
            .map(|i| matrix.fixed_view::<3, 1>(0, i).norm())
            .fold(0.0_f32, f32::max);
        BoundingSphere::new(center, self.radius * axis_scale)
    }

    /// Whether a point lies inside or on the sphere
    pub fn contains_point(&self, point: &Vec3) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }

    /// Sphere-box overlap via the closest point on the box
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        let closest = self.center.sup(&aabb.min).inf(&aabb.max);
        (closest - self.center).norm_squared() <= self.radius * self.radius
    }
}

/// Plane `normal · p + distance = 0`; the positive half-space is "inside"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal
    pub normal: Vec3,
    /// Signed offset from the origin
    pub distance: f32,
}

impl Plane {
    /// Plane through three points, normal following `(b - a) × (c - a)`
    pub fn from_points(a: Vec3, b: Vec3, c: Vec3) -> Self {
        let normal = (b - a).cross(&(c - a)).normalize();
        Self {
            normal,
            distance: -normal.dot(&a),
        }
    }

    /// Signed distance from the plane to a point
    pub fn signed_distance(&self, point: &Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }
}

/// Corner indices spanning each face, in [`Frustum::planes`] order
const FACE_CORNERS: [[usize; 3]; 6] = [
    [0, 1, 2], // near
    [4, 6, 5], // far
    [0, 3, 7], // left
    [1, 5, 6], // right
    [3, 2, 6], // top
    [0, 4, 5], // bottom
];

/// Convex view volume stored as corners and inward-facing planes
///
/// Corner order: near plane `[0..4]` then far plane `[4..8]`, each as
/// bottom-left, bottom-right, top-right, top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    corners: [Vec3; 8],
    planes: [Plane; 6],
}

impl Frustum {
    /// Build from eight corners in the documented order
    pub fn from_corners(corners: [Vec3; 8]) -> Self {
        let centroid = corners.iter().fold(Vec3::zeros(), |acc, c| acc + c) / 8.0;
        let planes = FACE_CORNERS.map(|[a, b, c]| {
            let plane = Plane::from_points(corners[a], corners[b], corners[c]);
            // Orientation is fixed against the centroid so mirrored transforms stay valid
            if plane.signed_distance(&centroid) < 0.0 {
                plane.flipped()
            } else {
                plane
            }
        });
        Self { corners, planes }
    }

    /// View-space frustum of a left-handed perspective projection
    pub fn from_perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let tan_half = (fov_y * 0.5).tan();
        let slice = |z: f32| {
            let h = tan_half * z;
            let w = h * aspect;
            [
                Vec3::new(-w, -h, z),
                Vec3::new(w, -h, z),
                Vec3::new(w, h, z),
                Vec3::new(-w, h, z),
            ]
        };
        let n = slice(near);
        let f = slice(far);
        Self::from_corners([n[0], n[1], n[2], n[3], f[0], f[1], f[2], f[3]])
    }

    /// Corners in the documented order
    pub fn corners(&self) -> &[Vec3; 8] {
        &self.corners
    }

    /// Inward-facing planes: near, far, left, right, top, bottom
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// The frustum after an affine transform
    pub fn transform(&self, matrix: &Mat4) -> Frustum {
        Frustum::from_corners(self.corners.map(|c| matrix.transform_position(&c)))
    }

    /// Classify a box against the frustum
    pub fn contains_aabb(&self, aabb: &Aabb) -> Containment {
        let mut fully_inside = true;
        for plane in &self.planes {
            let positive = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.max.x } else { aabb.min.x },
                if plane.normal.y >= 0.0 { aabb.max.y } else { aabb.min.y },
                if plane.normal.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            );
            if plane.signed_distance(&positive) < 0.0 {
                return Containment::Disjoint;
            }
            let negative = Vec3::new(
                if plane.normal.x >= 0.0 { aabb.min.x } else { aabb.max.x },
                if plane.normal.y >= 0.0 { aabb.min.y } else { aabb.max.y },
                if plane.normal.z >= 0.0 { aabb.min.z } else { aabb.max.z },
            );
            if plane.signed_distance(&negative) < 0.0 {
                fully_inside = false;
            }
        }
        if fully_inside {
            return Containment::Contains;
        }

        // Box faces as separating axes: catches large boxes near frustum edges
        for axis in 0..3 {
            if self.corners.iter().all(|c| c[axis] > aabb.max[axis])
                || self.corners.iter().all(|c| c[axis] < aabb.min[axis])
            {
                return Containment::Disjoint;
            }
        }
        Containment::Intersects
    }

    /// Classify a sphere against the frustum
    pub fn contains_sphere(&self, sphere: &BoundingSphere) -> Containment {
        let mut fully_inside = true;
        for plane in &self.planes {
            let d = plane.signed_distance(&sphere.center);
            if d < -sphere.radius {
                return Containment::Disjoint;
            }
            if d < sphere.radius {
                fully_inside = false;
            }
        }
        if fully_inside {
            Containment::Contains
        } else {
            Containment::Intersects
        }
    }

    /// Whether a point lies inside or on the frustum
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::utils::deg_to_rad;
    use approx::assert_relative_eq;

    fn view_frustum() -> Frustum {
        Frustum::from_perspective(deg_to_rad(90.0), 1.0, 1.0, 100.0)
    }

    #[test]
    fn test_planes_face_inward() {
        let frustum = view_frustum();
        let inside = Vec3::new(0.0, 0.0, 50.0);
        for plane in frustum.planes() {
            assert!(plane.signed_distance(&inside) > 0.0);
        }
        assert!(frustum.contains_point(&inside));
        assert!(!frustum.contains_point(&Vec3::new(0.0, 0.0, -5.0)));
    }

    #[test]
    fn test_aabb_outside_is_culled() {
        let frustum = view_frustum();
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, -10.0), Vec3::new(1.0, 1.0, -5.0));
        let beside = Aabb::new(Vec3::new(60.0, -1.0, 10.0), Vec3::new(70.0, 1.0, 12.0));
        assert_eq!(frustum.contains_aabb(&behind), Containment::Disjoint);
        assert_eq!(frustum.contains_aabb(&beside), Containment::Disjoint);
    }

    #[test]
    fn test_aabb_inside_is_contained() {
        let frustum = view_frustum();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 10.0), Vec3::new(1.0, 1.0, 12.0));
        assert_eq!(frustum.contains_aabb(&aabb), Containment::Contains);
    }

    #[test]
    fn test_aabb_straddling_plane_is_kept() {
        let frustum = view_frustum();
        // Crosses the near plane
        let near = Aabb::new(Vec3::new(-0.5, -0.5, 0.0), Vec3::new(0.5, 0.5, 2.0));
        // Crosses the right plane (x = z at 90 degrees)
        let right = Aabb::new(Vec3::new(9.0, -1.0, 9.5), Vec3::new(11.0, 1.0, 10.5));
        assert_eq!(frustum.contains_aabb(&near), Containment::Intersects);
        assert_eq!(frustum.contains_aabb(&right), Containment::Intersects);
    }

    #[test]
    fn test_corner_axis_test_rejects_box_beside_far_corner() {
        // Passes every plane test but lies fully beyond the far plane's x extent
        let frustum = Frustum::from_perspective(deg_to_rad(60.0), 1.0, 1.0, 10.0);
        let aabb = Aabb::new(Vec3::new(6.0, 6.0, 8.0), Vec3::new(40.0, 40.0, 40.0));
        assert_eq!(frustum.contains_aabb(&aabb), Containment::Disjoint);
    }

    #[test]
    fn test_transformed_frustum_keeps_classification() {
        let frustum = view_frustum();
        let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 10.0), Vec3::new(1.0, 1.0, 12.0));
        let world = Mat4::new_translation(&Vec3::new(5.0, -3.0, 2.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(-2.0, 1.0, 0.5));
        let inv = world.try_inverse().expect("invertible");

        // Moving both into another space must not change the answer
        let moved = frustum.transform(&world);
        let moved_box = aabb.transform(&world);
        assert!(moved.contains_aabb(&moved_box).is_visible());
        let back = moved.transform(&inv);
        assert_eq!(back.contains_aabb(&aabb), Containment::Contains);
    }

    #[test]
    fn test_sphere_classification() {
        let frustum = view_frustum();
        let inside = BoundingSphere::new(Vec3::new(0.0, 0.0, 20.0), 1.0);
        let straddle = BoundingSphere::new(Vec3::new(0.0, 0.0, 1.0), 2.0);
        let outside = BoundingSphere::new(Vec3::new(0.0, 0.0, -10.0), 2.0);
        assert_eq!(frustum.contains_sphere(&inside), Containment::Contains);
        assert_eq!(frustum.contains_sphere(&straddle), Containment::Intersects);
        assert_eq!(frustum.contains_sphere(&outside), Containment::Disjoint);
    }

    #[test]
    fn test_sphere_aabb_overlap() {
        let aabb = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(BoundingSphere::new(Vec3::new(3.0, 1.0, 1.0), 1.5).intersects_aabb(&aabb));
        assert!(!BoundingSphere::new(Vec3::new(4.0, 4.0, 4.0), 1.0).intersects_aabb(&aabb));
    }

    #[test]
    fn test_aabb_transform_and_overlap() {
        let aabb = Aabb::from_center_extents(Vec3::zeros(), Vec3::new(1.0, 1.0, 1.0));
        let rotated = aabb.transform(&Mat4::from_axis_angle(&Vec3::y_axis(), deg_to_rad(45.0)));
        assert_relative_eq!(rotated.max.x, 2.0_f32.sqrt(), epsilon = 1e-5);

        let other = Aabb::new(Vec3::new(1.2, -1.0, -1.0), Vec3::new(3.0, 1.0, 1.0));
        assert_eq!(aabb.contains_aabb(&other), Containment::Disjoint);
        assert_eq!(rotated.contains_aabb(&other), Containment::Intersects);
    }

    #[test]
    fn test_sphere_transform_uses_largest_scale() {
        let sphere = BoundingSphere::new(Vec3::zeros(), 1.0);
        let m = Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0))
            * Mat4::new_nonuniform_scaling(&Vec3::new(1.0, 3.0, 2.0));
        let moved = sphere.transform(&m);
        assert_relative_eq!(moved.center, Vec3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(moved.radius, 3.0, epsilon = 1e-6);
    }
}
