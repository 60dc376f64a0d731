//! Bounding boxes, geometry statistics and placement normalization.

use cgmath::{EuclideanSpace, Matrix4, Point3, Transform as _, Vector3};
use serde::{Deserialize, Serialize};

use super::scene::SceneObject;

/// Largest dimension a normalized model is scaled to.
pub const TARGET_SIZE: f32 = 5.0;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// An inverted box that any point expands.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn expand(&mut self, p: Point3<f32>) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    pub fn size(&self) -> Vector3<f32> {
        if self.is_empty() {
            return Vector3::new(0.0, 0.0, 0.0);
        }
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        if self.is_empty() {
            return Point3::origin();
        }
        self.min.midpoint(self.max)
    }

    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    /// World-space box of every vertex under `object`, its own transform included.
    pub fn from_object(object: &SceneObject) -> Self {
        let mut aabb = Self::empty();
        object.visit_meshes(&mut |mesh, world: &Matrix4<f32>| {
            for p in &mesh.geometry.positions {
                aabb.expand(world.transform_point(Point3::new(p[0], p[1], p[2])));
            }
        });
        aabb
    }
}

/// Derived geometry counts reported to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub vertices: u64,
    pub triangles: u64,
}

/// Sum vertex and triangle counts over every mesh.
///
/// Non-indexed meshes report `vertices / 3` triangles. That is an
/// approximation: it over-counts shared or non-triangulated geometry.
pub fn compute_stats(object: &SceneObject) -> ModelStats {
    let mut vertices = 0u64;
    let mut triangles = 0f64;
    object.visit_meshes(&mut |mesh, _| {
        let count = mesh.geometry.vertex_count();
        vertices += count as u64;
        triangles += match mesh.geometry.index_count() {
            Some(indices) => indices as f64 / 3.0,
            None => count as f64 / 3.0,
        };
    });
    ModelStats {
        vertices,
        triangles: triangles.round() as u64,
    }
}

/// Uniform scale and root offset that fit a box into `target` units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub offset: Vector3<f32>,
}

pub fn normalization(aabb: &Aabb, target: f32) -> Normalization {
    let max_dim = aabb.max_dimension();
    let scale = if max_dim > 0.0 && max_dim.is_finite() {
        target / max_dim
    } else {
        1.0
    };
    let center = aabb.center().to_vec() * scale;
    Normalization {
        scale,
        // Horizontally centered; the root sits on the ground plane
        offset: Vector3::new(-center.x, 0.0, -center.z),
    }
}

/// Scale `object` so its largest dimension is `target` and center it on the
/// origin's horizontal plane.
pub fn normalize(object: &mut SceneObject, target: f32) -> Normalization {
    let aabb = Aabb::from_object(object);
    let n = normalization(&aabb, target);
    object.transform.scale = Vector3::new(n.scale, n.scale, n.scale);
    object.transform.position = Vector3::new(
        object.transform.position.x + n.offset.x,
        0.0,
        object.transform.position.z + n.offset.z,
    );
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::scene::{Geometry, Material, Mesh};

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    fn box_mesh(min: [f32; 3], max: [f32; 3]) -> SceneObject {
        let positions = vec![
            [min[0], min[1], min[2]],
            [max[0], min[1], min[2]],
            [max[0], max[1], min[2]],
            [min[0], max[1], max[2]],
            [max[0], max[1], max[2]],
            [min[0], min[1], max[2]],
        ];
        SceneObject::with_mesh(
            "box",
            Mesh::new(Geometry::new(positions, None), Material::default()),
        )
    }

    #[test]
    fn scale_maps_largest_dimension_to_target() {
        let mut object = SceneObject::group("root").with_child(box_mesh([0.0, 0.0, 0.0], [10.0, 2.0, 4.0]));

        let n = normalize(&mut object, TARGET_SIZE);
        assert!(close(n.scale, 0.5));

        let after = Aabb::from_object(&object);
        let size = after.size();
        assert!(close(after.max_dimension(), 5.0));
        assert!(close(size.x, 5.0) && close(size.y, 1.0) && close(size.z, 2.0));

        // Centered horizontally, root pinned to ground level
        assert!(close(after.center().x, 0.0));
        assert!(close(after.center().z, 0.0));
        assert!(close(object.transform.position.y, 0.0));
        assert!(close(after.min.y, 0.0));
    }

    #[test]
    fn degenerate_box_keeps_unit_scale() {
        let n = normalization(&Aabb::empty(), TARGET_SIZE);
        assert_eq!(n.scale, 1.0);

        let point = Aabb::new(Point3::new(1.0, 1.0, 1.0), Point3::new(1.0, 1.0, 1.0));
        assert_eq!(normalization(&point, TARGET_SIZE).scale, 1.0);
    }

    #[test]
    fn non_indexed_triangles_are_vertices_over_three() {
        let positions = vec![[0.0, 0.0, 0.0]; 300];
        let object = SceneObject::with_mesh(
            "soup",
            Mesh::new(Geometry::new(positions, None), Material::default()),
        );
        let stats = compute_stats(&object);
        assert_eq!(stats.vertices, 300);
        assert_eq!(stats.triangles, 100);
    }

    #[test]
    fn indexed_triangles_are_indices_over_three() {
        let positions = vec![[0.0, 0.0, 0.0]; 120];
        let indices = (0..600).map(|i| i % 120).collect();
        let object = SceneObject::with_mesh(
            "indexed",
            Mesh::new(Geometry::new(positions, Some(indices)), Material::default()),
        );
        let stats = compute_stats(&object);
        assert_eq!(stats.vertices, 120);
        assert_eq!(stats.triangles, 200);
    }

    #[test]
    fn stats_sum_across_meshes() {
        let a = SceneObject::with_mesh(
            "a",
            Mesh::new(Geometry::new(vec![[0.0; 3]; 3], None), Material::default()),
        );
        let b = SceneObject::with_mesh(
            "b",
            Mesh::new(
                Geometry::new(vec![[0.0; 3]; 4], Some(vec![0, 1, 2, 0, 2, 3])),
                Material::default(),
            ),
        );
        let stats = compute_stats(&SceneObject::group("root").with_child(a).with_child(b));
        assert_eq!(stats, ModelStats { vertices: 7, triangles: 3 });
    }
}
