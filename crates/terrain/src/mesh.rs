use std::ops::Range;

use foundation::bounds::Aabb3;
use foundation::math::Vec3;
use scene::picking::Ray;

const EPSILON: f64 = 1e-12;

/// Indexed triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TerrainMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl TerrainMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn aabb(&self) -> Aabb3 {
        Aabb3::from_points(self.vertices.iter().copied())
    }

    pub fn map_vertices(&self, f: impl FnMut(Vec3) -> Vec3) -> TerrainMesh {
        TerrainMesh {
            vertices: self.vertices.iter().copied().map(f).collect(),
            indices: self.indices.clone(),
        }
    }

    /// Nearest hit of `ray` against the triangles whose indices fall in
    /// `indices` (a range into the index buffer, rounded down to whole
    /// triangles). Returns the ray parameter.
    pub fn intersect(&self, ray: &Ray, indices: Range<usize>) -> Option<f64> {
        let end = indices.end.min(self.indices.len());
        let mut best: Option<f64> = None;
        let mut i = indices.start;
        while i + 3 <= end {
            let tri = &self.indices[i..i + 3];
            i += 3;
            let [Some(a), Some(b), Some(c)] = [0, 1, 2].map(|k| self.vertices.get(tri[k] as usize))
            else {
                continue;
            };
            if let Some(t) = ray_triangle(ray, *a, *b, *c)
                && best.is_none_or(|b| t < b)
            {
                best = Some(t);
            }
        }
        best
    }
}

/// Möller–Trumbore, two-sided. Hits behind the origin are rejected.
pub fn ray_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f64> {
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t >= 0.0 && t.is_finite()).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::{TerrainMesh, ray_triangle};
    use foundation::math::Vec3;
    use scene::picking::Ray;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn two_floors() -> TerrainMesh {
        // a unit square at z=10 over a larger one at z=0
        TerrainMesh::new(
            vec![
                Vec3::new(0.0, 0.0, 10.0),
                Vec3::new(1.0, 0.0, 10.0),
                Vec3::new(0.0, 1.0, 10.0),
                Vec3::new(-5.0, -5.0, 0.0),
                Vec3::new(5.0, -5.0, 0.0),
                Vec3::new(0.0, 5.0, 0.0),
            ],
            vec![0, 1, 2, 3, 4, 5],
        )
    }

    #[test]
    fn vertical_ray_hits_triangle() {
        let ray = Ray::new(Vec3::new(0.25, 0.25, 100.0), Vec3::new(0.0, 0.0, -1.0));
        let t = ray_triangle(
            &ray,
            Vec3::new(0.0, 0.0, 10.0),
            Vec3::new(1.0, 0.0, 10.0),
            Vec3::new(0.0, 1.0, 10.0),
        )
        .unwrap();
        assert_close(t, 90.0, 1e-12);
    }

    #[test]
    fn misses_outside_and_behind() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, 0.0, 0.0);
        let c = Vec3::new(0.0, 1.0, 0.0);
        let outside = Ray::new(Vec3::new(0.9, 0.9, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(ray_triangle(&outside, a, b, c), None);
        let behind = Ray::new(Vec3::new(0.2, 0.2, -5.0), Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(ray_triangle(&behind, a, b, c), None);
        let parallel = Ray::new(Vec3::new(0.2, 0.2, 1.0), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(ray_triangle(&parallel, a, b, c), None);
    }

    #[test]
    fn nearest_hit_within_range() {
        let mesh = two_floors();
        let ray = Ray::new(Vec3::new(0.2, 0.2, 50.0), Vec3::new(0.0, 0.0, -1.0));
        assert_close(mesh.intersect(&ray, 0..6).unwrap(), 40.0, 1e-12);
        // only the lower floor
        assert_close(mesh.intersect(&ray, 3..6).unwrap(), 50.0, 1e-12);
        // partial triangle at the end is ignored
        assert_eq!(mesh.intersect(&ray, 3..5), None);
        assert_eq!(mesh.triangle_count(), 2);
    }
}
