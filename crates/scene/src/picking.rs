use foundation::bounds::Aabb3;
use foundation::math::Vec3;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub dir: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, dir: Vec3) -> Self {
        Self { origin, dir }
    }

    pub fn at(&self, t: f64) -> Vec3 {
        self.origin + self.dir.scale(t)
    }
}

/// Slab test. Returns the parametric entry distance (clamped to zero when the
/// origin is inside the box).
pub fn ray_aabb_hit_t(ray: &Ray, bounds: &Aabb3) -> Option<f64> {
    let origin = ray.origin.as_array();
    let dir = ray.dir.as_array();
    let mut t_min = 0.0f64;
    let mut t_max = f64::INFINITY;

    for axis in 0..3 {
        let (o, d) = (origin[axis], dir[axis]);
        let (min, max) = (bounds.min[axis], bounds.max[axis]);

        if d.abs() < 1e-12 {
            if o < min || o > max {
                return None;
            }
            continue;
        }

        let inv = 1.0 / d;
        let (t1, t2) = {
            let a = (min - o) * inv;
            let b = (max - o) * inv;
            if a <= b { (a, b) } else { (b, a) }
        };
        t_min = t_min.max(t1);
        t_max = t_max.min(t2);
        if t_max < t_min {
            return None;
        }
    }

    Some(t_min)
}
