use foundation::bounds::Aabb3;
use foundation::math::Vec3;

/// Half-space `n · p + d >= 0`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    pub n: Vec3,
    pub d: f64,
}

impl Plane {
    pub fn new(n: Vec3, d: f64) -> Self {
        Self { n, d }
    }

    fn from_row(r: [f64; 4]) -> Self {
        let plane = Self::new(Vec3::new(r[0], r[1], r[2]), r[3]);
        let len = plane.n.length();
        if len > 0.0 {
            Self::new(plane.n.scale(1.0 / len), plane.d / len)
        } else {
            plane
        }
    }

    pub fn distance(&self, p: Vec3) -> f64 {
        self.n.dot(p) + self.d
    }
}

/// World-space view frustum used to cull terrain tiles.
///
/// Plane order is left, right, bottom, top, near, far.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Extracts planes from a row-major view-projection matrix whose clip
    /// volume is `-w <= x, y <= w` and `0 <= z <= w`.
    pub fn from_view_proj_row_major(m: [[f64; 4]; 4]) -> Self {
        let combine = |row: usize, sign: f64| {
            let mut out = [0.0; 4];
            for (c, v) in out.iter_mut().enumerate() {
                *v = m[3][c] + sign * m[row][c];
            }
            out
        };
        let near = Plane::from_row(m[2]);
        Self {
            planes: [
                Plane::from_row(combine(0, 1.0)),
                Plane::from_row(combine(0, -1.0)),
                Plane::from_row(combine(1, 1.0)),
                Plane::from_row(combine(1, -1.0)),
                near,
                Plane::from_row(combine(2, -1.0)),
            ],
        }
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes.iter().all(|plane| plane.distance(p) >= 0.0)
    }

    /// Conservative box test: `false` only when the box lies entirely outside
    /// one plane.
    pub fn intersects_aabb(&self, aabb: &Aabb3) -> bool {
        self.planes.iter().all(|plane| {
            // vertex furthest along the plane normal
            let p = Vec3::new(
                if plane.n.x >= 0.0 { aabb.max[0] } else { aabb.min[0] },
                if plane.n.y >= 0.0 { aabb.max[1] } else { aabb.min[1] },
                if plane.n.z >= 0.0 { aabb.max[2] } else { aabb.min[2] },
            );
            plane.distance(p) >= 0.0
        })
    }
}
