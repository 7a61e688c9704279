use super::Vec3;

/// Row-major 4x4 matrix operating on column vectors (`m * v`).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Mat4 {
    pub m: [[f64; 4]; 4],
}

impl Default for Mat4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mat4 {
    pub const IDENTITY: Mat4 = Mat4 {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    pub fn from_rows(m: [[f64; 4]; 4]) -> Self {
        Self { m }
    }

    pub fn translation(t: Vec3) -> Self {
        let mut out = Self::IDENTITY;
        out.m[0][3] = t.x;
        out.m[1][3] = t.y;
        out.m[2][3] = t.z;
        out
    }

    pub fn mul(&self, other: &Mat4) -> Mat4 {
        let mut out = [[0.0; 4]; 4];
        for (r, row) in out.iter_mut().enumerate() {
            for (c, cell) in row.iter_mut().enumerate() {
                *cell = (0..4).map(|k| self.m[r][k] * other.m[k][c]).sum();
            }
        }
        Mat4 { m: out }
    }

    /// Homogeneous transform; returns `[x, y, z, w]` without dividing.
    pub fn transform_homogeneous(&self, p: Vec3) -> [f64; 4] {
        let v = [p.x, p.y, p.z, 1.0];
        let mut out = [0.0; 4];
        for (r, cell) in out.iter_mut().enumerate() {
            *cell = (0..4).map(|k| self.m[r][k] * v[k]).sum();
        }
        out
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        let [x, y, z, w] = self.transform_homogeneous(p);
        if w != 0.0 && w != 1.0 {
            Vec3::new(x / w, y / w, z / w)
        } else {
            Vec3::new(x, y, z)
        }
    }

    /// Applies only the linear part (no translation).
    pub fn transform_direction(&self, d: Vec3) -> Vec3 {
        let m = &self.m;
        Vec3::new(
            m[0][0] * d.x + m[0][1] * d.y + m[0][2] * d.z,
            m[1][0] * d.x + m[1][1] * d.y + m[1][2] * d.z,
            m[2][0] * d.x + m[2][1] * d.y + m[2][2] * d.z,
        )
    }

    /// General inverse via cofactor expansion. `None` when singular.
    pub fn inverse(&self) -> Option<Mat4> {
        let a = &self.m;
        let s0 = a[0][0] * a[1][1] - a[1][0] * a[0][1];
        let s1 = a[0][0] * a[1][2] - a[1][0] * a[0][2];
        let s2 = a[0][0] * a[1][3] - a[1][0] * a[0][3];
        let s3 = a[0][1] * a[1][2] - a[1][1] * a[0][2];
        let s4 = a[0][1] * a[1][3] - a[1][1] * a[0][3];
        let s5 = a[0][2] * a[1][3] - a[1][2] * a[0][3];

        let c5 = a[2][2] * a[3][3] - a[3][2] * a[2][3];
        let c4 = a[2][1] * a[3][3] - a[3][1] * a[2][3];
        let c3 = a[2][1] * a[3][2] - a[3][1] * a[2][2];
        let c2 = a[2][0] * a[3][3] - a[3][0] * a[2][3];
        let c1 = a[2][0] * a[3][2] - a[3][0] * a[2][2];
        let c0 = a[2][0] * a[3][1] - a[3][0] * a[2][1];

        let det = s0 * c5 - s1 * c4 + s2 * c3 + s3 * c2 - s4 * c1 + s5 * c0;
        if det.abs() < 1e-300 || !det.is_finite() {
            return None;
        }
        let inv = 1.0 / det;

        let m = [
            [
                (a[1][1] * c5 - a[1][2] * c4 + a[1][3] * c3) * inv,
                (-a[0][1] * c5 + a[0][2] * c4 - a[0][3] * c3) * inv,
                (a[3][1] * s5 - a[3][2] * s4 + a[3][3] * s3) * inv,
                (-a[2][1] * s5 + a[2][2] * s4 - a[2][3] * s3) * inv,
            ],
            [
                (-a[1][0] * c5 + a[1][2] * c2 - a[1][3] * c1) * inv,
                (a[0][0] * c5 - a[0][2] * c2 + a[0][3] * c1) * inv,
                (-a[3][0] * s5 + a[3][2] * s2 - a[3][3] * s1) * inv,
                (a[2][0] * s5 - a[2][2] * s2 + a[2][3] * s1) * inv,
            ],
            [
                (a[1][0] * c4 - a[1][1] * c2 + a[1][3] * c0) * inv,
                (-a[0][0] * c4 + a[0][1] * c2 - a[0][3] * c0) * inv,
                (a[3][0] * s4 - a[3][1] * s2 + a[3][3] * s0) * inv,
                (-a[2][0] * s4 + a[2][1] * s2 - a[2][3] * s0) * inv,
            ],
            [
                (-a[1][0] * c3 + a[1][1] * c1 - a[1][2] * c0) * inv,
                (a[0][0] * c3 - a[0][1] * c1 + a[0][2] * c0) * inv,
                (-a[3][0] * s3 + a[3][1] * s1 - a[3][2] * s0) * inv,
                (a[2][0] * s3 - a[2][1] * s1 + a[2][2] * s0) * inv,
            ],
        ];
        Some(Mat4 { m })
    }
}
