use super::{Geodetic, Vec3, geodetic_to_ecef};

/// Local East-North-Up tangent frame anchored at a geodetic origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EnuFrame {
    pub origin: Vec3,
    pub east: Vec3,
    pub north: Vec3,
    pub up: Vec3,
}

impl EnuFrame {
    pub fn at(origin: Geodetic) -> Self {
        let sin_lat = origin.lat_rad.sin();
        let cos_lat = origin.lat_rad.cos();
        let sin_lon = origin.lon_rad.sin();
        let cos_lon = origin.lon_rad.cos();

        Self {
            origin: geodetic_to_ecef(origin).to_vec3(),
            east: Vec3::new(-sin_lon, cos_lon, 0.0),
            north: Vec3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat),
            up: Vec3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat),
        }
    }

    /// Axis-aligned frame for planar projections, where world axes already
    /// are east/north/up.
    pub fn planar(origin: Vec3) -> Self {
        Self {
            origin,
            east: Vec3::new(1.0, 0.0, 0.0),
            north: Vec3::new(0.0, 1.0, 0.0),
            up: Vec3::new(0.0, 0.0, 1.0),
        }
    }

    pub fn to_world(&self, east: f64, north: f64, up: f64) -> Vec3 {
        self.origin + self.east.scale(east) + self.north.scale(north) + self.up.scale(up)
    }

    pub fn to_local(&self, world: Vec3) -> Vec3 {
        let d = world - self.origin;
        Vec3::new(d.dot(self.east), d.dot(self.north), d.dot(self.up))
    }
}
