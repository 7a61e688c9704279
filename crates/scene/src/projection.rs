use foundation::math::{GeoPoint, Vec3, WGS84_A, WGS84_B};

/// Spatial reference of the planar (equirectangular) world.
pub const SRID_PLANAR: i32 = 4326;
/// Spatial reference of the ellipsoidal (ECEF) world.
pub const SRID_ECEF: i32 = 4978;

/// Meters per degree along the equator of the planar world.
pub const PLANAR_METERS_PER_DEGREE: f64 = WGS84_A * std::f64::consts::PI / 180.0;

/// Map projection from geodetic coordinates into world space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Projection {
    /// WGS84 ellipsoid in earth-centered, earth-fixed meters.
    Ellipsoid,
    /// Plate carrée scaled to meters; `z` is altitude.
    Planar,
}

impl Projection {
    pub fn from_srid(srid: i32) -> Option<Self> {
        match srid {
            SRID_ECEF => Some(Projection::Ellipsoid),
            SRID_PLANAR => Some(Projection::Planar),
            _ => None,
        }
    }

    pub fn srid(self) -> i32 {
        match self {
            Projection::Ellipsoid => SRID_ECEF,
            Projection::Planar => SRID_PLANAR,
        }
    }

    pub fn is_3d(self) -> bool {
        matches!(self, Projection::Ellipsoid)
    }

    pub fn forward(self, geo: GeoPoint) -> Vec3 {
        match self {
            Projection::Ellipsoid => geo.to_ecef().to_vec3(),
            Projection::Planar => Vec3::new(
                geo.longitude * PLANAR_METERS_PER_DEGREE,
                geo.latitude * PLANAR_METERS_PER_DEGREE,
                geo.altitude,
            ),
        }
    }

    pub fn inverse(self, world: Vec3) -> GeoPoint {
        match self {
            Projection::Ellipsoid => GeoPoint::from_ecef(world.into()),
            Projection::Planar => GeoPoint::with_altitude(
                world.y / PLANAR_METERS_PER_DEGREE,
                world.x / PLANAR_METERS_PER_DEGREE,
                world.z,
            ),
        }
    }

    /// Outward surface normal at a world position.
    pub fn surface_normal(self, world: Vec3) -> Vec3 {
        match self {
            Projection::Ellipsoid => {
                let a2 = WGS84_A * WGS84_A;
                let b2 = WGS84_B * WGS84_B;
                Vec3::new(world.x / a2, world.y / a2, world.z / b2)
                    .normalize()
                    .unwrap_or(Vec3::new(0.0, 0.0, 1.0))
            }
            Projection::Planar => Vec3::new(0.0, 0.0, 1.0),
        }
    }

    /// First intersection of a ray with the zero-height surface, as the ray
    /// parameter `t >= 0`.
    pub fn intersect_surface(self, origin: Vec3, dir: Vec3) -> Option<f64> {
        match self {
            Projection::Ellipsoid => {
                // scale z so the ellipsoid becomes a sphere of radius A
                let k = WGS84_A / WGS84_B;
                let o = Vec3::new(origin.x, origin.y, origin.z * k);
                let d = Vec3::new(dir.x, dir.y, dir.z * k);
                let a = d.dot(d);
                let b = 2.0 * o.dot(d);
                let c = o.dot(o) - WGS84_A * WGS84_A;
                let disc = b * b - 4.0 * a * c;
                if a <= 0.0 || disc < 0.0 {
                    return None;
                }
                let sq = disc.sqrt();
                let t0 = (-b - sq) / (2.0 * a);
                let t1 = (-b + sq) / (2.0 * a);
                if t0 >= 0.0 {
                    Some(t0)
                } else if t1 >= 0.0 {
                    Some(t1)
                } else {
                    None
                }
            }
            Projection::Planar => {
                if dir.z.abs() < 1e-15 {
                    return None;
                }
                let t = -origin.z / dir.z;
                (t >= 0.0).then_some(t)
            }
        }
    }

    /// Surface point standing in for a ray that misses the surface.
    ///
    /// For the ellipsoid this is the visible horizon in the ray's azimuth as
    /// seen from `origin`, at zero height.
    pub fn nearest_surface_point(self, origin: Vec3, dir: Vec3) -> Option<GeoPoint> {
        match self {
            Projection::Ellipsoid => {
                let k = WGS84_A / WGS84_B;
                let o = Vec3::new(origin.x, origin.y, origin.z * k);
                let d = Vec3::new(dir.x, dir.y, dir.z * k);
                let o_hat = o.normalize()?;
                let cos_theta = (WGS84_A / o.length()).min(1.0);
                let unit = match (d - o_hat.scale(d.dot(o_hat))).normalize() {
                    Some(h) => {
                        o_hat.scale(cos_theta) + h.scale((1.0 - cos_theta * cos_theta).sqrt())
                    }
                    None => o_hat,
                };
                let p = unit.scale(WGS84_A);
                let mut geo = self.inverse(Vec3::new(p.x, p.y, p.z / k));
                geo.altitude = 0.0;
                geo.is_valid().then_some(geo)
            }
            Projection::Planar => {
                // parallel to the plane; slide out far along the ray
                let p = origin + dir.normalize()?.scale(origin.z.abs().max(1.0) * 1.0e3);
                let mut geo = self.inverse(Vec3::new(p.x, p.y, 0.0));
                geo.latitude = geo.latitude.clamp(-90.0, 90.0);
                geo.altitude = 0.0;
                Some(geo)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PLANAR_METERS_PER_DEGREE, Projection};
    use foundation::math::{GeoPoint, Vec3, WGS84_A, WGS84_B};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn srid_round_trip() {
        for p in [Projection::Ellipsoid, Projection::Planar] {
            assert_eq!(Projection::from_srid(p.srid()), Some(p));
        }
        assert_eq!(Projection::from_srid(3857), None);
    }

    #[test]
    fn planar_keeps_unwrapped_longitudes() {
        let p = Projection::Planar;
        let w = p.forward(GeoPoint::new(10.0, 190.0));
        assert_close(w.x, 190.0 * PLANAR_METERS_PER_DEGREE, 1e-6);
        let g = p.inverse(w);
        assert_close(g.longitude, 190.0, 1e-9);
        assert_close(g.latitude, 10.0, 1e-9);
    }

    #[test]
    fn ray_hits_ellipsoid_from_outside() {
        let p = Projection::Ellipsoid;
        let origin = Vec3::new(WGS84_A * 2.0, 0.0, 0.0);
        let t = p.intersect_surface(origin, Vec3::new(-1.0, 0.0, 0.0)).unwrap();
        assert_close(t, WGS84_A, 1e-6);

        let down_pole = p
            .intersect_surface(Vec3::new(0.0, 0.0, WGS84_B + 1000.0), Vec3::new(0.0, 0.0, -1.0))
            .unwrap();
        assert_close(down_pole, 1000.0, 1e-4);

        assert!(p.intersect_surface(origin, Vec3::new(0.0, 1.0, 0.0)).is_none());
        assert!(p.intersect_surface(origin, Vec3::new(1.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn nearest_point_lands_on_horizon_side() {
        let p = Projection::Ellipsoid;
        let origin = Vec3::new(WGS84_A * 2.0, 0.0, 0.0);
        let dir = Vec3::new(-1.0, 0.0, 1.8);
        assert!(p.intersect_surface(origin, dir).is_none());
        let geo = p.nearest_surface_point(origin, dir).unwrap();
        assert!(geo.latitude > 0.0);
        assert_eq!(geo.altitude, 0.0);
    }
}
