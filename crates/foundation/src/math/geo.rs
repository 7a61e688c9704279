//! Geographic points in degrees, as used at every API surface of the map view.

use super::{Ecef, Geodetic, ecef_to_geodetic, geodetic_to_ecef};

/// Latitude/longitude in decimal degrees, altitude in meters HAE.
///
/// Longitude is not normalized; values outside `[-180, 180]` are meaningful
/// when continuous scrolling places geometry past the antimeridian.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
        }
    }

    pub fn with_altitude(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    pub fn to_geodetic(self) -> Geodetic {
        Geodetic::new(
            self.latitude.to_radians(),
            self.longitude.to_radians(),
            self.altitude,
        )
    }

    pub fn from_geodetic(geo: Geodetic) -> Self {
        Self::with_altitude(geo.lat_rad.to_degrees(), geo.lon_rad.to_degrees(), geo.alt_m)
    }

    pub fn to_ecef(self) -> Ecef {
        geodetic_to_ecef(self.to_geodetic())
    }

    pub fn from_ecef(ecef: Ecef) -> Self {
        Self::from_geodetic(ecef_to_geodetic(ecef))
    }
}

/// Folds any longitude into `[-180, 180]`.
pub fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid maps +180 onto -180; keep the sign of the input
    if wrapped == -180.0 && lng > 0.0 { 180.0 } else { wrapped }
}

pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-90.0, 90.0)
}

#[cfg(test)]
mod tests {
    use super::{GeoPoint, wrap_longitude};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn wrap_folds_into_range() {
        assert_eq!(wrap_longitude(10.0), 10.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert_close(wrap_longitude(190.0), -170.0, 1e-12);
        assert_close(wrap_longitude(-190.0), 170.0, 1e-12);
        assert_close(wrap_longitude(540.0), 180.0, 1e-12);
        assert_close(wrap_longitude(725.0), 5.0, 1e-12);
    }

    #[test]
    fn degrees_round_trip_through_ecef() {
        let p = GeoPoint::with_altitude(-33.9, 151.2, 42.0);
        let rt = GeoPoint::from_ecef(p.to_ecef());
        assert_close(rt.latitude, p.latitude, 1e-9);
        assert_close(rt.longitude, p.longitude, 1e-9);
        assert_close(rt.altitude, p.altitude, 1e-6);
    }
}
