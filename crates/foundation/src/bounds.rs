use crate::math::{Vec3, wrap_longitude};

/// Axis-aligned bounding box.
///
/// Terrain tiles use `[longitude, latitude, height]` axes; projected meshes
/// use world axes.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb3 {
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Aabb3 { min, max }
    }

    /// Inverted box that any `expand` call replaces.
    pub fn empty() -> Self {
        Aabb3 {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.min[i] > self.max[i])
    }

    pub fn expand(&mut self, p: Vec3) {
        let p = p.as_array();
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut out = Self::empty();
        for p in points {
            out.expand(p);
        }
        out
    }

    pub fn contains(&self, p: Vec3) -> bool {
        let p = p.as_array();
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// 2D containment on the first two axes.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.min[0] && x <= self.max[0] && y >= self.min[1] && y <= self.max[1]
    }

    pub fn translated(&self, d: Vec3) -> Self {
        let d = d.as_array();
        Aabb3 {
            min: [self.min[0] + d[0], self.min[1] + d[1], self.min[2] + d[2]],
            max: [self.max[0] + d[0], self.max[1] + d[1], self.max[2] + d[2]],
        }
    }

    pub fn center(&self) -> Vec3 {
        Vec3::new(
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        )
    }
}

/// Geographic envelope in degrees.
///
/// When `crosses_idl` is set, `east < west` denotes a range that wraps through
/// the antimeridian; it is never an empty range.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GeoBounds {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub crosses_idl: bool,
}

impl Default for GeoBounds {
    fn default() -> Self {
        Self::world()
    }
}

impl GeoBounds {
    pub fn new(north: f64, west: f64, south: f64, east: f64) -> Self {
        Self {
            north,
            west,
            south,
            east,
            crosses_idl: false,
        }
    }

    pub fn world() -> Self {
        Self::new(90.0, -180.0, -90.0, 180.0)
    }

    pub fn contains_latitude(&self, lat: f64) -> bool {
        lat >= self.south && lat <= self.north
    }

    pub fn contains_longitude(&self, lng: f64) -> bool {
        if !self.crosses_idl {
            return lng >= self.west && lng <= self.east;
        }
        // east == west while crossing is a full turn around the pole
        if self.east <= self.west {
            let lng = wrap_longitude(lng);
            return lng >= self.west || lng <= self.east;
        }
        // unwrapped form, e.g. [170, 190]
        [lng, lng - 360.0, lng + 360.0]
            .into_iter()
            .any(|l| l >= self.west && l <= self.east)
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.contains_latitude(lat) && self.contains_longitude(lng)
    }

    /// Longitudinal extent in degrees, honoring wraparound.
    pub fn longitude_span(&self) -> f64 {
        if self.crosses_idl && self.east <= self.west {
            (180.0 - self.west) + (self.east + 180.0)
        } else {
            self.east - self.west
        }
    }

    /// Splits a wrapping envelope into its eastern `[west, 180]` and western
    /// `[-180, east]` halves. Non-wrapping envelopes return themselves twice.
    pub fn halves(&self) -> (GeoBounds, GeoBounds) {
        if !self.crosses_idl {
            return (*self, *self);
        }
        let west = wrap_longitude(self.west);
        let east = wrap_longitude(self.east);
        (
            GeoBounds::new(self.north, west, self.south, 180.0),
            GeoBounds::new(self.north, -180.0, self.south, east),
        )
    }

    /// Whether a non-wrapping longitude/latitude rectangle overlaps.
    pub fn intersects_rect(&self, min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> bool {
        if max_lat < self.south || min_lat > self.north {
            return false;
        }
        let (east_half, west_half) = self.halves();
        let overlaps = |b: &GeoBounds| max_lng >= b.west && min_lng <= b.east;
        overlaps(&east_half) || (self.crosses_idl && overlaps(&west_half))
    }
}

#[cfg(test)]
mod tests {
    use super::{Aabb3, GeoBounds};
    use crate::math::Vec3;
    use pretty_assertions::assert_eq;

    #[test]
    fn aabb_grows_from_points() {
        let b = Aabb3::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-3.0, 4.0, 10.0)]);
        assert_eq!(b, Aabb3::new([-3.0, -2.0, 0.0], [1.0, 4.0, 10.0]));
        assert!(b.contains(Vec3::new(0.0, 0.0, 5.0)));
        assert!(!b.contains(Vec3::new(0.0, 0.0, 11.0)));
        assert!(Aabb3::empty().is_empty());
    }

    #[test]
    fn wrapping_bounds_are_not_empty() {
        let mut b = GeoBounds::new(5.0, 175.0, -5.0, -175.0);
        b.crosses_idl = true;
        assert!(b.contains(0.0, 179.0));
        assert!(b.contains(0.0, -179.0));
        assert!(b.contains(0.0, 181.0));
        assert!(!b.contains(0.0, 0.0));
        assert!((b.longitude_span() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn crossing_with_equal_edges_is_a_full_turn() {
        let mut b = GeoBounds::new(90.0, -150.0, 10.0, -150.0);
        b.crosses_idl = true;
        assert!(b.contains(45.0, 0.0));
        assert!(b.contains(45.0, 179.0));
        assert!(b.contains(45.0, -151.0));
        assert!((b.longitude_span() - 360.0).abs() < 1e-12);
    }

    #[test]
    fn halves_split_at_antimeridian() {
        let mut b = GeoBounds::new(5.0, 175.0, -5.0, -175.0);
        b.crosses_idl = true;
        let (east, west) = b.halves();
        assert_eq!(east, GeoBounds::new(5.0, 175.0, -5.0, 180.0));
        assert_eq!(west, GeoBounds::new(5.0, -180.0, -5.0, -175.0));
        assert!(b.intersects_rect(-180.0, -1.0, -170.0, 1.0));
        assert!(!b.intersects_rect(0.0, -1.0, 10.0, 1.0));
    }
}
