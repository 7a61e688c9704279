//! Longitude bookkeeping for views that straddle the antimeridian.
//!
//! When the view crosses ±180°, geometry in the hemisphere opposite the view
//! center is shifted by a full turn so it renders contiguously with the
//! primary side. The helper is updated once per frame by the render thread
//! and read by renderables during that frame's draw; it holds no locks.

use foundation::bounds::GeoBounds;

use crate::view_state::ViewState;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Hemisphere {
    East,
    West,
}

impl Hemisphere {
    /// Hemisphere a longitude falls in; `0` counts as east.
    pub fn of(lng: f64) -> Self {
        if lng < 0.0 {
            Hemisphere::West
        } else {
            Hemisphere::East
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AntimeridianHelper {
    primary: Hemisphere,
    crosses_idl: bool,
    continuous_scroll: bool,
    center_lng: f64,
    east: GeoBounds,
    west: GeoBounds,
}

impl Default for AntimeridianHelper {
    fn default() -> Self {
        Self {
            primary: Hemisphere::East,
            crosses_idl: false,
            continuous_scroll: false,
            center_lng: 0.0,
            east: GeoBounds::world(),
            west: GeoBounds::world(),
        }
    }
}

impl AntimeridianHelper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, view: &ViewState) {
        self.primary = Hemisphere::of(view.draw_lng);
        self.crosses_idl = view.crosses_idl();
        self.continuous_scroll = view.continuous_scroll;
        self.center_lng = view.draw_lng;
        (self.east, self.west) = view.bounds.halves();
    }

    pub fn primary_hemisphere(&self) -> Hemisphere {
        self.primary
    }

    pub fn crosses_idl(&self) -> bool {
        self.crosses_idl
    }

    /// Portion of the view bounds in `hemisphere`. Equal to the full bounds
    /// unless the view crosses the antimeridian.
    pub fn bounds(&self, hemisphere: Hemisphere) -> GeoBounds {
        match hemisphere {
            Hemisphere::East => self.east,
            Hemisphere::West => self.west,
        }
    }

    /// Shifts a longitude from the secondary hemisphere next to the primary
    /// one. Already-shifted values are returned unchanged, so applying this
    /// twice is the same as applying it once.
    pub fn wrap_longitude(&self, hemisphere: Hemisphere, lng: f64) -> f64 {
        if !self.crosses_idl || hemisphere == self.primary {
            return lng;
        }
        match self.primary {
            Hemisphere::West if lng > 0.0 => lng - 360.0,
            Hemisphere::East if lng < 0.0 => lng + 360.0,
            _ => lng,
        }
    }

    /// `wrap_longitude` using the hemisphere `lng` itself falls in.
    pub fn wrap(&self, lng: f64) -> f64 {
        self.wrap_longitude(Hemisphere::of(lng), lng)
    }

    /// Full-turn shift (`-360`, `0` or `360`) that places geometry with the
    /// given bounds contiguous with the view under continuous scrolling.
    ///
    /// The geometry's longitudinal midpoint is moved to whichever copy lies
    /// within 180° of the view center; a midpoint exactly 180° away stays on
    /// the side of center it already falls on.
    pub fn unwrap(&self, geometry: &GeoBounds) -> i32 {
        if !self.continuous_scroll || !(self.crosses_idl || geometry.crosses_idl) {
            return 0;
        }
        let east = if geometry.crosses_idl && geometry.east < geometry.west {
            geometry.east + 360.0
        } else {
            geometry.east
        };
        let mid = (geometry.west + east) * 0.5;
        let offset = mid - self.center_lng;
        if offset > 180.0 {
            -360
        } else if offset < -180.0 {
            360
        } else {
            0
        }
    }
}
