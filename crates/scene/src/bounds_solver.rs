//! Geographic bounds of the visible region.
//!
//! The planar path inverts the four viewport corners. On the ellipsoid the
//! corners alone are not enough: the view may include a pole, may run off
//! the globe at the horizon, or may straddle the antimeridian. Eight samples
//! around the viewport edge decide which of those applies, in a fixed order:
//! pole, then horizon, then the sampled polygon itself.

use foundation::bounds::GeoBounds;
use foundation::math::{GeoPoint, Vec2, wrap_longitude};
use tracing::trace;

use crate::projection::Projection;
use crate::scene_model::SceneModel;
use crate::transform::{ScratchPad, inverse_scratch};
use crate::view_state::ViewState;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoundsCase {
    Planar,
    Pole,
    Horizon,
    Polygon,
}

/// Computes `ViewState` bounds and corners. Owns its scratch buffers, so
/// one solver per thread.
#[derive(Debug, Default)]
pub struct SceneBoundsSolver {
    pad: ScratchPad,
}

impl SceneBoundsSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fills `bounds` and the four corners of `view` from its scene. The
    /// returned case says which branch produced the bounds.
    pub fn update(&mut self, view: &mut ViewState) -> BoundsCase {
        let scene = view.scene.clone();
        let vp = scene.viewport();
        let fallback = view.center();
        let corner = |x: f64, y: f64| scene.inverse_nearest(x, y).unwrap_or(fallback);

        view.upper_left = corner(vp.left, vp.top);
        view.upper_right = corner(vp.right, vp.top);
        view.lower_right = corner(vp.right, vp.bottom);
        view.lower_left = corner(vp.left, vp.bottom);

        let corners = view.corners();
        let lats = corners.map(|c| c.latitude);
        let lngs = corners.map(|c| c.longitude);
        let north = lats.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let south = lats.iter().copied().fold(f64::INFINITY, f64::min);
        let east = lngs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let west = lngs.iter().copied().fold(f64::INFINITY, f64::min);

        let crosses_idl = view.continuous_scroll
            && ((east > 180.0 && west < 180.0) || (west < -180.0 && east > -180.0));
        view.bounds = GeoBounds {
            north,
            west,
            south,
            east,
            crosses_idl,
        };

        let case = if scene.is_3d() {
            let case = self.update_ellipsoid(&scene, view);
            wrap_corners(view);
            view.bounds.west = wrap_longitude(view.bounds.west);
            view.bounds.east = wrap_longitude(view.bounds.east);
            case
        } else {
            if view.continuous_scroll {
                wrap_corners(view);
                view.bounds.west = wrap_longitude(view.bounds.west);
                view.bounds.east = wrap_longitude(view.bounds.east);
            }
            BoundsCase::Planar
        };

        trace!(
            case = ?case,
            north = view.bounds.north,
            west = view.bounds.west,
            south = view.bounds.south,
            east = view.bounds.east,
            crosses_idl = view.bounds.crosses_idl,
            "view bounds"
        );
        case
    }

    fn update_ellipsoid(&mut self, scene: &SceneModel, view: &mut ViewState) -> BoundsCase {
        let vp = scene.viewport();
        let (cx, cy) = ((vp.left + vp.right) * 0.5, (vp.top + vp.bottom) * 0.5);

        self.pad.clear();
        self.pad.screen.extend([
            Vec2::new(vp.left, vp.top),
            Vec2::new(cx, vp.top),
            Vec2::new(vp.right, vp.top),
            Vec2::new(vp.right, cy),
            Vec2::new(vp.right, vp.bottom),
            Vec2::new(cx, vp.bottom),
            Vec2::new(vp.left, vp.bottom),
            Vec2::new(vp.left, cy),
        ]);
        inverse_scratch(scene, &mut self.pad);
        let hits: Vec<GeoPoint> = self.pad.geo.iter().flatten().copied().collect();
        let idx = hits.len();

        let lat = view.draw_lat;
        let lng = view.draw_lng;
        let mut horizon = idx < 8;
        let mut pole = idx == 0 && lat != 0.0;

        let mut north = view.bounds.north;
        let mut south = view.bounds.south;

        if idx > 0 {
            north = hits.iter().map(|p| p.latitude).fold(f64::NEG_INFINITY, f64::max);
            south = hits.iter().map(|p| p.latitude).fold(f64::INFINITY, f64::min);

            let eye = scene.camera().location;
            let projection = Projection::Ellipsoid;
            let furthest = hits
                .iter()
                .map(|p| eye.distance_squared(projection.forward(*p)))
                .fold(0.0, f64::max);
            let north_pole = projection.forward(GeoPoint::new(90.0, 0.0));
            let south_pole = projection.forward(GeoPoint::new(-90.0, 0.0));

            pole = lat < south
                || lat > north
                || eye.distance_squared(north_pole) < furthest
                || eye.distance_squared(south_pole) < furthest;

            if idx == 2 && !pole {
                north = 90.0;
                south = -90.0;
            }
        }
        horizon |= pole;

        if pole {
            if idx == 0 {
                north = (lat + 90.0).min(90.0);
                south = (lat - 90.0).max(-90.0);
            }
            if lat > 0.0 {
                north = 90.0;
                if idx < 8 && view.draw_tilt == 0.0 {
                    south = lat - 90.0;
                }
            } else if lat < 0.0 {
                south = -90.0;
                if idx < 8 && view.draw_tilt == 0.0 {
                    north = lat + 90.0;
                }
            }
            view.bounds = GeoBounds {
                north,
                west: wrap_longitude(lng - 180.0),
                south,
                east: wrap_longitude(lng + 180.0),
                crosses_idl: lng != 0.0,
            };
            set_corners_from_bounds(view);
            BoundsCase::Pole
        } else if horizon {
            view.bounds = GeoBounds {
                north,
                west: wrap_longitude(lng - 90.0),
                south,
                east: wrap_longitude(lng + 90.0),
                crosses_idl: lng.abs() > 90.0,
            };
            set_corners_from_bounds(view);
            BoundsCase::Horizon
        } else {
            view.bounds = polygon_bounds(&hits);
            BoundsCase::Polygon
        }
    }
}

/// Bounds of the ring of edge samples. A counter-clockwise winding (in
/// lon/lat with north up) means the ring wraps through ±180°.
fn polygon_bounds(ring: &[GeoPoint]) -> GeoBounds {
    let n = ring.len();
    let mut sum = 0.0;
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        sum += (b.longitude - a.longitude) * (b.latitude + a.latitude);
        min_x = min_x.min(a.longitude);
        max_x = max_x.max(a.longitude);
        min_y = min_y.min(a.latitude);
        max_y = max_y.max(a.latitude);
    }

    if sum >= 0.0 {
        return GeoBounds {
            north: max_y,
            west: min_x,
            south: min_y,
            east: max_x,
            crosses_idl: false,
        };
    }

    let mut west: f64 = 180.0;
    let mut east: f64 = -180.0;
    for p in ring {
        if p.longitude > 0.0 {
            west = west.min(p.longitude);
        } else if p.longitude < 0.0 {
            east = east.max(p.longitude);
        }
    }
    GeoBounds {
        north: max_y,
        west,
        south: min_y,
        east,
        crosses_idl: true,
    }
}

fn set_corners_from_bounds(view: &mut ViewState) {
    let b = view.bounds;
    view.upper_left = GeoPoint::new(b.north, b.west);
    view.upper_right = GeoPoint::new(b.north, b.east);
    view.lower_right = GeoPoint::new(b.south, b.east);
    view.lower_left = GeoPoint::new(b.south, b.west);
}

fn wrap_corners(view: &mut ViewState) {
    for corner in [
        &mut view.upper_left,
        &mut view.upper_right,
        &mut view.lower_right,
        &mut view.lower_left,
    ] {
        corner.longitude = wrap_longitude(corner.longitude);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{BoundsCase, SceneBoundsSolver, polygon_bounds};
    use crate::projection::Projection;
    use crate::scene_model::{CameraParams, SceneModel};
    use crate::view_state::ViewState;
    use foundation::bounds::GeoBounds;
    use foundation::math::GeoPoint;

    fn solve(params: CameraParams, continuous_scroll: bool) -> (ViewState, BoundsCase) {
        let scene = Arc::new(SceneModel::new(&params));
        let mut view = ViewState::from_scene(scene, 1, continuous_scroll);
        let case = SceneBoundsSolver::new().update(&mut view);
        (view, case)
    }

    fn contains_with_slack(b: &GeoBounds, g: GeoPoint) -> bool {
        const EPS: f64 = 1e-7;
        let lat_ok = g.latitude >= b.south - EPS && g.latitude <= b.north + EPS;
        let lng_ok = [0.0, EPS, -EPS]
            .iter()
            .any(|d| b.contains_longitude(g.longitude + d));
        lat_ok && lng_ok
    }

    fn globe(lat: f64, lng: f64, resolution: f64) -> CameraParams {
        CameraParams {
            projection: Projection::Ellipsoid,
            center: GeoPoint::new(lat, lng),
            resolution,
            ..CameraParams::default()
        }
    }

    #[test]
    fn wrapped_ring_ignores_prime_meridian_sample() {
        let ring = [
            GeoPoint::new(10.0, 170.0),
            GeoPoint::new(10.0, -170.0),
            GeoPoint::new(-10.0, -170.0),
            GeoPoint::new(-10.0, 0.0),
            GeoPoint::new(-10.0, 170.0),
        ];
        let b = polygon_bounds(&ring);
        assert!(b.crosses_idl);
        assert_eq!((b.west, b.east), (170.0, -170.0));
        assert_eq!((b.south, b.north), (-10.0, 10.0));
    }

    #[test]
    fn centered_at_origin() {
        let (view, case) = solve(globe(0.0, 0.0, 100.0), false);
        let b = view.bounds;
        assert_eq!(case, BoundsCase::Polygon);
        assert!(!b.crosses_idl);
        assert!(b.west < 0.0 && b.east > 0.0);
        assert!(b.south < 0.0 && b.north > 0.0);
        assert!((b.east + b.west).abs() < 1e-6, "{b:?}");
        assert!((b.north + b.south).abs() < 1e-6, "{b:?}");
        assert!(b.contains(0.0, 0.0));
    }

    #[test]
    fn straddles_antimeridian() {
        let (view, case) = solve(globe(0.0, 179.9, 1_000.0), true);
        let b = view.bounds;
        assert_eq!(case, BoundsCase::Polygon);
        assert!(b.crosses_idl);
        assert!(b.west > 170.0 && b.west < 178.0, "{b:?}");
        assert!(b.east > -178.0 && b.east < -170.0, "{b:?}");
        assert!(b.contains(0.0, 179.9));
        assert!(b.contains(0.0, -179.9));
        assert!(!b.contains(0.0, 0.0));
    }

    #[test]
    fn pole_from_high_altitude() {
        let (view, case) = solve(globe(85.0, 0.0, 20_000.0), false);
        let b = view.bounds;
        assert_eq!(case, BoundsCase::Pole);
        assert_eq!(b.north, 90.0);
        assert_eq!(b.south, -5.0);
        assert_eq!((b.west, b.east), (-180.0, 180.0));
        assert_eq!(view.upper_left, GeoPoint::new(90.0, -180.0));
        assert_eq!(view.lower_right, GeoPoint::new(-5.0, 180.0));
    }

    #[test]
    fn pole_directly_below() {
        let (view, case) = solve(globe(90.0, 0.0, 100.0), false);
        let b = view.bounds;
        assert_eq!(case, BoundsCase::Pole);
        assert_eq!(b.north, 90.0);
        assert!(b.south > 89.0 && b.south < 90.0, "{b:?}");
        assert!(b.contains(89.9, 123.0));
    }

    #[test]
    fn globe_narrower_than_viewport() {
        // only the top and bottom edge midpoints reach the globe
        let (view, case) = solve(globe(0.0, 20.0, 9_400.0), false);
        let b = view.bounds;
        assert_eq!(case, BoundsCase::Horizon);
        assert_eq!((b.north, b.south), (90.0, -90.0));
        assert_eq!((b.west, b.east), (-70.0, 110.0));
        assert!(!b.crosses_idl);
    }

    #[test]
    fn visible_samples_are_inside_bounds() {
        for (lat, lng, res, tilt) in [
            (0.0, 0.0, 50.0, 0.0),
            (45.0, -120.0, 200.0, 30.0),
            (-33.0, 151.0, 500.0, 45.0),
            (0.0, 179.9, 1_000.0, 0.0),
            (0.0, -179.95, 300.0, 20.0),
        ] {
            let mut p = globe(lat, lng, res);
            p.tilt = tilt;
            let scene = SceneModel::new(&p);
            let (view, _) = solve(p, true);
            let vp = scene.viewport();
            for i in 0..=8 {
                for j in 0..=8 {
                    let x = vp.left + vp.width() * i as f64 / 8.0;
                    let y = vp.top + vp.height() * j as f64 / 8.0;
                    if let Ok(g) = scene.inverse(x, y) {
                        assert!(
                            contains_with_slack(&view.bounds, g),
                            "{g:?} outside {:?} at ({lat},{lng})",
                            view.bounds
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn planar_continuous_scroll_wraps() {
        let p = CameraParams {
            projection: Projection::Planar,
            center: GeoPoint::new(0.0, 179.0),
            resolution: 2_000.0,
            ..CameraParams::default()
        };
        let (view, case) = solve(p.clone(), true);
        assert_eq!(case, BoundsCase::Planar);
        assert!(view.bounds.crosses_idl);
        assert!(view.bounds.west > 160.0 && view.bounds.west < 179.0);
        assert!(view.bounds.east < -160.0 && view.bounds.east > -180.0);
        assert!(view.upper_right.longitude < 0.0);

        let (flat, _) = solve(p, false);
        assert!(!flat.bounds.crosses_idl);
        assert!(flat.bounds.east > 180.0);
    }
}
