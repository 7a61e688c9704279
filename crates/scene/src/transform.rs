//! Bulk coordinate transforms.
//!
//! The bulk variants write into caller-owned buffers so per-frame work does
//! not allocate once the buffers are warm. A `ScratchPad` bundles those
//! buffers; it is owned by exactly one thread and is reset by every call that
//! uses it, so results must be consumed before the next call.

use foundation::math::{GeoPoint, Vec2, Vec3};

use crate::scene_model::SceneModel;

#[derive(Debug, Default)]
pub struct ScratchPad {
    pub screen: Vec<Vec2>,
    pub geo: Vec<Option<GeoPoint>>,
    pub projected: Vec<Option<Vec3>>,
}

impl ScratchPad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.screen.clear();
        self.geo.clear();
        self.projected.clear();
    }
}

/// Geodetic points to screen `(x, y, depth)`. Points that cannot be
/// projected become `None` at the same index.
pub fn forward_bulk(scene: &SceneModel, points: &[GeoPoint], out: &mut Vec<Option<Vec3>>) {
    out.clear();
    out.extend(points.iter().map(|p| scene.forward(*p).ok()));
}

/// Screen points to surface points; misses become `None`.
pub fn inverse_bulk(scene: &SceneModel, points: &[Vec2], out: &mut Vec<Option<GeoPoint>>) {
    out.clear();
    out.extend(points.iter().map(|p| scene.inverse(p.x, p.y).ok()));
}

/// Inverts the screen points held in `pad.screen` into `pad.geo`.
pub fn inverse_scratch(scene: &SceneModel, pad: &mut ScratchPad) {
    let ScratchPad { screen, geo, .. } = pad;
    inverse_bulk(scene, screen, geo);
}

#[cfg(test)]
mod tests {
    use super::{ScratchPad, forward_bulk, inverse_scratch};
    use crate::projection::Projection;
    use crate::scene_model::{CameraParams, SceneModel};
    use foundation::math::{GeoPoint, Vec2};

    #[test]
    fn bulk_keeps_indices_aligned() {
        let scene = SceneModel::new(&CameraParams {
            projection: Projection::Ellipsoid,
            resolution: 20.0,
            ..CameraParams::default()
        });
        let mut out = Vec::new();
        forward_bulk(
            &scene,
            &[
                GeoPoint::new(0.0, 0.0),
                GeoPoint::new(f64::NAN, 0.0),
                GeoPoint::new(0.01, 0.01),
            ],
            &mut out,
        );
        assert_eq!(out.len(), 3);
        assert!(out[0].is_some());
        assert!(out[1].is_none());
        assert!(out[2].is_some());
    }

    #[test]
    fn scratch_is_reset_between_calls() {
        let mut p = CameraParams {
            resolution: 3_000.0,
            tilt: 80.0,
            ..CameraParams::default()
        };
        p.center = GeoPoint::new(0.0, 0.0);
        let scene = SceneModel::new(&p);
        let vp = scene.viewport();

        let mut pad = ScratchPad::new();
        pad.screen.extend([vp.center(), Vec2::new(vp.center().x, vp.top)]);
        inverse_scratch(&scene, &mut pad);
        assert_eq!(pad.geo.len(), 2);
        assert!(pad.geo[0].is_some());
        assert!(pad.geo[1].is_none());

        pad.clear();
        pad.screen.push(vp.center());
        inverse_scratch(&scene, &mut pad);
        assert_eq!(pad.geo.len(), 1);
    }
}
