use std::sync::Arc;

use foundation::bounds::GeoBounds;
use foundation::math::{GeoPoint, Vec2};

use crate::scene_model::{SceneModel, Viewport};

/// Per-frame snapshot of everything content preparation depends on.
///
/// The render thread captures one per frame; background workers receive
/// their own clone. The scene model is shared, never mutated.
#[derive(Debug, Clone)]
pub struct ViewState {
    /// Bumped by the map view whenever any camera field changes. `0` means
    /// nothing has been captured yet.
    pub draw_version: u64,
    pub draw_srid: i32,
    pub draw_lat: f64,
    pub draw_lng: f64,
    pub draw_rotation: f64,
    pub draw_tilt: f64,
    pub draw_map_scale: f64,
    pub draw_map_resolution: f64,
    pub bounds: GeoBounds,
    pub upper_left: GeoPoint,
    pub upper_right: GeoPoint,
    pub lower_right: GeoPoint,
    pub lower_left: GeoPoint,
    pub viewport: Viewport,
    pub focus: Vec2,
    /// No camera animation is in progress.
    pub settled: bool,
    pub continuous_scroll: bool,
    pub terrain_version: u64,
    pub scene: Arc<SceneModel>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self::from_scene(Arc::new(SceneModel::default()), 0, false)
    }
}

impl ViewState {
    /// Copies camera fields out of `scene`. Bounds and corners are left at
    /// their defaults until a bounds solver fills them in.
    pub fn from_scene(scene: Arc<SceneModel>, draw_version: u64, continuous_scroll: bool) -> Self {
        let params = scene.params();
        let center = params.center;
        Self {
            draw_version,
            draw_srid: scene.srid(),
            draw_lat: center.latitude,
            draw_lng: center.longitude,
            draw_rotation: params.rotation,
            draw_tilt: params.tilt,
            draw_map_scale: params.map_scale(),
            draw_map_resolution: params.resolution,
            bounds: GeoBounds::world(),
            upper_left: center,
            upper_right: center,
            lower_right: center,
            lower_left: center,
            viewport: params.viewport,
            focus: params.focus,
            settled: true,
            continuous_scroll,
            terrain_version: 0,
            scene,
        }
    }

    pub fn crosses_idl(&self) -> bool {
        self.bounds.crosses_idl
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(self.draw_lat, self.draw_lng)
    }

    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            self.upper_left,
            self.upper_right,
            self.lower_right,
            self.lower_left,
        ]
    }

    /// Field equality ignoring `draw_version`, for detecting a version bump
    /// that did not actually move the camera.
    pub fn same_view(&self, other: &ViewState) -> bool {
        self.draw_srid == other.draw_srid
            && self.draw_lat == other.draw_lat
            && self.draw_lng == other.draw_lng
            && self.draw_rotation == other.draw_rotation
            && self.draw_tilt == other.draw_tilt
            && self.draw_map_scale == other.draw_map_scale
            && self.draw_map_resolution == other.draw_map_resolution
            && self.viewport == other.viewport
            && self.focus == other.focus
            && self.continuous_scroll == other.continuous_scroll
            && self.terrain_version == other.terrain_version
            && self.scene.params() == other.scene.params()
    }
}
