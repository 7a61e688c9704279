//! Frame loop glue: captures the camera into a `ViewState`, solves its
//! bounds, swaps the terrain lock and draws every layer.

use std::sync::Arc;

use foundation::math::GeoPoint;
use scene::antimeridian::AntimeridianHelper;
use scene::bounds_solver::SceneBoundsSolver;
use scene::error::ProjectionError;
use scene::scene_model::{CameraParams, SceneModel};
use scene::view_state::ViewState;
use terrain::service::{TerrainTileService, TileLock, visible_tiles};
use terrain::tile::TerrainTile;
use tracing::{debug, trace};

use crate::drawable::{DrawContext, Drawable, fold_child_states};
use crate::frame::{RenderCommand, RenderFrame};

/// State of the offscreen pass that terrain-dependent content renders
/// against.
#[derive(Debug)]
pub struct Offscreen {
    pub scene: Arc<SceneModel>,
    /// Tiles locked for the current frame; released when the next frame
    /// locks its own set.
    pub tiles: Option<TileLock>,
    /// Locked tiles inside the view frustum.
    pub visible: Vec<Arc<TerrainTile>>,
    pub terrain_version: u64,
    /// Tilted views render terrain in two passes.
    pub two_pass: bool,
}

pub struct MapView {
    params: CameraParams,
    continuous_scroll: bool,
    draw_version: u64,
    camera_dirty: bool,
    view: ViewState,
    solver: SceneBoundsSolver,
    antimeridian: AntimeridianHelper,
    terrain: Option<Arc<TerrainTileService>>,
    offscreen: Offscreen,
    layers: Vec<Box<dyn Drawable>>,
}

impl MapView {
    pub fn new(params: CameraParams, continuous_scroll: bool) -> Self {
        let scene = Arc::new(SceneModel::new(&params));
        Self {
            view: ViewState::from_scene(scene.clone(), 0, continuous_scroll),
            params,
            continuous_scroll,
            draw_version: 0,
            camera_dirty: true,
            solver: SceneBoundsSolver::new(),
            antimeridian: AntimeridianHelper::new(),
            terrain: None,
            offscreen: Offscreen {
                scene,
                tiles: None,
                visible: Vec::new(),
                terrain_version: 0,
                two_pass: false,
            },
            layers: Vec::new(),
        }
    }

    pub fn with_terrain(mut self, service: Arc<TerrainTileService>) -> Self {
        self.terrain = Some(service);
        self
    }

    pub fn add_layer(&mut self, layer: Box<dyn Drawable>) {
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Box<dyn Drawable>] {
        &self.layers
    }

    pub fn camera(&self) -> &CameraParams {
        &self.params
    }

    /// Edits the camera. The next frame captures a new view only if
    /// something actually changed.
    pub fn update_camera(&mut self, f: impl FnOnce(&mut CameraParams)) {
        let before = self.params.clone();
        f(&mut self.params);
        if self.params != before {
            self.camera_dirty = true;
        }
    }

    pub fn look_at(&mut self, center: GeoPoint, resolution: f64) {
        self.update_camera(|p| {
            p.center = center;
            p.resolution = resolution;
        });
    }

    pub fn set_continuous_scroll(&mut self, enabled: bool) {
        if self.continuous_scroll != enabled {
            self.continuous_scroll = enabled;
            self.camera_dirty = true;
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn antimeridian(&self) -> &AntimeridianHelper {
        &self.antimeridian
    }

    pub fn offscreen(&self) -> &Offscreen {
        &self.offscreen
    }

    pub fn terrain(&self) -> Option<&Arc<TerrainTileService>> {
        self.terrain.as_ref()
    }

    /// Renders one frame.
    pub fn render(&mut self) -> RenderFrame {
        let terrain_version = self.terrain.as_ref().map_or(0, |t| t.terrain_version());
        if self.camera_dirty || terrain_version != self.view.terrain_version {
            self.capture_view(terrain_version);
        } else {
            self.view.settled = true;
        }
        self.lock_terrain();

        let mut frame = RenderFrame::new(self.view.draw_version);
        if self.terrain.is_some() {
            frame.push(RenderCommand::Terrain {
                terrain_version: self.offscreen.terrain_version,
                tiles: self.offscreen.visible.iter().map(|t| t.handle).collect(),
            });
        }
        let ctx = DrawContext {
            view: &self.view,
            antimeridian: &self.antimeridian,
        };
        for layer in &self.layers {
            layer.draw(&ctx, &mut frame);
        }
        frame
    }

    /// True once no layer is still loading content.
    pub fn is_resolved(&self) -> bool {
        fold_child_states(self.layers.iter().filter_map(|l| l.as_resolvable())).is_terminal()
    }

    pub fn inverse(&self, x: f64, y: f64) -> Result<GeoPoint, ProjectionError> {
        self.view.scene.inverse(x, y)
    }

    /// Screen pixel to the terrain surface, falling back to the zero-height
    /// surface where no locked tile is hit.
    pub fn inverse_with_terrain(&self, x: f64, y: f64) -> Result<GeoPoint, ProjectionError> {
        let scene = &self.view.scene;
        if let Some(service) = &self.terrain {
            let ray = scene.screen_ray(x, y)?;
            if let Some(hit) = service.intersect(scene, &ray) {
                return Ok(hit);
            }
        }
        scene.inverse(x, y)
    }

    pub fn elevation(&self, geo: GeoPoint) -> f64 {
        self.terrain.as_ref().map_or(0.0, |t| t.elevation(geo))
    }

    /// Releases every layer and the terrain lock.
    pub fn release(&mut self) {
        for mut layer in self.layers.drain(..) {
            layer.release();
        }
        if let Some(lock) = self.offscreen.tiles.take()
            && let Some(service) = &self.terrain
        {
            service.unlock(lock);
        }
        self.offscreen.visible.clear();
    }

    fn capture_view(&mut self, terrain_version: u64) {
        let scene = Arc::new(SceneModel::new(&self.params));
        let mut view =
            ViewState::from_scene(scene.clone(), self.draw_version + 1, self.continuous_scroll);
        view.terrain_version = terrain_version;
        if self.draw_version > 0 && view.same_view(&self.view) {
            // edits that cancelled out keep the current version
            self.view.settled = true;
            self.camera_dirty = false;
            return;
        }
        self.draw_version += 1;
        view.settled = !self.camera_dirty;
        let case = self.solver.update(&mut view);
        trace!(
            version = view.draw_version,
            ?case,
            crosses_idl = view.crosses_idl(),
            "view captured"
        );

        self.antimeridian.update(&view);
        self.offscreen.scene = scene;
        self.offscreen.two_pass = view.draw_tilt > 0.0;
        self.view = view;
        self.camera_dirty = false;
    }

    fn lock_terrain(&mut self) {
        let Some(service) = &self.terrain else {
            return;
        };
        // tiles in both sets must keep a nonzero lock count across the swap
        let lock = service.lock(&self.view);
        self.offscreen.terrain_version = lock.version();
        if let Some(previous) = self.offscreen.tiles.replace(lock) {
            service.unlock(previous);
        }

        self.offscreen.visible.clear();
        if let Some(lock) = &self.offscreen.tiles {
            visible_tiles(
                lock.tiles(),
                &self.offscreen.scene,
                self.view.crosses_idl(),
                &mut self.offscreen.visible,
            );
            if self.offscreen.terrain_version != self.view.terrain_version {
                debug!(
                    view = self.view.terrain_version,
                    terrain = self.offscreen.terrain_version,
                    "terrain changed during lock"
                );
            }
        }
    }
}

impl Drop for MapView {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::MapView;
    use foundation::math::GeoPoint;
    use scene::projection::Projection;
    use scene::scene_model::CameraParams;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};
    use terrain::grid::{GridTerrainSource, TileExtent};
    use terrain::{FlatElevation, TerrainConfig, TerrainTileService};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn params(projection: Projection, lat: f64, lng: f64, resolution: f64) -> CameraParams {
        CameraParams {
            projection,
            center: GeoPoint::new(lat, lng),
            resolution,
            ..CameraParams::default()
        }
    }

    fn grid_terrain(height: f64) -> Arc<TerrainTileService> {
        let config = TerrainConfig::default();
        let source = GridTerrainSource::new(Arc::new(FlatElevation(height)), &config);
        Arc::new(TerrainTileService::new(Arc::new(source), None, &config))
    }

    #[test]
    fn version_changes_only_with_the_camera() {
        let mut map = MapView::new(params(Projection::Ellipsoid, 0.0, 0.0, 1_000.0), false);
        assert_eq!(map.view().draw_version, 0);
        assert_eq!(map.render().draw_version, 1);
        assert_eq!(map.render().draw_version, 1);
        assert!(map.view().settled);

        map.update_camera(|p| p.resolution = 1_000.0);
        assert_eq!(map.render().draw_version, 1);

        map.look_at(GeoPoint::new(10.0, 20.0), 500.0);
        assert_eq!(map.render().draw_version, 2);
        assert!(!map.view().settled);
        assert_close(map.view().draw_lat, 10.0, 1e-9);
        assert!(map.view().bounds.contains(10.0, 20.0));

        map.update_camera(|p| p.tilt = 30.0);
        map.render();
        assert!(map.offscreen().two_pass);
    }

    #[test]
    fn toggling_scroll_back_keeps_the_version() {
        let mut map = MapView::new(params(Projection::Planar, 0.0, 0.0, 1_000.0), true);
        assert_eq!(map.render().draw_version, 1);

        map.set_continuous_scroll(false);
        map.set_continuous_scroll(true);
        assert_eq!(map.render().draw_version, 1);
        assert!(map.view().settled);

        map.set_continuous_scroll(false);
        assert_eq!(map.render().draw_version, 2);
        assert!(!map.view().continuous_scroll);
    }

    #[test]
    fn each_frame_swaps_the_terrain_lock() {
        let terrain = grid_terrain(0.0);
        let mut map = MapView::new(params(Projection::Ellipsoid, 0.0, 0.0, 20_000.0), false)
            .with_terrain(terrain.clone());
        map.render();
        let first = map.offscreen().tiles.as_ref().map_or(0, |l| l.len());
        assert!(first > 0);
        assert_eq!(terrain.locked_tiles().len(), first);

        for _ in 0..3 {
            map.render();
        }
        let current = map.offscreen().tiles.as_ref().map_or(0, |l| l.len());
        assert_eq!(terrain.locked_tiles().len(), current);

        map.release();
        assert!(terrain.locked_tiles().is_empty());
        assert!(map.offscreen().tiles.is_none());
    }

    #[test]
    fn terrain_refinement_bumps_the_view() {
        let terrain = grid_terrain(1_000.0);
        let mut map = MapView::new(params(Projection::Planar, 10.2, 10.5, 200.0), false)
            .with_terrain(terrain.clone());
        let center = GeoPoint::new(10.2, 10.5);
        let mut last_version = 0;
        // tiles are built on the grid worker; keep rendering until they land
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            let frame = map.render();
            assert!(frame.draw_version >= last_version);
            last_version = frame.draw_version;
            let settled = map.offscreen().terrain_version == map.view().terrain_version;
            if settled && (map.elevation(center) - 1_000.0).abs() < 1e-6 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        assert_close(map.elevation(center), 1_000.0, 1e-6);
        // terrain builds recaptured the view at least once
        assert!(last_version > 1);
        assert_eq!(map.view().terrain_version, terrain.terrain_version());

        let c = map.view().viewport.center();
        let surface = map.inverse(c.x, c.y).unwrap();
        let hit = map.inverse_with_terrain(c.x, c.y).unwrap();
        assert_close(surface.altitude, 0.0, 1e-6);
        assert_close(hit.altitude, 1_000.0, 1e-3);
        assert_close(hit.latitude, 10.2, 1e-5);
        assert_close(hit.longitude, 10.5, 1e-5);
    }

    #[test]
    fn planar_view_across_antimeridian_keeps_far_side_tiles() {
        let terrain = grid_terrain(0.0);
        let mut map = MapView::new(params(Projection::Planar, 0.0, 179.0, 2_000.0), true)
            .with_terrain(terrain);
        let frame = map.render();
        assert!(map.view().crosses_idl());
        assert!(map.antimeridian().crosses_idl());
        let wests: Vec<f64> =
            frame.terrain_tiles().iter().map(|h| TileExtent::of(*h).west).collect();
        assert!(wests.contains(&90.0), "{wests:?}");
        assert!(wests.contains(&-180.0), "{wests:?}");
    }

    #[test]
    fn inverse_without_terrain_uses_surface() {
        let mut map = MapView::new(params(Projection::Planar, 0.0, 0.0, 100.0), false);
        map.render();
        let c = map.view().viewport.center();
        assert_eq!(map.inverse_with_terrain(c.x, c.y), map.inverse(c.x, c.y));
        assert_eq!(map.elevation(GeoPoint::new(0.0, 0.0)), 0.0);
    }
}
