//! Versioned, lockable view of the terrain tiles covering the camera.
//!
//! The render thread locks a fresh tile set each frame before unlocking the
//! previous one. Every tile in a `TileLock` stays alive until that lock is
//! handed back to `unlock`; tiles the source stopped reporting are disposed
//! once no lock holds them, checked on every `lock` and `unlock`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use foundation::handles::TileHandle;
use foundation::math::{GeoPoint, Vec3};
use parking_lot::Mutex;
use scene::picking::{Ray, ray_aabb_hit_t};
use scene::projection::PLANAR_METERS_PER_DEGREE;
use scene::scene_model::SceneModel;
use scene::view_state::ViewState;
use tracing::{debug, trace, warn};

use crate::config::TerrainConfig;
use crate::elevation::ElevationSource;
use crate::source::TerrainSource;
use crate::tile::TerrainTile;

/// Tiles locked for one frame, tagged with the terrain version they were
/// taken at. Must be returned through `TerrainTileService::unlock`.
#[derive(Debug, Default)]
#[must_use = "locked tiles must be handed back to TerrainTileService::unlock"]
pub struct TileLock {
    version: u64,
    tiles: Vec<Arc<TerrainTile>>,
}

impl TileLock {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn tiles(&self) -> &[Arc<TerrainTile>] {
        &self.tiles
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = TileHandle> + '_ {
        self.tiles.iter().map(|t| t.handle)
    }
}

#[derive(Debug)]
struct CachedTile {
    tile: Arc<TerrainTile>,
    locks: u32,
}

#[derive(Debug, Default)]
struct ServiceState {
    tiles: HashMap<TileHandle, CachedTile>,
    source_version: u64,
}

pub struct TerrainTileService {
    source: Arc<dyn TerrainSource>,
    fallback: Option<Arc<dyn ElevationSource>>,
    config: TerrainConfig,
    state: Mutex<ServiceState>,
    terrain_version: AtomicU64,
}

impl std::fmt::Debug for TerrainTileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerrainTileService")
            .field("terrain_version", &self.terrain_version())
            .field("cached", &self.state.lock().tiles.len())
            .finish()
    }
}

impl TerrainTileService {
    pub fn new(
        source: Arc<dyn TerrainSource>,
        fallback: Option<Arc<dyn ElevationSource>>,
        config: &TerrainConfig,
    ) -> Self {
        Self {
            source,
            fallback,
            config: config.sanitized(),
            state: Mutex::new(ServiceState::default()),
            terrain_version: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &TerrainConfig {
        &self.config
    }

    /// Monotonic; changes whenever the terrain surface may have changed.
    pub fn terrain_version(&self) -> u64 {
        self.terrain_version.load(Ordering::Acquire)
    }

    /// Elevation sources were added, removed or changed.
    pub fn on_sources_changed(&self) {
        self.source.invalidate();
        let version = self.terrain_version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "terrain sources changed");
    }

    /// Locks the tiles covering `view`.
    pub fn lock(&self, view: &ViewState) -> TileLock {
        let mut tiles = Vec::new();
        self.source.collect(view, &mut tiles);

        let mut seen = HashSet::with_capacity(tiles.len());
        tiles.retain(|t| seen.insert(t.handle));
        if tiles.len() > self.config.max_tiles_per_lock {
            warn!(
                collected = tiles.len(),
                max = self.config.max_tiles_per_lock,
                "too many terrain tiles for one lock; truncating"
            );
            tiles.truncate(self.config.max_tiles_per_lock);
        }

        let source_version = self.source.version();
        let mut state = self.state.lock();
        if source_version != state.source_version {
            state.source_version = source_version;
            self.terrain_version.fetch_add(1, Ordering::AcqRel);
        }
        for tile in &tiles {
            let cached = state.tiles.entry(tile.handle).or_insert_with(|| CachedTile {
                tile: tile.clone(),
                locks: 0,
            });
            if !Arc::ptr_eq(&cached.tile, tile) {
                trace!(tile = %tile.handle, "terrain tile rebuilt");
                cached.tile = tile.clone();
            }
            cached.locks += 1;
        }
        let stale = self.evict_unreported(&mut state);
        let version = self.terrain_version();
        trace!(tiles = tiles.len(), cached = state.tiles.len(), version, "locked terrain");
        drop(state);
        self.dispose_all(stale);
        TileLock { version, tiles }
    }

    /// Releases a lock taken by `lock`. Handles this service does not know
    /// are ignored.
    pub fn unlock(&self, lock: TileLock) {
        let stale = {
            let mut state = self.state.lock();
            for tile in &lock.tiles {
                if let Some(cached) = state.tiles.get_mut(&tile.handle) {
                    cached.locks = cached.locks.saturating_sub(1);
                }
            }
            self.evict_unreported(&mut state)
        };
        self.dispose_all(stale);
    }

    /// Removes unlocked tiles the source no longer reports.
    fn evict_unreported(&self, state: &mut ServiceState) -> Vec<Arc<TerrainTile>> {
        let mut stale = Vec::new();
        state.tiles.retain(|handle, cached| {
            if cached.locks > 0 || self.source.is_live(*handle) {
                return true;
            }
            stale.push(cached.tile.clone());
            false
        });
        stale
    }

    fn dispose_all(&self, tiles: Vec<Arc<TerrainTile>>) {
        if tiles.is_empty() {
            return;
        }
        trace!(count = tiles.len(), "disposing terrain tiles");
        for tile in tiles {
            self.source.dispose(&tile);
        }
    }

    /// Tiles the service currently tracks, locked or not.
    pub fn cached_tiles(&self) -> usize {
        self.state.lock().tiles.len()
    }

    /// Snapshot of every tile held by at least one lock.
    pub fn locked_tiles(&self) -> Vec<Arc<TerrainTile>> {
        self.state
            .lock()
            .tiles
            .values()
            .filter(|c| c.locks > 0)
            .map(|c| c.tile.clone())
            .collect()
    }

    /// Surface height at `geo`: the highest mesh hit among locked tiles with
    /// data, else the fallback source, else zero.
    pub fn elevation(&self, geo: GeoPoint) -> f64 {
        let (lat, lng) = (geo.latitude, geo.longitude);
        let start = self.config.ray_start_altitude;
        let mesh = self
            .locked_tiles()
            .iter()
            .filter(|t| t.has_data && t.contains(lat, lng))
            .filter_map(|t| t.elevation(lat, lng, start))
            .filter(|h| !h.is_nan())
            .fold(None, |best: Option<f64>, h| Some(best.map_or(h, |b| b.max(h))));
        if let Some(h) = mesh {
            return h;
        }

        if let Some(fallback) = &self.fallback {
            match fallback.elevation(lat, lng) {
                Ok(h) if h.is_finite() => return h,
                Ok(_) => trace!(lat, lng, "fallback elevation not finite"),
                Err(err) => trace!(lat, lng, %err, "no fallback elevation"),
            }
        }
        0.0
    }

    /// Nearest intersection of a world-space ray with the locked terrain.
    pub fn intersect(&self, scene: &SceneModel, ray: &Ray) -> Option<GeoPoint> {
        let projection = scene.projection();
        let mut best: Option<f64> = None;
        for tile in self.locked_tiles() {
            let mesh = tile.projected(projection);
            let Some(entry) = ray_aabb_hit_t(ray, &mesh.aabb) else {
                continue;
            };
            if best.is_some_and(|b| entry > b) {
                continue;
            }
            if let Some(t) = mesh.intersect(ray)
                && best.is_none_or(|b| t < b)
            {
                best = Some(t);
            }
        }
        let geo = projection.inverse(ray.at(best?));
        geo.is_valid().then_some(geo)
    }
}

/// Appends the tiles whose projected bounds intersect the scene frustum.
/// A planar view crossing the antimeridian also tests each tile shifted by a
/// full turn either way.
pub fn visible_tiles(
    tiles: &[Arc<TerrainTile>],
    scene: &SceneModel,
    crosses_idl: bool,
    out: &mut Vec<Arc<TerrainTile>>,
) {
    let frustum = scene.frustum();
    let projection = scene.projection();
    let turn = 360.0 * PLANAR_METERS_PER_DEGREE;
    for tile in tiles {
        let aabb = tile.projected(projection).aabb;
        let mut visible = frustum.intersects_aabb(&aabb);
        if !visible && crosses_idl && !projection.is_3d() {
            visible = [turn, -turn]
                .iter()
                .any(|dx| frustum.intersects_aabb(&aabb.translated(Vec3::new(*dx, 0.0, 0.0))));
        }
        if visible {
            out.push(tile.clone());
        }
    }
}
