//! Quadtree terrain tiled over a latitude/longitude grid.
//!
//! Eight 90° root tiles (two rows of four) are always present. Each `collect`
//! refines toward a level picked from the view resolution; children that are
//! not built yet are queued, nearest to the view center first, and their
//! parent is emitted in their place until all visible siblings exist. A build
//! worker meshes queued tiles in budgeted batches off the render thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use foundation::bounds::GeoBounds;
use foundation::handles::TileHandle;
use foundation::math::{Mat4, Vec3, wrap_longitude};
use parking_lot::{Condvar, Mutex};
use runtime::budget::FrameBudget;
use runtime::work_queue::WorkQueue;
use scene::view_state::ViewState;
use tracing::{debug, trace, warn};

use crate::config::TerrainConfig;
use crate::elevation::ElevationSource;
use crate::mesh::TerrainMesh;
use crate::source::TerrainSource;
use crate::tile::TerrainTile;

pub const ROOT_COLUMNS: u32 = 4;
pub const ROOT_ROWS: u32 = 2;
pub const ROOT_SIZE_DEG: f64 = 90.0;

/// Web-mercator ground resolution at level 0, in meters per pixel.
const LEVEL0_RESOLUTION: f64 = 156_543.034;
/// Tiles are requested at this multiple of the view resolution.
const RESOLUTION_ADJUST: f64 = 32.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TileExtent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl TileExtent {
    pub fn of(handle: TileHandle) -> Self {
        let (level, x, y) = handle.address();
        let size = ROOT_SIZE_DEG / f64::from(1u32 << level.min(31));
        let west = -180.0 + f64::from(x) * size;
        let south = -90.0 + f64::from(y) * size;
        Self {
            west,
            south,
            east: west + size,
            north: south + size,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.south + self.north) * 0.5, (self.west + self.east) * 0.5)
    }

    pub fn intersects(&self, bounds: &GeoBounds) -> bool {
        bounds.intersects_rect(self.west, self.south, self.east, self.north)
    }
}

pub fn roots() -> impl Iterator<Item = TileHandle> {
    (0..ROOT_ROWS).flat_map(|y| (0..ROOT_COLUMNS).map(move |x| TileHandle::from_address(0, x, y)))
}

/// Children in south-west, south-east, north-west, north-east order.
pub fn children(handle: TileHandle) -> [TileHandle; 4] {
    let (level, x, y) = handle.address();
    let (l, x, y) = (level + 1, x * 2, y * 2);
    [
        TileHandle::from_address(l, x, y),
        TileHandle::from_address(l, x + 1, y),
        TileHandle::from_address(l, x, y + 1),
        TileHandle::from_address(l, x + 1, y + 1),
    ]
}

/// Quadtree level whose tiles suit a view at `resolution` meters per pixel.
pub fn level_for_resolution(resolution: f64, max_level: u8) -> u8 {
    if !(resolution.is_finite() && resolution > 0.0) {
        return 0;
    }
    // grid level 0 spans 90°, two web-mercator levels below the 360° root
    let level = (LEVEL0_RESOLUTION / (resolution * RESOLUTION_ADJUST)).log2().floor() - 2.0;
    level.clamp(0.0, f64::from(max_level)) as u8
}

/// Builds the mesh for one grid tile. Posts without elevation (errors,
/// non-finite values, or `sample == false`) are placed at zero height.
pub fn build_tile(
    handle: TileHandle,
    extent: TileExtent,
    config: &TerrainConfig,
    elevation: &dyn ElevationSource,
    sample: bool,
) -> TerrainTile {
    let n = config.posts_per_edge.max(2);
    let step_lat = (extent.north - extent.south) / (n - 1) as f64;
    let step_lng = (extent.east - extent.west) / (n - 1) as f64;

    let mut posts = Vec::with_capacity(n * n);
    for row in 0..n {
        let lat = extent.south + step_lat * row as f64;
        for col in 0..n {
            let lng = extent.west + step_lng * col as f64;
            let h = if sample {
                elevation
                    .elevation(lat, wrap_longitude(lng))
                    .ok()
                    .filter(|h| h.is_finite())
            } else {
                None
            };
            posts.push((lng, lat, h));
        }
    }

    let has_data = posts.iter().any(|p| p.2.is_some());
    let (min_h, max_h) = posts
        .iter()
        .map(|p| p.2.unwrap_or(0.0))
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), h| (lo.min(h), hi.max(h)));

    let (center_lat, center_lng) = extent.center();
    let origin = Vec3::new(center_lng, center_lat, (min_h + max_h) * 0.5);

    let mut vertices: Vec<Vec3> = posts
        .iter()
        .map(|&(lng, lat, h)| Vec3::new(lng, lat, h.unwrap_or(0.0)) - origin)
        .collect();

    let mut indices = Vec::with_capacity((n - 1) * (n - 1) * 6 + (n - 1) * 4 * 6);
    for row in 0..n - 1 {
        for col in 0..n - 1 {
            let i = (row * n + col) as u32;
            let up = i + n as u32;
            indices.extend_from_slice(&[i, i + 1, up, i + 1, up + 1, up]);
        }
    }
    let skirt_index_offset = indices.len();

    // perimeter loop: south edge west to east, east edge south to north,
    // north edge east to west, west edge north to south
    let mut edge: Vec<usize> = Vec::with_capacity(4 * (n - 1));
    edge.extend(0..n - 1);
    edge.extend((0..n - 1).map(|row| row * n + n - 1));
    edge.extend((1..n).rev().map(|col| (n - 1) * n + col));
    edge.extend((1..n).rev().map(|row| row * n));

    let skirt_base = vertices.len();
    for &e in &edge {
        let v = vertices[e];
        vertices.push(Vec3::new(v.x, v.y, v.z - config.skirt_height));
    }
    for k in 0..edge.len() {
        let next = (k + 1) % edge.len();
        let (a, b) = (edge[k] as u32, edge[next] as u32);
        let (sa, sb) = ((skirt_base + k) as u32, (skirt_base + next) as u32);
        indices.extend_from_slice(&[a, b, sa, b, sb, sa]);
    }

    TerrainTile::new(
        handle,
        Mat4::translation(origin),
        TerrainMesh::new(vertices, indices),
        skirt_index_offset,
        has_data,
    )
}

#[derive(Debug, Default)]
struct GridState {
    tiles: HashMap<TileHandle, Arc<TerrainTile>>,
    queue: WorkQueue<TileHandle, ()>,
    /// Popped from the queue and being meshed by the worker.
    building: HashSet<TileHandle>,
    reported: HashSet<TileHandle>,
    version: u64,
    /// Bumped by `invalidate`; batches started under an older generation
    /// are discarded.
    generation: u64,
    shutdown: bool,
}

impl GridState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.building.is_empty()
    }

    fn visit(
        &mut self,
        node: TileHandle,
        target: u8,
        view: &ViewState,
        out: &mut Vec<Arc<TerrainTile>>,
    ) {
        let extent = TileExtent::of(node);
        let (level, ..) = node.address();
        if level < target && extent.intersects(&view.bounds) {
            let visible: Vec<TileHandle> = children(node)
                .into_iter()
                .filter(|c| TileExtent::of(*c).intersects(&view.bounds))
                .collect();
            let mut ready = !visible.is_empty();
            for child in &visible {
                if self.tiles.contains_key(child) {
                    continue;
                }
                ready = false;
                if !self.building.contains(child) {
                    let priority = center_distance_sq(TileExtent::of(*child), view);
                    // unbounded queue
                    let _ = self.queue.push(*child, priority, 1, ());
                }
            }
            if ready {
                for child in visible {
                    self.visit(child, target, view, out);
                }
                return;
            }
        }
        if let Some(tile) = self.tiles.get(&node) {
            out.push(tile.clone());
            self.reported.insert(node);
        }
    }

    fn traverse(&mut self, view: &ViewState, max_level: u8, out: &mut Vec<Arc<TerrainTile>>) {
        let target = level_for_resolution(view.draw_map_resolution, max_level);
        self.reported.clear();
        for root in roots() {
            self.visit(root, target, view, out);
        }
    }

    /// Drops built tiles nobody references that the last traversal did not
    /// report.
    fn prune(&mut self, keep: usize) {
        if self.tiles.len() <= keep {
            return;
        }
        let reported = &self.reported;
        self.tiles.retain(|handle, tile| {
            handle.address().0 == 0 || reported.contains(handle) || Arc::strong_count(tile) > 1
        });
    }
}

struct GridShared {
    elevation: Arc<dyn ElevationSource>,
    config: TerrainConfig,
    state: Mutex<GridState>,
    work: Condvar,
    idle: Condvar,
}

impl GridShared {
    fn build(&self, handle: TileHandle) -> Arc<TerrainTile> {
        let (level, ..) = handle.address();
        // roots are flat placeholders
        let sample = level > 0;
        Arc::new(build_tile(
            handle,
            TileExtent::of(handle),
            &self.config,
            self.elevation.as_ref(),
            sample,
        ))
    }

    /// Pops the nearest queued tiles the batch budget covers.
    fn take_batch(&self, state: &mut GridState) -> (u64, Vec<TileHandle>) {
        let mut budget = FrameBudget::new(self.config.tile_builds_per_batch);
        let mut batch = Vec::new();
        while let Some((handle, ())) = state.queue.pop_next_with_budget(&mut budget) {
            state.building.insert(handle);
            batch.push(handle);
        }
        (state.generation, batch)
    }

    /// Meshes `batch` outside the lock and publishes it as one version.
    fn run_batch(&self, generation: u64, batch: Vec<TileHandle>) {
        let built: Vec<_> = batch.iter().map(|h| (*h, self.build(*h))).collect();
        let mut state = self.state.lock();
        for handle in &batch {
            state.building.remove(handle);
        }
        if state.generation != generation {
            trace!(count = built.len(), "discarding tiles built before invalidation");
        } else if !built.is_empty() {
            let count = built.len();
            state.tiles.extend(built);
            state.version += 1;
            debug!(
                built = count,
                queued = state.queue.len(),
                version = state.version,
                "built terrain tiles"
            );
        }
        if state.is_idle() {
            self.idle.notify_all();
        }
    }
}

fn build_loop(shared: Arc<GridShared>) {
    loop {
        let (generation, batch) = {
            let mut state = shared.state.lock();
            while !state.shutdown && state.queue.is_empty() {
                shared.work.wait(&mut state);
            }
            if state.shutdown {
                break;
            }
            shared.take_batch(&mut state)
        };
        shared.run_batch(generation, batch);
    }
    debug!("terrain build worker exiting");
}

/// Terrain source that meshes an `ElevationSource` on a background worker.
///
/// `collect` only walks the quadtree and queues missing tiles; the worker
/// publishes finished batches by bumping `version`, which the tile service
/// turns into a new terrain version.
pub struct GridTerrainSource {
    shared: Arc<GridShared>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for GridTerrainSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("GridTerrainSource")
            .field("tiles", &state.tiles.len())
            .field("queued", &state.queue.len())
            .field("building", &state.building.len())
            .field("version", &state.version)
            .finish()
    }
}

impl GridTerrainSource {
    pub fn new(elevation: Arc<dyn ElevationSource>, config: &TerrainConfig) -> Self {
        let shared = Arc::new(GridShared {
            elevation,
            config: config.sanitized(),
            state: Mutex::new(GridState::default()),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("terrain-grid-builder".into())
                .spawn(move || build_loop(shared))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%err, "failed to start terrain build worker; building on lock");
                None
            }
        };
        Self { shared, worker }
    }

    pub fn built_tiles(&self) -> usize {
        self.shared.state.lock().tiles.len()
    }

    pub fn queued_tiles(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Blocks until nothing is queued or being built. Returns `false` on
    /// timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }
}

impl Drop for GridTerrainSource {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.work.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!("terrain build worker panicked");
        }
    }
}

fn center_distance_sq(extent: TileExtent, view: &ViewState) -> f64 {
    let (lat, lng) = extent.center();
    let d_lat = lat - view.draw_lat;
    let d_lng = wrap_longitude(lng - view.draw_lng);
    d_lat * d_lat + d_lng * d_lng
}

impl TerrainSource for GridTerrainSource {
    fn collect(&self, view: &ViewState, out: &mut Vec<Arc<TerrainTile>>) {
        let shared = &self.shared;
        let mut state = shared.state.lock();
        if state.tiles.is_empty() {
            for root in roots() {
                let tile = shared.build(root);
                state.tiles.insert(root, tile);
            }
            state.version += 1;
        }

        let start = out.len();
        state.traverse(view, shared.config.max_level, out);

        let bounds = view.bounds;
        state.queue.retain(|h| TileExtent::of(*h).intersects(&bounds));
        state.prune(shared.config.max_tiles_per_lock * 4);
        let queued = state.queue.len();
        let inline = if queued == 0 {
            None
        } else if self.worker.is_some() {
            shared.work.notify_one();
            None
        } else {
            Some(shared.take_batch(&mut state))
        };
        drop(state);

        if let Some((generation, batch)) = inline {
            shared.run_batch(generation, batch);
        }
        trace!(reported = out.len() - start, queued, "collected terrain tiles");
    }

    fn version(&self) -> u64 {
        self.shared.state.lock().version
    }

    fn is_live(&self, handle: TileHandle) -> bool {
        self.shared.state.lock().reported.contains(&handle)
    }

    fn dispose(&self, tile: &TerrainTile) {
        let mut state = self.shared.state.lock();
        if tile.handle.address().0 == 0 || state.reported.contains(&tile.handle) {
            return;
        }
        if let Some(current) = state.tiles.get(&tile.handle)
            && std::ptr::eq(current.as_ref(), tile)
        {
            state.tiles.remove(&tile.handle);
            trace!(tile = %tile.handle, "disposed terrain tile");
        }
    }

    fn invalidate(&self) {
        let mut state = self.shared.state.lock();
        state.tiles.clear();
        state.reported.clear();
        state.queue = WorkQueue::new();
        state.generation += 1;
        state.version += 1;
        if state.is_idle() {
            self.shared.idle.notify_all();
        }
        debug!(version = state.version, "terrain grid invalidated");
    }
}
