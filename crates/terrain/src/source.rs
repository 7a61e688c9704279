use std::sync::Arc;

use foundation::handles::TileHandle;
use scene::view_state::ViewState;

use crate::tile::TerrainTile;

/// Provider of terrain tiles.
///
/// The tile service calls `collect` once per `lock` and owns the handle →
/// tile bookkeeping; a source only decides which tiles cover a view and
/// destroys tiles the service hands back.
pub trait TerrainSource: Send + Sync {
    /// Appends the tiles covering `view` to `out`.
    fn collect(&self, view: &ViewState, out: &mut Vec<Arc<TerrainTile>>);

    /// Bumped whenever the source publishes new or rebuilt tiles.
    fn version(&self) -> u64;

    /// Whether the source still reports `handle`. Tiles it no longer reports
    /// are disposed once nothing holds a lock on them.
    fn is_live(&self, handle: TileHandle) -> bool;

    /// Destroys a tile's native resources.
    fn dispose(&self, tile: &TerrainTile);

    /// Elevation data changed; existing tiles are stale.
    fn invalidate(&self) {}
}
