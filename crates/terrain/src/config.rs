use serde::{Deserialize, Serialize};

/// Terrain tiling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    /// Elevation posts along each tile edge.
    pub posts_per_edge: usize,
    /// Depth of the skirt hanging off each tile edge, in meters.
    pub skirt_height: f64,
    /// Altitude vertical elevation rays start from, in meters.
    pub ray_start_altitude: f64,
    pub max_level: u8,
    pub max_tiles_per_lock: usize,
    /// Tiles the grid build worker meshes before publishing them as one
    /// source version.
    pub tile_builds_per_batch: u32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            posts_per_edge: 32,
            skirt_height: 500.0,
            ray_start_altitude: 30_000.0,
            max_level: 16,
            max_tiles_per_lock: 512,
            tile_builds_per_batch: 8,
        }
    }
}

impl TerrainConfig {
    /// Copy with values the tiler cannot work with raised to their minimum.
    pub fn sanitized(&self) -> Self {
        let mut c = self.clone();
        c.posts_per_edge = c.posts_per_edge.clamp(2, 256);
        if !(c.skirt_height.is_finite() && c.skirt_height >= 0.0) {
            c.skirt_height = 0.0;
        }
        if !c.ray_start_altitude.is_finite() {
            c.ray_start_altitude = Self::default().ray_start_altitude;
        }
        c.max_level = c.max_level.min(23);
        c.max_tiles_per_lock = c.max_tiles_per_lock.max(8);
        c.tile_builds_per_batch = c.tile_builds_per_batch.max(1);
        c
    }
}
