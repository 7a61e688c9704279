pub mod config;
pub mod elevation;
pub mod grid;
pub mod mesh;
pub mod service;
pub mod source;
pub mod tile;

pub use config::TerrainConfig;
pub use elevation::{ElevationError, ElevationSource, FlatElevation};
pub use grid::GridTerrainSource;
pub use mesh::TerrainMesh;
pub use service::{TerrainTileService, TileLock};
pub use source::TerrainSource;
pub use tile::{ProjectedMesh, TerrainTile};
