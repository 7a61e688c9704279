use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use foundation::math::{GeoPoint, wrap_longitude};
use renderer::{AsyncRenderable, EngineConfig, Graticule, MapView, RefreshCounter};
use scene::projection::Projection;
use scene::scene_model::{CameraParams, Viewport};
use serde::{Deserialize, Serialize};
use terrain::elevation::check_range;
use terrain::{ElevationError, GridTerrainSource, TerrainConfig, TerrainTileService};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless map view frame loop")]
struct Args {
    /// JSON config file (defaults to $MAPVIEW_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    lng: f64,

    /// Ground meters per pixel
    #[arg(long, default_value_t = 2_000.0)]
    resolution: f64,

    #[arg(long, default_value_t = 0.0)]
    tilt: f64,

    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    rotation: f64,

    /// Equirectangular map instead of the globe
    #[arg(long)]
    planar: bool,

    #[arg(long)]
    no_continuous_scroll: bool,

    /// Degrees of longitude to pan each frame
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    pan: f64,

    #[arg(long, default_value_t = 60)]
    frames: u32,

    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct ViewerConfig {
    width: f64,
    height: f64,
    engine: EngineConfig,
    terrain: TerrainConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 768.0,
            engine: EngineConfig::default(),
            terrain: TerrainConfig::default(),
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<ViewerConfig, String> {
    let path = args
        .config
        .clone()
        .or_else(|| env::var_os("MAPVIEW_CONFIG").map(PathBuf::from));
    let config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("read {}: {e}", path.display()))?;
            let config: ViewerConfig = serde_json::from_str(&text)
                .map_err(|e| format!("parse {}: {e}", path.display()))?;
            info!(path = %path.display(), "loaded config");
            config
        }
        None => ViewerConfig::default(),
    };
    config.engine.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// Rolling synthetic relief, a few kilometers high.
fn relief(latitude: f64, longitude: f64) -> Result<f64, ElevationError> {
    check_range(latitude, longitude)?;
    let (lat, lng) = (latitude.to_radians(), longitude.to_radians());
    Ok(2_000.0 * (lat * 6.0).sin() * (lng * 4.0).cos() + 500.0)
}

fn run(args: &Args) -> Result<(), String> {
    let config = load_config(args)?;
    let terrain_config = config.terrain.sanitized();
    let source = GridTerrainSource::new(Arc::new(relief), &terrain_config);
    let terrain = Arc::new(TerrainTileService::new(Arc::new(source), None, &terrain_config));

    let viewport = Viewport::new(config.width, config.height);
    let params = CameraParams {
        projection: if args.planar {
            Projection::Planar
        } else {
            Projection::Ellipsoid
        },
        viewport,
        focus: viewport.center(),
        resolution: args.resolution,
        rotation: args.rotation,
        tilt: args.tilt,
        center: GeoPoint::new(args.lat, args.lng),
        ..CameraParams::default()
    };

    let refresh = Arc::new(RefreshCounter::new());
    let mut map = MapView::new(params, !args.no_continuous_scroll).with_terrain(terrain.clone());
    map.add_layer(Box::new(AsyncRenderable::new(
        Graticule::default(),
        &config.engine,
        Some(refresh.clone()),
    )));

    let frame_time = Duration::from_millis(args.frame_ms);
    for i in 0..args.frames {
        let started = Instant::now();
        if i > 0 && args.pan != 0.0 {
            map.update_camera(|p| {
                p.center.longitude = wrap_longitude(p.center.longitude + args.pan);
            });
        }
        let frame = map.render();
        debug!(
            frame = i,
            version = frame.draw_version,
            tiles = frame.terrain_tiles().len(),
            lines = frame.polylines().count(),
            refreshes = refresh.take(),
            crosses_idl = map.view().crosses_idl(),
            "rendered"
        );
        if let Some(rest) = frame_time.checked_sub(started.elapsed()) {
            thread::sleep(rest);
        }
    }

    let c = map.view().viewport.center();
    match map.inverse_with_terrain(c.x, c.y) {
        Ok(geo) => info!(
            lat = geo.latitude,
            lng = geo.longitude,
            alt = geo.altitude,
            "screen center"
        ),
        Err(err) => warn!(%err, "screen center misses the surface"),
    }
    let bounds = map.view().bounds;
    info!(
        version = map.view().draw_version,
        north = bounds.north,
        west = bounds.west,
        south = bounds.south,
        east = bounds.east,
        crosses_idl = bounds.crosses_idl,
        terrain_version = terrain.terrain_version(),
        locked_tiles = terrain.locked_tiles().len(),
        resolved = map.is_resolved(),
        "done"
    );
    map.release();
    Ok(())
}
