mod fallback;
mod raster;
mod render;
mod source;

use firesight_client::{ApiClient, DashboardPrefs, PrefsStore};
use firesight_common::config::Config;
use firesight_common::models::{CameraId, TimeRange};
use raster::RasterCanvas;
use source::{choose_camera, load_grid, CameraChoice};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let mut args = std::env::args().skip(1);
    let config_path = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let explicit_camera = match args.next().map(|a| a.parse::<CameraId>()).transpose() {
        Ok(id) => id,
        Err(e) => {
            error!(error = %e, "invalid camera id argument");
            std::process::exit(2);
        }
    };
    let explicit_range = match args.next().map(|a| a.parse::<TimeRange>()).transpose() {
        Ok(range) => range,
        Err(e) => {
            error!(error = %e, "invalid range argument");
            std::process::exit(2);
        }
    };

    info!(
        api_url = config.backend.api_url,
        width = config.heatmap.width,
        height = config.heatmap.height,
        output_dir = %config.heatmap.output_dir.display(),
        "starting firesight heatmap"
    );

    let prefs_store = match PrefsStore::open(&config.store.path) {
        Ok(store) => Some(store),
        Err(e) => {
            warn!(error = %e, "preferences unavailable, selection will not be remembered");
            None
        }
    };
    let prefs = prefs_store
        .as_ref()
        .and_then(|store| match store.load() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "failed to read preferences");
                None
            }
        })
        .unwrap_or_default();

    let api = match ApiClient::new(&config.backend) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "failed to build API client");
            std::process::exit(1);
        }
    };

    let range = explicit_range
        .or(prefs.last_range)
        .unwrap_or_else(|| configured_range(&config.heatmap.default_range));

    let cameras = if explicit_camera.is_some() {
        Vec::new()
    } else {
        api.cameras().await.unwrap_or_else(|e| {
            warn!(error = %e, "failed to fetch cameras");
            Vec::new()
        })
    };
    let choice = choose_camera(explicit_camera, prefs.last_camera, &cameras);
    let camera = choice.id();
    info!(camera_id = %camera, ?choice, range = range.as_str(), "camera selected");

    let dims = (config.heatmap.fallback_rows, config.heatmap.fallback_cols);
    let mut rng = rand::thread_rng();
    let loaded = match choice {
        CameraChoice::Placeholder => {
            info!("no cameras yet, rendering a generated heatmap");
            source::generated(dims, &mut rng)
        }
        _ => load_grid(&api, camera, range, dims, &mut rng).await,
    };

    let mut canvas = RasterCanvas::new(config.heatmap.width, config.heatmap.height);
    render::render(&loaded.grid, &mut canvas);

    let output = output_path(&config.heatmap.output_dir, camera, range);
    if let Err(e) = canvas.save_png(&output) {
        error!(path = %output.display(), error = %e, "failed to write heatmap");
        std::process::exit(1);
    }
    info!(
        path = %output.display(),
        source = loaded.source.as_str(),
        rows = loaded.grid.rows(),
        cols = loaded.grid.cols(),
        peak = loaded.grid.max_value().unwrap_or(0.0),
        "heatmap written"
    );

    if let (Some(store), false) = (&prefs_store, matches!(choice, CameraChoice::Placeholder)) {
        let remembered = DashboardPrefs {
            last_camera: Some(camera),
            last_range: Some(range),
            ..prefs
        };
        if let Err(e) = store.save(&remembered) {
            warn!(error = %e, "failed to remember heatmap selection");
        }
    }
}

fn configured_range(value: &str) -> TimeRange {
    value.parse().unwrap_or_else(|e| {
        warn!(error = %e, "bad heatmap.default_range, using 24h");
        TimeRange::default()
    })
}

fn output_path(dir: &Path, camera: CameraId, range: TimeRange) -> PathBuf {
    dir.join(format!("heatmap_cam{camera}_{range}.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_file_name() {
        assert_eq!(
            output_path(Path::new("out"), CameraId(3), TimeRange::Week),
            PathBuf::from("out/heatmap_cam3_7d.png")
        );
    }

    #[test]
    fn configured_range_falls_back_to_a_day() {
        assert_eq!(configured_range("6h"), TimeRange::SixHours);
        assert_eq!(configured_range("fortnight"), TimeRange::Day);
    }
}
