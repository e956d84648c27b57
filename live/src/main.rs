mod consumer;
mod meter;
mod snapshot;
mod tile;
mod transport;

use firesight_client::{ApiClient, PrefsStore};
use firesight_common::config::Config;
use firesight_common::models::{Camera, CameraId};
use snapshot::SnapshotSink;
use std::path::PathBuf;
use tile::{spawn_tile, TileCommand, TileHandle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use transport::WsConnector;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
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

    info!(
        api_url = config.backend.api_url,
        ws_url = config.backend.ws_url,
        stream_path = config.stream.path,
        keepalive_secs = config.stream.keepalive_secs,
        "starting firesight live view"
    );

    let prefs = match PrefsStore::open(&config.store.path) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "failed to open preferences store");
            std::process::exit(1);
        }
    };

    let api = match ApiClient::new(&config.backend) {
        Ok(a) => a,
        Err(e) => {
            error!(error = %e, "failed to build API client");
            std::process::exit(1);
        }
    };

    let cameras: Vec<Camera> = match api.cameras().await {
        Ok(c) => c,
        Err(e) => {
            warn!(error = %e, "failed to fetch cameras, continuing with none");
            Vec::new()
        }
    };

    let onboarded = match prefs.load() {
        Ok(p) => p.onboarding_complete,
        Err(e) => {
            warn!(error = %e, "failed to read preferences");
            false
        }
    };
    if cameras.is_empty() {
        if !onboarded {
            info!("no cameras configured yet, add one through the backend API and start again");
            return;
        }
        warn!("no cameras available");
    } else if !onboarded {
        if let Err(e) = prefs.update(|p| p.onboarding_complete = true) {
            warn!(error = %e, "failed to persist onboarding state");
        }
        info!(cameras = cameras.len(), "onboarding complete");
    }

    let snapshots = match &config.stream.snapshot_dir {
        Some(dir) => match SnapshotSink::create(dir).await {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(error = %e, "snapshots disabled");
                None
            }
        },
        None => None,
    };

    let connector = WsConnector::new(&config.backend.ws_url, &config.stream);
    let mut tiles: Vec<TileHandle> = cameras
        .iter()
        .map(|camera| {
            info!(camera_id = %camera.id, name = camera.name, "starting tile");
            spawn_tile(connector.clone(), camera.id, snapshots.clone())
        })
        .collect();

    run_console(&mut tiles).await;

    info!("shutting down");
    for tile in tiles {
        tile.shutdown().await;
    }
}

enum ConsoleCommand {
    Status,
    Tile(CameraId, TileCommand),
    Quit,
}

fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let mut camera = || -> Result<CameraId, String> {
        let word = words.next().ok_or_else(|| format!("`{verb}` needs a camera id"))?;
        word.parse::<CameraId>()
            .map_err(|e| format!("bad camera id `{word}`: {e}"))
    };
    match verb {
        "status" => Ok(ConsoleCommand::Status),
        "quit" | "exit" => Ok(ConsoleCommand::Quit),
        "reconnect" => Ok(ConsoleCommand::Tile(camera()?, TileCommand::Reconnect)),
        "close" => Ok(ConsoleCommand::Tile(camera()?, TileCommand::Close)),
        "switch" => {
            let id = camera()?;
            let next = camera()?;
            Ok(ConsoleCommand::Tile(id, TileCommand::Switch(next)))
        }
        other => Err(format!(
            "unknown command `{other}` (status, reconnect <id>, switch <id> <new_id>, close <id>, quit)"
        )),
    }
}

/// Read operator commands from stdin until `quit` or end of input.
async fn run_console(tiles: &mut Vec<TileHandle>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "failed to read console input");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Ok(ConsoleCommand::Quit) => return,
            Ok(ConsoleCommand::Status) => {
                for tile in tiles.iter() {
                    let s = tile.status();
                    info!(
                        camera_id = %s.camera_id,
                        state = s.state.as_str(),
                        detections = s.detection_count,
                        fps = s.fps,
                        measured_fps = s.measured_fps,
                        frames = s.frames_received,
                        frame_bytes = s.last_frame_bytes,
                        "tile status"
                    );
                }
            }
            Ok(ConsoleCommand::Tile(id, command)) => {
                let Some(index) = tiles.iter().position(|t| t.status().camera_id == id) else {
                    warn!(camera_id = %id, "no tile is showing this camera");
                    continue;
                };
                if command == TileCommand::Close {
                    tiles.remove(index).shutdown().await;
                    info!(camera_id = %id, "tile closed");
                } else if !tiles[index].send(command).await {
                    warn!(camera_id = %id, "tile is no longer running");
                }
            }
            Err(msg) => warn!("{msg}"),
        }
    }
}
