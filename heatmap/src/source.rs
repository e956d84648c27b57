use firesight_client::ApiClient;
use firesight_common::grid::ActivityGrid;
use firesight_common::models::{Camera, CameraId, TimeRange};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::fallback::generate_fallback_grid;

/// Id used for output naming when no camera exists yet.
pub const PLACEHOLDER_CAMERA: CameraId = CameraId(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSource {
    Backend,
    Fallback,
}

impl GridSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridSource::Backend => "backend",
            GridSource::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGrid {
    pub grid: ActivityGrid,
    pub source: GridSource,
}

/// How the camera to render was picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraChoice {
    Explicit(CameraId),
    Remembered(CameraId),
    First(CameraId),
    Placeholder,
}

impl CameraChoice {
    pub fn id(&self) -> CameraId {
        match *self {
            CameraChoice::Explicit(id) | CameraChoice::Remembered(id) | CameraChoice::First(id) => id,
            CameraChoice::Placeholder => PLACEHOLDER_CAMERA,
        }
    }
}

/// Pick the camera to render: the one asked for, else the remembered one if
/// it still exists, else the first known camera.
pub fn choose_camera(explicit: Option<CameraId>, remembered: Option<CameraId>, cameras: &[Camera]) -> CameraChoice {
    if let Some(id) = explicit {
        return CameraChoice::Explicit(id);
    }
    if let Some(id) = remembered {
        // An empty list means the backend was unreachable, not that the camera is gone.
        if cameras.is_empty() || cameras.iter().any(|c| c.id == id) {
            return CameraChoice::Remembered(id);
        }
        debug!(camera_id = %id, "remembered camera no longer exists");
    }
    match cameras.first() {
        Some(camera) => CameraChoice::First(camera.id),
        None => CameraChoice::Placeholder,
    }
}

/// Fetch the activity grid of `camera`, or a synthetic one when the backend
/// fails or has nothing usable.
pub async fn load_grid(
    client: &ApiClient,
    camera: CameraId,
    range: TimeRange,
    (rows, cols): (usize, usize),
    rng: &mut impl Rng,
) -> LoadedGrid {
    let reason = match client.heatmap(camera, range).await {
        Ok(response) => match response.grid.map(ActivityGrid::from_rows) {
            Some(Ok(grid)) if !grid.is_empty() => {
                info!(
                    camera_id = %camera,
                    range = range.as_str(),
                    rows = grid.rows(),
                    cols = grid.cols(),
                    "loaded heatmap"
                );
                return LoadedGrid {
                    grid,
                    source: GridSource::Backend,
                };
            }
            Some(Ok(_)) => "backend grid is empty".to_string(),
            Some(Err(e)) => e.to_string(),
            None => "backend returned no grid".to_string(),
        },
        Err(e) => e.to_string(),
    };

    warn!(camera_id = %camera, range = range.as_str(), reason = %reason, "using generated heatmap");
    generated((rows, cols), rng)
}

/// A synthetic `rows`×`cols` grid, for when there is no backend grid to show.
pub fn generated((rows, cols): (usize, usize), rng: &mut impl Rng) -> LoadedGrid {
    LoadedGrid {
        grid: generate_fallback_grid(rows, cols, rng),
        source: GridSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use firesight_common::models::CameraStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::time::Duration;

    fn camera(id: i64) -> Camera {
        Camera {
            id: CameraId(id),
            name: format!("cam {id}"),
            rtsp_url: String::new(),
            status: CameraStatus::Active,
            location: None,
            created_at: None,
        }
    }

    async fn heatmap_handler(Path(id): Path<i64>) -> axum::response::Response {
        match id {
            1 => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"detail": "no data"}))).into_response(),
            2 => Json(json!({"grid": [[0.1, 0.9], [0.5, 0.0]]})).into_response(),
            3 => Json(json!({"grid": [[0.1, 0.9], [0.5]]})).into_response(),
            4 => Json(json!({"grid": []})).into_response(),
            _ => Json(json!({})).into_response(),
        }
    }

    async fn client() -> ApiClient {
        let app = Router::new().route("/heatmap/:id/", get(heatmap_handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        ApiClient::with_base_url(&format!("http://{addr}"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn backend_grid_is_used_when_available() {
        let client = client().await;
        let loaded = load_grid(&client, CameraId(2), TimeRange::Day, (20, 30), &mut StdRng::seed_from_u64(0)).await;
        assert_eq!(loaded.source, GridSource::Backend);
        assert_eq!(loaded.grid.rows(), 2);
        assert_eq!(loaded.grid.get(0, 1), Some(0.9));
    }

    #[tokio::test]
    async fn failures_fall_back_to_generated_grid() {
        let client = client().await;
        for id in [1, 3, 4, 5] {
            let loaded = load_grid(&client, CameraId(id), TimeRange::Hour, (20, 30), &mut StdRng::seed_from_u64(9)).await;
            assert_eq!(loaded.source, GridSource::Fallback, "camera {id}");
            assert_eq!((loaded.grid.rows(), loaded.grid.cols()), (20, 30));
        }
    }

    #[tokio::test]
    async fn unreachable_backend_falls_back() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = ApiClient::with_base_url(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();

        let loaded = load_grid(&client, CameraId(1), TimeRange::Week, (4, 6), &mut StdRng::seed_from_u64(3)).await;
        assert_eq!(loaded.source, GridSource::Fallback);
        assert_eq!((loaded.grid.rows(), loaded.grid.cols()), (4, 6));
    }

    #[test]
    fn generated_grid_uses_configured_dimensions() {
        let loaded = generated((12, 16), &mut StdRng::seed_from_u64(5));
        assert_eq!(loaded.source, GridSource::Fallback);
        assert_eq!((loaded.grid.rows(), loaded.grid.cols()), (12, 16));
    }

    #[test]
    fn camera_choice_order() {
        let cameras = vec![camera(3), camera(5)];
        assert_eq!(choose_camera(Some(CameraId(9)), Some(CameraId(5)), &cameras), CameraChoice::Explicit(CameraId(9)));
        assert_eq!(choose_camera(None, Some(CameraId(5)), &cameras), CameraChoice::Remembered(CameraId(5)));
        assert_eq!(choose_camera(None, Some(CameraId(7)), &cameras), CameraChoice::First(CameraId(3)));
        assert_eq!(choose_camera(None, None, &cameras), CameraChoice::First(CameraId(3)));
        assert_eq!(choose_camera(None, Some(CameraId(7)), &[]), CameraChoice::Remembered(CameraId(7)));
        let none = choose_camera(None, None, &[]);
        assert_eq!(none, CameraChoice::Placeholder);
        assert_eq!(none.id(), PLACEHOLDER_CAMERA);
    }
}
