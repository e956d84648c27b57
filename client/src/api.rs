use std::time::Duration;

use firesight_common::config::BackendConfig;
use firesight_common::models::{
    Camera, CameraId, CameraUpdate, HealthStatus, HeatmapResponse, Incident, IncidentFilter,
    NewCamera, ReportRequest, ReportTicket, Settings, ShareLink, ShareRequest, SharedIncident,
    TimeRange,
};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("failed to build HTTP client: {0}")]
    Build(reqwest::Error),
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        source: reqwest::Error,
    },
    #[error("{path} returned HTTP {status}: {detail}")]
    Status {
        path: String,
        status: u16,
        detail: String,
    },
    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        source: reqwest::Error,
    },
}

impl ApiError {
    /// HTTP status for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// FastAPI error body: `{"detail": "..."}` (or a validation error list).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Client for the backend REST surface.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        Self::with_base_url(&config.api_url, config.request_timeout())
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(ApiError::Build)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for an endpoint path. The backend routes every collection and
    /// item with a trailing slash, so one is added when missing.
    fn endpoint(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if path.ends_with('/') {
            format!("{}/{path}", self.base_url)
        } else {
            format!("{}/{path}/", self.base_url)
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.endpoint(path))
    }

    async fn send(&self, path: &str, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|source| ApiError::Request {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(path, status = status.as_u16(), "backend request ok");
            return Ok(response);
        }

        let detail = match response.json::<ErrorBody>().await {
            Ok(ErrorBody {
                detail: Some(serde_json::Value::String(s)),
            }) => s,
            Ok(ErrorBody {
                detail: Some(other),
            }) => other.to_string(),
            _ => format!("API Error: {}", status.as_u16()),
        };
        Err(ApiError::Status {
            path: path.to_string(),
            status: status.as_u16(),
            detail,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        self.send(path, request)
            .await?
            .json()
            .await
            .map_err(|source| ApiError::Decode {
                path: path.to_string(),
                source,
            })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send_json(path, self.request(Method::GET, path)).await
    }

    async fn with_body<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send_json(path, self.request(method, path).json(body))
            .await
    }

    // -- Cameras ----------------------------------------------------------------

    pub async fn cameras(&self) -> Result<Vec<Camera>, ApiError> {
        self.get("/cameras").await
    }

    pub async fn camera(&self, id: CameraId) -> Result<Camera, ApiError> {
        self.get(&format!("/cameras/{id}")).await
    }

    pub async fn create_camera(&self, camera: &NewCamera) -> Result<Camera, ApiError> {
        self.with_body(Method::POST, "/cameras", camera).await
    }

    pub async fn update_camera(&self, id: CameraId, update: &CameraUpdate) -> Result<Camera, ApiError> {
        self.with_body(Method::PUT, &format!("/cameras/{id}"), update)
            .await
    }

    /// The response body, if any, is ignored.
    pub async fn delete_camera(&self, id: CameraId) -> Result<(), ApiError> {
        let path = format!("/cameras/{id}");
        self.send(&path, self.request(Method::DELETE, &path))
            .await
            .map(|_| ())
    }

    // -- Incidents --------------------------------------------------------------

    pub async fn incidents(&self, filter: &IncidentFilter) -> Result<Vec<Incident>, ApiError> {
        let path = "/incidents";
        self.send_json(path, self.request(Method::GET, path).query(filter))
            .await
    }

    pub async fn incident(&self, id: i64) -> Result<Incident, ApiError> {
        self.get(&format!("/incidents/{id}")).await
    }

    pub async fn search(&self, query: &str) -> Result<serde_json::Value, ApiError> {
        let path = "/search";
        self.send_json(path, self.request(Method::GET, path).query(&[("q", query)]))
            .await
    }

    // -- Health -----------------------------------------------------------------

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get("/health").await
    }

    /// Health stats, or zeroed stats when the backend cannot be reached.
    pub async fn health_or_default(&self) -> HealthStatus {
        match self.health().await {
            Ok(health) => health,
            Err(e) => {
                warn!(error = %e, "failed to load health stats, showing defaults");
                HealthStatus::default()
            }
        }
    }

    // -- Heatmap ----------------------------------------------------------------

    pub async fn heatmap(&self, camera: CameraId, range: TimeRange) -> Result<HeatmapResponse, ApiError> {
        let path = format!("/heatmap/{camera}");
        self.send_json(
            &path,
            self.request(Method::GET, &path)
                .query(&[("range", range.as_str())]),
        )
        .await
    }

    // -- Settings ---------------------------------------------------------------

    pub async fn settings(&self) -> Result<Settings, ApiError> {
        self.get("/settings").await
    }

    pub async fn update_settings(&self, settings: &Settings) -> Result<Settings, ApiError> {
        self.with_body(Method::PUT, "/settings", settings).await
    }

    // -- Reports ----------------------------------------------------------------

    pub async fn generate_report(&self, request: &ReportRequest) -> Result<ReportTicket, ApiError> {
        self.with_body(Method::POST, "/reports/generate", request)
            .await
    }

    // -- Sharing ----------------------------------------------------------------

    pub async fn create_share_link(
        &self,
        incident_id: i64,
        request: &ShareRequest,
    ) -> Result<ShareLink, ApiError> {
        self.with_body(Method::POST, &format!("/share/{incident_id}"), request)
            .await
    }

    /// Public, token-scoped incident view.
    pub async fn shared_incident(&self, token: &str) -> Result<SharedIncident, ApiError> {
        self.get(&format!("/share/{token}")).await
    }
}
