//! JSON shapes exchanged with the backend REST API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Cameras
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub i64);

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CameraId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(CameraId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub id: CameraId,
    pub name: String,
    #[serde(default)]
    pub rtsp_url: String,
    #[serde(default = "default_camera_status")]
    pub status: CameraStatus,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCamera {
    pub name: String,
    pub rtsp_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Partial update for `PUT /cameras/{id}`; unset fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CameraUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtsp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CameraStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

fn default_camera_status() -> CameraStatus {
    CameraStatus::Inactive
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub camera_id: CameraId,
    pub category: String,
    pub severity: Severity,
    pub confidence: f64,
    pub detected_at: String,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    #[serde(default)]
    pub clip_path: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Query filters for `GET /incidents`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_id: Option<CameraId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Body of `POST /share/{incident_id}`.
#[derive(Debug, Clone, Serialize)]
pub struct ShareRequest {
    pub expiry_days: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Default for ShareRequest {
    fn default() -> Self {
        Self {
            expiry_days: 7,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ShareLink {
    pub share_token: String,
    pub share_url: String,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub password_protected: bool,
}

/// Token-scoped incident view returned by `GET /share/{token}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SharedIncident {
    pub incident_id: i64,
    #[serde(default)]
    pub clip_path: Option<String>,
    #[serde(default)]
    pub thumbnail_path: Option<String>,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub password_protected: bool,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// `GET /health`. `Default` is the zeroed placeholder shown when the backend
/// cannot be reached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthStatus {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub gpu_utilization: f64,
    pub gpu_memory_percent: f64,
    pub uptime_seconds: f64,
    pub active_streams: u32,
    pub inference_fps: f64,
    pub db_connections: u32,
    pub redis_connected: bool,
    pub minio_connected: bool,
}

// ---------------------------------------------------------------------------
// Heatmap
// ---------------------------------------------------------------------------

/// Aggregation window for heatmap and report queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    #[default]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl TimeRange {
    pub const ALL: [TimeRange; 5] = [
        TimeRange::Hour,
        TimeRange::SixHours,
        TimeRange::Day,
        TimeRange::Week,
        TimeRange::Month,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
            TimeRange::Month => "30d",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = UnknownTimeRange;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim())
            .ok_or_else(|| UnknownTimeRange(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown time range {0:?}, expected one of 1h, 6h, 24h, 7d, 30d")]
pub struct UnknownTimeRange(pub String);

/// `GET /heatmap/{camera_id}?range=`. A missing or null `grid` means the
/// backend has no data yet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeatmapResponse {
    #[serde(default)]
    pub grid: Option<Vec<Vec<f64>>>,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    #[serde(rename = "type")]
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReportTicket {
    #[serde(deserialize_with = "string_or_number")]
    pub report_id: String,
    pub download_url: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }
    Ok(match Repr::deserialize(deserializer)? {
        Repr::Number(n) => n.to_string(),
        Repr::Text(s) => s,
    })
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub detection: DetectionSettings,
    pub alerts: AlertSettings,
    pub storage: StorageSettings,
    pub general: GeneralSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    pub confidence_threshold: f64,
    pub categories: CategoryToggles,
    pub model_variant: String,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            categories: CategoryToggles::default(),
            model_variant: "yolov8n".into(),
        }
    }
}

/// One flag per detection category the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryToggles {
    pub human: bool,
    pub vehicle: bool,
    pub fire: bool,
    pub smoke: bool,
    pub bicycle: bool,
    pub plant: bool,
    pub ppe: bool,
    pub accident: bool,
    pub intrusion: bool,
    pub fall: bool,
}

impl Default for CategoryToggles {
    fn default() -> Self {
        Self {
            human: true,
            vehicle: true,
            fire: true,
            smoke: true,
            bicycle: true,
            plant: true,
            ppe: true,
            accident: true,
            intrusion: true,
            fall: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub email_enabled: bool,
    pub slack_enabled: bool,
    pub teams_enabled: bool,
    pub webhook_enabled: bool,
    pub slack_webhook_url: String,
    pub teams_webhook_url: String,
    pub webhook_url: String,
    pub email_recipients: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertChannel {
    Email,
    Slack,
    Teams,
    Webhook,
}

impl AlertChannel {
    pub const ALL: [AlertChannel; 4] = [
        AlertChannel::Email,
        AlertChannel::Slack,
        AlertChannel::Teams,
        AlertChannel::Webhook,
    ];
}

impl AlertSettings {
    pub fn is_enabled(&self, channel: AlertChannel) -> bool {
        match channel {
            AlertChannel::Email => self.email_enabled,
            AlertChannel::Slack => self.slack_enabled,
            AlertChannel::Teams => self.teams_enabled,
            AlertChannel::Webhook => self.webhook_enabled,
        }
    }

    pub fn set_enabled(&mut self, channel: AlertChannel, enabled: bool) {
        let flag = match channel {
            AlertChannel::Email => &mut self.email_enabled,
            AlertChannel::Slack => &mut self.slack_enabled,
            AlertChannel::Teams => &mut self.teams_enabled,
            AlertChannel::Webhook => &mut self.webhook_enabled,
        };
        *flag = enabled;
    }

    pub fn enabled_channels(&self) -> Vec<AlertChannel> {
        AlertChannel::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub retention_days: u32,
    pub clip_duration: u32,
    pub max_storage_gb: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            clip_duration: 10,
            max_storage_gb: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    pub site_name: String,
    pub timezone: String,
    pub dark_mode: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            site_name: "FireSight".into(),
            timezone: "UTC".into(),
            dark_mode: true,
        }
    }
}
