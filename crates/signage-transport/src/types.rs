//! Request/response payloads for the CMS protocol (spec.md §4.1 table).

use serde::{Deserialize, Serialize};
use signage_core::DisplaySettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RegisterCode {
    Ready,
    Waiting,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub hardware_key: String,
    pub client_type: String,
    pub client_version: String,
    pub screen_size_x: u32,
    pub screen_size_y: u32,
    pub xmr_channel: Option<String>,
    pub public_key_pem: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    pub code: RegisterCode,
    pub message: String,
    #[serde(default)]
    pub settings: DisplaySettings,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub display_attrs: serde_json::Value,
    pub sync_config: Option<serde_json::Value>,
    /// Present only under v2 (token) auth.
    pub auth_token: Option<String>,
    pub auth_token_expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredFileEntry {
    pub kind: signage_core::FileKind,
    pub id: signage_core::FileId,
    pub size: u64,
    pub md5: Option<String>,
    pub content_type: String,
    pub download_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequiredFilesResponse {
    pub files: Vec<RequiredFileEntry>,
    #[serde(default)]
    pub purge: Vec<signage_core::ContentKey>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: serde_json::Value,
    pub free_disk_bytes: u64,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProofOfPlayRecord {
    pub schedule_id: u64,
    pub layout_id: u64,
    pub widget_id: Option<u64>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: signage_core::LogLevel,
    pub component: String,
    pub message: String,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherResponse {
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaultReport {
    pub code: String,
    pub message: String,
    pub at: chrono::DateTime<chrono::Utc>,
}
