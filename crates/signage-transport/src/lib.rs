//! Versioned REST client speaking to the digital-signage CMS (spec.md §4.1).

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod etag_cache;
pub mod retry;
pub mod types;

pub use auth::{AuthMode, TokenState};
pub use client::CmsClient;
pub use config::TransportConfig;
pub use error::{Result, TransportError};
pub use etag_cache::EtagCache;
pub use retry::RetryConfig;
pub use types::{
    FaultReport, LogRecord, ProofOfPlayRecord, RegisterCode, RegisterRequest, RegisterResponse,
    RequiredFileEntry, RequiredFilesResponse, StatusReport, WeatherResponse,
};
