//! CMS REST client (spec.md §4.1).

use crate::auth::{AuthMode, TokenState};
use crate::config::TransportConfig;
use crate::error::{Result, TransportError};
use crate::etag_cache::EtagCache;
use crate::retry::retry_async;
use crate::types::{
    FaultReport, LogRecord, ProofOfPlayRecord, RegisterCode, RegisterRequest, RegisterResponse,
    RequiredFilesResponse, StatusReport, WeatherResponse,
};
use chrono::Utc;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Mutex;
use tracing::{info, instrument, warn};

/// A collection of remote procedures over HTTPS to a single CMS base URL
/// (spec.md §4.1). Every call carries `serverKey`, `hardwareKey`, and `v`.
pub struct CmsClient {
    http: Client,
    config: TransportConfig,
    auth: Mutex<AuthMode>,
    etags: EtagCache,
}

impl CmsClient {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            config,
            auth: Mutex::new(AuthMode::SharedKey),
            etags: EtagCache::new(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Applies the v1 shared-key fields or the v2 bearer token, whichever
    /// auth mode is active (spec.md §4.1, "Authentication").
    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let auth = self.auth.lock().unwrap_or_else(|e| e.into_inner());
        let builder = builder
            .query(&[
                ("serverKey", self.config.server_key.as_str()),
                ("hardwareKey", self.config.hardware_key.as_str()),
                ("v", &self.config.schema_version.to_string()),
            ]);
        match &*auth {
            AuthMode::SharedKey => builder,
            AuthMode::Token(state) => builder.bearer_auth(&state.token),
        }
    }

    /// Refreshes the bearer token proactively if 80% of its lifetime has
    /// elapsed, before the token actually expires.
    fn maybe_refresh_needed(&self) -> bool {
        let auth = self.auth.lock().unwrap_or_else(|e| e.into_inner());
        matches!(&*auth, AuthMode::Token(state) if state.needs_refresh(Utc::now()))
    }

    fn set_token(&self, state: TokenState) {
        let mut auth = self.auth.lock().unwrap_or_else(|e| e.into_inner());
        *auth = AuthMode::Token(state);
    }

    async fn send_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Option<&Req>,
    ) -> Result<Resp> {
        retry_async(
            &self.config.retry,
            operation,
            TransportError::should_retry,
            || async {
                let mut builder = self.apply_auth(self.http.request(method.clone(), self.endpoint(path)));
                if let Some(body) = body {
                    builder = builder.json(body);
                }
                let response = builder.send().await?;
                self.handle_response(response).await
            },
        )
        .await
    }

    async fn handle_response<Resp: DeserializeOwned>(&self, response: reqwest::Response) -> Result<Resp> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransportError::Auth(status));
        }
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status));
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))
    }

    /// `register` (spec.md §4.1 table). A failed register aborts the whole
    /// collection cycle (spec.md §7): nothing downstream is authorised.
    #[instrument(skip(self, request))]
    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse> {
        let response: RegisterResponse = self
            .send_json("register", reqwest::Method::POST, "register", Some(request))
            .await?;

        if let (Some(token), Some(expires_in)) = (&response.auth_token, response.auth_token_expires_in) {
            self.set_token(TokenState::new(token.clone(), Utc::now(), expires_in));
            info!("switched to v2 token auth after register");
        }

        match response.code {
            RegisterCode::Error => Err(TransportError::Protocol(response.message.clone())),
            RegisterCode::Ready | RegisterCode::Waiting => Ok(response),
        }
    }

    /// Refreshes the v2 bearer token if needed. No-op under v1 shared-key
    /// auth. Callers invoke this before starting a collection cycle.
    #[instrument(skip(self, request))]
    pub async fn refresh_token_if_needed(&self, request: &RegisterRequest) -> Result<()> {
        if self.maybe_refresh_needed() {
            info!("proactively refreshing auth token at 80% of lifetime");
            self.register(request).await?;
        }
        Ok(())
    }

    /// `requiredFiles`, ETag-cached (spec.md §4.1/§4.2).
    #[instrument(skip(self))]
    pub async fn required_files(&self) -> Result<RequiredFilesResponse> {
        self.get_cached("requiredFiles", "requiredFiles").await
    }

    /// `schedule`, ETag-cached. Returned as a raw JSON value here; the
    /// resolver crate owns parsing it into its schedule model.
    #[instrument(skip(self))]
    pub async fn schedule(&self) -> Result<serde_json::Value> {
        self.get_cached("schedule", "schedule").await
    }

    async fn get_cached<Resp: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
    ) -> Result<Resp> {
        retry_async(
            &self.config.retry,
            operation,
            TransportError::should_retry,
            || async {
                let mut builder = self.apply_auth(self.http.get(self.endpoint(path)));
                if let Some(etag) = self.etags.etag_for(operation) {
                    builder = builder.header(header::IF_NONE_MATCH, etag);
                }
                let response = builder.send().await?;

                if response.status() == StatusCode::NOT_MODIFIED {
                    let cached = self
                        .etags
                        .cached_body(operation)
                        .ok_or_else(|| TransportError::Protocol("304 with no cached body".into()))?;
                    return serde_json::from_value(cached)
                        .map_err(|e| TransportError::Protocol(e.to_string()));
                }

                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN
                {
                    return Err(TransportError::Auth(response.status()));
                }
                if !response.status().is_success() {
                    return Err(TransportError::HttpStatus(response.status()));
                }

                let etag = response
                    .headers()
                    .get(header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| TransportError::Protocol(e.to_string()))?;
                if let Some(etag) = etag {
                    self.etags.store(operation, etag, body.clone());
                }
                serde_json::from_value(body).map_err(|e| TransportError::Protocol(e.to_string()))
            },
        )
        .await
    }

    /// `getResource(layoutId, regionId, mediaId)` — opaque widget bytes.
    #[instrument(skip(self))]
    pub async fn get_resource(&self, layout_id: u64, region_id: u64, media_id: u64) -> Result<Vec<u8>> {
        retry_async(
            &self.config.retry,
            "getResource",
            TransportError::should_retry,
            || async {
                let path = format!("resource/{layout_id}/{region_id}/{media_id}");
                let builder = self.apply_auth(self.http.get(self.endpoint(&path)));
                let response = builder.send().await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(TransportError::HttpStatus(StatusCode::NOT_FOUND));
                }
                if !response.status().is_success() {
                    return Err(TransportError::HttpStatus(response.status()));
                }
                Ok(response.bytes().await?.to_vec())
            },
        )
        .await
    }

    #[instrument(skip(self, report))]
    pub async fn notify_status(&self, report: &StatusReport) -> Result<()> {
        let _: serde_json::Value = self
            .send_json("notifyStatus", reqwest::Method::POST, "notifyStatus", Some(report))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, inventory))]
    pub async fn media_inventory(&self, inventory: &serde_json::Value) -> Result<()> {
        let _: serde_json::Value = self
            .send_json("mediaInventory", reqwest::Method::POST, "mediaInventory", Some(inventory))
            .await?;
        Ok(())
    }

    /// `submitStats` — batch of proof-of-play records (spec.md §5 default
    /// batch size 50, enforced by the caller in `signage-player`).
    #[instrument(skip(self, batch))]
    pub async fn submit_stats(&self, batch: &[ProofOfPlayRecord]) -> Result<()> {
        let _: serde_json::Value = self
            .send_json("submitStats", reqwest::Method::POST, "submitStats", Some(&batch))
            .await?;
        Ok(())
    }

    /// `submitLog` — batch of log records (spec.md §5 default batch 100).
    #[instrument(skip(self, batch))]
    pub async fn submit_log(&self, batch: &[LogRecord]) -> Result<()> {
        let _: serde_json::Value = self
            .send_json("submitLog", reqwest::Method::POST, "submitLog", Some(&batch))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, base64_image))]
    pub async fn submit_screenshot(&self, base64_image: &str) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(
                "submitScreenshot",
                reqwest::Method::POST,
                "submitScreenshot",
                Some(&serde_json::json!({ "image": base64_image })),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self, faults))]
    pub async fn report_faults(&self, faults: &[FaultReport]) -> Result<()> {
        let _: serde_json::Value = self
            .send_json("reportFaults", reqwest::Method::POST, "reportFaults", Some(&faults))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get_weather(&self) -> Result<WeatherResponse> {
        self.send_json::<(), _>("getWeather", reqwest::Method::GET, "weather", None)
            .await
    }

    /// Clears the ETag cache, e.g. after a `purgeAll` push command.
    pub fn clear_etag_cache(&self) {
        self.etags.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: String) -> TransportConfig {
        let mut cfg = TransportConfig::new(base_url, "serverkey", "hw-001");
        cfg.retry.max_retries = 0;
        cfg
    }

    #[tokio::test]
    async fn register_parses_ready_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/register"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "READY",
                "message": "ok",
                "settings": {},
                "tags": [],
                "commands": [],
                "displayAttrs": {},
            })))
            .mount(&server)
            .await;

        let client = CmsClient::new(config(server.uri())).unwrap();
        let req = RegisterRequest {
            hardware_key: "hw-001".into(),
            client_type: "rust-core".into(),
            client_version: "0.1.0".into(),
            screen_size_x: 1920,
            screen_size_y: 1080,
            xmr_channel: None,
            public_key_pem: String::new(),
        };
        let resp = client.register(&req).await.unwrap();
        assert_eq!(resp.code, RegisterCode::Ready);
    }

    #[tokio::test]
    async fn required_files_304_returns_cached_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requiredFiles"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"v1\"")
                    .set_body_json(serde_json::json!({ "files": [], "purge": [] })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/requiredFiles"))
            .and(header("If-None-Match", "\"v1\""))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        let client = CmsClient::new(config(server.uri())).unwrap();
        let first = client.required_files().await.unwrap();
        assert!(first.files.is_empty());
        let second = client.required_files().await.unwrap();
        assert!(second.files.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_maps_to_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requiredFiles"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = CmsClient::new(config(server.uri())).unwrap();
        let err = client.required_files().await.unwrap_err();
        assert!(matches!(err, TransportError::Auth(StatusCode::UNAUTHORIZED)));
        assert!(!err.should_retry());
    }

    #[tokio::test]
    async fn server_error_is_retriable_and_exhausts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/requiredFiles"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut cfg = config(server.uri());
        cfg.retry.max_retries = 1;
        cfg.retry.base_delay_ms = 1;
        cfg.retry.max_delay_ms = 1;
        let client = CmsClient::new(cfg).unwrap();
        let err = client.required_files().await.unwrap_err();
        assert!(matches!(err, TransportError::HttpStatus(StatusCode::SERVICE_UNAVAILABLE)));
    }
}
