//! HTTP fetch abstraction (spec.md §9: "capability to submit an HTTP
//! request" is a trait object passed at construction, enabling in-memory
//! fakes in tests).

use crate::error::{DownloadError, Result};
use async_trait::async_trait;
use bytes::Bytes;

/// Result of a HEAD probe (spec.md §4.3, step 1).
#[derive(Debug, Clone)]
pub struct SizeProbe {
    pub size: Option<u64>,
    pub content_type: Option<String>,
}

/// Response to a (possibly ranged) GET.
#[derive(Debug, Clone)]
pub struct GetResponse {
    pub status: u16,
    pub body: Bytes,
}

impl GetResponse {
    /// A 206 Partial Content, or a 200 treated as a full body
    /// (spec.md §4.3, step 3).
    pub fn is_acceptable_range_response(&self) -> bool {
        self.status == 206 || self.status == 200
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn head(&self, url: &str) -> Result<SizeProbe>;
    async fn get(&self, url: &str, range: Option<(u64, u64)>) -> Result<GetResponse>;
}

/// Default fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    async fn head(&self, url: &str) -> Result<SizeProbe> {
        let response = self.client.head(url).send().await?;
        if !response.status().is_success() {
            return Err(DownloadError::HttpStatus(response.status().as_u16()));
        }
        let size = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok(SizeProbe { size, content_type })
    }

    async fn get(&self, url: &str, range: Option<(u64, u64)>) -> Result<GetResponse> {
        let mut builder = self.client.get(url);
        if let Some((start, end)) = range {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={start}-{end}"));
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() && status != 206 {
            return Err(DownloadError::HttpStatus(status));
        }
        let body = response.bytes().await?;
        Ok(GetResponse { status, body })
    }
}
