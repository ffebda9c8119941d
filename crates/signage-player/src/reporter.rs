//! Batches proof-of-play and log records and submits them to the CMS in
//! bounded batches (spec.md §5: default batch sizes 50 and 100).

use crate::error::Result;
use signage_transport::{CmsClient, LogRecord, ProofOfPlayRecord};
use std::sync::Mutex;
use tracing::{instrument, warn};

const DEFAULT_STATS_BATCH: usize = 50;
const DEFAULT_LOG_BATCH: usize = 100;

pub struct StatusReporter {
    client: std::sync::Arc<CmsClient>,
    stats: Mutex<Vec<ProofOfPlayRecord>>,
    logs: Mutex<Vec<LogRecord>>,
    stats_batch: usize,
    log_batch: usize,
}

impl StatusReporter {
    pub fn new(client: std::sync::Arc<CmsClient>) -> Self {
        Self {
            client,
            stats: Mutex::new(Vec::new()),
            logs: Mutex::new(Vec::new()),
            stats_batch: DEFAULT_STATS_BATCH,
            log_batch: DEFAULT_LOG_BATCH,
        }
    }

    pub fn with_batch_sizes(mut self, stats_batch: usize, log_batch: usize) -> Self {
        self.stats_batch = stats_batch;
        self.log_batch = log_batch;
        self
    }

    /// Records a proof-of-play entry, flushing immediately if the batch
    /// threshold is reached.
    #[instrument(skip(self, record))]
    pub async fn record_play(&self, record: ProofOfPlayRecord) -> Result<()> {
        let ready = {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            stats.push(record);
            stats.len() >= self.stats_batch
        };
        if ready {
            self.flush_stats().await?;
        }
        Ok(())
    }

    #[instrument(skip(self, record))]
    pub async fn record_log(&self, record: LogRecord) -> Result<()> {
        let ready = {
            let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
            logs.push(record);
            logs.len() >= self.log_batch
        };
        if ready {
            self.flush_logs().await?;
        }
        Ok(())
    }

    /// Drains and submits whatever is pending. On failure, records are put
    /// back so the next flush retries them (spec.md §5, "batches are not
    /// dropped on a failed submit").
    #[instrument(skip(self))]
    pub async fn flush_stats(&self) -> Result<()> {
        let batch = {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *stats)
        };
        if batch.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.client.submit_stats(&batch).await {
            warn!(error = %e, count = batch.len(), "submitStats failed, requeueing batch");
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            let mut restored = batch;
            restored.extend(std::mem::take(&mut *stats));
            *stats = restored;
            return Err(e.into());
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn flush_logs(&self) -> Result<()> {
        let batch = {
            let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *logs)
        };
        if batch.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.client.submit_log(&batch).await {
            warn!(error = %e, count = batch.len(), "submitLog failed, requeueing batch");
            let mut logs = self.logs.lock().unwrap_or_else(|e| e.into_inner());
            let mut restored = batch;
            restored.extend(std::mem::take(&mut *logs));
            *logs = restored;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn flush_all(&self) -> Result<()> {
        self.flush_stats().await?;
        self.flush_logs().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use signage_core::LogLevel;
    use signage_transport::TransportConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(uri: String) -> std::sync::Arc<CmsClient> {
        let mut cfg = TransportConfig::new(uri, "serverkey", "hw-001");
        cfg.retry.max_retries = 0;
        std::sync::Arc::new(CmsClient::new(cfg).unwrap())
    }

    fn play_record(schedule_id: u64) -> ProofOfPlayRecord {
        ProofOfPlayRecord {
            schedule_id,
            layout_id: 1,
            widget_id: None,
            started_at: Utc::now(),
            duration_secs: 10.0,
        }
    }

    #[tokio::test]
    async fn flushes_once_batch_threshold_reached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submitStats"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = StatusReporter::new(client_for(server.uri())).with_batch_sizes(2, 100);
        reporter.record_play(play_record(1)).await.unwrap();
        reporter.record_play(play_record(2)).await.unwrap();

        server.verify().await;
    }

    #[tokio::test]
    async fn manual_flush_submits_partial_batch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submitLog"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let reporter = StatusReporter::new(client_for(server.uri()));
        reporter
            .record_log(LogRecord {
                level: LogLevel::Info,
                component: "player".into(),
                message: "started".into(),
                at: Utc::now(),
            })
            .await
            .unwrap();
        reporter.flush_logs().await.unwrap();

        server.verify().await;
    }

    #[tokio::test]
    async fn failed_flush_requeues_records() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/submitStats"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let reporter = StatusReporter::new(client_for(server.uri()));
        reporter.record_play(play_record(1)).await.unwrap();
        assert!(reporter.flush_stats().await.is_err());

        let pending = reporter.stats.lock().unwrap();
        assert_eq!(pending.len(), 1);
    }
}
