//! The six-step collection cycle (spec.md §2/§7): register, diff the
//! manifest, download, resolve the schedule, and report status — run on a
//! timer derived from the CMS `collectInterval`, nudgeable out-of-band by
//! push-channel commands.

use crate::error::Result;
use crate::identity::DisplayIdentity;
use crate::reporter::StatusReporter;
use chrono::Utc;
use signage_core::{DisplaySettings, FileKind};
use signage_download::DownloadManager;
use signage_manifest::{LayoutMediaMap, ManifestResolver};
use signage_schedule::{PlannedPlay, ScheduleModel, ScheduleResolver};
use signage_store::FsStore;
use signage_transport::{CmsClient, RegisterRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

/// Out-of-band nudges delivered over the push channel (spec.md §4.7). The
/// channel transport itself is an external collaborator; this is just the
/// vocabulary the loop understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushCommand {
    CollectNow,
    PurgeAll,
    Shutdown,
}

pub struct CollectionLoop {
    client: Arc<CmsClient>,
    download_manager: Arc<DownloadManager>,
    store: Arc<FsStore>,
    reporter: Arc<StatusReporter>,
    identity_path: std::path::PathBuf,
    identity: Mutex<DisplayIdentity>,
    manifest_resolver: ManifestResolver,
    schedule_resolver: Mutex<ScheduleResolver>,
    layout_media_map: Mutex<LayoutMediaMap>,
    /// The last schedule the CMS successfully returned, used to keep
    /// playing on a known-good schedule when a `schedule` call fails
    /// (spec.md §7, degraded-connectivity behavior).
    last_known_schedule: Mutex<Option<ScheduleModel>>,
}

impl CollectionLoop {
    pub fn new(
        client: Arc<CmsClient>,
        download_manager: Arc<DownloadManager>,
        store: Arc<FsStore>,
        reporter: Arc<StatusReporter>,
        identity_path: std::path::PathBuf,
        identity: DisplayIdentity,
    ) -> Self {
        Self {
            client,
            download_manager,
            store,
            reporter,
            identity_path,
            identity: Mutex::new(identity),
            manifest_resolver: ManifestResolver::new(),
            schedule_resolver: Mutex::new(ScheduleResolver::new()),
            layout_media_map: Mutex::new(LayoutMediaMap::new()),
            last_known_schedule: Mutex::new(None),
        }
    }

    fn register_request(&self, identity: &DisplayIdentity) -> RegisterRequest {
        RegisterRequest {
            hardware_key: identity.hardware_key.clone(),
            client_type: "signage-player".into(),
            client_version: env!("CARGO_PKG_VERSION").into(),
            screen_size_x: identity
                .last_known_settings
                .as_ref()
                .and_then(|s| s.size_x)
                .unwrap_or(1920),
            screen_size_y: identity
                .last_known_settings
                .as_ref()
                .and_then(|s| s.size_y)
                .unwrap_or(1080),
            xmr_channel: None,
            public_key_pem: identity.public_key_pem.clone().unwrap_or_default(),
        }
    }

    /// Runs one full cycle and returns the settings the CMS returned, so the
    /// caller can re-derive the next timer tick.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<DisplaySettings> {
        let request = {
            let identity = self.identity.lock().await;
            self.register_request(&identity)
        };

        self.client.refresh_token_if_needed(&request).await?;
        let register_response = self.client.register(&request).await?;

        {
            let mut identity = self.identity.lock().await;
            identity.last_known_settings = Some(register_response.settings.clone());
            identity.save(&self.identity_path).await?;
        }

        let model = self.resolve_schedule_model().await?;
        let active_layout_ids: Vec<u64> = model
            .items
            .iter()
            .filter_map(|item| match &item.kind {
                signage_schedule::ScheduleItemKind::Layout(id) => Some(*id),
                signage_schedule::ScheduleItemKind::Campaign(ids) => ids.first().copied(),
            })
            .collect();

        // A failed requiredFiles call only skips this cycle's download
        // phase; the display still resolves and plays whatever schedule it
        // has (spec.md §7, degraded-connectivity behavior).
        match self.client.required_files().await {
            Ok(required) => {
                let diff = {
                    let layout_media_map = self.layout_media_map.lock().await;
                    self.manifest_resolver
                        .resolve(&required, &self.store, &active_layout_ids, &layout_media_map)
                        .await?
                };

                if register_response.settings.download_window().is_none_or(|w| w.contains(Utc::now().time())) {
                    for file_info in &diff.download_plan {
                        DownloadManager::enqueue(&self.download_manager, file_info.clone()).await;
                    }
                } else {
                    info!("outside download window, deferring new downloads");
                }

                for key in &diff.purge_list {
                    if let Err(e) = self.store.remove(*key).await {
                        warn!(%key, error = %e, "failed to purge stale entry");
                    }
                }

                self.refresh_layout_media_map(&diff.download_plan).await?;
            }
            Err(e) => {
                warn!(error = %e, "requiredFiles failed, skipping download phase this cycle");
            }
        }

        let geo = None;
        let display_props = HashMap::new();
        let planned: Vec<PlannedPlay> = {
            let mut resolver = self.schedule_resolver.lock().await;
            resolver.current_layouts(&model, Utc::now(), geo, &display_props)
        };
        info!(count = planned.len(), "schedule resolved");

        self.reporter.flush_all().await?;

        Ok(register_response.settings)
    }

    /// Fetches and parses the schedule; on failure, falls back to the last
    /// schedule the CMS successfully returned rather than aborting the
    /// cycle. Propagates the original error if no fallback is available.
    async fn resolve_schedule_model(&self) -> Result<ScheduleModel> {
        match self.client.schedule().await {
            Ok(value) => {
                let model: ScheduleModel = serde_json::from_value(value)
                    .map_err(|e| signage_core::Error::Protocol(e.to_string()))?;
                *self.last_known_schedule.lock().await = Some(model.clone());
                Ok(model)
            }
            Err(e) => match self.last_known_schedule.lock().await.clone() {
                Some(model) => {
                    warn!(error = %e, "schedule fetch failed, falling back to last known schedule");
                    Ok(model)
                }
                None => Err(e.into()),
            },
        }
    }

    /// Re-parses any layout XLFs the download plan just fetched, so the next
    /// manifest diff can rank their dependent media (spec.md §4.2).
    async fn refresh_layout_media_map(&self, download_plan: &[signage_core::FileInfo]) -> Result<()> {
        let mut map = self.layout_media_map.lock().await;
        for file_info in download_plan {
            if file_info.key.kind != FileKind::Layout {
                continue;
            }
            let signage_core::FileId::Simple(layout_id) = file_info.key.id else {
                continue;
            };
            let bytes = match self.store.get(file_info.key).await {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let xml = String::from_utf8_lossy(&bytes);
            match signage_manifest::parse_layout_xlf(layout_id, &xml) {
                Ok(media) => {
                    map.insert(layout_id, media);
                }
                Err(e) => warn!(layout_id, error = %e, "failed to parse layout XLF"),
            }
        }
        Ok(())
    }

    /// Drives the loop forever: runs a cycle, sleeps for the CMS-clamped
    /// `collectInterval`, and reacts early to anything arriving on
    /// `pushed` (spec.md §4.7). The push channel itself stays an external
    /// collaborator; the loop only needs the receiving half.
    #[instrument(skip(self, pushed))]
    pub async fn run(self: Arc<Self>, mut pushed: tokio::sync::mpsc::Receiver<PushCommand>) -> Result<()> {
        loop {
            let settings = self.run_once().await?;
            let interval = std::time::Duration::from_secs(u64::from(settings.clamped_collect_interval()));

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                command = pushed.recv() => {
                    match command {
                        Some(PushCommand::CollectNow) => info!("push command: collecting now"),
                        Some(PushCommand::PurgeAll) => {
                            self.client.clear_etag_cache();
                            info!("push command: purge all, etag cache cleared");
                        }
                        Some(PushCommand::Shutdown) | None => {
                            self.reporter.flush_all().await?;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
