use super::date_key::local_date;
use super::stats_store::StatsStore;
use crate::models::StatsConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const LOG_SCOPE: &str = "stats/upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Accepted,
    Rejected(u16),
}

/// Delivers one anonymized snapshot. Transport timeouts are the gateway's business.
pub trait UploadGateway: Send + Sync {
    fn submit(&self, uuid: &str, payload: &str) -> impl Future<Output = Result<UploadStatus>> + Send;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    uuid: &'a str,
    stats_data: &'a str,
}

#[derive(Clone)]
pub struct HttpUploader {
    client: Client,
    endpoint: String,
}

impl HttpUploader {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build upload client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &StatsConfig) -> Result<Self> {
        Self::new(config.endpoint.clone(), config.request_timeout())
    }
}

impl UploadGateway for HttpUploader {
    async fn submit(&self, uuid: &str, payload: &str) -> Result<UploadStatus> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&UploadRequest {
                uuid,
                stats_data: payload,
            })
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", self.endpoint))?;

        let status = response.status();
        if status.is_success() {
            Ok(UploadStatus::Accepted)
        } else {
            Ok(UploadStatus::Rejected(status.as_u16()))
        }
    }
}

/// How an upload pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Sent,
    Rejected(u16),
    /// The request never completed (or the snapshot could not be prepared).
    Failed,
    SkippedDisabled,
    SkippedAlreadyUploaded,
    SkippedInProgress,
    AggregationFailed,
}

struct UploadGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> UploadGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Refreshes the game summaries and, if sharing is allowed and nothing went out today,
/// sends the snapshot. Never fails: every error ends up in the diagnostic log.
pub async fn upload_stats<G: UploadGateway>(store: &StatsStore, gateway: &G, config: &StatsConfig) -> UploadOutcome {
    let Some(_guard) = UploadGuard::try_acquire(&store.upload_in_progress) else {
        store.log().info(LOG_SCOPE, "already_running", None);
        return UploadOutcome::SkippedInProgress;
    };

    match run_upload(store, gateway, config).await {
        Ok(outcome) => outcome,
        Err(e) => {
            store.log().error(
                LOG_SCOPE,
                "upload_failed",
                Some(json!({ "error": format!("{:#}", e) })),
            );
            UploadOutcome::Failed
        }
    }
}

async fn run_upload<G: UploadGateway>(store: &StatsStore, gateway: &G, config: &StatsConfig) -> Result<UploadOutcome> {
    // Local aggregation happens regardless of the sharing toggles.
    if let Err(e) = store.refresh_game_stats(&config.cache_dir) {
        store.log().error(
            LOG_SCOPE,
            "aggregation_failed",
            Some(json!({ "error": format!("{:#}", e) })),
        );
        return Ok(UploadOutcome::AggregationFailed);
    }

    let settings = store.settings();
    if !settings.collect_stats() || !settings.share_anonymous_stats() {
        return Ok(UploadOutcome::SkippedDisabled);
    }

    let today = local_date(&store.clock().now());
    if store.uploaded_on(today) {
        return Ok(UploadOutcome::SkippedAlreadyUploaded);
    }

    let snapshot = store.snapshot();
    let payload = serde_json::to_string(&snapshot).context("Failed to serialize statistics")?;

    let record_path = config.upload_record_path();
    if let Some(parent) = record_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(&record_path, &payload).with_context(|| format!("Failed to write {}", record_path.display()))?;

    let result = gateway.submit(&snapshot.uuid.to_string(), &payload).await;

    // One attempt per day, whatever the result.
    store.record_upload(today);

    match result? {
        UploadStatus::Accepted => {
            store.log().info(
                LOG_SCOPE,
                "sent",
                Some(json!({ "bytes": payload.len(), "date": today.to_string() })),
            );
            Ok(UploadOutcome::Sent)
        }
        UploadStatus::Rejected(code) => {
            store.log().warn(LOG_SCOPE, "rejected", Some(json!({ "status": code })));
            Ok(UploadOutcome::Rejected(code))
        }
    }
}

/// Runs one upload pass in the background after `config.upload_delay()`.
/// Must be called from within a tokio runtime.
pub fn spawn_upload_task<G>(store: Arc<StatsStore>, gateway: G, config: StatsConfig) -> JoinHandle<UploadOutcome>
where
    G: UploadGateway + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(config.upload_delay()).await;
        upload_stats(&store, &gateway, &config).await
    })
}
