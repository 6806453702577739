//! Download/upload cycle between the response spreadsheet and the published
//! snapshot, plus the operator notification and periodic trigger around it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use roster_adapters::{
    CellRange, GoogleSheetsSource, MemorySheetSource, ServiceAccountKey,
    ServiceAccountTokenProvider, SourceError, SpreadsheetSource, DEFAULT_SHEETS_API_BASE,
};
use roster_core::{ColumnSchema, RecordCollection, SchemaError, SCHEMA_V3};
use roster_storage::{HttpClientConfig, SnapshotError, SnapshotStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod detect;
pub mod notify;
pub mod schedule;

pub use detect::{new_attention, unprocessed_names};
pub use notify::{
    compose_message, notifier_from_env, DisabledNotifier, Notifier, NotifyOutcome, WebhookConfig,
    WebhookNotifier,
};
pub use schedule::{CycleOutcome, Reschedule, SchedulePolicy, SyncTask};

pub const CRATE_NAME: &str = "roster-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionRegistry {
    pub partitions: Vec<PartitionConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartitionConfig {
    pub key: String,
    #[serde(default)]
    pub worksheet: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl PartitionConfig {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            worksheet: None,
            enabled: true,
        }
    }

    pub fn worksheet(&self) -> &str {
        self.worksheet.as_deref().unwrap_or(&self.key)
    }
}

impl PartitionRegistry {
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            partitions: keys.into_iter().map(PartitionConfig::new).collect(),
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = &PartitionConfig> {
        self.partitions.iter().filter(|p| p.enabled)
    }

    pub fn lookup(&self, key: &str) -> Option<&PartitionConfig> {
        self.enabled().find(|p| p.key == key)
    }
}

pub async fn load_partition_registry(workspace_root: &Path) -> Result<PartitionRegistry> {
    let path = workspace_root.join("partitions.yaml");
    let text = fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub spreadsheet_id: Option<String>,
    pub sheets_api_base: String,
    pub sheets_fixture: Option<PathBuf>,
    pub snapshot_path: PathBuf,
    pub workspace_root: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_interval_secs: u64,
    pub stop_on_failure: bool,
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            spreadsheet_id: std::env::var("ROSTER_SPREADSHEET_ID")
                .ok()
                .filter(|v| !v.is_empty()),
            sheets_api_base: std::env::var("ROSTER_SHEETS_API_BASE")
                .unwrap_or_else(|_| DEFAULT_SHEETS_API_BASE.to_string()),
            sheets_fixture: std::env::var("ROSTER_SHEETS_FIXTURE")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            snapshot_path: std::env::var("ROSTER_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("responses.json")),
            workspace_root: std::env::var("ROSTER_WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            user_agent: std::env::var("ROSTER_USER_AGENT")
                .unwrap_or_else(|_| "roster-sync/0.1".to_string()),
            http_timeout_secs: std::env::var("ROSTER_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20),
            scheduler_enabled: std::env::var("ROSTER_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            sync_interval_secs: std::env::var("ROSTER_SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(60),
            stop_on_failure: std::env::var("ROSTER_SYNC_STOP_ON_FAILURE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }

    pub fn schedule_policy(&self) -> SchedulePolicy {
        let policy = SchedulePolicy::every(Duration::from_secs(self.sync_interval_secs));
        if self.stop_on_failure {
            policy.until_failure()
        } else {
            policy
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Transport(#[from] SourceError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("snapshot holds no records; refusing to overwrite the spreadsheet")]
    EmptyCollection,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub partitions: usize,
    pub records: usize,
    pub pending: usize,
    pub new_attention: Vec<String>,
    pub notification: Option<NotifyOutcome>,
    pub snapshot_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub partitions: usize,
    pub rows: usize,
    pub skipped: Vec<String>,
}

pub struct SyncEngine {
    schema: ColumnSchema,
    partitions: PartitionRegistry,
    source: Box<dyn SpreadsheetSource>,
    store: SnapshotStore,
    notifier: Box<dyn Notifier>,
}

impl SyncEngine {
    pub fn new(
        partitions: PartitionRegistry,
        source: Box<dyn SpreadsheetSource>,
        store: SnapshotStore,
    ) -> Self {
        Self {
            schema: SCHEMA_V3,
            partitions,
            source,
            store,
            notifier: Box::new(DisabledNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Pull every enabled partition, notify about newly pending responses and
    /// publish the result. Nothing is written unless every partition mapped.
    pub async fn download(&self) -> Result<DownloadSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        async move {
            let mut collection = RecordCollection::new();
            for partition in self.partitions.enabled() {
                let worksheet = partition.worksheet();
                let rows = self.source.fetch_rows(worksheet).await?;
                let records = self.schema.map_rows(worksheet, &rows)?;
                info!(partition = %partition.key, records = records.len(), "partition fetched");
                collection.insert_partition(partition.key.clone(), records);
            }

            let previous = self.store.load_previous().await?;
            let delta = new_attention(previous.as_ref(), &collection);
            let notification = if delta.is_empty() {
                None
            } else {
                let outcome = self.notifier.dispatch(&delta).await;
                if let NotifyOutcome::Failed(detail) = &outcome {
                    warn!(%detail, pending = delta.len(), "notification failed; publishing anyway");
                }
                Some(outcome)
            };

            let snapshot_bytes = self.store.write(&collection).await?;
            let summary = DownloadSummary {
                run_id,
                started_at,
                finished_at: Utc::now(),
                partitions: collection.partition_count(),
                records: collection.record_count(),
                pending: collection.pending_count(),
                new_attention: delta,
                notification,
                snapshot_bytes,
            };
            info!(
                records = summary.records,
                pending = summary.pending,
                new = summary.new_attention.len(),
                "snapshot published"
            );
            Ok(summary)
        }
        .instrument(info_span!("download", %run_id))
        .await
    }

    pub async fn upload(&self) -> Result<UploadSummary, SyncError> {
        async move {
            let collection = self.store.read().await?;
            if collection.is_empty() {
                return Err(SyncError::EmptyCollection);
            }

            let mut summary = UploadSummary::default();
            let mut planned = Vec::new();
            for (key, records) in collection.partitions() {
                if records.is_empty() {
                    warn!(partition = key, "partition is empty; skipping");
                    summary.skipped.push(key.to_string());
                    continue;
                }
                let Some(partition) = self.partitions.lookup(key) else {
                    warn!(partition = key, "partition has no enabled worksheet; skipping");
                    summary.skipped.push(key.to_string());
                    continue;
                };
                let worksheet = partition.worksheet();
                let header = self.source.fetch_header(worksheet).await?;
                self.schema.validate_header(worksheet, &header)?;
                planned.push((worksheet, records));
            }

            for (worksheet, records) in planned {
                let range = CellRange::writable_block(&self.schema, records.len());
                let values = self.schema.writable_rows(records);
                self.source.write_range(worksheet, &range, &values).await?;
                info!(worksheet, rows = values.len(), "annotations written");
                summary.partitions += 1;
                summary.rows += values.len();
            }
            Ok(summary)
        }
        .instrument(info_span!("upload"))
        .await
    }
}

pub async fn engine_from_config(config: &SyncConfig) -> Result<SyncEngine> {
    let partitions = load_partition_registry(&config.workspace_root).await?;
    let source: Box<dyn SpreadsheetSource> = match &config.sheets_fixture {
        Some(path) => {
            info!(path = %path.display(), "using fixture workbook");
            Box::new(MemorySheetSource::from_fixture_file(path)?)
        }
        None => {
            let spreadsheet_id = config
                .spreadsheet_id
                .clone()
                .context("ROSTER_SPREADSHEET_ID is not set")?;
            let http = config.http_client_config();
            let key = ServiceAccountKey::from_env()?;
            let tokens = ServiceAccountTokenProvider::new(key, http.build()?);
            Box::new(GoogleSheetsSource::new(
                &http,
                config.sheets_api_base.clone(),
                spreadsheet_id,
                Arc::new(tokens),
            )?)
        }
    };
    Ok(
        SyncEngine::new(partitions, source, SnapshotStore::new(&config.snapshot_path))
            .with_notifier(notifier_from_env()?),
    )
}

pub async fn run_download_from_env() -> Result<DownloadSummary> {
    let engine = engine_from_config(&SyncConfig::from_env()).await?;
    Ok(engine.download().await?)
}

pub async fn run_upload_from_env() -> Result<UploadSummary> {
    let engine = engine_from_config(&SyncConfig::from_env()).await?;
    Ok(engine.upload().await?)
}
