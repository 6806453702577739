//! Atomic snapshot persistence, identity cache and HTTP client setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use roster_core::RecordCollection;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod identity;

pub use identity::{
    token_key, CacheError, CachedIdentity, IdentityCache, MemoryTokenStore, RedisTokenStore,
    TokenStore,
};

pub const CRATE_NAME: &str = "roster-storage";

#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Missing or unparsable; readers should treat this as transient.
    #[error("snapshot {} not available: {reason}", .path.display())]
    NotAvailable { path: PathBuf, reason: String },
    #[error("persisting snapshot {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn persistence(&self, source: std::io::Error) -> SnapshotError {
        SnapshotError::Persistence {
            path: self.path.clone(),
            source,
        }
    }

    pub async fn write(&self, collection: &RecordCollection) -> Result<usize, SnapshotError> {
        let bytes = serde_json::to_vec_pretty(collection)?;
        let dir = self.directory();
        fs::create_dir_all(&dir)
            .await
            .map_err(|err| self.persistence(err))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot".to_string());
        let temp_path = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        if let Err(err) = write_temp(&temp_path, &bytes).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(self.persistence(err));
        }

        match fs::rename(&temp_path, &self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), bytes = bytes.len(), "snapshot published");
                Ok(bytes.len())
            }
            Err(err) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(self.persistence(err))
            }
        }
    }

    pub async fn read(&self) -> Result<RecordCollection, SnapshotError> {
        let bytes = fs::read(&self.path)
            .await
            .map_err(|err| SnapshotError::NotAvailable {
                path: self.path.clone(),
                reason: err.to_string(),
            })?;
        serde_json::from_slice(&bytes).map_err(|err| SnapshotError::NotAvailable {
            path: self.path.clone(),
            reason: format!("unparsable: {err}"),
        })
    }

    /// The snapshot a sync run diffs against. A missing or unparsable file is
    /// treated as no previous snapshot.
    pub async fn load_previous(&self) -> Result<Option<RecordCollection>, SnapshotError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(SnapshotError::NotAvailable {
                    path: self.path.clone(),
                    reason: err.to_string(),
                })
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(collection) => Ok(Some(collection)),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "previous snapshot unparsable; treating as first run"
                );
                Ok(None)
            }
        }
    }
}

async fn write_temp(temp_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(temp_path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

impl HttpClientConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn build(&self) -> anyhow::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        builder.build().context("building reqwest client")
    }
}
