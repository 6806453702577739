//! Memoizes verified bearer tokens so protected requests can skip the
//! external identity provider.
//!
//! The cache only records that this deployment verified a token recently. It
//! is never the authority on whether a token is valid: every miss falls back
//! to full verification.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

const REDIS_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const BACKEND_TIMEOUT: Duration = Duration::from_millis(500);
const DEFAULT_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedIdentity {
    pub principal: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedIdentity {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("identity cache backend unavailable")]
    Unavailable,
    #[error("identity cache backend timed out")]
    Timeout,
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("decoding cached identity: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedIdentity>, CacheError>;
    async fn put(&self, key: &str, entry: CachedIdentity, ttl: Duration) -> Result<(), CacheError>;
    /// Drop the entry only if the stored one is still expired at `now`.
    async fn remove_expired(&self, key: &str, now: DateTime<Utc>) -> Result<(), CacheError>;
}

/// Digest of the full token. Raw bearer tokens are never stored.
pub fn token_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct MemoryTokenStore {
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedIdentity>>,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<CachedIdentity>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CachedIdentity, _ttl: Duration) -> Result<(), CacheError> {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, v| !v.is_expired_at(now));
        if entries.len() >= self.max_entries && !entries.contains_key(key) {
            if let Some(victim) = entries
                .iter()
                .min_by_key(|(_, v)| v.expires_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&victim);
            }
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove_expired(&self, key: &str, now: DateTime<Utc>) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired_at(now)) {
            entries.remove(key);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisTokenStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisTokenStore {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Timeout)??;
        Ok(Self {
            manager,
            prefix: "roster:token:".to_string(),
        })
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, key: &str) -> Result<Option<CachedIdentity>, CacheError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(self.key(key)).await?;
        Ok(raw.map(|s| serde_json::from_str(&s)).transpose()?)
    }

    async fn put(&self, key: &str, entry: CachedIdentity, ttl: Duration) -> Result<(), CacheError> {
        let payload = serde_json::to_string(&entry)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(self.key(key), payload, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    // SET EX already expires the key server-side.
    async fn remove_expired(&self, _key: &str, _now: DateTime<Utc>) -> Result<(), CacheError> {
        Ok(())
    }
}

struct UnreachableStore;

#[async_trait]
impl TokenStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<CachedIdentity>, CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn put(&self, _key: &str, _entry: CachedIdentity, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }

    async fn remove_expired(&self, _key: &str, _now: DateTime<Utc>) -> Result<(), CacheError> {
        Err(CacheError::Unavailable)
    }
}

/// Every backend call is bounded by `backend_timeout`; a slow backend is a miss.
#[derive(Clone)]
pub struct IdentityCache {
    backend: Arc<dyn TokenStore>,
    connected: bool,
    default_ttl: Duration,
    backend_timeout: Duration,
}

impl IdentityCache {
    pub fn new(backend: Arc<dyn TokenStore>, default_ttl: Duration) -> Self {
        Self {
            backend,
            connected: true,
            default_ttl,
            backend_timeout: BACKEND_TIMEOUT,
        }
    }

    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()), default_ttl)
    }

    pub fn disconnected(default_ttl: Duration) -> Self {
        Self {
            connected: false,
            ..Self::new(Arc::new(UnreachableStore), default_ttl)
        }
    }

    pub fn with_backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    pub async fn connect(redis_url: Option<&str>, default_ttl: Duration) -> Self {
        let Some(url) = redis_url else {
            info!("REDIS_URL not set; using in-process identity cache");
            return Self::in_memory(default_ttl);
        };
        match RedisTokenStore::connect(url, REDIS_CONNECT_TIMEOUT).await {
            Ok(store) => {
                info!("identity cache connected to redis");
                Self::new(Arc::new(store), default_ttl)
            }
            Err(err) => {
                warn!(error = %err, "identity cache unreachable; every request will be re-verified");
                Self::disconnected(default_ttl)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        tokio::time::timeout(self.backend_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    pub async fn check(&self, token: &str) -> Option<String> {
        if !self.connected {
            return None;
        }
        let key = token_key(token);
        let now = Utc::now();
        match self.bounded(self.backend.get(&key)).await {
            Ok(Some(entry)) if !entry.is_expired_at(now) => Some(entry.principal),
            Ok(Some(_)) => {
                if let Err(err) = self.bounded(self.backend.remove_expired(&key, now)).await {
                    debug!(error = %err, "failed to drop expired identity");
                }
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "identity cache lookup failed; treating as miss");
                None
            }
        }
    }

    pub async fn add(&self, token: &str, identity: &str, ttl: Duration) {
        if !self.connected {
            return;
        }
        let lifetime = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let entry = CachedIdentity {
            principal: identity.to_string(),
            expires_at: Utc::now()
                .checked_add_signed(lifetime)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let key = token_key(token);
        if let Err(err) = self.bounded(self.backend.put(&key, entry, ttl)).await {
            warn!(error = %err, "identity cache write failed");
        }
    }
}
