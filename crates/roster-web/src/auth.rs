//! Bearer token verification against the identity provider, fronted by the
//! identity cache.

use std::time::Duration;

use async_trait::async_trait;
use roster_storage::{HttpClientConfig, IdentityCache};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info_span, Instrument};

pub const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
pub const DEFAULT_AUTH_DOMAIN: &str = "g.hmc.edu";
pub const DEFAULT_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token rejected: {0}")]
    Rejected(String),
    #[error("identity provider unreachable: {0}")]
    Transport(String),
}

#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// The verified principal (an email address) for `token`.
    async fn verify(&self, token: &str) -> Result<String, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    iss: Option<String>,
    hd: Option<String>,
    email: Option<String>,
}

pub struct GoogleTokenVerifier {
    client: reqwest::Client,
    tokeninfo_url: String,
    issuers: Vec<String>,
    domain: String,
}

impl GoogleTokenVerifier {
    pub fn new(
        tokeninfo_url: impl Into<String>,
        issuers: Vec<String>,
        domain: impl Into<String>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: HttpClientConfig::with_timeout(Duration::from_secs(5)).build()?,
            tokeninfo_url: tokeninfo_url.into(),
            issuers,
            domain: domain.into(),
        })
    }

    fn check_claims(&self, info: TokenInfo) -> Result<String, AuthError> {
        let iss = info.iss.unwrap_or_default();
        if !self.issuers.iter().any(|allowed| *allowed == iss) {
            return Err(AuthError::Rejected(format!("unexpected issuer {iss:?}")));
        }
        if info.hd.as_deref() != Some(self.domain.as_str()) {
            return Err(AuthError::Rejected(format!(
                "hosted domain {:?} is not {}",
                info.hd, self.domain
            )));
        }
        info.email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| AuthError::Rejected("token carries no email".into()))
    }
}

#[async_trait]
impl TokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, token: &str) -> Result<String, AuthError> {
        let resp = self
            .client
            .get(&self.tokeninfo_url)
            .query(&[("id_token", token)])
            .send()
            .instrument(info_span!("tokeninfo"))
            .await
            .map_err(|err| AuthError::Transport(err.without_url().to_string()))?;
        if !resp.status().is_success() {
            return Err(AuthError::Rejected(format!(
                "tokeninfo returned {}",
                resp.status()
            )));
        }
        let info: TokenInfo = resp
            .json()
            .await
            .map_err(|err| AuthError::Rejected(format!("unreadable tokeninfo: {err}")))?;
        self.check_claims(info)
    }
}

/// Cache hit short-circuits verification. Only accepted tokens are cached.
pub async fn authenticate(
    cache: &IdentityCache,
    verifier: &dyn TokenVerifier,
    token: &str,
) -> Result<String, AuthError> {
    if token.is_empty() {
        return Err(AuthError::Rejected("empty token".into()));
    }
    if let Some(principal) = cache.check(token).await {
        debug!("identity cache hit");
        return Ok(principal);
    }
    let principal = verifier.verify(token).await?;
    cache.add(token, &principal, cache.default_ttl()).await;
    Ok(principal)
}
