use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use roster_storage::HttpClientConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info_span, Instrument};

use crate::{CellRange, SourceError, SpreadsheetSource};

pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";
pub const SHEETS_SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_KEY_FILE: &str = ".oauth-private-key.json";

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, SourceError>;
}

#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String, SourceError> {
        Ok(self.0.clone())
    }
}

#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).context("parsing service account key")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading service account key {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Inline JSON in `ROSTER_SERVICE_ACCOUNT_JSON` wins over the key file
    /// named by `ROSTER_SERVICE_ACCOUNT_FILE`.
    pub fn from_env() -> anyhow::Result<Self> {
        if let Ok(inline) = std::env::var("ROSTER_SERVICE_ACCOUNT_JSON") {
            return Self::from_json(&inline);
        }
        let path = std::env::var("ROSTER_SERVICE_ACCOUNT_FILE")
            .unwrap_or_else(|_| DEFAULT_KEY_FILE.to_string());
        Self::from_file(path)
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

pub struct ServiceAccountTokenProvider {
    key: ServiceAccountKey,
    client: reqwest::Client,
    scopes: String,
    cached: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl ServiceAccountTokenProvider {
    pub fn new(key: ServiceAccountKey, client: reqwest::Client) -> Self {
        Self {
            key,
            client,
            scopes: SHEETS_SCOPES.to_string(),
            cached: Mutex::new(None),
        }
    }

    fn signed_assertion(&self, now: DateTime<Utc>) -> Result<String, SourceError> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scopes,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: (now + ChronoDuration::hours(1)).timestamp(),
        };
        let signing_key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|err| SourceError::Credentials(format!("loading private key: {err}")))?;
        encode(&Header::new(Algorithm::RS256), &claims, &signing_key)
            .map_err(|err| SourceError::Credentials(format!("signing assertion: {err}")))
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokenProvider {
    async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some((token, expires_at)) = cached.as_ref() {
            if *expires_at - ChronoDuration::seconds(60) > now {
                return Ok(token.clone());
            }
        }

        let assertion = self.signed_assertion(now)?;
        let url = self.key.token_uri.clone();
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url.clone(),
                source,
            })?;
        let resp = ensure_success(resp, &url).await?;
        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|source| SourceError::Transport { url, source })?;

        debug!(expires_in = token.expires_in, "obtained sheets access token");
        let expires_at = now + ChronoDuration::seconds(token.expires_in);
        *cached = Some((token.access_token.clone(), expires_at));
        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct ValueRangeUpdate<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

pub struct GoogleSheetsSource {
    client: reqwest::Client,
    api_base: String,
    spreadsheet_id: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GoogleSheetsSource {
    pub fn new(
        http: &HttpClientConfig,
        api_base: impl Into<String>,
        spreadsheet_id: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: http.build()?,
            api_base: api_base.into(),
            spreadsheet_id: spreadsheet_id.into(),
            tokens,
        })
    }

    fn values_url(&self, range: &str) -> Result<Url, SourceError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|err| SourceError::Endpoint(format!("{}: {err}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| SourceError::Endpoint(self.api_base.clone()))?
            .pop_if_empty()
            .extend(["spreadsheets", self.spreadsheet_id.as_str(), "values", range]);
        Ok(url)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let url = self.values_url(range)?;
        let token = self.tokens.access_token().await?;
        let url_text = url.to_string();
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("majorDimension", "ROWS")])
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                url: url_text.clone(),
                source,
            })?;
        let resp = ensure_success(resp, &url_text).await?;
        let body: ValueRange = resp.json().await.map_err(|source| SourceError::Transport {
            url: url_text,
            source,
        })?;
        Ok(body.values)
    }
}

async fn ensure_success(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
        body,
    })
}

#[async_trait]
impl SpreadsheetSource for GoogleSheetsSource {
    async fn fetch_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>, SourceError> {
        let range = crate::quote_sheet_title(worksheet);
        self.get_values(&range)
            .instrument(info_span!("sheets_fetch", worksheet))
            .await
    }

    async fn fetch_header(&self, worksheet: &str) -> Result<Vec<String>, SourceError> {
        let range = format!("{}!1:1", crate::quote_sheet_title(worksheet));
        let rows = self
            .get_values(&range)
            .instrument(info_span!("sheets_fetch_header", worksheet))
            .await?;
        Ok(rows.into_iter().next().unwrap_or_default())
    }

    async fn write_range(
        &self,
        worksheet: &str,
        range: &CellRange,
        rows: &[Vec<String>],
    ) -> Result<(), SourceError> {
        let a1 = range.to_a1(worksheet);
        let url = self.values_url(&a1)?;
        let url_text = url.to_string();
        let token = self.tokens.access_token().await?;
        let body = ValueRangeUpdate {
            range: &a1,
            major_dimension: "ROWS",
            values: rows,
        };
        let span = info_span!("sheets_write", worksheet, range = %a1, rows = rows.len());
        async {
            let resp = self
                .client
                .put(url)
                .bearer_auth(token)
                .query(&[("valueInputOption", "RAW")])
                .json(&body)
                .send()
                .await
                .map_err(|source| SourceError::Transport {
                    url: url_text.clone(),
                    source,
                })?;
            ensure_success(resp, &url_text).await?;
            Ok::<(), SourceError>(())
        }
        .instrument(span)
        .await
    }
}
