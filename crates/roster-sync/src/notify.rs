//! Best-effort operator notification when new responses need processing.
//!
//! A lost notification is recovered by the next cycle's diff against the
//! snapshot that was written, so nothing here retries or queues.

use std::time::Duration;

use async_trait::async_trait;
use roster_storage::HttpClientConfig;
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

pub const DEFAULT_WEBHOOK_URL: &str = "https://graph.facebook.com/v2.6/me/messages";
pub const MESSAGE_TAG: &str = "ACCOUNT_UPDATE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NotifyOutcome {
    Sent,
    Skipped,
    Failed(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Never fails; transport problems are reported as `NotifyOutcome::Failed`.
    async fn dispatch(&self, names: &[String]) -> NotifyOutcome;
}

pub fn compose_message(names: &[String]) -> String {
    let display: Vec<&str> = names
        .iter()
        .map(|n| if n.trim().is_empty() { "(no name)" } else { n.as_str() })
        .collect();
    match display.as_slice() {
        [one] => format!("New form response from {one} needs processing."),
        many => format!(
            "{} new form responses need processing: {}.",
            many.len(),
            many.join(", ")
        ),
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub access_token: String,
    pub recipient: String,
    pub timeout: Duration,
}

impl WebhookConfig {
    pub fn from_env() -> Option<Self> {
        let access_token = std::env::var("ROSTER_WEBHOOK_TOKEN").ok().filter(|v| !v.is_empty())?;
        let recipient = std::env::var("ROSTER_WEBHOOK_RECIPIENT")
            .ok()
            .filter(|v| !v.is_empty())?;
        Some(Self {
            url: std::env::var("ROSTER_WEBHOOK_URL")
                .unwrap_or_else(|_| DEFAULT_WEBHOOK_URL.to_string()),
            access_token,
            recipient,
            timeout: Duration::from_secs(
                std::env::var("ROSTER_WEBHOOK_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
            ),
        })
    }
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct Message {
    text: String,
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient: Recipient<'a>,
    message: Message,
    messaging_type: &'static str,
    tag: &'static str,
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> anyhow::Result<Self> {
        let client = HttpClientConfig::with_timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn dispatch(&self, names: &[String]) -> NotifyOutcome {
        if names.is_empty() {
            return NotifyOutcome::Skipped;
        }
        let payload = WebhookPayload {
            recipient: Recipient {
                id: &self.config.recipient,
            },
            message: Message {
                text: compose_message(names),
            },
            messaging_type: "MESSAGE_TAG",
            tag: MESSAGE_TAG,
        };

        let result = self
            .client
            .post(&self.config.url)
            .query(&[("access_token", self.config.access_token.as_str())])
            .json(&payload)
            .send()
            .instrument(info_span!("webhook_notify", count = names.len()))
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(count = names.len(), "operator notified");
                NotifyOutcome::Sent
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!(%status, %body, "webhook rejected notification");
                NotifyOutcome::Failed(format!("http status {status}: {body}"))
            }
            Err(err) => {
                warn!(error = %err, timeout = err.is_timeout(), "webhook request failed");
                NotifyOutcome::Failed(err.without_url().to_string())
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn dispatch(&self, names: &[String]) -> NotifyOutcome {
        info!(
            count = names.len(),
            "webhook credentials not configured; notification skipped"
        );
        NotifyOutcome::Skipped
    }
}

pub fn notifier_from_env() -> anyhow::Result<Box<dyn Notifier>> {
    match WebhookConfig::from_env() {
        Some(config) => Ok(Box::new(WebhookNotifier::new(config)?)),
        None => Ok(Box::new(DisabledNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::net::TcpListener;
    use tokio::sync::Mutex;

    type Seen = Arc<Mutex<Vec<(HashMap<String, String>, serde_json::Value)>>>;

    async fn record(
        State(seen): State<Seen>,
        Query(query): Query<HashMap<String, String>>,
        Json(body): Json<serde_json::Value>,
    ) -> StatusCode {
        seen.lock().await.push((query, body));
        StatusCode::OK
    }

    async fn reject() -> (StatusCode, &'static str) {
        (StatusCode::BAD_REQUEST, "invalid recipient")
    }

    async fn stall() -> StatusCode {
        tokio::time::sleep(Duration::from_secs(5)).await;
        StatusCode::OK
    }

    async fn spawn_endpoint() -> (String, Seen) {
        let seen = Seen::default();
        let app = Router::new()
            .route("/ok", post(record))
            .route("/reject", post(reject))
            .route("/stall", post(stall))
            .with_state(seen.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move { axum::serve(listener, app).await });
        (format!("http://{addr}"), seen)
    }

    fn notifier(url: String, timeout: Duration) -> WebhookNotifier {
        WebhookNotifier::new(WebhookConfig {
            url,
            access_token: "page-token".into(),
            recipient: "operator-id".into(),
            timeout,
        })
        .expect("notifier")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn message_is_pluralized() {
        assert_eq!(
            compose_message(&names(&["Alice"])),
            "New form response from Alice needs processing."
        );
        assert_eq!(
            compose_message(&names(&["Alice", "", "Carol"])),
            "3 new form responses need processing: Alice, (no name), Carol."
        );
    }

    #[tokio::test]
    async fn posts_tagged_message_to_recipient() {
        let (base, seen) = spawn_endpoint().await;
        let outcome = notifier(format!("{base}/ok"), Duration::from_secs(5))
            .dispatch(&names(&["Bo", "Zed"]))
            .await;
        assert_eq!(outcome, NotifyOutcome::Sent);

        let seen = seen.lock().await;
        let (query, body) = &seen[0];
        assert_eq!(query.get("access_token").map(String::as_str), Some("page-token"));
        assert_eq!(body["recipient"]["id"], "operator-id");
        assert_eq!(body["tag"], MESSAGE_TAG);
        assert_eq!(body["messaging_type"], "MESSAGE_TAG");
        assert_eq!(
            body["message"]["text"],
            "2 new form responses need processing: Bo, Zed."
        );
    }

    #[tokio::test]
    async fn rejected_request_reports_response_detail() {
        let (base, _seen) = spawn_endpoint().await;
        let outcome = notifier(format!("{base}/reject"), Duration::from_secs(5))
            .dispatch(&names(&["Bo"]))
            .await;
        match outcome {
            NotifyOutcome::Failed(detail) => {
                assert!(detail.contains("400"));
                assert!(detail.contains("invalid recipient"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_without_raising() {
        let (base, _seen) = spawn_endpoint().await;
        let outcome = notifier(format!("{base}/stall"), Duration::from_millis(200))
            .dispatch(&names(&["Bo"]))
            .await;
        assert!(matches!(outcome, NotifyOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_quietly() {
        let outcome = notifier("http://127.0.0.1:1/".into(), Duration::from_secs(1))
            .dispatch(&names(&["Bo"]))
            .await;
        assert!(matches!(outcome, NotifyOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn disabled_notifier_skips() {
        assert_eq!(
            DisabledNotifier.dispatch(&names(&["Bo"])).await,
            NotifyOutcome::Skipped
        );
    }
}
