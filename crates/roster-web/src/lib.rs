//! JSON API and static frontend over the published roster snapshot.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use roster_core::{Record, RecordCollection, Visibility, SCHEMA_V3};
use roster_storage::{IdentityCache, SnapshotStore};
use roster_sync::{engine_from_config, SyncConfig, SyncEngine, SyncTask};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub mod auth;

pub use auth::{
    authenticate, AuthError, GoogleTokenVerifier, TokenVerifier, DEFAULT_AUTH_DOMAIN,
    DEFAULT_ISSUERS, DEFAULT_TOKENINFO_URL,
};

pub const CRATE_NAME: &str = "roster-web";

const DATA_NOT_AVAILABLE: &str = "Data not available";
const BAD_TOKEN: &str = "Bad token";
const SYNC_FAILED: &str = "Sync failed";

#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub cache: IdentityCache,
    pub verifier: Arc<dyn TokenVerifier>,
    pub dist_dir: PathBuf,
    pub admin_enabled: bool,
    pub engine: Option<Arc<SyncEngine>>,
}

#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub snapshot_path: PathBuf,
    pub dist_dir: PathBuf,
    pub admin_enabled: bool,
    pub redis_url: Option<String>,
    pub token_ttl_secs: u64,
    pub auth_domain: String,
    pub auth_issuers: Vec<String>,
    pub tokeninfo_url: String,
}

impl WebConfig {
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("ROSTER_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            snapshot_path: std::env::var("ROSTER_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("responses.json")),
            dist_dir: std::env::var("ROSTER_DIST_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("dist")),
            admin_enabled: std::env::var("ROSTER_ADMIN_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(false),
            redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
            token_ttl_secs: std::env::var("ROSTER_TOKEN_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(500),
            auth_domain: std::env::var("ROSTER_AUTH_DOMAIN")
                .unwrap_or_else(|_| DEFAULT_AUTH_DOMAIN.to_string()),
            auth_issuers: std::env::var("ROSTER_AUTH_ISSUERS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| DEFAULT_ISSUERS.iter().map(|s| s.to_string()).collect()),
            tokeninfo_url: std::env::var("ROSTER_TOKENINFO_URL")
                .unwrap_or_else(|_| DEFAULT_TOKENINFO_URL.to_string()),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(index_handler))
        .route("/{file}", get(static_file_handler))
        .route("/api/v1/responses", get(public_responses_handler))
        .route("/api/v1/data", post(member_data_handler));
    if state.admin_enabled {
        router = router
            .route(
                "/api/v1/admin/data",
                get(admin_data_handler).post(admin_save_handler),
            )
            .route("/api/v1/admin/download", post(admin_download_handler))
            .route("/api/v1/admin/upload", post(admin_upload_handler));
    }
    router.with_state(Arc::new(state))
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = WebConfig::from_env();
    let cache = IdentityCache::connect(
        config.redis_url.as_deref(),
        Duration::from_secs(config.token_ttl_secs),
    )
    .await;
    let verifier = GoogleTokenVerifier::new(
        config.tokeninfo_url.clone(),
        config.auth_issuers.clone(),
        config.auth_domain.clone(),
    )?;

    let sync_config = SyncConfig::from_env();
    let engine = if sync_config.scheduler_enabled || config.admin_enabled {
        match engine_from_config(&sync_config).await {
            Ok(engine) => Some(Arc::new(engine)),
            Err(err) if !sync_config.scheduler_enabled => {
                warn!(error = %err, "sync engine unavailable; admin download/upload disabled");
                None
            }
            Err(err) => return Err(err),
        }
    } else {
        None
    };
    let _scheduler = match &engine {
        Some(engine) if sync_config.scheduler_enabled => {
            let task = Arc::new(SyncTask::new(
                Arc::clone(engine),
                sync_config.schedule_policy(),
            ));
            Some(task.start().await?)
        }
        _ => None,
    };

    let state = AppState {
        store: SnapshotStore::new(&config.snapshot_path),
        cache,
        verifier: Arc::new(verifier),
        dist_dir: config.dist_dir.clone(),
        admin_enabled: config.admin_enabled,
        engine,
    };

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, admin = config.admin_enabled, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub fn visible_view(collection: &RecordCollection, visibility: Visibility) -> RecordCollection {
    let keys: Vec<&str> = SCHEMA_V3.keys_visible_to(visibility).collect();
    collection.filter_map_records(|record| {
        record.is_processed().then(|| {
            record
                .project(keys.iter().copied())
                .with_numeric_coordinates()
                .without_empty_summer()
        })
    })
}

pub fn admin_view(collection: &RecordCollection) -> RecordCollection {
    collection.filter_map_records(|record| {
        let mut record: Record = record.clone();
        record.prefill_pending();
        Some(record)
    })
}

#[derive(Debug, Deserialize)]
struct TokenRequest {
    #[serde(rename = "oauthToken", default)]
    oauth_token: String,
}

#[derive(Debug, Serialize)]
struct MemberData {
    email: String,
    responses: RecordCollection,
}

#[derive(Debug, Serialize)]
struct SaveResult {
    records: usize,
}

async fn public_responses_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.read().await {
        Ok(collection) => Json(visible_view(&collection, Visibility::Public)).into_response(),
        Err(err) => not_available(err),
    }
}

async fn member_data_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> Response {
    let email = match authenticate(&state.cache, state.verifier.as_ref(), &request.oauth_token).await
    {
        Ok(email) => email,
        Err(err) => {
            warn!(error = %err, "member request rejected");
            return (StatusCode::UNAUTHORIZED, BAD_TOKEN).into_response();
        }
    };
    match state.store.read().await {
        Ok(collection) => Json(MemberData {
            email,
            responses: visible_view(&collection, Visibility::Member),
        })
        .into_response(),
        Err(err) => not_available(err),
    }
}

async fn admin_data_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.store.read().await {
        Ok(collection) => Json(admin_view(&collection)).into_response(),
        Err(err) => not_available(err),
    }
}

async fn admin_save_handler(
    State(state): State<Arc<AppState>>,
    Json(collection): Json<RecordCollection>,
) -> Response {
    match state.store.write(&collection).await {
        Ok(_) => Json(SaveResult {
            records: collection.record_count(),
        })
        .into_response(),
        Err(err) => {
            error!(error = %err, "saving admin edits failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Could not save data").into_response()
        }
    }
}

async fn admin_download_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(engine) = &state.engine else {
        error!("admin download requested but no sync engine is configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, SYNC_FAILED).into_response();
    };
    match engine.download().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            error!(error = %err, "admin download failed");
            (StatusCode::INTERNAL_SERVER_ERROR, SYNC_FAILED).into_response()
        }
    }
}

async fn admin_upload_handler(State(state): State<Arc<AppState>>) -> Response {
    let Some(engine) = &state.engine else {
        error!("admin upload requested but no sync engine is configured");
        return (StatusCode::INTERNAL_SERVER_ERROR, SYNC_FAILED).into_response();
    };
    match engine.upload().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            error!(error = %err, "admin upload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, SYNC_FAILED).into_response()
        }
    }
}

async fn index_handler(State(state): State<Arc<AppState>>) -> Response {
    serve_file(&state.dist_dir.join("index.html")).await
}

async fn static_file_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(file): AxumPath<String>,
) -> Response {
    match safe_relative(&file) {
        Some(relative) => serve_file(&state.dist_dir.join(relative)).await,
        None => {
            warn!(path = %file, "rejected static path");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// `None` for anything other than plain relative path components.
fn safe_relative(requested: &str) -> Option<&Path> {
    let path = Path::new(requested);
    let plain = path
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (plain && !requested.is_empty() && !requested.contains('\\')).then_some(path)
}

async fn serve_file(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, content_type(path))], bytes).into_response(),
        Err(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn not_available(err: impl std::fmt::Display) -> Response {
    error!(error = %err, "snapshot read failed");
    (StatusCode::INTERNAL_SERVER_ERROR, DATA_NOT_AVAILABLE).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use roster_adapters::{CellRange, MemorySheetSource, SourceError, SpreadsheetSource};
    use roster_core::{PROCESSED, TIMESTAMP};
    use roster_sync::PartitionRegistry;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeVerifier {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenVerifier for FakeVerifier {
        async fn verify(&self, token: &str) -> Result<String, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match token {
                "good-token" => Ok("alice@g.hmc.edu".into()),
                _ => Err(AuthError::Rejected("unknown token".into())),
            }
        }
    }

    fn roster() -> RecordCollection {
        let mut collection = RecordCollection::new();
        collection.insert_partition(
            "2020",
            vec![
                Record::from_pairs([
                    (TIMESTAMP, "t1"),
                    (PROCESSED, "t1"),
                    ("rawName", "Alice A."),
                    ("rawEmail", "alice@g.hmc.edu"),
                    ("name", "Alice"),
                    ("email", "alice@hmc.edu"),
                    ("org", "JPL"),
                    ("orgLat", "34.2"),
                    ("orgLong", "-118.17"),
                    ("summerPlans", ""),
                    ("summerOrg", ""),
                    ("summerCity", ""),
                    ("phoneNumber", "555-0100"),
                ]),
                Record::from_pairs([
                    (TIMESTAMP, "t2"),
                    (PROCESSED, ""),
                    ("rawName", " Bob "),
                    ("rawEmail", "bob@g.hmc.edu"),
                    ("name", ""),
                ]),
            ],
        );
        collection
    }

    struct Fixture {
        _dir: TempDir,
        state: AppState,
        verifier: Arc<FakeVerifier>,
    }

    async fn fixture(admin_enabled: bool, with_snapshot: bool) -> Fixture {
        let dir = tempdir().expect("tempdir");
        let dist = dir.path().join("dist");
        std::fs::create_dir_all(&dist).expect("dist");
        std::fs::write(dist.join("index.html"), "<html>roster</html>").expect("index");
        std::fs::write(dist.join("main.js"), "console.log(1)").expect("js");
        std::fs::write(dir.path().join("secret.txt"), "nope").expect("secret");

        let store = SnapshotStore::new(dir.path().join("responses.json"));
        if with_snapshot {
            store.write(&roster()).await.expect("snapshot");
        }
        let verifier = Arc::new(FakeVerifier::default());
        let state = AppState {
            store,
            cache: IdentityCache::in_memory(Duration::from_secs(500)),
            verifier: verifier.clone(),
            dist_dir: dist,
            admin_enabled,
            engine: None,
        };
        Fixture {
            _dir: dir,
            state,
            verifier,
        }
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.oneshot(request).await.expect("response");
        let status = resp.status();
        let body = resp.into_body().collect().await.expect("body").to_bytes();
        (status, body.to_vec())
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).expect("request")
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn public_view_hides_pending_and_private_fields() {
        let fx = fixture(false, true).await;
        let (status, body) = send(app(fx.state), get_req("/api/v1/responses")).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        let records = json["2020"].as_array().expect("partition");
        assert_eq!(records.len(), 1);
        let alice = &records[0];
        assert_eq!(alice["name"], "Alice");
        assert_eq!(alice["orgLat"], 34.2);
        assert!(alice.get("email").is_none());
        assert!(alice.get("rawName").is_none());
        assert!(alice.get("phoneNumber").is_none());
        assert!(alice.get("summerCity").is_none());
    }

    #[tokio::test]
    async fn missing_snapshot_is_data_not_available() {
        let fx = fixture(false, false).await;
        let (status, body) = send(app(fx.state), get_req("/api/v1/responses")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, DATA_NOT_AVAILABLE.as_bytes());
    }

    #[tokio::test]
    async fn member_view_requires_valid_token() {
        let fx = fixture(false, true).await;
        let router = app(fx.state);

        let (status, body) = send(
            router.clone(),
            post_json("/api/v1/data", serde_json::json!({"oauthToken": "stolen"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, BAD_TOKEN.as_bytes());

        let (status, _) = send(router, post_json("/api/v1/data", serde_json::json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn member_view_includes_contact_fields_and_caches_identity() {
        let fx = fixture(false, true).await;
        let router = app(fx.state);
        let request = || post_json("/api/v1/data", serde_json::json!({"oauthToken": "good-token"}));

        let (status, body) = send(router.clone(), request()).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["email"], "alice@g.hmc.edu");
        let alice = &json["responses"]["2020"][0];
        assert_eq!(alice["email"], "alice@hmc.edu");
        assert_eq!(alice["phoneNumber"], "555-0100");
        assert!(alice.get("rawEmail").is_none());

        let (status, _) = send(router, request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_tokens_are_verified_every_time() {
        let fx = fixture(false, true).await;
        let router = app(fx.state);
        for _ in 0..2 {
            let (status, _) = send(
                router.clone(),
                post_json("/api/v1/data", serde_json::json!({"oauthToken": "stolen"})),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn admin_routes_are_absent_unless_enabled() {
        let fx = fixture(false, true).await;
        let (status, _) = send(app(fx.state), get_req("/api/v1/admin/data")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn admin_view_prefills_pending_records() {
        let fx = fixture(true, true).await;
        let (status, body) = send(app(fx.state), get_req("/api/v1/admin/data")).await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        let records = json["2020"].as_array().expect("partition");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["rawName"], "Alice A.");
        assert_eq!(records[1]["name"], "Bob");
        assert_eq!(records[1]["email"], "bob@hmc.edu");
    }

    #[tokio::test]
    async fn admin_save_replaces_snapshot() {
        let fx = fixture(true, true).await;
        let store = fx.state.store.clone();
        let mut edited = roster();
        edited.insert_partition(
            "2021",
            vec![Record::from_pairs([(TIMESTAMP, "t3"), (PROCESSED, "t3")])],
        );
        let payload = serde_json::to_value(&edited).expect("payload");

        let (status, body) = send(app(fx.state), post_json("/api/v1/admin/data", payload)).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["records"], 3);
        assert_eq!(store.read().await.expect("snapshot"), edited);
    }

    #[tokio::test]
    async fn serves_frontend_and_blocks_traversal() {
        let fx = fixture(false, true).await;
        let router = app(fx.state);

        let (status, body) = send(router.clone(), get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<html>roster</html>");

        let resp = router
            .clone()
            .oneshot(get_req("/main.js"))
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers()[header::CONTENT_TYPE].to_str().expect("header"),
            "text/javascript; charset=utf-8"
        );

        let (status, _) = send(router, get_req("/..%2Fsecret.txt")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn only_plain_relative_paths_are_served() {
        assert!(safe_relative("main.js").is_some());
        assert!(safe_relative("../secret.txt").is_none());
        assert!(safe_relative("/etc/passwd").is_none());
        assert!(safe_relative("..\\secret.txt").is_none());
        assert!(safe_relative("").is_none());
    }

    fn sheet_row(cells: &[(&str, &str)]) -> Vec<String> {
        SCHEMA_V3
            .keys()
            .map(|key| {
                cells
                    .iter()
                    .find(|(k, _)| *k == key)
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default()
            })
            .collect()
    }

    struct SharedSheets(Arc<MemorySheetSource>);

    #[async_trait]
    impl SpreadsheetSource for SharedSheets {
        async fn fetch_rows(&self, worksheet: &str) -> Result<Vec<Vec<String>>, SourceError> {
            self.0.fetch_rows(worksheet).await
        }

        async fn write_range(
            &self,
            worksheet: &str,
            range: &CellRange,
            rows: &[Vec<String>],
        ) -> Result<(), SourceError> {
            self.0.write_range(worksheet, range, rows).await
        }
    }

    fn attach_engine(state: &mut AppState, sheet: Vec<Vec<String>>) -> Arc<MemorySheetSource> {
        let source = Arc::new(MemorySheetSource::new(BTreeMap::from([(
            "2020".to_string(),
            sheet,
        )])));
        state.engine = Some(Arc::new(SyncEngine::new(
            PartitionRegistry::from_keys(["2020"]),
            Box::new(SharedSheets(source.clone())),
            state.store.clone(),
        )));
        source
    }

    fn live_sheet() -> Vec<Vec<String>> {
        vec![
            SCHEMA_V3.headers().map(str::to_string).collect(),
            sheet_row(&[(TIMESTAMP, "t1"), (PROCESSED, "t1"), ("rawName", "Alice")]),
            sheet_row(&[(TIMESTAMP, "t2"), ("rawName", "Bob")]),
        ]
    }

    #[tokio::test]
    async fn admin_download_refreshes_snapshot_from_sheet() {
        let mut fx = fixture(true, false).await;
        attach_engine(&mut fx.state, live_sheet());
        let store = fx.state.store.clone();
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/admin/download")
            .body(Body::empty())
            .expect("request");

        let (status, body) = send(app(fx.state), request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["records"], 2);
        assert_eq!(json["new_attention"], serde_json::json!(["Bob"]));
        let published = store.read().await.expect("snapshot");
        assert_eq!(published.record_count(), 2);
    }

    #[tokio::test]
    async fn admin_upload_writes_annotations_back() {
        let mut fx = fixture(true, false).await;
        let source = attach_engine(&mut fx.state, live_sheet());
        let mut edited = RecordCollection::new();
        edited.insert_partition(
            "2020",
            vec![
                SCHEMA_V3.map_row(&live_sheet()[1]),
                Record::from_pairs([(TIMESTAMP, "t2"), (PROCESSED, "t2"), ("name", "Bob")]),
            ],
        );
        fx.state.store.write(&edited).await.expect("write");

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/admin/upload")
            .body(Body::empty())
            .expect("request");
        let (status, body) = send(app(fx.state), request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["rows"], 2);

        let grid = source.worksheet("2020").await.expect("sheet");
        let records = SCHEMA_V3.map_rows("2020", &grid).expect("header intact");
        assert_eq!(records[1].text("rawName"), "Bob");
        assert_eq!(records[1].text("name"), "Bob");
        assert!(records[1].is_processed());
    }

    #[tokio::test]
    async fn admin_sync_failures_are_generic_500s() {
        let mut fx = fixture(true, false).await;
        let mut drifted = live_sheet();
        drifted[0].remove(5);
        attach_engine(&mut fx.state, drifted);
        let router = app(fx.state);

        for uri in ["/api/v1/admin/download", "/api/v1/admin/upload"] {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .expect("request");
            let (status, body) = send(router.clone(), request).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            assert_eq!(body, SYNC_FAILED.as_bytes());
        }
    }

    #[tokio::test]
    async fn admin_sync_routes_need_admin_flag_and_engine() {
        let fx = fixture(false, true).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/admin/download")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(app(fx.state), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let fx = fixture(true, true).await;
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/admin/upload")
            .body(Body::empty())
            .expect("request");
        let (status, _) = send(app(fx.state), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
