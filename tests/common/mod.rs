//! Common test utilities: spawns the real service on an ephemeral port and
//! a stub upstream source that serves configurable payloads.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use tempfile::TempDir;

use model_registry::api::routes::create_router;
use model_registry::api::{AppState, SharedState};
use model_registry::config::{DEFAULT_ALLOWED_HOSTS, DEFAULT_MODEL_EXTENSIONS};
use model_registry::db;
use model_registry::Config;

/// A running service instance over a temporary model tree.
pub struct TestApp {
    pub base_url: String,
    pub base_dir: TempDir,
    pub state: SharedState,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn model_path(&self, rel: &str) -> std::path::PathBuf {
        self.base_dir.path().join(rel)
    }
}

/// Spawn the service with default test settings.
pub async fn spawn_app() -> TestApp {
    spawn_app_with_idle_timeout(30).await
}

/// Spawn the service with a custom download idle timeout.
pub async fn spawn_app_with_idle_timeout(idle_timeout_secs: u64) -> TestApp {
    let base_dir = TempDir::new().expect("temp dir");

    let config = Config {
        base_path: base_dir.path().to_path_buf(),
        bind_address: "127.0.0.1:0".into(),
        log_level: "info".into(),
        database_path: None,
        allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect(),
        allowed_extensions: DEFAULT_MODEL_EXTENSIONS
            .iter()
            .map(|s| s.to_string())
            .collect(),
        idle_timeout_secs,
    };

    let pool = db::create_pool(&config.database_path())
        .await
        .expect("catalog pool");
    let state = Arc::new(AppState::new(config, pool).expect("app state"));

    let app = create_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        base_dir,
        state,
    }
}

struct StubState {
    payload: Vec<u8>,
    chunk_delay: Duration,
    status: StatusCode,
    hits: Arc<AtomicUsize>,
    last_auth: Arc<Mutex<Option<String>>>,
    last_query: Arc<Mutex<Option<String>>>,
}

/// A stub upstream model source.
pub struct UpstreamStub {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
    pub last_auth: Arc<Mutex<Option<String>>>,
    pub last_query: Arc<Mutex<Option<String>>>,
}

impl UpstreamStub {
    /// URL of a file served by the stub.
    pub fn file_url(&self, name: &str) -> String {
        format!("http://{}/files/{}", self.addr, name)
    }

    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn seen_auth(&self) -> Option<String> {
        self.last_auth.lock().unwrap().clone()
    }

    pub fn seen_query(&self) -> Option<String> {
        self.last_query.lock().unwrap().clone()
    }
}

/// Spawn a stub source serving `payload` for any file path.
pub async fn spawn_upstream(payload: Vec<u8>) -> UpstreamStub {
    spawn_upstream_with(payload, Duration::ZERO, StatusCode::OK).await
}

/// Spawn a stub source with a per-chunk delay and response status.
pub async fn spawn_upstream_with(
    payload: Vec<u8>,
    chunk_delay: Duration,
    status: StatusCode,
) -> UpstreamStub {
    let hits = Arc::new(AtomicUsize::new(0));
    let last_auth = Arc::new(Mutex::new(None));
    let last_query = Arc::new(Mutex::new(None));

    let state = Arc::new(StubState {
        payload,
        chunk_delay,
        status,
        hits: hits.clone(),
        last_auth: last_auth.clone(),
        last_query: last_query.clone(),
    });

    let app = Router::new()
        .route("/files/*name", get(serve_stub_file))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub listener");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub server");
    });

    UpstreamStub {
        addr,
        hits,
        last_auth,
        last_query,
    }
}

async fn serve_stub_file(
    State(state): State<Arc<StubState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_auth.lock().unwrap() = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    *state.last_query.lock().unwrap() = query;

    if !state.status.is_success() {
        return (state.status, r#"{"error":"denied"}"#).into_response();
    }

    if state.chunk_delay.is_zero() {
        return state.payload.clone().into_response();
    }

    // Slow chunked body so concurrent clients can observe an in-flight fetch
    let chunk_size = (state.payload.len() / 4).max(1);
    let chunks: Vec<Bytes> = state
        .payload
        .chunks(chunk_size)
        .map(Bytes::copy_from_slice)
        .collect();
    let delay = state.chunk_delay;

    let stream = async_stream::stream! {
        for chunk in chunks {
            tokio::time::sleep(delay).await;
            yield Ok::<_, Infallible>(chunk);
        }
    };
    Body::from_stream(stream).into_response()
}

/// Parse an NDJSON body into JSON values.
pub fn parse_ndjson(body: &str) -> Vec<serde_json::Value> {
    body.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("valid NDJSON line"))
        .collect()
}

/// SHA-256 hex digest of a byte slice.
pub fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}
