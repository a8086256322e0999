//! Mock daemon: axum HTTP router over a Unix domain socket.
//!
//! Stands in for a real daemon in transport tests. Each [`MockDaemon`] owns a
//! temp directory holding its socket, so parallel tests never collide.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use tempfile::TempDir;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// `Api-Version` header sent by `/_ping`.
pub const API_VERSION: &str = "1.47";

/// How long `/slow/{id}` waits before answering.
pub const SLOW_DELAY: Duration = Duration::from_millis(50);

/// Shared state for the mock routes.
#[derive(Debug, Default)]
pub struct MockState {
    hits: AtomicUsize,
}

impl MockState {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Build the mock router.
///
/// | Route | Behaviour |
/// |-------|-----------|
/// | `GET/HEAD /_ping` | `OK` with an `Api-Version` header |
/// | `GET /slow/{id}` | waits [`SLOW_DELAY`], answers `slow-{id}` |
/// | `POST/PUT /echo` | echoes body and content type |
/// | `GET /close` | answers `bye` with `Connection: close` |
/// | `DELETE /items/{id}` | `204 No Content` |
pub fn router(state: Arc<MockState>) -> axum::Router {
    axum::Router::new()
        .route("/_ping", get(handle_ping).head(handle_ping))
        .route("/slow/{id}", get(handle_slow))
        .route("/echo", post(handle_echo).put(handle_echo))
        .route("/close", get(handle_close))
        .route("/items/{id}", delete(handle_delete))
        .with_state(state)
}

/// An HTTP daemon listening on a Unix socket in a temp directory.
///
/// The server task is stopped and the directory removed on drop.
pub struct MockDaemon {
    socket_path: PathBuf,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
    _temp_dir: TempDir,
}

impl MockDaemon {
    /// Bind the socket and start serving. The socket accepts connections
    /// as soon as this returns.
    pub async fn start() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let socket_path = temp_dir.path().join("daemon.sock");
        let listener = UnixListener::bind(&socket_path).expect("failed to bind mock socket");

        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = served {
                tracing::warn!(error = %e, "Mock daemon stopped with error");
            }
        });

        tracing::debug!(path = %socket_path.display(), "Mock daemon listening");
        Self {
            socket_path,
            state,
            shutdown: Some(shutdown_tx),
            handle,
            _temp_dir: temp_dir,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Requests handled so far.
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

impl Drop for MockDaemon {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

// ── Route handlers ──────────────────────────────────────────────────────

async fn handle_ping(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hit();
    (
        [
            ("api-version", API_VERSION),
            ("content-type", "text/plain; charset=utf-8"),
        ],
        "OK",
    )
}

async fn handle_slow(
    State(state): State<Arc<MockState>>,
    UrlPath(id): UrlPath<String>,
) -> String {
    state.hit();
    tokio::time::sleep(SLOW_DELAY).await;
    format!("slow-{id}")
}

async fn handle_echo(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    state.hit();
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));
    ([(header::CONTENT_TYPE, content_type)], body)
}

async fn handle_close(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hit();
    ([(header::CONNECTION, "close")], "bye")
}

async fn handle_delete(
    State(state): State<Arc<MockState>>,
    UrlPath(_id): UrlPath<String>,
) -> StatusCode {
    state.hit();
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_ping_route() {
        let state = Arc::new(MockState::default());
        let app = router(Arc::clone(&state));
        let req = Request::get("/_ping").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()["api-version"], API_VERSION);

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"OK");
        assert_eq!(state.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_echo_route_keeps_content_type() {
        let app = router(Arc::new(MockState::default()));
        let req = Request::post("/echo")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"a":1}"#))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()["content-type"], "application/json");

        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], br#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_slow_route() {
        let app = router(Arc::new(MockState::default()));
        let req = Request::get("/slow/7").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"slow-7");
    }

    #[tokio::test]
    async fn test_daemon_binds_socket() {
        let daemon = MockDaemon::start().await;
        assert!(daemon.socket_path().exists());
        assert_eq!(daemon.hits(), 0);
    }
}
