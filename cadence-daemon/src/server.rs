//! Live-reload dev server.
//!
//! | Route                  | Serves                                          |
//! |------------------------|-------------------------------------------------|
//! | `/__cadence/events`    | SSE stream, one `reload` event per rebuild      |
//! | `/__cadence/client.js` | EventSource client calling `location.reload()`  |
//! | anything else          | the output directory                            |
//!
//! HTML responses get the client `<script>` injected before `</body>` on the
//! way out; files on disk are never modified.

use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::stream::{Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tower_http::services::ServeDir;

use cadence_core::{Registry, TaskError};

use crate::error::DaemonError;

pub const EVENTS_PATH: &str = "/__cadence/events";
pub const CLIENT_PATH: &str = "/__cadence/client.js";

const CLIENT_TAG: &str = r#"<script src="/__cadence/client.js"></script>"#;

const CLIENT_JS: &str = r#"(function () {
  var source = new EventSource("/__cadence/events");
  source.addEventListener("reload", function () {
    window.location.reload();
  });
})();
"#;

/// Fan-out handle for reload notifications.
#[derive(Debug, Clone)]
pub struct Reloader {
    tx: broadcast::Sender<u64>,
    seq: Arc<AtomicU64>,
}

impl Default for Reloader {
    fn default() -> Self {
        Self::new()
    }
}

impl Reloader {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<u64> {
        self.tx.subscribe()
    }

    /// Notify every connected browser. Returns how many were listening;
    /// zero is fine.
    pub fn reload(&self) -> usize {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let listeners = self.tx.send(seq).unwrap_or(0);
        tracing::info!(listeners, "reload");
        listeners
    }
}

/// Register the `reload` task.
pub fn register_reload(registry: &mut Registry, reloader: Reloader) -> Result<(), TaskError> {
    registry.register("reload", move || {
        let reloader = reloader.clone();
        async move {
            reloader.reload();
            Ok(())
        }
    })?;
    registry.describe("reload", "Tell connected browsers to reload");
    Ok(())
}

#[derive(Clone)]
struct ServerState {
    reloader: Reloader,
    cancel: CancellationToken,
}

/// Router serving `output_dir` with live reload. Event streams end when
/// `cancel` fires so graceful shutdown is not held open by browsers.
pub fn router(output_dir: &Path, reloader: Reloader, cancel: CancellationToken) -> Router {
    Router::new()
        .route(EVENTS_PATH, get(events))
        .route(CLIENT_PATH, get(client_js))
        .fallback_service(ServeDir::new(output_dir))
        .layer(middleware::from_fn(inject_client))
        .with_state(ServerState { reloader, cancel })
}

/// Bind `host:port`. Port 0 picks a free port.
pub async fn bind(host: &str, port: u16) -> Result<TcpListener, DaemonError> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .map_err(|source| DaemonError::Bind { addr, source })
}

/// Serve `app` until `cancel` fires.
pub async fn serve(listener: TcpListener, app: Router, cancel: CancellationToken) -> Result<(), DaemonError> {
    let addr = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!("serving at http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|source| DaemonError::Serve { addr, source })
}

async fn client_js() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/javascript; charset=utf-8")], CLIENT_JS)
}

async fn events(State(state): State<ServerState>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(reload_stream(state.reloader.subscribe(), state.cancel)).keep_alive(KeepAlive::default())
}

fn reload_stream(
    rx: broadcast::Receiver<u64>,
    cancel: CancellationToken,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx)
        .filter_map(|msg| async move {
            let seq = match msg {
                Ok(seq) => seq,
                // A lagging browser still only needs one reload.
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "reload stream lagged");
                    0
                }
            };
            Some(Ok(Event::default().event("reload").id(seq.to_string()).data("reload")))
        })
        .take_until(async move { cancel.cancelled().await })
}

async fn inject_client(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "could not buffer HTML response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let html = inject_client_tag(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the client tag before the last `</body>`, or append it.
pub fn inject_client_tag(html: &str) -> String {
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{CLIENT_TAG}{}", &html[..at], &html[at..]),
        None => format!("{html}{CLIENT_TAG}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("index.html"),
            "<html><body><h1>hi</h1></body></html>",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("styles")).unwrap();
        std::fs::write(dir.path().join("styles/style.css"), "body{margin:0}").unwrap();
        dir
    }

    fn server(dir: &TempDir) -> TestServer {
        TestServer::new(router(dir.path(), Reloader::new(), CancellationToken::new())).unwrap()
    }

    #[test]
    fn injects_before_closing_body() {
        assert_eq!(
            inject_client_tag("<p>x</p></BODY></html>"),
            format!("<p>x</p>{CLIENT_TAG}</BODY></html>")
        );
        assert_eq!(inject_client_tag("<p>x</p>"), format!("<p>x</p>{CLIENT_TAG}"));
    }

    #[tokio::test]
    async fn html_is_served_with_client_tag() {
        let dir = site();
        let response = server(&dir).get("/index.html").await;
        response.assert_status_ok();
        let body = response.text();
        assert!(body.contains(&format!("<h1>hi</h1>{CLIENT_TAG}</body>")), "{body}");

        let on_disk = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
        assert!(!on_disk.contains("__cadence"));
    }

    #[tokio::test]
    async fn directory_index_is_served() {
        let dir = site();
        let response = server(&dir).get("/").await;
        response.assert_status_ok();
        assert!(response.text().contains(CLIENT_TAG));
    }

    #[tokio::test]
    async fn other_files_pass_through() {
        let dir = site();
        let response = server(&dir).get("/styles/style.css").await;
        response.assert_status_ok();
        assert_eq!(response.text(), "body{margin:0}");
    }

    #[tokio::test]
    async fn client_script_is_served() {
        let dir = site();
        let response = server(&dir).get(CLIENT_PATH).await;
        response.assert_status_ok();
        assert!(response.text().contains("new EventSource(\"/__cadence/events\")"));
    }

    #[tokio::test]
    async fn missing_files_are_404() {
        let dir = site();
        server(&dir).get("/nope.html").await.assert_status_not_found();
    }

    #[test]
    fn reload_without_listeners_is_fine() {
        assert_eq!(Reloader::new().reload(), 0);
    }

    #[tokio::test]
    async fn reload_stream_emits_and_ends_on_cancel() {
        let reloader = Reloader::new();
        let cancel = CancellationToken::new();
        let stream = reload_stream(reloader.subscribe(), cancel.clone());
        tokio::pin!(stream);

        assert_eq!(reloader.reload(), 1);
        assert!(stream.next().await.is_some());

        cancel.cancel();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn reload_task_notifies_subscribers() {
        let reloader = Reloader::new();
        let mut rx = reloader.subscribe();
        let mut registry = Registry::new();
        register_reload(&mut registry, reloader).unwrap();

        let executor = cadence_core::Executor::new(Arc::new(registry));
        executor.run_task("reload").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), 1);
    }
}
