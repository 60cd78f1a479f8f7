//! HTTP and WebSocket endpoints for live reload.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use pipekit_core::ReloadNotifier;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;

pub const PROTOCOL: &str = "http://livereload.com/protocols/official-7";
const SERVER_NAME: &str = "pipekit-reload";
const CHANNEL_CAPACITY: usize = 256;

/// Broadcasts reload messages to every connected client.
#[derive(Clone)]
pub struct LiveReloadHandle {
    tx: broadcast::Sender<String>,
    clients: Arc<AtomicUsize>,
}

impl Default for LiveReloadHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReloadHandle {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connected WebSocket clients.
    pub fn clients(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Receives every message broadcast after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Sends one reload command per file.
    pub fn reload<S: AsRef<str>>(&self, files: &[S]) {
        for file in files {
            let message = json!({
                "command": "reload",
                "path": file.as_ref(),
                "liveCSS": true,
            })
            .to_string();
            // No receivers just means nobody is connected.
            let _ = self.tx.send(message);
        }
    }
}

impl ReloadNotifier for LiveReloadHandle {
    fn notify(&self, changed: &[PathBuf]) {
        let files: Vec<String> = changed
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();
        info!("Live reload: {} file(s) changed", files.len());
        self.reload(&files);
    }
}

/// Creates the HTTP router.
pub fn create_router(handle: LiveReloadHandle) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/changed", get(changed).post(changed))
        .route("/livereload", get(websocket))
        .layer(TraceLayer::new_for_http())
        .with_state(handle)
}

/// A server running in the background.
pub struct RunningServer {
    pub handle: LiveReloadHandle,
    pub local_addr: SocketAddr,
    pub task: JoinHandle<()>,
}

/// Binds the listener and serves in a background task.
pub async fn start(config: &ServerConfig) -> std::io::Result<RunningServer> {
    let listener = TcpListener::bind(&config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    let handle = LiveReloadHandle::new();
    let app = create_router(handle.clone());

    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            warn!("live reload server stopped: {}", e);
        }
    });

    info!("Live reload server listening on {}", local_addr);
    Ok(RunningServer {
        handle,
        local_addr,
        task,
    })
}

/// GET /
async fn welcome() -> Json<serde_json::Value> {
    Json(json!({
        "tinylr": "Welcome",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ChangedQuery {
    files: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChangedBody {
    #[serde(default)]
    files: Vec<String>,
}

/// GET|POST /changed?files=a.css,b.js
///
/// A POST may also carry `{"files": [...]}` as its body.
async fn changed(
    State(handle): State<LiveReloadHandle>,
    Query(query): Query<ChangedQuery>,
    body: Option<Json<ChangedBody>>,
) -> Response {
    let mut files: Vec<String> = query
        .files
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();
    if let Some(Json(body)) = body {
        files.extend(body.files);
    }

    debug!(files = ?files, "changed request");
    handle.reload(&files);

    Json(json!({
        "clients": handle.clients(),
        "files": files,
    }))
    .into_response()
}

/// GET /livereload
async fn websocket(
    State(handle): State<LiveReloadHandle>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| client_session(socket, handle))
}

async fn client_session(socket: WebSocket, handle: LiveReloadHandle) {
    let (mut sender, mut receiver) = socket.split();
    let mut reloads = handle.subscribe();

    let hello = json!({
        "command": "hello",
        "protocols": [PROTOCOL],
        "serverName": SERVER_NAME,
    })
    .to_string();
    if sender.send(Message::Text(hello)).await.is_err() {
        return;
    }

    let connected = handle.clients.fetch_add(1, Ordering::SeqCst) + 1;
    debug!(clients = connected, "live reload client connected");

    let mut forward = tokio::spawn(async move {
        loop {
            match reloads.recv().await {
                Ok(message) => {
                    if sender.send(Message::Text(message)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("live reload client lagged, {} message(s) dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut inbound = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Close(_) => break,
                Message::Text(text) => debug!("client message: {}", text),
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut forward => inbound.abort(),
        _ = &mut inbound => forward.abort(),
    }

    let remaining = handle.clients.fetch_sub(1, Ordering::SeqCst) - 1;
    debug!(clients = remaining, "live reload client disconnected");
}
