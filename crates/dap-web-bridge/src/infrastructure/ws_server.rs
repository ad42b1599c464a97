//! WebSocket server: accept loop, upgrade admission, and session spawning.
//!
//! This module is responsible for:
//!
//! 1. Loading (or creating) the settings file and installing the first
//!    snapshot.
//! 2. Starting the settings watcher.
//! 3. Binding a TCP listener on the configured address.
//! 4. Running the [`AdmissionGate`] *inside* the WebSocket upgrade handshake,
//!    so a denied browser receives a plain HTTP 403 (or 404 for a wrong path)
//!    and never gets a WebSocket.
//! 5. Handing each admitted WebSocket to [`run_session`] in its own Tokio
//!    task.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! # Startup with a broken settings file
//!
//! If the settings file cannot be read or parsed at startup the bridge still
//! starts, with a deny-all snapshot.  Fixing the file is picked up by the
//! watcher without a restart.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use dap_core::ConfigSnapshot;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::{CONTENT_TYPE, ORIGIN};
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Error as WsError;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::{
    Admission, AdmissionGate, LoggingObserver, Rejection, SnapshotSource, SnapshotStore,
};
use crate::domain::config::BridgeConfig;
use crate::infrastructure::backend::{BackendConnector, NativeConnector};
use crate::infrastructure::session::{run_session, SessionEnd, SessionPhase};
use crate::infrastructure::settings_file::SettingsFile;
use crate::infrastructure::settings_watch::{watch_settings, SettingsWatcher, DEFAULT_DEBOUNCE};

/// How often the accept loop re-checks the `running` flag when idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Everything a session task needs, shared across all sessions.
struct SessionContext {
    gate: Arc<AdmissionGate>,
    connector: Arc<dyn BackendConnector>,
    max_frame_bytes: usize,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// A bound WebSocket listener ready to accept browser sessions.
pub struct BridgeServer {
    listener: TcpListener,
    context: Arc<SessionContext>,
    store: Option<Arc<SnapshotStore>>,
    _watcher: Option<SettingsWatcher>,
}

impl BridgeServer {
    /// Binds the listener with an explicit gate and connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot be bound (e.g., the port is
    /// already in use or the process lacks permission to bind).
    pub async fn bind(
        config: &BridgeConfig,
        gate: Arc<AdmissionGate>,
        connector: Arc<dyn BackendConnector>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| {
                format!("failed to bind WebSocket listener on {}", config.bind_addr)
            })?;

        Ok(Self {
            listener,
            context: Arc::new(SessionContext {
                gate,
                connector,
                max_frame_bytes: config.max_frame_bytes,
            }),
            store: None,
            _watcher: None,
        })
    }

    /// Wires the full bridge from `config`: settings file, snapshot store,
    /// settings watcher, logging observer, and the native backend connector.
    ///
    /// # Errors
    ///
    /// Returns an error only if the listener cannot be bound.  Settings
    /// problems are logged and leave the bridge denying every origin.
    pub async fn start(config: &BridgeConfig) -> anyhow::Result<Self> {
        let file = Arc::new(SettingsFile::new(&config.home_dir));
        if let Err(e) = file.ensure_exists() {
            warn!("could not create settings file: {e}");
        }

        let initial = match file.read_snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(
                    path = %file.path().display(),
                    "settings unusable, denying all origins until fixed: {e}"
                );
                ConfigSnapshot::deny_all()
            }
        };
        info!(
            enabled_origins = initial.enabled_origin_count(),
            backend = %initial.backend(),
            "initial settings loaded"
        );
        let store = Arc::new(SnapshotStore::new(initial));

        let watcher = match watch_settings(Arc::clone(&file), Arc::clone(&store), DEFAULT_DEBOUNCE)
        {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("settings hot reload disabled: {e}");
                None
            }
        };

        let gate = Arc::new(AdmissionGate::new(
            Arc::clone(&store),
            Arc::new(LoggingObserver),
            config.endpoint_prefix.clone(),
            file.path(),
        ));

        let mut server = Self::bind(config, gate, Arc::new(NativeConnector)).await?;
        server.store = Some(store);
        server._watcher = watcher;
        Ok(server)
    }

    /// Address the listener is bound to (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket address cannot be queried.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Snapshot store installed by [`BridgeServer::start`].
    pub fn store(&self) -> Option<&Arc<SnapshotStore>> {
        self.store.as_ref()
    }

    /// Runs the accept loop until `running` is set to `false`.
    ///
    /// Sessions already in progress are left to finish on their own.
    ///
    /// # Errors
    ///
    /// Currently never fails; accept errors are logged and the loop continues.
    pub async fn run(self, running: Arc<AtomicBool>) -> anyhow::Result<()> {
        match self.listener.local_addr() {
            Ok(addr) => info!("dap-web-bridge listening on ws://{addr}"),
            Err(e) => debug!("listening (address unavailable: {e})"),
        }

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // A short timeout lets the loop notice the shutdown flag while idle.
            match timeout(ACCEPT_POLL, self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("new connection from {peer_addr}");
                    let context = Arc::clone(&self.context);
                    tokio::spawn(handle_browser_session(stream, peer_addr, context));
                }
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }

        Ok(())
    }
}

/// Starts the bridge described by `config` and serves until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the WebSocket listener cannot be bound.
pub async fn run_server(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    BridgeServer::start(&config).await?.run(running).await
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each per-connection task; logs the outcome.
async fn handle_browser_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: Arc<SessionContext>,
) {
    let session_id = Uuid::new_v4();
    let span = info_span!("session", %session_id, %peer_addr);
    async move {
        match accept_and_bridge(stream, peer_addr, &context, session_id).await {
            Ok(Some(end)) => info!(?end, "session closed normally"),
            Ok(None) => debug!("upgrade rejected"),
            Err(e) => warn!("session closed with error: {e:#}"),
        }
    }
    .instrument(span)
    .await
}

/// Performs the gated upgrade and runs the session.  Returns `Ok(None)` when
/// the gate rejected the request.
async fn accept_and_bridge(
    stream: TcpStream,
    peer_addr: SocketAddr,
    context: &SessionContext,
    session_id: Uuid,
) -> anyhow::Result<Option<SessionEnd>> {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("could not set TCP_NODELAY: {e}");
    }
    debug!(phase = %SessionPhase::Handshaking, "upgrade requested");

    // The callback runs inside the handshake; the admission it produces is
    // handed back through this slot.
    let admitted: Arc<std::sync::Mutex<Option<Admission>>> = Arc::default();
    let slot = Arc::clone(&admitted);
    let gate = Arc::clone(&context.gate);
    let callback = move |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = declared_origin(req.headers());
        match gate.admit(req.uri().path(), origin.as_deref()) {
            Ok(admission) => {
                if let Ok(mut slot) = slot.lock() {
                    *slot = Some(admission);
                }
                Ok(response)
            }
            Err(rejection) => Err(rejection_response(&rejection)),
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(WsError::Http(response)) => {
            debug!(status = %response.status(), "handshake refused");
            return Ok(None);
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("WebSocket handshake failed with {peer_addr}")));
        }
    };

    let admission = admitted
        .lock()
        .ok()
        .and_then(|mut slot| slot.take())
        .context("handshake completed without an admission")?;

    let end = run_session(ws, admission, context.connector.as_ref(), context.max_frame_bytes, session_id)
        .await
        .with_context(|| format!("session with {peer_addr} failed"))?;
    Ok(Some(end))
}

/// The `Origin` header as text, or `None` when the browser sent none.
///
/// Bytes that are not valid UTF-8 are replaced, so such an origin is still
/// present and can never match an allow-list entry.
fn declared_origin(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ORIGIN)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}

/// Builds the HTTP response for a rejected upgrade.
fn rejection_response(rejection: &Rejection) -> ErrorResponse {
    let status = match rejection {
        Rejection::NotFound { .. } => StatusCode::NOT_FOUND,
        Rejection::Forbidden { .. } => StatusCode::FORBIDDEN,
    };
    let mut response = ErrorResponse::new(Some(rejection.body()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dap_core::DenialReason;

    #[test]
    fn test_not_found_maps_to_404() {
        // Arrange
        let rejection = Rejection::NotFound {
            path: "/other".to_string(),
        };

        // Act
        let response = rejection_response(&rejection);

        // Assert
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().as_deref().unwrap_or("").contains("/other"));
    }

    #[test]
    fn test_declared_origin_keeps_non_utf8_origin_present() {
        // Arrange: latin-1 "é" is not valid UTF-8
        let mut headers = HeaderMap::new();
        headers.insert(
            ORIGIN,
            HeaderValue::from_bytes(b"https://caf\xE9.example").unwrap(),
        );

        // Act
        let origin = declared_origin(&headers);

        // Assert: present, with the bad byte replaced
        assert_eq!(origin.as_deref(), Some("https://caf\u{FFFD}.example"));
    }

    #[test]
    fn test_declared_origin_missing_header_is_none() {
        // Arrange
        let headers = HeaderMap::new();

        // Act / Assert
        assert_eq!(declared_origin(&headers), None);
    }

    #[test]
    fn test_forbidden_maps_to_403_with_guidance() {
        let rejection = Rejection::Forbidden {
            origin: Some("https://evil.example".to_string()),
            reason: DenialReason::UnknownOrDisabled,
            guidance: "edit settings.toml".to_string(),
        };

        let response = rejection_response(&rejection);

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.body().as_deref(), Some("edit settings.toml"));
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
