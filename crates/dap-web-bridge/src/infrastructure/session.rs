//! Session pump: one admitted WebSocket bridged to one debug adapter.
//!
//! # Lifecycle
//!
//! ```text
//! Handshaking ──(origin allowed, backend reached)──▶ Bridging ──▶ Closed
//!      │                                                            ▲
//!      └────────────(denied, or backend unreachable)────────────────┘
//! ```
//!
//! The handshake itself runs in `ws_server`; this module starts once the
//! upgrade has been accepted.  It asks the [`BackendConnector`] for a
//! [`DuplexStream`] using the backend named in the admission snapshot, then
//! runs two relays as separate Tokio tasks:
//!
//! - **client → backend**: each WebSocket text or binary message becomes one
//!   framed DAP message on the backend's writable half.
//! - **backend → client**: the backend's readable half is decoded frame by
//!   frame; each body becomes one WebSocket message (text when the body is
//!   UTF-8, binary otherwise).
//!
//! When either relay finishes, for any reason, the other one is aborted.
//! Aborting drops the halves it owns, which closes them; the adapter is then
//! released through its [`BackendLifetime`] and the browser receives a single
//! Close frame.  Every exit path goes through the same teardown.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::application::Admission;
use crate::infrastructure::backend::{BackendConnector, BackendWriter, DuplexStream};
use crate::infrastructure::dap_stream::{write_frame, FrameReader};
use crate::infrastructure::error::SessionError;

/// Where a session is in its lifecycle; used in log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Handshaking,
    Bridging,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionPhase::Handshaking => "handshaking",
            SessionPhase::Bridging => "bridging",
            SessionPhase::Closed => "closed",
        })
    }
}

/// Which side ended a session that closed without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The browser closed the WebSocket.
    ClientClosed,
    /// The adapter closed its stream at a frame boundary.
    BackendClosed,
}

type WsSink<S> = Arc<Mutex<SplitSink<WebSocketStream<S>, WsMessage>>>;

/// Runs one session to completion.
///
/// `ws` must be an accepted WebSocket whose handshake passed the admission
/// gate; `admission` carries the snapshot that selects the backend.
///
/// # Errors
///
/// Returns the [`SessionError`] that ended the session.  The WebSocket and
/// the backend are closed before this function returns, on every path.
pub async fn run_session<S>(
    ws: WebSocketStream<S>,
    admission: Admission,
    connector: &dyn BackendConnector,
    max_frame_bytes: usize,
    session_id: Uuid,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let backend = admission.snapshot.backend();
    let (ws_tx, ws_rx) = ws.split();
    let ws_tx: WsSink<S> = Arc::new(Mutex::new(ws_tx));

    let duplex = match connector.connect(backend).await {
        Ok(duplex) => duplex,
        Err(e) => {
            warn!(%session_id, %backend, "debug adapter unavailable: {e}");
            send_close(&ws_tx, CloseCode::Error, "debug adapter unavailable").await;
            debug!(%session_id, phase = %SessionPhase::Closed, "session closed before bridging");
            return Err(e.into());
        }
    };

    info!(
        %session_id,
        origin = %admission.origin,
        label = %admission.session_label,
        %backend,
        phase = %SessionPhase::Bridging,
        "session bridging"
    );

    let result = bridge(duplex, ws_tx, ws_rx, max_frame_bytes, session_id).await;
    debug!(%session_id, phase = %SessionPhase::Closed, "session resources released");
    result
}

/// Runs both relays until one ends, then tears down the other, closes the
/// WebSocket, and finally releases the backend.
async fn bridge<S>(
    duplex: DuplexStream,
    ws_tx: WsSink<S>,
    ws_rx: SplitStream<WebSocketStream<S>>,
    max_frame_bytes: usize,
    session_id: Uuid,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (backend_rx, backend_tx, lifetime) = duplex.into_parts();

    let mut client_to_backend =
        tokio::spawn(relay_client_to_backend(ws_rx, backend_tx, session_id));
    let mut backend_to_client = tokio::spawn(relay_backend_to_client(
        FrameReader::new(backend_rx, max_frame_bytes),
        Arc::clone(&ws_tx),
        session_id,
    ));

    // Whichever relay finishes first decides the outcome; the other is
    // aborted, which drops and thereby closes the halves it owns.
    let result = tokio::select! {
        joined = &mut client_to_backend => {
            backend_to_client.abort();
            let _ = backend_to_client.await;
            flatten(joined)
        }
        joined = &mut backend_to_client => {
            client_to_backend.abort();
            let _ = client_to_backend.await;
            flatten(joined)
        }
    };

    // The browser hears about the end before a child adapter is given its
    // exit grace period.
    let (code, reason) = match &result {
        Ok(_) => (CloseCode::Normal, "session ended"),
        Err(e) => (e.close_code(), "debug session failed"),
    };
    send_close(&ws_tx, code, reason).await;
    lifetime.close().await;

    match &result {
        Ok(end) => debug!(%session_id, ?end, "relays stopped"),
        Err(e) => debug!(%session_id, kind = e.kind(), "relays stopped on error: {e}"),
    }
    result
}

fn flatten(
    joined: Result<Result<SessionEnd, SessionError>, JoinError>,
) -> Result<SessionEnd, SessionError> {
    match joined {
        Ok(result) => result,
        // Relays are only aborted by `bridge` after the select, so a join
        // error here means the relay panicked.
        Err(e) => Err(SessionError::BackendIo(std::io::Error::other(format!(
            "relay task failed: {e}"
        )))),
    }
}

// ── Relays ────────────────────────────────────────────────────────────────────

async fn relay_client_to_backend<S>(
    mut ws_rx: SplitStream<WebSocketStream<S>>,
    mut backend_tx: BackendWriter,
    session_id: Uuid,
) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(message) = ws_rx.next().await {
        let body: Vec<u8> = match message? {
            WsMessage::Text(text) => text.into_bytes(),
            WsMessage::Binary(bytes) => bytes,
            WsMessage::Close(frame) => {
                debug!(%session_id, ?frame, "browser sent Close");
                return Ok(SessionEnd::ClientClosed);
            }
            // Control frames are answered by tungstenite and never forwarded.
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => continue,
        };

        debug!(%session_id, bytes = body.len(), "client → backend");
        trace!(%session_id, payload = %String::from_utf8_lossy(&body), "client → backend payload");
        write_frame(&mut backend_tx, &body).await?;
    }
    debug!(%session_id, "browser stream ended");
    Ok(SessionEnd::ClientClosed)
}

async fn relay_backend_to_client<R, S>(
    mut frames: FrameReader<R>,
    ws_tx: WsSink<S>,
    session_id: Uuid,
) -> Result<SessionEnd, SessionError>
where
    R: AsyncRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(body) = frames.next_frame().await? {
        debug!(%session_id, bytes = body.len(), "backend → client");
        trace!(%session_id, payload = %String::from_utf8_lossy(&body), "backend → client payload");
        let message = match String::from_utf8(body) {
            Ok(text) => WsMessage::Text(text),
            Err(not_utf8) => WsMessage::Binary(not_utf8.into_bytes()),
        };
        ws_tx.lock().await.send(message).await?;
    }
    debug!(%session_id, "debug adapter closed its stream");
    Ok(SessionEnd::BackendClosed)
}

/// Sends a Close frame and closes the sink, ignoring errors from a peer that
/// is already gone.
async fn send_close<S>(ws_tx: &WsSink<S>, code: CloseCode, reason: &'static str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut sink = ws_tx.lock().await;
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
        trace!("Close frame not delivered: {e}");
    }
    let _ = sink.close().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::backend::{BackendConnectError, MockBackendConnector, NativeConnector};
    use dap_core::{BackendMode, ConfigSnapshot};
    use dap_core::protocol::DEFAULT_MAX_CONTENT_LENGTH;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream as MemPipe};
    use tokio_tungstenite::tungstenite::protocol::Role;

    const WAIT: Duration = Duration::from_secs(5);

    fn admission() -> Admission {
        Admission {
            origin: "https://ide.example".to_string(),
            session_label: "test".to_string(),
            snapshot: Arc::new(ConfigSnapshot::deny_all()),
        }
    }

    /// A server-side WebSocket for the session and the client side for the test.
    async fn ws_pair() -> (WebSocketStream<MemPipe>, WebSocketStream<MemPipe>) {
        let (server_io, client_io) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    /// A connector whose backend is an in-memory pipe; returns the far end.
    fn in_memory_backend() -> (MockBackendConnector, MemPipe) {
        let (bridge_side, adapter_side) = tokio::io::duplex(64 * 1024);
        let (read, write) = tokio::io::split(bridge_side);
        let stream = std::sync::Mutex::new(Some(DuplexStream::from_halves(read, write)));
        let mut connector = MockBackendConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(move |_| Ok(stream.lock().unwrap().take().unwrap()));
        (connector, adapter_side)
    }

    async fn expect_close(client: &mut WebSocketStream<MemPipe>) -> CloseCode {
        match tokio::time::timeout(WAIT, client.next()).await.expect("timed out") {
            Some(Ok(WsMessage::Close(Some(frame)))) => frame.code,
            Some(Ok(WsMessage::Close(None))) | None => panic!("closed without a close code"),
            Some(Ok(other)) => panic!("unexpected message {other:?}"),
            Some(Err(e)) => panic!("client error {e}"),
        }
    }

    #[tokio::test]
    async fn test_ping_is_framed_and_pong_is_delivered() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (connector, mut adapter) = in_memory_backend();
        let session = tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Act: the client sends "ping".
        client.send(WsMessage::Text("ping".to_string())).await.unwrap();
        let expected = b"Content-Length: 4\r\n\r\nping";
        let mut received = vec![0u8; expected.len()];
        tokio::time::timeout(WAIT, adapter.read_exact(&mut received))
            .await
            .unwrap()
            .unwrap();
        adapter.write_all(b"Content-Length: 4\r\n\r\npong").await.unwrap();
        let reply = tokio::time::timeout(WAIT, client.next()).await.unwrap();

        // Assert
        assert_eq!(received, expected);
        assert_eq!(reply.unwrap().unwrap(), WsMessage::Text("pong".to_string()));

        client.close(None).await.unwrap();
        let outcome = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), SessionEnd::ClientClosed);
    }

    #[tokio::test]
    async fn test_binary_messages_pass_through_unchanged() {
        let (server, mut client) = ws_pair().await;
        let (connector, mut adapter) = in_memory_backend();
        tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        client.send(WsMessage::Binary(vec![0xFF, 0x00])).await.unwrap();
        let mut received = vec![0u8; b"Content-Length: 2\r\n\r\n".len() + 2];
        adapter.read_exact(&mut received).await.unwrap();
        adapter.write_all(b"Content-Length: 1\r\n\r\n\xFE").await.unwrap();
        let reply = tokio::time::timeout(WAIT, client.next()).await.unwrap();

        assert_eq!(&received[received.len() - 2..], &[0xFF, 0x00]);
        assert_eq!(reply.unwrap().unwrap(), WsMessage::Binary(vec![0xFE]));
    }

    #[tokio::test]
    async fn test_messages_keep_their_order() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (connector, mut adapter) = in_memory_backend();
        tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Act: the adapter emits three frames in a single write.
        adapter
            .write_all(b"Content-Length: 1\r\n\r\n1Content-Length: 1\r\n\r\n2Content-Length: 1\r\n\r\n3")
            .await
            .unwrap();

        // Assert
        for expected in ["1", "2", "3"] {
            let message = tokio::time::timeout(WAIT, client.next()).await.unwrap();
            assert_eq!(message.unwrap().unwrap(), WsMessage::Text(expected.to_string()));
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_without_messages() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (connector, mut adapter) = in_memory_backend();
        let session = tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Act
        adapter.write_all(b"Content-Length: abc\r\n\r\n").await.unwrap();

        // Assert: the first thing the client sees is a Close frame.
        assert_eq!(expect_close(&mut client).await, CloseCode::Error);
        let outcome = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(SessionError::Framing(_))));
    }

    #[tokio::test]
    async fn test_backend_eof_closes_client_normally() {
        let (server, mut client) = ws_pair().await;
        let (connector, adapter) = in_memory_backend();
        let session = tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        drop(adapter);

        assert_eq!(expect_close(&mut client).await, CloseCode::Normal);
        let outcome = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), SessionEnd::BackendClosed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_is_closed_before_lingering_adapter_exits() {
        // Arrange: the adapter closes its stdout but keeps running, so
        // releasing it waits out the exit grace period.
        let (server, mut client) = ws_pair().await;
        let mut admission = admission();
        admission.snapshot = Arc::new(ConfigSnapshot::new(
            Default::default(),
            BackendMode::Spawn {
                program: std::path::PathBuf::from("sh"),
                args: vec!["-c".to_string(), "exec 1>&-; exec sleep 5".to_string()],
                working_dir: None,
            },
        ));
        let session = tokio::spawn(async move {
            run_session(server, admission, &NativeConnector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Act
        let code = tokio::time::timeout(Duration::from_secs(1), expect_close(&mut client)).await;

        // Assert: the Close frame does not wait for the adapter to exit.
        assert_eq!(code.expect("close frame was delayed"), CloseCode::Normal);
        let outcome = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
        assert_eq!(outcome.unwrap(), SessionEnd::BackendClosed);
    }

    #[tokio::test]
    async fn test_client_close_closes_backend() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let (connector, mut adapter) = in_memory_backend();
        let session = tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Act
        client.close(None).await.unwrap();

        // Assert: the adapter's read side reaches end of stream.
        let mut rest = Vec::new();
        tokio::time::timeout(WAIT, adapter.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());
        tokio::time::timeout(WAIT, session).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_backend_connect_failure_sends_error_close() {
        // Arrange
        let (server, mut client) = ws_pair().await;
        let mut connector = MockBackendConnector::new();
        connector.expect_connect().times(1).returning(|mode| {
            Err(BackendConnectError::Dial {
                address: mode.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            })
        });

        // Act
        let session = tokio::spawn(async move {
            run_session(server, admission(), &connector, DEFAULT_MAX_CONTENT_LENGTH, Uuid::new_v4())
                .await
        });

        // Assert
        assert_eq!(expect_close(&mut client).await, CloseCode::Error);
        let outcome = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
        assert!(matches!(outcome, Err(SessionError::BackendConnect(_))));
    }

    #[tokio::test]
    async fn test_session_uses_backend_from_admission_snapshot() {
        // Arrange
        let (server, _client) = ws_pair().await;
        let mode = BackendMode::Tcp {
            address: "127.0.0.1:9".to_string(),
        };
        let mut admission = admission();
        admission.snapshot = Arc::new(ConfigSnapshot::new(Default::default(), mode.clone()));
        let mut connector = MockBackendConnector::new();
        connector
            .expect_connect()
            .withf(move |m| *m == mode)
            .times(1)
            .returning(|_| {
                Err(BackendConnectError::MissingPipes(std::path::PathBuf::from("x")))
            });

        // Act
        let outcome = run_session(
            server,
            admission,
            &connector,
            DEFAULT_MAX_CONTENT_LENGTH,
            Uuid::new_v4(),
        )
        .await;

        // Assert: the mock's `withf` would have panicked on a different mode.
        assert!(outcome.is_err());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SessionPhase::Handshaking.to_string(), "handshaking");
        assert_eq!(SessionPhase::Bridging.to_string(), "bridging");
        assert_eq!(SessionPhase::Closed.to_string(), "closed");
    }
}
