//! Per-session error taxonomy.
//!
//! Every variant ends exactly one session; none of them affect the accept
//! loop or other sessions.  An origin denial is not an error at all: it is
//! an ordinary [`dap_core::OriginDecision`] handled during the handshake.

use dap_core::FramingError;
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::infrastructure::backend::BackendConnectError;

/// Why a session ended abnormally.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The debug adapter could not be reached; bridging never started.
    #[error("backend connection failed: {0}")]
    BackendConnect(#[from] BackendConnectError),

    /// The adapter sent bytes that are not valid DAP framing.
    #[error("framing error on backend stream: {0}")]
    Framing(#[from] FramingError),

    /// Reading from or writing to the browser's WebSocket failed.
    #[error("WebSocket transport error: {0}")]
    WebSocket(#[from] WsError),

    /// Reading from or writing to the adapter failed.
    #[error("backend I/O error: {0}")]
    BackendIo(#[from] std::io::Error),
}

impl SessionError {
    /// Close code sent to the browser when this error ends the session.
    pub fn close_code(&self) -> CloseCode {
        CloseCode::Error
    }

    /// Short label for log records.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::BackendConnect(_) => "backend_connect",
            SessionError::Framing(_) => "framing",
            SessionError::WebSocket(_) | SessionError::BackendIo(_) => "transport",
        }
    }
}
