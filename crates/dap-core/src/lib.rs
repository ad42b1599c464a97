//! # dap-core
//!
//! Shared library for the DAP web bridge containing the Debug Adapter
//! Protocol framing codec, the immutable configuration snapshot, and the
//! origin gatekeeper.
//!
//! This crate is used by the bridge binary and by its tests.  It has zero
//! dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! A web page cannot open a raw TCP socket or start a local process.  The
//! bridge lets a browser-hosted debugger talk to a native debug adapter by
//! accepting a WebSocket from the page and forwarding every message to the
//! adapter, and every adapter reply back to the page.
//!
//! This crate (`dap-core`) is the pure foundation of that bridge.  It defines:
//!
//! - **`protocol`** – How DAP messages travel as bytes.  Each message is
//!   preceded by a `Content-Length` header and a blank line.  The codec turns
//!   a message body into those bytes, and turns an arbitrarily chunked byte
//!   stream back into message bodies.
//!
//! - **`domain`** – Pure decision logic with no I/O.  The `ConfigSnapshot` is
//!   an immutable copy of the origin allow-list and the backend selection;
//!   the gatekeeper decides whether a requesting origin may open a session.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `dap_core::FrameDecoder` instead of `dap_core::protocol::codec::FrameDecoder`.
pub use domain::origin::{evaluate, DenialReason, OriginDecision, OriginObserver};
pub use domain::snapshot::{BackendMode, ConfigSnapshot};
pub use protocol::codec::{encode_frame, Frame, FrameDecoder, FramingError};
