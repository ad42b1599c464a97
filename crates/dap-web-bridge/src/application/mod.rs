//! Application layer for dap-web-bridge.
//!
//! The application layer decides *what* happens to a connection request; the
//! infrastructure layer decides *how* bytes move.
//!
//! # Responsibilities
//!
//! - Holding the current configuration snapshot and swapping it on reload
//! - Admitting or rejecting a WebSocket upgrade (path check + origin gate)
//! - Reporting every origin decision to an observer
//!
//! # What does NOT belong here?
//!
//! - Opening sockets, spawning processes, or reading files
//! - Tokio task spawning
//! - WebSocket framing (handled by tokio-tungstenite)

pub mod admission;
pub mod observer;
pub mod snapshot_store;

pub use admission::{Admission, AdmissionGate, Rejection};
pub use observer::LoggingObserver;
pub use snapshot_store::{SnapshotSource, SnapshotStore};
