//! Infrastructure layer for dap-web-bridge.
//!
//! The infrastructure layer handles all I/O: accepting WebSocket connections
//! from browsers, reaching the debug adapter, and reading the settings file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener for browser WebSocket connections
//! - Running the admission gate inside the WebSocket upgrade handshake
//! - Dialing or spawning the debug adapter for each admitted session
//! - Relaying framed DAP messages in both directions
//! - Creating, loading, and watching `settings.toml`
//! - Handling the graceful shutdown signal
//!
//! # What does NOT belong here?
//!
//! - The origin decision itself (that is `dap-core`)
//! - Snapshot swapping (that is the application layer)
//! - CLI parsing (that is done in `main.rs`)

pub mod backend;
pub mod dap_stream;
pub mod error;
pub mod session;
pub mod settings_file;
pub mod settings_watch;
pub mod ws_server;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use backend::{BackendConnector, NativeConnector};
pub use error::SessionError;
pub use ws_server::{run_server, BridgeServer};
