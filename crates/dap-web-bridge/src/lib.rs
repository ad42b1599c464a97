//! dap-web-bridge library crate.
//!
//! This crate provides a local gateway that lets a browser-hosted debugger
//! talk to a native Debug Adapter Protocol (DAP) backend.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser (WebSocket messages, one DAP message each)
//!         ↕
//! [dap-web-bridge]
//!   ├── domain/            BridgeConfig, settings file schema
//!   ├── application/       Snapshot store, handshake admission, decision observer
//!   └── infrastructure/
//!         ├── ws_server/      Accept loop + WebSocket upgrade (tokio-tungstenite)
//!         ├── session/        Per-session duplex pump
//!         ├── backend/        TCP dial / process spawn
//!         ├── dap_stream/     Async framing over the backend byte stream
//!         ├── settings_file/  settings.toml on disk
//!         └── settings_watch/ Hot reload on file change
//!         ↕
//! Debug adapter (Content-Length framed DAP over TCP or stdio)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O, no async, no frameworks.
//! - `application` depends on `domain` and `dap-core` only.
//! - `infrastructure` depends on all other layers plus `tokio`,
//!   `tokio-tungstenite`, and `notify`.
//!
//! # For beginners: why this structure?
//!
//! The interesting decisions (who may connect, which snapshot is current)
//! live in `application` and `dap-core`, where they can be tested without
//! opening a socket.  The infrastructure layer only moves bytes.

/// Domain layer: configuration and settings types (no I/O).
pub mod domain;

/// Application layer: snapshot store and handshake admission.
pub mod application;

/// Infrastructure layer: server, sessions, backends, settings file.
pub mod infrastructure;
