//! Domain entities for the DAP web bridge.
//!
//! This module contains pure decision logic with no infrastructure
//! dependencies.
//!
//! # What lives here? (for beginners)
//!
//! Everything in `domain` can be compiled and tested without a network stack,
//! a file system, or an async runtime:
//!
//! - [`snapshot::ConfigSnapshot`] is an immutable copy of the settings that
//!   decide who may connect and which debug adapter a session talks to.
//! - [`origin::evaluate`] is the gatekeeper: given a snapshot and the `Origin`
//!   a browser declared, it returns an [`origin::OriginDecision`].
//!
//! The bridge crate wraps these in I/O: it loads snapshots from disk, swaps
//! them atomically on reload, and calls `evaluate` during the WebSocket
//! handshake.

/// Immutable configuration snapshot and backend selection.
pub mod snapshot;

/// Origin gatekeeper.
pub mod origin;
