//! Domain layer for dap-web-bridge.
//!
//! The domain layer contains pure types that have no dependencies on I/O,
//! networking, or the async runtime.
//!
//! # What belongs in the domain layer?
//!
//! - Runtime configuration ([`BridgeConfig`])
//! - The on-disk settings schema and its conversion into a
//!   [`dap_core::ConfigSnapshot`]
//!
//! # What does NOT belong here?
//!
//! - Reading or writing the settings file (see `infrastructure::settings_file`)
//! - Any `tokio`, `TcpStream`, or `WebSocket` types

pub mod config;
pub mod settings;

pub use config::BridgeConfig;
pub use settings::{BackendSettings, ConfigParseError, Settings};
