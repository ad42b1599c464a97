//! dap-web-bridge: entry point.
//!
//! This binary lets a debugger UI running in a web browser talk to a Debug
//! Adapter Protocol (DAP) backend on the local machine.  The browser opens a
//! WebSocket; the bridge checks the page's origin against the allow-list in
//! the settings file and, if allowed, relays DAP messages between the
//! WebSocket and the debug adapter.
//!
//! # Why a separate bridge process?
//!
//! Browsers cannot open raw TCP sockets or launch processes, and debug
//! adapters speak `Content-Length`-framed JSON over a byte stream.  The bridge
//! converts between one WebSocket message and one framed DAP message, and it
//! is the place where "which web pages may drive my debugger" is decided.
//!
//! # Usage
//!
//! ```text
//! dap-web-bridge [OPTIONS]
//!
//! Options:
//!   --port            <PORT>   WebSocket listener port [default: 30784]
//!   --bind            <ADDR>   Address to bind [default: 127.0.0.1]
//!   --home            <DIR>    Directory holding settings.toml [default: ~/.dap-web-bridge]
//!   --max-frame-bytes <BYTES>  Largest DAP message accepted from the adapter [default: 67108864]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                     | Default             | Description                  |
//! |------------------------------|---------------------|------------------------------|
//! | `DAP_BRIDGE_PORT`            | `30784`             | WebSocket listener port      |
//! | `DAP_BRIDGE_BIND`            | `127.0.0.1`         | Bind address                 |
//! | `DAP_BRIDGE_HOME`            | `~/.dap-web-bridge` | Settings directory           |
//! | `DAP_BRIDGE_MAX_FRAME_BYTES` | `67108864`          | Backend frame size limit     |
//!
//! # Architecture overview
//!
//! ```text
//! Web Browser  (DAP JSON, one message per WebSocket frame)
//!       ↕  ws://127.0.0.1:30784/services/debug-adapter/<label>
//! dap-web-bridge  ← this process
//!   domain/          BridgeConfig, settings schema
//!   application/     snapshot store, admission gate, decision observer
//!   infrastructure/  WebSocket server, session pump, backend connector,
//!                    settings file + watcher
//!       ↕  Content-Length framed DAP over TCP or child stdio
//! Debug adapter
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dap_core::protocol::DEFAULT_MAX_CONTENT_LENGTH;
use dap_web_bridge::domain::config::{DEFAULT_PORT, ENDPOINT_PREFIX};
use dap_web_bridge::domain::BridgeConfig;
use dap_web_bridge::infrastructure::run_server;
use dap_web_bridge::infrastructure::settings_file::default_home_dir;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Browser-to-debug-adapter WebSocket bridge.
#[derive(Debug, Parser)]
#[command(
    name = "dap-web-bridge",
    about = "Local WebSocket gateway between browser debuggers and DAP adapters",
    version
)]
struct Cli {
    /// TCP port for the WebSocket server to listen on.
    #[arg(long, default_value_t = DEFAULT_PORT, env = "DAP_BRIDGE_PORT")]
    port: u16,

    /// IP address to bind the WebSocket server to.
    ///
    /// The origin allow-list is the only access control, so binding anything
    /// other than loopback exposes the debugger to the network.
    #[arg(long, default_value = "127.0.0.1", env = "DAP_BRIDGE_BIND")]
    bind: String,

    /// Directory holding `settings.toml`; spawned adapters run here.
    #[arg(long, env = "DAP_BRIDGE_HOME")]
    home: Option<PathBuf>,

    /// Largest DAP message body accepted from the debug adapter, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_CONTENT_LENGTH, env = "DAP_BRIDGE_MAX_FRAME_BYTES")]
    max_frame_bytes: usize,
}

impl Cli {
    /// Converts the parsed CLI arguments into a [`BridgeConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address, if
    /// `--max-frame-bytes` is zero, or if no `--home` was given and the
    /// user's home directory cannot be determined.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let ip: IpAddr = self
            .bind
            .parse()
            .with_context(|| format!("invalid bind address: '{}'", self.bind))?;
        let bind_addr = SocketAddr::new(ip, self.port);

        if self.max_frame_bytes == 0 {
            anyhow::bail!("--max-frame-bytes must be greater than zero");
        }

        let home_dir = match self.home {
            Some(home) => home,
            None => default_home_dir().context("pass --home or set DAP_BRIDGE_HOME")?,
        };

        Ok(BridgeConfig {
            bind_addr,
            home_dir,
            endpoint_prefix: ENDPOINT_PREFIX.to_string(),
            max_frame_bytes: self.max_frame_bytes,
        })
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. `tracing_subscriber` is initialised; `RUST_LOG` selects the level and
///    defaults to `info`.
/// 2. CLI arguments are parsed into a [`BridgeConfig`].
/// 3. A Ctrl+C handler clears a shared `AtomicBool`.
/// 4. [`run_server`] loads the settings, starts the watcher, and accepts
///    browser connections until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_bridge_config()?;

    info!(
        "dap-web-bridge starting: ws={}, settings={}",
        config.bind_addr,
        config.settings_path().display()
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("dap-web-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act: parse with no arguments
        let cli = Cli::parse_from(["dap-web-bridge"]);

        // Assert
        assert_eq!(cli.port, 30784);
        assert_eq!(cli.bind, "127.0.0.1");
        assert_eq!(cli.max_frame_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["dap-web-bridge", "--port", "9999"]);
        assert_eq!(cli.port, 9999);
    }

    #[test]
    fn test_cli_home_override() {
        let cli = Cli::parse_from(["dap-web-bridge", "--home", "/srv/bridge"]);
        assert_eq!(cli.home, Some(PathBuf::from("/srv/bridge")));
    }

    #[test]
    fn test_into_bridge_config_uses_given_home() {
        // Arrange
        let cli = Cli::parse_from(["dap-web-bridge", "--home", "/srv/bridge", "--port", "4000"]);

        // Act
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:4000");
        assert_eq!(config.settings_path(), PathBuf::from("/srv/bridge/settings.toml"));
        assert_eq!(config.endpoint_prefix, "/services/debug-adapter/");
    }

    #[test]
    fn test_into_bridge_config_accepts_ipv6_bind() {
        // Arrange
        let cli = Cli::parse_from(["dap-web-bridge", "--bind", "::1", "--home", "/srv/bridge"]);

        // Act
        let config = cli.into_bridge_config().unwrap();

        // Assert
        assert_eq!(config.bind_addr.to_string(), "[::1]:30784");
    }

    #[test]
    fn test_into_bridge_config_invalid_bind_returns_error() {
        // Arrange
        let cli = Cli {
            port: 30784,
            bind: "not.an.ip".to_string(),
            home: Some(PathBuf::from("/tmp")),
            max_frame_bytes: 1024,
        };

        // Act
        let result = cli.into_bridge_config();

        // Assert: must return an error, not panic
        assert!(result.is_err());
    }

    #[test]
    fn test_into_bridge_config_zero_frame_limit_returns_error() {
        let cli = Cli {
            port: 30784,
            bind: "127.0.0.1".to_string(),
            home: Some(PathBuf::from("/tmp")),
            max_frame_bytes: 0,
        };
        assert!(cli.into_bridge_config().is_err());
    }
}
