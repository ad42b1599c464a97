//! Bridge runtime configuration.
//!
//! [`BridgeConfig`] holds every setting that is fixed for the lifetime of the
//! process: where to listen, where the settings file lives, and resource
//! limits.  Settings that may change while the bridge runs (the origin
//! allow-list and the backend selection) live in the hot-reloaded
//! [`dap_core::ConfigSnapshot`] instead.
//!
//! The infrastructure layer populates this struct from CLI arguments; the
//! domain never reads environment variables itself.

use std::net::SocketAddr;
use std::path::PathBuf;

use dap_core::protocol::DEFAULT_MAX_CONTENT_LENGTH;

/// Default WebSocket listener port.
pub const DEFAULT_PORT: u16 = 30784;

/// URL path prefix under which WebSocket upgrades are accepted.
pub const ENDPOINT_PREFIX: &str = "/services/debug-adapter/";

/// File name of the settings file inside the home directory.
pub const SETTINGS_FILE_NAME: &str = "settings.toml";

/// All process-lifetime configuration for the bridge.
///
/// # Example
///
/// ```rust
/// use dap_web_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 30784);
/// assert!(cfg.settings_path().ends_with("settings.toml"));
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address and port the WebSocket server binds to.
    ///
    /// Defaults to loopback: the bridge is a local gateway and the origin
    /// check is its only access control.
    pub bind_addr: SocketAddr,

    /// Directory holding `settings.toml`; also the working directory of
    /// spawned adapters.
    pub home_dir: PathBuf,

    /// Path prefix a WebSocket request must start with.
    pub endpoint_prefix: String,

    /// Largest DAP body accepted from the backend.
    pub max_frame_bytes: usize,
}

impl BridgeConfig {
    /// Full path of the settings file.
    pub fn settings_path(&self) -> PathBuf {
        self.home_dir.join(SETTINGS_FILE_NAME)
    }
}

impl Default for BridgeConfig {
    /// | Field           | Default                    |
    /// |-----------------|----------------------------|
    /// | bind_addr       | `127.0.0.1:30784`          |
    /// | home_dir        | `.dap-web-bridge`          |
    /// | endpoint_prefix | `/services/debug-adapter/` |
    /// | max_frame_bytes | 64 MiB                     |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            home_dir: PathBuf::from(".dap-web-bridge"),
            endpoint_prefix: ENDPOINT_PREFIX.to_string(),
            max_frame_bytes: DEFAULT_MAX_CONTENT_LENGTH,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_30784() {
        // Arrange / Act
        let cfg = BridgeConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 30784);
    }

    #[test]
    fn test_default_bind_is_loopback() {
        let cfg = BridgeConfig::default();
        assert!(cfg.bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_default_endpoint_prefix() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.endpoint_prefix, "/services/debug-adapter/");
    }

    #[test]
    fn test_default_max_frame_is_64_mib() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.max_frame_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_settings_path_is_inside_home() {
        let cfg = BridgeConfig {
            home_dir: PathBuf::from("/tmp/bridge-home"),
            ..BridgeConfig::default()
        };
        assert_eq!(cfg.settings_path(), PathBuf::from("/tmp/bridge-home/settings.toml"));
    }
}
