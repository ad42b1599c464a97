//! Default origin decision observer.
//!
//! The gatekeeper reports every decision through
//! [`dap_core::OriginObserver`].  A desktop build would show a notification
//! here; this observer writes a structured log record instead, which is what
//! a headless gateway needs.

use dap_core::{OriginDecision, OriginObserver};
use tracing::{info, warn};

/// Placeholder shown in logs when the request had no `Origin` header.
pub const MISSING_ORIGIN_LABEL: &str = "<missing origin>";

/// Logs each decision: allowed at `info`, denied at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl OriginObserver for LoggingObserver {
    fn on_decision(&self, origin: Option<&str>, decision: OriginDecision) {
        let origin = origin.filter(|o| !o.is_empty()).unwrap_or(MISSING_ORIGIN_LABEL);
        match decision {
            OriginDecision::Allowed => info!(origin, "debug session allowed"),
            OriginDecision::Denied(reason) => {
                warn!(origin, %reason, "debug session denied")
            }
        }
    }
}
