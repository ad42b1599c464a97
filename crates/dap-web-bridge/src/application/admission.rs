//! Handshake admission.
//!
//! [`AdmissionGate`] is the thin adapter between the WebSocket upgrade hook
//! and the pure gatekeeper in `dap-core`.  For each upgrade request it:
//!
//! 1. Rejects paths outside the debug-adapter endpoint (HTTP 404) without
//!    looking at the origin.
//! 2. Takes the current snapshot once and evaluates the declared origin.
//! 3. Reports the decision to the observer.
//! 4. Returns an [`Admission`] carrying that same snapshot, or a
//!    [`Rejection`] with a user-facing explanation (HTTP 403).
//!
//! Nothing here touches the network, so every branch is unit-testable.

use std::path::PathBuf;
use std::sync::Arc;

use dap_core::domain::origin::evaluate_and_notify;
use dap_core::{ConfigSnapshot, DenialReason, OriginDecision, OriginObserver};

use crate::application::snapshot_store::SnapshotStore;
use crate::domain::settings::enable_origin_snippet;

/// A request that passed the gate.
#[derive(Debug, Clone)]
pub struct Admission {
    pub origin: String,
    /// Client-chosen trailing path segment, e.g. `session-42` in
    /// `/services/debug-adapter/session-42`.  May be empty.
    pub session_label: String,
    /// Snapshot the decision was made against; the session's backend is
    /// taken from it.
    pub snapshot: Arc<ConfigSnapshot>,
}

/// A request that did not pass the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The request path is not under the endpoint prefix.
    NotFound { path: String },
    /// The origin was denied.
    Forbidden {
        origin: Option<String>,
        reason: DenialReason,
        /// Plain-text explanation for the response body.
        guidance: String,
    },
}

impl Rejection {
    /// Response body text for this rejection.
    pub fn body(&self) -> String {
        match self {
            Rejection::NotFound { path } => format!("404 page not found: {path}\n"),
            Rejection::Forbidden { guidance, .. } => guidance.clone(),
        }
    }
}

/// Decides whether a WebSocket upgrade may proceed.
pub struct AdmissionGate {
    store: Arc<SnapshotStore>,
    observer: Arc<dyn OriginObserver>,
    endpoint_prefix: String,
    settings_path: PathBuf,
}

impl AdmissionGate {
    pub fn new(
        store: Arc<SnapshotStore>,
        observer: Arc<dyn OriginObserver>,
        endpoint_prefix: impl Into<String>,
        settings_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            observer,
            endpoint_prefix: endpoint_prefix.into(),
            settings_path: settings_path.into(),
        }
    }

    /// Evaluates one upgrade request.
    ///
    /// `path` is the request path without the query string; `origin` is the
    /// first `Origin` header value, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] when the path is wrong or the origin is denied.
    pub fn admit(&self, path: &str, origin: Option<&str>) -> Result<Admission, Rejection> {
        let Some(session_label) = path.strip_prefix(&self.endpoint_prefix) else {
            return Err(Rejection::NotFound {
                path: path.to_string(),
            });
        };

        let snapshot = self.store.current();
        match evaluate_and_notify(&snapshot, origin, self.observer.as_ref()) {
            OriginDecision::Allowed => Ok(Admission {
                origin: origin.unwrap_or_default().to_string(),
                session_label: session_label.to_string(),
                snapshot,
            }),
            OriginDecision::Denied(reason) => Err(Rejection::Forbidden {
                origin: origin.map(str::to_string),
                reason,
                guidance: self.guidance(origin, reason),
            }),
        }
    }

    fn guidance(&self, origin: Option<&str>, reason: DenialReason) -> String {
        match (reason, origin) {
            (DenialReason::UnknownOrDisabled, Some(origin)) => format!(
                "Origin {origin} is not allowed to start debug sessions.\n\
                 To allow it, add the following to {}:\n\n{}",
                self.settings_path.display(),
                enable_origin_snippet(origin)
            ),
            _ => format!(
                "The request did not declare an Origin, so it cannot start a debug session.\n\
                 Only pages whose origin is enabled in {} may connect.\n",
                self.settings_path.display()
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use dap_core::BackendMode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const PREFIX: &str = "/services/debug-adapter/";

    #[derive(Default)]
    struct RecordingObserver {
        decisions: Mutex<Vec<(Option<String>, OriginDecision)>>,
    }

    impl OriginObserver for RecordingObserver {
        fn on_decision(&self, origin: Option<&str>, decision: OriginDecision) {
            self.decisions
                .lock()
                .unwrap()
                .push((origin.map(str::to_string), decision));
        }
    }

    fn gate_with(origins: &[(&str, bool)]) -> (AdmissionGate, Arc<RecordingObserver>, Arc<SnapshotStore>) {
        let snapshot = ConfigSnapshot::new(
            origins
                .iter()
                .map(|(origin, enabled)| (origin.to_string(), *enabled))
                .collect::<HashMap<_, _>>(),
            BackendMode::default(),
        );
        let store = Arc::new(SnapshotStore::new(snapshot));
        let observer = Arc::new(RecordingObserver::default());
        let gate = AdmissionGate::new(
            Arc::clone(&store),
            observer.clone(),
            PREFIX,
            "/home/dev/.dap-web-bridge/settings.toml",
        );
        (gate, observer, store)
    }

    #[test]
    fn test_allowed_origin_is_admitted_with_session_label() {
        // Arrange
        let (gate, observer, _) = gate_with(&[("https://ide.example", true)]);

        // Act
        let admission = gate
            .admit("/services/debug-adapter/session-7", Some("https://ide.example"))
            .unwrap();

        // Assert
        assert_eq!(admission.origin, "https://ide.example");
        assert_eq!(admission.session_label, "session-7");
        assert_eq!(
            *observer.decisions.lock().unwrap(),
            vec![(Some("https://ide.example".to_string()), OriginDecision::Allowed)]
        );
    }

    #[test]
    fn test_wrong_path_is_not_found_and_not_evaluated() {
        let (gate, observer, _) = gate_with(&[("https://ide.example", true)]);

        let rejection = gate.admit("/other", Some("https://ide.example")).unwrap_err();

        assert_eq!(
            rejection,
            Rejection::NotFound {
                path: "/other".to_string()
            }
        );
        assert!(observer.decisions.lock().unwrap().is_empty());
    }

    #[test]
    fn test_prefix_without_trailing_slash_is_not_found() {
        let (gate, _, _) = gate_with(&[("https://ide.example", true)]);
        let rejection = gate
            .admit("/services/debug-adapter", Some("https://ide.example"))
            .unwrap_err();
        assert!(matches!(rejection, Rejection::NotFound { .. }));
    }

    #[test]
    fn test_disabled_origin_is_forbidden_with_guidance() {
        // Arrange
        let (gate, _, _) = gate_with(&[("https://ide.example", false)]);

        // Act
        let rejection = gate
            .admit("/services/debug-adapter/x", Some("https://ide.example"))
            .unwrap_err();

        // Assert
        match &rejection {
            Rejection::Forbidden { origin, reason, .. } => {
                assert_eq!(origin.as_deref(), Some("https://ide.example"));
                assert_eq!(*reason, DenialReason::UnknownOrDisabled);
            }
            other => panic!("expected Forbidden, got {other:?}"),
        }
        let body = rejection.body();
        assert!(body.contains("settings.toml"));
        assert!(body.contains("\"https://ide.example\" = true"));
    }

    #[test]
    fn test_missing_origin_is_forbidden() {
        let (gate, observer, _) = gate_with(&[("https://ide.example", true)]);

        let rejection = gate.admit("/services/debug-adapter/x", None).unwrap_err();

        assert!(matches!(
            rejection,
            Rejection::Forbidden {
                reason: DenialReason::MissingOrigin,
                ..
            }
        ));
        assert_eq!(
            *observer.decisions.lock().unwrap(),
            vec![(None, OriginDecision::Denied(DenialReason::MissingOrigin))]
        );
    }

    #[test]
    fn test_admission_uses_snapshot_current_at_handshake() {
        // Arrange
        let (gate, _, store) = gate_with(&[("https://ide.example", true)]);
        let admission = gate
            .admit("/services/debug-adapter/", Some("https://ide.example"))
            .unwrap();

        // Act: a reload after admission revokes the origin.
        let revoked = || -> Result<ConfigSnapshot, crate::domain::ConfigParseError> {
            Ok(ConfigSnapshot::deny_all())
        };
        store.reload(&revoked).unwrap();

        // Assert: the admitted session keeps its snapshot, new requests see the new one.
        assert_eq!(admission.snapshot.origin_entry("https://ide.example"), Some(true));
        assert!(gate
            .admit("/services/debug-adapter/", Some("https://ide.example"))
            .is_err());
    }
}
