//! Origin gatekeeper.
//!
//! [`evaluate`] is a total, side-effect-free function: it never blocks and
//! returns exactly one [`OriginDecision`] for every input.  Reporting the
//! decision to the user is done by an [`OriginObserver`] supplied by the
//! caller, which keeps this module free of I/O.

use std::fmt;

use crate::domain::snapshot::ConfigSnapshot;

/// Why an origin was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DenialReason {
    /// The request carried no `Origin` header, or an empty one.
    MissingOrigin,
    /// The origin is not in the allow-list, or is listed as `false`.
    UnknownOrDisabled,
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialReason::MissingOrigin => f.write_str("missing origin"),
            DenialReason::UnknownOrDisabled => f.write_str("origin unknown or disabled"),
        }
    }
}

/// Outcome of evaluating one origin against a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginDecision {
    Allowed,
    Denied(DenialReason),
}

impl OriginDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, OriginDecision::Allowed)
    }
}

/// Receives every decision the gatekeeper makes.
///
/// Implementations must return promptly; they are called synchronously from
/// the WebSocket handshake.
pub trait OriginObserver: Send + Sync {
    /// Called once per evaluated request.  `origin` is `None` when the header
    /// was absent.
    fn on_decision(&self, origin: Option<&str>, decision: OriginDecision);
}

/// Decides whether `origin` may open a debug session under `snapshot`.
///
/// # Examples
///
/// ```rust
/// use std::collections::HashMap;
/// use dap_core::{evaluate, BackendMode, ConfigSnapshot, DenialReason, OriginDecision};
///
/// let snapshot = ConfigSnapshot::new(
///     HashMap::from([("https://ide.example".to_string(), true)]),
///     BackendMode::default(),
/// );
/// assert_eq!(evaluate(&snapshot, Some("https://ide.example")), OriginDecision::Allowed);
/// assert_eq!(
///     evaluate(&snapshot, None),
///     OriginDecision::Denied(DenialReason::MissingOrigin)
/// );
/// ```
pub fn evaluate(snapshot: &ConfigSnapshot, origin: Option<&str>) -> OriginDecision {
    match origin {
        None | Some("") => OriginDecision::Denied(DenialReason::MissingOrigin),
        Some(origin) => match snapshot.origin_entry(origin) {
            Some(true) => OriginDecision::Allowed,
            Some(false) | None => OriginDecision::Denied(DenialReason::UnknownOrDisabled),
        },
    }
}

/// Runs [`evaluate`] and reports the result to `observer`.
pub fn evaluate_and_notify(
    snapshot: &ConfigSnapshot,
    origin: Option<&str>,
    observer: &dyn OriginObserver,
) -> OriginDecision {
    let decision = evaluate(snapshot, origin);
    observer.on_decision(origin, decision);
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::BackendMode;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn snapshot_a_true_b_false() -> ConfigSnapshot {
        ConfigSnapshot::new(
            HashMap::from([("a".to_string(), true), ("b".to_string(), false)]),
            BackendMode::default(),
        )
    }

    #[derive(Default)]
    struct RecordingObserver {
        calls: Mutex<Vec<(Option<String>, OriginDecision)>>,
    }

    impl OriginObserver for RecordingObserver {
        fn on_decision(&self, origin: Option<&str>, decision: OriginDecision) {
            self.calls
                .lock()
                .unwrap()
                .push((origin.map(str::to_string), decision));
        }
    }

    #[test]
    fn test_enabled_origin_is_allowed() {
        assert_eq!(
            evaluate(&snapshot_a_true_b_false(), Some("a")),
            OriginDecision::Allowed
        );
    }

    #[test]
    fn test_disabled_origin_is_denied() {
        assert_eq!(
            evaluate(&snapshot_a_true_b_false(), Some("b")),
            OriginDecision::Denied(DenialReason::UnknownOrDisabled)
        );
    }

    #[test]
    fn test_unknown_origin_is_denied() {
        assert_eq!(
            evaluate(&snapshot_a_true_b_false(), Some("c")),
            OriginDecision::Denied(DenialReason::UnknownOrDisabled)
        );
    }

    #[test]
    fn test_absent_and_empty_origin_are_missing() {
        let snapshot = snapshot_a_true_b_false();
        assert_eq!(
            evaluate(&snapshot, None),
            OriginDecision::Denied(DenialReason::MissingOrigin)
        );
        assert_eq!(
            evaluate(&snapshot, Some("")),
            OriginDecision::Denied(DenialReason::MissingOrigin)
        );
    }

    #[test]
    fn test_origin_match_is_exact() {
        // A trailing slash or different scheme is a different origin.
        let snapshot = ConfigSnapshot::new(
            HashMap::from([("https://ide.example".to_string(), true)]),
            BackendMode::default(),
        );
        assert!(!evaluate(&snapshot, Some("https://ide.example/")).is_allowed());
        assert!(!evaluate(&snapshot, Some("http://ide.example")).is_allowed());
        assert!(!evaluate(&snapshot, Some("HTTPS://IDE.EXAMPLE")).is_allowed());
    }

    #[test]
    fn test_deny_all_snapshot_denies_everything() {
        let snapshot = ConfigSnapshot::deny_all();
        for origin in [None, Some(""), Some("a"), Some("null")] {
            assert!(!evaluate(&snapshot, origin).is_allowed());
        }
    }

    #[test]
    fn test_evaluate_and_notify_reports_each_decision_once() {
        // Arrange
        let snapshot = snapshot_a_true_b_false();
        let observer = RecordingObserver::default();

        // Act
        let first = evaluate_and_notify(&snapshot, Some("a"), &observer);
        let second = evaluate_and_notify(&snapshot, None, &observer);

        // Assert
        let calls = observer.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                (Some("a".to_string()), first),
                (None, second),
            ]
        );
        assert_eq!(second, OriginDecision::Denied(DenialReason::MissingOrigin));
    }
}
