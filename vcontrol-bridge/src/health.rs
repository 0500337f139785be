//! Last-reply health tracking.
//!
//! The polling loop reports the outcome of every iteration here; the HTTP
//! health endpoint only reads snapshots.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Outcome of the most recent poll, as a point-in-time copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// False until the first iteration finished; never reverts.
    pub has_reported: bool,
    pub last_success: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_exit_code: Option<i32>,
    pub last_error: Option<String>,
}

/// Health classification derived from a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
        }
    }
}

impl HealthSnapshot {
    /// Healthy before the first report and after a success, degraded after
    /// a failure.
    pub fn status(&self) -> HealthStatus {
        if !self.has_reported || self.last_success {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        }
    }

    /// Human-readable explanation of [`status`](Self::status).
    pub fn description(&self) -> &'static str {
        if !self.has_reported {
            "No replies have been recorded yet."
        } else if self.last_success {
            "Last client reply was successful."
        } else {
            "Last client reply failed."
        }
    }
}

/// Thread-safe recorder of the last poll outcome.
///
/// Share it as `Arc<HealthState>` between the writer (polling loop) and
/// readers (health endpoint). Every operation takes the same lock, so a
/// snapshot never mixes two reports.
#[derive(Debug, Default)]
pub struct HealthState {
    inner: Mutex<HealthSnapshot>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful iteration.
    ///
    /// A non-blank `error` (e.g. warnings on stderr) is kept for diagnostics;
    /// a blank one clears the stored error.
    pub fn report_success(&self, exit_code: i32, error: Option<&str>) {
        let mut state = self.inner.lock();
        state.has_reported = true;
        state.last_success = true;
        state.last_exit_code = Some(exit_code);
        state.last_success_at = Some(Utc::now());
        state.last_error = error
            .filter(|e| !e.trim().is_empty())
            .map(str::to_string);
    }

    /// Record a failed iteration. The error is always stored.
    pub fn report_failure(&self, exit_code: i32, error: Option<&str>) {
        let mut state = self.inner.lock();
        state.has_reported = true;
        state.last_success = false;
        state.last_exit_code = Some(exit_code);
        state.last_failure_at = Some(Utc::now());
        state.last_error = Some(error.unwrap_or_default().to_string());
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_snapshot() {
        let state = HealthState::new();
        let snapshot = state.snapshot();

        assert!(!snapshot.has_reported);
        assert!(!snapshot.last_success);
        assert_eq!(snapshot.last_exit_code, None);
        assert_eq!(snapshot.status(), HealthStatus::Healthy);
        assert_eq!(snapshot.description(), "No replies have been recorded yet.");
    }

    #[test]
    fn test_report_success_clears_blank_error() {
        let state = HealthState::new();
        state.report_failure(2, Some("disconnected"));
        state.report_success(0, Some(""));

        let snapshot = state.snapshot();
        assert!(snapshot.has_reported);
        assert!(snapshot.last_success);
        assert_eq!(snapshot.last_exit_code, Some(0));
        assert!(snapshot.last_success_at.is_some());
        assert_eq!(snapshot.last_error, None);
        assert_eq!(snapshot.status(), HealthStatus::Healthy);
    }

    #[test]
    fn test_report_success_keeps_warning() {
        let state = HealthState::new();
        state.report_success(0, Some("warn"));

        assert_eq!(state.snapshot().last_error.as_deref(), Some("warn"));
    }

    #[test]
    fn test_report_failure() {
        let state = HealthState::new();
        state.report_failure(2, Some("disconnected"));

        let snapshot = state.snapshot();
        assert!(snapshot.has_reported);
        assert!(!snapshot.last_success);
        assert_eq!(snapshot.last_exit_code, Some(2));
        assert!(snapshot.last_failure_at.is_some());
        assert_eq!(snapshot.last_success_at, None);
        assert_eq!(snapshot.last_error.as_deref(), Some("disconnected"));
        assert_eq!(snapshot.status(), HealthStatus::Degraded);
    }

    #[test]
    fn test_report_failure_without_message_stores_empty() {
        let state = HealthState::new();
        state.report_failure(-1, None);

        assert_eq!(state.snapshot().last_error.as_deref(), Some(""));
    }

    #[test]
    fn test_has_reported_never_reverts() {
        let state = HealthState::new();
        state.report_success(0, None);
        state.report_failure(1, Some("x"));
        state.report_success(0, None);

        let snapshot = state.snapshot();
        assert!(snapshot.has_reported);
        assert!(snapshot.last_failure_at.is_some());
        assert!(snapshot.last_success_at.is_some());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let state = HealthState::new();
        state.report_failure(2, Some("disconnected"));

        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["hasReported"], true);
        assert_eq!(json["lastExitCode"], 2);
        assert_eq!(json["lastError"], "disconnected");
        assert!(json["lastSuccessAt"].is_null());
    }
}
