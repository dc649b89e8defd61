//! Service Status / Operating Mode.
//!
//! A small state machine derived from three dependency-health booleans
//! (database, pub/sub client, subscription watcher). The supervisor and the
//! HTTP diagnostics surface both read from one shared, thread-safe
//! [`ServiceStatus`]; the Database Gateway and Messaging Gateway are the
//! only writers, driving it through [`DependencyEvent`]s.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use nf_common::{DependencyEvent, DependencySource};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info, warn};

/// Bound on the per-source error ring. Older entries are dropped as new
/// ones arrive; this is a debugging aid, not an audit log.
const MAX_RECENT_ERRORS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingMode {
    /// db, pubsub, and subscription are all healthy.
    Full,
    /// db and pubsub are healthy but the subscription watcher is not
    /// ingesting — the worker can still persist and publish on request.
    Limited,
    /// Only the database is healthy.
    Readonly,
    /// The database is down. Nothing durable can happen.
    Error,
}

impl OperatingMode {
    /// HEALTHY covers FULL and LIMITED: the worker can still do useful work.
    pub fn is_healthy(self) -> bool {
        matches!(self, OperatingMode::Full | OperatingMode::Limited)
    }

    /// READY — suitable to receive traffic — only in FULL.
    pub fn is_ready(self) -> bool {
        matches!(self, OperatingMode::Full)
    }
}

fn compute_mode(db_active: bool, pubsub_active: bool, subscription_active: bool) -> OperatingMode {
    if !db_active {
        return OperatingMode::Error;
    }
    match (pubsub_active, subscription_active) {
        (true, true) => OperatingMode::Full,
        (true, false) => OperatingMode::Limited,
        (false, _) => OperatingMode::Readonly,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub mode: OperatingMode,
    pub db_active: bool,
    pub pubsub_active: bool,
    pub subscription_active: bool,
    pub recent_errors: HashMap<String, Vec<ErrorRecord>>,
}

struct DependencyState {
    db_active: bool,
    pubsub_active: bool,
    subscription_active: bool,
    errors: HashMap<DependencySource, VecDeque<ErrorRecord>>,
}

impl Default for DependencyState {
    fn default() -> Self {
        Self {
            db_active: false,
            pubsub_active: false,
            subscription_active: false,
            errors: HashMap::new(),
        }
    }
}

/// Process-wide, thread-safe dependency health tracker.
pub struct ServiceStatus {
    state: RwLock<DependencyState>,
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceStatus {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(DependencyState::default()),
        }
    }

    /// The supervisor's initial state before anything has connected: every
    /// dependency down, which computes to `ERROR`.
    pub fn mode(&self) -> OperatingMode {
        let state = self.state.read();
        compute_mode(state.db_active, state.pubsub_active, state.subscription_active)
    }

    pub fn is_healthy(&self) -> bool {
        self.mode().is_healthy()
    }

    pub fn is_ready(&self) -> bool {
        self.mode().is_ready()
    }

    pub fn handle_event(&self, event: DependencyEvent) {
        match event {
            DependencyEvent::Connected(source) => self.set_active(source, true),
            DependencyEvent::Failed(source, message) => {
                self.set_active(source, false);
                self.record_error(source, message);
            }
        }
    }

    fn set_active(&self, source: DependencySource, active: bool) {
        let mut state = self.state.write();
        let previous_mode = compute_mode(state.db_active, state.pubsub_active, state.subscription_active);

        match source {
            DependencySource::Database => state.db_active = active,
            DependencySource::PubSub => state.pubsub_active = active,
            DependencySource::Subscription => state.subscription_active = active,
        }

        let new_mode = compute_mode(state.db_active, state.pubsub_active, state.subscription_active);
        drop(state);

        if new_mode != previous_mode {
            if new_mode.is_ready() {
                info!(?source, ?new_mode, "dependency health changed, operating mode restored");
            } else if matches!(new_mode, OperatingMode::Error) {
                error!(?source, ?new_mode, "dependency health changed, operating mode degraded to ERROR");
            } else {
                warn!(?source, ?new_mode, "dependency health changed, operating mode degraded");
            }
        }
    }

    fn record_error(&self, source: DependencySource, message: String) {
        let mut state = self.state.write();
        let ring = state.errors.entry(source).or_insert_with(VecDeque::new);
        ring.push_back(ErrorRecord {
            timestamp: Utc::now(),
            message,
        });
        while ring.len() > MAX_RECENT_ERRORS {
            ring.pop_front();
        }
    }

    pub fn recent_errors(&self, source: DependencySource) -> Vec<ErrorRecord> {
        self.state
            .read()
            .errors
            .get(&source)
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.state.read();
        let mode = compute_mode(state.db_active, state.pubsub_active, state.subscription_active);

        let mut recent_errors = HashMap::new();
        for (source, ring) in &state.errors {
            recent_errors.insert(source_label(*source).to_string(), ring.iter().cloned().collect());
        }

        StatusSnapshot {
            mode,
            db_active: state.db_active,
            pubsub_active: state.pubsub_active,
            subscription_active: state.subscription_active,
            recent_errors,
        }
    }
}

fn source_label(source: DependencySource) -> &'static str {
    match source {
        DependencySource::Database => "database",
        DependencySource::PubSub => "pubsub",
        DependencySource::Subscription => "subscription",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_error_mode() {
        let status = ServiceStatus::new();
        assert_eq!(status.mode(), OperatingMode::Error);
        assert!(!status.is_healthy());
        assert!(!status.is_ready());
    }

    #[test]
    fn full_requires_all_three_dependencies() {
        let status = ServiceStatus::new();
        status.handle_event(DependencyEvent::Connected(DependencySource::Database));
        status.handle_event(DependencyEvent::Connected(DependencySource::PubSub));
        status.handle_event(DependencyEvent::Connected(DependencySource::Subscription));
        assert_eq!(status.mode(), OperatingMode::Full);
        assert!(status.is_ready());
    }

    #[test]
    fn subscription_failure_degrades_to_limited_not_error() {
        let status = ServiceStatus::new();
        status.handle_event(DependencyEvent::Connected(DependencySource::Database));
        status.handle_event(DependencyEvent::Connected(DependencySource::PubSub));
        status.handle_event(DependencyEvent::Connected(DependencySource::Subscription));
        status.handle_event(DependencyEvent::Failed(
            DependencySource::Subscription,
            "timeout".to_string(),
        ));
        assert_eq!(status.mode(), OperatingMode::Limited);
        assert!(status.is_healthy());
        assert!(!status.is_ready());
    }

    #[test]
    fn pubsub_failure_without_subscription_is_readonly() {
        let status = ServiceStatus::new();
        status.handle_event(DependencyEvent::Connected(DependencySource::Database));
        status.handle_event(DependencyEvent::Failed(DependencySource::PubSub, "down".to_string()));
        assert_eq!(status.mode(), OperatingMode::Readonly);
        assert!(status.is_healthy());
    }

    #[test]
    fn database_failure_is_always_error_regardless_of_others() {
        let status = ServiceStatus::new();
        status.handle_event(DependencyEvent::Connected(DependencySource::Database));
        status.handle_event(DependencyEvent::Connected(DependencySource::PubSub));
        status.handle_event(DependencyEvent::Failed(DependencySource::Database, "refused".to_string()));
        assert_eq!(status.mode(), OperatingMode::Error);
        assert!(!status.is_healthy());
    }

    #[test]
    fn error_ring_is_bounded() {
        let status = ServiceStatus::new();
        for i in 0..30 {
            status.handle_event(DependencyEvent::Failed(DependencySource::Database, format!("error {i}")));
        }
        let errors = status.recent_errors(DependencySource::Database);
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors.last().unwrap().message, "error 29");
    }

    #[test]
    fn snapshot_reports_current_booleans_and_mode() {
        let status = ServiceStatus::new();
        status.handle_event(DependencyEvent::Connected(DependencySource::Database));
        let snapshot = status.snapshot();
        assert!(snapshot.db_active);
        assert!(!snapshot.pubsub_active);
        assert_eq!(snapshot.mode, OperatingMode::Readonly);
    }
}
