//! Dependency health events, emitted by the Database Gateway and Messaging
//! Gateway and consumed by `nf-status` to drive the operating-mode state
//! machine. Kept in `nf-common` so neither gateway needs to depend on the
//! status crate (which would otherwise create a dependency cycle back from
//! status toward the things it watches).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencySource {
    Database,
    PubSub,
    Subscription,
}

#[derive(Debug, Clone)]
pub enum DependencyEvent {
    Connected(DependencySource),
    Failed(DependencySource, String),
}

/// A dependency-agnostic callback gateways use to report health transitions
/// without depending on `nf-status` directly (which would create a cycle
/// back from status toward the things it watches).
pub type EventSink = std::sync::Arc<dyn Fn(DependencyEvent) + Send + Sync>;
