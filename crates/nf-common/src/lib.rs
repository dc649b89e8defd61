//! Shared types for the notification-fanout worker: the envelope data model,
//! the persisted notification model, the error taxonomy, dead-letter record
//! shape, dependency health events, and the retry/backoff and logging
//! helpers every other crate in the workspace builds on.

pub mod dlq;
pub mod envelope;
pub mod error;
pub mod health;
pub mod logging;
pub mod notification;
pub mod queue;
pub mod retry;

pub use dlq::{DlqErrorDetail, DlqRecord};
pub use envelope::{
    Document, Envelope, EnvelopeMetadata, EnvelopeResults, Links, Match, ProcessingStatus,
    ProcessorType, RawEnvelope, Request,
};
pub use error::{NotifyError, Result};
pub use health::{DependencyEvent, DependencySource, EventSink};
pub use notification::{Notification, NotificationDraft, NotificationStatus};
pub use queue::{AckNack, EmailTopic, InboundMessage};
pub use retry::{with_retry, RetryPolicy};
