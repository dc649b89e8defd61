//! Processor registry and the domain-specific document-to-notification
//! mapping processors are responsible for.
//!
//! Processors are pure, I/O-free: they read a normalized [`Envelope`] and
//! emit zero or more [`NotificationDraft`]s, one per (match, document) pair.
//! Persistence — and the retry/backoff around it — belongs entirely to the
//! notification service, per the ownership rule that the gateway owns every
//! write to the notifications table.

pub mod boe;
pub mod real_estate;
pub mod registry;

pub use boe::BoeProcessor;
pub use real_estate::RealEstateProcessor;
pub use registry::{ProcessorRegistry, RegistryError};

use nf_common::{Envelope, NotificationDraft};

/// A domain processor: maps one normalized envelope to zero or more
/// notification drafts.
pub trait Processor: Send + Sync {
    /// The `processor_type` string this processor is registered under.
    fn processor_type(&self) -> &str;

    /// Whether this processor's `process` needs database access (e.g. to
    /// look up related rows) — a declared capability, not a hardcoded
    /// policy the registry enforces.
    fn requires_database(&self) -> bool;

    /// Cheap structural check before `process` runs.
    fn validate(&self, envelope: &Envelope) -> bool;

    /// Specializes the generic normalization `nf-validate` already applied.
    /// Most processors can pass the envelope through unchanged; this exists
    /// for document families that need family-specific defaulting beyond
    /// the core Document invariants.
    fn transform(&self, envelope: Envelope) -> Envelope {
        envelope
    }

    /// Produces one draft per (match, document) pair.
    fn process(&self, envelope: &Envelope) -> Vec<NotificationDraft>;
}

pub(crate) fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}...")
}

/// Shared envelope-building helper for processor unit tests.
#[cfg(test)]
pub(crate) mod tests_support {
    use nf_common::{
        Document, Envelope, EnvelopeMetadata, EnvelopeResults, Match, ProcessorType, Request,
    };

    pub fn envelope_with_doc(processor_type: &str, doc: Document) -> Envelope {
        Envelope {
            version: "1".to_string(),
            processor_type: ProcessorType::from(processor_type),
            timestamp: chrono::Utc::now(),
            trace_id: "trace-1".to_string(),
            request: Request {
                subscription_id: "550e8400-e29b-41d4-a716-446655440001".to_string(),
                user_id: "550e8400-e29b-41d4-a716-446655440000".to_string(),
                processing_id: None,
                prompts: vec!["find properties".to_string()],
            },
            results: EnvelopeResults {
                query_date: None,
                matches: vec![Match {
                    prompt: "find properties".to_string(),
                    documents: vec![doc],
                }],
            },
            metadata: EnvelopeMetadata::default(),
        }
    }
}
