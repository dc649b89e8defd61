//! Wire-shape and normalized envelope types.
//!
//! `RawEnvelope` mirrors whatever JSON shape an upstream parser actually sends
//! (including legacy drift); `Envelope` is what the validator in `nf-validate`
//! produces once every structural and semantic invariant holds. Processors and
//! the notification service only ever see `Envelope`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifies which domain processor should handle an envelope.
///
/// Kept as a validated newtype rather than a closed Rust enum: the processor
/// registry is a runtime map from type name to handler, and new document
/// families are expected to show up without a recompile of this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorType(pub String);

impl ProcessorType {
    pub const BOE: &'static str = "boe";
    pub const REAL_ESTATE: &'static str = "real-estate";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProcessorType {
    fn from(s: &str) -> Self {
        ProcessorType(s.to_string())
    }
}

impl From<String> for ProcessorType {
    fn from(s: String) -> Self {
        ProcessorType(s)
    }
}

/// Raw, permissive shape of an inbound message as it arrives over pub/sub.
///
/// Every field that the validator might need to recover or default is
/// `Option`/`Value` here; `nf-validate` is the only place that is allowed to
/// assume a particular shape holds.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEnvelope {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub processor_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub request: Option<Value>,
    #[serde(default)]
    pub results: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// Legacy top-level aliases some upstream parsers still emit.
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Normalized request block: who this envelope is for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub subscription_id: String,
    pub user_id: String,
    #[serde(default)]
    pub processing_id: Option<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
}

/// Normalized results block: what was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeResults {
    #[serde(default)]
    pub query_date: Option<String>,
    pub matches: Vec<Match>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Success,
    Partial,
    Error,
}

impl Default for ProcessingStatus {
    fn default() -> Self {
        ProcessingStatus::Success
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    #[serde(default)]
    pub processing_time_ms: Option<u64>,
    #[serde(default)]
    pub total_matches: Option<u64>,
    #[serde(default)]
    pub status: ProcessingStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// A (prompt, documents) pairing inside an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub prompt: String,
    #[serde(default)]
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Links {
    pub html: String,
    #[serde(default)]
    pub pdf: Option<String>,
}

/// A single upstream-identified item, normalized per the Document invariants.
///
/// BOE- and real-estate-specific fields (`issuing_body`, `price`, ...) are not
/// modeled as struct fields: they live in `extra` and are pulled out by the
/// owning processor via [`Document::extra_str`] / [`Document::extra_f64`].
/// This keeps the shared envelope crate from having to know about every
/// document family the registry might grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    #[serde(default)]
    pub notification_title: Option<String>,
    pub summary: String,
    pub links: Links,
    #[serde(default)]
    pub relevance_score: f64,
    pub publication_date: DateTime<Utc>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Document {
    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn extra_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(Value::as_f64)
    }

    pub fn extra_u64(&self, key: &str) -> Option<u64> {
        self.extra.get(key).and_then(Value::as_u64)
    }
}

/// A fully normalized, validated envelope ready for processor dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub version: String,
    pub processor_type: ProcessorType,
    pub timestamp: DateTime<Utc>,
    pub trace_id: String,
    pub request: Request,
    pub results: EnvelopeResults,
    pub metadata: EnvelopeMetadata,
}

pub const DEFAULT_LINK_SENTINEL: &str = "https://example.invalid/no-link-available";
pub const MAX_SUMMARY_CHARS: usize = 200;
pub const SUMMARY_TRUNCATE_CHARS: usize = 197;
