//! Builds the outbound DLQ record for a failed task. Keeps the original
//! parsed JSON when the bytes were valid JSON (even if the envelope later
//! failed semantic validation), falling back to the raw bytes when parsing
//! itself is what failed.

use nf_common::{DlqRecord, NotifyError};

pub fn build_dlq_record(raw: &[u8], error: &NotifyError) -> DlqRecord {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(value) => DlqRecord::from_parsed(value, error.name(), error.to_string()),
        Err(_) => DlqRecord::from_raw_bytes(raw, error.name(), error.to_string()),
    }
}
