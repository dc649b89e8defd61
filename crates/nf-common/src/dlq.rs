//! Dead-letter record shape, shared between the Messaging Gateway (which
//! publishes it) and anything that wants to construct one ahead of time
//! (processors reporting an execution failure, the validator reporting a
//! parse failure).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqErrorDetail {
    pub name: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Outbound DLQ payload. `original_message` holds the parsed JSON when
/// available; `raw_message` carries the raw bytes (base64) when parsing
/// itself failed and there was never a `Value` to keep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_message: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_message: Option<String>,
    pub error: DlqErrorDetail,
    pub timestamp: DateTime<Utc>,
}

impl DlqRecord {
    pub fn from_parsed(original: Value, error_name: &str, message: impl Into<String>) -> Self {
        Self {
            original_message: Some(original),
            raw_message: None,
            error: DlqErrorDetail {
                name: error_name.to_string(),
                message: message.into(),
                stack: None,
            },
            timestamp: Utc::now(),
        }
    }

    pub fn from_raw_bytes(raw: &[u8], error_name: &str, message: impl Into<String>) -> Self {
        use base64::Engine;
        Self {
            original_message: None,
            raw_message: Some(base64::engine::general_purpose::STANDARD.encode(raw)),
            error: DlqErrorDetail {
                name: error_name.to_string(),
                message: message.into(),
                stack: None,
            },
            timestamp: Utc::now(),
        }
    }
}
