//! Parses raw inbound bytes into a [`Envelope`], repairing the handful of
//! wire-shape drifts upstream parsers are known to produce, and raising a
//! terminal validation error only when the envelope truly cannot be acted
//! on (missing user/subscription id, unregistered processor type).
//!
//! The validator must not throw on a repairable shape — every recovery
//! strategy below is attempted before giving up.

use chrono::Utc;
use nf_common::{
    Document, Envelope, EnvelopeMetadata, EnvelopeResults, Links, Match, NotifyError,
    ProcessorType, RawEnvelope, Request, Result, DEFAULT_LINK_SENTINEL, MAX_SUMMARY_CHARS,
    SUMMARY_TRUNCATE_CHARS,
};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

/// Parses and normalizes raw envelope bytes.
///
/// `known_processor_types` comes from the processor registry: the validator
/// itself has no knowledge of which types are registered, so it defers the
/// unknown-type check to whatever list the caller supplies.
pub fn validate(raw: &[u8], known_processor_types: &[String]) -> Result<Envelope> {
    let parsed: RawEnvelope = serde_json::from_slice(raw)
        .map_err(|e| NotifyError::ParseError(e.to_string()))?;

    let trace_id = parsed
        .trace_id
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let request_value = parsed.request.clone().unwrap_or(Value::Null);
    let (user_id, subscription_id, processing_id, prompts) =
        extract_identity(&request_value, &parsed)?;

    let processor_type_str = parsed
        .processor_type
        .clone()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| NotifyError::ValidationError("missing processor_type".to_string()))?;

    if !known_processor_types.is_empty()
        && !known_processor_types.iter().any(|t| t == &processor_type_str)
    {
        return Err(NotifyError::UnknownProcessor(
            processor_type_str,
            known_processor_types.to_vec(),
        ));
    }

    let results_value = parsed.results.clone().unwrap_or(Value::Null);
    let matches = recover_matches(&results_value, &prompts, &trace_id)?;

    let metadata = parsed
        .metadata
        .as_ref()
        .map(|v| serde_json::from_value::<EnvelopeMetadata>(v.clone()).unwrap_or_default())
        .unwrap_or_default();

    let timestamp = parsed
        .timestamp
        .as_deref()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(Envelope {
        version: parsed.version.unwrap_or_else(|| "1".to_string()),
        processor_type: ProcessorType::from(processor_type_str),
        timestamp,
        trace_id,
        request: Request {
            subscription_id,
            user_id,
            processing_id,
            prompts,
        },
        results: EnvelopeResults {
            query_date: results_value
                .get("query_date")
                .and_then(Value::as_str)
                .map(str::to_string),
            matches,
        },
        metadata,
    })
}

/// Extracts `user_id`/`subscription_id` from their primary location
/// (`request.{user_id,subscription_id}`), falling back to top-level
/// aliases and a nested `context` object. Both must resolve to a non-empty
/// UUID string or the envelope is rejected.
fn extract_identity(
    request_value: &Value,
    parsed: &RawEnvelope,
) -> Result<(String, String, Option<String>, Vec<String>)> {
    let context = request_value.get("context").or(parsed.context.as_ref());

    let user_id = first_non_empty(&[
        request_value.get("user_id").and_then(Value::as_str),
        parsed.user_id.as_deref(),
        context.and_then(|c| c.get("user_id")).and_then(Value::as_str),
    ])
    .ok_or_else(|| NotifyError::ValidationError("missing user_id".to_string()))?;

    let subscription_id = first_non_empty(&[
        request_value.get("subscription_id").and_then(Value::as_str),
        parsed.subscription_id.as_deref(),
        context
            .and_then(|c| c.get("subscription_id"))
            .and_then(Value::as_str),
    ])
    .ok_or_else(|| NotifyError::ValidationError("missing subscription_id".to_string()))?;

    if Uuid::parse_str(&user_id).is_err() {
        return Err(NotifyError::ValidationError(format!(
            "user_id is not a valid UUID: {user_id}"
        )));
    }
    if Uuid::parse_str(&subscription_id).is_err() {
        return Err(NotifyError::ValidationError(format!(
            "subscription_id is not a valid UUID: {subscription_id}"
        )));
    }

    let processing_id = request_value
        .get("processing_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let prompts = request_value
        .get("prompts")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok((user_id, subscription_id, processing_id, prompts))
}

fn first_non_empty(candidates: &[Option<&str>]) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Recovers `results.matches` through the four documented strategies, in
/// order, logging which one succeeded. Never raises — the worst case is an
/// empty matches sequence, patched up by [`ensure_non_empty`].
fn recover_matches(results_value: &Value, prompts: &[String], trace_id: &str) -> Result<Vec<Match>> {
    let raw_matches = if let Some(matches) = results_value.get("matches").and_then(Value::as_array) {
        matches.clone()
    } else if let Some(first) = results_value
        .get("results")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(|r| r.get("matches"))
        .and_then(Value::as_array)
    {
        debug!(trace_id, strategy = "results[0].matches", "recovered matches shape");
        first.clone()
    } else if let Some(results) = results_value.get("results").and_then(Value::as_array) {
        let flattened: Vec<Value> = results
            .iter()
            .flat_map(|r| {
                let prompt = r.get("prompt").and_then(Value::as_str).map(str::to_string);
                r.get("matches")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |mut m| {
                        if let Some(obj) = m.as_object_mut() {
                            if !obj.contains_key("prompt") {
                                if let Some(p) = prompt.clone() {
                                    obj.insert("prompt".to_string(), Value::String(p));
                                }
                            }
                        }
                        m
                    })
            })
            .collect();
        if !flattened.is_empty() {
            debug!(trace_id, strategy = "flatten results[].matches", "recovered matches shape");
            flattened
        } else if let Some(results_as_matches) = results_value.get("results").and_then(Value::as_array) {
            debug!(trace_id, strategy = "results as matches", "recovered matches shape");
            results_as_matches.clone()
        } else {
            Vec::new()
        }
    } else {
        warn!(trace_id, "no recoverable matches shape found, substituting empty sequence");
        Vec::new()
    };

    let mut matches = Vec::with_capacity(raw_matches.len());
    for raw_match in raw_matches {
        matches.push(normalize_match(raw_match, prompts)?);
    }

    Ok(ensure_non_empty(matches, prompts))
}

fn ensure_non_empty(matches: Vec<Match>, prompts: &[String]) -> Vec<Match> {
    if !matches.is_empty() {
        return matches;
    }
    vec![Match {
        prompt: prompts.first().cloned().unwrap_or_else(|| "Default prompt".to_string()),
        documents: Vec::new(),
    }]
}

fn normalize_match(raw: Value, prompts: &[String]) -> Result<Match> {
    let prompt = raw
        .get("prompt")
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
        .or_else(|| prompts.first().cloned())
        .unwrap_or_else(|| "Default prompt".to_string());

    let documents = raw
        .get("documents")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(normalize_document)
        .collect::<Result<Vec<_>>>()?;

    Ok(Match { prompt, documents })
}

/// Applies the Document invariants: non-empty title, ≤200-char summary
/// (truncated to 197 + ellipsis), a present `links.html` (defaulted to a
/// sentinel), and a present `publication_date` (defaulted to now).
fn normalize_document(mut raw: Value) -> Result<Document> {
    if let Some(obj) = raw.as_object_mut() {
        let missing_date = !matches!(obj.get("publication_date"), Some(Value::String(_)));
        if missing_date {
            obj.insert(
                "publication_date".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        if !matches!(obj.get("title"), Some(Value::String(_))) {
            obj.insert("title".to_string(), Value::String(String::new()));
        }
        if !matches!(obj.get("summary"), Some(Value::String(_))) {
            obj.insert("summary".to_string(), Value::String(String::new()));
        }
        if !matches!(obj.get("links"), Some(Value::Object(_))) {
            obj.insert("links".to_string(), serde_json::json!({}));
        }
    }

    let mut doc: Document =
        serde_json::from_value(raw.clone()).map_err(|e| NotifyError::ParseError(e.to_string()))?;

    if doc.title.trim().is_empty() {
        doc.title = "Untitled".to_string();
    }

    if doc.summary.chars().count() > MAX_SUMMARY_CHARS {
        let truncated: String = doc.summary.chars().take(SUMMARY_TRUNCATE_CHARS).collect();
        doc.summary = format!("{truncated}...");
    }

    if doc.links.html.trim().is_empty() {
        doc.links = Links {
            html: DEFAULT_LINK_SENTINEL.to_string(),
            pdf: doc.links.pdf,
        };
    }

    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_envelope(body: Value) -> Vec<u8> {
        serde_json::to_vec(&body).unwrap()
    }

    #[test]
    fn rejects_malformed_json() {
        let err = validate(b"not json", &[]).unwrap_err();
        assert!(matches!(err, NotifyError::ParseError(_)));
    }

    #[test]
    fn rejects_missing_user_id() {
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "request": {"subscription_id": "550e8400-e29b-41d4-a716-446655440000"},
            "results": {"matches": []}
        }));
        let err = validate(&body, &[]).unwrap_err();
        assert!(matches!(err, NotifyError::ValidationError(_)));
    }

    #[test]
    fn rejects_unknown_processor_type() {
        let body = sample_envelope(json!({
            "processor_type": "dogecoin",
            "request": {
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "subscription_id": "550e8400-e29b-41d4-a716-446655440001"
            },
            "results": {"matches": []}
        }));
        let err = validate(&body, &["boe".to_string(), "real-estate".to_string()]).unwrap_err();
        assert!(matches!(err, NotifyError::UnknownProcessor(_, _)));
    }

    #[test]
    fn recovers_legacy_nested_matches_shape() {
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "request": {
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "subscription_id": "550e8400-e29b-41d4-a716-446655440001",
                "prompts": ["find resolutions"]
            },
            "results": {
                "results": [{
                    "matches": [
                        {"prompt": "p1", "documents": [{
                            "title": "Resolución X",
                            "summary": "short",
                            "links": {"html": "https://example.com/a"},
                            "publication_date": "2024-01-01T00:00:00Z"
                        }]},
                        {"prompt": "p2", "documents": []}
                    ]
                }]
            }
        }));
        let envelope = validate(&body, &[]).unwrap();
        assert_eq!(envelope.results.matches.len(), 2);
    }

    #[test]
    fn empty_matches_gets_placeholder() {
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "request": {
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "subscription_id": "550e8400-e29b-41d4-a716-446655440001",
                "prompts": ["my prompt"]
            },
            "results": {}
        }));
        let envelope = validate(&body, &[]).unwrap();
        assert_eq!(envelope.results.matches.len(), 1);
        assert_eq!(envelope.results.matches[0].prompt, "my prompt");
        assert!(envelope.results.matches[0].documents.is_empty());
    }

    #[test]
    fn defaults_missing_publication_date_to_now() {
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "request": {
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "subscription_id": "550e8400-e29b-41d4-a716-446655440001"
            },
            "results": {"matches": [{"prompt": "p", "documents": [{
                "title": "t",
                "summary": "s",
                "links": {"html": "https://example.com"}
            }]}]}
        }));
        let envelope = validate(&body, &[]).unwrap();
        let doc = &envelope.results.matches[0].documents[0];
        assert!(Utc::now().signed_duration_since(doc.publication_date).num_seconds() < 5);
    }

    #[test]
    fn falls_back_to_top_level_user_id_alias() {
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "user_id": "550e8400-e29b-41d4-a716-446655440000",
            "subscription_id": "550e8400-e29b-41d4-a716-446655440001",
            "request": {},
            "results": {"matches": []}
        }));
        let envelope = validate(&body, &[]).unwrap();
        assert_eq!(envelope.request.user_id, "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn truncates_long_summary() {
        let long_summary = "x".repeat(250);
        let body = sample_envelope(json!({
            "processor_type": "boe",
            "request": {
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "subscription_id": "550e8400-e29b-41d4-a716-446655440001"
            },
            "results": {"matches": [{"prompt": "p", "documents": [{
                "title": "t",
                "summary": long_summary,
                "links": {"html": "https://example.com"},
                "publication_date": "2024-01-01T00:00:00Z"
            }]}]}
        }));
        let envelope = validate(&body, &[]).unwrap();
        let summary = &envelope.results.matches[0].documents[0].summary;
        assert_eq!(summary.chars().count(), SUMMARY_TRUNCATE_CHARS + 3);
        assert!(summary.ends_with("..."));
    }
}
