//! BOE (Boletín Oficial del Estado) processor: maps Spanish official-bulletin
//! documents to notification drafts.

use nf_common::{Document, Envelope, NotificationDraft};
use serde_json::{json, Map, Value};

use crate::{truncate_with_ellipsis, Processor};

const TITLE_MIN_LEN: usize = 3;
const TITLE_MAX_LEN: usize = 80;
const FALLBACK_PROMPT_EXCERPT_LEN: usize = 30;

pub struct BoeProcessor;

impl Processor for BoeProcessor {
    fn processor_type(&self) -> &str {
        "boe"
    }

    fn requires_database(&self) -> bool {
        false
    }

    fn validate(&self, envelope: &Envelope) -> bool {
        envelope.processor_type.as_str() == self.processor_type()
    }

    fn process(&self, envelope: &Envelope) -> Vec<NotificationDraft> {
        let mut drafts = Vec::new();
        for m in &envelope.results.matches {
            for doc in &m.documents {
                drafts.push(build_draft(envelope, &m.prompt, doc));
            }
        }
        drafts
    }
}

/// Whether a candidate title survives the BOE filters: long enough, not the
/// literal placeholder `"string"` some upstream schemas default to, and not
/// self-referential (containing the word "notification").
fn passes_title_filter(candidate: &str) -> bool {
    let trimmed = candidate.trim();
    trimmed.chars().count() > TITLE_MIN_LEN
        && !trimmed.eq_ignore_ascii_case("string")
        && !trimmed.to_lowercase().contains("notification")
}

/// First-winner tie-break per the BOE processor's title selection rule.
fn select_title(doc: &Document, prompt: &str) -> String {
    if let Some(candidate) = doc.notification_title.as_deref() {
        if passes_title_filter(candidate) {
            return candidate.trim().to_string();
        }
    }

    if passes_title_filter(&doc.title) {
        return truncate_with_ellipsis(doc.title.trim(), TITLE_MAX_LEN);
    }

    if let Some(synthesized) = synthesize_title(doc) {
        return synthesized;
    }

    let excerpt = truncate_with_ellipsis(prompt.trim(), FALLBACK_PROMPT_EXCERPT_LEN);
    format!("Alerta BOE: {excerpt}")
}

fn synthesize_title(doc: &Document) -> Option<String> {
    let document_type = doc.document_type.as_deref()?;
    let issuer = doc
        .extra_str("issuing_body")
        .or_else(|| doc.extra_str("department"))?;
    let date = doc.publication_date.format("%d/%m/%Y").to_string();
    Some(format!("{document_type} - {issuer} ({date})"))
}

/// Entity type derived from keyword matching on `document_type`/`title`/
/// `summary`, in that precedence order.
fn classify_entity_type(doc: &Document) -> &'static str {
    let haystack = format!(
        "{} {} {}",
        doc.document_type.as_deref().unwrap_or_default(),
        doc.title,
        doc.summary
    )
    .to_lowercase();

    if haystack.contains("resolucion") || haystack.contains("resolución") {
        "boe:resolution"
    } else if haystack.contains("anuncio") || haystack.contains("convocatoria") {
        "boe:announcement"
    } else {
        "boe:document"
    }
}

fn build_draft(envelope: &Envelope, prompt: &str, doc: &Document) -> NotificationDraft {
    let title = select_title(doc, prompt);
    let entity_type = classify_entity_type(doc).to_string();

    let mut metadata: Map<String, Value> = Map::new();
    metadata.insert("prompt".to_string(), json!(prompt));
    metadata.insert("relevance_score".to_string(), json!(doc.relevance_score));
    metadata.insert(
        "publication_date".to_string(),
        json!(doc.publication_date.to_rfc3339()),
    );
    if let Some(issuing_body) = doc.extra_str("issuing_body") {
        metadata.insert("issuing_body".to_string(), json!(issuing_body));
    }
    if let Some(section) = doc.extra_str("section") {
        metadata.insert("section".to_string(), json!(section));
    }
    if let Some(department) = doc.extra_str("department") {
        metadata.insert("department".to_string(), json!(department));
    }
    if let Some(bulletin_type) = doc.extra_str("bulletin_type") {
        metadata.insert("bulletin_type".to_string(), json!(bulletin_type));
    }
    metadata.insert("original_title".to_string(), json!(doc.title));
    metadata.insert("processor_type".to_string(), json!("boe"));
    metadata.insert("trace_id".to_string(), json!(envelope.trace_id));

    NotificationDraft {
        user_id: envelope.request.user_id.clone(),
        subscription_id: envelope.request.subscription_id.clone(),
        title,
        content: doc.summary.clone(),
        source_url: doc.links.html.clone(),
        entity_type,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nf_common::Links;

    fn base_doc() -> Document {
        Document {
            title: "Resolución de concesión de subvenciones".to_string(),
            notification_title: None,
            summary: "Summary text".to_string(),
            links: Links {
                html: "https://boe.es/doc/1".to_string(),
                pdf: None,
            },
            relevance_score: 0.8,
            publication_date: Utc::now(),
            document_type: Some("Resolución".to_string()),
            extra: Map::new(),
        }
    }

    #[test]
    fn prefers_notification_title_when_it_passes_filters() {
        let mut doc = base_doc();
        doc.notification_title = Some("Convocatoria de ayudas 2024".to_string());
        assert_eq!(select_title(&doc, "prompt"), "Convocatoria de ayudas 2024");
    }

    #[test]
    fn rejects_notification_title_literal_string() {
        let mut doc = base_doc();
        doc.notification_title = Some("string".to_string());
        assert_eq!(select_title(&doc, "prompt"), doc.title);
    }

    #[test]
    fn rejects_notification_title_containing_notification_word() {
        let mut doc = base_doc();
        doc.notification_title = Some("New notification arrived".to_string());
        assert_eq!(select_title(&doc, "prompt"), doc.title);
    }

    #[test]
    fn falls_back_to_title_when_notification_title_too_short() {
        let mut doc = base_doc();
        doc.notification_title = Some("Hi".to_string());
        assert_eq!(select_title(&doc, "prompt"), doc.title);
    }

    #[test]
    fn truncates_long_title() {
        let mut doc = base_doc();
        doc.title = "x".repeat(200);
        let title = select_title(&doc, "prompt");
        assert_eq!(title.chars().count(), TITLE_MAX_LEN + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn synthesizes_title_when_core_fields_fail_filters() {
        let mut doc = base_doc();
        doc.title = "no".to_string();
        doc.extra.insert("issuing_body".to_string(), json!("Ministerio de Hacienda"));
        let title = select_title(&doc, "prompt");
        assert!(title.starts_with("Resolución - Ministerio de Hacienda ("));
    }

    #[test]
    fn falls_back_to_alerta_boe_with_prompt_excerpt() {
        let mut doc = base_doc();
        doc.title = "no".to_string();
        doc.document_type = None;
        let title = select_title(&doc, "a very long prompt that exceeds thirty characters easily");
        assert!(title.starts_with("Alerta BOE: "));
    }

    #[test]
    fn classifies_resolution_entity_type() {
        let doc = base_doc();
        assert_eq!(classify_entity_type(&doc), "boe:resolution");
    }

    #[test]
    fn classifies_announcement_entity_type() {
        let mut doc = base_doc();
        doc.document_type = Some("Anuncio".to_string());
        doc.title = "Convocatoria publica".to_string();
        assert_eq!(classify_entity_type(&doc), "boe:announcement");
    }

    #[test]
    fn defaults_to_generic_document_entity_type() {
        let mut doc = base_doc();
        doc.document_type = Some("Orden".to_string());
        doc.title = "Orden ministerial".to_string();
        doc.summary = "plain summary".to_string();
        assert_eq!(classify_entity_type(&doc), "boe:document");
    }
}
