//! Real-estate processor: maps property listings to notification drafts.

use nf_common::{Document, Envelope, NotificationDraft};
use serde_json::{json, Map, Value};

use crate::Processor;

pub struct RealEstateProcessor;

impl Processor for RealEstateProcessor {
    fn processor_type(&self) -> &str {
        "real-estate"
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

/// Formats a price as Euros with zero fraction digits and `.`-grouped
/// thousands, e.g. `245000.0 -> "245.000 €"`.
fn format_price_eur(price: f64) -> String {
    let rounded = price.round() as i64;
    let negative = rounded < 0;
    let digits = rounded.unsigned_abs().to_string();

    let mut grouped = String::new();
    for (i, ch) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-{grouped} \u{20ac}")
    } else {
        format!("{grouped} \u{20ac}")
    }
}

fn build_draft(envelope: &Envelope, prompt: &str, doc: &Document) -> NotificationDraft {
    let price = doc.extra_f64("price").unwrap_or(0.0);
    let property_type = doc.extra_str("property_type").unwrap_or("Propiedad");
    let city = doc
        .extra
        .get("location")
        .and_then(|loc| loc.get("city"))
        .and_then(Value::as_str)
        .unwrap_or("ubicación desconocida");
    let region = doc
        .extra
        .get("location")
        .and_then(|loc| loc.get("region"))
        .and_then(Value::as_str);

    let title = format!("{} - {property_type} en {city}", format_price_eur(price));

    let mut content = doc.summary.clone();
    if let Some(size_sqm) = doc.extra_f64("size_sqm") {
        content.push_str(&format!(" Superficie: {} m\u{b2}.", size_sqm as i64));
    }
    if let Some(rooms) = doc.extra_u64("rooms") {
        content.push_str(&format!(" Habitaciones: {rooms}."));
    }

    let mut metadata: Map<String, Value> = Map::new();
    metadata.insert("prompt".to_string(), json!(prompt));
    metadata.insert("relevance_score".to_string(), json!(doc.relevance_score));
    metadata.insert("price".to_string(), json!(price));
    metadata.insert(
        "location".to_string(),
        json!({ "city": city, "region": region }),
    );
    metadata.insert("property_type".to_string(), json!(property_type));
    if let Some(size_sqm) = doc.extra_f64("size_sqm") {
        metadata.insert("size_sqm".to_string(), json!(size_sqm));
    }
    if let Some(rooms) = doc.extra_u64("rooms") {
        metadata.insert("rooms".to_string(), json!(rooms));
    }
    metadata.insert("trace_id".to_string(), json!(envelope.trace_id));

    NotificationDraft {
        user_id: envelope.request.user_id.clone(),
        subscription_id: envelope.request.subscription_id.clone(),
        title,
        content,
        source_url: doc.links.html.clone(),
        entity_type: "real-estate:listing".to_string(),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nf_common::Links;

    fn base_doc() -> Document {
        let mut extra = Map::new();
        extra.insert("price".to_string(), json!(245000.0));
        extra.insert("property_type".to_string(), json!("Piso"));
        extra.insert(
            "location".to_string(),
            json!({ "city": "Madrid", "region": "Comunidad de Madrid" }),
        );
        Document {
            title: "Piso en venta".to_string(),
            notification_title: None,
            summary: "Bonito piso reformado".to_string(),
            links: Links {
                html: "https://example.com/listing/1".to_string(),
                pdf: None,
            },
            relevance_score: 0.75,
            publication_date: Utc::now(),
            document_type: Some("listing".to_string()),
            extra,
        }
    }

    #[test]
    fn formats_price_with_thousands_separator() {
        assert_eq!(format_price_eur(245000.0), "245.000 \u{20ac}");
        assert_eq!(format_price_eur(999.0), "999 \u{20ac}");
        assert_eq!(format_price_eur(1_500_000.0), "1.500.000 \u{20ac}");
    }

    #[test]
    fn title_uses_euro_price_type_and_city() {
        let doc = base_doc();
        let envelope = super::super::tests_support::envelope_with_doc("real-estate", doc.clone());
        let drafts = RealEstateProcessor.process(&envelope);
        assert_eq!(drafts[0].title, "245.000 \u{20ac} - Piso en Madrid");
    }

    #[test]
    fn content_appends_size_and_rooms_when_present() {
        let mut doc = base_doc();
        doc.extra.insert("size_sqm".to_string(), json!(80.0));
        doc.extra.insert("rooms".to_string(), json!(3));
        let envelope = super::super::tests_support::envelope_with_doc("real-estate", doc);
        let drafts = RealEstateProcessor.process(&envelope);
        assert!(drafts[0].content.contains("Superficie: 80 m\u{b2}."));
        assert!(drafts[0].content.contains("Habitaciones: 3."));
    }

    #[test]
    fn entity_type_is_always_listing() {
        let doc = base_doc();
        let envelope = super::super::tests_support::envelope_with_doc("real-estate", doc);
        let drafts = RealEstateProcessor.process(&envelope);
        assert_eq!(drafts[0].entity_type, "real-estate:listing");
    }
}
