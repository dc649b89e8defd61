//! Messaging gateway: subscribe to the inbound envelope topic, publish to
//! the email/realtime side channels, and publish to the dead-letter topic.
//! Delivery is at-least-once — handlers must be idempotent or guarded by
//! the dedupe layer one level up.

pub mod error;
pub mod sqs;

pub use error::QueueError;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nf_common::{DlqRecord, EmailTopic, InboundMessage};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub pending_messages: u64,
    pub in_flight_messages: u64,
    pub queue_identifier: String,
    pub total_polled: u64,
    pub total_acked: u64,
    pub total_nacked: u64,
    pub total_deferred: u64,
}

/// Outbound email-topic payload, per the external-interfaces wire contract.
#[derive(Debug, Clone, Serialize)]
pub struct EmailPayload {
    pub user_id: String,
    pub email: String,
    pub notification: EmailNotification,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailNotification {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub subscription_name: String,
}

/// Outbound realtime-topic payload.
#[derive(Debug, Clone, Serialize)]
pub struct RealtimePayload {
    pub user_id: String,
    pub notification: RealtimeNotification,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl RealtimePayload {
    pub fn new(user_id: String, notification: RealtimeNotification) -> Self {
        Self {
            user_id,
            notification,
            kind: "notification",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeNotification {
    pub id: String,
    pub title: String,
    pub content: String,
    pub source_url: Option<String>,
    pub entity_type: String,
    pub created_at: DateTime<Utc>,
}

/// Consumer side of the gateway: one subscription to the inbound envelope
/// topic. `poll`-based rather than push/callback-based so the supervisor's
/// worker-slot loop stays in full control of concurrency.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    fn identifier(&self) -> &str;

    async fn poll(&self, max_messages: u32) -> Result<Vec<InboundMessage>>;

    async fn ack(&self, receipt_handle: &str) -> Result<()>;

    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()>;

    /// Defer without counting as a failure (reserved for future backpressure
    /// use; the worker currently always routes redelivery through `nack`).
    async fn defer(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()> {
        self.nack(receipt_handle, delay_seconds).await
    }

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()>;

    fn is_healthy(&self) -> bool;

    async fn stop(&self);

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Fake consumer that only tracks how `nack` was called, to exercise the
    /// `defer`-delegates-to-`nack` default without a live SQS queue.
    struct RecordingConsumer {
        nack_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl QueueConsumer for RecordingConsumer {
        fn identifier(&self) -> &str {
            "recording"
        }

        async fn poll(&self, _max_messages: u32) -> Result<Vec<InboundMessage>> {
            Ok(Vec::new())
        }

        async fn ack(&self, _receipt_handle: &str) -> Result<()> {
            Ok(())
        }

        async fn nack(&self, _receipt_handle: &str, _delay_seconds: Option<u32>) -> Result<()> {
            self.nack_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn extend_visibility(&self, _receipt_handle: &str, _seconds: u32) -> Result<()> {
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            true
        }

        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn defer_default_impl_delegates_to_nack() {
        let nack_calls = Arc::new(AtomicU32::new(0));
        let consumer = RecordingConsumer {
            nack_calls: nack_calls.clone(),
        };

        consumer.defer("receipt-1", Some(30)).await.unwrap();

        assert_eq!(nack_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_metrics_default_impl_returns_none() {
        let nack_calls = Arc::new(AtomicU32::new(0));
        let consumer = RecordingConsumer { nack_calls };

        assert!(consumer.get_metrics().await.unwrap().is_none());
    }
}

/// Publisher side of the gateway: email (immediate/daily), realtime, DLQ.
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish_email(&self, topic: EmailTopic, payload: &EmailPayload) -> Result<String>;

    async fn publish_realtime(&self, payload: &RealtimePayload) -> Result<String>;

    async fn publish_dlq(&self, record: &DlqRecord) -> Result<String>;

    async fn close(&self);
}
