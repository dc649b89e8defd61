//! AWS SQS-backed consumer and publisher.

use async_trait::async_trait;
use aws_sdk_sqs::{types::QueueAttributeName, Client};
use chrono::Utc;
use nf_common::{DlqRecord, EmailTopic, InboundMessage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, info};

use crate::{EmailPayload, QueueConsumer, QueueError, QueueMetrics, QueuePublisher, RealtimePayload, Result};

/// Default long-poll wait time. Balances efficiency against shutdown
/// responsiveness; SQS's hard cap is 20 seconds.
const DEFAULT_WAIT_TIME_SECONDS: i32 = 5;

pub struct SqsConsumer {
    client: Client,
    queue_url: String,
    queue_name: String,
    visibility_timeout_seconds: i32,
    wait_time_seconds: i32,
    running: AtomicBool,
    total_polled: AtomicU64,
    total_acked: AtomicU64,
    total_nacked: AtomicU64,
    total_deferred: AtomicU64,
}

impl SqsConsumer {
    pub fn new(client: Client, queue_url: String, visibility_timeout_seconds: i32) -> Self {
        let queue_name = queue_url.rsplit('/').next().unwrap_or("unknown").to_string();
        Self {
            client,
            queue_url,
            queue_name,
            visibility_timeout_seconds,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            running: AtomicBool::new(true),
            total_polled: AtomicU64::new(0),
            total_acked: AtomicU64::new(0),
            total_nacked: AtomicU64::new(0),
            total_deferred: AtomicU64::new(0),
        }
    }

    pub fn with_wait_time_seconds(mut self, seconds: i32) -> Self {
        self.wait_time_seconds = seconds.clamp(0, 20);
        self
    }
}

#[async_trait]
impl QueueConsumer for SqsConsumer {
    fn identifier(&self) -> &str {
        &self.queue_name
    }

    async fn poll(&self, max_messages: u32) -> Result<Vec<InboundMessage>> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(QueueError::Stopped);
        }

        let result = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(max_messages.min(10) as i32)
            .visibility_timeout(self.visibility_timeout_seconds)
            .wait_time_seconds(self.wait_time_seconds)
            .message_attribute_names("All")
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        let sqs_messages = result.messages.unwrap_or_default();
        let mut messages = Vec::with_capacity(sqs_messages.len());

        for msg in sqs_messages {
            let receipt_handle = match msg.receipt_handle() {
                Some(h) => h.to_string(),
                None => {
                    error!(queue = %self.queue_name, "SQS message missing receipt handle, skipping");
                    continue;
                }
            };
            let data = msg.body().unwrap_or_default().as_bytes().to_vec();
            let attributes: HashMap<String, String> = msg
                .message_attributes()
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter_map(|(k, v)| v.string_value().map(|s| (k.clone(), s.to_string())))
                        .collect()
                })
                .unwrap_or_default();

            messages.push(InboundMessage {
                id: msg.message_id().unwrap_or_default().to_string(),
                publish_time: Utc::now(),
                attributes,
                data,
                receipt_handle,
            });
        }

        if !messages.is_empty() {
            self.total_polled.fetch_add(messages.len() as u64, Ordering::Relaxed);
            debug!(queue = %self.queue_name, count = messages.len(), "polled messages from SQS");
        }

        Ok(messages)
    }

    async fn ack(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        self.total_acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(&self, receipt_handle: &str, delay_seconds: Option<u32>) -> Result<()> {
        let visibility_timeout = delay_seconds.unwrap_or(0) as i32;
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(visibility_timeout)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        self.total_nacked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn extend_visibility(&self, receipt_handle: &str, seconds: u32) -> Result<()> {
        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .visibility_timeout(seconds as i32)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!(queue = %self.queue_name, "SQS consumer stopped");
    }

    async fn get_metrics(&self) -> Result<Option<QueueMetrics>> {
        let result = self
            .client
            .get_queue_attributes()
            .queue_url(&self.queue_url)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessages)
            .attribute_names(QueueAttributeName::ApproximateNumberOfMessagesNotVisible)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        let attributes = result.attributes();
        let pending_messages = attributes
            .and_then(|a| a.get(&QueueAttributeName::ApproximateNumberOfMessages))
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let in_flight_messages = attributes
            .and_then(|a| a.get(&QueueAttributeName::ApproximateNumberOfMessagesNotVisible))
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);

        Ok(Some(QueueMetrics {
            pending_messages,
            in_flight_messages,
            queue_identifier: self.queue_name.clone(),
            total_polled: self.total_polled.load(Ordering::Relaxed),
            total_acked: self.total_acked.load(Ordering::Relaxed),
            total_nacked: self.total_nacked.load(Ordering::Relaxed),
            total_deferred: self.total_deferred.load(Ordering::Relaxed),
        }))
    }
}

/// Publishes to the email/realtime/DLQ topics, each modeled as a distinct
/// SQS queue URL (the worker treats "topic" and "queue" as the same thing;
/// fanout to multiple subscribers, if any, happens outside this process).
pub struct SqsPublisher {
    client: Client,
    email_immediate_url: String,
    email_daily_url: String,
    realtime_url: String,
    dlq_url: String,
}

impl SqsPublisher {
    pub fn new(
        client: Client,
        email_immediate_url: String,
        email_daily_url: String,
        realtime_url: String,
        dlq_url: String,
    ) -> Self {
        Self {
            client,
            email_immediate_url,
            email_daily_url,
            realtime_url,
            dlq_url,
        }
    }

    async fn send_json(&self, queue_url: &str, body: &str) -> Result<String> {
        let result = self
            .client
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(|e| QueueError::Sqs(e.to_string()))?;

        Ok(result.message_id().unwrap_or_default().to_string())
    }
}

#[async_trait]
impl QueuePublisher for SqsPublisher {
    async fn publish_email(&self, topic: EmailTopic, payload: &EmailPayload) -> Result<String> {
        let queue_url = match topic {
            EmailTopic::Immediate => &self.email_immediate_url,
            EmailTopic::Daily => &self.email_daily_url,
        };
        let body = serde_json::to_string(payload)?;
        self.send_json(queue_url, &body).await
    }

    async fn publish_realtime(&self, payload: &RealtimePayload) -> Result<String> {
        let body = serde_json::to_string(payload)?;
        self.send_json(&self.realtime_url, &body).await
    }

    async fn publish_dlq(&self, record: &DlqRecord) -> Result<String> {
        let body = serde_json::to_string(record)?;
        self.send_json(&self.dlq_url, &body).await
    }

    async fn close(&self) {
        info!("SQS publisher closed");
    }
}
