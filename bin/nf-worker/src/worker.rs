//! Per-message task pipeline: validate -> dispatch -> persist -> ack/nack.
//!
//! Each inbound message is one logical task, run to completion (including
//! ack/nack) before the worker slot that picked it up polls again. A task
//! deadline bounds the whole pipeline; expiring it is treated the same as a
//! transient `Timeout` failure.

use std::sync::Arc;
use std::time::Duration;

use nf_common::{with_retry, AckNack, InboundMessage, NotifyError, RetryPolicy};
use nf_notify::NotificationService;
use nf_processors::ProcessorRegistry;
use nf_queue::QueuePublisher;
use nf_status::ServiceStatus;
use tracing::{error, info, warn};

use crate::dlq::build_dlq_record;

pub struct TaskContext {
    pub registry: Arc<ProcessorRegistry>,
    pub notify: Arc<NotificationService>,
    pub publisher: Arc<dyn QueuePublisher>,
    pub status: Arc<ServiceStatus>,
    pub task_deadline: Duration,
    pub task_retry: RetryPolicy,
}

/// Runs one message through the full pipeline and returns the disposition
/// the caller should apply (ack the message or request broker redelivery).
pub async fn run_task(ctx: &TaskContext, message: &InboundMessage) -> AckNack {
    if !ctx.status.mode().is_healthy() {
        warn!(
            mode = ?ctx.status.mode(),
            "database unavailable, leaving message for redelivery instead of spending the task deadline on a doomed attempt"
        );
        return AckNack::Nack { delay_seconds: None };
    }

    let known_types = ctx.registry.known_types();

    let outcome = tokio::time::timeout(ctx.task_deadline, attempt_with_retry(ctx, &message.data, &known_types)).await;

    match outcome {
        Ok(Ok(())) => AckNack::Ack,
        Ok(Err(err)) => dispose_of_failure(ctx, &message.data, &err).await,
        Err(_) => {
            let err = NotifyError::Timeout(format!(
                "task deadline of {:?} exceeded for message {}",
                ctx.task_deadline, message.id
            ));
            dispose_of_failure(ctx, &message.data, &err).await
        }
    }
}

/// Retries the whole validate->dispatch->persist attempt for errors the
/// taxonomy marks retryable (`DbConnection`, `PubSubConnection`, `Timeout`);
/// everything else returns on the first attempt.
async fn attempt_with_retry(
    ctx: &TaskContext,
    raw: &[u8],
    known_types: &[String],
) -> Result<(), NotifyError> {
    with_retry(&ctx.task_retry, NotifyError::is_retryable, || {
        process_once(ctx, raw, known_types)
    })
    .await
}

async fn process_once(ctx: &TaskContext, raw: &[u8], known_types: &[String]) -> Result<(), NotifyError> {
    let envelope = nf_validate::validate(raw, known_types)?;

    let trace_id = envelope.trace_id.clone();
    let drafts = ctx.registry.dispatch(envelope)?;

    let outcome = ctx.notify.process_batch(drafts).await?;

    info!(
        trace_id,
        created = outcome.created,
        errors = outcome.errors,
        duplicates = outcome.duplicates,
        "task completed"
    );

    Ok(())
}

/// Every failure that reaches this point (as opposed to the upfront
/// health-gate `Nack`) has either already exhausted `attempt_with_retry`'s
/// backoff or is non-replayable by definition, so DLQ-and-ack is the only
/// sensible disposition left.
async fn dispose_of_failure(ctx: &TaskContext, raw: &[u8], err: &NotifyError) -> AckNack {
    if matches!(err, NotifyError::DbPermission(_)) {
        error!(error = %err, "RLS permission denial: check database role/policy configuration");
    }

    let record = build_dlq_record(raw, err);
    if let Err(publish_err) = ctx.publisher.publish_dlq(&record).await {
        error!(
            error = %err,
            publish_error = %publish_err,
            "failed to publish to DLQ; acking anyway to avoid a redelivery loop on an unreplayable message"
        );
    } else {
        warn!(error = %err, "message routed to DLQ");
    }

    AckNack::Ack
}
