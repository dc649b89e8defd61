//! Owns the worker-slot polling loop and the pub/sub subscription's health
//! reporting. Construction is plain; lifecycle (start ingesting, stop on
//! shutdown, drain in-flight tasks) lives on [`Supervisor::run`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nf_common::{AckNack, DependencyEvent, DependencySource, InboundMessage};
use nf_queue::QueueConsumer;
use nf_status::ServiceStatus;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::worker::{run_task, TaskContext};

/// Delay before a failed subscription poll is retried. Matches the
/// subscription watcher's reinitialization delay.
const POLL_BACKOFF: Duration = Duration::from_secs(30);

pub struct Supervisor {
    consumer: Arc<dyn QueueConsumer>,
    task_ctx: Arc<TaskContext>,
    status: Arc<ServiceStatus>,
    worker_slots: u32,
    shutdown_grace: Duration,
    running: AtomicBool,
}

impl Supervisor {
    pub fn new(
        consumer: Arc<dyn QueueConsumer>,
        task_ctx: Arc<TaskContext>,
        status: Arc<ServiceStatus>,
        worker_slots: u32,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            consumer,
            task_ctx,
            status,
            worker_slots,
            shutdown_grace,
            running: AtomicBool::new(true),
        }
    }

    /// Spawns one polling task per worker slot and blocks until `shutdown_rx`
    /// fires, then stops ingestion and waits (bounded by `shutdown_grace`)
    /// for whatever tasks are already mid-flight to finish.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut slots = JoinSet::new();
        for slot in 0..self.worker_slots {
            let supervisor = Arc::clone(&self);
            slots.spawn(async move { supervisor.worker_slot_loop(slot).await });
        }

        let _ = shutdown_rx.recv().await;
        info!("supervisor received shutdown signal, no longer accepting new messages");
        self.running.store(false, Ordering::SeqCst);
        self.consumer.stop().await;

        let drained = tokio::time::timeout(self.shutdown_grace, async {
            while slots.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                grace_secs = self.shutdown_grace.as_secs(),
                "shutdown grace period elapsed with worker slots still draining"
            );
            slots.abort_all();
        }
    }

    async fn worker_slot_loop(self: Arc<Self>, slot: u32) {
        while self.running.load(Ordering::SeqCst) {
            let messages = match self.consumer.poll(1).await {
                Ok(messages) => messages,
                Err(err) => {
                    warn!(slot, error = %err, "subscription poll failed, backing off");
                    self.status.handle_event(DependencyEvent::Failed(
                        DependencySource::Subscription,
                        err.to_string(),
                    ));
                    tokio::time::sleep(POLL_BACKOFF).await;
                    continue;
                }
            };

            self.status
                .handle_event(DependencyEvent::Connected(DependencySource::Subscription));

            for message in messages {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                let disposition = run_task(&self.task_ctx, &message).await;
                self.apply_disposition(&message, disposition).await;
            }
        }
    }

    async fn apply_disposition(&self, message: &InboundMessage, disposition: AckNack) {
        let result = match disposition {
            AckNack::Ack => self.consumer.ack(&message.receipt_handle).await,
            AckNack::Nack { delay_seconds } => self.consumer.nack(&message.receipt_handle, delay_seconds).await,
        };

        if let Err(err) = result {
            error!(message_id = %message.id, error = %err, "failed to apply ack/nack disposition to broker");
        }
    }
}
