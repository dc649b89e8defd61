//! Notification-fanout worker.
//!
//! Wires the configuration, secrets, database, messaging, processor, and
//! status crates together, runs the worker-slot polling loop alongside an
//! HTTP diagnostics server, and shuts both down on Ctrl+C/SIGTERM.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `NOTIFY_CONFIG` | - | Path to a TOML config file |
//! | `NOTIFY_SECRET_DATABASE_URL` | - | Database connection string (env secrets provider) |
//! | `NOTIFY_LOG_LEVEL` | `info` | `RUST_LOG`-style filter, used when `RUST_LOG` itself is unset |
//! | `LOG_FORMAT` | text | `json` for structured log output |

mod dlq;
mod health;
mod supervisor;
mod worker;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sqs::Client as SqsClient;
use nf_common::{EventSink, RetryPolicy};
use nf_db::{DbGatewayConfig, PostgresGateway, SharedDatabase};
use nf_notify::{NotificationService, NotificationServiceConfig};
use nf_processors::{BoeProcessor, ProcessorRegistry, RealEstateProcessor};
use nf_queue::sqs::{SqsConsumer, SqsPublisher};
use nf_queue::{QueueConsumer, QueuePublisher};
use nf_status::ServiceStatus;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

use crate::supervisor::Supervisor;
use crate::worker::TaskContext;

#[tokio::main]
async fn main() -> Result<()> {
    let config = nf_config::ConfigLoader::new().load().context("loading configuration")?;

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &config.log_level);
    }
    nf_common::logging::init_logging("nf-worker");

    info!("starting notification-fanout worker");

    let secrets_config = nf_secrets::SecretsConfig {
        provider: config.secrets.provider.clone(),
        encryption_key: resolve_encryption_key(&config.secrets)?,
        data_dir: PathBuf::from(&config.secrets.data_dir),
    };
    let secrets = nf_secrets::create_provider(&secrets_config)
        .await
        .context("constructing secrets provider")?;

    let database_url = nf_secrets::resolve_reference(secrets.as_ref(), &config.database.url_secret_ref)
        .await
        .context("resolving database connection string")?;

    let status = Arc::new(ServiceStatus::new());

    let db: SharedDatabase = {
        let status_for_sink = Arc::clone(&status);
        let sink: EventSink = Arc::new(move |event| status_for_sink.handle_event(event));
        Arc::new(
            PostgresGateway::new(
                database_url,
                DbGatewayConfig {
                    pool_max_size: config.database.pool_max_size,
                    connect_timeout: Duration::from_secs(config.database.connect_timeout_secs),
                    startup_probe_attempts: config.database.startup_probe_attempts,
                },
            )
            .with_event_sink(sink),
        )
    };
    probe_database(db.as_ref()).await;

    let aws_shared_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.pubsub.sqs.region.clone()))
        .load()
        .await;
    let sqs_client = SqsClient::new(&aws_shared_config);

    let queue_urls = init_pubsub_with_recovery(&sqs_client, &config.pubsub, &status).await;
    let ResolvedQueueUrls {
        subscription_url,
        dlq_url,
        email_immediate_url,
        email_daily_url,
        realtime_url,
    } = queue_urls;

    let consumer: Arc<dyn QueueConsumer> = Arc::new(
        SqsConsumer::new(
            sqs_client.clone(),
            subscription_url,
            config.pubsub.sqs.visibility_timeout_seconds,
        )
        .with_wait_time_seconds(config.pubsub.sqs.wait_time_seconds),
    );
    let publisher: Arc<dyn QueuePublisher> = Arc::new(SqsPublisher::new(
        sqs_client,
        email_immediate_url,
        email_daily_url,
        realtime_url,
        dlq_url,
    ));
    status.handle_event(nf_common::DependencyEvent::Connected(
        nf_common::DependencySource::PubSub,
    ));

    let mut registry = ProcessorRegistry::new();
    registry
        .register(Arc::new(BoeProcessor))
        .context("registering boe processor")?;
    registry
        .register(Arc::new(RealEstateProcessor))
        .context("registering real-estate processor")?;
    let registry = Arc::new(registry);

    let notify = Arc::new(NotificationService::new(
        Arc::clone(&db),
        Arc::clone(&publisher),
        NotificationServiceConfig {
            dedupe_window_minutes: config.dedupe.window_minutes,
        },
    ));

    let task_retry = RetryPolicy::new(
        config.retry.db_max_attempts.max(config.retry.pubsub_max_attempts),
        Duration::from_millis(config.retry.initial_delay_ms),
        config.retry.factor,
    );
    let task_ctx = Arc::new(TaskContext {
        registry: Arc::clone(&registry),
        notify,
        publisher: Arc::clone(&publisher),
        status: Arc::clone(&status),
        task_deadline: Duration::from_secs(config.concurrency.task_deadline_secs),
        task_retry,
    });

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let supervisor_handle = {
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&consumer),
            task_ctx,
            Arc::clone(&status),
            config.concurrency.worker_slots,
            Duration::from_secs(config.concurrency.shutdown_grace_secs),
        ));
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { supervisor.run(shutdown_rx).await })
    };

    let health_state = health::HealthState {
        status: Arc::clone(&status),
        db: Arc::clone(&db),
        consumer: Arc::clone(&consumer),
        known_processor_types: registry.known_types(),
    };
    let http_addr = SocketAddr::new(config.http.host.parse().context("parsing http.host")?, config.http.port);
    let http_listener = tokio::net::TcpListener::bind(http_addr)
        .await
        .context("binding diagnostics HTTP listener")?;
    info!(%http_addr, "diagnostics server listening");

    let http_handle = {
        let mut shutdown_rx = shutdown_tx.subscribe();
        let app = health::router(health_state);
        tokio::spawn(async move {
            axum::serve(http_listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
                .ok();
        })
    };

    info!("notification-fanout worker started");
    shutdown_signal().await;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    publisher.close().await;

    let _ = tokio::time::timeout(
        Duration::from_secs(config.concurrency.shutdown_grace_secs + 5),
        async {
            let _ = supervisor_handle.await;
            let _ = http_handle.await;
        },
    )
    .await;

    info!("notification-fanout worker shutdown complete");
    Ok(())
}

struct ResolvedQueueUrls {
    subscription_url: String,
    dlq_url: String,
    email_immediate_url: String,
    email_daily_url: String,
    realtime_url: String,
}

/// Resolves every queue URL the worker needs up front. On failure, marks the
/// pub/sub dependency down and retries on `reinit_delay_secs` (default 30s)
/// until it succeeds, per the supervisor's pub/sub recovery contract — there
/// is no useful degraded mode to start in without a subscription to poll.
async fn init_pubsub_with_recovery(
    client: &SqsClient,
    config: &nf_config::PubSubConfig,
    status: &ServiceStatus,
) -> ResolvedQueueUrls {
    loop {
        match try_resolve_all_queue_urls(client, config).await {
            Ok(urls) => return urls,
            Err(err) => {
                status.handle_event(nf_common::DependencyEvent::Failed(
                    nf_common::DependencySource::PubSub,
                    err.to_string(),
                ));
                tracing::warn!(
                    error = %err,
                    retry_in_secs = config.reinit_delay_secs,
                    "pub/sub initialization failed, scheduling recovery attempt"
                );
                tokio::time::sleep(Duration::from_secs(config.reinit_delay_secs)).await;
            }
        }
    }
}

async fn try_resolve_all_queue_urls(
    client: &SqsClient,
    config: &nf_config::PubSubConfig,
) -> Result<ResolvedQueueUrls> {
    Ok(ResolvedQueueUrls {
        subscription_url: resolve_queue_url(client, &config.subscription_name).await?,
        dlq_url: resolve_queue_url(client, &config.dlq_topic).await?,
        email_immediate_url: resolve_queue_url(client, &config.email_immediate_topic).await?,
        email_daily_url: resolve_queue_url(client, &config.email_daily_topic).await?,
        realtime_url: resolve_queue_url(client, &config.realtime_topic).await?,
    })
}

fn resolve_encryption_key(secrets: &nf_config::SecretsConfig) -> Result<Option<String>> {
    match &secrets.encryption_key_secret_ref {
        Some(var_name) => {
            let value = std::env::var(var_name)
                .with_context(|| format!("{var_name} is required for the encrypted secrets provider"))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Connectivity probe ahead of the first real query: one attempt, then a
/// single retry after a 5-second pause. The gateway's own internal retry
/// policy governs everything after this; this is just an early, loud signal
/// that the status endpoint reflects reality from the moment traffic starts
/// flowing rather than waiting for the first message to surface it.
async fn probe_database(db: &dyn nf_db::Database) {
    if db.query("SELECT 1", &[]).await.is_ok() {
        return;
    }

    tracing::warn!("initial database probe failed, retrying once in 5 seconds");
    tokio::time::sleep(Duration::from_secs(5)).await;

    if let Err(err) = db.query("SELECT 1", &[]).await {
        tracing::error!(error = %err, "database still unreachable after startup retry; continuing in degraded mode");
    }
}

async fn resolve_queue_url(client: &SqsClient, queue_name: &str) -> Result<String> {
    let result = client
        .get_queue_url()
        .queue_name(queue_name)
        .send()
        .await
        .with_context(|| format!("resolving queue URL for '{queue_name}'"))?;

    result
        .queue_url()
        .map(str::to_string)
        .with_context(|| format!("SQS did not return a queue URL for '{queue_name}'"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
