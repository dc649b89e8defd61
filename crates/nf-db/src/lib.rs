//! Pooled Postgres access with row-level-security-scoped transactions.
//!
//! Exposes `query`, `exec`, and `with_rls_context` on the [`Database`] trait.
//! `with_rls_context` begins a transaction, sets the session-local variable
//! `app.current_user_id` to a validated user id, runs the caller's closure
//! with the transactional handle, and commits; any error rolls back. The
//! user id is validated against a canonical UUID pattern before it is
//! interpolated into the `SET LOCAL` statement, because Postgres does not
//! accept bind parameters on session-variable assignment — rejecting
//! non-UUIDs closes the only injection vector this gateway has.

mod classify;

pub use classify::{is_connection_error, is_permission_error};

use async_trait::async_trait;
use nf_common::{with_retry, DependencyEvent, DependencySource, EventSink, NotifyError, Result, RetryPolicy};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Read-only snapshot of pool state, exposed to the status component.
#[derive(Debug, Clone, Default)]
pub struct PoolSnapshot {
    pub size: u32,
    pub idle: u32,
    pub num_waiting: u32,
    pub last_success_epoch_ms: i64,
    pub last_error_epoch_ms: i64,
}

#[derive(Debug, Clone)]
pub struct DbGatewayConfig {
    pub pool_max_size: u32,
    pub connect_timeout: Duration,
    pub startup_probe_attempts: u32,
}

impl Default for DbGatewayConfig {
    fn default() -> Self {
        Self {
            pool_max_size: 10,
            connect_timeout: Duration::from_secs(10),
            startup_probe_attempts: 3,
        }
    }
}

/// Database access contract. A trait rather than a bare struct so
/// `nf-notify` and `nf-processors` can be tested against an in-memory fake
/// without a live Postgres instance.
#[async_trait]
pub trait Database: Send + Sync {
    async fn query(&self, sql: &str, args: &[&(dyn ToSqlArg + Sync)]) -> Result<Vec<PgRow>>;
    async fn exec(&self, sql: &str, args: &[&(dyn ToSqlArg + Sync)]) -> Result<u64>;

    async fn with_rls_context<'a>(
        &'a self,
        user_id: &str,
        f: RlsWork<'a>,
    ) -> Result<()>;

    fn pool_snapshot(&self) -> PoolSnapshot;
}

/// Object-safe stand-in for `sqlx::Encode` so `Database::query`/`exec` can
/// take a trait object slice of heterogeneous bind parameters.
pub trait ToSqlArg: Send + Sync {
    fn bind_str(&self) -> Option<&str> {
        None
    }
}

impl ToSqlArg for str {
    fn bind_str(&self) -> Option<&str> {
        Some(self)
    }
}

impl ToSqlArg for String {
    fn bind_str(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

/// A unit of work run inside an RLS-scoped transaction. Boxed because async
/// closures taking a borrowed transaction aren't expressible as a plain `Fn`
/// bound without existential lifetimes.
pub type RlsWork<'a> = Box<
    dyn for<'c> FnOnce(
            &'c mut Transaction<'_, Postgres>,
        ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'c>>
        + Send
        + 'a,
>;

/// UUID validation applied before any value is interpolated into a
/// session-local `SET LOCAL` statement. Any UUID version is accepted; the
/// point is shape, not provenance.
fn validate_uuid(user_id: &str) -> Result<()> {
    uuid::Uuid::parse_str(user_id)
        .map(|_| ())
        .map_err(|_| NotifyError::DbPermission(format!("not a valid UUID: {user_id}")))
}

pub struct PostgresGateway {
    pool: RwLock<Option<PgPool>>,
    database_url: String,
    config: DbGatewayConfig,
    last_success_epoch_ms: AtomicI64,
    last_error_epoch_ms: AtomicI64,
    event_sink: Option<EventSink>,
}

impl PostgresGateway {
    /// Constructs the gateway without connecting. The pool is built lazily
    /// and single-flighted: the first caller to reach `ensure_pool` holds
    /// the write lock for the duration of the connect+probe, so concurrent
    /// callers simply await the same attempt instead of racing to dial out.
    pub fn new(database_url: impl Into<String>, config: DbGatewayConfig) -> Self {
        Self {
            pool: RwLock::new(None),
            database_url: database_url.into(),
            config,
            last_success_epoch_ms: AtomicI64::new(0),
            last_error_epoch_ms: AtomicI64::new(0),
            event_sink: None,
        }
    }

    /// Registers a callback invoked on every successful and failed database
    /// operation, so a supervisor can drive `nf-status` off live gateway
    /// activity instead of polling `pool_snapshot` on a timer.
    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.event_sink = Some(sink);
        self
    }

    async fn ensure_pool(&self) -> Result<PgPool> {
        if let Some(pool) = self.pool.read().await.as_ref() {
            return Ok(pool.clone());
        }

        let mut guard = self.pool.write().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.config.pool_max_size)
            .acquire_timeout(self.config.connect_timeout)
            .connect_lazy(&self.database_url)
            .map_err(|e| NotifyError::DbConnection(e.to_string()))?;

        self.probe(&pool).await?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// `SELECT 1` with a 10-second cap per attempt, exponential backoff
    /// (1s, 2s, 4s) across up to `startup_probe_attempts` tries.
    async fn probe(&self, pool: &PgPool) -> Result<()> {
        let policy = RetryPolicy::new(
            self.config.startup_probe_attempts,
            Duration::from_secs(1),
            2.0,
        );

        let result = with_retry(&policy, is_connection_error, || async {
            tokio::time::timeout(Duration::from_secs(10), sqlx::query("SELECT 1").execute(pool))
                .await
                .map_err(|_| sqlx::Error::PoolTimedOut)?
        })
        .await;

        match result {
            Ok(_) => {
                self.mark_success();
                info!("database connectivity probe succeeded");
                Ok(())
            }
            Err(e) => {
                self.mark_fatal_error(e.to_string());
                Err(NotifyError::DbConnection(e.to_string()))
            }
        }
    }

    fn mark_success(&self) {
        self.last_success_epoch_ms
            .store(now_epoch_ms(), Ordering::Relaxed);
        if let Some(sink) = &self.event_sink {
            sink(DependencyEvent::Connected(DependencySource::Database));
        }
    }

    fn mark_error(&self) {
        self.last_error_epoch_ms
            .store(now_epoch_ms(), Ordering::Relaxed);
    }

    fn mark_fatal_error(&self, detail: String) {
        self.mark_error();
        if let Some(sink) = &self.event_sink {
            sink(DependencyEvent::Failed(DependencySource::Database, detail));
        }
    }

    /// Fatal errors (connection class, surfaced from a live query rather
    /// than the startup probe) drop the cached pool so the next caller
    /// rebuilds it instead of hammering a pool that's wedged.
    async fn reinit(&self, detail: String) {
        warn!("resetting database pool after a fatal connection error");
        *self.pool.write().await = None;
        if let Some(sink) = &self.event_sink {
            sink(DependencyEvent::Failed(DependencySource::Database, detail));
        }
    }
}

fn now_epoch_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl Database for PostgresGateway {
    async fn query(&self, sql: &str, args: &[&(dyn ToSqlArg + Sync)]) -> Result<Vec<PgRow>> {
        let pool = self.ensure_pool().await?;
        let policy = RetryPolicy::default();

        let result = with_retry(&policy, is_connection_error, || async {
            let mut q = sqlx::query(sql);
            for arg in args {
                if let Some(s) = arg.bind_str() {
                    q = q.bind(s);
                }
            }
            q.fetch_all(&pool).await
        })
        .await;

        match result {
            Ok(rows) => {
                self.mark_success();
                Ok(rows)
            }
            Err(e) => {
                self.mark_error();
                if is_connection_error(&e) {
                    self.reinit(e.to_string()).await;
                    Err(NotifyError::DbConnection(e.to_string()))
                } else if is_permission_error(&e) {
                    Err(NotifyError::DbPermission(e.to_string()))
                } else {
                    Err(NotifyError::DbQuery(e.to_string()))
                }
            }
        }
    }

    async fn exec(&self, sql: &str, args: &[&(dyn ToSqlArg + Sync)]) -> Result<u64> {
        let pool = self.ensure_pool().await?;
        let policy = RetryPolicy::default();

        let result = with_retry(&policy, is_connection_error, || async {
            let mut q = sqlx::query(sql);
            for arg in args {
                if let Some(s) = arg.bind_str() {
                    q = q.bind(s);
                }
            }
            q.execute(&pool).await
        })
        .await;

        match result {
            Ok(done) => {
                self.mark_success();
                Ok(done.rows_affected())
            }
            Err(e) => {
                self.mark_error();
                if is_connection_error(&e) {
                    self.reinit(e.to_string()).await;
                    Err(NotifyError::DbConnection(e.to_string()))
                } else if is_permission_error(&e) {
                    Err(NotifyError::DbPermission(e.to_string()))
                } else {
                    Err(NotifyError::DbQuery(e.to_string()))
                }
            }
        }
    }

    async fn with_rls_context<'a>(&'a self, user_id: &str, f: RlsWork<'a>) -> Result<()> {
        validate_uuid(user_id)?;
        let pool = self.ensure_pool().await?;

        let mut tx = pool
            .begin()
            .await
            .map_err(|e| NotifyError::DbTransaction(e.to_string()))?;

        let set_local = format!("SET LOCAL app.current_user_id = '{user_id}'");
        sqlx::query(&set_local)
            .execute(&mut *tx)
            .await
            .map_err(|e| NotifyError::DbTransaction(e.to_string()))?;

        match f(&mut tx).await {
            Ok(()) => {
                tx.commit()
                    .await
                    .map_err(|e| NotifyError::DbTransaction(e.to_string()))?;
                self.mark_success();
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback().await;
                self.mark_error();
                Err(e)
            }
        }
    }

    fn pool_snapshot(&self) -> PoolSnapshot {
        let (size, idle) = match self.pool.try_read() {
            Ok(guard) => guard
                .as_ref()
                .map(|p| (p.size(), p.num_idle() as u32))
                .unwrap_or((0, 0)),
            // A writer is mid-`ensure_pool`/`reinit`; report zero rather than
            // block a sync status read on an in-flight pool rebuild.
            Err(_) => (0, 0),
        };

        PoolSnapshot {
            size,
            idle,
            // sqlx's `Pool` doesn't expose a waiter count publicly; left at
            // zero rather than approximated from acquire-timeout failures.
            num_waiting: 0,
            last_success_epoch_ms: self.last_success_epoch_ms.load(Ordering::Relaxed),
            last_error_epoch_ms: self.last_error_epoch_ms.load(Ordering::Relaxed),
        }
    }
}

pub type SharedDatabase = Arc<dyn Database>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_uuid_user_id() {
        assert!(validate_uuid("'; DROP TABLE notifications; --").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn accepts_any_uuid_version() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid(&uuid::Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn snapshot_starts_at_zero_timestamps() {
        let gateway = PostgresGateway::new("postgres://localhost/test", DbGatewayConfig::default());
        let snapshot = gateway.pool_snapshot();
        assert_eq!(snapshot.last_success_epoch_ms, 0);
        assert_eq!(snapshot.last_error_epoch_ms, 0);
    }
}
