//! Classifies `sqlx::Error` into the retryable/terminal buckets the rest of
//! the gateway needs, without ever matching on our own `NotifyError` wrapper
//! by string.

/// True for connection-class failures: refused connections, admin-initiated
/// shutdowns, "cannot connect now" (Postgres still starting up), terminated
/// connections, and pool timeouts. These are worth an automatic retry.
pub fn is_connection_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_lowercase();
            message.contains("connection refused")
                || message.contains("terminating connection")
                || message.contains("cannot connect now")
                || message.contains("administrator command")
                || message.contains("connection reset")
        }
        _ => false,
    }
}

/// True for RLS/permission-denial errors raised by the store's policies.
pub fn is_permission_error(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("42501"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_connection_class() {
        assert!(is_connection_error(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn row_not_found_is_not_connection_class() {
        assert!(!is_connection_error(&sqlx::Error::RowNotFound));
    }
}
