//! Deduplication: before each insert, check for an existing notification
//! with the same `(user_id, title, source_url, entity_type)` created inside
//! the configured window. A query error is treated as "not a duplicate" —
//! delivery is preferred over silent loss.

use sqlx::{Postgres, Transaction};
use tracing::warn;

pub async fn is_duplicate(
    tx: &mut Transaction<'_, Postgres>,
    user_id: &str,
    title: &str,
    source_url: &str,
    entity_type: &str,
    window_minutes: i64,
) -> bool {
    let result = sqlx::query(
        "SELECT 1 FROM notifications \
         WHERE user_id = $1 AND title = $2 AND source_url = $3 AND entity_type = $4 \
           AND created_at > now() - make_interval(mins => $5::int) \
         LIMIT 1",
    )
    .bind(user_id)
    .bind(title)
    .bind(source_url)
    .bind(entity_type)
    .bind(window_minutes as i32)
    .fetch_optional(&mut **tx)
    .await;

    match result {
        Ok(row) => row.is_some(),
        Err(e) => {
            warn!(error = %e, "dedupe check failed, assuming not a duplicate");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a live Postgres container in
    // tests/persistence_integration_tests.rs; pure unit coverage of the SQL
    // shape isn't meaningful without a database connection.
}
