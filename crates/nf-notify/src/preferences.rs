//! User notification preferences and subscription-name lookups, read once
//! per user/subscription per batch rather than once per notification.

use nf_db::Database;
use nf_common::{NotifyError, Result};
use serde_json::Value;
use tracing::warn;

pub const UNKNOWN_SUBSCRIPTION_SENTINEL: &str = "Unknown subscription";

#[derive(Debug, Clone)]
pub struct UserPreferences {
    pub email: String,
    pub notification_email: Option<String>,
    pub instant_notifications: bool,
    pub email_notifications: bool,
    pub test_user_flag: bool,
}

impl UserPreferences {
    pub fn recipient_email(&self) -> &str {
        self.notification_email.as_deref().unwrap_or(&self.email)
    }

    pub fn wants_instant(&self) -> bool {
        self.instant_notifications || self.test_user_flag
    }
}

/// `users.notification_settings` holds the preference trio as a JSON blob;
/// `email` and `test_user_flag` are plain columns.
pub async fn load_user_preferences(db: &dyn Database, user_id: &str) -> Result<UserPreferences> {
    let rows = db
        .query(
            "SELECT email, notification_settings, test_user_flag FROM users WHERE id = $1",
            &[user_id],
        )
        .await?;

    let row = rows
        .first()
        .ok_or_else(|| NotifyError::DbQuery(format!("no user row found for {user_id}")))?;

    use sqlx::Row;
    let email: String = row.try_get("email").map_err(|e| NotifyError::DbQuery(e.to_string()))?;
    let settings: Value = row
        .try_get("notification_settings")
        .unwrap_or(Value::Null);
    let test_user_flag: bool = row.try_get("test_user_flag").unwrap_or(false);

    Ok(UserPreferences {
        email,
        notification_email: settings
            .get("notificationEmail")
            .and_then(Value::as_str)
            .map(str::to_string),
        instant_notifications: settings
            .get("instantNotifications")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        email_notifications: settings
            .get("emailNotifications")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        test_user_flag,
    })
}

/// Subscription name by id, defaulting to a sentinel on any failure —
/// missing subscription names must never block notification delivery.
pub async fn load_subscription_name(db: &dyn Database, subscription_id: &str) -> String {
    let result = db
        .query(
            "SELECT name FROM subscriptions WHERE id = $1",
            &[subscription_id],
        )
        .await;

    match result {
        Ok(rows) => {
            use sqlx::Row;
            rows.first()
                .and_then(|row| row.try_get::<String, _>("name").ok())
                .unwrap_or_else(|| UNKNOWN_SUBSCRIPTION_SENTINEL.to_string())
        }
        Err(e) => {
            warn!(subscription_id, error = %e, "subscription name lookup failed, using sentinel");
            UNKNOWN_SUBSCRIPTION_SENTINEL.to_string()
        }
    }
}
