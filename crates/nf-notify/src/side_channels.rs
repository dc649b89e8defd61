//! Side-channel publication: realtime events for every created notification,
//! and immediate/daily-digest email depending on per-user preferences.
//!
//! Realtime publish failure is non-blocking — the notification is already
//! persisted, so a dropped realtime event is logged and otherwise ignored.
//! Email publish retries transient failures before giving up.

use std::collections::HashMap;
use std::time::Duration;

use nf_common::{with_retry, EmailTopic, Notification, RetryPolicy};
use nf_db::Database;
use nf_queue::{EmailNotification, EmailPayload, QueuePublisher, RealtimeNotification, RealtimePayload};
use tracing::warn;

use crate::outcome::PersistOutcome;
use crate::preferences::{load_subscription_name, load_user_preferences};

const EMAIL_RETRY_ATTEMPTS: u32 = 2;
const EMAIL_RETRY_INITIAL_DELAY: Duration = Duration::from_secs(1);

pub async fn publish_side_channels(
    db: &dyn Database,
    publisher: &dyn QueuePublisher,
    created: &[Notification],
    outcome: &mut PersistOutcome,
) {
    if created.is_empty() {
        return;
    }

    publish_realtime_events(publisher, created).await;
    publish_emails(db, publisher, created, outcome).await;
}

async fn publish_realtime_events(publisher: &dyn QueuePublisher, created: &[Notification]) {
    for notification in created {
        let payload = RealtimePayload::new(
            notification.user_id.clone(),
            RealtimeNotification {
                id: notification.id.to_string(),
                title: notification.title.clone(),
                content: notification.content.clone(),
                source_url: Some(notification.source_url.clone()),
                entity_type: notification.entity_type.clone(),
                created_at: notification.created_at,
            },
        );

        if let Err(e) = publisher.publish_realtime(&payload).await {
            warn!(
                notification_id = %notification.id,
                error = %e,
                "realtime publish failed, continuing (notification already persisted)"
            );
        }
    }
}

async fn publish_emails(
    db: &dyn Database,
    publisher: &dyn QueuePublisher,
    created: &[Notification],
    outcome: &mut PersistOutcome,
) {
    let mut user_order: Vec<String> = Vec::new();
    let mut by_user: HashMap<String, Vec<&Notification>> = HashMap::new();
    for notification in created {
        by_user
            .entry(notification.user_id.clone())
            .or_insert_with(|| {
                user_order.push(notification.user_id.clone());
                Vec::new()
            })
            .push(notification);
    }

    let mut subscription_names: HashMap<String, String> = HashMap::new();

    for user_id in user_order {
        let notifications = &by_user[&user_id];

        let preferences = match load_user_preferences(db, &user_id).await {
            Ok(p) => p,
            Err(e) => {
                warn!(user_id, error = %e, "failed to load notification preferences, skipping email");
                continue;
            }
        };

        if preferences.wants_instant() {
            for notification in notifications {
                if publish_one_email(
                    db,
                    publisher,
                    EmailTopic::Immediate,
                    &preferences,
                    notification,
                    &mut subscription_names,
                )
                .await
                {
                    outcome.emails_published += 1;
                }
            }
        } else if preferences.email_notifications {
            if let Some(notification) = notifications.first() {
                if publish_one_email(
                    db,
                    publisher,
                    EmailTopic::Daily,
                    &preferences,
                    notification,
                    &mut subscription_names,
                )
                .await
                {
                    outcome.emails_published += 1;
                }
            }
        }
    }
}

async fn publish_one_email(
    db: &dyn Database,
    publisher: &dyn QueuePublisher,
    topic: EmailTopic,
    preferences: &crate::preferences::UserPreferences,
    notification: &Notification,
    subscription_names: &mut HashMap<String, String>,
) -> bool {
    let subscription_name = if let Some(name) = subscription_names.get(&notification.subscription_id) {
        name.clone()
    } else {
        let name = load_subscription_name(db, &notification.subscription_id).await;
        subscription_names.insert(notification.subscription_id.clone(), name.clone());
        name
    };

    let payload = EmailPayload {
        user_id: notification.user_id.clone(),
        email: preferences.recipient_email().to_string(),
        notification: EmailNotification {
            id: notification.id.to_string(),
            title: notification.title.clone(),
            content: notification.content.clone(),
            source_url: Some(notification.source_url.clone()),
            subscription_name,
        },
        timestamp: chrono::Utc::now(),
    };

    let policy = RetryPolicy::new(EMAIL_RETRY_ATTEMPTS, EMAIL_RETRY_INITIAL_DELAY, 2.0);
    let result = with_retry(
        &policy,
        |e: &nf_queue::QueueError| e.is_connection_error(),
        || publisher.publish_email(topic, &payload),
    )
    .await;

    match result {
        Ok(_message_id) => true,
        Err(e) => {
            warn!(
                notification_id = %notification.id,
                error = %e,
                "email publish failed after retries, continuing"
            );
            false
        }
    }
}
