use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::models::{Notification, NotificationStatus};
use crate::pipeline::guard::StageFlag;
use crate::scrapers::Notifier;
use crate::store::Store;

/// Upper bound on the retry delay.
const MAX_BACKOFF_HOURS: i64 = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
}

enum Delivery {
    Sent,
    Retry,
    Failed,
}

/// Hands due notifications to the delivery capability.
pub struct NotificationDispatcher {
    store: Store,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    running: StageFlag,
}

impl NotificationDispatcher {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>, config: DispatchConfig) -> Self {
        Self {
            store,
            notifier,
            config,
            running: StageFlag::new(),
        }
    }

    pub async fn dispatch_due(&self) -> Result<DispatchStats> {
        let Some(_guard) = self.running.try_enter() else {
            debug!("Dispatch already running, skipping");
            return Ok(DispatchStats::default());
        };

        let now = Utc::now();
        let due = self
            .store
            .due_notifications(now, self.config.batch_size)
            .await?;

        let mut stats = DispatchStats::default();
        for result in join_all(due.iter().map(|n| self.deliver(n, now))).await {
            match result {
                Ok(Delivery::Sent) => stats.delivered += 1,
                Ok(Delivery::Retry) => stats.retried += 1,
                Ok(Delivery::Failed) => stats.failed += 1,
                Err(e) => warn!(error = %e, "Failed to settle notification"),
            }
        }

        if !due.is_empty() {
            info!(
                delivered = stats.delivered,
                retried = stats.retried,
                failed = stats.failed,
                "Dispatch complete"
            );
        }

        Ok(stats)
    }

    async fn deliver(&self, notification: &Notification, now: DateTime<Utc>) -> Result<Delivery> {
        let payload = json!({
            "notificationId": notification.id,
            "savedFilterId": notification.saved_filter_id,
            "postId": notification.post_id,
        });

        let error = match self.notifier.emit(notification.user_id, &payload).await {
            Ok(true) => {
                self.store.mark_notification_sent(notification.id, now).await?;
                return Ok(Delivery::Sent);
            }
            Ok(false) => "not delivered".to_string(),
            Err(e) => format!("{e:#}"),
        };

        let next_attempt_at = now + backoff(self.config.base_backoff, notification.attempt_count);
        let status = self
            .store
            .record_delivery_failure(
                notification.id,
                &error,
                next_attempt_at,
                self.config.max_attempts,
            )
            .await?;

        if status == NotificationStatus::Failed {
            warn!(notification_id = notification.id, error = %error, "Notification delivery failed permanently");
            Ok(Delivery::Failed)
        } else {
            debug!(notification_id = notification.id, %next_attempt_at, "Notification delivery deferred");
            Ok(Delivery::Retry)
        }
    }
}

/// `base * 2^attempts`, capped.
pub fn backoff(base: Duration, attempts: i64) -> Duration {
    let factor = 1i32 << attempts.clamp(0, 16) as u32;
    (base * factor).min(Duration::hours(MAX_BACKOFF_HOURS))
}
