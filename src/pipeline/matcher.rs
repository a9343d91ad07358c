use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::pipeline::guard::StageFlag;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub batches: usize,
    pub posts_checked: usize,
    pub notifications_created: u64,
}

/// Matches newly persisted posts against saved filters.
pub struct NotificationMatcher {
    store: Store,
    config: MatchConfig,
    running: StageFlag,
}

impl NotificationMatcher {
    pub fn new(store: Store, config: MatchConfig) -> Self {
        Self {
            store,
            config,
            running: StageFlag::new(),
        }
    }

    /// Drains unchecked posts from the trailing window. A batch is marked
    /// checked only after every filter has been evaluated against it, so a
    /// failed run leaves the batch for the next one.
    pub async fn run_once(&self) -> Result<MatchStats> {
        let Some(_guard) = self.running.try_enter() else {
            debug!("Matcher already running, skipping");
            return Ok(MatchStats::default());
        };

        let filters = self.store.active_filters().await?;
        let since = Utc::now() - self.config.window;
        let mut stats = MatchStats::default();

        loop {
            let ids = self
                .store
                .unchecked_post_ids(since, self.config.batch_size)
                .await?;
            if ids.is_empty() {
                break;
            }

            let now = Utc::now();
            let mut created = 0;
            for filter in &filters {
                created += self
                    .store
                    .create_notifications_for_filter(filter, &ids, now)
                    .await?;
            }
            self.store.mark_posts_checked(&ids).await?;

            stats.batches += 1;
            stats.posts_checked += ids.len();
            stats.notifications_created += created;
            debug!(posts = ids.len(), created, "Matched batch");

            if (ids.len() as i64) < self.config.batch_size {
                break;
            }
        }

        if stats.posts_checked > 0 {
            info!(
                filters = filters.len(),
                batches = stats.batches,
                posts_checked = stats.posts_checked,
                notifications_created = stats.notifications_created,
                "Matching complete"
            );
        }

        Ok(stats)
    }
}
