//! Detail retrieval stage: reserves read-queue batches, downloads the detail
//! payload of each item and hands it to the analyze queue.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::models::{QueueStatus, ReadQueueItem, UpstreamSession};
use crate::pipeline::guard::StageFlag;
use crate::scrapers::{DetailSource, SlidingWindowLimiter};
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub attempted: usize,
    pub succeeded: usize,
    /// Items that reached the attempt ceiling and are now `FAILED`.
    pub failed: usize,
    /// Items returned to `PENDING` for a later run.
    pub deferred: usize,
    /// Items whose outcome could not be stored; they were recorded as a
    /// failed attempt instead.
    pub unsettled: usize,
}

#[derive(Debug)]
enum Outcome {
    Fetched,
    Failed,
    Deferred { retry_after: Option<Duration> },
    Unsettled,
}

pub struct Fetcher {
    store: Store,
    source: Arc<dyn DetailSource>,
    limiter: Arc<SlidingWindowLimiter>,
    config: FetchConfig,
    running: StageFlag,
}

impl Fetcher {
    pub fn new(
        store: Store,
        source: Arc<dyn DetailSource>,
        limiter: Arc<SlidingWindowLimiter>,
        config: FetchConfig,
    ) -> Self {
        Self {
            store,
            source,
            limiter,
            config,
            running: StageFlag::new(),
        }
    }

    /// Drains the read queue batch by batch. Stops on an empty or partial
    /// batch, or when a whole batch was deferred without a `Retry-After`
    /// hint. A hint is always waited out before the run continues or ends,
    /// so overlapping runs stay no-ops until it passes.
    pub async fn fetch_next_posts(&self) -> Result<FetchStats> {
        let Some(_guard) = self.running.try_enter() else {
            debug!("Fetch already running, skipping");
            return Ok(FetchStats::default());
        };

        let mut stats = FetchStats::default();
        let batch_size = self.config.batch_size.max(1);

        loop {
            let started = Instant::now();
            let items = self.store.reserve_read_items(batch_size).await?;
            if items.is_empty() {
                break;
            }

            let outcomes = join_all(items.iter().map(|item| self.fetch_one(item))).await;

            let mut retry_after: Option<Duration> = None;
            let mut progressed = false;
            for outcome in outcomes {
                stats.attempted += 1;
                match outcome {
                    Outcome::Fetched => {
                        stats.succeeded += 1;
                        progressed = true;
                    }
                    Outcome::Failed => {
                        stats.failed += 1;
                        progressed = true;
                    }
                    Outcome::Deferred { retry_after: wait } => {
                        stats.deferred += 1;
                        retry_after = retry_after.max(wait);
                    }
                    Outcome::Unsettled => stats.unsettled += 1,
                }
            }

            let stop = items.len() < batch_size || (!progressed && retry_after.is_none());
            let spacing = self.config.min_batch_spacing.saturating_sub(started.elapsed());

            if let Some(wait) = retry_after {
                let pause = wait.max(spacing);
                info!(pause_ms = pause.as_millis() as u64, "Upstream asked to slow down");
                tokio::time::sleep(pause).await;
            } else if !stop && !spacing.is_zero() {
                debug!(pause_ms = spacing.as_millis() as u64, "Pausing before next batch");
                tokio::time::sleep(spacing).await;
            }

            if stop {
                break;
            }
        }

        if stats.attempted > 0 {
            info!(
                attempted = stats.attempted,
                succeeded = stats.succeeded,
                failed = stats.failed,
                deferred = stats.deferred,
                unsettled = stats.unsettled,
                "Fetch run complete"
            );
        }

        Ok(stats)
    }

    /// Fetches one reserved item and settles its queue state. When settling
    /// fails the error is recorded as a spent attempt, falling back to a
    /// plain release, so the row never stays `PROCESSING`.
    async fn fetch_one(&self, item: &ReadQueueItem) -> Outcome {
        let e = match self.try_fetch_one(item).await {
            Ok(outcome) => return outcome,
            Err(e) => e,
        };
        let reason = format!("{e:#}");
        warn!(token = %item.external_id, error = %reason, "Failed to settle fetched item");

        if let Err(record_err) = self
            .store
            .record_fetch_failure(item.id, &reason, self.config.max_attempts)
            .await
        {
            warn!(token = %item.external_id, error = %record_err, "Failed to record fetch failure");
            if let Err(release_err) = self.store.release_read_item(item.id, &reason).await {
                warn!(
                    token = %item.external_id,
                    error = %release_err,
                    "Failed to release item, it stays reserved until restart"
                );
            }
        }
        Outcome::Unsettled
    }

    async fn try_fetch_one(&self, item: &ReadQueueItem) -> Result<Outcome> {
        let session = self.store.next_session().await?;
        if let Some(session) = &session {
            self.store.touch_session(session.id, Utc::now()).await?;
        }

        self.limiter.acquire().await;
        let result = self.request(item, session.as_ref()).await;

        let error = match result {
            Ok(payload) => {
                self.store.complete_fetch(item, &payload, Utc::now()).await?;
                debug!(token = %item.external_id, "Fetched detail");
                return Ok(Outcome::Fetched);
            }
            Err(e) => e,
        };

        if let (FetchError::Unauthorized { status }, Some(session)) = (&error, &session) {
            warn!(
                session_id = session.id,
                label = %session.label,
                status,
                "Upstream rejected session, deactivating"
            );
            self.store.deactivate_session(session.id, Utc::now()).await?;
            self.store
                .release_read_item(item.id, &error.to_string())
                .await?;
            return Ok(Outcome::Deferred { retry_after: None });
        }

        let retry_after = match &error {
            FetchError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        };

        let status = self
            .store
            .record_fetch_failure(item.id, &error.to_string(), self.config.max_attempts)
            .await?;

        if status == QueueStatus::Failed {
            warn!(token = %item.external_id, error = %error, "Fetch failed permanently");
            Ok(Outcome::Failed)
        } else {
            debug!(token = %item.external_id, error = %error, "Fetch deferred");
            Ok(Outcome::Deferred { retry_after })
        }
    }

    async fn request(
        &self,
        item: &ReadQueueItem,
        session: Option<&UpstreamSession>,
    ) -> Result<Value, FetchError> {
        let call = self
            .source
            .fetch_detail(&item.external_id, session.map(|s| s.token.as_str()));

        timeout(self.config.request_timeout, call)
            .await
            .unwrap_or(Err(FetchError::Timeout))
    }
}
