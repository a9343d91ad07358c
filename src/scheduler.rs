//! Single-process cooperative scheduler for the `run` command.
//!
//! Every stage ticks on its own interval. Each tick runs in its own task so a
//! slow run never delays the other stages; the stage's own guard turns an
//! overlapping tick into a no-op.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::config::{AnalyzeConfig, ScheduleConfig};
use crate::pipeline::{Analyzer, Fetcher, Harvester, NotificationDispatcher, NotificationMatcher};

pub struct Stages {
    pub harvester: Arc<Harvester>,
    pub fetcher: Arc<Fetcher>,
    pub analyzer: Arc<Analyzer>,
    pub matcher: Arc<NotificationMatcher>,
    pub dispatcher: Option<Arc<NotificationDispatcher>>,
}

/// Runs every stage until `shutdown` resolves.
pub async fn run<F>(
    stages: Stages,
    schedule: ScheduleConfig,
    analyze: AnalyzeConfig,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut tasks = JoinSet::new();

    let harvester = stages.harvester;
    tasks.spawn(every("harvest", schedule.harvest_every, move || {
        let harvester = harvester.clone();
        async move { harvester.harvest_allowed_scopes().await.map(|_| ()) }
    }));

    let fetcher = stages.fetcher;
    tasks.spawn(every("fetch", schedule.fetch_every, move || {
        let fetcher = fetcher.clone();
        async move { fetcher.fetch_next_posts().await.map(|_| ()) }
    }));

    let analyzer = stages.analyzer;
    tasks.spawn(every("analyze", schedule.analyze_every, move || {
        let analyzer = analyzer.clone();
        async move {
            analyzer
                .process_pending_jobs(analyze.batch_size)
                .await
                .map(|_| ())
        }
    }));

    let matcher = stages.matcher;
    tasks.spawn(every("match", schedule.match_every, move || {
        let matcher = matcher.clone();
        async move { matcher.run_once().await.map(|_| ()) }
    }));

    match stages.dispatcher {
        Some(dispatcher) => {
            tasks.spawn(every("dispatch", schedule.dispatch_every, move || {
                let dispatcher = dispatcher.clone();
                async move { dispatcher.dispatch_due().await.map(|_| ()) }
            }));
        }
        None => info!("No notification gateway configured, dispatch disabled"),
    }

    info!(stages = tasks.len(), "Scheduler started");
    shutdown.await;
    info!("Shutting down scheduler");
    tasks.shutdown().await;

    Ok(())
}

/// Ticks forever, spawning `job` on each tick. Missed ticks are skipped
/// rather than replayed in a burst.
async fn every<J, Fut>(stage: &'static str, period: Duration, job: J)
where
    J: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let run = job();
        tokio::spawn(async move {
            if let Err(e) = run.await {
                error!(stage, error = %format!("{e:#}"), "Stage run failed");
            }
        });
    }
}
