use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use estate_ingest::config::Config;
use estate_ingest::pipeline::{
    Analyzer, Fetcher, Harvester, NotificationDispatcher, NotificationMatcher,
};
use estate_ingest::scheduler::{self, Stages};
use estate_ingest::scrapers::{DivarClient, SlidingWindowLimiter, WebhookNotifier};
use estate_ingest::store::Store;

#[derive(Parser)]
#[command(name = "estate-ingest", about = "Real-estate listing ingestion pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every stage on its schedule until interrupted
    Run,
    /// One harvest pass over all postable scopes
    Harvest,
    /// Fetch pending post details until the queue drains
    Fetch,
    /// Normalize pending fetched payloads into posts
    Analyze {
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Match recent posts against saved filters
    Match,
    /// Deliver due notifications
    Dispatch,
    /// Apply database migrations and exit
    Migrate,
    /// Manage upstream sessions
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Subcommand)]
enum SessionCommand {
    /// Register a session credential for detail fetches
    Add {
        #[arg(long)]
        label: String,
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let store = Store::connect(&config.database_url).await?;

    let command = match cli.command {
        Command::Migrate => {
            info!("Migrations applied");
            return Ok(());
        }
        Command::Session {
            command: SessionCommand::Add { label, token },
        } => {
            let id = store.add_session(&label, &token).await?;
            info!(id, label = %label, "Session added");
            return Ok(());
        }
        command => command,
    };

    let recovered = store.recover_stale_reservations().await?;
    if recovered > 0 {
        warn!(recovered, "Released reservations left by a previous run");
    }

    let client = Arc::new(
        DivarClient::with_base_url(&config.upstream_base_url)?
            .with_default_retry_after(config.fetch.default_retry_after),
    );
    let limiter = Arc::new(SlidingWindowLimiter::from_config(&config.rate_limit));

    let stages = Stages {
        harvester: Arc::new(Harvester::new(
            store.clone(),
            client.clone(),
            limiter.clone(),
            config.harvest,
        )),
        fetcher: Arc::new(Fetcher::new(store.clone(), client, limiter, config.fetch)),
        analyzer: Arc::new(Analyzer::new(store.clone(), config.analyze)),
        matcher: Arc::new(NotificationMatcher::new(store.clone(), config.matcher)),
        dispatcher: match &config.notify_webhook_url {
            Some(url) => Some(Arc::new(NotificationDispatcher::new(
                store.clone(),
                Arc::new(WebhookNotifier::new(url.clone())?),
                config.dispatch,
            ))),
            None => None,
        },
    };

    match command {
        Command::Run => {
            scheduler::run(stages, config.schedule, config.analyze, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "Failed to listen for ctrl-c");
                }
            })
            .await?;
        }
        Command::Harvest => {
            let stats = stages.harvester.harvest_allowed_scopes().await?;
            info!(?stats, "Harvest finished");
        }
        Command::Fetch => {
            let stats = stages.fetcher.fetch_next_posts().await?;
            info!(?stats, "Fetch finished");
        }
        Command::Analyze { batch_size } => {
            let stats = stages
                .analyzer
                .process_pending_jobs(batch_size.unwrap_or(config.analyze.batch_size))
                .await?;
            info!(?stats, "Analyze finished");
        }
        Command::Match => {
            let stats = stages.matcher.run_once().await?;
            info!(?stats, "Match finished");
        }
        Command::Dispatch => match stages.dispatcher {
            Some(dispatcher) => {
                let stats = dispatcher.dispatch_due().await?;
                info!(?stats, "Dispatch finished");
            }
            None => warn!("NOTIFY_WEBHOOK_URL is not set, nothing to dispatch to"),
        },
        Command::Migrate | Command::Session { .. } => {}
    }

    Ok(())
}
