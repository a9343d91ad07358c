use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables.
/// Every tunable has a default; only the database URL is commonly overridden.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub upstream_base_url: String,
    /// Real-time gateway for notification delivery. Dispatch is disabled
    /// when unset.
    pub notify_webhook_url: Option<String>,
    pub rate_limit: RateLimitConfig,
    pub harvest: HarvestConfig,
    pub fetch: FetchConfig,
    pub analyze: AnalyzeConfig,
    pub matcher: MatchConfig,
    pub dispatch: DispatchConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_calls: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: 3,
            window: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HarvestConfig {
    pub page_delay: Duration,
    /// Stop a scope after this many pages. `None` follows the cursor to the end.
    pub max_pages: Option<usize>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(750),
            max_pages: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchConfig {
    pub batch_size: usize,
    pub request_timeout: Duration,
    pub max_attempts: i64,
    pub default_retry_after: Duration,
    pub min_batch_spacing: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 2,
            request_timeout: Duration::from_secs(15),
            max_attempts: 5,
            default_retry_after: Duration::from_secs(5),
            min_batch_spacing: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AnalyzeConfig {
    pub batch_size: usize,
    pub chunk_size: usize,
    pub min_chunk_spacing: Duration,
    pub max_retries: i64,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            chunk_size: 50,
            min_chunk_spacing: Duration::from_secs(1),
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MatchConfig {
    pub batch_size: i64,
    pub window: chrono::Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            window: chrono::Duration::hours(24),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub batch_size: i64,
    pub max_attempts: i64,
    pub base_backoff: chrono::Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 5,
            base_backoff: chrono::Duration::seconds(30),
        }
    }
}

/// Tick interval of each stage in the `run` scheduler.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleConfig {
    pub harvest_every: Duration,
    pub fetch_every: Duration,
    pub analyze_every: Duration,
    pub match_every: Duration,
    pub dispatch_every: Duration,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            harvest_every: Duration::from_secs(15 * 60),
            fetch_every: Duration::from_secs(10),
            analyze_every: Duration::from_secs(10),
            match_every: Duration::from_secs(60),
            dispatch_every: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let rate_limit = RateLimitConfig {
            max_calls: parse_or("RATE_LIMIT_MAX_CALLS", 3)?,
            window: millis_or("RATE_LIMIT_WINDOW_MS", 1_000)?,
        };

        let harvest = HarvestConfig {
            page_delay: millis_or("HARVEST_PAGE_DELAY_MS", 750)?,
            max_pages: optional("HARVEST_MAX_PAGES")?,
        };

        let fetch = FetchConfig {
            batch_size: parse_or("FETCH_BATCH_SIZE", 2)?,
            request_timeout: millis_or("FETCH_TIMEOUT_MS", 15_000)?,
            max_attempts: parse_or("FETCH_MAX_ATTEMPTS", 5)?,
            default_retry_after: millis_or("FETCH_DEFAULT_RETRY_AFTER_MS", 5_000)?,
            min_batch_spacing: millis_or("FETCH_MIN_BATCH_SPACING_MS", 1_000)?,
        };

        let analyze = AnalyzeConfig {
            batch_size: parse_or("ANALYZE_BATCH_SIZE", 200)?,
            chunk_size: parse_or("ANALYZE_CHUNK_SIZE", 50)?,
            min_chunk_spacing: millis_or("ANALYZE_MIN_CHUNK_SPACING_MS", 1_000)?,
            max_retries: parse_or("ANALYZE_MAX_RETRIES", 5)?,
        };

        let matcher = MatchConfig {
            batch_size: parse_or("MATCH_BATCH_SIZE", 200)?,
            window: chrono::Duration::hours(parse_or("MATCH_WINDOW_HOURS", 24)?),
        };

        let dispatch = DispatchConfig {
            batch_size: parse_or("DISPATCH_BATCH_SIZE", 100)?,
            max_attempts: parse_or("DISPATCH_MAX_ATTEMPTS", 5)?,
            base_backoff: chrono::Duration::seconds(parse_or("DISPATCH_BASE_BACKOFF_SECS", 30)?),
        };

        let schedule = ScheduleConfig {
            harvest_every: secs_or("HARVEST_INTERVAL_SECS", 15 * 60)?,
            fetch_every: secs_or("FETCH_INTERVAL_SECS", 10)?,
            analyze_every: secs_or("ANALYZE_INTERVAL_SECS", 10)?,
            match_every: secs_or("MATCH_INTERVAL_SECS", 60)?,
            dispatch_every: secs_or("DISPATCH_INTERVAL_SECS", 30)?,
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://estate-ingest.db?mode=rwc".to_string()),
            upstream_base_url: env::var("UPSTREAM_BASE_URL")
                .unwrap_or_else(|_| "https://api.divar.ir".to_string()),
            notify_webhook_url: env::var("NOTIFY_WEBHOOK_URL").ok().filter(|u| !u.is_empty()),
            rate_limit,
            harvest,
            fetch,
            analyze,
            matcher,
            dispatch,
            schedule,
        })
    }
}

fn optional<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("{key} must be a valid number")),
        Err(_) => Ok(None),
    }
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(optional(key)?.unwrap_or(default))
}

fn millis_or(key: &str, default: u64) -> Result<Duration> {
    parse_or(key, default).map(Duration::from_millis)
}

fn secs_or(key: &str, default: u64) -> Result<Duration> {
    parse_or(key, default).map(Duration::from_secs)
}
