//! Structured extraction stage: parses analyze-queue payloads and persists
//! the normalized post aggregate.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AnalyzeConfig;
use crate::error::ParseError;
use crate::models::{AnalyzeQueueItem, AnalyzeStatus, Attribute, Media, ReadQueueItem};
use crate::parser::{derive_published_at, parse_post, ParsedPost};
use crate::pipeline::guard::StageFlag;
use crate::store::{PostRecord, Store};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzeStats {
    pub processed: usize,
    /// Jobs that reached the retry ceiling and are now `FAILED`.
    pub failed: usize,
    /// Jobs that errored and were put back to `PENDING`.
    pub retried: usize,
}

pub struct Analyzer {
    store: Store,
    config: AnalyzeConfig,
    /// District id by `slug:cityId`; misses are memoized too.
    districts: Mutex<HashMap<String, Option<i64>>>,
    running: StageFlag,
}

impl Analyzer {
    pub fn new(store: Store, config: AnalyzeConfig) -> Self {
        Self {
            store,
            config,
            districts: Mutex::new(HashMap::new()),
            running: StageFlag::new(),
        }
    }

    /// Processes up to `batch_size` pending jobs, oldest first, in parallel
    /// sub-chunks spaced at least `min_chunk_spacing` apart.
    pub async fn process_pending_jobs(&self, batch_size: usize) -> Result<AnalyzeStats> {
        let Some(_guard) = self.running.try_enter() else {
            debug!("Analyze already running, skipping");
            return Ok(AnalyzeStats::default());
        };

        let jobs = self.store.pending_analyze_jobs(batch_size).await?;
        let mut stats = AnalyzeStats::default();
        if jobs.is_empty() {
            return Ok(stats);
        }

        let chunks: Vec<&[AnalyzeQueueItem]> = jobs.chunks(self.config.chunk_size.max(1)).collect();
        let last = chunks.len() - 1;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let started = Instant::now();
            let results = join_all(chunk.iter().map(|job| self.analyze(job))).await;

            for (job, result) in chunk.iter().zip(results) {
                match result {
                    Ok(post_id) => {
                        stats.processed += 1;
                        debug!(job_id = job.id, post_id, "Post persisted");
                    }
                    Err(e) => match self.record_failure(job, &e).await {
                        Ok(AnalyzeStatus::Failed) => stats.failed += 1,
                        Ok(_) => stats.retried += 1,
                        Err(store_err) => {
                            warn!(job_id = job.id, error = %store_err, "Failed to record analyze failure");
                        }
                    },
                }
            }

            if index < last {
                let pause = self.config.min_chunk_spacing.saturating_sub(started.elapsed());
                if !pause.is_zero() {
                    tokio::time::sleep(pause).await;
                }
            }
        }

        info!(
            processed = stats.processed,
            failed = stats.failed,
            retried = stats.retried,
            "Analyze run complete"
        );

        Ok(stats)
    }

    async fn record_failure(
        &self,
        job: &AnalyzeQueueItem,
        error: &anyhow::Error,
    ) -> Result<AnalyzeStatus> {
        let message = format!("{error:#}");
        let status = self
            .store
            .record_analyze_failure(job.id, &message, self.config.max_retries)
            .await?;

        if status == AnalyzeStatus::Failed {
            warn!(job_id = job.id, token = %job.external_id, error = %message, "Analyze failed permanently");
        } else {
            debug!(job_id = job.id, error = %message, "Analyze will be retried");
        }
        Ok(status)
    }

    async fn analyze(&self, job: &AnalyzeQueueItem) -> Result<i64> {
        let read_item = self
            .store
            .get_read_item(job.read_queue_id)
            .await?
            .with_context(|| format!("Read-queue row {} is missing", job.read_queue_id))?;

        let parsed = parse_post(&job.payload.0)?;
        let record = self.build_record(&read_item, parsed).await?;

        self.store.save_post(&record, job.id).await
    }

    async fn build_record(&self, item: &ReadQueueItem, parsed: ParsedPost) -> Result<PostRecord> {
        let category_slug = parsed
            .cat3
            .clone()
            .or_else(|| Some(item.category_slug.clone()))
            .filter(|slug| !slug.trim().is_empty())
            .ok_or(ParseError::MissingCategory)?;

        let province_id = item.province_id;
        let city_id = match (item.city_id, province_id, parsed.city_slug.as_deref()) {
            (Some(id), _, _) => Some(id),
            (None, Some(province_id), Some(slug)) => self
                .store
                .find_city_by_slug(province_id, slug)
                .await?
                .map(|c| c.id),
            _ => None,
        };
        let district_id = match (city_id, parsed.district_slug.as_deref()) {
            (Some(city_id), Some(slug)) => self.resolve_district(city_id, slug).await?,
            _ => None,
        };

        let published_at = derive_published_at(&parsed, item.last_fetched_at);

        let medias = parsed
            .medias
            .into_iter()
            .map(|m| Media {
                position: m.position as i64,
                url: m.url,
                thumbnail_url: m.thumbnail_url,
                alt: m.alt,
            })
            .collect();
        let attributes = parsed
            .attributes
            .into_iter()
            .map(|a| Attribute {
                key: a.key,
                label: a.label,
                kind: a.kind,
                value_text: a.value_text,
                value_number: a.value_number.map(Into::into),
                value_bool: a.value_bool,
            })
            .collect();

        Ok(PostRecord {
            read_queue_id: item.id,
            source: item.source.clone(),
            external_id: item.external_id.clone(),
            category_slug,
            cat1: parsed.cat1,
            cat2: parsed.cat2,
            cat3: parsed.cat3,
            business_type: parsed.business_type,
            province_id,
            city_id,
            district_id,
            title: parsed.title,
            subtitle: parsed.subtitle,
            description: parsed.description,
            seo_title: parsed.seo_title,
            seo_description: parsed.seo_description,
            web_url: parsed.web_url,
            total_price: parsed.total_price.map(Into::into),
            price_per_meter: parsed.price_per_meter.map(Into::into),
            deposit: parsed.deposit.map(Into::into),
            monthly_rent: parsed.monthly_rent.map(Into::into),
            price_negotiable: parsed.price_negotiable,
            area: parsed.area.map(Into::into),
            land_area: parsed.land_area.map(Into::into),
            rooms: parsed.rooms,
            build_year: parsed.build_year,
            floor: parsed.floor,
            total_floors: parsed.total_floors,
            units_per_floor: parsed.units_per_floor,
            has_elevator: parsed.has_elevator,
            has_parking: parsed.has_parking,
            has_warehouse: parsed.has_warehouse,
            has_balcony: parsed.has_balcony,
            latitude: parsed.location.map(|p| p.latitude),
            longitude: parsed.location.map(|p| p.longitude),
            location_is_exact: parsed.location_is_exact,
            published_relative: parsed.published_relative,
            published_ago_ms: parsed.published_ago_ms,
            jalali_date: parsed.jalali_date,
            published_at,
            medias,
            attributes,
        })
    }

    async fn resolve_district(&self, city_id: i64, slug: &str) -> Result<Option<i64>> {
        let key = format!("{slug}:{city_id}");
        if let Some(cached) = self.cached_district(&key) {
            return Ok(cached);
        }

        let id = self.store.find_district(city_id, slug).await?.map(|d| d.id);
        if id.is_none() {
            debug!(district = slug, city_id, "Unknown district");
        }
        if let Ok(mut cache) = self.districts.lock() {
            cache.insert(key, id);
        }
        Ok(id)
    }

    fn cached_district(&self, key: &str) -> Option<Option<i64>> {
        self.districts.lock().ok()?.get(key).copied()
    }

    /// Number of memoized district lookups.
    #[cfg(any(test, feature = "test-support"))]
    pub fn district_cache_len(&self) -> usize {
        self.districts.lock().map(|c| c.len()).unwrap_or_default()
    }
}
