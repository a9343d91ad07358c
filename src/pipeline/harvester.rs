//! Discovery stage: walks every postable (category × location) scope,
//! paginates the upstream search and queues tokens not seen before.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::HarvestConfig;
use crate::models::{Category, LocationScope, NewReadQueueItem};
use crate::pipeline::guard::StageFlag;
use crate::scrapers::types::{extract_post_token, is_post_row};
use crate::scrapers::{ListingSource, SearchScope, SlidingWindowLimiter};
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestStats {
    pub categories: usize,
    pub locations: usize,
    pub combinations: usize,
    pub enqueued: u64,
    /// Tokens repeated within a single page.
    pub duplicates: usize,
    /// Tokens skipped because the read queue already holds them.
    pub already_queued: usize,
    pub pages: usize,
    pub failed_scopes: usize,
}

pub struct Harvester {
    store: Store,
    source: Arc<dyn ListingSource>,
    limiter: Arc<SlidingWindowLimiter>,
    config: HarvestConfig,
    running: StageFlag,
}

impl Harvester {
    pub fn new(
        store: Store,
        source: Arc<dyn ListingSource>,
        limiter: Arc<SlidingWindowLimiter>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            store,
            source,
            limiter,
            config,
            running: StageFlag::new(),
        }
    }

    /// One full pass over all allowed scopes. A failing scope is logged and
    /// counted; the others still run.
    pub async fn harvest_allowed_scopes(&self) -> Result<HarvestStats> {
        let Some(_guard) = self.running.try_enter() else {
            debug!("Harvest already running, skipping");
            return Ok(HarvestStats::default());
        };

        let categories = leaf_categories(self.store.postable_categories().await?);
        let locations = self.location_scopes().await?;

        let mut stats = HarvestStats {
            categories: categories.len(),
            locations: locations.len(),
            ..Default::default()
        };

        info!(
            categories = stats.categories,
            locations = stats.locations,
            "Starting harvest"
        );

        for category in &categories {
            for location in &locations {
                let scope = SearchScope {
                    category_id: category.id,
                    category_slug: category.slug.clone(),
                    ..location.clone()
                };
                stats.combinations += 1;

                if let Err(e) = self.harvest_scope(&scope, &mut stats).await {
                    stats.failed_scopes += 1;
                    warn!(scope = %scope.label(), error = %e, "Scope harvest failed");
                }
            }
        }

        info!(
            combinations = stats.combinations,
            enqueued = stats.enqueued,
            duplicates = stats.duplicates,
            already_queued = stats.already_queued,
            pages = stats.pages,
            failed_scopes = stats.failed_scopes,
            "Harvest complete"
        );

        Ok(stats)
    }

    /// Postable provinces first, then postable cities whose province is not
    /// itself postable. Category fields are filled in per combination.
    async fn location_scopes(&self) -> Result<Vec<SearchScope>> {
        let provinces = self.store.postable_provinces().await?;
        let province_ids: HashSet<i64> = provinces.iter().map(|p| p.id).collect();
        let mut scopes = Vec::new();

        for province in &provinces {
            let city_ids = self.store.city_ids_of_province(province.id).await?;
            if city_ids.is_empty() {
                warn!(province = %province.slug, "Postable province has no cities, skipping");
                continue;
            }
            scopes.push(SearchScope {
                category_id: 0,
                category_slug: String::new(),
                location_scope: LocationScope::Province,
                province_id: Some(province.id),
                city_id: None,
                city_ids,
            });
        }

        for city in self.store.postable_cities().await? {
            if province_ids.contains(&city.province_id) {
                continue;
            }
            scopes.push(SearchScope {
                category_id: 0,
                category_slug: String::new(),
                location_scope: LocationScope::City,
                province_id: Some(city.province_id),
                city_id: Some(city.id),
                city_ids: vec![city.id],
            });
        }

        Ok(scopes)
    }

    async fn harvest_scope(&self, scope: &SearchScope, stats: &mut HarvestStats) -> Result<()> {
        let source_name = self.source.source_name();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if pages > 0 {
                tokio::time::sleep(self.config.page_delay).await;
            }

            self.limiter.acquire().await;
            let page = self.source.search(scope, cursor.as_deref()).await?;
            pages += 1;
            stats.pages += 1;

            if page.rows.is_empty() {
                debug!(scope = %scope.label(), page = pages, "Empty page, scope exhausted");
                break;
            }

            let mut seen = HashSet::new();
            let mut candidates = Vec::new();
            for row in page.rows.iter().filter(|r| is_post_row(r)) {
                let Some(token) = extract_post_token(row) else {
                    debug!(scope = %scope.label(), "Post row without token");
                    continue;
                };
                if !seen.insert(token.clone()) {
                    stats.duplicates += 1;
                    debug!(token = %token, "Duplicate token within page");
                    continue;
                }
                candidates.push((token, row));
            }

            let tokens: Vec<String> = candidates.iter().map(|(t, _)| t.clone()).collect();
            let existing = self.store.existing_external_ids(source_name, &tokens).await?;
            stats.already_queued += existing.len();

            let items: Vec<NewReadQueueItem> = candidates
                .into_iter()
                .filter(|(token, _)| !existing.contains(token))
                .map(|(token, row)| NewReadQueueItem {
                    external_id: token,
                    category_id: scope.category_id,
                    category_slug: scope.category_slug.clone(),
                    location_scope: scope.location_scope,
                    province_id: scope.province_id,
                    city_id: scope.city_id,
                    payload: row.clone(),
                })
                .collect();

            let inserted = self
                .store
                .enqueue_read_items(source_name, &items, Utc::now())
                .await?;
            stats.enqueued += inserted;

            debug!(
                scope = %scope.label(),
                page = pages,
                rows = page.rows.len(),
                inserted,
                "Harvested page"
            );

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            if self.config.max_pages.is_some_and(|max| pages >= max) {
                debug!(scope = %scope.label(), pages, "Page cap reached");
                break;
            }
        }

        Ok(())
    }
}

/// Drops every category whose path is a strict ancestor of another
/// category's path, keeping only the leaves.
pub fn leaf_categories(categories: Vec<Category>) -> Vec<Category> {
    let paths: Vec<String> = categories.iter().map(|c| format!("{}/", c.path)).collect();
    categories
        .into_iter()
        .filter(|c| {
            let prefix = format!("{}/", c.path);
            !paths.iter().any(|p| p != &prefix && p.starts_with(&prefix))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(id: i64, path: &str) -> Category {
        Category {
            id,
            slug: path.rsplit('/').next().unwrap_or(path).to_string(),
            name: path.to_string(),
            parent_id: None,
            path: path.to_string(),
            allow_posting: true,
        }
    }

    #[test]
    fn keeps_only_leaf_categories() {
        let leaves = leaf_categories(vec![
            category(1, "real-estate"),
            category(2, "real-estate/buy-residential"),
            category(3, "real-estate/buy-residential/buy-apartment"),
            category(4, "real-estate/rent-residential"),
            category(5, "real-estate/buy-residential-villa"),
        ]);
        let ids: Vec<i64> = leaves.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }
}
