// Test doubles and fixtures for the ingestion pipeline.
//
// One mock per trait boundary:
// - MockListingSource (ListingSource): cursor→page map, optional failing scopes
// - MockDetailSource (DetailSource): token→scripted response, call log
// - RecordingNotifier (Notifier): scripted delivery results, emit log
// - MemoryObjectStore (ObjectStore): bytes kept in a map
//
// Plus helpers that seed the catalog, users and saved filters, and build
// search rows and detail payloads.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use sqlx::types::Json;

use crate::error::FetchError;
use crate::models::{FilterCriteria, Source};
use crate::scrapers::{DetailSource, ListingSource, Notifier, ObjectStore, SearchPage, SearchScope};
use crate::store::Store;

// ---------------------------------------------------------------------------
// MockListingSource
// ---------------------------------------------------------------------------

/// Serves the same pages for every scope, keyed by cursor. The first page
/// is registered under `None`. Unknown cursors yield an empty page.
#[derive(Default)]
pub struct MockListingSource {
    pages: HashMap<Option<String>, SearchPage>,
    failing_scopes: HashSet<String>,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl MockListingSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(mut self, cursor: Option<&str>, rows: Vec<Value>, next: Option<&str>) -> Self {
        self.pages.insert(
            cursor.map(str::to_string),
            SearchPage {
                rows,
                next_cursor: next.map(str::to_string),
            },
        );
        self
    }

    /// Every search for the scope with this label (see
    /// [`SearchScope::label`]) fails with a 500.
    pub fn failing_for(mut self, scope_label: &str) -> Self {
        self.failing_scopes.insert(scope_label.to_string());
        self
    }

    /// `(scope label, cursor)` of every search call, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ListingSource for MockListingSource {
    async fn search(
        &self,
        scope: &SearchScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((scope.label(), cursor.map(str::to_string)));
        }
        if self.failing_scopes.contains(&scope.label()) {
            return Err(FetchError::Status { status: 500 });
        }
        Ok(self
            .pages
            .get(&cursor.map(str::to_string))
            .cloned()
            .unwrap_or_default())
    }

    fn source_name(&self) -> &'static str {
        Source::Divar.as_str()
    }
}

// ---------------------------------------------------------------------------
// MockDetailSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum MockDetail {
    Payload(Value),
    /// Payload served after a delay, for timeout tests.
    Slow(Duration, Value),
    RateLimited(Duration),
    Unauthorized(u16),
    Status(u16),
}

/// Token→scripted response. Unregistered tokens get a 404.
#[derive(Default)]
pub struct MockDetailSource {
    responses: HashMap<String, MockDetail>,
    calls: Mutex<Vec<(String, Option<String>)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockDetailSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, token: &str, response: MockDetail) -> Self {
        self.responses.insert(token.to_string(), response);
        self
    }

    /// `(token, session token)` of every call, in order.
    pub fn calls(&self) -> Vec<(String, Option<String>)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, token: &str) -> usize {
        self.calls().iter().filter(|(t, _)| t == token).count()
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DetailSource for MockDetailSource {
    async fn fetch_detail(
        &self,
        token: &str,
        session_token: Option<&str>,
    ) -> Result<Value, FetchError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((token.to_string(), session_token.map(str::to_string)));
        }
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let result = match self.responses.get(token).cloned() {
            Some(MockDetail::Payload(value)) => {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Ok(value)
            }
            Some(MockDetail::Slow(delay, value)) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Some(MockDetail::RateLimited(retry_after)) => {
                Err(FetchError::RateLimited { retry_after })
            }
            Some(MockDetail::Unauthorized(status)) => Err(FetchError::Unauthorized { status }),
            Some(MockDetail::Status(status)) => Err(FetchError::Status { status }),
            None => Err(FetchError::Status { status: 404 }),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Returns scripted delivery results in order, then `default`.
pub struct RecordingNotifier {
    script: Mutex<VecDeque<bool>>,
    default: bool,
    emitted: Mutex<Vec<(i64, Value)>>,
}

impl RecordingNotifier {
    pub fn delivering() -> Self {
        Self::with_default(true)
    }

    pub fn offline() -> Self {
        Self::with_default(false)
    }

    fn with_default(default: bool) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default,
            emitted: Mutex::new(Vec::new()),
        }
    }

    pub fn then(self, delivered: bool) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(delivered);
        }
        self
    }

    pub fn emitted(&self) -> Vec<(i64, Value)> {
        self.emitted.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn emit(&self, user_id: i64, payload: &Value) -> Result<bool> {
        self.emitted
            .lock()
            .map_err(|_| anyhow!("emit log poisoned"))?
            .push((user_id, payload.clone()));
        let scripted = self
            .script
            .lock()
            .map_err(|_| anyhow!("script poisoned"))?
            .pop_front();
        Ok(scripted.unwrap_or(self.default))
    }
}

// ---------------------------------------------------------------------------
// MemoryObjectStore
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, (String, Vec<u8>)>>,
}

impl MemoryObjectStore {
    pub fn get(&self, url: &str) -> Option<(String, Vec<u8>)> {
        self.objects.lock().ok()?.get(url).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        let mut objects = self
            .objects
            .lock()
            .map_err(|_| anyhow!("object map poisoned"))?;
        let url = format!("memory://objects/{}", objects.len() + 1);
        objects.insert(url.clone(), (content_type.to_string(), bytes));
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Tehran province (postable) with Tehran city and two districts, Alborz
/// province (not postable) with postable Karaj, and a small category tree
/// whose only postable leaf is `buy-apartment`.
pub async fn seed_catalog(store: &Store) -> Result<()> {
    let pool = store.pool();
    sqlx::query(
        r#"
        INSERT INTO provinces (id, slug, name, allow_posting) VALUES
            (8, 'tehran-province', 'تهران', 1),
            (30, 'alborz-province', 'البرز', 0);
        INSERT INTO cities (id, province_id, slug, name, allow_posting) VALUES
            (1, 8, 'tehran', 'تهران', 1),
            (2, 8, 'shahriar', 'شهریار', 0),
            (31, 30, 'karaj', 'کرج', 1);
        INSERT INTO districts (id, city_id, slug, name) VALUES
            (101, 1, 'vanak', 'ونک'),
            (102, 1, 'saadat-abad', 'سعادت‌آباد');
        INSERT INTO categories (id, slug, name, parent_id, path, allow_posting) VALUES
            (1, 'real-estate', 'املاک', NULL, 'real-estate', 1),
            (2, 'buy-residential', 'فروش مسکونی', 1, 'real-estate/buy-residential', 0),
            (3, 'buy-apartment', 'فروش آپارتمان', 2, 'real-estate/buy-residential/buy-apartment', 1);
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_user(store: &Store, id: i64, active: bool) -> Result<()> {
    sqlx::query("INSERT INTO users (id, is_active) VALUES (?, ?)")
        .bind(id)
        .bind(active)
        .execute(store.pool())
        .await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct FilterFixture {
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    pub district_ids: Vec<i64>,
    pub category_slug: Option<String>,
    pub criteria: FilterCriteria,
}

pub async fn insert_filter(store: &Store, user_id: i64, filter: FilterFixture) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO saved_filters
            (user_id, name, province_id, city_id, district_ids, category_slug, criteria, is_active, created_at)
        VALUES (?, 'filter', ?, ?, ?, ?, ?, 1, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(filter.province_id)
    .bind(filter.city_id)
    .bind(Json(filter.district_ids))
    .bind(filter.category_slug)
    .bind(Json(filter.criteria))
    .bind(Utc::now())
    .fetch_one(store.pool())
    .await?;
    Ok(id)
}

/// A search-result row carrying `token`.
pub fn search_row(token: &str) -> Value {
    json!({
        "widget_type": "POST_ROW",
        "data": {
            "title": "آپارتمان",
            "token": token,
            "action": {"type": "VIEW_POST", "payload": {"token": token}}
        }
    })
}

/// Minimal realistic detail payload of a Tehran apartment for sale.
pub fn detail_payload(title: &str, area: &str, price: &str) -> Value {
    json!({
        "sections": [
            {
                "section_name": "TITLE",
                "widgets": [{
                    "widget_type": "LEGEND_TITLE_ROW",
                    "data": {"title": title, "subtitle": "۳ ساعت پیش در تهران، ونک"}
                }]
            },
            {
                "section_name": "LIST_DATA",
                "widgets": [
                    {"widget_type": "GROUP_INFO_ROW", "data": {"items": [
                        {"title": "متراژ", "value": area},
                        {"title": "ساخت", "value": "۱۳۹۸"},
                        {"title": "اتاق", "value": "۲"}
                    ]}},
                    {"widget_type": "UNEXPANDABLE_ROW", "data": {"title": "قیمت کل", "value": price}},
                    {"widget_type": "UNEXPANDABLE_ROW", "data": {"title": "طبقه", "value": "۳ از ۵"}},
                    {"widget_type": "GROUP_FEATURE_ROW", "data": {"items": [
                        {"title": "آسانسور"},
                        {"title": "پارکینگ"},
                        {"title": "انباری ندارد"}
                    ]}},
                    {"widget_type": "UNEXPANDABLE_ROW", "data": {"title": "جهت ساختمان", "value": "شمالی"}}
                ]
            },
            {
                "section_name": "DESCRIPTION",
                "widgets": [{"widget_type": "DESCRIPTION_ROW", "data": {"text": "نورگیر و بازسازی شده", "is_primary": true}}]
            },
            {
                "section_name": "IMAGE",
                "widgets": [{"widget_type": "IMAGE_CAROUSEL_ROW", "data": {"items": [
                    {"image_url": "https://s100.divarcdn.com/a.jpg", "thumbnail_url": "https://s100.divarcdn.com/a-t.jpg"},
                    {"image_url": "https://s100.divarcdn.com/b.jpg"}
                ]}}]
            },
            {
                "section_name": "MAP",
                "widgets": [{"widget_type": "MAP_ROW", "data": {"location": {
                    "exact_data": {"point": {"latitude": 35.7575, "longitude": 51.4101}}
                }}}]
            }
        ],
        "seo": {"title": title, "description": "آپارتمان فروشی در ونک"},
        "webengage": {
            "cat_1": "real-estate",
            "cat_2": "buy-residential",
            "cat_3": "buy-apartment",
            "city": "tehran",
            "district": "vanak",
            "business_type": "personal"
        },
        "share": {"web_url": "https://divar.ir/v/apartment"}
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn object_store_round_trips_bytes() {
        let objects = MemoryObjectStore::default();
        let url = objects
            .upload(vec![1, 2, 3], "image/jpeg")
            .await
            .unwrap();
        assert_eq!(objects.get(&url), Some(("image/jpeg".to_string(), vec![1, 2, 3])));
    }

    #[tokio::test]
    async fn catalog_fixture_applies() {
        let store = Store::in_memory().await.unwrap();
        seed_catalog(&store).await.unwrap();
        assert_eq!(store.postable_categories().await.unwrap().len(), 2);
        assert_eq!(store.city_ids_of_province(8).await.unwrap(), vec![1, 2]);
    }
}
