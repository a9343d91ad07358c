use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Inclusive numeric bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range<T> {
    #[serde(default)]
    pub min: Option<T>,
    #[serde(default)]
    pub max: Option<T>,
}

/// Category-specific filter values stored as JSON on a saved filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub total_price: Range<Decimal>,
    pub price_per_meter: Range<Decimal>,
    pub deposit: Range<Decimal>,
    pub monthly_rent: Range<Decimal>,
    pub area: Range<Decimal>,
    pub rooms: Range<i64>,
    pub build_year: Range<i64>,
    pub elevator: bool,
    pub parking: bool,
    pub warehouse: bool,
    pub balcony: bool,
}

/// User-defined search criteria matched against newly ingested posts.
#[derive(Debug, Clone, FromRow)]
pub struct SavedFilter {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    pub district_ids: Json<Vec<i64>>,
    pub category_slug: Option<String>,
    pub criteria: Json<FilterCriteria>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, FromRow)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub saved_filter_id: i64,
    pub post_id: i64,
    pub status: NotificationStatus,
    pub attempt_count: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}
