use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbDecimal;

/// Normalized listing, one per read-queue row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub read_queue_id: i64,
    pub source: String,
    pub external_id: String,
    pub category_slug: String,
    pub cat1: Option<String>,
    pub cat2: Option<String>,
    pub cat3: Option<String>,
    pub business_type: Option<String>,
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    pub district_id: Option<i64>,

    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub web_url: Option<String>,

    pub total_price: Option<DbDecimal>,
    pub price_per_meter: Option<DbDecimal>,
    pub deposit: Option<DbDecimal>,
    pub monthly_rent: Option<DbDecimal>,
    pub price_negotiable: Option<bool>,

    pub area: Option<DbDecimal>,
    pub land_area: Option<DbDecimal>,
    pub rooms: Option<i64>,
    pub build_year: Option<i64>,
    pub floor: Option<i64>,
    pub total_floors: Option<i64>,
    pub units_per_floor: Option<i64>,

    pub has_elevator: Option<bool>,
    pub has_parking: Option<bool>,
    pub has_warehouse: Option<bool>,
    pub has_balcony: Option<bool>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_is_exact: Option<bool>,

    pub published_relative: Option<String>,
    pub published_ago_ms: Option<i64>,
    pub jalali_date: Option<NaiveDate>,
    pub published_at: Option<DateTime<Utc>>,

    pub notifications_checked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[sqlx(skip)]
    pub medias: Vec<Media>,
    #[sqlx(skip)]
    pub attributes: Vec<Attribute>,
}

/// Ordered image of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub position: i64,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AttributeKind {
    Text,
    Number,
    Bool,
}

/// Free-form key/value detail that has no dedicated column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Attribute {
    pub key: String,
    pub label: String,
    pub kind: AttributeKind,
    pub value_text: Option<String>,
    pub value_number: Option<DbDecimal>,
    pub value_bool: Option<bool>,
}
