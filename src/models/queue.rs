use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// Lifecycle of a read-queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Lifecycle of an analyze-queue row. There is no in-flight state: the
/// analyzer stage guard keeps a single runner per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyzeStatus {
    Pending,
    Completed,
    Failed,
}

/// Which kind of location a harvested token was discovered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LocationScope {
    Province,
    City,
}

/// A discovered ad token waiting for its detail payload.
#[derive(Debug, Clone, FromRow)]
pub struct ReadQueueItem {
    pub id: i64,
    pub source: String,
    pub external_id: String,
    pub category_id: i64,
    pub category_slug: String,
    pub location_scope: LocationScope,
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    pub payload: Json<serde_json::Value>,
    pub status: QueueStatus,
    pub fetch_attempts: i64,
    pub last_error: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Input for a new read-queue row.
#[derive(Debug, Clone)]
pub struct NewReadQueueItem {
    pub external_id: String,
    pub category_id: i64,
    pub category_slug: String,
    pub location_scope: LocationScope,
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    pub payload: serde_json::Value,
}

/// A fetched detail payload waiting to be parsed and persisted.
#[derive(Debug, Clone, FromRow)]
pub struct AnalyzeQueueItem {
    pub id: i64,
    pub read_queue_id: i64,
    pub source: String,
    pub external_id: String,
    pub payload: Json<serde_json::Value>,
    pub status: AnalyzeStatus,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
