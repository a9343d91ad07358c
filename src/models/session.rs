use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Upstream credential used for detail fetches.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UpstreamSession {
    pub id: i64,
    pub label: String,
    pub token: String,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
