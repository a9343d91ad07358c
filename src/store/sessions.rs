use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::Store;
use crate::models::UpstreamSession;

impl Store {
    pub async fn add_session(&self, label: &str, token: &str) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO upstream_sessions (label, token, is_active, created_at) VALUES (?, ?, 1, ?) RETURNING id",
        )
        .bind(label)
        .bind(token)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .context("Failed to add upstream session")?;
        Ok(id)
    }

    /// Least recently used active session; never-used sessions come first.
    pub async fn next_session(&self) -> Result<Option<UpstreamSession>> {
        sqlx::query_as(
            r#"
            SELECT * FROM upstream_sessions
            WHERE is_active = 1
            ORDER BY last_used_at IS NOT NULL, last_used_at, id
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .context("Failed to pick upstream session")
    }

    pub async fn touch_session(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE upstream_sessions SET last_used_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update session usage")?;
        Ok(())
    }

    /// Takes a rejected credential out of rotation.
    pub async fn deactivate_session(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE upstream_sessions SET is_active = 0, deactivated_at = ? WHERE id = ? AND is_active = 1",
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to deactivate session")?;
        Ok(())
    }

    pub async fn get_session(&self, id: i64) -> Result<Option<UpstreamSession>> {
        sqlx::query_as("SELECT * FROM upstream_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load session")
    }
}
