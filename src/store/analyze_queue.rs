use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, Transaction};

use super::Store;
use crate::models::{AnalyzeQueueItem, AnalyzeStatus};

impl Store {
    /// Oldest pending jobs first.
    pub async fn pending_analyze_jobs(&self, limit: usize) -> Result<Vec<AnalyzeQueueItem>> {
        sqlx::query_as(
            "SELECT * FROM analyze_queue WHERE status = 'PENDING' ORDER BY created_at, id LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load pending analyze jobs")
    }

    pub(crate) async fn complete_analyze_job(
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE analyze_queue SET status = 'COMPLETED', error_message = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await
        .context("Failed to complete analyze job")?;
        Ok(())
    }

    /// Spends one retry. At `max_retries` the job becomes `FAILED` and keeps
    /// the message. Returns the new status.
    pub async fn record_analyze_failure(
        &self,
        id: i64,
        error: &str,
        max_retries: i64,
    ) -> Result<AnalyzeStatus> {
        let (status,): (AnalyzeStatus,) = sqlx::query_as(
            r#"
            UPDATE analyze_queue
            SET retry_count = retry_count + 1,
                error_message = ?,
                status = CASE WHEN retry_count + 1 >= ? THEN 'FAILED' ELSE 'PENDING' END,
                updated_at = ?
            WHERE id = ?
            RETURNING status
            "#,
        )
        .bind(error)
        .bind(max_retries)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record analyze failure")?;

        Ok(status)
    }

    pub async fn get_analyze_job(&self, id: i64) -> Result<Option<AnalyzeQueueItem>> {
        sqlx::query_as("SELECT * FROM analyze_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load analyze job")
    }

    pub async fn count_analyze_jobs(&self, status: AnalyzeStatus) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM analyze_queue WHERE status = ?")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
