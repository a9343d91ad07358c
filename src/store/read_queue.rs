use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{QueryBuilder, Sqlite};

use super::Store;
use crate::models::{NewReadQueueItem, QueueStatus, ReadQueueItem};

impl Store {
    /// Which of `external_ids` already have a read-queue row for `source`.
    pub async fn existing_external_ids(
        &self,
        source: &str,
        external_ids: &[String],
    ) -> Result<HashSet<String>> {
        if external_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT external_id FROM read_queue WHERE source = ");
        qb.push_bind(source);
        qb.push(" AND external_id IN (");
        let mut separated = qb.separated(", ");
        for id in external_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let rows: Vec<(String,)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("Failed to look up existing read-queue tokens")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Bulk insert as `PENDING`. Rows that already exist are left untouched;
    /// returns how many were actually inserted.
    pub async fn enqueue_read_items(
        &self,
        source: &str,
        items: &[NewReadQueueItem],
        requested_at: DateTime<Utc>,
    ) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO read_queue (source, external_id, category_id, category_slug, \
             location_scope, province_id, city_id, payload, status, requested_at) ",
        );
        qb.push_values(items, |mut b, item| {
            b.push_bind(source)
                .push_bind(&item.external_id)
                .push_bind(item.category_id)
                .push_bind(&item.category_slug)
                .push_bind(item.location_scope)
                .push_bind(item.province_id)
                .push_bind(item.city_id)
                .push_bind(Json(&item.payload))
                .push_bind(QueueStatus::Pending)
                .push_bind(requested_at);
        });
        qb.push(" ON CONFLICT (source, external_id) DO NOTHING");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to insert read-queue items")?;

        Ok(result.rows_affected())
    }

    /// Atomically claims up to `limit` pending rows, oldest first, and flips
    /// them to `PROCESSING`. Concurrent callers never receive the same row.
    pub async fn reserve_read_items(&self, limit: usize) -> Result<Vec<ReadQueueItem>> {
        let mut tx = self.pool.begin().await?;

        let mut items: Vec<ReadQueueItem> = sqlx::query_as(
            r#"
            UPDATE read_queue
            SET status = 'PROCESSING'
            WHERE id IN (
                SELECT id FROM read_queue
                WHERE status = 'PENDING'
                ORDER BY requested_at, id
                LIMIT ?
            )
            RETURNING *
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to reserve read-queue items")?;

        tx.commit().await?;

        items.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Marks the item fetched and hands its payload to the analyze queue in
    /// one transaction. Re-fetches replace the payload and reset the job.
    pub async fn complete_fetch(
        &self,
        item: &ReadQueueItem,
        payload: &Value,
        fetched_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE read_queue SET status = 'COMPLETED', last_fetched_at = ?, last_error = NULL WHERE id = ?",
        )
        .bind(fetched_at)
        .bind(item.id)
        .execute(&mut *tx)
        .await
        .context("Failed to complete read-queue item")?;

        sqlx::query(
            r#"
            INSERT INTO analyze_queue
                (read_queue_id, source, external_id, payload, status, retry_count, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'PENDING', 0, ?, ?)
            ON CONFLICT (read_queue_id) DO UPDATE SET
                payload = excluded.payload,
                status = 'PENDING',
                retry_count = 0,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(item.id)
        .bind(&item.source)
        .bind(&item.external_id)
        .bind(Json(payload))
        .bind(fetched_at)
        .bind(fetched_at)
        .execute(&mut *tx)
        .await
        .context("Failed to upsert analyze job")?;

        tx.commit().await?;
        Ok(())
    }

    /// Spends one attempt. At `max_attempts` the row becomes `FAILED`,
    /// otherwise it goes back to `PENDING`. Returns the new status.
    pub async fn record_fetch_failure(
        &self,
        id: i64,
        error: &str,
        max_attempts: i64,
    ) -> Result<QueueStatus> {
        let (status,): (QueueStatus,) = sqlx::query_as(
            r#"
            UPDATE read_queue
            SET fetch_attempts = fetch_attempts + 1,
                last_error = ?,
                status = CASE WHEN fetch_attempts + 1 >= ? THEN 'FAILED' ELSE 'PENDING' END
            WHERE id = ?
            RETURNING status
            "#,
        )
        .bind(error)
        .bind(max_attempts)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record fetch failure")?;

        Ok(status)
    }

    /// Returns a reserved row to `PENDING` without spending an attempt.
    pub async fn release_read_item(&self, id: i64, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE read_queue SET status = 'PENDING', last_error = ? WHERE id = ? AND status = 'PROCESSING'",
        )
        .bind(reason)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to release read-queue item")?;
        Ok(())
    }

    /// Rows left `PROCESSING` by a crashed run go back to `PENDING`.
    pub async fn recover_stale_reservations(&self) -> Result<u64> {
        let result =
            sqlx::query("UPDATE read_queue SET status = 'PENDING' WHERE status = 'PROCESSING'")
                .execute(&self.pool)
                .await
                .context("Failed to recover stale reservations")?;
        Ok(result.rows_affected())
    }

    pub async fn get_read_item(&self, id: i64) -> Result<Option<ReadQueueItem>> {
        sqlx::query_as("SELECT * FROM read_queue WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load read-queue item")
    }

    pub async fn find_read_item(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<ReadQueueItem>> {
        sqlx::query_as("SELECT * FROM read_queue WHERE source = ? AND external_id = ?")
            .bind(source)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load read-queue item")
    }

    pub async fn count_read_items(&self, status: QueueStatus) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM read_queue WHERE status = ?")
            .bind(status)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
