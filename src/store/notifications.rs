use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::Store;
use crate::models::{DbDecimal, Notification, NotificationStatus, Range, SavedFilter};

impl Store {
    /// Active filters whose owner is active.
    pub async fn active_filters(&self) -> Result<Vec<SavedFilter>> {
        sqlx::query_as(
            r#"
            SELECT f.* FROM saved_filters f
            JOIN users u ON u.id = f.user_id
            WHERE f.is_active = 1 AND u.is_active = 1
            ORDER BY f.id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load active saved filters")
    }

    /// Evaluates `filter` against the posts in `post_ids` and creates a
    /// pending notification for every match. A (filter, post) pair that was
    /// already notified is skipped. Returns how many were created.
    pub async fn create_notifications_for_filter(
        &self,
        filter: &SavedFilter,
        post_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<u64> {
        if post_ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO notifications \
             (user_id, saved_filter_id, post_id, status, attempt_count, next_attempt_at, created_at) \
             SELECT ",
        );
        qb.push_bind(filter.user_id)
            .push(", ")
            .push_bind(filter.id)
            .push(", p.id, 'PENDING', 0, ")
            .push_bind(now)
            .push(", ")
            .push_bind(now)
            .push(" FROM posts p WHERE p.id IN (");
        let mut ids = qb.separated(", ");
        for id in post_ids {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");

        push_filter_conditions(&mut qb, filter);
        qb.push(" ON CONFLICT (saved_filter_id, post_id) DO NOTHING");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to evaluate saved filter {}", filter.id))?;
        Ok(result.rows_affected())
    }

    /// Pending notifications whose next attempt is due, oldest first.
    pub async fn due_notifications(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE status = 'PENDING' AND next_attempt_at <= ?
            ORDER BY next_attempt_at, id
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load due notifications")
    }

    pub async fn mark_notification_sent(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'SENT', attempt_count = attempt_count + 1, delivered_at = ?, last_error = NULL
            WHERE id = ?
            "#,
        )
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await
        .context("Failed to mark notification sent")?;
        Ok(())
    }

    /// Spends one delivery attempt and schedules the next one. At
    /// `max_attempts` the notification becomes `FAILED`.
    pub async fn record_delivery_failure(
        &self,
        id: i64,
        error: &str,
        next_attempt_at: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<NotificationStatus> {
        let (status,): (NotificationStatus,) = sqlx::query_as(
            r#"
            UPDATE notifications
            SET attempt_count = attempt_count + 1,
                last_error = ?,
                next_attempt_at = ?,
                status = CASE WHEN attempt_count + 1 >= ? THEN 'FAILED' ELSE 'PENDING' END
            WHERE id = ?
            RETURNING status
            "#,
        )
        .bind(error)
        .bind(next_attempt_at)
        .bind(max_attempts)
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to record delivery failure")?;

        Ok(status)
    }

    pub async fn notifications_for_post(&self, post_id: i64) -> Result<Vec<Notification>> {
        sqlx::query_as("SELECT * FROM notifications WHERE post_id = ? ORDER BY id")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load notifications")
    }

    pub async fn get_notification(&self, id: i64) -> Result<Option<Notification>> {
        sqlx::query_as("SELECT * FROM notifications WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load notification")
    }
}

/// Appends `AND ...` clauses for every constraint the filter sets. A post
/// with a NULL column never satisfies a bound on that column.
fn push_filter_conditions(qb: &mut QueryBuilder<'_, Sqlite>, filter: &SavedFilter) {
    if let Some(province_id) = filter.province_id {
        qb.push(" AND p.province_id = ").push_bind(province_id);
    }
    if let Some(city_id) = filter.city_id {
        qb.push(" AND p.city_id = ").push_bind(city_id);
    }
    if !filter.district_ids.0.is_empty() {
        qb.push(" AND p.district_id IN (");
        let mut ids = qb.separated(", ");
        for id in &filter.district_ids.0 {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    if let Some(slug) = &filter.category_slug {
        qb.push(" AND (p.category_slug = ")
            .push_bind(slug.clone())
            .push(" OR p.cat2 = ")
            .push_bind(slug.clone())
            .push(" OR p.cat1 = ")
            .push_bind(slug.clone())
            .push(")");
    }

    let c = &filter.criteria.0;
    push_decimal_range(qb, "p.total_price", &c.total_price);
    push_decimal_range(qb, "p.price_per_meter", &c.price_per_meter);
    push_decimal_range(qb, "p.deposit", &c.deposit);
    push_decimal_range(qb, "p.monthly_rent", &c.monthly_rent);
    push_decimal_range(qb, "p.area", &c.area);
    push_integer_range(qb, "p.rooms", &c.rooms);
    push_integer_range(qb, "p.build_year", &c.build_year);

    for (required, column) in [
        (c.elevator, "p.has_elevator"),
        (c.parking, "p.has_parking"),
        (c.warehouse, "p.has_warehouse"),
        (c.balcony, "p.has_balcony"),
    ] {
        if required {
            qb.push(format!(" AND {column} = 1"));
        }
    }
}

fn push_decimal_range(
    qb: &mut QueryBuilder<'_, Sqlite>,
    column: &str,
    range: &Range<rust_decimal::Decimal>,
) {
    if let Some(min) = range.min {
        qb.push(format!(" AND CAST({column} AS NUMERIC) >= CAST("))
            .push_bind(DbDecimal(min))
            .push(" AS NUMERIC)");
    }
    if let Some(max) = range.max {
        qb.push(format!(" AND CAST({column} AS NUMERIC) <= CAST("))
            .push_bind(DbDecimal(max))
            .push(" AS NUMERIC)");
    }
}

fn push_integer_range(qb: &mut QueryBuilder<'_, Sqlite>, column: &str, range: &Range<i64>) {
    if let Some(min) = range.min {
        qb.push(format!(" AND {column} >= ")).push_bind(min);
    }
    if let Some(max) = range.max {
        qb.push(format!(" AND {column} <= ")).push_bind(max);
    }
}
