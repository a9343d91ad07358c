use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Sqlite, Transaction};

use super::Store;
use crate::models::{Attribute, DbDecimal, Media, Post};

/// Everything the analyzer writes for one post. Row identity and
/// bookkeeping columns are owned by the store.
#[derive(Debug, Clone, Default)]
pub struct PostRecord {
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
    pub medias: Vec<Media>,
    pub attributes: Vec<Attribute>,
}

/// Column order of the upsert; `push_post_values` binds in the same order.
const POST_COLUMNS: [&str; 41] = [
    "read_queue_id",
    "source",
    "external_id",
    "category_slug",
    "cat1",
    "cat2",
    "cat3",
    "business_type",
    "province_id",
    "city_id",
    "district_id",
    "title",
    "subtitle",
    "description",
    "seo_title",
    "seo_description",
    "web_url",
    "total_price",
    "price_per_meter",
    "deposit",
    "monthly_rent",
    "price_negotiable",
    "area",
    "land_area",
    "rooms",
    "build_year",
    "floor",
    "total_floors",
    "units_per_floor",
    "has_elevator",
    "has_parking",
    "has_warehouse",
    "has_balcony",
    "latitude",
    "longitude",
    "location_is_exact",
    "published_relative",
    "published_ago_ms",
    "jalali_date",
    "published_at",
    "updated_at",
];

impl Store {
    /// Upserts the post keyed by its read-queue row, replaces its media and
    /// attributes, and completes the analyze job, all in one transaction.
    /// Returns the post id.
    pub async fn save_post(&self, record: &PostRecord, analyze_job_id: i64) -> Result<i64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let post_id = upsert_post(&mut tx, record, now).await?;
        replace_media(&mut tx, post_id, &record.medias).await?;
        replace_attributes(&mut tx, post_id, &record.attributes).await?;
        Store::complete_analyze_job(&mut tx, analyze_job_id, now).await?;

        tx.commit().await.context("Failed to commit post")?;
        Ok(post_id)
    }

    /// Post with its media (by position) and attributes.
    pub async fn find_post_by_read_queue_id(&self, read_queue_id: i64) -> Result<Option<Post>> {
        let post: Option<Post> = sqlx::query_as("SELECT * FROM posts WHERE read_queue_id = ?")
            .bind(read_queue_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load post")?;

        let Some(mut post) = post else {
            return Ok(None);
        };

        post.medias = sqlx::query_as(
            "SELECT position, url, thumbnail_url, alt FROM post_media WHERE post_id = ? ORDER BY position",
        )
        .bind(post.id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load post media")?;

        post.attributes = sqlx::query_as(
            "SELECT key, label, kind, value_text, value_number, value_bool \
             FROM post_attributes WHERE post_id = ? ORDER BY id",
        )
        .bind(post.id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load post attributes")?;

        Ok(Some(post))
    }

    /// Ids of posts created since `since` that have not been matched yet,
    /// oldest first.
    pub async fn unchecked_post_ids(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT id FROM posts
            WHERE notifications_checked = 0 AND created_at >= ?
            ORDER BY created_at, id
            LIMIT ?
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load unchecked posts")?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn mark_posts_checked(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("UPDATE posts SET notifications_checked = 1 WHERE id IN (");
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .context("Failed to mark posts checked")?;
        Ok(result.rows_affected())
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn upsert_post(
    tx: &mut Transaction<'_, Sqlite>,
    r: &PostRecord,
    now: DateTime<Utc>,
) -> Result<i64> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("INSERT INTO posts (");
    qb.push(POST_COLUMNS.join(", "));
    qb.push(", created_at) ");
    qb.push_values(std::iter::once(r), |mut b, r| {
        b.push_bind(r.read_queue_id)
            .push_bind(r.source.as_str())
            .push_bind(r.external_id.as_str())
            .push_bind(r.category_slug.as_str())
            .push_bind(r.cat1.as_deref())
            .push_bind(r.cat2.as_deref())
            .push_bind(r.cat3.as_deref())
            .push_bind(r.business_type.as_deref())
            .push_bind(r.province_id)
            .push_bind(r.city_id)
            .push_bind(r.district_id)
            .push_bind(r.title.as_deref())
            .push_bind(r.subtitle.as_deref())
            .push_bind(r.description.as_deref())
            .push_bind(r.seo_title.as_deref())
            .push_bind(r.seo_description.as_deref())
            .push_bind(r.web_url.as_deref())
            .push_bind(r.total_price)
            .push_bind(r.price_per_meter)
            .push_bind(r.deposit)
            .push_bind(r.monthly_rent)
            .push_bind(r.price_negotiable)
            .push_bind(r.area)
            .push_bind(r.land_area)
            .push_bind(r.rooms)
            .push_bind(r.build_year)
            .push_bind(r.floor)
            .push_bind(r.total_floors)
            .push_bind(r.units_per_floor)
            .push_bind(r.has_elevator)
            .push_bind(r.has_parking)
            .push_bind(r.has_warehouse)
            .push_bind(r.has_balcony)
            .push_bind(r.latitude)
            .push_bind(r.longitude)
            .push_bind(r.location_is_exact)
            .push_bind(r.published_relative.as_deref())
            .push_bind(r.published_ago_ms)
            .push_bind(r.jalali_date)
            .push_bind(r.published_at)
            .push_bind(now)
            .push_bind(now);
    });
    qb.push(" ON CONFLICT (read_queue_id) DO UPDATE SET ");
    let updates: Vec<String> = POST_COLUMNS[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();
    qb.push(updates.join(", "));
    qb.push(" RETURNING id");

    let (id,): (i64,) = qb
        .build_query_as()
        .fetch_one(&mut **tx)
        .await
        .with_context(|| format!("Failed to upsert post for read item {}", r.read_queue_id))?;
    Ok(id)
}

async fn replace_media(tx: &mut Transaction<'_, Sqlite>, post_id: i64, medias: &[Media]) -> Result<()> {
    sqlx::query("DELETE FROM post_media WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear post media")?;

    if medias.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO post_media (post_id, position, url, thumbnail_url, alt) ");
    qb.push_values(medias, |mut b, m| {
        b.push_bind(post_id)
            .push_bind(m.position)
            .push_bind(m.url.as_str())
            .push_bind(m.thumbnail_url.as_deref())
            .push_bind(m.alt.as_deref());
    });
    qb.build()
        .execute(&mut **tx)
        .await
        .context("Failed to insert post media")?;
    Ok(())
}

async fn replace_attributes(
    tx: &mut Transaction<'_, Sqlite>,
    post_id: i64,
    attributes: &[Attribute],
) -> Result<()> {
    sqlx::query("DELETE FROM post_attributes WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear post attributes")?;

    if attributes.is_empty() {
        return Ok(());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "INSERT INTO post_attributes (post_id, key, label, kind, value_text, value_number, value_bool) ",
    );
    qb.push_values(attributes, |mut b, a| {
        b.push_bind(post_id)
            .push_bind(a.key.as_str())
            .push_bind(a.label.as_str())
            .push_bind(a.kind)
            .push_bind(a.value_text.as_deref())
            .push_bind(a.value_number)
            .push_bind(a.value_bool);
    });
    qb.build()
        .execute(&mut **tx)
        .await
        .context("Failed to insert post attributes")?;
    Ok(())
}
