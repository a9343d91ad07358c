use anyhow::{Context, Result};

use super::Store;
use crate::models::{Category, City, District, Province};

impl Store {
    pub async fn postable_categories(&self) -> Result<Vec<Category>> {
        sqlx::query_as("SELECT * FROM categories WHERE allow_posting = 1 ORDER BY path")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load postable categories")
    }

    pub async fn postable_provinces(&self) -> Result<Vec<Province>> {
        sqlx::query_as("SELECT * FROM provinces WHERE allow_posting = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load postable provinces")
    }

    pub async fn postable_cities(&self) -> Result<Vec<City>> {
        sqlx::query_as("SELECT * FROM cities WHERE allow_posting = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to load postable cities")
    }

    /// All city ids of a province, postable or not.
    pub async fn city_ids_of_province(&self, province_id: i64) -> Result<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM cities WHERE province_id = ? ORDER BY id")
                .bind(province_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to load province cities")?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn find_city_by_slug(&self, province_id: i64, slug: &str) -> Result<Option<City>> {
        sqlx::query_as("SELECT * FROM cities WHERE province_id = ? AND slug = ?")
            .bind(province_id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load city")
    }

    pub async fn find_district(&self, city_id: i64, slug: &str) -> Result<Option<District>> {
        sqlx::query_as("SELECT * FROM districts WHERE city_id = ? AND slug = ?")
            .bind(city_id)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load district")
    }
}
