use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Listing category. `path` is the slash-joined slug chain from the root,
/// e.g. `real-estate/buy-residential/buy-apartment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub parent_id: Option<i64>,
    pub path: String,
    pub allow_posting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Province {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub allow_posting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct City {
    pub id: i64,
    pub province_id: i64,
    pub slug: String,
    pub name: String,
    pub allow_posting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct District {
    pub id: i64,
    pub city_id: i64,
    pub slug: String,
    pub name: String,
}
