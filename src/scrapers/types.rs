use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::LocationScope;

/// Row tag of an actual listing in a search page. Other rows are banners,
/// dividers and the like.
pub const POST_ROW: &str = "POST_ROW";

/// One (category, location) pair to search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchScope {
    pub category_id: i64,
    pub category_slug: String,
    pub location_scope: LocationScope,
    pub province_id: Option<i64>,
    pub city_id: Option<i64>,
    /// Upstream city ids to search. A province scope lists all of its cities.
    pub city_ids: Vec<i64>,
}

impl SearchScope {
    /// Short label for logs, e.g. `buy-apartment@province:8`.
    pub fn label(&self) -> String {
        match self.location_scope {
            LocationScope::Province => format!(
                "{}@province:{}",
                self.category_slug,
                self.province_id.unwrap_or_default()
            ),
            LocationScope::City => {
                format!("{}@city:{}", self.category_slug, self.city_id.unwrap_or_default())
            }
        }
    }
}

/// One page of search results.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub rows: Vec<Value>,
    /// Pagination cursor for the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Whether a search row is a listing.
pub fn is_post_row(row: &Value) -> bool {
    row.get("widget_type").and_then(Value::as_str) == Some(POST_ROW)
}

/// Token candidates, in order of preference.
const TOKEN_POINTERS: [&str; 3] = [
    "/data/token",
    "/data/action/payload/token",
    "/data/action_log/server_side_info/info/post_token",
];

/// Extracts the listing token of a search row.
pub fn extract_post_token(row: &Value) -> Option<String> {
    TOKEN_POINTERS
        .iter()
        .filter_map(|p| row.pointer(p).and_then(Value::as_str))
        .map(str::trim)
        .find(|t| !t.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn token_from_any_candidate() {
        assert_eq!(
            extract_post_token(&json!({"data": {"token": "AaBb"}})).as_deref(),
            Some("AaBb")
        );
        assert_eq!(
            extract_post_token(&json!({"data": {"action": {"payload": {"token": "CcDd"}}}}))
                .as_deref(),
            Some("CcDd")
        );
        assert_eq!(
            extract_post_token(&json!({"data": {"token": "", "action_log": {"server_side_info": {"info": {"post_token": "EeFf"}}}}}))
                .as_deref(),
            Some("EeFf")
        );
        assert_eq!(extract_post_token(&json!({"data": {}})), None);
    }

    #[test]
    fn only_post_rows_count() {
        assert!(is_post_row(&json!({"widget_type": "POST_ROW"})));
        assert!(!is_post_row(&json!({"widget_type": "BANNER_ROW"})));
    }
}
