use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::Source;
use crate::scrapers::traits::{DetailSource, ListingSource};
use crate::scrapers::types::{SearchPage, SearchScope};

pub const DEFAULT_BASE_URL: &str = "https://api.divar.ir";

/// Wait applied to a 429 without a usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP client for the Divar search and post-detail endpoints.
pub struct DivarClient {
    client: Client,
    base_url: String,
    default_retry_after: Duration,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    list_widgets: Vec<Value>,
    #[serde(default)]
    pagination: Option<Pagination>,
}

#[derive(Debug, Default, Deserialize)]
struct Pagination {
    #[serde(default)]
    has_next_page: Option<bool>,
    #[serde(default)]
    data: Option<PaginationData>,
}

#[derive(Debug, Default, Deserialize)]
struct PaginationData {
    #[serde(default)]
    last_post_date: Option<String>,
}

impl DivarClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Client against another host, used for tests and staging mirrors.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_retry_after: DEFAULT_RETRY_AFTER,
        })
    }

    /// Wait reported for a 429 that carries no usable `Retry-After`.
    pub fn with_default_retry_after(mut self, wait: Duration) -> Self {
        self.default_retry_after = wait;
        self
    }

    fn search_body(scope: &SearchScope, cursor: Option<&str>) -> Value {
        let mut body = json!({
            "city_ids": scope.city_ids.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            "search_data": {
                "form_data": {
                    "data": {
                        "category": {"str": {"value": scope.category_slug}}
                    }
                }
            }
        });
        if let Some(cursor) = cursor {
            body["pagination_data"] = json!({
                "@type": "type.googleapis.com/post_list.PaginationData",
                "last_post_date": cursor,
            });
        }
        body
    }
}

#[async_trait]
impl ListingSource for DivarClient {
    async fn search(
        &self,
        scope: &SearchScope,
        cursor: Option<&str>,
    ) -> Result<SearchPage, FetchError> {
        let url = format!("{}/v8/postlist/w/search", self.base_url);
        debug!(scope = %scope.label(), cursor, "Searching upstream");

        let response = self
            .client
            .post(&url)
            .json(&Self::search_body(scope, cursor))
            .send()
            .await?;
        let response = check_status(response, self.default_retry_after)?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        let pagination = body.pagination.unwrap_or_default();
        let next_cursor = if pagination.has_next_page == Some(false) {
            None
        } else {
            pagination
                .data
                .and_then(|d| d.last_post_date)
                .filter(|c| !c.is_empty())
        };

        Ok(SearchPage {
            rows: body.list_widgets,
            next_cursor,
        })
    }

    fn source_name(&self) -> &'static str {
        Source::Divar.as_str()
    }
}

#[async_trait]
impl DetailSource for DivarClient {
    async fn fetch_detail(
        &self,
        token: &str,
        session_token: Option<&str>,
    ) -> Result<Value, FetchError> {
        let url = format!("{}/v8/posts-v2/web/{}", self.base_url, token);

        let mut request = self.client.get(&url);
        if let Some(session) = session_token {
            request = request.header(AUTHORIZATION, format!("Basic {session}"));
        }

        let response = check_status(request.send().await?, self.default_retry_after)?;
        response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))
    }
}

fn check_status(response: Response, default_wait: Duration) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after =
                retry_after(response.headers(), Utc::now()).unwrap_or(default_wait);
            warn!(retry_after_ms = retry_after.as_millis() as u64, "Upstream rate limited");
            Err(FetchError::RateLimited { retry_after })
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FetchError::Unauthorized {
            status: status.as_u16(),
        }),
        _ => Err(FetchError::Status {
            status: status.as_u16(),
        }),
    }
}

fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, now)
}

/// `Retry-After` is either delay seconds or an HTTP-date. A date in the past
/// means no wait.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}
