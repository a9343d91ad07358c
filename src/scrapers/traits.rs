use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::error::FetchError;
use crate::scrapers::types::{SearchPage, SearchScope};

/// Paginated listing search of an upstream source.
/// Implemented by the HTTP client and by test doubles.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch one page. `cursor` is `None` for the first page.
    async fn search(&self, scope: &SearchScope, cursor: Option<&str>)
        -> Result<SearchPage, FetchError>;

    /// Get the name of the upstream source
    fn source_name(&self) -> &'static str;
}

/// Full detail payload of one listing.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// `session_token` is the bearer credential of the upstream session, if any.
    async fn fetch_detail(
        &self,
        token: &str,
        session_token: Option<&str>,
    ) -> Result<Value, FetchError>;
}

/// Delivery capability for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Returns whether the payload reached the user.
    async fn emit(&self, user_id: i64, payload: &Value) -> Result<bool>;
}

/// Media mirroring boundary. Only the in-memory test double implements it.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}
