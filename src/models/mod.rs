use serde::{Deserialize, Serialize};

pub mod catalog;
pub mod decimal;
pub mod notification;
pub mod post;
pub mod queue;
pub mod session;

pub use catalog::{Category, City, District, Province};
pub use decimal::DbDecimal;
pub use notification::{FilterCriteria, Notification, NotificationStatus, Range, SavedFilter};
pub use post::{Attribute, AttributeKind, Media, Post};
pub use queue::{
    AnalyzeQueueItem, AnalyzeStatus, LocationScope, NewReadQueueItem, QueueStatus, ReadQueueItem,
};
pub use session::UpstreamSession;

/// Source of the listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Divar,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Divar => "divar",
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geographic point of a listing
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}
