//! Ingestion stages, leaf-first: harvest → fetch → analyze → match → dispatch.

pub mod analyzer;
pub mod dispatcher;
pub mod fetcher;
pub mod guard;
pub mod harvester;
pub mod matcher;

pub use analyzer::{AnalyzeStats, Analyzer};
pub use dispatcher::{DispatchStats, NotificationDispatcher};
pub use fetcher::{FetchStats, Fetcher};
pub use guard::{StageFlag, StageGuard};
pub use harvester::{HarvestStats, Harvester};
pub use matcher::{MatchStats, NotificationMatcher};
