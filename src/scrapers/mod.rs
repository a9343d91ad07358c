pub mod divar;
pub mod rate_limit;
pub mod traits;
pub mod types;
pub mod webhook;

pub use divar::DivarClient;
pub use rate_limit::SlidingWindowLimiter;
pub use traits::{DetailSource, ListingSource, Notifier, ObjectStore};
pub use types::{SearchPage, SearchScope};
pub use webhook::WebhookNotifier;
