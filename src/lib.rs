//! Listing ingestion pipeline for a real-estate marketplace.
//!
//! Harvest search results into a read queue, fetch post details, normalize
//! them into posts, match them against saved filters and deliver the
//! resulting notifications.

pub mod config;
pub mod error;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod scheduler;
pub mod scrapers;
pub mod store;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
