// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod classify;
pub mod config;
pub mod digest;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::classify::{Bucket, Classifier};
pub use crate::config::DigestConfig;
pub use crate::digest::{Digest, DigestBuilder, DigestRun, RunReport};
pub use crate::extract::{FieldExtractor, OutputItem};
pub use crate::ingest::types::{FeedEntry, FeedSource};

use crate::ingest::providers::rss_feed::RssFeedSource;

/// HTTP feed sources for every configured URL, sharing one client.
pub fn http_sources(cfg: &DigestConfig) -> anyhow::Result<Vec<Box<dyn FeedSource>>> {
    let client = RssFeedSource::http_client(&cfg.user_agent, cfg.client_timeout())?;
    Ok(cfg
        .sources
        .all_urls()
        .iter()
        .map(|u| Box::new(RssFeedSource::from_url(u, client.clone())) as Box<dyn FeedSource>)
        .collect())
}
