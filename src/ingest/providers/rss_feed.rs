// src/ingest/providers/rss_feed.rs
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;

use crate::error::SourceError;
use crate::extract::source_domain;
use crate::ingest::feed::parse_document;
use crate::ingest::types::{FeedSource, SourceBatch};

/// A syndication feed read over HTTP, from disk, or from an in-memory document.
pub struct RssFeedSource {
    name: String,
    /// Host stamped on entries, e.g. "federalreserve.gov".
    host: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    File(PathBuf),
    Http { url: String, client: reqwest::Client },
}

impl RssFeedSource {
    /// `name` doubles as the attribution host when it is a URL.
    pub fn from_fixture(name: &str, xml: &str) -> Self {
        Self {
            name: name.to_string(),
            host: source_domain(name).unwrap_or_default(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            host: String::new(),
            mode: Mode::File(path),
        }
    }

    pub fn from_url(url: &str, client: reqwest::Client) -> Self {
        Self {
            name: url.to_string(),
            host: source_domain(url).unwrap_or_default(),
            mode: Mode::Http {
                url: url.to_string(),
                client,
            },
        }
    }

    /// Shared client for HTTP sources; `timeout` bounds each request.
    pub fn http_client(user_agent: &str, timeout: Duration) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .context("building feed http client")
    }

    fn parse_batch(&self, xml: &str, limit: usize) -> Result<SourceBatch, SourceError> {
        let raw = parse_document(xml)?;
        let mut batch = SourceBatch::default();
        for it in raw.into_iter().take(limit) {
            match it.into_entry(&self.host) {
                Some(entry) => batch.entries.push(entry),
                None => batch.malformed += 1,
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl FeedSource for RssFeedSource {
    async fn fetch_entries(&self, limit: usize) -> Result<SourceBatch, SourceError> {
        match &self.mode {
            Mode::Fixture(xml) => self.parse_batch(xml, limit),
            Mode::File(path) => {
                let xml = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::Io(format!("{}: {e}", path.display())))?;
                self.parse_batch(&xml, limit)
            }
            Mode::Http { url, client } => {
                let resp = client.get(url.as_str()).send().await?;
                let status = resp.status();
                if !status.is_success() {
                    return Err(SourceError::Status(status.as_u16()));
                }
                let body = resp.text().await?;
                self.parse_batch(&body, limit)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
