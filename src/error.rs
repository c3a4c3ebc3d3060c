//! Error types for feed sources.

use std::time::Duration;

use thiserror::Error;

/// Why a feed source yielded nothing for this run.
///
/// These never escape the pipeline: each one is recorded on the source's
/// [`SourceReport`](crate::ingest::types::SourceReport) and the run continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Connection, TLS or body read failure
    #[error("request failed: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("http status {0}")]
    Status(u16),

    /// Fetch did not finish within the per-source budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Document is not well-formed XML or not an RSS/Atom feed
    #[error("malformed feed document: {0}")]
    Parse(String),

    /// Local feed file could not be read
    #[error("io: {0}")]
    Io(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // the fetch budget expires before the shared client's timeout, so only
            // clients built elsewhere land here; reqwest does not expose their budget
            return SourceError::Network(format!("timeout: {e}"));
        }
        match e.status() {
            Some(status) => SourceError::Status(status.as_u16()),
            None => SourceError::Network(e.to_string()),
        }
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(e: quick_xml::Error) -> Self {
        SourceError::Parse(e.to_string())
    }
}
