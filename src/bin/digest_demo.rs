//! Demo that runs the digest over local feed files (no network).
//!
//! Usage: digest_demo [--now 2025-06-12T12:00:00Z] feed1.xml [feed2.xml ...]
//! `--now` pins the freshness window so archived feeds still produce output.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use market_brief::ingest::feed::parse_timestamp;
use market_brief::ingest::providers::rss_feed::RssFeedSource;
use market_brief::{config, DigestBuilder, FeedSource};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut now: DateTime<Utc> = Utc::now();
    let mut files = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--now" {
            let raw = args.next().context("--now needs a timestamp")?;
            now = parse_timestamp(&raw).with_context(|| format!("bad --now value `{raw}`"))?;
        } else {
            files.push(a);
        }
    }
    if files.is_empty() {
        bail!("usage: digest_demo [--now <rfc3339>] <feed.xml>...");
    }

    let cfg = config::load_config_default()?;
    let sources: Vec<Box<dyn FeedSource>> = files
        .iter()
        .map(|f| Box::new(RssFeedSource::from_file(f)) as Box<dyn FeedSource>)
        .collect();

    let run = DigestBuilder::from_config(&cfg, sources)?.build_at(now).await;
    println!("{}", serde_json::to_string_pretty(&run.digest)?);
    eprintln!("{}", serde_json::to_string_pretty(&run.report)?);
    Ok(())
}
