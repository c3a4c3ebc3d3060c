//! Market brief binary entrypoint.
//! Runs the feed digest once and prints the three-bucket JSON to stdout.
//! Logs (and optional Prometheus text) go to stderr.

use anyhow::Context;
use market_brief::telemetry::Metrics;
use market_brief::{config, http_sources, DigestBuilder};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn enable_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("market_brief=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn metrics_enabled() -> bool {
    std::env::var("DIGEST_METRICS")
        .ok()
        .is_some_and(|v| v == "1")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    enable_tracing();

    let metrics = if metrics_enabled() {
        Some(Metrics::install()?)
    } else {
        None
    };

    let cfg = config::load_config_default().context("loading digest config")?;
    let sources = http_sources(&cfg)?;
    if sources.is_empty() {
        tracing::warn!(target: "digest", "no feed sources configured; emitting empty buckets");
    }

    let builder = DigestBuilder::from_config(&cfg, sources)?;
    let run = builder.build().await;

    for s in run.report.failed_sources() {
        tracing::info!(target: "digest", source = %s.source, error = ?s.error, "skipped source");
    }
    tracing::debug!(target: "digest", report = %serde_json::to_string(&run.report)?, "run report");

    println!("{}", serde_json::to_string_pretty(&run.digest)?);

    if let Some(m) = metrics {
        eprintln!("{}", m.render());
    }
    Ok(())
}
