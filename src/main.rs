use std::path::PathBuf;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docbuffer::config::Settings;
use docbuffer::manager::BufferManager;
use docbuffer::plan::PlanWriter;
use docbuffer::session::{spawn_session, TransferSession};
use docbuffer::size::estimator_for;
use docbuffer::types::SourceDocument;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    init_tracing();

    let cfg_path = std::env::args().nth(1).map(PathBuf::from);
    let settings = Settings::load(cfg_path)?;
    info!(
        "starting docbuffer provider={} max_items={} max_total_bytes={} max_single_bytes={}",
        settings.provider,
        settings.buffer.max_item_count,
        settings.buffer.max_total_size_bytes,
        settings.buffer.max_single_item_size_bytes
    );

    let estimator = estimator_for(settings.provider);
    let manager = BufferManager::with_config(settings.buffer, estimator.clone());
    let executor = PlanWriter::new(tokio::io::stdout(), estimator);
    let handle = spawn_session(
        TransferSession::new(manager, executor),
        settings.channel_capacity,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_no = 0usize;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        let doc: SourceDocument = serde_json::from_str(&line)
            .with_context(|| format!("parsing input line {line_no}"))?;
        if handle.send(doc).await.is_err() {
            warn!("session stopped at input line {line_no}");
            break;
        }
    }

    let report = handle.finish().await?;
    info!(
        "done: documents={} batches={} oversized={}",
        report.documents_written, report.batches_written, report.oversized_documents
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
