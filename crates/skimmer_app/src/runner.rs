use std::fs;
use std::time::Duration;

use anyhow::Context;
use engine_logging::{engine_info, engine_warn};
use skimmer_core::{parse_url_lines, BatchSummary, PoolConfig};
use skimmer_engine::{write_jsonl, BatchHandle, EngineEvent, FetchSettings};

use crate::args::Args;

pub const RECORDS_FILENAME: &str = "records.jsonl";

/// Runs one batch: read the URL list, drive the pool, write the records
/// file, log the summary.
pub fn run(args: &Args) -> anyhow::Result<BatchSummary> {
    let raw = fs::read_to_string(&args.input)
        .with_context(|| format!("reading url list {:?}", args.input))?;
    let urls = parse_url_lines(&raw);
    if urls.is_empty() {
        engine_warn!("no urls found in {:?}", args.input);
    }

    let config = PoolConfig::new(args.concurrency, Duration::from_secs(args.timeout_secs));
    let handle = BatchHandle::spawn(config, FetchSettings::default(), urls)
        .context("invalid pool configuration")?;

    let mut summary = None;
    while let Some(event) = handle.recv_event() {
        match event {
            EngineEvent::ItemCompleted {
                url,
                failure,
                completed,
                total,
                ..
            } => match failure {
                None => engine_info!("[{completed}/{total}] {url}"),
                Some(kind) => engine_warn!("[{completed}/{total}] {url} absorbed: {kind}"),
            },
            EngineEvent::BatchFinished { summary: finished } => summary = Some(finished),
            _ => {}
        }
    }
    let summary = summary.context("engine stopped without a batch summary")?;

    let records = handle.drain_records();
    let path =
        write_jsonl(&args.output_dir, RECORDS_FILENAME, &records).context("writing records")?;

    engine_info!(
        "done: {}/{} ok, {} absorbed, {:.2}s, {:.1} urls/s -> {:?}",
        summary.succeeded,
        summary.total,
        summary.absorbed,
        summary.elapsed.as_secs_f64(),
        summary.throughput(),
        path
    );
    Ok(summary)
}
