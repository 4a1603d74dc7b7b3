use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use engine_logging::{engine_debug, engine_info};
use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use skimmer_core::{BatchState, BatchSummary, ConfigError, PoolConfig};

use crate::decode::decode_html;
use crate::extract::{ExtractedContent, Extractor, VisibleTextExtractor};
use crate::fetch::{ChannelProgressSink, FetchSettings, Fetcher, ProgressSink, ReqwestFetcher};
use crate::sink::{ChannelRecordSink, RecordSink};
use crate::types::{EngineEvent, FailureKind, FetchError, ItemReport, PageRecord, WorkItem};

/// Slack on top of the per-request timeout before the engine abandons a
/// task, whatever the fetcher is doing. Keeps a misbehaving `Fetcher`
/// implementation from wedging the batch.
const TIMEOUT_GRACE: Duration = Duration::from_millis(100);

/// The bounded-concurrency fetch-and-extract pool.
///
/// One instance drives one batch: at most `concurrency` items are in
/// flight at any moment, a finishing item immediately admits the next
/// pending one, and finished records are handed to the sink in completion
/// order, never submission order. Every submitted URL produces exactly one
/// record; per-item failures of any kind are absorbed into empty-field
/// records rather than aborting the batch. Absorption is a deliberate
/// completeness-over-correctness tradeoff: a batch finishes even when a
/// slice of its URLs is dead.
pub struct FetchPool {
    config: PoolConfig,
    fetcher: Box<dyn Fetcher>,
    extractor: Box<dyn Extractor>,
}

impl FetchPool {
    /// Rejects an invalid configuration before any work can start.
    pub fn new(
        config: PoolConfig,
        fetcher: Box<dyn Fetcher>,
        extractor: Box<dyn Extractor>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            fetcher,
            extractor,
        })
    }

    /// Pool over the shipped reqwest fetcher and visible-text extractor.
    /// The pool's request timeout overrides the one in `settings`.
    pub fn with_default_stack(
        config: PoolConfig,
        settings: FetchSettings,
    ) -> Result<Self, ConfigError> {
        let settings = FetchSettings {
            request_timeout: config.request_timeout,
            ..settings
        };
        Self::new(
            config,
            Box::new(ReqwestFetcher::new(settings)),
            Box::new(VisibleTextExtractor),
        )
    }

    /// Runs one batch to completion and returns its summary.
    ///
    /// Cancellation is honored between items: once `cancel` fires, items
    /// already in flight finish normally and never-started items drain as
    /// absorbed `Cancelled` records, so the one-record-per-URL invariant
    /// holds either way.
    pub async fn run(
        &self,
        urls: Vec<String>,
        records: &dyn RecordSink,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let total = urls.len();
        let started = Instant::now();
        let mut state = BatchState::new(total);

        engine_info!(
            "batch started: {} urls, concurrency {}, timeout {:?}",
            total,
            self.config.concurrency,
            self.config.request_timeout
        );

        let items = urls
            .into_iter()
            .enumerate()
            .map(|(idx, url)| WorkItem {
                job_id: idx as u64 + 1,
                url,
            });

        let mut finished = stream::iter(items)
            .map(|item| self.run_item(item, progress, cancel))
            .buffer_unordered(self.config.concurrency);

        // Single ingest point: completions merge onto this task, so the
        // sink push and the completed count need no further locking.
        while let Some(report) = finished.next().await {
            state.mark_completed(report.job_id, report.is_absorbed());
            let event = EngineEvent::ItemCompleted {
                job_id: report.job_id,
                url: report.record.url.clone(),
                failure: report.failure.clone(),
                completed: state.completed(),
                total,
            };
            records.push(report);
            progress.emit(event);
        }

        let summary = state.summary(started.elapsed());
        engine_info!(
            "batch finished: {}/{} ok, {} absorbed, {:.2}s elapsed, {:.1} urls/s",
            summary.succeeded,
            summary.total,
            summary.absorbed,
            summary.elapsed.as_secs_f64(),
            summary.throughput()
        );
        progress.emit(EngineEvent::BatchFinished {
            summary: summary.clone(),
        });
        summary
    }

    async fn run_item(
        &self,
        item: WorkItem,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> ItemReport {
        if cancel.is_cancelled() {
            return ItemReport::absorbed(item.job_id, item.url, FailureKind::Cancelled);
        }

        progress.emit(EngineEvent::ItemStarted {
            job_id: item.job_id,
            url: item.url.clone(),
        });

        match self.process(&item, progress).await {
            Ok(content) => ItemReport::success(
                item.job_id,
                PageRecord {
                    url: item.url,
                    title: content.title,
                    text: content.text,
                },
            ),
            Err(err) => {
                engine_debug!("job {} absorbed: {} ({})", item.job_id, err, item.url);
                ItemReport::absorbed(item.job_id, item.url, err.kind)
            }
        }
    }

    async fn process(
        &self,
        item: &WorkItem,
        progress: &dyn ProgressSink,
    ) -> Result<ExtractedContent, FetchError> {
        let deadline = self.config.request_timeout + TIMEOUT_GRACE;
        let fetched = tokio::time::timeout(
            deadline,
            self.fetcher.fetch(item.job_id, &item.url, progress),
        )
        .await
        .map_err(|_| FetchError::new(FailureKind::Timeout, "engine deadline exceeded"))??;

        let decoded = decode_html(&fetched.bytes, fetched.metadata.content_type.as_deref())
            .map_err(|err| FetchError::new(FailureKind::Decode, err.to_string()))?;

        Ok(self.extractor.extract(&decoded.html))
    }
}

/// Synchronous facade over a single pool run.
///
/// Spawns a dedicated thread that owns a tokio runtime and drives the
/// batch; events and finished records arrive on plain mpsc channels, so a
/// blocking caller (the CLI) can consume them without touching async.
pub struct BatchHandle {
    events: mpsc::Receiver<EngineEvent>,
    records: mpsc::Receiver<ItemReport>,
    cancel: CancellationToken,
}

impl BatchHandle {
    pub fn spawn(
        config: PoolConfig,
        settings: FetchSettings,
        urls: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let pool = FetchPool::with_default_stack(config, settings)?;
        let (event_tx, event_rx) = mpsc::channel();
        let (record_tx, record_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let run_cancel = cancel.clone();

        thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
            let progress = ChannelProgressSink::new(event_tx);
            let records = ChannelRecordSink::new(record_tx);
            runtime.block_on(pool.run(urls, &records, &progress, &run_cancel));
        });

        Ok(Self {
            events: event_rx,
            records: record_rx,
            cancel,
        })
    }

    /// Stops admission of new items. In-flight items finish; the rest
    /// drain as absorbed `Cancelled` records.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Blocking receive. `None` once the run is over and all events have
    /// been consumed.
    pub fn recv_event(&self) -> Option<EngineEvent> {
        self.events.recv().ok()
    }

    /// Non-blocking receive for callers polling from an event loop.
    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.events.try_recv().ok()
    }

    /// Every record received so far, in completion order.
    pub fn drain_records(&self) -> Vec<ItemReport> {
        self.records.try_iter().collect()
    }
}
