use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use skimmer_engine::{
    ConfigError, EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, FetchPool,
    Fetcher, JobId, MemoryRecordSink, PoolConfig, ProgressSink, VisibleTextExtractor,
};

const PAGE: &str =
    "<html><head><title>t</title></head><body><p>hello</p></body></html>";

fn html_output(url: &str, html: &str) -> FetchOutput {
    FetchOutput {
        bytes: html.as_bytes().to_vec(),
        metadata: FetchMetadata {
            original_url: url.to_string(),
            final_url: url.to_string(),
            redirect_count: 0,
            content_type: Some("text/html; charset=utf-8".to_string()),
            byte_len: html.len() as u64,
        },
    }
}

fn config(concurrency: usize, timeout: Duration) -> PoolConfig {
    PoolConfig::new(concurrency, timeout)
}

fn urls(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("https://example.com/{i}")).collect()
}

#[derive(Clone, Default)]
struct Counters {
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    high_water: Arc<AtomicUsize>,
}

/// Succeeds after a fixed delay, tracking call count and the peak number
/// of concurrently running fetches.
struct CountingFetcher {
    counters: Counters,
    delay: Duration,
}

#[async_trait::async_trait]
impl Fetcher for CountingFetcher {
    async fn fetch(
        &self,
        _job_id: JobId,
        url: &str,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchOutput, FetchError> {
        self.counters.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.high_water.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(html_output(url, PAGE))
    }
}

/// Always errors.
struct FailingFetcher;

#[async_trait::async_trait]
impl Fetcher for FailingFetcher {
    async fn fetch(
        &self,
        _job_id: JobId,
        _url: &str,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchOutput, FetchError> {
        Err(FetchError::new(FailureKind::Network, "connection refused"))
    }
}

/// Ignores the configured timeout entirely.
struct BlockingFetcher;

#[async_trait::async_trait]
impl Fetcher for BlockingFetcher {
    async fn fetch(
        &self,
        _job_id: JobId,
        url: &str,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchOutput, FetchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(html_output(url, PAGE))
    }
}

/// Per-URL delays, for completion-order tests.
struct DelayedFetcher {
    delays: HashMap<String, Duration>,
}

#[async_trait::async_trait]
impl Fetcher for DelayedFetcher {
    async fn fetch(
        &self,
        _job_id: JobId,
        url: &str,
        _sink: &dyn ProgressSink,
    ) -> Result<FetchOutput, FetchError> {
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        Ok(html_output(url, PAGE))
    }
}

#[derive(Default)]
struct TestSink {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl TestSink {
    fn new() -> Self {
        Self::default()
    }

    fn take(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Fires the cancellation token as soon as the first item completes.
struct CancelOnFirstCompletion {
    token: CancellationToken,
}

impl ProgressSink for CancelOnFirstCompletion {
    fn emit(&self, event: EngineEvent) {
        if matches!(event, EngineEvent::ItemCompleted { .. }) {
            self.token.cancel();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn emits_exactly_one_record_per_url() {
    let counters = Counters::default();
    let fetcher = CountingFetcher {
        counters: counters.clone(),
        delay: Duration::from_millis(10),
    };
    let pool = FetchPool::new(
        config(3, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    // A duplicate URL is two separate work items.
    let mut input = urls(6);
    input.push(input[0].clone());

    let sink = MemoryRecordSink::new();
    let progress = TestSink::new();
    let summary = pool
        .run(input.clone(), &sink, &progress, &CancellationToken::new())
        .await;

    let reports = sink.take();
    assert_eq!(reports.len(), 7);
    assert_eq!(summary.total, 7);
    assert_eq!(summary.succeeded, 7);
    assert_eq!(summary.absorbed, 0);
    assert_eq!(counters.calls.load(Ordering::SeqCst), 7);

    // Every input URL is accounted for, duplicates included.
    let mut got: Vec<_> = reports.iter().map(|r| r.record.url.clone()).collect();
    let mut expected = input;
    got.sort();
    expected.sort();
    assert_eq!(got, expected);

    // Job ids are unique: nothing was double-processed.
    let mut ids: Vec<_> = reports.iter().map(|r| r.job_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 7);
}

#[tokio::test(start_paused = true)]
async fn successful_items_carry_title_and_text() {
    let fetcher = CountingFetcher {
        counters: Counters::default(),
        delay: Duration::from_millis(1),
    };
    let pool = FetchPool::new(
        config(2, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    pool.run(urls(2), &sink, &TestSink::new(), &CancellationToken::new())
        .await;

    for report in sink.take() {
        assert!(!report.is_absorbed());
        assert_eq!(report.record.title.as_deref(), Some("t"));
        assert_eq!(report.record.text, "hello");
    }
}

#[tokio::test(start_paused = true)]
async fn failing_fetcher_yields_empty_records_and_batch_completes() {
    let pool = FetchPool::new(
        config(4, Duration::from_secs(5)),
        Box::new(FailingFetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    let summary = pool
        .run(urls(5), &sink, &TestSink::new(), &CancellationToken::new())
        .await;

    let reports = sink.take();
    assert_eq!(reports.len(), 5);
    assert_eq!(summary.absorbed, 5);
    assert_eq!(summary.succeeded, 0);
    for report in reports {
        assert_eq!(report.failure, Some(FailureKind::Network));
        assert_eq!(report.record.title, None);
        assert_eq!(report.record.text, "");
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_fetch_completes_within_timeout_plus_grace() {
    let timeout = Duration::from_millis(100);
    let pool = FetchPool::new(
        config(1, timeout),
        Box::new(BlockingFetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    let t0 = tokio::time::Instant::now();
    let summary = pool
        .run(urls(1), &sink, &TestSink::new(), &CancellationToken::new())
        .await;
    let elapsed = t0.elapsed();

    assert!(elapsed >= timeout, "finished before the timeout: {elapsed:?}");
    assert!(
        elapsed < Duration::from_millis(300),
        "engine deadline did not fire: {elapsed:?}"
    );
    assert_eq!(summary.absorbed, 1);
    let reports = sink.take();
    assert_eq!(reports[0].failure, Some(FailureKind::Timeout));
}

#[tokio::test(start_paused = true)]
async fn concurrency_one_is_serial() {
    let counters = Counters::default();
    let fetcher = CountingFetcher {
        counters: counters.clone(),
        delay: Duration::from_millis(50),
    };
    let pool = FetchPool::new(
        config(1, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    let t0 = tokio::time::Instant::now();
    pool.run(urls(4), &sink, &TestSink::new(), &CancellationToken::new())
        .await;
    let elapsed = t0.elapsed();

    // Serial: total wall clock approximates the sum of per-item latencies.
    assert!(elapsed >= Duration::from_millis(200), "overlap detected: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(300), "slower than serial: {elapsed:?}");
    assert_eq!(counters.high_water.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn bounded_concurrency_overlaps_items() {
    let counters = Counters::default();
    let fetcher = CountingFetcher {
        counters: counters.clone(),
        delay: Duration::from_millis(100),
    };
    let pool = FetchPool::new(
        config(3, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    let t0 = tokio::time::Instant::now();
    pool.run(urls(6), &sink, &TestSink::new(), &CancellationToken::new())
        .await;
    let elapsed = t0.elapsed();

    // Two waves of three, not six serial items.
    assert!(elapsed >= Duration::from_millis(200), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(400), "no overlap: {elapsed:?}");
    let high_water = counters.high_water.load(Ordering::SeqCst);
    assert!(high_water <= 3, "admission bound exceeded: {high_water}");
    assert!(high_water >= 2, "never ran concurrently: {high_water}");
}

#[tokio::test(start_paused = true)]
async fn records_arrive_in_completion_order() {
    let slow = "https://example.com/slow".to_string();
    let medium = "https://example.com/medium".to_string();
    let fast = "https://example.com/fast".to_string();
    let delays = HashMap::from([
        (slow.clone(), Duration::from_millis(300)),
        (medium.clone(), Duration::from_millis(200)),
        (fast.clone(), Duration::from_millis(100)),
    ]);
    let pool = FetchPool::new(
        config(3, Duration::from_secs(5)),
        Box::new(DelayedFetcher { delays }),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    pool.run(
        vec![slow.clone(), medium.clone(), fast.clone()],
        &sink,
        &TestSink::new(),
        &CancellationToken::new(),
    )
    .await;

    let order: Vec<_> = sink.take().into_iter().map(|r| r.record.url).collect();
    assert_eq!(order, vec![fast, medium, slow]);
}

#[tokio::test(start_paused = true)]
async fn completed_count_is_monotone_in_events() {
    let fetcher = CountingFetcher {
        counters: Counters::default(),
        delay: Duration::from_millis(10),
    };
    let pool = FetchPool::new(
        config(4, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let progress = TestSink::new();
    let sink = MemoryRecordSink::new();
    pool.run(urls(8), &sink, &progress, &CancellationToken::new())
        .await;

    let counts: Vec<_> = progress
        .take()
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::ItemCompleted {
                completed, total, ..
            } => {
                assert_eq!(total, 8);
                Some(completed)
            }
            _ => None,
        })
        .collect();
    assert_eq!(counts, (1..=8).collect::<Vec<_>>());
}

#[tokio::test(start_paused = true)]
async fn empty_input_finishes_immediately() {
    let counters = Counters::default();
    let fetcher = CountingFetcher {
        counters: counters.clone(),
        delay: Duration::from_millis(10),
    };
    let pool = FetchPool::new(
        config(4, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let sink = MemoryRecordSink::new();
    let progress = TestSink::new();
    let summary = pool
        .run(Vec::new(), &sink, &progress, &CancellationToken::new())
        .await;

    assert_eq!(summary.total, 0);
    assert!(sink.is_empty());
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);
    assert!(progress
        .take()
        .iter()
        .any(|event| matches!(event, EngineEvent::BatchFinished { .. })));
}

#[test]
fn invalid_configuration_is_rejected_before_any_fetch() {
    let counters = Counters::default();
    let fetcher = CountingFetcher {
        counters: counters.clone(),
        delay: Duration::from_millis(10),
    };
    let err = FetchPool::new(
        config(0, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .err();
    assert_eq!(err, Some(ConfigError::ZeroConcurrency));
    assert_eq!(counters.calls.load(Ordering::SeqCst), 0);

    let err = FetchPool::new(
        config(4, Duration::ZERO),
        Box::new(FailingFetcher),
        Box::new(VisibleTextExtractor),
    )
    .err();
    assert_eq!(err, Some(ConfigError::ZeroTimeout));
}

#[tokio::test(start_paused = true)]
async fn cancellation_drains_pending_items_as_cancelled() {
    let fetcher = CountingFetcher {
        counters: Counters::default(),
        delay: Duration::from_millis(100),
    };
    let pool = FetchPool::new(
        config(1, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let token = CancellationToken::new();
    let progress = CancelOnFirstCompletion {
        token: token.clone(),
    };
    let sink = MemoryRecordSink::new();
    let summary = pool.run(urls(4), &sink, &progress, &token).await;

    let reports = sink.take();
    assert_eq!(reports.len(), 4, "every submitted url still yields a record");
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.absorbed, 3);
    assert!(!reports[0].is_absorbed());
    for report in &reports[1..] {
        assert_eq!(report.failure, Some(FailureKind::Cancelled));
    }
}

#[tokio::test(start_paused = true)]
async fn items_start_before_they_complete() {
    let fetcher = CountingFetcher {
        counters: Counters::default(),
        delay: Duration::from_millis(10),
    };
    let pool = FetchPool::new(
        config(1, Duration::from_secs(5)),
        Box::new(fetcher),
        Box::new(VisibleTextExtractor),
    )
    .unwrap();

    let progress = TestSink::new();
    pool.run(urls(2), &MemoryRecordSink::new(), &progress, &CancellationToken::new())
        .await;

    let mut started = Vec::new();
    for event in progress.take() {
        match event {
            EngineEvent::ItemStarted { job_id, .. } => started.push(job_id),
            EngineEvent::ItemCompleted { job_id, .. } => {
                assert!(started.contains(&job_id), "job {job_id} completed unseen");
            }
            _ => {}
        }
    }
    assert_eq!(started.len(), 2);
}
