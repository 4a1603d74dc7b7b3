use std::fmt;

use serde::Serialize;
use skimmer_core::BatchSummary;

pub use skimmer_core::JobId;

/// A single URL queued for processing. Consumed exactly once by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub job_id: JobId,
    pub url: String,
}

/// The unit handed to the output sink: one per submitted URL.
///
/// `title` is `None` when the page has no title element; `text` is the
/// visible page text with non-content markup stripped. Both are empty for
/// items whose failure was absorbed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRecord {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
}

/// A finished item, tagged with how it finished.
///
/// `failure: Some(..)` marks an absorbed failure: the batch keeps going and
/// the record carries empty fields. Callers wanting stricter guarantees
/// filter on the tag instead of sniffing for empty strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub job_id: JobId,
    pub record: PageRecord,
    pub failure: Option<FailureKind>,
}

impl ItemReport {
    pub fn success(job_id: JobId, record: PageRecord) -> Self {
        Self {
            job_id,
            record,
            failure: None,
        }
    }

    /// The catch-everything branch: the failure is swallowed into an
    /// empty-field record so the item still counts as completed.
    pub fn absorbed(job_id: JobId, url: String, kind: FailureKind) -> Self {
        Self {
            job_id,
            record: PageRecord {
                url,
                title: None,
                text: String::new(),
            },
            failure: Some(kind),
        }
    }

    pub fn is_absorbed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Raw fetch result: body bytes plus transport metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub original_url: String,
    pub final_url: String,
    pub redirect_count: usize,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Why an item failed. The default policy absorbs every kind identically;
/// the distinction is kept for logs, the JSONL output, and callers that
/// want to treat, say, timeouts differently from decode errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    RedirectLimitExceeded,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    UnsupportedContentType { content_type: String },
    Network,
    Decode,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::UnsupportedContentType { content_type } => {
                write!(f, "unsupported content type {content_type}")
            }
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "decode error"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Observable progress of a batch run. Events never gate or reorder record
/// emission; they exist for logging and UIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A worker picked the item up and is about to fetch.
    ItemStarted { job_id: JobId, url: String },
    /// Bytes downloaded so far for an in-flight fetch.
    Progress { job_id: JobId, bytes: u64 },
    /// The item reached its terminal stage. `completed` is the monotone
    /// batch-wide count at emission time.
    ItemCompleted {
        job_id: JobId,
        url: String,
        failure: Option<FailureKind>,
        completed: usize,
        total: usize,
    },
    /// All submitted items are accounted for.
    BatchFinished { summary: BatchSummary },
}
