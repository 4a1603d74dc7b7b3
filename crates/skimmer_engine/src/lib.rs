//! Skimmer engine: bounded-concurrency fetch-and-extract pipeline.
mod decode;
mod extract;
mod fetch;
mod persist;
mod pool;
mod sink;
mod types;

pub use decode::{decode_html, DecodeError, DecodedHtml};
pub use extract::{ExtractedContent, Extractor, VisibleTextExtractor};
pub use fetch::{
    ChannelProgressSink, FetchSettings, Fetcher, NullProgressSink, ProgressSink, ReqwestFetcher,
};
pub use persist::{ensure_output_dir, write_jsonl, AtomicFileWriter, PersistError};
pub use pool::{BatchHandle, FetchPool};
pub use sink::{ChannelRecordSink, MemoryRecordSink, RecordSink};
pub use types::{
    EngineEvent, FailureKind, FetchError, FetchMetadata, FetchOutput, ItemReport, JobId,
    PageRecord, WorkItem,
};

// Pure bookkeeping types the engine's API and events are built on.
pub use skimmer_core::{BatchState, BatchSummary, ConfigError, ItemStage, PoolConfig};
