use std::sync::{mpsc, Mutex};

use crate::types::ItemReport;

/// The injected output capability: accepts finished records one at a time,
/// in the order the pool completes them. Implementations must not block
/// for long; the push happens on the batch's ingest path.
pub trait RecordSink: Send + Sync {
    fn push(&self, report: ItemReport);
}

/// Forwards records to a std mpsc channel. A hung-up receiver is ignored:
/// the batch always runs to completion.
pub struct ChannelRecordSink {
    tx: mpsc::Sender<ItemReport>,
}

impl ChannelRecordSink {
    pub fn new(tx: mpsc::Sender<ItemReport>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelRecordSink {
    fn push(&self, report: ItemReport) {
        let _ = self.tx.send(report);
    }
}

/// Collects records in memory, for tests and embedding callers that want
/// the whole batch as a `Vec`.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    reports: Mutex<Vec<ItemReport>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.reports.lock().expect("record sink lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns everything collected so far, in completion
    /// order.
    pub fn take(&self) -> Vec<ItemReport> {
        self.reports
            .lock()
            .expect("record sink lock")
            .drain(..)
            .collect()
    }
}

impl RecordSink for MemoryRecordSink {
    fn push(&self, report: ItemReport) {
        self.reports.lock().expect("record sink lock").push(report);
    }
}
