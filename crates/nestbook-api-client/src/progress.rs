//! Upload progress stream
//!
//! Progress is published on a broadcast channel so any number of consumers
//! (a per-file progress row, an aggregate counter, the orchestrator's own
//! state) can follow the same batch. Events for one file never go backwards.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use nestbook_core::UploadProgressEvent;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Percent reported while bytes are in flight; 100 waits for the server.
const IN_FLIGHT_CAP: u8 = 99;

/// Publisher side of the progress stream.
#[derive(Debug, Clone)]
pub struct ProgressSink {
    tx: broadcast::Sender<UploadProgressEvent>,
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadProgressEvent> {
        self.tx.subscribe()
    }

    /// Re-publish an event received from another sink.
    pub fn forward(&self, event: UploadProgressEvent) {
        let _ = self.tx.send(event);
    }

    /// Reporter for the file at `index` in the batch.
    pub fn for_file(&self, index: usize, file_name: impl Into<String>) -> FileProgress {
        FileProgress {
            index,
            file_name: file_name.into(),
            last: AtomicU8::new(0),
            started: AtomicBool::new(false),
            tx: self.tx.clone(),
        }
    }
}

/// Progress reporter for one transfer.
#[derive(Debug)]
pub struct FileProgress {
    index: usize,
    file_name: String,
    last: AtomicU8,
    started: AtomicBool,
    tx: broadcast::Sender<UploadProgressEvent>,
}

impl FileProgress {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Last percent published for this file.
    pub fn current(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    /// Report bytes-in-flight progress. Values are capped below 100 and
    /// anything lower than the last published value is dropped.
    pub fn report(&self, percent: u8) {
        self.publish(percent.min(IN_FLIGHT_CAP));
    }

    /// Mark the transfer as accepted by the server.
    pub fn complete(&self) {
        self.publish(100);
    }

    fn publish(&self, percent: u8) {
        let previous = self.last.fetch_max(percent, Ordering::SeqCst);
        let first = !self.started.swap(true, Ordering::SeqCst);
        if percent <= previous && !first {
            return;
        }
        // No subscribers is fine; the event is simply not observed.
        let _ = self.tx.send(UploadProgressEvent {
            index: self.index,
            file_name: self.file_name.clone(),
            percent: percent.max(previous),
        });
    }
}
