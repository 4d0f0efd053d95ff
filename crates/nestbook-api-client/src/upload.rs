//! Upload orchestration
//!
//! `upload_one` performs a single transfer through an `UploadTransport`;
//! `upload_many` fans a batch out concurrently and fails as soon as one file
//! fails. `UploadOrchestrator` is what an upload widget holds: it validates a
//! selection, uploads the valid part, and keeps an `UploadState` snapshot for
//! rendering.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use nestbook_core::{
    validate_batch, CandidateFile, ClientConfig, ErrorMetadata, Folder, UploadMode,
    UploadProgressEvent, UploadResult, UploadRules,
};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::progress::{FileProgress, ProgressSink};

/// Something that can move one file to the upload endpoint.
///
/// Implementations report in-flight progress through `progress`; completion
/// (100%) is reported by `upload_one` once the transfer succeeded.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        file: &CandidateFile,
        folder: &Folder,
        progress: Arc<FileProgress>,
    ) -> Result<UploadResult, TransferError>;
}

#[async_trait]
impl<T: UploadTransport + ?Sized> UploadTransport for Arc<T> {
    async fn upload(
        &self,
        file: &CandidateFile,
        folder: &Folder,
        progress: Arc<FileProgress>,
    ) -> Result<UploadResult, TransferError> {
        (**self).upload(file, folder, progress).await
    }
}

/// Concurrency and timeout policy for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// `None` starts every transfer at once.
    pub concurrency: Option<usize>,
    /// Per-transfer limit; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl TransferOptions {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            concurrency: config.upload_concurrency,
            timeout: config.upload_timeout,
        }
    }
}

/// Upload one file. Emits 100% only when the transfer succeeded.
pub async fn upload_one<T: UploadTransport + ?Sized>(
    transport: &T,
    file: &CandidateFile,
    folder: &Folder,
    progress: Arc<FileProgress>,
    timeout: Option<Duration>,
) -> Result<UploadResult, TransferError> {
    tracing::debug!(
        index = progress.index(),
        file_name = %file.name,
        folder = %folder,
        size = file.size(),
        "Starting upload"
    );

    let transfer = transport.upload(file, folder, progress.clone());
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, transfer)
            .await
            .unwrap_or(Err(TransferError::Timeout(limit))),
        None => transfer.await,
    };

    match &result {
        Ok(uploaded) => {
            progress.complete();
            tracing::info!(
                index = progress.index(),
                file_name = %file.name,
                key = %uploaded.key,
                "Upload successful"
            );
        }
        Err(e) => {
            tracing::warn!(
                index = progress.index(),
                file_name = %file.name,
                error = %e,
                "Upload failed"
            );
        }
    }

    result
}

/// Upload a batch concurrently.
///
/// Progress events carry the file's position in `files`. Results come back in
/// input order. The first failure fails the whole batch and drops the
/// transfers still running; successes from the same batch are not returned.
pub async fn upload_many<T: UploadTransport + ?Sized>(
    transport: &T,
    files: &[CandidateFile],
    folder: &Folder,
    sink: &ProgressSink,
    options: TransferOptions,
) -> Result<Vec<UploadResult>, TransferError> {
    let transfers: Vec<_> = files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let progress = Arc::new(sink.for_file(index, file.name.clone()));
            upload_one(transport, file, folder, progress, options.timeout)
        })
        .collect();

    match options.concurrency {
        None => try_join_all(transfers).await,
        Some(limit) => {
            stream::iter(transfers)
                .buffered(limit.max(1))
                .try_collect()
                .await
        }
    }
}

/// Snapshot of an upload widget.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    pub uploading: bool,
    /// Latest percent per file index of the current batch.
    pub progress: BTreeMap<usize, u8>,
    pub uploaded_files: Vec<UploadResult>,
    pub errors: Vec<String>,
}

#[derive(Debug, Default)]
struct Shared {
    state: UploadState,
    /// Bumped by `reset`; work started under an older epoch is discarded.
    epoch: u64,
}

/// Clears the uploading flag however `upload_files` exits, unless a reset
/// handed the flag to a newer batch in the meantime.
struct UploadingGuard<'a> {
    shared: &'a Mutex<Shared>,
    epoch: u64,
}

impl Drop for UploadingGuard<'_> {
    fn drop(&mut self) {
        let mut shared = lock(self.shared);
        if shared.epoch == self.epoch {
            shared.state.uploading = false;
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Upload state machine for one widget.
pub struct UploadOrchestrator<T: UploadTransport> {
    transport: T,
    folder: Folder,
    rules: UploadRules,
    mode: UploadMode,
    options: TransferOptions,
    events: ProgressSink,
    shared: Mutex<Shared>,
    cancel: CancellationToken,
}

impl<T: UploadTransport> UploadOrchestrator<T> {
    pub fn new(transport: T, folder: Folder, rules: UploadRules, mode: UploadMode) -> Self {
        Self {
            transport,
            folder,
            rules,
            mode,
            options: TransferOptions::default(),
            events: ProgressSink::default(),
            shared: Mutex::new(Shared::default()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn folder(&self) -> &Folder {
        &self.folder
    }

    pub fn mode(&self) -> UploadMode {
        self.mode
    }

    /// Copy of the current state.
    pub fn state(&self) -> UploadState {
        lock(&self.shared).state.clone()
    }

    /// Stream of progress events for every batch this orchestrator runs.
    pub fn subscribe(&self) -> broadcast::Receiver<UploadProgressEvent> {
        self.events.subscribe()
    }

    /// Back to the initial state. In-flight work keeps running but its
    /// results are no longer applied.
    pub fn reset(&self) {
        let mut shared = lock(&self.shared);
        shared.state = UploadState::default();
        shared.epoch += 1;
    }

    /// Cancel in-flight work for good; call when the owning widget goes away.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Validate `files`, report rejections, then upload the valid ones.
    ///
    /// Validation errors replace `errors` immediately. When nothing is valid
    /// no transfer starts and an empty list is returned. Successful uploads
    /// are appended to `uploaded_files`; a failed batch adds its message to
    /// `errors` and returns the error.
    pub async fn upload_files(
        &self,
        files: Vec<CandidateFile>,
    ) -> Result<Vec<UploadResult>, TransferError> {
        if self.is_shut_down() {
            return Err(TransferError::Cancelled);
        }

        let batch = validate_batch(files, &self.rules, self.mode);

        let epoch = {
            let mut shared = lock(&self.shared);
            if shared.state.uploading {
                return Err(TransferError::Busy);
            }
            shared.state.errors = batch.errors;
            shared.state.progress.clear();
            if !batch.valid_files.is_empty() {
                shared.state.uploading = true;
            }
            shared.epoch
        };

        if batch.valid_files.is_empty() {
            return Ok(Vec::new());
        }
        let _uploading = UploadingGuard {
            shared: &self.shared,
            epoch,
        };

        // Per-batch channel; only events of the current epoch reach the
        // progress map and subscribers.
        let batch_sink = ProgressSink::default();
        let mut events = batch_sink.subscribe();
        let transfer = upload_many(
            &self.transport,
            &batch.valid_files,
            &self.folder,
            &batch_sink,
            self.options,
        );
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Err(TransferError::Cancelled),
                event = events.recv() => match event {
                    Ok(event) => self.apply_progress(epoch, event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Progress receiver lagged");
                    }
                    Err(RecvError::Closed) => {}
                },
                result = &mut transfer => break result,
            }
        };

        loop {
            match events.try_recv() {
                Ok(event) => self.apply_progress(epoch, event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }

        if self.is_shut_down() {
            return Err(TransferError::Cancelled);
        }

        let mut shared = lock(&self.shared);
        if shared.epoch != epoch {
            tracing::debug!("Discarding upload results after reset");
            return result;
        }

        match &result {
            Ok(uploaded) => {
                tracing::info!(
                    count = uploaded.len(),
                    folder = %self.folder,
                    "Batch upload complete"
                );
                // Lagged receivers may have missed the final events.
                for index in 0..uploaded.len() {
                    shared.state.progress.insert(index, 100);
                }
                shared.state.uploaded_files.extend(uploaded.iter().cloned());
            }
            Err(e) => {
                e.report();
                shared.state.errors.push(e.message());
            }
        }

        result
    }

    fn apply_progress(&self, epoch: u64, event: UploadProgressEvent) {
        {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return;
            }
            let entry = shared.state.progress.entry(event.index).or_insert(0);
            *entry = (*entry).max(event.percent);
        }
        self.events.forward(event);
    }
}

impl<T: UploadTransport + 'static> UploadOrchestrator<T> {
    /// Run `upload_files` on a background task. The task observes `shutdown`.
    pub fn spawn_upload(
        self: &Arc<Self>,
        files: Vec<CandidateFile>,
    ) -> tokio::task::JoinHandle<Result<Vec<UploadResult>, TransferError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.upload_files(files).await })
    }
}

impl<T: UploadTransport> Drop for UploadOrchestrator<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
