use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nestbook_api_client::{
    AssetReference, FileProgress, ImageLoader, ResolutionHooks, TransferError, UploadTransport,
};
use nestbook_core::{CandidateFile, Folder, UploadResult};

/// In-memory upload endpoint.
#[derive(Default)]
pub struct MockTransport {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    fine_grained: bool,
    uploaded: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `file_name` with a server message.
    pub fn failing(mut self, file_name: &str) -> Self {
        self.failing.insert(file_name.to_string());
        self
    }

    pub fn delayed(mut self, file_name: &str, delay: Duration) -> Self {
        self.delays.insert(file_name.to_string(), delay);
        self
    }

    /// Report every percent from 1 to 99 without yielding, flooding the
    /// progress channel.
    pub fn fine_grained(mut self) -> Self {
        self.fine_grained = true;
        self
    }

    /// Names of the files that reached the transport, in call order.
    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn upload(
        &self,
        file: &CandidateFile,
        folder: &Folder,
        progress: Arc<FileProgress>,
    ) -> Result<UploadResult, TransferError> {
        self.uploaded.lock().unwrap().push(file.name.clone());

        if self.fine_grained {
            for percent in 1u8..100 {
                progress.report(percent);
            }
        } else {
            for percent in [0u8, 25, 50, 75] {
                progress.report(percent);
                tokio::task::yield_now().await;
            }
        }
        if let Some(delay) = self.delays.get(&file.name) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&file.name) {
            return Err(TransferError::Server {
                message: format!("Could not store {}", file.name),
            });
        }

        Ok(UploadResult {
            key: format!("{}/{}", folder, file.name),
            url: format!("https://nestbook.s3.amazonaws.com/{}/{}", folder, file.name),
            file_name: file.name.clone(),
        })
    }
}

/// Image loader answering from a fixed table; unknown URLs fail with 403.
#[derive(Default)]
pub struct MockLoader {
    ok: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(mut self, url: &str) -> Self {
        self.ok.insert(url.to_string());
        self
    }

    pub fn delayed(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageLoader for MockLoader {
    async fn load(&self, url: &str) -> Result<Bytes, TransferError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delays.get(url) {
            tokio::time::sleep(*delay).await;
        }
        if self.ok.contains(url) {
            Ok(Bytes::from_static(b"\x89PNG"))
        } else {
            Err(TransferError::Http {
                status: 403,
                message: "Access Denied".to_string(),
            })
        }
    }
}

/// Counts hook invocations.
#[derive(Default)]
pub struct RecordingHooks {
    pub loads: AtomicUsize,
    pub errors: AtomicUsize,
    pub loaded_urls: Mutex<Vec<String>>,
}

impl RecordingHooks {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }
}

impl ResolutionHooks for RecordingHooks {
    fn on_load(&self, _reference: &AssetReference, url: &str) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded_urls.lock().unwrap().push(url.to_string());
    }

    fn on_error(&self, _reference: &AssetReference) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}
