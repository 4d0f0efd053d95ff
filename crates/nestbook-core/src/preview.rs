//! Local preview handles
//!
//! A preview is an in-memory copy of a selected image addressed by a
//! `blob:`-style URL so it can be shown before the upload finishes. Every
//! handle created by a `PreviewStore` must be released exactly once; release
//! is idempotent so teardown paths can call it unconditionally. `PreviewGuard`
//! ties the release to a scope.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use uuid::Uuid;

use crate::models::CandidateFile;

const PREVIEW_SCHEME: &str = "blob:nestbook/";

/// Handle to a live preview.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: Uuid,
    url: String,
}

impl PreviewHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Debug)]
struct PreviewEntry {
    content_type: String,
    data: Bytes,
}

/// Owner of all preview data for one client.
#[derive(Debug, Clone, Default)]
pub struct PreviewStore {
    entries: Arc<Mutex<HashMap<Uuid, PreviewEntry>>>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, PreviewEntry>> {
        // A poisoned map still holds consistent entries; keep serving them.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a preview for an image file. Non-image files get `None`.
    pub fn create_preview(&self, file: &CandidateFile) -> Option<PreviewHandle> {
        if !file.is_image() {
            return None;
        }

        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            PreviewEntry {
                content_type: file.normalized_content_type(),
                data: file.data.clone(),
            },
        );

        tracing::debug!(preview_id = %id, file_name = %file.name, "Created preview");

        Some(PreviewHandle {
            id,
            url: format!("{}{}", PREVIEW_SCHEME, id),
        })
    }

    /// Release a preview. Releasing `None` or an already released handle does nothing.
    pub fn release_preview(&self, handle: Option<&PreviewHandle>) {
        let Some(handle) = handle else {
            return;
        };
        if self.lock().remove(&handle.id).is_some() {
            tracing::debug!(preview_id = %handle.id, "Released preview");
        }
    }

    /// Bytes and content type behind a live preview URL.
    pub fn lookup(&self, url: &str) -> Option<(String, Bytes)> {
        let id = url.strip_prefix(PREVIEW_SCHEME)?.parse::<Uuid>().ok()?;
        self.lock()
            .get(&id)
            .map(|entry| (entry.content_type.clone(), entry.data.clone()))
    }

    pub fn is_live(&self, handle: &PreviewHandle) -> bool {
        self.lock().contains_key(&handle.id)
    }

    /// Number of previews not yet released.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Create a preview whose release is tied to the returned guard.
    pub fn create_guarded(&self, file: &CandidateFile) -> Option<PreviewGuard> {
        self.create_preview(file).map(|handle| PreviewGuard {
            store: self.clone(),
            handle: Some(handle),
        })
    }
}

/// Releases its preview when dropped.
#[derive(Debug)]
pub struct PreviewGuard {
    store: PreviewStore,
    handle: Option<PreviewHandle>,
}

impl PreviewGuard {
    pub fn handle(&self) -> Option<&PreviewHandle> {
        self.handle.as_ref()
    }

    pub fn url(&self) -> Option<&str> {
        self.handle.as_ref().map(|h| h.url())
    }

    /// Release now instead of at drop.
    pub fn release(&mut self) {
        let handle = self.handle.take();
        self.store.release_preview(handle.as_ref());
    }
}

impl Drop for PreviewGuard {
    fn drop(&mut self) {
        self.release();
    }
}
