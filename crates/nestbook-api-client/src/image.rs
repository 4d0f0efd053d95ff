//! Image resolution
//!
//! `ResolutionMachine` is the pure Loading/Ready/Error machine with its
//! one-shot fallback. `AssetView` drives it for one displayed asset: it
//! rewrites the reference, performs the loads, publishes every state on a
//! `watch` channel and calls the caller's hooks once per reference.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use nestbook_core::PreviewStore;
use nestbook_storage::ReferenceRewriter;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// Primary load plus at most one fallback.
pub const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Loading,
    Ready,
    Error,
}

/// What the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionState {
    pub phase: Phase,
    pub active_url: Option<String>,
    pub attempted_fallback: bool,
}

impl ResolutionState {
    pub fn is_loading(&self) -> bool {
        self.phase == Phase::Loading
    }

    pub fn is_error(&self) -> bool {
        self.phase == Phase::Error
    }

    /// URL to display, only once it actually loaded.
    pub fn resolved_url(&self) -> Option<&str> {
        match self.phase {
            Phase::Ready => self.active_url.as_deref(),
            _ => None,
        }
    }
}

/// Result of feeding a load outcome to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Entered `Ready` with this URL.
    Ready(String),
    /// Still loading; try this URL next.
    Retry(String),
    /// Entered `Error`.
    Failed,
    /// The machine was not loading; nothing changed.
    Ignored,
}

/// Loading/Ready/Error machine for one reference.
#[derive(Debug, Clone)]
pub struct ResolutionMachine {
    state: ResolutionState,
    fallback: Option<String>,
    attempts: u32,
}

impl ResolutionMachine {
    pub fn new(fallback: Option<String>) -> Self {
        Self {
            state: ResolutionState::default(),
            fallback: fallback.filter(|f| !f.is_empty()),
            attempts: 0,
        }
    }

    pub fn state(&self) -> &ResolutionState {
        &self.state
    }

    /// Loads started since the last `start`.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Full reset for a new reference; returns the URL to load first.
    pub fn start(&mut self, url: impl Into<String>) -> String {
        let url = url.into();
        self.state = ResolutionState {
            phase: Phase::Loading,
            active_url: Some(url.clone()),
            attempted_fallback: false,
        };
        self.attempts = 1;
        url
    }

    pub fn on_loaded(&mut self) -> Transition {
        if self.state.phase != Phase::Loading {
            return Transition::Ignored;
        }
        self.state.phase = Phase::Ready;
        Transition::Ready(self.state.active_url.clone().unwrap_or_default())
    }

    pub fn on_failed(&mut self) -> Transition {
        if self.state.phase != Phase::Loading {
            return Transition::Ignored;
        }

        let retry = match &self.fallback {
            Some(fallback)
                if !self.state.attempted_fallback
                    && self.attempts < MAX_ATTEMPTS
                    && self.state.active_url.as_deref() != Some(fallback.as_str()) =>
            {
                Some(fallback.clone())
            }
            _ => None,
        };

        match retry {
            Some(url) => {
                self.state.active_url = Some(url.clone());
                self.state.attempted_fallback = true;
                self.attempts += 1;
                Transition::Retry(url)
            }
            None => {
                self.state.phase = Phase::Error;
                Transition::Failed
            }
        }
    }
}

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

/// A reference handed to an `AssetView`.
///
/// Identity, not value, decides whether a view starts over: clones share an
/// identity, while two `new` calls with the same string do not.
#[derive(Clone)]
pub struct AssetReference {
    id: u64,
    value: Arc<str>,
}

impl AssetReference {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self {
            id: NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed),
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn same_identity(&self, other: &AssetReference) -> bool {
        self.id == other.id
    }
}

impl fmt::Debug for AssetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AssetReference")
            .field(&self.id)
            .field(&&*self.value)
            .finish()
    }
}

/// Fetches the bytes behind a resolved URL.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, url: &str) -> Result<Bytes, TransferError>;
}

/// Callbacks for terminal states; each fires at most once per reference.
pub trait ResolutionHooks: Send + Sync {
    fn on_load(&self, _reference: &AssetReference, _url: &str) {}
    fn on_error(&self, _reference: &AssetReference) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl ResolutionHooks for NoHooks {}

struct ViewInner {
    current: Option<AssetReference>,
    machine: ResolutionMachine,
    generation: u64,
    cancel: CancellationToken,
    content: Option<Bytes>,
}

fn lock(inner: &Mutex<ViewInner>) -> MutexGuard<'_, ViewInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// One displayed asset.
pub struct AssetView {
    rewriter: ReferenceRewriter,
    loader: Arc<dyn ImageLoader>,
    hooks: Arc<dyn ResolutionHooks>,
    previews: Option<PreviewStore>,
    load_timeout: Option<Duration>,
    closed: CancellationToken,
    /// Held from a terminal transition until its hook returns, so a new
    /// reference cannot become current in between. Taken before `inner`.
    hook_gate: Mutex<()>,
    inner: Mutex<ViewInner>,
    state_tx: watch::Sender<ResolutionState>,
}

impl AssetView {
    pub fn new(rewriter: ReferenceRewriter, loader: Arc<dyn ImageLoader>) -> Self {
        let closed = CancellationToken::new();
        let (state_tx, _) = watch::channel(ResolutionState::default());
        Self {
            rewriter,
            loader,
            hooks: Arc::new(NoHooks),
            previews: None,
            load_timeout: None,
            hook_gate: Mutex::new(()),
            inner: Mutex::new(ViewInner {
                current: None,
                machine: ResolutionMachine::new(None),
                generation: 0,
                cancel: closed.child_token(),
                content: None,
            }),
            closed,
            state_tx,
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ResolutionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Alternate URL tried once when the primary load fails. Used as given.
    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        let fallback = fallback.into();
        self.inner
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .machine = ResolutionMachine::new(Some(fallback));
        self
    }

    /// Local previews are shown straight from `store` without a network load.
    pub fn with_previews(mut self, store: PreviewStore) -> Self {
        self.previews = Some(store);
        self
    }

    /// A load exceeding `timeout` counts as a failed attempt.
    pub fn with_load_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ResolutionState> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> ResolutionState {
        lock(&self.inner).machine.state().clone()
    }

    /// The reference currently displayed, if any.
    pub fn current(&self) -> Option<AssetReference> {
        lock(&self.inner).current.clone()
    }

    /// Bytes of the last successful load for the current reference.
    pub fn content(&self) -> Option<Bytes> {
        lock(&self.inner).content.clone()
    }

    /// Stop all loads; later `show` calls leave the state untouched.
    pub fn shutdown(&self) {
        self.closed.cancel();
    }

    /// Display `reference` and drive it to a terminal state.
    ///
    /// Showing a reference with the current identity again is a no-op. A new
    /// identity resets the machine, including the fallback flag, and makes any
    /// load still running for the previous reference irrelevant.
    pub async fn show(&self, reference: AssetReference) -> ResolutionState {
        if self.closed.is_cancelled() {
            return self.snapshot();
        }

        let preview = self.local_preview(reference.as_str());

        let (generation, cancel, mut url) = {
            let _gate = self.gate();
            let mut inner = lock(&self.inner);
            if let Some(current) = &inner.current {
                if current.same_identity(&reference) {
                    return inner.machine.state().clone();
                }
            }

            inner.cancel.cancel();
            inner.cancel = self.closed.child_token();
            inner.generation += 1;
            inner.current = Some(reference.clone());
            inner.content = None;

            let url = if preview.is_some() {
                reference.as_str().to_string()
            } else {
                let resolved = self.rewriter.resolve(reference.as_str());
                tracing::debug!(
                    reference = %reference.as_str(),
                    class = %resolved.class,
                    url = %resolved.url,
                    "Resolving asset"
                );
                resolved.url
            };
            let url = inner.machine.start(url);
            self.publish(&inner);
            (inner.generation, inner.cancel.clone(), url)
        };

        if let Some(bytes) = preview {
            return self.finish(&reference, generation, Ok(bytes)).0;
        }

        loop {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return self.snapshot(),
                outcome = self.load(&url) => outcome,
            };

            match self.finish(&reference, generation, outcome) {
                (_, Some(next)) => url = next,
                (state, None) => return state,
            }
        }
    }

    /// Run `show` on a background task.
    pub fn spawn_show(
        self: &Arc<Self>,
        reference: AssetReference,
    ) -> tokio::task::JoinHandle<ResolutionState> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.show(reference).await })
    }

    async fn load(&self, url: &str) -> Result<Bytes, TransferError> {
        match self.load_timeout {
            Some(limit) => tokio::time::timeout(limit, self.loader.load(url))
                .await
                .unwrap_or(Err(TransferError::Timeout(limit))),
            None => self.loader.load(url).await,
        }
    }

    fn local_preview(&self, reference: &str) -> Option<Bytes> {
        self.previews
            .as_ref()
            .and_then(|store| store.lookup(reference))
            .map(|(_, bytes)| bytes)
    }

    /// Apply one load outcome if `generation` is still current. Returns the
    /// state after the transition and the next URL to try, if any.
    fn finish(
        &self,
        reference: &AssetReference,
        generation: u64,
        outcome: Result<Bytes, TransferError>,
    ) -> (ResolutionState, Option<String>) {
        let _gate = self.gate();
        let (state, transition) = {
            let mut inner = lock(&self.inner);
            if inner.generation != generation || self.closed.is_cancelled() {
                return (inner.machine.state().clone(), None);
            }

            let transition = match outcome {
                Ok(bytes) => {
                    inner.content = Some(bytes);
                    inner.machine.on_loaded()
                }
                Err(e) => {
                    tracing::debug!(
                        reference = %reference.as_str(),
                        url = ?inner.machine.state().active_url,
                        error = %e,
                        "Image load failed"
                    );
                    inner.machine.on_failed()
                }
            };
            self.publish(&inner);
            (inner.machine.state().clone(), transition)
        };

        match transition {
            Transition::Ready(url) => {
                self.hooks.on_load(reference, &url);
                (state, None)
            }
            Transition::Failed => {
                tracing::warn!(reference = %reference.as_str(), "Image failed to load");
                self.hooks.on_error(reference);
                (state, None)
            }
            Transition::Retry(next) => {
                tracing::debug!(reference = %reference.as_str(), fallback = %next, "Trying fallback");
                (state, Some(next))
            }
            Transition::Ignored => (state, None),
        }
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.hook_gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, inner: &ViewInner) {
        self.state_tx.send_replace(inner.machine.state().clone());
    }
}

impl Drop for AssetView {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
