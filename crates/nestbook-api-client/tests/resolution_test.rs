#[path = "helpers/mod.rs"]
mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use helpers::mocks::{MockLoader, RecordingHooks};
use helpers::{test_rewriter, PROXY_BASE};
use nestbook_api_client::{AssetReference, AssetView, Phase, ResolutionHooks};
use nestbook_core::{CandidateFile, PreviewStore};
use nestbook_storage::encode_key;

const STORAGE_URL: &str = "https://nestbook.s3.amazonaws.com/photos/villa.jpg";
const FALLBACK: &str = "/images/placeholder.png";

fn proxied(key: &str) -> String {
    format!("{}/{}", PROXY_BASE, encode_key(key))
}

fn view(loader: Arc<MockLoader>, hooks: Arc<RecordingHooks>) -> AssetView {
    AssetView::new(test_rewriter(), loader).with_hooks(hooks)
}

#[tokio::test]
async fn test_storage_url_loads_through_proxy() {
    let loader = Arc::new(MockLoader::new().serving(&proxied("photos/villa.jpg")));
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone());

    let state = view.show(AssetReference::new(STORAGE_URL)).await;

    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.resolved_url(), Some(proxied("photos/villa.jpg").as_str()));
    assert_eq!(loader.calls(), vec![proxied("photos/villa.jpg")]);
    assert_eq!(hooks.loads(), 1);
    assert!(view.content().is_some());
}

#[tokio::test]
async fn test_fallback_recovers_without_error_hook() {
    let loader = Arc::new(MockLoader::new().serving(FALLBACK));
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone()).with_fallback(FALLBACK);
    let mut states = view.subscribe();

    let state = view.show(AssetReference::new(STORAGE_URL)).await;

    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.active_url.as_deref(), Some(FALLBACK));
    assert!(state.attempted_fallback);
    assert_eq!(loader.calls(), vec![proxied("photos/villa.jpg"), FALLBACK.to_string()]);
    assert_eq!(hooks.errors(), 0);
    assert_eq!(hooks.loads(), 1);
    assert!(states.has_changed().unwrap());
    assert_eq!(states.borrow_and_update().phase, Phase::Ready);
}

#[tokio::test]
async fn test_fallback_failure_calls_error_once() {
    let loader = Arc::new(MockLoader::new());
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone()).with_fallback(FALLBACK);

    let state = view.show(AssetReference::new(STORAGE_URL)).await;

    assert_eq!(state.phase, Phase::Error);
    assert!(state.resolved_url().is_none());
    assert_eq!(hooks.errors(), 1);
    assert_eq!(hooks.loads(), 0);
    assert_eq!(loader.calls().len(), 2);
}

#[tokio::test]
async fn test_at_most_two_attempts_per_reference() {
    let references = [
        STORAGE_URL,
        "photos/a.jpg",
        "/images/missing.png",
        "https://cdn.example.com/a.jpg",
        "",
    ];
    for reference in references {
        let loader = Arc::new(MockLoader::new());
        let hooks = Arc::new(RecordingHooks::default());
        let view = view(loader.clone(), hooks.clone()).with_fallback(FALLBACK);

        let state = view.show(AssetReference::new(reference)).await;
        assert_eq!(state.phase, Phase::Error, "{:?}", reference);
        assert!(loader.calls().len() <= 2, "{:?}: {:?}", reference, loader.calls());
        assert_eq!(hooks.errors(), 1);
    }
}

#[tokio::test]
async fn test_fallback_equal_to_primary_is_not_retried() {
    let loader = Arc::new(MockLoader::new());
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone()).with_fallback(FALLBACK);

    let state = view.show(AssetReference::new(FALLBACK)).await;
    assert_eq!(state.phase, Phase::Error);
    assert!(!state.attempted_fallback);
    assert_eq!(loader.calls(), vec![FALLBACK.to_string()]);
}

#[tokio::test]
async fn test_same_identity_does_not_reload() {
    let loader = Arc::new(MockLoader::new().serving("/images/logo.svg"));
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone());

    let reference = AssetReference::new("/images/logo.svg");
    view.show(reference.clone()).await;
    let state = view.show(reference).await;

    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(loader.calls().len(), 1);
    assert_eq!(hooks.loads(), 1);
}

#[tokio::test]
async fn test_new_identity_resets_fallback_state() {
    let loader = Arc::new(MockLoader::new().serving(FALLBACK));
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone()).with_fallback(FALLBACK);

    let first = view.show(AssetReference::new(STORAGE_URL)).await;
    assert!(first.attempted_fallback);

    // Same string, new identity: the machine starts over and may fall back again.
    let second = view.show(AssetReference::new(STORAGE_URL)).await;
    assert_eq!(second.phase, Phase::Ready);
    assert!(second.attempted_fallback);
    assert_eq!(loader.calls().len(), 4);
    assert_eq!(hooks.loads(), 2);
    assert_eq!(hooks.errors(), 0);
}

#[tokio::test]
async fn test_superseded_load_is_not_applied() {
    let slow = proxied("photos/slow.jpg");
    let fast = proxied("photos/fast.jpg");
    let loader = Arc::new(
        MockLoader::new()
            .serving(&slow)
            .serving(&fast)
            .delayed(&slow, Duration::from_millis(200)),
    );
    let hooks = Arc::new(RecordingHooks::default());
    let view = Arc::new(view(loader.clone(), hooks.clone()));

    let pending = view.spawn_show(AssetReference::new("photos/slow.jpg"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = view.show(AssetReference::new("photos/fast.jpg")).await;
    pending.await.unwrap();

    assert_eq!(state.resolved_url(), Some(fast.as_str()));
    assert_eq!(view.snapshot().resolved_url(), Some(fast.as_str()));
    assert_eq!(hooks.loads(), 1);
    assert_eq!(*hooks.loaded_urls.lock().unwrap(), vec![fast]);
}

#[tokio::test]
async fn test_load_timeout_falls_back() {
    let loader = Arc::new(
        MockLoader::new()
            .serving(&proxied("photos/hang.jpg"))
            .serving(FALLBACK)
            .delayed(&proxied("photos/hang.jpg"), Duration::from_secs(30)),
    );
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader, hooks.clone())
        .with_fallback(FALLBACK)
        .with_load_timeout(Some(Duration::from_millis(20)));

    let state = view.show(AssetReference::new("photos/hang.jpg")).await;
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.active_url.as_deref(), Some(FALLBACK));
    assert_eq!(hooks.errors(), 0);
}

#[tokio::test]
async fn test_shutdown_stops_pending_load() {
    let url = proxied("photos/hang.jpg");
    let loader = Arc::new(
        MockLoader::new()
            .serving(&url)
            .delayed(&url, Duration::from_secs(30)),
    );
    let hooks = Arc::new(RecordingHooks::default());
    let view = Arc::new(view(loader, hooks.clone()));

    let pending = view.spawn_show(AssetReference::new("photos/hang.jpg"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    view.shutdown();

    let state = pending.await.unwrap();
    assert_eq!(state.phase, Phase::Loading);
    assert_eq!(hooks.loads() + hooks.errors(), 0);
}

#[tokio::test]
async fn test_local_preview_skips_network() {
    let store = PreviewStore::new();
    let file = CandidateFile::new("pool.png", "image/png", vec![1u8, 2, 3]);
    let guard = store.create_guarded(&file).unwrap();
    let preview_url = guard.url().unwrap().to_string();

    let loader = Arc::new(MockLoader::new());
    let hooks = Arc::new(RecordingHooks::default());
    let view = view(loader.clone(), hooks.clone()).with_previews(store.clone());

    let state = view.show(AssetReference::new(preview_url.as_str())).await;
    assert_eq!(state.resolved_url(), Some(preview_url.as_str()));
    assert!(loader.calls().is_empty());
    assert_eq!(hooks.loads(), 1);

    drop(guard);
    assert_eq!(store.active_count(), 0);
}

/// Counts hooks that fire for a reference the view no longer displays.
#[derive(Default)]
struct CurrentOnlyHooks {
    view: OnceLock<Weak<AssetView>>,
    fired: AtomicUsize,
    stale: AtomicUsize,
}

impl CurrentOnlyHooks {
    fn check(&self, reference: &AssetReference) {
        self.fired.fetch_add(1, Ordering::SeqCst);
        let current = self
            .view
            .get()
            .and_then(Weak::upgrade)
            .and_then(|view| view.current());
        if !current.is_some_and(|c| c.same_identity(reference)) {
            self.stale.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ResolutionHooks for CurrentOnlyHooks {
    fn on_load(&self, reference: &AssetReference, _url: &str) {
        self.check(reference);
    }

    fn on_error(&self, reference: &AssetReference) {
        self.check(reference);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hooks_only_fire_for_current_reference() {
    let keys: Vec<String> = (0..64).map(|i| format!("photos/race-{}.jpg", i)).collect();
    // Odd keys fail so both hooks race against new references.
    let loader = keys
        .iter()
        .step_by(2)
        .fold(MockLoader::new(), |loader, key| loader.serving(&proxied(key)));
    let hooks = Arc::new(CurrentOnlyHooks::default());
    let view = Arc::new(AssetView::new(test_rewriter(), Arc::new(loader)).with_hooks(hooks.clone()));
    hooks.view.set(Arc::downgrade(&view)).unwrap();

    let pending: Vec<_> = keys
        .iter()
        .map(|key| view.spawn_show(AssetReference::new(key.as_str())))
        .collect();
    for handle in pending {
        handle.await.unwrap();
    }

    assert!(hooks.fired.load(Ordering::SeqCst) >= 1);
    assert_eq!(hooks.stale.load(Ordering::SeqCst), 0);
}
