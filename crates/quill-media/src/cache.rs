//! Deduplicating resource cache.
//!
//! Orchestrates full-resource and thumbnail downloads through the
//! transfer collaborator. Each identity has at most one in-flight
//! transfer: concurrent requesters share the same future and observe the
//! same outcome. Full-fetch entries are dropped once settled (a later
//! request may transfer again); thumbnail futures are memoized for the
//! session, resolved local path included.
//!
//! Failures are surfaced to the caller's future, logged, and never
//! retried by this layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::document::{extension_for_mime, Document, DocumentType};
use crate::error::{MediaError, Result};
use crate::registry::DocumentRegistry;
use crate::transfer::{
    DocumentLocator, FullDownloadOptions, ResourceKind, SaveTarget, SaveTargetProvider,
    SmallDownloadOptions, TransferClient,
};

type SharedFetch = Shared<BoxFuture<'static, Result<Bytes>>>;
type SharedUrl = Shared<BoxFuture<'static, Result<String>>>;

/// Download orchestration for documents known to a [`DocumentRegistry`].
pub struct ResourceCache {
    registry: Arc<DocumentRegistry>,
    transfer: Arc<dyn TransferClient>,
    saver: Arc<dyn SaveTargetProvider>,
    cache_dir: PathBuf,
    pending: Arc<Mutex<HashMap<i64, SharedFetch>>>,
    thumbnails: Mutex<HashMap<(i64, String), SharedUrl>>,
}

impl ResourceCache {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        transfer: Arc<dyn TransferClient>,
        saver: Arc<dyn SaveTargetProvider>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            transfer,
            saver,
            cache_dir: cache_dir.into(),
            pending: Arc::new(Mutex::new(HashMap::new())),
            thumbnails: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the full resource for `id`.
    ///
    /// Rejects immediately for empty/unknown documents. Already-downloaded
    /// documents are served from the local copy or the collaborator's
    /// cache unless an explicit `sink` demands a fresh streamed transfer.
    /// Otherwise at most one transfer is issued per identity; concurrent
    /// callers share it, and a sinked caller joining an existing transfer
    /// gets the shared payload written into its sink once it settles.
    pub async fn fetch_full(&self, id: i64, sink: Option<Arc<dyn SaveTarget>>) -> Result<Bytes> {
        let doc = self.lookup(id)?;
        let locator = self.registry.locator(&doc, None);

        if doc.downloaded && sink.is_none() {
            if doc.local_path.is_some() {
                debug!(doc_id = id, "already downloaded, local copy exists");
                return Ok(Bytes::new());
            }
            if let Some(bytes) = self.transfer.get_cached(&locator) {
                debug!(doc_id = id, "serving collaborator-cached bytes");
                return Ok(bytes);
            }
        }

        let mut sink = sink;
        let fetch = {
            let mut pending = lock(&self.pending);
            match pending.get(&id) {
                Some(existing) => existing.clone(),
                None => {
                    let fetch = self.full_download_future(doc, locator, sink.take());
                    pending.insert(id, fetch.clone());
                    fetch
                }
            }
        };
        let bytes = fetch.await?;
        // A sink that joined an in-flight transfer was not streamed into by
        // the collaborator; hand it the shared payload instead.
        if let Some(sink) = sink {
            sink.write(bytes.clone()).await?;
        }
        Ok(bytes)
    }

    /// Fetch a thumbnail variant, returning the resolved local path.
    /// Memoized per `(id, size_tag)`: every later caller gets the same
    /// resolved future.
    pub async fn fetch_thumbnail(&self, id: i64, size_tag: &str) -> Result<String> {
        let key = (id, size_tag.to_string());
        let memoized = lock(&self.thumbnails).get(&key).cloned();
        if let Some(existing) = memoized {
            return existing.await;
        }

        let doc = self.lookup(id)?;
        let fetch = {
            let mut thumbnails = lock(&self.thumbnails);
            match thumbnails.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    let fetch = self.thumb_download_future(doc, size_tag.to_string());
                    thumbnails.insert(key, fetch.clone());
                    fetch
                }
            }
        };
        fetch.await
    }

    /// Whether a thumbnail fetch for this variant has been started.
    pub fn has_thumbnail(&self, id: i64, size_tag: &str) -> bool {
        lock(&self.thumbnails).contains_key(&(id, size_tag.to_string()))
    }

    /// Save a document to a user-chosen file.
    ///
    /// Preferred path: acquire a save target and stream the full fetch
    /// straight into it, releasing it on completion. A target that cannot
    /// be acquired or never becomes ready (user declined, dialog
    /// dismissed) is not the operation's failure: we fall back to a
    /// buffered fetch plus a generic save.
    pub async fn save_to_local_file(&self, id: i64) -> Result<()> {
        let doc = self.lookup(id)?;
        let filename = self.registry.display_filename(&doc);
        let ext = Path::new(&filename)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let target = match self
            .saver
            .choose_save_target(&filename, &ext, &doc.mime_type, doc.size)
            .await
        {
            Ok(target) => match target.ready().await {
                Ok(()) => Some(target),
                Err(e) => {
                    debug!(doc_id = id, error = %e, "save target not ready, buffered fallback");
                    target.close().await;
                    None
                }
            },
            Err(e) => {
                debug!(doc_id = id, error = %e, "no save target, buffered fallback");
                None
            }
        };

        match target {
            Some(target) => {
                let result = self.fetch_full(id, Some(target.clone())).await;
                target.close().await;
                result.map(|_| ())
            }
            None => {
                let bytes = self.fetch_full(id, None).await?;
                self.saver.save_bytes(&filename, bytes).await
            }
        }
    }

    fn lookup(&self, id: i64) -> Result<Document> {
        self.registry
            .get(id)
            .filter(|doc| !doc.is_empty())
            .ok_or(MediaError::EmptyDocument(id))
    }

    fn full_download_future(
        &self,
        doc: Document,
        locator: DocumentLocator,
        sink: Option<Arc<dyn SaveTarget>>,
    ) -> SharedFetch {
        let transfer = Arc::clone(&self.transfer);
        let registry = Arc::clone(&self.registry);
        let pending = Arc::clone(&self.pending);
        let cache_dir = self.cache_dir.clone();

        async move {
            let opts = FullDownloadOptions {
                mime_type: doc.mime_type.clone(),
                output: sink,
                kind: resource_kind(&doc),
            };
            let outcome = match transfer
                .download_full(doc.dc_id, locator, doc.size, opts)
                .await
            {
                Ok(bytes) => {
                    registry.mark_downloaded(doc.id);
                    // Raw animated-sticker bytes are consumed directly by the
                    // renderer; everything else with a display type gets a
                    // playable local copy.
                    let wants_local_copy = doc.doc_type.is_some()
                        && doc.doc_type != Some(DocumentType::AnimatedSticker);
                    if wants_local_copy {
                        let name = format!("{}{}", doc.id, extension_for_mime(&doc.mime_type));
                        match write_cache_file(&cache_dir, &name, &bytes).await {
                            Ok(path) => registry.set_local_path(doc.id, path),
                            Err(e) => {
                                warn!(doc_id = doc.id, error = %e, "local copy failed")
                            }
                        }
                    }
                    info!(doc_id = doc.id, size = bytes.len(), "document downloaded");
                    Ok(bytes)
                }
                Err(e) => {
                    error!(doc_id = doc.id, error = %e, "document download failed");
                    Err(e)
                }
            };
            lock(&pending).remove(&doc.id);
            outcome
        }
        .boxed()
        .shared()
    }

    fn thumb_download_future(&self, doc: Document, size_tag: String) -> SharedUrl {
        let transfer = Arc::clone(&self.transfer);
        let locator = self.registry.locator(&doc, Some(&size_tag));
        let cache_dir = self.cache_dir.clone();

        async move {
            let kind = resource_kind(&doc);
            let mime_type = if kind == ResourceKind::Sticker {
                "image/webp".to_string()
            } else {
                doc.mime_type.clone()
            };
            let opts = SmallDownloadOptions {
                dc_id: doc.dc_id,
                mime_type: mime_type.clone(),
                kind,
            };
            let bytes = transfer
                .download_small(locator.clone(), opts)
                .await
                .map_err(|e| {
                    error!(doc_id = doc.id, size_tag = %size_tag, error = %e, "thumbnail download failed");
                    e
                })?;
            transfer.save_small(&locator, bytes.clone());

            let name = format!("{}_{}{}", doc.id, size_tag, extension_for_mime(&mime_type));
            let path = write_cache_file(&cache_dir, &name, &bytes).await?;
            debug!(doc_id = doc.id, size_tag = %size_tag, "thumbnail cached");
            Ok(path)
        }
        .boxed()
        .shared()
    }
}

fn resource_kind(doc: &Document) -> ResourceKind {
    match doc.doc_type {
        Some(DocumentType::Sticker) | Some(DocumentType::AnimatedSticker) => ResourceKind::Sticker,
        _ => ResourceKind::Document,
    }
}

async fn write_cache_file(dir: &Path, name: &str, bytes: &Bytes) -> Result<String> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path.to_string_lossy().into_owned())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentAttribute, RawDocument};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockTransfer {
        payload: Bytes,
        full_calls: AtomicUsize,
        small_calls: AtomicUsize,
        fail_next: AtomicBool,
        cached: Mutex<HashMap<i64, Bytes>>,
        saved_small: Mutex<Vec<DocumentLocator>>,
        last_small_mime: Mutex<Option<String>>,
    }

    impl MockTransfer {
        fn new(payload: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                payload: Bytes::copy_from_slice(payload),
                full_calls: AtomicUsize::new(0),
                small_calls: AtomicUsize::new(0),
                fail_next: AtomicBool::new(false),
                cached: Mutex::new(HashMap::new()),
                saved_small: Mutex::new(Vec::new()),
                last_small_mime: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TransferClient for MockTransfer {
        async fn download_full(
            &self,
            _dc_id: i32,
            _locator: DocumentLocator,
            _size: i64,
            opts: FullDownloadOptions,
        ) -> Result<Bytes> {
            self.full_calls.fetch_add(1, Ordering::SeqCst);
            // Force a suspension point so concurrent callers can pile up
            // behind the pending-fetch table.
            tokio::task::yield_now().await;
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(MediaError::Transfer("connection reset".into()));
            }
            if let Some(sink) = &opts.output {
                sink.write(self.payload.clone()).await?;
            }
            Ok(self.payload.clone())
        }

        async fn download_small(
            &self,
            _locator: DocumentLocator,
            opts: SmallDownloadOptions,
        ) -> Result<Bytes> {
            self.small_calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            *lock(&self.last_small_mime) = Some(opts.mime_type);
            Ok(self.payload.clone())
        }

        fn get_cached(&self, locator: &DocumentLocator) -> Option<Bytes> {
            lock(&self.cached).get(&locator.id).cloned()
        }

        fn save_small(&self, locator: &DocumentLocator, _bytes: Bytes) {
            lock(&self.saved_small).push(locator.clone());
        }
    }

    struct MockTarget {
        written: Mutex<Vec<Bytes>>,
        closed: AtomicBool,
        ready_fails: AtomicBool,
    }

    impl MockTarget {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                written: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                ready_fails: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl SaveTarget for MockTarget {
        async fn ready(&self) -> Result<()> {
            if self.ready_fails.load(Ordering::SeqCst) {
                return Err(MediaError::SaveTarget("dismissed after open".into()));
            }
            Ok(())
        }

        async fn write(&self, bytes: Bytes) -> Result<()> {
            lock(&self.written).push(bytes);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct MockSaver {
        decline: bool,
        target: Arc<MockTarget>,
        saved: Mutex<Vec<(String, Bytes)>>,
    }

    impl MockSaver {
        fn new(decline: bool) -> Arc<Self> {
            Arc::new(Self {
                decline,
                target: MockTarget::new(),
                saved: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SaveTargetProvider for MockSaver {
        async fn choose_save_target(
            &self,
            _filename: &str,
            _ext: &str,
            _mime_type: &str,
            _size: i64,
        ) -> Result<Arc<dyn SaveTarget>> {
            if self.decline {
                return Err(MediaError::SaveTarget("user declined".into()));
            }
            Ok(self.target.clone())
        }

        async fn save_bytes(&self, filename: &str, bytes: Bytes) -> Result<()> {
            lock(&self.saved).push((filename.to_string(), bytes));
            Ok(())
        }
    }

    struct Fixture {
        registry: Arc<DocumentRegistry>,
        transfer: Arc<MockTransfer>,
        saver: Arc<MockSaver>,
        cache: ResourceCache,
        _dir: tempfile::TempDir,
    }

    fn fixture(decline_save: bool) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(DocumentRegistry::new());
        let transfer = MockTransfer::new(b"payload");
        let saver = MockSaver::new(decline_save);
        let cache = ResourceCache::new(
            registry.clone(),
            transfer.clone(),
            saver.clone(),
            dir.path(),
        );
        Fixture {
            registry,
            transfer,
            saver,
            cache,
            _dir: dir,
        }
    }

    fn save_video(registry: &DocumentRegistry, id: i64) -> Document {
        registry.save(
            RawDocument {
                id,
                access_hash: 1,
                file_reference: vec![1],
                dc_id: 2,
                size: 7,
                attributes: vec![DocumentAttribute::Video {
                    duration: 3,
                    w: 100,
                    h: 100,
                    round: false,
                    supports_streaming: true,
                }],
                ..Default::default()
            },
            None,
        )
    }

    fn save_sticker(registry: &DocumentRegistry, id: i64, animated: bool) -> Document {
        registry.save(
            RawDocument {
                id,
                access_hash: 1,
                file_reference: vec![1],
                dc_id: 2,
                size: 7,
                attributes: vec![DocumentAttribute::Sticker {
                    alt: "✨".into(),
                    animated,
                }],
                ..Default::default()
            },
            None,
        )
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_transfer() {
        let f = fixture(false);
        save_video(&f.registry, 42);

        let (a, b) = tokio::join!(f.cache.fetch_full(42, None), f.cache.fetch_full(42, None));

        assert_eq!(a.unwrap(), Bytes::from_static(b"payload"));
        assert_eq!(b.unwrap(), Bytes::from_static(b"payload"));
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_document_rejects_without_transfer() {
        let f = fixture(false);

        let err = f.cache.fetch_full(404, None).await.unwrap_err();
        assert_eq!(err, MediaError::EmptyDocument(404));
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_marks_downloaded_and_stores_local_copy() {
        let f = fixture(false);
        save_video(&f.registry, 42);

        f.cache.fetch_full(42, None).await.unwrap();

        let doc = f.registry.get(42).unwrap();
        assert!(doc.downloaded);
        let path = doc.local_path.expect("local copy recorded");
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn animated_sticker_skips_local_copy() {
        let f = fixture(false);
        save_sticker(&f.registry, 9, true);

        f.cache.fetch_full(9, None).await.unwrap();

        let doc = f.registry.get(9).unwrap();
        assert!(doc.downloaded);
        assert!(doc.local_path.is_none());
    }

    #[tokio::test]
    async fn downloaded_with_local_copy_short_circuits() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        f.registry.mark_downloaded(42);
        f.registry.set_local_path(42, "/tmp/anywhere".into());

        let bytes = f.cache.fetch_full(42, None).await.unwrap();
        assert!(bytes.is_empty());
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn downloaded_without_local_copy_serves_collaborator_cache() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        f.registry.mark_downloaded(42);
        lock(&f.transfer.cached).insert(42, Bytes::from_static(b"held"));

        let bytes = f.cache.fetch_full(42, None).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"held"));
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failure_propagates_and_permits_a_later_fetch() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        f.transfer.fail_next.store(true, Ordering::SeqCst);

        let err = f.cache.fetch_full(42, None).await.unwrap_err();
        assert!(matches!(err, MediaError::Transfer(_)));
        assert!(!f.registry.get(42).unwrap().downloaded);

        // No automatic retry happened; a fresh request transfers again.
        f.cache.fetch_full(42, None).await.unwrap();
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_sink_forces_fresh_streamed_transfer() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        f.registry.mark_downloaded(42);
        f.registry.set_local_path(42, "/tmp/anywhere".into());

        let target = MockTarget::new();
        f.cache.fetch_full(42, Some(target.clone())).await.unwrap();

        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 1);
        assert_eq!(lock(&target.written).len(), 1);
    }

    #[tokio::test]
    async fn thumbnails_are_memoized_per_variant() {
        let f = fixture(false);
        save_video(&f.registry, 42);

        let first = f.cache.fetch_thumbnail(42, "m").await.unwrap();
        let second = f.cache.fetch_thumbnail(42, "m").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.transfer.small_calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&first).unwrap(), b"payload");

        assert!(f.cache.has_thumbnail(42, "m"));
        assert!(!f.cache.has_thumbnail(42, "x"));

        f.cache.fetch_thumbnail(42, "x").await.unwrap();
        assert_eq!(f.transfer.small_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn thumbnail_bytes_are_handed_back_to_collaborator() {
        let f = fixture(false);
        save_video(&f.registry, 42);

        f.cache.fetch_thumbnail(42, "s").await.unwrap();

        let saved = lock(&f.transfer.saved_small);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].thumb_size.as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn sticker_thumbnails_request_webp() {
        let f = fixture(false);
        save_sticker(&f.registry, 9, false);

        f.cache.fetch_thumbnail(9, "s").await.unwrap();
        assert_eq!(
            lock(&f.transfer.last_small_mime).as_deref(),
            Some("image/webp")
        );
    }

    #[tokio::test]
    async fn thumbnail_of_empty_document_rejects() {
        let f = fixture(false);
        let err = f.cache.fetch_thumbnail(404, "s").await.unwrap_err();
        assert_eq!(err, MediaError::EmptyDocument(404));
        assert!(!f.cache.has_thumbnail(404, "s"));
    }

    #[tokio::test]
    async fn save_streams_into_chosen_target() {
        let f = fixture(false);
        save_video(&f.registry, 42);

        f.cache.save_to_local_file(42).await.unwrap();

        assert!(f.saver.target.closed.load(Ordering::SeqCst));
        let written = lock(&f.saver.target.written);
        assert_eq!(written.as_slice(), &[Bytes::from_static(b"payload")]);
        // The streamed path is never the buffered fallback.
        assert!(lock(&f.saver.saved).is_empty());
    }

    #[tokio::test]
    async fn sinked_call_joining_a_pending_fetch_still_fills_its_sink() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        let target = MockTarget::new();

        let (plain, sinked) = tokio::join!(
            f.cache.fetch_full(42, None),
            f.cache.fetch_full(42, Some(target.clone()))
        );

        plain.unwrap();
        sinked.unwrap();
        assert_eq!(f.transfer.full_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            lock(&target.written).as_slice(),
            &[Bytes::from_static(b"payload")]
        );
    }

    #[tokio::test]
    async fn unready_save_target_is_released_and_falls_back_to_buffered_save() {
        let f = fixture(false);
        save_video(&f.registry, 42);
        f.saver.target.ready_fails.store(true, Ordering::SeqCst);

        f.cache.save_to_local_file(42).await.unwrap();

        assert!(f.saver.target.closed.load(Ordering::SeqCst));
        assert!(lock(&f.saver.target.written).is_empty());
        let saved = lock(&f.saver.saved);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].1, Bytes::from_static(b"payload"));
    }

    #[tokio::test]
    async fn declined_save_target_falls_back_to_buffered_save() {
        let f = fixture(true);
        save_video(&f.registry, 42);

        f.cache.save_to_local_file(42).await.unwrap();

        let saved = lock(&f.saver.saved);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].0, "t_video42.mp4");
        assert_eq!(saved[0].1, Bytes::from_static(b"payload"));
    }
}
