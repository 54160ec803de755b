//! Load orchestration: cache checks, slot binding, search and download tasks.
//!
//! A request flows memory cache → bind decision → search task (disk lookup +
//! decode) → download task (fetch, persist) → memory cache + notify. The
//! search pool dedups nothing (each request decodes for its own params); the
//! download pool merges same-URL submissions into one fetch with many
//! observers. Every completion path re-checks the slot binding immediately
//! before notifying, so work for a rebound slot lands in the caches but
//! never reaches the listener.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::binding::{DisplaySlot, SlotRef, TaskTicket};
use crate::decode::{self, AnimatedDecoder, DecodedImage, FirstFrameDecoder, ImageHandle};
use crate::disk_store::DiskStore;
use crate::env::{Environment, SystemEnvironment};
use crate::error::{LoadError, LoadResult};
use crate::fetch::{ByteFetcher, UreqFetcher};
use crate::fingerprint::{cache_key, is_animated_source};
use crate::listener::{DownloadObserver, LoadListener};
use crate::memory_cache::{CacheStats, MemoryCache};
use crate::params::{LoaderConfig, RequestParams};
use crate::pool::{PoolTask, TaskPool, TaskPriority};

/// Minimum wall-clock gap between progress notifications.
const REPORT_INTERVAL: Duration = Duration::from_millis(300);

/// Concurrent image load-and-cache engine.
///
/// Owns the memory cache, the disk store, and both worker pools for its
/// lifetime. All entry points are non-blocking on the calling thread.
pub struct CacheLoader {
    config: LoaderConfig,
    tag: RwLock<String>,
    env: Arc<dyn Environment>,
    fetcher: Arc<dyn ByteFetcher>,
    animated_decoder: Arc<dyn AnimatedDecoder>,
    cache: Arc<MemoryCache>,
    store: Option<DiskStore>,
    search_pool: RwLock<Arc<TaskPool<SearchTask>>>,
    download_pool: RwLock<Arc<TaskPool<DownloadTask>>>,
    search_workers: usize,
    download_workers: usize,
}

impl CacheLoader {
    pub fn new(
        config: LoaderConfig,
        env: Arc<dyn Environment>,
        fetcher: Arc<dyn ByteFetcher>,
        animated_decoder: Arc<dyn AnimatedDecoder>,
    ) -> LoadResult<Self> {
        let budget = config
            .memory_budget
            .unwrap_or_else(|| (env.total_memory() / 8) as usize);
        let cache = Arc::new(MemoryCache::new(budget));

        let store = match &config.cache_dir {
            Some(dir) if env.storage_available(dir) => Some(DiskStore::new(
                dir.clone(),
                config.auto_clean,
                config.max_disk_bytes,
                config.min_free_bytes,
                config.clean_percent,
                Arc::clone(&env),
            )?),
            Some(dir) => {
                warn!(dir = %dir.display(), "storage unavailable, downloads stay in memory");
                None
            }
            None => None,
        };

        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let search_workers = config.search_workers.unwrap_or(cores);
        let download_workers = config.download_workers.unwrap_or(cores);

        Ok(Self {
            search_pool: RwLock::new(TaskPool::new(
                "img-search",
                search_workers,
                config.search_queue,
                config.time_sort_asc,
            )),
            download_pool: RwLock::new(TaskPool::new(
                "img-download",
                download_workers,
                config.download_queue,
                config.time_sort_asc,
            )),
            search_workers,
            download_workers,
            config,
            tag: RwLock::new(String::new()),
            env,
            fetcher,
            animated_decoder,
            cache,
            store,
        })
    }

    /// Loader with the production environment, fetcher, and animated
    /// decoder, persisting downloads under `cache_dir`.
    pub fn with_defaults(cache_dir: impl Into<PathBuf>) -> LoadResult<Self> {
        let config = LoaderConfig {
            cache_dir: Some(cache_dir.into()),
            ..LoaderConfig::default()
        };
        Self::new(
            config,
            Arc::new(SystemEnvironment),
            Arc::new(UreqFetcher::new()),
            Arc::new(FirstFrameDecoder),
        )
    }

    /// Logical owner grouping attached to scheduled tasks, e.g. a screen
    /// identifier.
    pub fn set_tag(&self, tag: impl Into<String>) {
        *self.tag.write() = tag.into();
    }

    /// Load a remote image into a slot.
    ///
    /// Memory-cache hits notify synchronously. Otherwise, if the slot is
    /// already being filled for this URL, the call is a no-op; else prior
    /// work on the slot is cancelled and a search task is scheduled.
    pub fn load_remote(
        &self,
        url: &str,
        slot: &DisplaySlot,
        params: Arc<RequestParams>,
        listener: Arc<dyn LoadListener>,
    ) {
        let key = cache_key(url, &params);
        if let Some(image) = self.cache.get(&key) {
            // The hit replaces the slot's claim; any in-flight task for a
            // previous source must not notify after this.
            slot.clear();
            listener.on_ready(slot, image, true);
            return;
        }
        if !slot.bind_decision(url) {
            return;
        }
        self.schedule_search(Source::Remote(url.to_string()), slot, params, listener);
    }

    /// Load a local file into a slot. A `file://` prefix is stripped. No
    /// download is ever scheduled for local sources.
    pub fn load_local(
        &self,
        filename: &str,
        slot: &DisplaySlot,
        params: Arc<RequestParams>,
        listener: Arc<dyn LoadListener>,
    ) {
        let path = filename.strip_prefix("file://").unwrap_or(filename);
        let key = cache_key(path, &params);
        if let Some(image) = self.cache.get(&key) {
            // The hit replaces the slot's claim; any in-flight task for a
            // previous source must not notify after this.
            slot.clear();
            listener.on_ready(slot, image, true);
            return;
        }
        if !slot.bind_decision(path) {
            return;
        }
        self.schedule_search(Source::Local(PathBuf::from(path)), slot, params, listener);
    }

    fn schedule_search(
        &self,
        source: Source,
        slot: &DisplaySlot,
        params: Arc<RequestParams>,
        listener: Arc<dyn LoadListener>,
    ) {
        let source_id = source.id().to_string();
        let ticket = TaskTicket::new(source_id.clone());
        slot.bind(Arc::clone(&ticket));
        listener.on_placeholder(slot, params.placeholder.clone());

        let ctx = Arc::new(RequestContext {
            source_id,
            params,
            slot: slot.downgrade(),
            ticket,
            listener,
            cache: Arc::clone(&self.cache),
        });
        let task = SearchTask {
            source,
            ctx,
            store: self.store.clone(),
            env: Arc::clone(&self.env),
            fetcher: Arc::clone(&self.fetcher),
            animated_decoder: Arc::clone(&self.animated_decoder),
            download_pool: Arc::clone(&self.download_pool.read()),
            tag: self.tag.read().clone(),
        };
        let tag = self.tag.read().clone();
        self.search_pool.read().put(&tag, task, TaskPriority::Normal);
    }

    /// Discard all scheduled work and the memory cache, then resume service
    /// on fresh pools with the same parameters.
    pub fn reset(&self) {
        self.cache.clear();
        let old_search = {
            let mut pool = self.search_pool.write();
            std::mem::replace(
                &mut *pool,
                TaskPool::new(
                    "img-search",
                    self.search_workers,
                    self.config.search_queue,
                    self.config.time_sort_asc,
                ),
            )
        };
        let old_download = {
            let mut pool = self.download_pool.write();
            std::mem::replace(
                &mut *pool,
                TaskPool::new(
                    "img-download",
                    self.download_workers,
                    self.config.download_queue,
                    self.config.time_sort_asc,
                ),
            )
        };
        old_search.shutdown_now();
        old_download.shutdown_now();
    }

    pub fn clear_memory_cache(&self) {
        self.cache.clear();
    }

    /// Delete every persisted download. Returns the count removed.
    pub fn clear_disk_cache(&self) -> LoadResult<usize> {
        match &self.store {
            Some(store) => store.clear(),
            None => Ok(0),
        }
    }

    pub fn memory_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn disk_store(&self) -> Option<&DiskStore> {
        self.store.as_ref()
    }
}

impl Drop for CacheLoader {
    fn drop(&mut self) {
        self.search_pool.read().shutdown_now();
        self.download_pool.read().shutdown_now();
    }
}

enum Source {
    Remote(String),
    Local(PathBuf),
}

impl Source {
    fn id(&self) -> &str {
        match self {
            Source::Remote(url) => url,
            Source::Local(path) => path.to_str().unwrap_or(""),
        }
    }
}

/// Everything a completion path needs: the request, its slot claim, and the
/// cache to commit into. Shared between the search task and the download
/// observer it registers.
struct RequestContext {
    source_id: String,
    params: Arc<RequestParams>,
    slot: SlotRef,
    ticket: Arc<TaskTicket>,
    listener: Arc<dyn LoadListener>,
    cache: Arc<MemoryCache>,
}

impl RequestContext {
    fn attached(&self) -> Option<DisplaySlot> {
        self.slot.attached(&self.ticket)
    }

    /// Commit a result to the memory cache and notify the slot if this
    /// request still owns it. A stale result is cached for future requests
    /// but never notified.
    fn commit(&self, image: DecodedImage, from_cache: bool) {
        let handle: ImageHandle = Arc::new(image);
        let key = cache_key(&self.source_id, &self.params);
        self.cache.put(&key, Arc::clone(&handle));
        if let Some(slot) = self.attached() {
            self.listener.on_ready(&slot, handle, from_cache);
        } else {
            debug!(source = %self.source_id, "slot rebound, result cached without notify");
        }
    }

    fn notify_error(&self) {
        if self.attached().is_some() {
            self.listener.on_error();
        }
    }
}

/// Local lookup + decode, scheduling a download on miss.
struct SearchTask {
    source: Source,
    ctx: Arc<RequestContext>,
    store: Option<DiskStore>,
    env: Arc<dyn Environment>,
    fetcher: Arc<dyn ByteFetcher>,
    animated_decoder: Arc<dyn AnimatedDecoder>,
    download_pool: Arc<TaskPool<DownloadTask>>,
    tag: String,
}

impl SearchTask {
    fn decode_local(&self, path: &Path, animated: bool) -> Option<DecodedImage> {
        if animated {
            let data = std::fs::read(path).ok()?;
            return self
                .animated_decoder
                .decode_frames(&data)
                .map(DecodedImage::new);
        }
        match decode::decode_file(path, &self.ctx.params) {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "local decode failed");
                None
            }
        }
    }

    fn run_local(&self, path: &Path) {
        let animated = is_animated_source(self.ctx.source_id.as_str());
        if animated && !self.ctx.params.animated {
            if path.is_file() {
                self.ctx.listener.on_animated_source(path);
            } else {
                self.ctx.notify_error();
            }
            return;
        }
        match self.decode_local(path, animated) {
            Some(image) => self.ctx.commit(image, true),
            None => self.ctx.notify_error(),
        }
    }

    fn run_remote(&self, url: &str) {
        let animated = is_animated_source(url);
        if let Some(store) = &self.store {
            let path = store.file_path(url);
            if animated && !self.ctx.params.animated && path.is_file() {
                self.ctx.listener.on_animated_source(&path);
                return;
            }
            if path.is_file() {
                if let Some(image) = self.decode_local(&path, animated) {
                    self.ctx.commit(image, true);
                    return;
                }
                // Unreadable or corrupt entry; the corrupt case already
                // deleted the file. Fall through to a fresh fetch.
            }
        }

        if let Some(slot) = self.ctx.attached() {
            self.ctx.listener.on_pre_start(&slot, url);
        }
        let observer: Arc<dyn DownloadObserver> = Arc::new(SearchObserver {
            ctx: Arc::clone(&self.ctx),
            store: self.store.clone(),
            animated_decoder: Arc::clone(&self.animated_decoder),
        });
        let task = DownloadTask::new(
            url.to_string(),
            observer,
            self.store.clone(),
            Arc::clone(&self.fetcher),
            Arc::clone(&self.env),
        );
        self.download_pool.put(&self.tag, task, TaskPriority::Normal);
    }
}

impl PoolTask for SearchTask {
    fn flag(&self) -> String {
        self.ctx.source_id.clone()
    }

    fn run(&self) {
        if self.ctx.attached().is_none() {
            return;
        }
        match &self.source {
            Source::Local(path) => self.run_local(path),
            Source::Remote(url) => self.run_remote(url),
        }
    }
}

/// Finishes one request once its download lands: decode with the request's
/// own params, commit, and notify if the slot binding still holds.
struct SearchObserver {
    ctx: Arc<RequestContext>,
    store: Option<DiskStore>,
    animated_decoder: Arc<dyn AnimatedDecoder>,
}

impl DownloadObserver for SearchObserver {
    fn on_start(&self) {
        if self.ctx.attached().is_some() {
            self.ctx.listener.on_start();
        }
    }

    fn on_progress(&self, percent: u8) {
        if self.ctx.attached().is_some() {
            self.ctx.listener.on_progress(percent);
        }
    }

    fn on_finish(&self) {
        let Some(store) = &self.store else { return };
        let path = store.file_path(&self.ctx.source_id);
        let animated = is_animated_source(&self.ctx.source_id);

        if animated && !self.ctx.params.animated {
            if self.ctx.attached().is_some() {
                self.ctx.listener.on_animated_source(&path);
            }
            return;
        }

        let decoded = if animated {
            std::fs::read(&path)
                .ok()
                .and_then(|data| self.animated_decoder.decode_frames(&data))
                .map(DecodedImage::new)
        } else {
            decode::decode_file(&path, &self.ctx.params).ok()
        };
        match decoded {
            Some(image) => self.ctx.commit(image, false),
            None => self.ctx.notify_error(),
        }
    }

    fn on_finish_in_memory(&self, data: Bytes) {
        let animated = is_animated_source(&self.ctx.source_id);
        let decoded = if animated {
            self.animated_decoder
                .decode_frames(&data)
                .map(DecodedImage::new)
        } else {
            decode::decode_bytes(&data, &self.ctx.params).ok()
        };
        match decoded {
            Some(image) => self.ctx.commit(image, false),
            None => self.ctx.notify_error(),
        }
    }

    fn on_error(&self) {
        self.ctx.notify_error();
    }
}

/// Fetches one source, fanning completion out to its merged observer set.
struct DownloadTask {
    url: String,
    store: Option<DiskStore>,
    fetcher: Arc<dyn ByteFetcher>,
    env: Arc<dyn Environment>,
    observers: Mutex<Vec<Arc<dyn DownloadObserver>>>,
    last_progress: Mutex<Instant>,
}

impl DownloadTask {
    fn new(
        url: String,
        observer: Arc<dyn DownloadObserver>,
        store: Option<DiskStore>,
        fetcher: Arc<dyn ByteFetcher>,
        env: Arc<dyn Environment>,
    ) -> Self {
        Self {
            url,
            store,
            fetcher,
            env,
            observers: Mutex::new(vec![observer]),
            last_progress: Mutex::new(Instant::now()),
        }
    }

    fn observers(&self) -> Vec<Arc<dyn DownloadObserver>> {
        self.observers.lock().clone()
    }

    fn report_progress(&self, percent: u8) {
        {
            let mut last = self.last_progress.lock();
            if last.elapsed() < REPORT_INTERVAL {
                return;
            }
            *last = Instant::now();
        }
        for observer in self.observers() {
            observer.on_progress(percent);
        }
    }

    /// Perform the fetch, persisting when a store is configured and its
    /// volume is still available, in memory otherwise.
    fn fetch(&self) -> LoadResult<Fetched> {
        if !self.env.network_available() {
            return Err(LoadError::NetworkUnavailable);
        }

        let persisted = self
            .store
            .as_ref()
            .filter(|store| self.env.storage_available(store.dir()));

        match persisted {
            Some(store) => {
                let dest = store.file_path(&self.url);
                let progress = |percent: u8| self.report_progress(percent);
                self.fetcher.fetch_to_file(&self.url, &dest, &progress)?;
                store.clean_async();
                Ok(Fetched::File)
            }
            None => Ok(Fetched::Memory(self.fetcher.fetch_to_memory(&self.url)?)),
        }
    }
}

/// Where a completed download landed.
enum Fetched {
    /// Persisted at the store path for the source.
    File,
    /// Held in memory; no disk store was usable.
    Memory(Bytes),
}

impl PoolTask for DownloadTask {
    fn flag(&self) -> String {
        self.url.clone()
    }

    /// Merge the newcomer's observers; the same URL is never fetched twice
    /// concurrently.
    fn on_repeat_put(&self, newcomer: &Self) -> bool {
        let incoming = newcomer.observers.lock();
        let mut observers = self.observers.lock();
        for observer in incoming.iter() {
            if !observers.iter().any(|o| Arc::ptr_eq(o, observer)) {
                observers.push(Arc::clone(observer));
            }
        }
        true
    }

    fn run(&self) {
        for observer in self.observers() {
            observer.on_start();
        }

        match self.fetch() {
            Ok(Fetched::File) => {
                for observer in self.observers() {
                    observer.on_finish();
                }
            }
            Ok(Fetched::Memory(data)) => {
                for observer in self.observers() {
                    observer.on_finish_in_memory(data.clone());
                }
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "download failed");
                for observer in self.observers() {
                    observer.on_error();
                }
            }
        }
    }
}
