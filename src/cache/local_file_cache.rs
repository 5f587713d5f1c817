//! Local File Cache
//!
//! Capacity-bounded, disk-backed cache of remote WebDAV files. Each fetch
//! lands in its own timestamped batch directory under the cache root, is
//! described by a sidecar so the index can be rebuilt after a restart, and
//! is registered in a weighted LRU index whose evictions are deleted from
//! disk by background workers.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use url::Url;

use super::builder::BuilderRegistry;
use super::cached_file::CachedFile;
use super::errors::CacheError;
use super::loader::{LoadReport, LocalFileLoader, BATCH_NAME_FORMAT};
use super::path_map::{is_directory_url, logical_key, relative_local_path};
use super::removal::{RemovalDispatcher, REMOVAL_THREADS};
use super::weighted_lru::WeightedLru;
use crate::webdav::{RemoteFile, RemoteFileSource};

/// Hidden directory created under the configured parent
pub const CACHE_DIRECTORY_NAME: &str = ".davcache";

/// In-progress transfers, purged at startup
pub const TEMP_DIRECTORY_NAME: &str = "temp";

/// Directories with more files than this are fetched concurrently
const DIRECTORY_FETCH_THRESHOLD: usize = 8;

/// Concurrent transfers for a large directory
const DIRECTORY_FETCH_WORKERS: usize = 4;

/// Background fetches started by `effective_location`
const ASYNC_LOAD_PERMITS: usize = 4;

/// Tunables that rarely change
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Polls of the load-complete flag before giving up
    pub load_wait_retries: u32,
    /// Pause between polls
    pub load_wait_interval: Duration,
    /// Bound on a whole directory fetch
    pub directory_fetch_timeout: Duration,
    /// Removal worker threads
    pub removal_threads: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            load_wait_retries: 600,
            load_wait_interval: Duration::from_millis(100),
            directory_fetch_timeout: Duration::from_secs(3600),
            removal_threads: REMOVAL_THREADS,
        }
    }
}

/// Outcome of a cache lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLookup {
    /// The file is cached at this local path
    Cached(PathBuf),
    /// The file could not be served from the cache
    Miss(MissReason),
}

/// Why a lookup could not be served locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissReason {
    /// The file alone is heavier than the whole cache
    TooLarge { kilobytes: u64, capacity: u64 },
    /// The entry was evicted before it could be returned
    Evicted,
}

/// Where a caller should read a resource from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveLocation {
    Local(PathBuf),
    Remote(Url),
}

struct Inner {
    root: PathBuf,
    temp_dir: PathBuf,
    source: Arc<dyn RemoteFileSource>,
    index: Mutex<WeightedLru<String, CachedFile>>,
    builders: BuilderRegistry<Result<FileLookup, CacheError>>,
    removals: RemovalDispatcher,
    loaded: AtomicBool,
    load_report: Mutex<Option<LoadReport>>,
    async_loads: Arc<Semaphore>,
    /// Keys with a background fetch already running
    async_pending: Mutex<HashSet<String>>,
    /// Millisecond timestamp of the last batch handed out
    last_batch: Mutex<i64>,
    settings: CacheSettings,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Disk-backed LRU cache of remote files
#[derive(Clone)]
pub struct LocalFileCache {
    inner: Arc<Inner>,
}

impl LocalFileCache {
    /// Create a cache with default settings
    ///
    /// # Arguments
    /// * `cache_parent` - Directory that will hold the hidden cache root
    /// * `kilobyte_capacity` - Capacity bound (values below 1 become 1)
    /// * `source` - Remote store to fetch from
    pub fn new(
        cache_parent: &Path,
        kilobyte_capacity: u64,
        source: Arc<dyn RemoteFileSource>,
    ) -> Result<Self, CacheError> {
        Self::with_settings(cache_parent, kilobyte_capacity, source, CacheSettings::default())
    }

    /// Create a cache and start loading the existing inventory in the background
    pub fn with_settings(
        cache_parent: &Path,
        kilobyte_capacity: u64,
        source: Arc<dyn RemoteFileSource>,
        settings: CacheSettings,
    ) -> Result<Self, CacheError> {
        let root = create_writable_directory(cache_parent, CACHE_DIRECTORY_NAME)?;
        let temp_dir = create_writable_directory(&root, TEMP_DIRECTORY_NAME)?;
        let capacity = kilobyte_capacity.max(1);
        let removals = RemovalDispatcher::new(root.clone(), settings.removal_threads)?;

        let cache = Self {
            inner: Arc::new(Inner {
                root,
                temp_dir,
                source,
                index: Mutex::new(WeightedLru::new(capacity)),
                builders: BuilderRegistry::new(),
                removals,
                loaded: AtomicBool::new(false),
                load_report: Mutex::new(None),
                async_loads: Arc::new(Semaphore::new(ASYNC_LOAD_PERMITS)),
                async_pending: Mutex::new(HashSet::new()),
                last_batch: Mutex::new(0),
                settings,
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        };

        let loader = cache.clone();
        std::thread::Builder::new()
            .name("local-file-cache-load-thread".to_string())
            .spawn(move || loader.load_from_filesystem())
            .map_err(|e| CacheError::storage("failed to start cache load thread", e))?;

        info!(
            root = %cache.inner.root.display(),
            capacity_kb = capacity,
            "Local file cache initialized"
        );

        Ok(cache)
    }

    /// Cache root directory
    pub fn root_directory(&self) -> &Path {
        &self.inner.root
    }

    /// Staging directory for in-progress transfers
    pub fn temp_directory(&self) -> &Path {
        &self.inner.temp_dir
    }

    /// Whether the startup scan has finished
    pub fn is_loaded(&self) -> bool {
        self.inner.loaded.load(Ordering::Acquire)
    }

    /// Result of the startup scan, once it has finished
    pub fn last_load_report(&self) -> Option<LoadReport> {
        self.inner.load_report.lock().clone()
    }

    /// Number of cached entries (files and directories)
    pub fn number_of_files(&self) -> usize {
        self.inner.index.lock().len()
    }

    /// Sum of all entry weights
    pub fn number_of_kilobytes_used(&self) -> u64 {
        self.inner.index.lock().total_weight()
    }

    pub fn capacity_kilobytes(&self) -> u64 {
        self.inner.index.lock().capacity()
    }

    /// Change the capacity; entries are evicted right away until usage fits
    pub fn set_capacity_kilobytes(&self, kilobytes: u64) {
        let capacity = kilobytes.max(1);
        let evicted = self.inner.index.lock().set_capacity(capacity);
        info!(capacity_kb = capacity, evicted = evicted.len(), "Cache capacity changed");
        for (_, file) in evicted {
            self.inner.removals.dispatch(file);
        }
    }

    /// Block until queued evictions have been deleted from disk
    ///
    /// # Returns
    /// false if removals were still running after `timeout`
    pub fn wait_for_removals(&self, timeout: Duration) -> bool {
        self.inner.removals.wait_until_idle(timeout)
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.inner.hits.load(Ordering::Relaxed);
        let misses = self.inner.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            files = self.number_of_files(),
            used_kb = self.number_of_kilobytes_used(),
            capacity_kb = self.capacity_kilobytes(),
            in_flight = self.inner.builders.in_flight(),
            "Cache metrics"
        );
    }

    /// Wait (bounded) for the startup scan
    pub async fn wait_until_loaded(&self) -> Result<(), CacheError> {
        for _ in 0..self.inner.settings.load_wait_retries {
            if self.is_loaded() {
                return Ok(());
            }
            tokio::time::sleep(self.inner.settings.load_wait_interval).await;
        }
        if self.is_loaded() {
            return Ok(());
        }
        Err(CacheError::Unavailable(format!(
            "cache at {} has not finished loading",
            self.inner.root.display()
        )))
    }

    /// Local path for a remote file, fetching it on a miss
    pub async fn get_file(&self, url: &Url) -> Result<PathBuf, CacheError> {
        let lookup = self.lookup(url).await?;
        self.expect_cached(url, lookup)
    }

    /// Like [`get_file`](Self::get_file) but drops any cached copy first
    pub async fn get_file_refreshed(&self, url: &Url) -> Result<PathBuf, CacheError> {
        let lookup = self.lookup_with(url, true).await?;
        self.expect_cached(url, lookup)
    }

    /// Look up a remote file, fetching it on a miss
    pub async fn lookup(&self, url: &Url) -> Result<FileLookup, CacheError> {
        self.lookup_with(url, false).await
    }

    /// Look up a remote file
    ///
    /// # Arguments
    /// * `url` - Remote file URL (not a directory)
    /// * `refresh` - Drop any cached copy and fetch again
    ///
    /// # Returns
    /// `Cached(path)` or a `Miss` for files the cache will not hold;
    /// transport and storage failures are errors
    pub async fn lookup_with(&self, url: &Url, refresh: bool) -> Result<FileLookup, CacheError> {
        if is_directory_url(url) {
            return Err(CacheError::InvalidArgument(format!(
                "{} is a directory URL, use get_directory",
                url
            )));
        }
        let key = logical_key(url)?;
        self.wait_until_loaded().await?;

        if refresh {
            self.invalidate_key(&key);
        } else if let Some(path) = self.cached_path(&key, url)? {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "File cache HIT");
            return Ok(FileLookup::Cached(path));
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "File cache MISS, fetching");

        let batch = self.new_batch_directory();
        self.build(&key, url, &batch, None).await
    }

    /// Fetch every file of a remote directory (recursively)
    ///
    /// # Returns
    /// The local directory holding the files
    pub async fn get_directory(&self, url: &Url) -> Result<PathBuf, CacheError> {
        self.get_directory_with(url, true, false).await
    }

    /// Fetch the files of a remote directory
    ///
    /// Files larger than the whole cache are skipped with a warning. Small
    /// directories are fetched one file at a time, larger ones with a few
    /// concurrent transfers; the whole fetch is bounded by the directory
    /// fetch timeout.
    ///
    /// # Arguments
    /// * `url` - Remote directory URL, must end with `/`
    /// * `recursive` - Include files in subdirectories
    /// * `refresh` - Drop cached copies and fetch again
    pub async fn get_directory_with(
        &self,
        url: &Url,
        recursive: bool,
        refresh: bool,
    ) -> Result<PathBuf, CacheError> {
        if !is_directory_url(url) {
            return Err(CacheError::InvalidArgument(format!(
                "directory URL {} must end with '/'",
                url
            )));
        }
        let key = logical_key(url)?;
        self.wait_until_loaded().await?;

        if refresh {
            self.invalidate_key(&key);
        } else if let Some(path) = self.cached_path(&key, url)? {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Directory cache HIT");
            return Ok(path);
        }
        self.inner.misses.fetch_add(1, Ordering::Relaxed);

        let listed = self.inner.source.list_files(url, recursive).await?;
        let capacity = self.capacity_kilobytes();
        let wanted: Vec<RemoteFile> = listed
            .into_iter()
            .filter(|remote| match remote.kilobytes() {
                Some(kilobytes) if kilobytes > capacity => {
                    warn!(
                        url = %remote.url,
                        kilobytes = kilobytes,
                        capacity_kb = capacity,
                        "Skipping file larger than the cache"
                    );
                    false
                }
                _ => true,
            })
            .collect();

        let batch = self.new_batch_directory();
        let directory_path = batch.join(relative_local_path(&key));
        info!(url = %url, files = wanted.len(), recursive = recursive, "Fetching directory");

        let count = wanted.len();
        let fetch_all = async {
            if count <= DIRECTORY_FETCH_THRESHOLD {
                let mut results = Vec::with_capacity(count);
                for remote in wanted {
                    results.push(self.fetch_member(remote, &batch, refresh).await);
                }
                results
            } else {
                futures::stream::iter(wanted.into_iter().map(|remote| self.fetch_member(remote, &batch, refresh)))
                    .buffer_unordered(DIRECTORY_FETCH_WORKERS)
                    .collect::<Vec<_>>()
                    .await
            }
        };

        let results = tokio::time::timeout(self.inner.settings.directory_fetch_timeout, fetch_all)
            .await
            .map_err(|_| CacheError::Interrupted(format!("timed out fetching directory {}", url)))?;

        fs::create_dir_all(&directory_path).map_err(|e| {
            CacheError::storage(format!("failed to create directory {}", directory_path.display()), e)
        })?;

        let mut linked_files = Vec::new();
        for result in results {
            let Some((member_key, member_path)) = result? else {
                continue;
            };
            let Some(relative) = member_key.strip_prefix(key.as_str()) else {
                continue;
            };
            let expected = directory_path.join(relative_local_path(relative));
            if expected == member_path || expected.exists() {
                continue;
            }
            link_member(&member_path, &expected)?;
            linked_files.push(expected);
        }

        let entry = CachedFile::directory(
            RemoteFile::directory(url.clone()),
            directory_path.clone(),
            linked_files,
        );
        match self.register(&key, entry) {
            FileLookup::Cached(path) => Ok(path),
            lookup => self.expect_cached(url, lookup),
        }
    }

    /// Local path if the file is cached, otherwise the remote URL
    ///
    /// With `cache_async` a background fetch of a missing file is started
    /// (a small fixed number run at a time).
    pub fn effective_location(&self, url: &Url, cache_async: bool) -> EffectiveLocation {
        let cached = if self.is_loaded() {
            logical_key(url)
                .ok()
                .and_then(|key| self.cached_path(&key, url).ok().flatten())
        } else {
            None
        };

        if let Some(path) = cached {
            return EffectiveLocation::Local(path);
        }

        if cache_async && !is_directory_url(url) {
            self.spawn_async_load(url.clone());
        }
        EffectiveLocation::Remote(url.clone())
    }

    /// Remove every entry and its files now
    ///
    /// Failures are collected, logged and returned as a single error.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.wait_until_loaded().await?;

        let drained = self.inner.index.lock().drain();
        info!(files = drained.len(), "Clearing local file cache");

        let failures: Vec<String> = drained
            .iter()
            .flat_map(|(_, file)| file.try_remove(&self.inner.root))
            .collect();

        if failures.is_empty() {
            return Ok(());
        }
        for failure in &failures {
            error!(error = %failure, "Failed to remove cached file during clear");
        }
        Err(CacheError::Storage(format!(
            "{} files could not be removed while clearing the cache: {}",
            failures.len(),
            failures.join("; ")
        )))
    }

    /// Path of a valid index entry
    ///
    /// An entry whose data vanished from disk is dropped from the index; an
    /// entry fetched from a different URL under the same key is a collision.
    /// The disk is checked after the index lock is released.
    fn cached_path(&self, key: &str, url: &Url) -> Result<Option<PathBuf>, CacheError> {
        let (path, is_directory) = {
            let mut index = self.inner.index.lock();
            match index.get(key) {
                None => return Ok(None),
                Some(file) if file.url() != url => {
                    return Err(CacheError::KeyCollision {
                        key: key.to_string(),
                        existing: file.url().to_string(),
                        requested: url.to_string(),
                    });
                }
                Some(file) => (file.local_path().to_path_buf(), file.is_directory()),
            }
        };

        let present = if is_directory { path.is_dir() } else { path.is_file() };
        if present {
            return Ok(Some(path));
        }

        // only drop the entry we inspected, a concurrent build may have replaced it
        let stale = {
            let mut index = self.inner.index.lock();
            let unchanged = index.peek(key).is_some_and(|file| file.local_path() == path);
            if unchanged {
                index.remove(key)
            } else {
                None
            }
        };

        if let Some(file) = stale {
            warn!(key = %key, local = %file.local_path().display(), "Cached file missing on disk, invalidating");
            self.inner.removals.dispatch(file);
        }
        Ok(None)
    }

    /// Drop an entry from the index and delete it in the background
    fn invalidate_key(&self, key: &str) {
        let removed = self.inner.index.lock().remove(key);
        if let Some(file) = removed {
            debug!(key = %key, "Invalidated cached file");
            self.inner.removals.dispatch(file);
        }
    }

    /// Fetch one file through its per-key builder
    async fn build(
        &self,
        key: &str,
        url: &Url,
        batch: &Path,
        described: Option<RemoteFile>,
    ) -> Result<FileLookup, CacheError> {
        let guard = self.inner.builders.acquire(key);
        guard
            .run(|| async move {
                // a builder that finished just before ours registered may have filled the index
                if let Some(path) = self.cached_path(key, url)? {
                    return Ok(FileLookup::Cached(path));
                }

                let remote = match described {
                    Some(remote) => remote,
                    None => self.inner.source.describe(url).await?,
                };
                if remote.is_directory {
                    return Err(CacheError::InvalidOperation(format!(
                        "{} is a directory, use get_directory",
                        url
                    )));
                }

                let capacity = self.capacity_kilobytes();
                if let Some(kilobytes) = remote.kilobytes() {
                    if kilobytes > capacity {
                        warn!(key = %key, kilobytes = kilobytes, capacity_kb = capacity, "File larger than the cache");
                        return Ok(FileLookup::Miss(MissReason::TooLarge { kilobytes, capacity }));
                    }
                }

                let file = CachedFile::new(remote, batch.join(relative_local_path(key)));
                file.retrieve(self.inner.source.as_ref(), &self.inner.temp_dir)
                    .await?;
                Ok(self.register(key, file))
            })
            .await
    }

    /// Fetch one member of a directory
    ///
    /// # Returns
    /// The member's key and local path, or None if it cannot be cached
    async fn fetch_member(
        &self,
        remote: RemoteFile,
        batch: &Path,
        refresh: bool,
    ) -> Result<Option<(String, PathBuf)>, CacheError> {
        let url = remote.url.clone();
        let key = logical_key(&url)?;

        if refresh {
            self.invalidate_key(&key);
        } else if let Some(path) = self.cached_path(&key, &url)? {
            return Ok(Some((key, path)));
        }

        match self.build(&key, &url, batch, Some(remote)).await? {
            FileLookup::Cached(path) => Ok(Some((key, path))),
            FileLookup::Miss(reason) => {
                warn!(url = %url, reason = ?reason, "Directory member not cached");
                Ok(None)
            }
        }
    }

    /// Add an entry to the index and dispatch whatever it displaced
    fn register(&self, key: &str, file: CachedFile) -> FileLookup {
        let weight = file.weight();
        let path = file.local_path().to_path_buf();

        let (insertion, capacity) = {
            let mut index = self.inner.index.lock();
            let insertion = index.insert(key.to_string(), file, weight);
            (insertion, index.capacity())
        };

        if let Some(replaced) = insertion.replaced {
            if replaced.local_path() != path {
                self.inner.removals.dispatch(replaced);
            }
        }

        let mut rejected = false;
        for (evicted_key, evicted) in insertion.evicted {
            if evicted_key == key {
                rejected = true;
            } else {
                debug!(key = %evicted_key, "Evicting cached file");
            }
            self.inner.removals.dispatch(evicted);
        }

        if rejected {
            warn!(key = %key, kilobytes = weight, capacity_kb = capacity, "Fetched file exceeds the cache capacity");
            return FileLookup::Miss(MissReason::TooLarge {
                kilobytes: weight,
                capacity,
            });
        }

        debug!(key = %key, local = %path.display(), kilobytes = weight, "Stored file in cache");
        if path.exists() {
            FileLookup::Cached(path)
        } else {
            FileLookup::Miss(MissReason::Evicted)
        }
    }

    fn expect_cached(&self, url: &Url, lookup: FileLookup) -> Result<PathBuf, CacheError> {
        match lookup {
            FileLookup::Cached(path) => Ok(path),
            FileLookup::Miss(MissReason::TooLarge { kilobytes, capacity }) => Err(CacheError::CapacityExceeded {
                key: url.to_string(),
                kilobytes,
                capacity,
            }),
            FileLookup::Miss(MissReason::Evicted) => Err(CacheError::CacheMiss(format!(
                "local cache file missing for {}",
                url
            ))),
        }
    }

    /// Fresh batch directory path (not created yet)
    ///
    /// Names have millisecond resolution; a name is never handed out twice.
    fn new_batch_directory(&self) -> PathBuf {
        let now = chrono::Local::now();
        let millis = {
            let mut last = self.inner.last_batch.lock();
            let millis = now.timestamp_millis().max(*last + 1);
            *last = millis;
            millis
        };
        let stamp = chrono::DateTime::from_timestamp_millis(millis)
            .map(|utc| utc.with_timezone(&chrono::Local))
            .unwrap_or(now);
        self.inner.root.join(stamp.format(BATCH_NAME_FORMAT).to_string())
    }

    /// Start a background fetch unless one is already running for the key
    /// or every permit is taken
    fn spawn_async_load(&self, url: Url) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(url = %url, "No runtime available for background caching");
            return;
        };
        let Ok(key) = logical_key(&url) else {
            return;
        };

        let permit = {
            let mut pending = self.inner.async_pending.lock();
            if pending.contains(&key) {
                debug!(url = %url, "Background caching already running");
                return;
            }
            let Ok(permit) = self.inner.async_loads.clone().try_acquire_owned() else {
                debug!(url = %url, "Background caching busy, skipping");
                return;
            };
            pending.insert(key.clone());
            permit
        };

        let cache = self.clone();
        handle.spawn(async move {
            match cache.get_file(&url).await {
                Ok(path) => debug!(url = %url, local = %path.display(), "Cached file in background"),
                Err(e) => debug!(url = %url, error = %e, "Background caching failed"),
            }
            drop(permit);
            cache.inner.async_pending.lock().remove(&key);
        });
    }

    /// Register everything a previous session left on disk
    fn load_from_filesystem(&self) {
        info!(root = %self.inner.root.display(), "Loading cache from filesystem");

        let loader = LocalFileLoader::new(&self.inner.root, &self.inner.temp_dir);
        let (files, report) = loader.locate_cached_files();

        for file in files {
            match logical_key(file.url()) {
                Ok(key) => {
                    self.register(&key, file);
                }
                Err(e) => {
                    warn!(url = %file.url(), error = %e, "Removing cached file with unusable URL");
                    self.inner.removals.dispatch(file);
                }
            }
        }

        let used = self.number_of_kilobytes_used();
        let capacity = self.capacity_kilobytes();
        let used_percentage = (used as f64 / capacity as f64) * 100.0;

        *self.inner.load_report.lock() = Some(report);
        self.inner.loaded.store(true, Ordering::Release);

        info!(
            files = self.number_of_files(),
            used_kb = used,
            capacity_kb = capacity,
            full = format!("{:.0}%", used_percentage),
            "Loaded cache from filesystem"
        );
    }
}

impl fmt::Display for LocalFileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalFileCache{{root={}, capacity_kb={}}}",
            self.inner.root.display(),
            self.capacity_kilobytes()
        )
    }
}

/// Ensure `parent/name` exists and is writable
fn create_writable_directory(parent: &Path, name: &str) -> Result<PathBuf, CacheError> {
    let parent = parent
        .canonicalize()
        .map_err(|e| CacheError::storage(format!("failed to resolve {}", parent.display()), e))?;
    let directory = parent.join(name);

    fs::create_dir_all(&directory)
        .map_err(|e| CacheError::storage(format!("failed to create {}", directory.display()), e))?;

    let metadata = fs::metadata(&directory)
        .map_err(|e| CacheError::storage(format!("failed to inspect {}", directory.display()), e))?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(CacheError::Storage(format!("cannot write to {}", directory.display())));
    }
    Ok(directory)
}

/// Make a member cached in another batch visible inside a directory entry
fn link_member(source: &Path, target: &Path) -> Result<(), CacheError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CacheError::storage(format!("failed to create directory {}", parent.display()), e))?;
    }
    if fs::hard_link(source, target).is_ok() {
        return Ok(());
    }
    fs::copy(source, target)
        .map(|_| ())
        .map_err(|e| CacheError::storage(format!("failed to link {} into {}", source.display(), target.display()), e))
}
