//! File cache session
//!
//! Explicit handle owning the remote store, the configuration and the
//! (optional) local file cache. Callers pass it around instead of reaching
//! for process-wide state.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheError, EffectiveLocation, FileLookup, LocalFileCache};
use crate::config::{clamp_capacity_gigabytes, gigabytes_to_kilobytes, kilobytes_to_gigabytes, CacheConfig};
use crate::webdav::{RemoteFileSource, WebDavClient, WebDavError};

/// Remote store, configuration and local cache for one process
pub struct FileCacheSession {
    config: Mutex<CacheConfig>,
    source: Arc<dyn RemoteFileSource>,
    /// Concrete client when the source is a WebDAV server
    client: Option<Arc<WebDavClient>>,
    cache: Mutex<Option<LocalFileCache>>,
}

impl FileCacheSession {
    /// Connect to the configured WebDAV server and open the cache
    ///
    /// A cache that cannot be opened is logged and left disabled.
    pub fn new(config: CacheConfig) -> Result<Self, WebDavError> {
        let client = Arc::new(WebDavClient::new(
            &config.webdav_base_url,
            config.client_options(),
        )?);
        let source: Arc<dyn RemoteFileSource> = client.clone();
        Ok(Self::build(config, source, Some(client)))
    }

    /// Session over an arbitrary remote store
    pub fn with_source(config: CacheConfig, source: Arc<dyn RemoteFileSource>) -> Self {
        Self::build(config, source, None)
    }

    fn build(
        config: CacheConfig,
        source: Arc<dyn RemoteFileSource>,
        client: Option<Arc<WebDavClient>>,
    ) -> Self {
        let cache = if config.cache_disabled {
            info!("Local file cache disabled by configuration");
            None
        } else {
            open_cache(&config, &source)
        };

        Self {
            config: Mutex::new(config),
            source,
            client,
            cache: Mutex::new(cache),
        }
    }

    /// WebDAV client, if the session talks to a WebDAV server
    pub fn client(&self) -> Option<&Arc<WebDavClient>> {
        self.client.as_ref()
    }

    pub fn source(&self) -> &Arc<dyn RemoteFileSource> {
        &self.source
    }

    /// Current configuration snapshot
    pub fn config(&self) -> CacheConfig {
        self.config.lock().clone()
    }

    /// The cache, unless disabled
    pub fn cache(&self) -> Option<LocalFileCache> {
        self.cache.lock().clone()
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.cache.lock().is_some()
    }

    /// Remote URL for a standard path
    pub fn resolve_url(&self, standard_path: &str) -> Result<Url, WebDavError> {
        self.source.resolve_url(standard_path)
    }

    /// Local copy of a remote file, fetching it if needed
    ///
    /// # Returns
    /// None when the cache is disabled, the file cannot be cached or the
    /// fetch failed (failures are logged)
    pub async fn cached_file(&self, standard_path: &str, refresh: bool) -> Option<PathBuf> {
        let cache = self.cache()?;
        let url = match self.resolve_url(standard_path) {
            Ok(url) => url,
            Err(e) => {
                warn!(path = %standard_path, error = %e, "Cannot resolve path");
                return None;
            }
        };

        match cache.lookup_with(&url, refresh).await {
            Ok(FileLookup::Cached(path)) => Some(path),
            Ok(FileLookup::Miss(reason)) => {
                debug!(url = %url, reason = ?reason, "File not cached");
                None
            }
            Err(e) => {
                error!(url = %url, error = %e, "Failed to retrieve cached file");
                None
            }
        }
    }

    /// Local copy of a remote directory tree
    pub async fn cached_directory(
        &self,
        standard_path: &str,
        recursive: bool,
        refresh: bool,
    ) -> Result<PathBuf, CacheError> {
        let cache = self
            .cache()
            .ok_or_else(|| CacheError::Unavailable("local file cache is disabled".to_string()))?;
        let url = self.resolve_url(standard_path)?;
        cache.get_directory_with(&url, recursive, refresh).await
    }

    /// Local path if cached, otherwise the remote URL
    ///
    /// # Arguments
    /// * `standard_path` - Path below the WebDAV base URL
    /// * `cache_async` - Start a background fetch when the file is not cached
    pub fn effective_location(
        &self,
        standard_path: &str,
        cache_async: bool,
    ) -> Result<EffectiveLocation, WebDavError> {
        let url = self.resolve_url(standard_path)?;
        Ok(match self.cache() {
            Some(cache) => cache.effective_location(&url, cache_async),
            None => EffectiveLocation::Remote(url),
        })
    }

    /// Whether the remote resource exists
    pub async fn is_available(&self, standard_path: &str) -> Result<bool, WebDavError> {
        let url = self.resolve_url(standard_path)?;
        self.source.is_available(&url).await
    }

    /// Configured capacity after clamping
    pub fn capacity_gigabytes(&self) -> u64 {
        self.config.lock().effective_capacity_gigabytes()
    }

    /// Change the capacity (clamped to [50, 1000]); evicts immediately
    pub fn set_capacity_gigabytes(&self, gigabytes: u64) {
        let gigabytes = clamp_capacity_gigabytes(gigabytes);
        self.config.lock().capacity_gigabytes = gigabytes;
        if let Some(cache) = self.cache() {
            cache.set_capacity_kilobytes(gigabytes_to_kilobytes(gigabytes));
        }
        info!(gigabytes, "Cache capacity updated");
    }

    /// Space used by cached files
    pub fn usage_gigabytes(&self) -> f64 {
        self.cache()
            .map(|cache| kilobytes_to_gigabytes(cache.number_of_kilobytes_used()))
            .unwrap_or(0.0)
    }

    /// Drop or (re)create the cache
    ///
    /// Files already on disk stay there; a re-enabled cache picks them up
    /// during its startup scan.
    pub fn set_cache_disabled(&self, disabled: bool) {
        let mut config = self.config.lock();
        config.cache_disabled = disabled;

        let mut cache = self.cache.lock();
        if disabled {
            if cache.take().is_some() {
                info!("Local file cache disabled");
            }
        } else if cache.is_none() {
            *cache = open_cache(&config, &self.source);
        }
    }

    /// Remove every cached file
    pub async fn clear(&self) -> Result<(), CacheError> {
        match self.cache() {
            Some(cache) => cache.clear().await,
            None => Ok(()),
        }
    }
}

fn open_cache(config: &CacheConfig, source: &Arc<dyn RemoteFileSource>) -> Option<LocalFileCache> {
    let parent = config.cache_parent();
    match LocalFileCache::with_settings(
        &parent,
        config.kilobyte_capacity(),
        source.clone(),
        config.cache_settings(),
    ) {
        Ok(cache) => Some(cache),
        Err(e) => {
            error!(parent = %parent.display(), error = %e, "Failed to create local file cache, caching disabled");
            None
        }
    }
}
