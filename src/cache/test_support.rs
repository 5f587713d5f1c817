//! In-memory remote store for cache tests

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use url::Url;

use crate::webdav::{ByteStream, RemoteFile, RemoteFileSource, WebDavError};

const BASE_URL: &str = "http://webdav";
const CHUNK_SIZE: usize = 1000;

/// Remote store backed by a map of path → content
pub(crate) struct MemoryStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    downloads: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
    /// Describe files without a content length, as some servers do
    hide_lengths: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            downloads: Mutex::new(HashMap::new()),
            delay: None,
            hide_lengths: false,
        }
    }

    /// Store whose downloads each take `delay` before the first byte
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Store that never reports content lengths
    pub fn without_lengths() -> Self {
        Self {
            hide_lengths: true,
            ..Self::new()
        }
    }

    fn descriptor(&self, url: Url, len: usize) -> RemoteFile {
        RemoteFile {
            url,
            is_directory: false,
            content_length: (!self.hide_lengths).then_some(len as u64),
        }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("{}{}", BASE_URL, path)).unwrap()
    }

    /// Add (or replace) a file and return its descriptor
    pub fn add_file(&self, path: &str, content: Vec<u8>) -> RemoteFile {
        let url = self.url(path);
        let len = content.len() as u64;
        self.files.lock().insert(url.path().to_string(), content);
        RemoteFile::file(url, len)
    }

    /// Total number of downloads started
    pub fn downloads(&self) -> usize {
        self.downloads.lock().values().sum()
    }

    /// Number of downloads started for one path
    pub fn downloads_of(&self, path: &str) -> usize {
        let url = self.url(path);
        self.downloads.lock().get(url.path()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RemoteFileSource for MemoryStore {
    fn resolve_url(&self, standard_path: &str) -> Result<Url, WebDavError> {
        let href = format!("{}{}", BASE_URL, standard_path);
        Url::parse(&href).map_err(|e| WebDavError::MalformedUrl(href, e.to_string()))
    }

    async fn describe(&self, url: &Url) -> Result<RemoteFile, WebDavError> {
        let files = self.files.lock();
        let path = url.path();
        if let Some(content) = files.get(path) {
            return Ok(self.descriptor(url.clone(), content.len()));
        }
        if path.ends_with('/') && files.keys().any(|k| k.starts_with(path)) {
            return Ok(RemoteFile::directory(url.clone()));
        }
        Err(WebDavError::NotFound(url.to_string()))
    }

    async fn is_available(&self, url: &Url) -> Result<bool, WebDavError> {
        Ok(self.describe(url).await.is_ok())
    }

    async fn list_files(&self, url: &Url, recursive: bool) -> Result<Vec<RemoteFile>, WebDavError> {
        let files = self.files.lock();
        let prefix = url.path();
        let mut found = Vec::new();
        let mut is_directory = false;
        for (path, content) in files.iter() {
            let Some(rest) = path.strip_prefix(prefix) else {
                continue;
            };
            is_directory = true;
            if !recursive && rest.contains('/') {
                continue;
            }
            found.push(self.descriptor(self.url(path), content.len()));
        }
        if !is_directory {
            return Err(WebDavError::NotFound(url.to_string()));
        }
        Ok(found)
    }

    async fn open(&self, url: &Url) -> Result<ByteStream, WebDavError> {
        let content = self
            .files
            .lock()
            .get(url.path())
            .cloned()
            .ok_or_else(|| WebDavError::NotFound(url.to_string()))?;

        *self.downloads.lock().entry(url.path().to_string()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let chunks: Vec<Result<Bytes, WebDavError>> = content
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
