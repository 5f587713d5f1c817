//! Cached File
//!
//! One remote resource materialized on local disk: the remote descriptor,
//! the data path and (for plain files) the sidecar path. Owns retrieval
//! (remote → staging file → rename) and removal.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};
use url::Url;

use super::errors::CacheError;
use super::metadata::{meta_path_for, SidecarRecord};
use crate::webdav::{RemoteFile, RemoteFileSource};

/// Write buffer used while streaming a download (image tiles are large)
pub const BUFFER_SIZE: usize = 2 * 1024 * 1024;

/// Capacity cost of a directory entry
pub const DIRECTORY_WEIGHT: u64 = 1;

const ONE_KILOBYTE: u64 = 1024;

/// A resource stored in the local cache
#[derive(Debug, Clone)]
pub struct CachedFile {
    remote: RemoteFile,
    local_path: PathBuf,
    meta_path: Option<PathBuf>,
    /// Links created inside a directory entry for members cached elsewhere
    linked_files: Vec<PathBuf>,
}

impl CachedFile {
    /// Entry for a plain file; the sidecar lives next to the data file
    pub fn new(remote: RemoteFile, local_path: PathBuf) -> Self {
        let meta_path = meta_path_for(&local_path);
        Self {
            remote,
            local_path,
            meta_path,
            linked_files: Vec::new(),
        }
    }

    /// Synthetic entry for a fetched directory
    ///
    /// # Arguments
    /// * `remote` - Directory descriptor
    /// * `local_path` - Directory inside the batch
    /// * `linked_files` - Links this entry created and must delete on removal
    pub fn directory(remote: RemoteFile, local_path: PathBuf, linked_files: Vec<PathBuf>) -> Self {
        Self {
            remote,
            local_path,
            meta_path: None,
            linked_files,
        }
    }

    pub fn remote(&self) -> &RemoteFile {
        &self.remote
    }

    pub fn url(&self) -> &Url {
        &self.remote.url
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn meta_path(&self) -> Option<&Path> {
        self.meta_path.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.remote.is_directory
    }

    /// Whether the data (file or directory) is still on disk
    pub fn exists(&self) -> bool {
        if self.is_directory() {
            self.local_path.is_dir()
        } else {
            self.local_path.is_file()
        }
    }

    /// Size of the local data rounded up to the nearest kilobyte
    ///
    /// Read from disk at call time; a missing file counts as 0.
    pub fn kilobytes(&self) -> u64 {
        if self.is_directory() {
            return DIRECTORY_WEIGHT;
        }
        fs::metadata(&self.local_path)
            .map(|m| m.len().div_ceil(ONE_KILOBYTE))
            .unwrap_or(0)
    }

    /// Capacity cost used by the index (never 0)
    pub fn weight(&self) -> u64 {
        self.kilobytes().max(1)
    }

    /// Download the remote resource into place
    ///
    /// Bytes are streamed into a temporary file in `staging_dir`, which is
    /// renamed onto the local path once complete and then described by a
    /// freshly written sidecar. Any failure leaves nothing at the local path.
    ///
    /// # Arguments
    /// * `source` - Remote store to read from
    /// * `staging_dir` - Directory for in-progress transfers (same filesystem as the cache)
    pub async fn retrieve(&self, source: &dyn RemoteFileSource, staging_dir: &Path) -> Result<(), CacheError> {
        if self.is_directory() {
            return Err(CacheError::InvalidOperation(format!(
                "cannot retrieve directory {}",
                self.remote.url
            )));
        }

        let mut stream = source.open(&self.remote.url).await?;

        let staging = tempfile::Builder::new()
            .prefix(".transfer-")
            .tempfile_in(staging_dir)
            .map_err(|e| CacheError::storage(format!("failed to create staging file in {}", staging_dir.display()), e))?;

        let handle = staging
            .as_file()
            .try_clone()
            .map_err(|e| CacheError::storage("failed to open staging file", e))?;
        let mut writer = BufWriter::with_capacity(BUFFER_SIZE, tokio::fs::File::from_std(handle));

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| CacheError::storage(format!("failed to write {}", staging.path().display()), e))?;
            written += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| CacheError::storage(format!("failed to flush {}", staging.path().display()), e))?;
        drop(writer);

        create_parent_directories(&self.local_path)?;

        // a failed persist drops (deletes) the staging file
        staging.persist(&self.local_path).map_err(|e| {
            CacheError::storage(format!("failed to move download to {}", self.local_path.display()), e.error)
        })?;

        if let Some(meta_path) = &self.meta_path {
            let record = SidecarRecord::for_file(&self.remote, &self.local_path);
            if let Err(e) = record.write(meta_path) {
                let _ = fs::remove_file(&self.local_path);
                return Err(e);
            }
        }

        debug!(
            url = %self.remote.url,
            local = %self.local_path.display(),
            bytes = written,
            "Retrieved file"
        );
        Ok(())
    }

    /// Delete the entry from disk, logging failures
    ///
    /// Used on the eviction path where nobody is waiting for the outcome.
    pub fn remove(&self, root: &Path) {
        for failure in self.try_remove(root) {
            warn!(url = %self.remote.url, error = %failure, "Failed to remove cached file");
        }
    }

    /// Delete the entry from disk
    ///
    /// Removes the data file and sidecar (or a directory entry's links), then
    /// prunes empty parent directories up to, but never including, `root`.
    ///
    /// # Returns
    /// One message per deletion that failed
    pub fn try_remove(&self, root: &Path) -> Vec<String> {
        let mut failures = Vec::new();

        let prune_from = if self.is_directory() {
            for link in &self.linked_files {
                delete_file(link, &mut failures);
                if let Some(parent) = link.parent() {
                    prune_empty_parents(parent, root);
                }
            }
            Some(self.local_path.as_path())
        } else {
            delete_file(&self.local_path, &mut failures);
            if let Some(meta_path) = &self.meta_path {
                delete_file(meta_path, &mut failures);
            }
            self.local_path.parent()
        };

        if let Some(dir) = prune_from {
            prune_empty_parents(dir, root);
        }

        debug!(
            url = %self.remote.url,
            local = %self.local_path.display(),
            failures = failures.len(),
            "Removed cached file"
        );
        failures
    }
}

/// Create the parent directories of `path`
///
/// Another writer creating the same directory concurrently is not an error.
fn create_parent_directories(path: &Path) -> Result<(), CacheError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    match fs::create_dir_all(parent) {
        Ok(()) => Ok(()),
        Err(_) if parent.is_dir() => Ok(()),
        Err(e) => Err(CacheError::storage(
            format!("failed to create directory {}", parent.display()),
            e,
        )),
    }
}

fn delete_file(path: &Path, failures: &mut Vec<String>) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => failures.push(format!("{}: {}", path.display(), e)),
    }
}

/// Remove `dir` and its ancestors while they are empty
///
/// Paths are compared canonicalized, so the walk can never climb out of (or
/// delete) the cache root.
pub(crate) fn prune_empty_parents(dir: &Path, root: &Path) {
    let Ok(root) = root.canonicalize() else {
        return;
    };

    let mut current = dir.to_path_buf();
    loop {
        let Ok(canonical) = current.canonicalize() else {
            break;
        };
        if canonical == root || !canonical.starts_with(&root) {
            break;
        }
        if fs::remove_dir(&canonical).is_err() {
            // not empty (or already gone)
            break;
        }
        match canonical.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metadata::is_meta_file;
    use crate::cache::test_support::MemoryStore;

    fn url(path: &str) -> Url {
        Url::parse(&format!("http://webdav{}", path)).unwrap()
    }

    #[test]
    fn test_weight_rounds_up_with_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");

        fs::write(&path, vec![0u8; 1025]).unwrap();
        let entry = CachedFile::new(RemoteFile::file(url("/a.bin"), 1025), path.clone());
        assert_eq!(entry.kilobytes(), 2);
        assert_eq!(entry.weight(), 2);

        fs::write(&path, b"").unwrap();
        assert_eq!(entry.kilobytes(), 0);
        assert_eq!(entry.weight(), 1);

        let directory = CachedFile::directory(RemoteFile::directory(url("/d/")), dir.path().to_path_buf(), vec![]);
        assert_eq!(directory.weight(), DIRECTORY_WEIGHT);
        assert!(directory.meta_path().is_none());
    }

    #[tokio::test]
    async fn test_retrieve_writes_data_and_sidecar() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("temp");
        fs::create_dir_all(&staging).unwrap();

        let store = MemoryStore::new();
        let remote = store.add_file("/WebDAV/a/b.tif", vec![7u8; 3000]);
        let local = root.path().join("batch").join("WebDAV").join("a").join("b.tif");

        let entry = CachedFile::new(remote.clone(), local.clone());
        entry.retrieve(&store, &staging).await.unwrap();

        assert_eq!(fs::read(&local).unwrap(), vec![7u8; 3000]);
        let record = SidecarRecord::read(entry.meta_path().unwrap()).unwrap();
        assert_eq!(record.to_remote_file().unwrap(), remote);
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_directory_is_invalid() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let entry = CachedFile::directory(RemoteFile::directory(url("/d/")), root.path().join("d"), vec![]);

        let err = entry.retrieve(&store, root.path()).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_nothing_behind() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("temp");
        fs::create_dir_all(&staging).unwrap();

        let store = MemoryStore::new();
        let local = root.path().join("batch").join("missing.tif");
        let entry = CachedFile::new(RemoteFile::file(url("/missing.tif"), 10), local.clone());

        let err = entry.retrieve(&store, &staging).await.unwrap_err();
        assert!(matches!(err, CacheError::RemoteUnavailable(_)));
        assert!(!local.exists());
        assert_eq!(fs::read_dir(&staging).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_parents_but_not_root() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("temp");
        fs::create_dir_all(&staging).unwrap();

        let store = MemoryStore::new();
        let remote = store.add_file("/WebDAV/a/b.tif", vec![1u8; 10]);
        let batch = root.path().join("20240101-120000123");
        let local = batch.join("WebDAV").join("a").join("b.tif");
        let entry = CachedFile::new(remote, local.clone());
        entry.retrieve(&store, &staging).await.unwrap();

        let failures = entry.try_remove(root.path());
        assert!(failures.is_empty());
        assert!(!local.exists());
        assert!(!entry.meta_path().unwrap().exists());
        assert!(!batch.exists());
        assert!(root.path().exists());
        assert!(staging.exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_non_empty_parent() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("temp");
        fs::create_dir_all(&staging).unwrap();

        let store = MemoryStore::new();
        let a = store.add_file("/d/a.bin", vec![1u8; 10]);
        let b = store.add_file("/d/b.bin", vec![2u8; 10]);
        let dir = root.path().join("batch").join("d");
        let first = CachedFile::new(a, dir.join("a.bin"));
        let second = CachedFile::new(b, dir.join("b.bin"));
        first.retrieve(&store, &staging).await.unwrap();
        second.retrieve(&store, &staging).await.unwrap();

        first.remove(root.path());
        assert!(dir.join("b.bin").exists());
        let remaining: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .flatten()
            .filter(|e| is_meta_file(&e.path()))
            .collect();
        assert_eq!(remaining.len(), 1);
    }
}
