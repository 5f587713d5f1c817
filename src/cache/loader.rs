//! Local File Loader
//!
//! Rebuilds the cache index from disk at startup. Walks every batch
//! directory under the cache root, keeps entries whose sidecar is valid and
//! whose data file exists, and deletes everything else: orphaned data files,
//! unreadable or dangling sidecars, stray files and empty directories.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::cached_file::CachedFile;
use super::metadata::{data_path_for_meta, is_meta_file, SidecarRecord};

/// chrono format of retrieval batch directory names, e.g. `20240101-120000123`
pub const BATCH_NAME_FORMAT: &str = "%Y%m%d-%H%M%S%3f";

/// Outcome of a startup scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Entries found valid and handed to the index
    pub registered: usize,
    /// Files deleted (orphans, bad sidecars, staging leftovers, strays)
    pub removed_files: usize,
    /// Directories deleted because they were empty or unrecognized
    pub removed_directories: usize,
    /// Wall time of the scan
    pub duration: Duration,
}

/// Scans a cache root for previously cached files
pub struct LocalFileLoader {
    root: PathBuf,
    staging_dir: PathBuf,
}

impl LocalFileLoader {
    /// # Arguments
    /// * `root` - Cache root holding the batch directories
    /// * `staging_dir` - In-progress transfer directory, purged by the scan
    pub fn new(root: impl Into<PathBuf>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging_dir: staging_dir.into(),
        }
    }

    /// Walk the cache root
    ///
    /// # Returns
    /// Valid entries ordered oldest batch first, plus what the scan removed
    pub fn locate_cached_files(&self) -> (Vec<CachedFile>, LoadReport) {
        let started = Instant::now();
        let mut report = LoadReport::default();
        let mut cached = Vec::new();

        let mut batches = Vec::new();
        match fs::read_dir(&self.root) {
            Ok(read_dir) => {
                for entry in read_dir.flatten() {
                    let path = entry.path();
                    let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                    if path == self.staging_dir {
                        self.purge_staging(&mut report);
                    } else if is_dir && is_batch_name(&entry.file_name().to_string_lossy()) {
                        batches.push(path);
                    } else if is_dir {
                        warn!(path = %path.display(), "Removing unrecognized cache directory");
                        match fs::remove_dir_all(&path) {
                            Ok(()) => report.removed_directories += 1,
                            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove directory"),
                        }
                    } else {
                        remove_stray(&path, &mut report);
                    }
                }
            }
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Failed to read cache root");
            }
        }

        // batch names sort chronologically
        batches.sort();
        for batch in &batches {
            self.walk(batch, &mut cached, &mut report);
            remove_if_empty(batch, &mut report);
        }

        report.registered = cached.len();
        report.duration = started.elapsed();

        info!(
            root = %self.root.display(),
            batches = batches.len(),
            registered = report.registered,
            removed_files = report.removed_files,
            removed_directories = report.removed_directories,
            duration_ms = report.duration.as_millis() as u64,
            "Scanned local file cache"
        );

        (cached, report)
    }

    /// Recursively collect valid entries below `dir`
    fn walk(&self, dir: &Path, cached: &mut Vec<CachedFile>, report: &mut LoadReport) {
        let read_dir = match fs::read_dir(dir) {
            Ok(read_dir) => read_dir,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Failed to read cache directory");
                return;
            }
        };

        let mut sidecars = Vec::new();
        let mut data_files = Vec::new();
        let mut subdirectories = Vec::new();

        for entry in read_dir.flatten() {
            let path = entry.path();
            match entry.file_type() {
                Ok(t) if t.is_dir() => subdirectories.push(path),
                _ if is_meta_file(&path) => sidecars.push(path),
                _ => data_files.push(path),
            }
        }

        let mut claimed: HashSet<PathBuf> = HashSet::new();
        for meta_path in sidecars {
            if let Some(entry) = load_sidecar(&meta_path, report) {
                claimed.insert(entry.local_path().to_path_buf());
                cached.push(entry);
            }
        }

        for data_path in data_files {
            // data of an invalid sidecar is already gone
            if !claimed.contains(&data_path) && data_path.exists() {
                warn!(path = %data_path.display(), "Removing cached file without metadata");
                remove_stray(&data_path, report);
            }
        }

        for subdirectory in subdirectories {
            self.walk(&subdirectory, cached, report);
            remove_if_empty(&subdirectory, report);
        }
    }

    /// Delete leftovers of interrupted transfers
    fn purge_staging(&self, report: &mut LoadReport) {
        let Ok(read_dir) = fs::read_dir(&self.staging_dir) else {
            return;
        };
        for entry in read_dir.flatten() {
            let path = entry.path();
            debug!(path = %path.display(), "Removing stale staging file");
            let removed = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match removed {
                Ok(()) => report.removed_files += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging file"),
            }
        }
    }
}

/// Parse a sidecar and check its data file
///
/// Invalid sidecars are deleted together with their data file.
fn load_sidecar(meta_path: &Path, report: &mut LoadReport) -> Option<CachedFile> {
    let data_path = data_path_for_meta(meta_path)?;

    let remote = SidecarRecord::read(meta_path)
        .map_err(|e| e.to_string())
        .and_then(|record| record.to_remote_file());

    match remote {
        Ok(remote) if data_path.is_file() => Some(CachedFile::new(remote, data_path)),
        Ok(_) => {
            warn!(path = %meta_path.display(), "Removing metadata for missing file");
            remove_stray(meta_path, report);
            None
        }
        Err(reason) => {
            warn!(path = %meta_path.display(), reason = %reason, "Removing invalid metadata");
            remove_stray(meta_path, report);
            if data_path.exists() {
                remove_stray(&data_path, report);
            }
            None
        }
    }
}

fn remove_stray(path: &Path, report: &mut LoadReport) {
    match fs::remove_file(path) {
        Ok(()) => report.removed_files += 1,
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove file"),
    }
}

fn remove_if_empty(dir: &Path, report: &mut LoadReport) {
    let empty = fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false);
    if empty && fs::remove_dir(dir).is_ok() {
        debug!(path = %dir.display(), "Removed empty cache directory");
        report.removed_directories += 1;
    }
}

/// Whether a directory name has the batch shape `yyyyMMdd-HHmmssSSS`
pub fn is_batch_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 18
        && bytes[8] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit())
}
