//! Sidecar Metadata
//!
//! Every cached file has a companion `.<name>.cached-file` next to it holding
//! a versioned JSON snapshot of the entry. The startup scan rebuilds the index
//! from these records without contacting the remote store.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use super::errors::CacheError;
use crate::webdav::RemoteFile;

/// Suffix appended to sidecar file names
pub const META_FILE_SUFFIX: &str = ".cached-file";

/// Newest sidecar format this build can read
pub const SIDECAR_FORMAT_VERSION: u32 = 1;

/// Serialized snapshot of a cached file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarRecord {
    pub format_version: u32,
    pub remote_url: String,
    pub directory: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
    /// Informational only, the data location is derived from the sidecar path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl SidecarRecord {
    /// Snapshot a file entry
    pub fn for_file(remote: &RemoteFile, local_path: &Path) -> Self {
        Self {
            format_version: SIDECAR_FORMAT_VERSION,
            remote_url: remote.url.to_string(),
            directory: remote.is_directory,
            content_length: remote.content_length,
            local_path: Some(local_path.to_path_buf()),
        }
    }

    /// Read and parse a sidecar file
    pub fn read(meta_path: &Path) -> Result<Self, CacheError> {
        let content = fs::read(meta_path)
            .map_err(|e| CacheError::storage(format!("failed to read {}", meta_path.display()), e))?;
        serde_json::from_slice(&content)
            .map_err(|e| CacheError::storage(format!("failed to parse {}", meta_path.display()), e))
    }

    /// Write the record atomically (temp file in the same directory, then rename)
    pub fn write(&self, meta_path: &Path) -> Result<(), CacheError> {
        let parent = meta_path
            .parent()
            .ok_or_else(|| CacheError::Storage(format!("{} has no parent", meta_path.display())))?;

        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CacheError::storage("failed to serialize sidecar", e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| CacheError::storage("failed to create temp file for sidecar", e))?;
        tmp.write_all(&json)
            .map_err(|e| CacheError::storage("failed to write sidecar", e))?;
        tmp.persist(meta_path)
            .map_err(|e| CacheError::storage(format!("failed to persist {}", meta_path.display()), e.error))?;

        Ok(())
    }

    /// Turn the record back into a remote descriptor.
    ///
    /// # Returns
    /// The descriptor, or the reason the record cannot be trusted
    pub fn to_remote_file(&self) -> Result<RemoteFile, String> {
        if self.format_version == 0 || self.format_version > SIDECAR_FORMAT_VERSION {
            return Err(format!("unsupported format version {}", self.format_version));
        }
        if self.directory {
            return Err("directory entries have no sidecar".to_string());
        }
        let url = Url::parse(&self.remote_url)
            .map_err(|e| format!("bad remote url '{}': {}", self.remote_url, e))?;
        Ok(RemoteFile {
            url,
            is_directory: false,
            content_length: self.content_length,
        })
    }
}

/// Sidecar location for a data file
pub fn meta_path_for(data_path: &Path) -> Option<PathBuf> {
    let name = data_path.file_name()?.to_str()?;
    Some(data_path.with_file_name(format!(".{}{}", name, META_FILE_SUFFIX)))
}

/// Whether a path names a sidecar file
pub fn is_meta_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(META_FILE_SUFFIX) && n.len() > META_FILE_SUFFIX.len() + 1)
        .unwrap_or(false)
}

/// Data file location for a sidecar
pub fn data_path_for_meta(meta_path: &Path) -> Option<PathBuf> {
    if !is_meta_file(meta_path) {
        return None;
    }
    let name = meta_path.file_name()?.to_str()?;
    let data_name = &name[1..name.len() - META_FILE_SUFFIX.len()];
    Some(meta_path.with_file_name(data_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_naming() {
        let data = Path::new("/cache/20240101-120000123/WebDAV/a/b.tif");
        let meta = meta_path_for(data).unwrap();
        assert_eq!(
            meta,
            PathBuf::from("/cache/20240101-120000123/WebDAV/a/.b.tif.cached-file")
        );
        assert!(is_meta_file(&meta));
        assert!(!is_meta_file(data));
        assert!(!is_meta_file(Path::new("/cache/.cached-file")));
        assert_eq!(data_path_for_meta(&meta).unwrap(), data);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("b.tif");
        let meta = meta_path_for(&data).unwrap();
        let remote = RemoteFile::file(Url::parse("http://h/WebDAV/a/b.tif").unwrap(), 4096);

        let record = SidecarRecord::for_file(&remote, &data);
        record.write(&meta).unwrap();

        let loaded = SidecarRecord::read(&meta).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.to_remote_file().unwrap(), remote);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = br#"{"formatVersion":1,"remoteUrl":"http://h/x","directory":false,"checksum":"abc"}"#;
        let record: SidecarRecord = serde_json::from_slice(json).unwrap();
        assert_eq!(record.content_length, None);
        assert!(record.to_remote_file().is_ok());
    }

    #[test]
    fn test_invalid_records_rejected() {
        let mut record = SidecarRecord {
            format_version: 2,
            remote_url: "http://h/x".to_string(),
            directory: false,
            content_length: Some(1),
            local_path: None,
        };
        assert!(record.to_remote_file().is_err());

        record.format_version = 1;
        record.directory = true;
        assert!(record.to_remote_file().is_err());

        record.directory = false;
        record.remote_url = "not a url".to_string();
        assert!(record.to_remote_file().is_err());
    }
}
