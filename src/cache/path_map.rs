//! Logical cache keys
//!
//! Maps a remote URL onto the key used by the cache index and onto the
//! relative location of its data below a batch directory.

use std::path::PathBuf;

use url::Url;

use super::errors::CacheError;
use super::metadata::META_FILE_SUFFIX;

/// Derive the normalized logical key for a remote URL.
///
/// Path segments are percent-decoded, empty and `.` segments are dropped and
/// `..` pops the previous segment. Directory URLs (trailing `/`) keep a
/// trailing `/` so a directory and a file never share a key.
///
/// # Returns
/// The key, e.g. `WebDAV/groups/sample/tile.tif`
pub fn logical_key(url: &Url) -> Result<String, CacheError> {
    let malformed = |reason: &str| CacheError::MalformedLocator(format!("{} ({})", url, reason));

    let mut segments: Vec<String> = Vec::new();
    for raw in url.path().split('/') {
        let segment = urlencoding::decode(raw)
            .map_err(|_| malformed("path is not valid UTF-8"))?
            .into_owned();

        match segment.as_str() {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(malformed("path escapes the root"));
                }
            }
            s if s.contains('/') || s.contains('\\') || s.contains('\0') => {
                return Err(malformed("path segment contains a separator"));
            }
            s if s.starts_with('.') && s.ends_with(META_FILE_SUFFIX) => {
                return Err(malformed("name is reserved for cache metadata"));
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return Err(malformed("path is empty"));
    }

    let mut key = segments.join("/");
    if is_directory_url(url) {
        key.push('/');
    }
    Ok(key)
}

/// Whether the URL names a directory (its path ends with `/`)
pub fn is_directory_url(url: &Url) -> bool {
    url.path().ends_with('/')
}

/// Relative filesystem location of a key below a batch directory.
///
/// `%` and `:` are percent-encoded per segment, so distinct keys always map
/// to distinct paths.
pub fn relative_local_path(key: &str) -> PathBuf {
    key.split('/')
        .filter(|segment| !segment.is_empty())
        .map(encode_segment)
        .collect()
}

fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => encoded.push_str("%25"),
            ':' => encoded.push_str("%3A"),
            _ => encoded.push(c),
        }
    }
    encoded
}
