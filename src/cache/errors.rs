//! Cache Error Types
//!
//! Every failure a cache request can report. Errors are `Clone` so the
//! outcome of one shared fetch can be handed to every requester that joined
//! it.

use crate::webdav::WebDavError;

/// Local file cache error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("Malformed locator: {0}")]
    MalformedLocator(String),

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(WebDavError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{key} requires {kilobytes} KB which exceeds the cache capacity of {capacity} KB")]
    CapacityExceeded {
        key: String,
        kilobytes: u64,
        capacity: u64,
    },

    #[error("Cache miss: {0}")]
    CacheMiss(String),

    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Cache key {key} already holds {existing}, refusing {requested}")]
    KeyCollision {
        key: String,
        existing: String,
        requested: String,
    },

    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl CacheError {
    /// Wrap a local I/O failure with context
    pub fn storage(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        CacheError::Storage(format!("{}: {}", context, err))
    }
}

impl From<WebDavError> for CacheError {
    fn from(err: WebDavError) -> Self {
        match err {
            WebDavError::MalformedUrl(url, reason) => {
                CacheError::MalformedLocator(format!("{} ({})", url, reason))
            }
            other => CacheError::RemoteUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webdav_error_conversion() {
        let err: CacheError = WebDavError::NotFound("/a".into()).into();
        assert!(matches!(err, CacheError::RemoteUnavailable(WebDavError::NotFound(_))));

        let err: CacheError = WebDavError::MalformedUrl("x".into(), "relative URL".into()).into();
        assert!(matches!(err, CacheError::MalformedLocator(_)));
    }

    #[test]
    fn test_capacity_message() {
        let err = CacheError::CapacityExceeded {
            key: "a/b.tif".into(),
            kilobytes: 12,
            capacity: 10,
        };
        assert_eq!(
            err.to_string(),
            "a/b.tif requires 12 KB which exceeds the cache capacity of 10 KB"
        );
    }
}
