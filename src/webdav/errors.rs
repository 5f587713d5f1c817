//! WebDAV Error Types
//!
//! Structured error handling for WebDAV requests.
//! Maps HTTP status codes to specific error variants so callers can decide
//! whether to fall back to direct remote access or retry.

/// WebDAV request error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum WebDavError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Unexpected status {status} for {method} {href}")]
    UnexpectedStatus {
        status: u16,
        method: String,
        href: String,
    },

    #[error("Too many redirects for {0}")]
    RedirectLoop(String),

    #[error("Malformed multi-status response for {href}: {reason}")]
    MalformedResponse { href: String, reason: String },

    #[error("Malformed URL '{0}': {1}")]
    MalformedUrl(String, String),

    #[error("Local I/O error: {0}")]
    Io(String),
}

impl WebDavError {
    /// Whether this error is worth retrying by the caller.
    ///
    /// The cache itself never retries; this is only a hint for callers that
    /// implement their own policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebDavError::Timeout(_) | WebDavError::Network(_) | WebDavError::Server(_, _)
        )
    }

    /// Create a WebDavError from an HTTP status code, request method and href
    pub fn from_status(status: u16, method: &str, href: &str) -> Self {
        match status {
            401 => WebDavError::Unauthorized(href.to_string()),
            403 => WebDavError::Forbidden(href.to_string()),
            404 => WebDavError::NotFound(href.to_string()),
            408 => WebDavError::Timeout(href.to_string()),
            500..=599 => WebDavError::Server(status, format!("{} {}", method, href)),
            _ => WebDavError::UnexpectedStatus {
                status,
                method: method.to_string(),
                href: href.to_string(),
            },
        }
    }

    /// Classify a transport failure reported by reqwest
    pub fn from_transport(err: &reqwest::Error, href: &str) -> Self {
        if err.is_timeout() {
            WebDavError::Timeout(href.to_string())
        } else {
            WebDavError::Network(format!("{}: {}", href, err))
        }
    }
}

impl From<std::io::Error> for WebDavError {
    fn from(err: std::io::Error) -> Self {
        WebDavError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            WebDavError::from_status(404, "PROPFIND", "/a"),
            WebDavError::NotFound(_)
        ));
        assert!(matches!(
            WebDavError::from_status(401, "GET", "/a"),
            WebDavError::Unauthorized(_)
        ));
        assert!(matches!(
            WebDavError::from_status(503, "GET", "/a"),
            WebDavError::Server(503, _)
        ));
        assert!(matches!(
            WebDavError::from_status(409, "MKCOL", "/a"),
            WebDavError::UnexpectedStatus { status: 409, .. }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(WebDavError::Server(500, "x".into()).is_retryable());
        assert!(WebDavError::Timeout("x".into()).is_retryable());
        assert!(!WebDavError::NotFound("x".into()).is_retryable());
        assert!(!WebDavError::RedirectLoop("x".into()).is_retryable());
    }
}
