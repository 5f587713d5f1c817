//! Remote file source abstraction
//!
//! The cache engine only talks to the remote store through this trait, so it
//! can be driven by the WebDAV client in production and by an in-memory store
//! in tests.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use url::Url;

use super::errors::WebDavError;
use super::types::RemoteFile;

/// Stream of body chunks for a single download
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, WebDavError>> + Send>>;

/// Read side of a remote file store
#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    /// Resolve an application "standard path" into a remote URL
    fn resolve_url(&self, standard_path: &str) -> Result<Url, WebDavError>;

    /// Fetch metadata for a single resource (depth 0)
    async fn describe(&self, url: &Url) -> Result<RemoteFile, WebDavError>;

    /// Whether the resource answers a metadata query at all
    async fn is_available(&self, url: &Url) -> Result<bool, WebDavError>;

    /// List the files under a directory.
    ///
    /// Directory entries are never returned, only leaf files. With
    /// `recursive` the whole subtree is listed, otherwise only immediate
    /// members.
    async fn list_files(&self, url: &Url, recursive: bool) -> Result<Vec<RemoteFile>, WebDavError>;

    /// Open a byte stream for the resource's content
    async fn open(&self, url: &Url) -> Result<ByteStream, WebDavError>;
}
