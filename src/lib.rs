//! davcache - local disk cache for files served over WebDAV
//!
//! Remote resources are fetched once into a capacity-bounded LRU cache on
//! local disk and served from there afterwards. The cache survives restarts:
//! its inventory is rebuilt from the files and sidecars already on disk.

pub mod cache;
pub mod config;
pub mod session;
pub mod webdav;

pub use cache::{CacheError, EffectiveLocation, FileLookup, LocalFileCache};
pub use config::CacheConfig;
pub use session::FileCacheSession;
pub use webdav::{RemoteFile, RemoteFileSource, WebDavClient, WebDavError};
