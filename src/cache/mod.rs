//! Local file cache
//!
//! Disk-backed, capacity-bounded LRU cache of files served by a WebDAV
//! store, with per-key fetch deduplication and crash-recoverable metadata.

pub mod builder;
pub mod cached_file;
pub mod errors;
pub mod loader;
pub mod local_file_cache;
pub mod metadata;
pub mod path_map;
pub mod removal;
pub mod weighted_lru;

#[cfg(test)]
pub(crate) mod test_support;

pub use cached_file::CachedFile;
pub use errors::CacheError;
pub use loader::{LoadReport, LocalFileLoader};
pub use local_file_cache::{CacheSettings, EffectiveLocation, FileLookup, LocalFileCache, MissReason};
pub use weighted_lru::WeightedLru;
