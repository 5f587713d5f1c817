//! WebDAV remote file store module

pub mod client;
pub mod errors;
pub mod source;
pub mod types;

pub use client::{ClientOptions, WebDavClient};
pub use errors::WebDavError;
pub use source::{ByteStream, RemoteFileSource};
pub use types::{Depth, RemoteFile};
