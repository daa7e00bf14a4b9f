//! Storage gateway: the narrow set of primitives the transfer core needs from
//! a hierarchical byte store.
//!
//! Two implementations ship with the service:
//! - [`webdav::WebDavGateway`] talks to a remote WebDAV server over HTTP.
//! - [`local::LocalGateway`] maps the same primitives onto a directory on disk.
//!
//! Paths are always slash-separated and relative to the store root; a leading
//! `/` is accepted and means the same thing.

pub mod local;
pub mod webdav;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::{io, pin::Pin};
use thiserror::Error;

/// Streamed object contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

/// One raw row as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageEntry {
    /// Final path segment.
    pub name: String,
    /// Full slash-separated path relative to the store root.
    pub path: String,
    pub is_dir: bool,
    /// Stored size in bytes; 0 for directories.
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("`{path}` not found")]
    NotFound { path: String },
    #[error("invalid storage path `{path}`")]
    InvalidPath { path: String },
    #[error("{method} `{path}` failed with status {status}")]
    Status {
        method: String,
        path: String,
        status: u16,
    },
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl GatewayError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, GatewayError::NotFound { .. })
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Primitives exposed by a remote (or local) file store.
#[async_trait]
pub trait StorageGateway: Send + Sync + std::fmt::Debug + 'static {
    /// Short backend name used in logs ("webdav", "local").
    fn kind(&self) -> &'static str;

    /// Open a read stream over the full contents of `path`.
    async fn read(&self, path: &str) -> GatewayResult<ByteStream>;

    /// Write `data` as the complete contents of `path`, replacing any
    /// existing object.
    async fn write(&self, path: &str, data: Bytes) -> GatewayResult<()>;

    async fn stat(&self, path: &str) -> GatewayResult<StorageEntry>;

    /// Immediate children of `dir`, in backend order.
    async fn list(&self, dir: &str) -> GatewayResult<Vec<StorageEntry>>;

    /// Remove a single object.
    async fn remove(&self, path: &str) -> GatewayResult<()>;

    /// Remove a directory and everything beneath it.
    async fn remove_all(&self, path: &str) -> GatewayResult<()>;

    /// Create `path` and any missing parents. Existing directories are fine.
    async fn make_dir_all(&self, path: &str) -> GatewayResult<()>;
}

/// Split a storage path into its non-empty segments, rejecting `.` and `..`.
pub(crate) fn path_segments(path: &str) -> GatewayResult<Vec<&str>> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" => continue,
            "." | ".." => {
                return Err(GatewayError::InvalidPath {
                    path: path.to_string(),
                });
            }
            s if s.contains('\\') || s.bytes().any(|b| b.is_ascii_control()) => {
                return Err(GatewayError::InvalidPath {
                    path: path.to_string(),
                });
            }
            s => segments.push(s),
        }
    }
    Ok(segments)
}
