//! One row of the file browser.

use serde::{Deserialize, Serialize};

/// A user-visible file or directory.
///
/// For a chunked file `size` is the sum of every chunk found at listing time,
/// which is short of the real size while an upload is still in flight.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LogicalEntry {
    /// Final path segment (the original filename for chunked files).
    pub name: String,

    /// Slash-separated path relative to the storage root.
    pub path: String,

    #[serde(rename = "isDir")]
    pub is_directory: bool,

    /// Size in bytes; always 0 for directories.
    pub size: u64,
}

impl LogicalEntry {
    pub fn directory(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: true,
            size: 0,
        }
    }

    pub fn file(name: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_directory: false,
            size,
        }
    }
}
