//! Upload progress types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Pushed to the progress socket once per stored chunk.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressMessage {
    /// Bytes of the file known to be stored so far.
    pub total_written: u64,

    /// Full size of the file being uploaded, as reported by the client.
    pub total_size: u64,
}

/// A single chunk as received from the upload endpoint.
#[derive(Clone, Debug)]
pub struct UploadChunk {
    /// Identifier of the progress socket this upload reports to.
    pub upload_id: String,

    /// Target directory for the chunk object.
    pub directory: String,

    pub original_filename: String,

    pub index: u64,

    pub total_size: u64,

    /// Byte offset of this chunk within the original file.
    pub start_offset: u64,

    pub data: Bytes,
}

impl UploadChunk {
    /// Cumulative bytes written once this chunk is stored.
    pub fn end_offset(&self) -> u64 {
        self.start_offset.saturating_add(self.data.len() as u64)
    }
}
