//! Progress channel registry. Maps an upload id to the live socket that
//! reports its progress.

use crate::models::progress::ProgressMessage;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Queue depth between chunk writers and one socket's sender task.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("progress channel is closed")]
    Closed,
}

/// Sending half of one upload session's progress socket.
#[derive(Debug)]
pub struct ProgressChannel {
    sender: mpsc::Sender<ProgressMessage>,
    /// Highest `total_written` sent so far. Held across the send so that
    /// concurrent publishers cannot reorder messages.
    high_water: Mutex<u64>,
}

impl ProgressChannel {
    /// Queue a progress update for the socket, waiting for buffer space when
    /// the socket is behind. Every update is delivered while the socket lives.
    ///
    /// `total_written` never goes backwards on the wire: an update that
    /// arrives after a larger one is clamped up to the larger value.
    pub async fn publish(
        &self,
        total_written: u64,
        total_size: u64,
    ) -> Result<ProgressMessage, PublishError> {
        let mut high_water = self.high_water.lock().await;
        let message = ProgressMessage {
            total_written: total_written.max(*high_water),
            total_size,
        };
        self.sender
            .send(message)
            .await
            .map_err(|_| PublishError::Closed)?;
        *high_water = message.total_written;
        Ok(message)
    }
}

/// Concurrent table of open progress channels, keyed by client-chosen id.
///
/// Cloning shares the same table.
#[derive(Debug, Clone)]
pub struct ProgressRegistry {
    channels: Arc<DashMap<String, Arc<ProgressChannel>>>,
    buffer: usize,
}

impl Default for ProgressRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_BUFFER)
    }
}

impl ProgressRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            buffer: buffer.max(1),
        }
    }

    /// Open a channel for `upload_id`, replacing any channel already
    /// registered under that id. The receiver feeds the socket writer.
    pub fn register(
        &self,
        upload_id: &str,
    ) -> (Arc<ProgressChannel>, mpsc::Receiver<ProgressMessage>) {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let channel = Arc::new(ProgressChannel {
            sender,
            high_water: Mutex::new(0),
        });
        if self
            .channels
            .insert(upload_id.to_string(), Arc::clone(&channel))
            .is_some()
        {
            debug!(upload_id, "replaced existing progress channel");
        }
        (channel, receiver)
    }

    pub fn lookup(&self, upload_id: &str) -> Option<Arc<ProgressChannel>> {
        self.channels
            .get(upload_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Remove whatever channel is registered for `upload_id`.
    pub fn unregister(&self, upload_id: &str) -> Option<Arc<ProgressChannel>> {
        self.channels.remove(upload_id).map(|(_, channel)| channel)
    }

    /// Remove the entry for `upload_id` only if it is still `channel`.
    ///
    /// A socket that closes after its id was re-registered by a newer socket
    /// leaves the newer registration in place.
    pub fn unregister_channel(&self, upload_id: &str, channel: &Arc<ProgressChannel>) -> bool {
        self.channels
            .remove_if(upload_id, |_, current| Arc::ptr_eq(current, channel))
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
