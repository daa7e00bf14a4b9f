//! The chunked-transfer core.
//!
//! - [`chunk_codec`] names and recognises chunk objects
//! - [`listing`] folds chunks into logical entries
//! - [`reassembly`] streams chunks back out in index order
//! - [`deletion`] removes a logical entry and all of its objects
//! - [`progress_registry`] tracks live progress sockets per upload
//! - [`transfer_service`] ties them to a storage gateway

pub mod chunk_codec;
pub mod deletion;
pub mod listing;
pub mod progress_registry;
pub mod reassembly;
pub mod transfer_service;
