//! Chunked file transfer dashboard backed by WebDAV.
//!
//! Files are uploaded as numbered `<name>.chunk<n>` objects, listed as one
//! logical file and streamed back reassembled. Upload progress is pushed to
//! the browser over a WebSocket keyed by a client-chosen upload id.

pub mod config;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

use axum::Router;
use gateway::StorageGateway;
use services::{progress_registry::ProgressRegistry, transfer_service::TransferService};
use std::sync::Arc;

/// Wire a gateway into a ready-to-serve router.
pub fn build_app(gateway: Arc<dyn StorageGateway>, max_upload_bytes: usize) -> Router {
    let service = TransferService::new(gateway, ProgressRegistry::default());
    routes::routes::routes(max_upload_bytes).with_state(service)
}
