//! Defines routes for the file dashboard.
//!
//! ## Structure
//! - **File endpoints**
//!   - `GET    /api/files?path=`    logical listing of a directory
//!   - `DELETE /api/files?path=`    delete a file, its chunks or a folder
//!   - `POST   /api/upload`         store one chunk (multipart)
//!   - `GET    /api/download?path=` stream a reassembled file
//!   - `POST   /api/folders`        create a folder (multipart `path`)
//!
//! - **Progress**
//!   - `GET    /ws/progress?id=`    WebSocket of per-chunk progress
//!
//! - **Probes**: `/healthz`, `/readyz`

use crate::{
    handlers::{
        file_handlers::{create_folder, delete_file, download_file, list_files, upload_chunk},
        health_handlers::{healthz, readyz},
        progress_handlers::progress_socket,
    },
    services::transfer_service::TransferService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router; `max_upload_bytes` caps a single upload request.
///
/// The router carries shared state (`TransferService`) to all handlers.
pub fn routes(max_upload_bytes: usize) -> Router<TransferService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/files", get(list_files).delete(delete_file))
        .route(
            "/api/upload",
            post(upload_chunk).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/download", get(download_file))
        .route("/api/folders", post(create_folder))
        .route("/ws/progress", get(progress_socket))
}
