//! WebSocket endpoint that streams per-chunk upload progress.

use crate::{errors::AppError, services::transfer_service::TransferService};
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    /// Client-chosen upload session id.
    pub id: Option<String>,
}

/// `GET /ws/progress?id=<uploadID>`: upgrade and register the session.
pub async fn progress_socket(
    State(service): State<TransferService>,
    Query(query): Query<ProgressQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let upload_id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("missing id"))?;

    Ok(ws.on_upgrade(move |socket| handle_progress_socket(service, upload_id, socket)))
}

async fn handle_progress_socket(service: TransferService, upload_id: String, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let registry = service.progress().clone();
    let (channel, mut outbound_rx) = registry.register(&upload_id);

    info!(upload_id = %upload_id, "progress socket opened");

    let forward_id = upload_id.clone();
    let outbound_task = tokio::spawn(async move {
        while let Some(progress) = outbound_rx.recv().await {
            let text = match serde_json::to_string(&progress) {
                Ok(text) => text,
                Err(err) => {
                    warn!(upload_id = %forward_id, error = %err, "could not encode progress");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound frames carry nothing; they are read only to notice the close.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(upload_id = %upload_id, error = %err, "progress socket error");
                break;
            }
        }
    }

    outbound_task.abort();
    registry.unregister_channel(&upload_id, &channel);

    info!(upload_id = %upload_id, "progress socket closed");
}
