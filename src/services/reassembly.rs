//! Reassembly engine: streams a logical file back out of its chunks.

use super::{
    chunk_codec::{ChunkId, join_path, split_path},
    listing::list_with_root_fallback,
    transfer_service::{TransferError, TransferResult},
};
use crate::gateway::{ByteStream, GatewayError, StorageGateway};
use futures::{StreamExt, TryStreamExt, stream};
use std::{io, sync::Arc};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// How a logical path is materialised on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadPlan {
    /// No chunks exist; the path is read as one object.
    Whole { path: String },
    /// Chunk object paths in ascending index order.
    Chunks { paths: Vec<String> },
}

/// Discover the chunks of `path` and order them by numeric index.
pub async fn plan(gateway: &dyn StorageGateway, path: &str) -> TransferResult<DownloadPlan> {
    let (dir, base) = split_path(path);
    if base.is_empty() {
        return Err(TransferError::Validation("path is required".into()));
    }

    let entries = list_with_root_fallback(gateway, dir).await?;
    let mut chunks: Vec<(u64, String)> = entries
        .into_iter()
        .filter(|entry| !entry.is_dir)
        .filter_map(|entry| {
            ChunkId::parse(&entry.name)
                .filter(|id| id.base == base)
                .map(|id| (id.index, join_path(dir, &entry.name)))
        })
        .collect();

    if chunks.is_empty() {
        return Ok(DownloadPlan::Whole {
            path: path.to_string(),
        });
    }

    chunks.sort_by_key(|(index, _)| *index);
    Ok(DownloadPlan::Chunks {
        paths: chunks.into_iter().map(|(_, p)| p).collect(),
    })
}

/// Open `path` for streaming.
///
/// Missing paths fail here, before any byte is produced. Chunks are opened
/// lazily one at a time; each read handle is dropped before the next chunk
/// is requested, and the first failure ends the stream with an error.
pub async fn open(gateway: Arc<dyn StorageGateway>, path: &str) -> TransferResult<ByteStream> {
    match plan(gateway.as_ref(), path).await? {
        DownloadPlan::Whole { path } => {
            debug!(path = %path, "no chunks found, reading whole object");
            Ok(gateway.read(&path).await?)
        }
        DownloadPlan::Chunks { paths } => {
            info!(path, chunks = paths.len(), "reassembling chunked file");
            let chunks = stream::iter(paths)
                .then(move |chunk| {
                    let gateway = Arc::clone(&gateway);
                    async move { gateway.read(&chunk).await.map_err(io::Error::other) }
                })
                .try_flatten();
            Ok(Box::pin(chunks))
        }
    }
}

/// Write the reassembled contents of `path` into `sink`.
///
/// Bytes already written stay in the sink if a later chunk fails. Returns
/// the number of bytes written.
pub async fn download<W>(
    gateway: Arc<dyn StorageGateway>,
    path: &str,
    sink: &mut W,
) -> TransferResult<u64>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut body = open(gateway, path).await?;
    let mut written = 0u64;
    while let Some(piece) = body.next().await {
        let bytes = piece.map_err(|err| TransferError::Backend(GatewayError::Io(err)))?;
        sink.write_all(&bytes)
            .await
            .map_err(|err| TransferError::Backend(GatewayError::Io(err)))?;
        written += bytes.len() as u64;
    }
    sink.flush()
        .await
        .map_err(|err| TransferError::Backend(GatewayError::Io(err)))?;
    Ok(written)
}
