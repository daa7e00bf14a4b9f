//! TransferService, the chunked-transfer core behind the HTTP handlers.
//!
//! Owns the storage gateway and the progress registry and exposes the five
//! user-facing operations: list, upload a chunk, download, delete, and
//! create a folder. Each call is attempted exactly once; backend errors are
//! passed through without retries.

use super::{
    chunk_codec::{chunk_path, validate_original_filename},
    deletion::{self, DeleteReport},
    listing, reassembly,
    progress_registry::{ProgressRegistry, PublishError},
};
use crate::{
    gateway::{ByteStream, GatewayError, StorageGateway},
    models::{
        entry::LogicalEntry,
        progress::{ProgressMessage, UploadChunk},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("{0}")]
    Validation(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("no progress channel registered for upload `{0}`")]
    Session(String),
    #[error(transparent)]
    Backend(GatewayError),
}

impl From<GatewayError> for TransferError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { path } => TransferError::NotFound(path),
            GatewayError::InvalidPath { path } => {
                TransferError::Validation(format!("invalid path `{path}`"))
            }
            other => TransferError::Backend(other),
        }
    }
}

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Clone, Debug)]
pub struct TransferService {
    gateway: Arc<dyn StorageGateway>,
    progress: ProgressRegistry,
}

impl TransferService {
    pub fn new(gateway: Arc<dyn StorageGateway>, progress: ProgressRegistry) -> Self {
        Self { gateway, progress }
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.gateway
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    /// Logical view of `directory`.
    pub async fn list(&self, directory: &str) -> TransferResult<Vec<LogicalEntry>> {
        listing::list_directory(self.gateway.as_ref(), directory).await
    }

    /// Store one chunk and report progress on its upload's channel.
    ///
    /// The upload must have an open progress channel; without one the
    /// request is refused before anything is written.
    pub async fn upload_chunk(&self, chunk: UploadChunk) -> TransferResult<ProgressMessage> {
        validate_original_filename(&chunk.original_filename).map_err(TransferError::Validation)?;

        let channel = self
            .progress
            .lookup(&chunk.upload_id)
            .ok_or_else(|| TransferError::Session(chunk.upload_id.clone()))?;

        let path = chunk_path(&chunk.directory, &chunk.original_filename, chunk.index);
        self.gateway.write(&path, chunk.data.clone()).await?;

        info!(
            upload_id = %chunk.upload_id,
            path = %path,
            index = chunk.index,
            bytes = chunk.data.len(),
            "stored chunk"
        );

        let written = chunk.end_offset();
        match channel.publish(written, chunk.total_size).await {
            Ok(message) => Ok(message),
            Err(PublishError::Closed) => {
                // The chunk is stored; a socket that went away only costs the
                // client its progress ticks.
                warn!(upload_id = %chunk.upload_id, "progress socket closed, dropping session");
                self.progress.unregister_channel(&chunk.upload_id, &channel);
                Ok(ProgressMessage {
                    total_written: written,
                    total_size: chunk.total_size,
                })
            }
        }
    }

    /// Open the reassembled contents of `path` as a stream.
    pub async fn open_download(&self, path: &str) -> TransferResult<ByteStream> {
        reassembly::open(Arc::clone(&self.gateway), path).await
    }

    /// Copy the reassembled contents of `path` into `sink`.
    pub async fn download<W>(&self, path: &str, sink: &mut W) -> TransferResult<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        reassembly::download(Arc::clone(&self.gateway), path, sink).await
    }

    pub async fn delete(&self, path: &str) -> TransferResult<DeleteReport> {
        deletion::delete_path(self.gateway.as_ref(), path).await
    }

    pub async fn create_folder(&self, path: &str) -> TransferResult<()> {
        if path.trim_matches('/').is_empty() {
            return Err(TransferError::Validation("path is required".into()));
        }
        self.gateway.make_dir_all(path).await?;
        info!(path, "created folder");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::local::LocalGateway;
    use bytes::Bytes;

    async fn service() -> (tempfile::TempDir, TransferService) {
        let dir = tempfile::tempdir().unwrap();
        let gateway = LocalGateway::new(dir.path()).await.unwrap();
        (
            dir,
            TransferService::new(Arc::new(gateway), ProgressRegistry::default()),
        )
    }

    fn chunk(upload_id: &str, index: u64, offset: u64, data: &'static str) -> UploadChunk {
        UploadChunk {
            upload_id: upload_id.into(),
            directory: "/in".into(),
            original_filename: "movie.mkv".into(),
            index,
            total_size: 30,
            start_offset: offset,
            data: Bytes::from(data),
        }
    }

    #[tokio::test]
    async fn upload_without_channel_writes_nothing() {
        let (_dir, svc) = service().await;
        svc.create_folder("/in").await.unwrap();

        let err = svc
            .upload_chunk(chunk("nobody", 0, 0, "0123456789"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Session(ref id) if id == "nobody"));
        assert!(svc.list("/in").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn three_chunk_upload_reports_progress_and_reassembles() {
        let (_dir, svc) = service().await;
        let (_channel, mut rx) = svc.progress().register("s1");

        svc.upload_chunk(chunk("s1", 0, 0, "aaaaaaaaaa")).await.unwrap();
        svc.upload_chunk(chunk("s1", 1, 10, "bbbbbbbbbb")).await.unwrap();
        svc.upload_chunk(chunk("s1", 2, 20, "cccccccccc")).await.unwrap();

        for expected in [10u64, 20, 30] {
            let msg = rx.recv().await.unwrap();
            assert_eq!(
                msg,
                ProgressMessage {
                    total_written: expected,
                    total_size: 30
                }
            );
        }

        assert_eq!(
            svc.list("/in").await.unwrap(),
            vec![LogicalEntry::file("movie.mkv", "/in/movie.mkv", 30)]
        );

        let mut out = Vec::new();
        svc.download("/in/movie.mkv", &mut out).await.unwrap();
        assert_eq!(out, b"aaaaaaaaaabbbbbbbbbbcccccccccc");

        let report = svc.delete("/in/movie.mkv").await.unwrap();
        assert_eq!(report.removed.len(), 3);
        assert!(svc.list("/in").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn every_chunk_is_reported_when_the_socket_lags() {
        let (_dir, svc) = service().await;
        let svc = TransferService::new(Arc::clone(svc.gateway()), ProgressRegistry::new(2));
        let (_channel, mut rx) = svc.progress().register("lag");

        let uploads = {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.upload_chunk(chunk("lag", 0, 0, "aaaaaaaaaa")).await?;
                svc.upload_chunk(chunk("lag", 1, 10, "bbbbbbbbbb")).await?;
                svc.upload_chunk(chunk("lag", 2, 20, "cccccccccc")).await
            })
        };

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(rx.recv().await.unwrap().total_written);
        }
        assert_eq!(seen, vec![10, 20, 30]);
        assert_eq!(uploads.await.unwrap().unwrap().total_written, 30);
    }

    #[tokio::test]
    async fn reserved_filenames_are_rejected() {
        let (_dir, svc) = service().await;
        let (_channel, _rx) = svc.progress().register("s2");
        let mut bad = chunk("s2", 0, 0, "x");
        bad.original_filename = "evil.chunk7".into();
        assert!(matches!(
            svc.upload_chunk(bad).await,
            Err(TransferError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn closed_channel_does_not_fail_the_upload() {
        let (_dir, svc) = service().await;
        let (_channel, rx) = svc.progress().register("gone");
        drop(rx);

        let msg = svc.upload_chunk(chunk("gone", 0, 0, "abc")).await.unwrap();
        assert_eq!(msg.total_written, 3);
        assert!(svc.progress().lookup("gone").is_none());
    }

    #[tokio::test]
    async fn create_folder_requires_a_path() {
        let (_dir, svc) = service().await;
        assert!(matches!(
            svc.create_folder("/").await,
            Err(TransferError::Validation(_))
        ));
        svc.create_folder("/a/b/c").await.unwrap();
        assert_eq!(
            svc.list("/a/b").await.unwrap(),
            vec![LogicalEntry::directory("c", "/a/b/c")]
        );
    }
}
