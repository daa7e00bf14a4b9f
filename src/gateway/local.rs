//! Directory-on-disk gateway. Used for development and tests in place of a
//! remote WebDAV share.

use super::{
    ByteStream, GatewayError, GatewayResult, StorageEntry, StorageGateway, path_segments,
};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::debug;
use uuid::Uuid;

const TEMP_PREFIX: &str = ".tmp-";

#[derive(Debug, Clone)]
pub struct LocalGateway {
    root: PathBuf,
}

impl LocalGateway {
    /// Create a gateway rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> GatewayResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> GatewayResult<PathBuf> {
        let mut full = self.root.clone();
        for segment in path_segments(path)? {
            full.push(segment);
        }
        Ok(full)
    }
}

/// Map `NotFound` onto the gateway's own variant, keeping other I/O errors.
fn map_io(path: &str, err: io::Error) -> GatewayError {
    if err.kind() == ErrorKind::NotFound {
        GatewayError::NotFound {
            path: path.to_string(),
        }
    } else {
        GatewayError::Io(err)
    }
}

/// In-flight write: the temp prefix followed by exactly a uuid. Uploaded
/// names always end in `.chunk<n>`, so they can never take this shape.
fn is_temp_name(name: &str) -> bool {
    name.strip_prefix(TEMP_PREFIX)
        .is_some_and(|rest| Uuid::try_parse(rest).is_ok())
}

fn file_name_of(path: &str) -> String {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl StorageGateway for LocalGateway {
    fn kind(&self) -> &'static str {
        "local"
    }

    async fn read(&self, path: &str) -> GatewayResult<ByteStream> {
        let full = self.resolve(path)?;
        let file = File::open(&full).await.map_err(|e| map_io(path, e))?;
        if file.metadata().await?.is_dir() {
            return Err(GatewayError::NotFound {
                path: path.to_string(),
            });
        }
        Ok(Box::pin(ReaderStream::new(file)))
    }

    async fn write(&self, path: &str, data: Bytes) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        let parent = full
            .parent()
            .filter(|p| p.starts_with(&self.root) && full != self.root)
            .map(PathBuf::from)
            .ok_or_else(|| GatewayError::InvalidPath {
                path: path.to_string(),
            })?;
        fs::create_dir_all(&parent).await?;

        // Write beside the target and rename so readers never see a partial object.
        let tmp_path = parent.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        let result = async {
            let mut file = File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            fs::rename(&tmp_path, &full).await
        }
        .await;

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(GatewayError::Io(err));
        }

        debug!(path, bytes = data.len(), "wrote object");
        Ok(())
    }

    async fn stat(&self, path: &str) -> GatewayResult<StorageEntry> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).await.map_err(|e| map_io(path, e))?;
        Ok(StorageEntry {
            name: file_name_of(path),
            path: path.to_string(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
        })
    }

    async fn list(&self, dir: &str) -> GatewayResult<Vec<StorageEntry>> {
        let full = self.resolve(dir)?;
        let mut read_dir = fs::read_dir(&full).await.map_err(|e| map_io(dir, e))?;
        let prefix = dir.trim_end_matches('/');

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if is_temp_name(&name) {
                continue;
            }
            let meta = entry.metadata().await?;
            entries.push(StorageEntry {
                path: format!("{}/{}", prefix, name),
                name,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
            });
        }
        Ok(entries)
    }

    async fn remove(&self, path: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).await.map_err(|e| map_io(path, e))?;
        debug!(path, "removed object");
        Ok(())
    }

    async fn remove_all(&self, path: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(GatewayError::InvalidPath {
                path: path.to_string(),
            });
        }
        fs::remove_dir_all(&full).await.map_err(|e| map_io(path, e))?;
        debug!(path, "removed directory tree");
        Ok(())
    }

    async fn make_dir_all(&self, path: &str) -> GatewayResult<()> {
        let full = self.resolve(path)?;
        fs::create_dir_all(&full).await?;
        Ok(())
    }
}
