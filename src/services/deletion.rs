//! Deletion coordinator: removes a logical entry and every object behind it.

use super::{
    chunk_codec::{is_chunk_of, join_path, split_path},
    listing::list_with_root_fallback,
    transfer_service::{TransferError, TransferResult},
};
use crate::gateway::StorageGateway;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Outcome of deleting one logical entry.
///
/// Removal is not transactional on the backend: when some objects fail to
/// go, the rest are still removed and the failures are listed here.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub removed: Vec<String>,
    pub failed: Vec<FailedRemoval>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedRemoval {
    pub path: String,
    pub error: String,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete `path`.
///
/// - A directory is removed recursively.
/// - Otherwise the whole object named `path` and every `<name>.chunk<n>`
///   beside it are removed one by one; per-object failures are collected
///   instead of aborting the loop.
/// - When nothing in the directory matched, the literal path is removed.
pub async fn delete_path(gateway: &dyn StorageGateway, path: &str) -> TransferResult<DeleteReport> {
    let (dir, base) = split_path(path);
    if base.is_empty() {
        return Err(TransferError::Validation(
            "refusing to delete the storage root".into(),
        ));
    }

    let mut report = DeleteReport::default();

    match gateway.stat(path).await {
        Ok(entry) if entry.is_dir => {
            gateway.remove_all(path).await?;
            info!(path, "deleted directory");
            report.removed.push(path.to_string());
            return Ok(report);
        }
        Ok(_) => {}
        Err(err) if err.is_not_found() => debug!(path, "no object at path, looking for chunks"),
        Err(err) => return Err(err.into()),
    }

    let entries = list_with_root_fallback(gateway, dir).await?;
    for entry in entries
        .into_iter()
        .filter(|e| !e.is_dir && (e.name == base || is_chunk_of(&e.name, base)))
    {
        let target = join_path(dir, &entry.name);
        match gateway.remove(&target).await {
            Ok(()) => report.removed.push(target),
            Err(err) => {
                warn!(path = %target, error = %err, "failed to remove object");
                report.failed.push(FailedRemoval {
                    path: target,
                    error: err.to_string(),
                });
            }
        }
    }

    if report.removed.is_empty() && report.failed.is_empty() {
        gateway.remove(path).await?;
        report.removed.push(path.to_string());
    }

    info!(
        path,
        removed = report.removed.len(),
        failed = report.failed.len(),
        "deleted logical file"
    );
    Ok(report)
}
