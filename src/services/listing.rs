//! Listing aggregator: folds chunk objects into the logical files they belong to.

use super::{
    chunk_codec::{ChunkId, join_path},
    transfer_service::TransferResult,
};
use crate::{
    gateway::{GatewayResult, StorageEntry, StorageGateway},
    models::entry::LogicalEntry,
};
use std::collections::{BTreeMap, btree_map::Entry};
use tracing::debug;

/// List `directory` as the client sees it: directories first, then files,
/// each group ordered byte-wise by name, with every chunk set collapsed into
/// one entry whose size is the sum of its chunks.
pub async fn list_directory(
    gateway: &dyn StorageGateway,
    directory: &str,
) -> TransferResult<Vec<LogicalEntry>> {
    let raw = gateway.list(directory).await?;
    debug!(directory, raw = raw.len(), "listed backend directory");
    Ok(aggregate(directory, raw))
}

/// Whether a file slot was seeded from a chunk or from a whole object.
#[derive(Debug, PartialEq, Eq)]
enum Origin {
    Whole,
    Chunked,
}

/// Group raw backend rows into logical entries.
///
/// When a whole object and a chunk set share a name, the chunk set wins,
/// matching what a download of that name returns.
pub fn aggregate(directory: &str, raw: Vec<StorageEntry>) -> Vec<LogicalEntry> {
    let mut dirs: BTreeMap<String, LogicalEntry> = BTreeMap::new();
    let mut files: BTreeMap<String, (LogicalEntry, Origin)> = BTreeMap::new();

    for entry in raw {
        if entry.is_dir {
            let path = join_path(directory, &entry.name);
            dirs.entry(entry.name.clone())
                .or_insert_with(|| LogicalEntry::directory(entry.name, path));
            continue;
        }

        match ChunkId::parse(&entry.name) {
            Some(id) => match files.entry(id.base) {
                Entry::Vacant(slot) => {
                    let path = join_path(directory, slot.key());
                    let name = slot.key().clone();
                    slot.insert((LogicalEntry::file(name, path, entry.size), Origin::Chunked));
                }
                Entry::Occupied(mut slot) => {
                    let (logical, origin) = slot.get_mut();
                    if *origin == Origin::Chunked {
                        logical.size = logical.size.saturating_add(entry.size);
                    } else {
                        logical.size = entry.size;
                        *origin = Origin::Chunked;
                    }
                }
            },
            None => {
                if let Entry::Vacant(slot) = files.entry(entry.name) {
                    let path = join_path(directory, slot.key());
                    let name = slot.key().clone();
                    slot.insert((LogicalEntry::file(name, path, entry.size), Origin::Whole));
                }
            }
        }
    }

    dirs.into_values()
        .chain(files.into_values().map(|(logical, _)| logical))
        .collect()
}

fn is_root_alias(dir: &str) -> bool {
    matches!(dir.trim_matches('/'), "" | ".")
}

/// List `dir`, retrying against the storage root when `dir` is an empty or
/// `.` alias for it that the backend refused.
pub(crate) async fn list_with_root_fallback(
    gateway: &dyn StorageGateway,
    dir: &str,
) -> GatewayResult<Vec<StorageEntry>> {
    match gateway.list(dir).await {
        Err(err) if dir != "/" && is_root_alias(dir) => {
            debug!(dir, error = %err, "listing failed, retrying at storage root");
            gateway.list("/").await
        }
        other => other,
    }
}
