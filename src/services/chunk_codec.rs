//! Naming scheme for chunk objects: `<original filename>.chunk<index>`.
//!
//! The index is a plain decimal integer with no padding, so ordering must be
//! numeric rather than lexical (`x.chunk10` sorts after `x.chunk9`).

use std::fmt;

/// Separator between the original filename and the chunk index.
pub const CHUNK_MARKER: &str = ".chunk";

/// Typed identity of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkId {
    pub base: String,
    pub index: u64,
}

impl ChunkId {
    pub fn new(base: impl Into<String>, index: u64) -> Self {
        Self {
            base: base.into(),
            index,
        }
    }

    /// Object name as stored on the backend.
    pub fn file_name(&self) -> String {
        self.to_string()
    }

    /// Recognise a stored object name as a chunk.
    ///
    /// The marker is matched at its last occurrence and must be followed by
    /// one or more ASCII digits, so `report.chunked.pdf.chunk3` belongs to
    /// `report.chunked.pdf` and `notes.chunky` is not a chunk at all.
    pub fn parse(entry_name: &str) -> Option<Self> {
        let (base, digits) = entry_name.rsplit_once(CHUNK_MARKER)?;
        if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let index = digits.parse::<u64>().ok()?;
        Some(Self::new(base, index))
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.base, CHUNK_MARKER, self.index)
    }
}

/// Storage path of chunk `index` of `original_filename` inside `directory`.
pub fn chunk_path(directory: &str, original_filename: &str, index: u64) -> String {
    join_path(directory, &ChunkId::new(original_filename, index).file_name())
}

/// True iff `entry_name` is a chunk object belonging to `base_name`.
pub fn is_chunk_of(entry_name: &str, base_name: &str) -> bool {
    ChunkId::parse(entry_name).is_some_and(|id| id.base == base_name)
}

/// Split a chunk object name into its original filename and index.
pub fn parse_chunk_index(entry_name: &str) -> Option<ChunkId> {
    ChunkId::parse(entry_name)
}

/// Check an uploaded filename before any chunk of it is written.
///
/// Names that already look like a chunk object are refused; storing them
/// would make the listing fold them into a different logical file.
pub fn validate_original_filename(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("originalFilename is required".into());
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(format!("invalid originalFilename `{name}`"));
    }
    if name.bytes().any(|b| b.is_ascii_control()) {
        return Err("originalFilename contains control characters".into());
    }
    if ChunkId::parse(name).is_some() {
        return Err(format!(
            "originalFilename `{name}` ends with a reserved `{CHUNK_MARKER}<n>` suffix"
        ));
    }
    Ok(())
}

/// Join a directory and a name with exactly one `/` between them.
///
/// An empty directory yields the bare name; `/` yields `/<name>`.
pub fn join_path(directory: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if directory.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", directory.trim_end_matches('/'), name)
}

/// Split a logical path into its containing directory and final segment.
///
/// `"/a/b/c.iso"` → `("/a/b", "c.iso")`, `"/c.iso"` → `("/", "c.iso")`,
/// `"c.iso"` → `("", "c.iso")`.
pub fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", base)) => ("/", base),
        Some((dir, base)) => (dir, base),
        None => ("", trimmed),
    }
}
