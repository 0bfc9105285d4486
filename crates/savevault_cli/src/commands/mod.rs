//! CLI command implementations.

pub mod defrag;
pub mod inspect;
pub mod list;
pub mod verify;

use savevault_codec::{IndexEntry, ENTRY_SIZE};
use savevault_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};

/// Returns the index file path for a store base path.
pub fn index_path(base: &Path) -> PathBuf {
    suffixed(base, ".idx")
}

/// Returns the data log path for a store base path.
pub fn data_path(base: &Path) -> PathBuf {
    suffixed(base, ".dat")
}

fn suffixed(base: &Path, suffix: &str) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Reads and decodes the whole index file of a store.
///
/// This is a read-only debugging path that does not take the store lock
/// and does not need the encryption key: the index holds no payload data.
pub fn read_index(base: &Path) -> Result<Vec<IndexEntry>, Box<dyn std::error::Error>> {
    let path = index_path(base);
    if !path.exists() {
        return Err(format!("index file not found: {}", path.display()).into());
    }

    let backend = FileBackend::open(&path)?;
    let size = backend.size()?;
    if size % ENTRY_SIZE as u64 != 0 {
        return Err(format!(
            "index length {size} is not a multiple of the {ENTRY_SIZE}-byte slot width"
        )
        .into());
    }

    let bytes = backend.read_at(0, size as usize)?;
    let entries = bytes
        .chunks_exact(ENTRY_SIZE)
        .map(IndexEntry::decode)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}
