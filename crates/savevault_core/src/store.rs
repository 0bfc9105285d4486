//! The store coordinator: CRUD + defrag over the index/data file pair.

use crate::crypto::{EncryptionKey, RecordCipher};
use crate::error::{StoreError, StoreResult};
use crate::id::RecordId;
use crate::options::StoreOptions;
use fs2::FileExt;
use parking_lot::RwLock;
use savevault_codec::{DataRecord, IndexEntry, ENTRY_SIZE, TOMBSTONE_ID};
use savevault_storage::{FileBackend, StorageBackend, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Suffix of the index file.
const INDEX_SUFFIX: &str = ".idx";
/// Suffix of the data log.
const DATA_SUFFIX: &str = ".dat";
/// Suffix of the advisory lock file.
const LOCK_SUFFIX: &str = ".lock";
/// Suffixes of the compaction output files before they are renamed over
/// the originals.
const INDEX_TMP_SUFFIX: &str = ".idx.tmp";
const DATA_TMP_SUFFIX: &str = ".dat.tmp";

/// Statistics returned by [`SaveStore::defrag`].
#[derive(Debug, Clone, Copy)]
pub struct DefragStats {
    /// Index slots scanned, tombstoned included.
    pub slots_scanned: usize,
    /// Live records carried into the compacted files.
    pub live_records: usize,
    /// Total bytes reclaimed across both files.
    pub reclaimed_bytes: u64,
}

/// The two on-disk files of one store.
struct StoreFiles {
    index: FileBackend,
    data: FileBackend,
}

/// A secure indexed record store.
///
/// Persists serializable values under 128-bit identifiers in two files
/// named by a caller-supplied base path: `<base>.idx` (fixed-width
/// index) and `<base>.dat` (append-only encrypted data log). Payloads
/// are SHA-256 hashed then AES-256-GCM encrypted on write; reads decrypt
/// first and verify the recomputed digest before returning anything.
///
/// # Concurrency
///
/// A single process-wide read-write lock guards both files: `get`,
/// `list_all`, `contains`, `count` and `verify` run under the shared
/// lock, while `add`, `add_with_id`, `update`, `delete` and `defrag`
/// take the exclusive lock. The lock spans the full operation, so a
/// reader never observes an index entry whose data-log bytes are not yet
/// fully written, and writers never interleave their appends. Every
/// operation blocks the calling thread until its file I/O completes.
///
/// A cross-process advisory lock on `<base>.lock` additionally ensures
/// only one handle owns the file pair at a time.
///
/// # Lookup cost
///
/// Lookups scan the index linearly, so `get`/`update`/`delete` are O(n)
/// in the number of index slots ever written. That matches the store's
/// intended scale; there is no in-memory index cache.
///
/// # Durability
///
/// Within a mutation the data-log append is flushed (and fsynced, unless
/// [`StoreOptions::sync_writes`] is disabled) before the index append.
/// A crash between the two leaves at worst an orphaned, unreferenced
/// tail in the data log - never an index entry pointing at absent data.
/// `update` is **not** atomic across its tombstone-then-append steps: a
/// crash between them loses the record.
pub struct SaveStore {
    base: PathBuf,
    options: StoreOptions,
    cipher: RecordCipher,
    files: RwLock<StoreFiles>,
    /// Held for the lifetime of the store; dropping releases the lock.
    _lock_file: File,
}

impl SaveStore {
    /// Opens a store at the given base path with default options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StoreLocked`] if another handle holds the
    /// store's lock, and [`StoreError::Corruption`] if the index file
    /// length is not a whole number of slots.
    pub fn open(base: impl AsRef<Path>, key: EncryptionKey) -> StoreResult<Self> {
        Self::open_with_options(base, key, StoreOptions::default())
    }

    /// Opens a store at the given base path with custom options.
    ///
    /// # Errors
    ///
    /// As [`SaveStore::open`]; additionally returns
    /// [`StoreError::StoreMissing`] if the store does not exist and
    /// `create_if_missing` is disabled.
    pub fn open_with_options(
        base: impl AsRef<Path>,
        key: EncryptionKey,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        let base = base.as_ref().to_path_buf();
        let index_path = sibling(&base, INDEX_SUFFIX);
        let data_path = sibling(&base, DATA_SUFFIX);

        if !options.create_if_missing && !index_path.exists() {
            return Err(StoreError::StoreMissing { path: index_path });
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(&base, LOCK_SUFFIX))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StoreError::StoreLocked);
        }

        let index = FileBackend::open(&index_path)?;
        let data = FileBackend::open(&data_path)?;

        // Fail fast on a damaged index rather than at first scan.
        let index_size = index.size()?;
        if index_size % ENTRY_SIZE as u64 != 0 {
            return Err(index_width_corruption(index_size));
        }

        debug!(base = %base.display(), slots = index_size / ENTRY_SIZE as u64, "opened store");

        Ok(Self {
            base,
            options,
            cipher: RecordCipher::new(key),
            files: RwLock::new(StoreFiles { index, data }),
            _lock_file: lock_file,
        })
    }

    /// Returns the base path this store was opened with.
    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Persists a value under a fresh random identifier.
    ///
    /// The label is advisory, used only for listing; it is truncated to
    /// the index's fixed label budget.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the value cannot be
    /// serialized; nothing is written in that case.
    pub fn add<T: Serialize>(&self, value: &T, label: &str) -> StoreResult<RecordId> {
        let id = RecordId::new();
        self.add_with_id(id, value, label)?;
        Ok(id)
    }

    /// Persists a value under a caller-supplied identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidRecordId`] for the reserved nil id
    /// and [`StoreError::IdAlreadyLive`] if a live record already exists
    /// under `id`.
    pub fn add_with_id<T: Serialize>(
        &self,
        id: RecordId,
        value: &T,
        label: &str,
    ) -> StoreResult<()> {
        if id.is_nil() {
            return Err(StoreError::InvalidRecordId);
        }

        let mut files = self.files.write();
        let entries = read_entries(&files.index)?;
        if find_live(&entries, id).is_some() {
            return Err(StoreError::IdAlreadyLive { id });
        }

        let plaintext = serialize(value)?;
        self.append_record(&mut files, id, &plaintext, label)
    }

    /// Loads and verifies the value stored under `id`.
    ///
    /// The **last** live index entry for `id` wins: updates append
    /// rather than rewrite, so a later entry shadows an earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no live record exists, and
    /// [`StoreError::DecryptionFailed`] / [`StoreError::IntegrityMismatch`]
    /// if the stored bytes fail verification - altered data is never
    /// returned.
    pub fn get<T: DeserializeOwned>(&self, id: RecordId) -> StoreResult<T> {
        let files = self.files.read();
        let entries = read_entries(&files.index)?;
        let slot = find_live(&entries, id).ok_or(StoreError::NotFound { id })?;

        let plaintext = self.read_plaintext(&files, &entries[slot])?;
        ciborium::de::from_reader(plaintext.as_slice())
            .map_err(|e| StoreError::deserialization(e.to_string()))
    }

    /// Replaces the value stored under `id`.
    ///
    /// Returns `false` without touching the files if no live record
    /// exists. Otherwise the existing entry is tombstoned and the new
    /// value appended under the same identifier.
    ///
    /// The two steps are **not** atomic: a crash between them leaves the
    /// record deleted with no replacement.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Serialization`] if the value cannot be
    /// serialized; the existing record is left untouched in that case.
    pub fn update<T: Serialize>(&self, id: RecordId, value: &T, label: &str) -> StoreResult<bool> {
        if id.is_nil() {
            return Ok(false);
        }

        let mut files = self.files.write();
        let entries = read_entries(&files.index)?;
        let Some(slot) = find_live(&entries, id) else {
            return Ok(false);
        };

        // Serialize before tombstoning: a value that cannot be encoded
        // must leave the existing record untouched.
        let plaintext = serialize(value)?;

        self.tombstone_slot(&mut files, slot)?;
        self.append_record(&mut files, id, &plaintext, label)?;

        debug!(id = %id, "updated record");
        Ok(true)
    }

    /// Deletes the record stored under `id`.
    ///
    /// The live entry's identifier field is zeroed in place; the data
    /// log bytes become unreachable garbage until [`SaveStore::defrag`].
    /// Returns `false` if no live record exists - deleting twice is a
    /// no-op.
    pub fn delete(&self, id: RecordId) -> StoreResult<bool> {
        if id.is_nil() {
            return Ok(false);
        }

        let mut files = self.files.write();
        let entries = read_entries(&files.index)?;
        let Some(slot) = find_live(&entries, id) else {
            return Ok(false);
        };

        self.tombstone_slot(&mut files, slot)?;

        debug!(id = %id, "deleted record");
        Ok(true)
    }

    /// Lists every live record as `(id, label)`, oldest append first.
    pub fn list_all(&self) -> StoreResult<Vec<(RecordId, String)>> {
        let files = self.files.read();
        let entries = read_entries(&files.index)?;

        Ok(entries
            .iter()
            .filter(|e| !e.is_tombstone())
            .map(|e| (RecordId::from_bytes(e.id), e.label.clone()))
            .collect())
    }

    /// Returns whether a live record exists under `id`.
    pub fn contains(&self, id: RecordId) -> StoreResult<bool> {
        let files = self.files.read();
        let entries = read_entries(&files.index)?;
        Ok(find_live(&entries, id).is_some())
    }

    /// Returns the number of live records.
    pub fn count(&self) -> StoreResult<usize> {
        let files = self.files.read();
        let entries = read_entries(&files.index)?;
        Ok(entries.iter().filter(|e| !e.is_tombstone()).count())
    }

    /// Returns the raw index, tombstoned slots included.
    ///
    /// This is the inspection surface used by maintenance tooling; it
    /// exposes offsets and lengths but never payload bytes.
    pub fn index_entries(&self) -> StoreResult<Vec<IndexEntry>> {
        let files = self.files.read();
        read_entries(&files.index)
    }

    /// Decrypts and verifies every live record, returning how many were
    /// checked.
    ///
    /// # Errors
    ///
    /// Fails on the first record whose bytes do not verify.
    pub fn verify(&self) -> StoreResult<usize> {
        let files = self.files.read();
        let entries = read_entries(&files.index)?;

        let mut checked = 0usize;
        for entry in entries.iter().filter(|e| !e.is_tombstone()) {
            self.read_plaintext(&files, entry)?;
            checked += 1;
        }
        Ok(checked)
    }

    /// Compacts the store, physically reclaiming tombstoned and
    /// superseded records.
    ///
    /// Both files are rewritten to temporaries containing only live
    /// entries in their original relative order, with offsets recomputed
    /// for the compacted data log; the temporaries are then renamed over
    /// the originals and the parent directory fsynced. The exclusive
    /// lock is held for the entire duration, including the replace step.
    pub fn defrag(&self) -> StoreResult<DefragStats> {
        let mut files = self.files.write();
        let entries = read_entries(&files.index)?;
        let bytes_before = files.index.size()? + files.data.size()?;

        let index_tmp = sibling(&self.base, INDEX_TMP_SUFFIX);
        let data_tmp = sibling(&self.base, DATA_TMP_SUFFIX);
        let mut new_index = FileBackend::create(&index_tmp)?;
        let mut new_data = FileBackend::create(&data_tmp)?;

        let mut live_records = 0usize;
        for entry in &entries {
            if entry.is_tombstone() {
                continue;
            }
            let payload = read_payload_bytes(&files.data, entry)?;
            let offset = new_data.append(&payload)?;
            let rewritten = IndexEntry::new(entry.id, &entry.label, offset, entry.len);
            new_index.append(&rewritten.encode())?;
            live_records += 1;
        }

        new_data.sync()?;
        new_index.sync()?;
        let bytes_after = new_index.size()? + new_data.size()?;
        drop(new_index);
        drop(new_data);

        // Replace the data log first, then the index. Between the two
        // renames the old index describes a log that no longer exists,
        // which is why defrag owns the store exclusively through the
        // whole replace step.
        fs::rename(&data_tmp, sibling(&self.base, DATA_SUFFIX))?;
        fs::rename(&index_tmp, sibling(&self.base, INDEX_SUFFIX))?;
        sync_parent_dir(&self.base)?;

        files.data = FileBackend::open(&sibling(&self.base, DATA_SUFFIX))?;
        files.index = FileBackend::open(&sibling(&self.base, INDEX_SUFFIX))?;

        let stats = DefragStats {
            slots_scanned: entries.len(),
            live_records,
            reclaimed_bytes: bytes_before.saturating_sub(bytes_after),
        };
        info!(
            slots = stats.slots_scanned,
            live = stats.live_records,
            reclaimed = stats.reclaimed_bytes,
            "defrag complete"
        );
        Ok(stats)
    }

    /// Appends one protected record: data log first, index second.
    fn append_record(
        &self,
        files: &mut StoreFiles,
        id: RecordId,
        plaintext: &[u8],
        label: &str,
    ) -> StoreResult<()> {
        let (hash, ciphertext) = self.cipher.protect(plaintext)?;
        let record = DataRecord::new(hash.to_vec(), ciphertext);
        let encoded = record.encode();
        let len = u32::try_from(encoded.len())
            .map_err(|_| StoreError::serialization("record exceeds maximum encodable size"))?;

        // The data log append must be durable before the index entry
        // exists: a crash between the two leaves an orphaned tail, never
        // an index entry pointing at absent data.
        let offset = files.data.append(&encoded)?;
        files.data.flush()?;
        if self.options.sync_writes {
            files.data.sync()?;
        }

        let entry = IndexEntry::new(id.into_bytes(), label, offset, len);
        files.index.append(&entry.encode())?;
        files.index.flush()?;
        if self.options.sync_writes {
            files.index.sync()?;
        }

        debug!(id = %id, offset, len, "appended record");
        Ok(())
    }

    /// Zeroes the identifier field of the given slot in place.
    fn tombstone_slot(&self, files: &mut StoreFiles, slot: usize) -> StoreResult<()> {
        let offset = (slot * ENTRY_SIZE) as u64;
        files.index.write_at(offset, &TOMBSTONE_ID)?;
        files.index.flush()?;
        if self.options.sync_writes {
            files.index.sync()?;
        }
        Ok(())
    }

    /// Reads, decodes, decrypts and verifies one record's payload.
    fn read_plaintext(&self, files: &StoreFiles, entry: &IndexEntry) -> StoreResult<Vec<u8>> {
        let bytes = read_payload_bytes(&files.data, entry)?;
        let record = DataRecord::decode(&bytes)?;
        self.cipher.unprotect(&record.hash, &record.ciphertext)
    }
}

impl std::fmt::Debug for SaveStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStore")
            .field("base", &self.base)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Appends a suffix to a base path without replacing its extension.
fn sibling(base: &Path, suffix: &str) -> PathBuf {
    let mut os: OsString = base.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Reads and decodes the whole index.
fn read_entries<B: StorageBackend>(index: &B) -> StoreResult<Vec<IndexEntry>> {
    let size = index.size()?;
    if size % ENTRY_SIZE as u64 != 0 {
        return Err(index_width_corruption(size));
    }

    let bytes = index.read_at(0, size as usize)?;
    bytes
        .chunks_exact(ENTRY_SIZE)
        .map(|chunk| IndexEntry::decode(chunk).map_err(StoreError::from))
        .collect()
}

/// Finds the slot of the last live entry matching `id`.
fn find_live(entries: &[IndexEntry], id: RecordId) -> Option<usize> {
    let bytes = id.into_bytes();
    entries
        .iter()
        .rposition(|e| !e.is_tombstone() && e.id == bytes)
}

/// Reads a record's raw on-disk payload, mapping an out-of-range read to
/// the corruption it actually signals.
fn read_payload_bytes<B: StorageBackend>(data: &B, entry: &IndexEntry) -> StoreResult<Vec<u8>> {
    data.read_at(entry.offset, entry.len as usize)
        .map_err(|e| match e {
            StorageError::ReadPastEnd { .. } => {
                StoreError::corruption("index entry points past end of data log")
            }
            other => StoreError::Storage(other),
        })
}

fn index_width_corruption(size: u64) -> StoreError {
    StoreError::corruption(format!(
        "index length {size} is not a multiple of the {ENTRY_SIZE}-byte slot width"
    ))
}

/// Fsyncs the directory containing the store files so renames survive a
/// crash. Directory fsync is a Unix notion; NTFS journals metadata.
#[cfg(unix)]
fn sync_parent_dir(base: &Path) -> StoreResult<()> {
    let parent = match base.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let dir = File::open(parent)?;
    dir.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_parent_dir(_base: &Path) -> StoreResult<()> {
    Ok(())
}

/// Serializes a value to its canonical payload bytes.
fn serialize<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| StoreError::serialization(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use savevault_storage::InMemoryBackend;
    use serde::Deserialize;
    use std::io::{Seek, SeekFrom, Write};
    use std::sync::Arc;
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hero {
        name: String,
        hp: i32,
        inventory: Vec<String>,
    }

    fn hero(name: &str) -> Hero {
        Hero {
            name: name.to_string(),
            hp: 100,
            inventory: vec!["sword".into(), "potion".into()],
        }
    }

    fn test_key() -> EncryptionKey {
        EncryptionKey::from_bytes(&[7u8; 32]).unwrap()
    }

    fn open_store(dir: &TempDir) -> SaveStore {
        SaveStore::open(dir.path().join("save"), test_key()).unwrap()
    }

    #[test]
    fn round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let value = hero("Aria");
        let id = store.add(&value, "first save").unwrap();

        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded, value);
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let result: StoreResult<Hero> = store.get(RecordId::new());
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn add_with_explicit_id() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = RecordId::new();
        store.add_with_id(id, &hero("Bram"), "explicit").unwrap();

        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded.name, "Bram");
    }

    #[test]
    fn add_with_live_id_fails() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = RecordId::new();
        store.add_with_id(id, &hero("Bram"), "").unwrap();

        let result = store.add_with_id(id, &hero("Bram II"), "");
        assert!(matches!(result, Err(StoreError::IdAlreadyLive { .. })));
    }

    #[test]
    fn add_with_nil_id_fails() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let result = store.add_with_id(RecordId::from_bytes([0u8; 16]), &hero("Nil"), "");
        assert!(matches!(result, Err(StoreError::InvalidRecordId)));
    }

    #[test]
    fn deleted_id_can_be_reused() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = RecordId::new();
        store.add_with_id(id, &hero("First"), "").unwrap();
        assert!(store.delete(id).unwrap());

        store.add_with_id(id, &hero("Second"), "").unwrap();
        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded.name, "Second");
    }

    #[test]
    fn update_shadows_previous_value() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.add(&hero("v1"), "save").unwrap();
        assert!(store.update(id, &hero("v2"), "save").unwrap());

        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded.name, "v2");

        // Exactly one live entry for the id
        let live: Vec<_> = store
            .list_all()
            .unwrap()
            .into_iter()
            .filter(|(listed, _)| *listed == id)
            .collect();
        assert_eq!(live.len(), 1);

        // The superseded slot is still on disk, tombstoned
        let entries = store.index_entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_tombstone());
    }

    #[test]
    fn update_missing_returns_false() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        assert!(!store.update(RecordId::new(), &hero("ghost"), "").unwrap());
        assert_eq!(store.index_entries().unwrap().len(), 0);
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.add(&hero("doomed"), "doomed").unwrap();
        assert!(store.delete(id).unwrap());

        let result: StoreResult<Hero> = store.get(id);
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.add(&hero("once"), "").unwrap();
        assert!(store.delete(id).unwrap());

        let before = store.index_entries().unwrap();
        assert!(!store.delete(id).unwrap());
        let after = store.index_entries().unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn list_all_in_append_order() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id1 = store.add(&hero("a"), "first").unwrap();
        let id2 = store.add(&hero("b"), "second").unwrap();
        let id3 = store.add(&hero("c"), "third").unwrap();

        let listed = store.list_all().unwrap();
        assert_eq!(
            listed,
            vec![
                (id1, "first".to_string()),
                (id2, "second".to_string()),
                (id3, "third".to_string()),
            ]
        );
    }

    #[test]
    fn contains_and_count() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id = store.add(&hero("here"), "").unwrap();
        assert!(store.contains(id).unwrap());
        assert!(!store.contains(RecordId::new()).unwrap());
        assert_eq!(store.count().unwrap(), 1);

        store.delete(id).unwrap();
        assert!(!store.contains(id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn long_label_is_truncated_in_listing() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let long = "L".repeat(200);
        let id = store.add(&hero("x"), &long).unwrap();

        let listed = store.list_all().unwrap();
        assert_eq!(listed, vec![(id, "L".repeat(64))]);
    }

    #[test]
    fn defrag_preserves_semantics() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id1 = store.add(&hero("keep1"), "keep1").unwrap();
        let id2 = store.add(&hero("drop"), "drop").unwrap();
        let id3 = store.add(&hero("keep2"), "keep2").unwrap();
        store.update(id3, &hero("keep2-v2"), "keep2").unwrap();
        store.delete(id2).unwrap();

        let listed_before = store.list_all().unwrap();
        let index_size_before = std::fs::metadata(dir.path().join("save.idx")).unwrap().len();
        let data_size_before = std::fs::metadata(dir.path().join("save.dat")).unwrap().len();

        // Slots: id1, id2, id3, and the re-appended id3 after update.
        let stats = store.defrag().unwrap();
        assert_eq!(stats.slots_scanned, 4);
        assert_eq!(stats.live_records, 2);
        assert!(stats.reclaimed_bytes > 0);

        assert_eq!(store.list_all().unwrap(), listed_before);
        let loaded1: Hero = store.get(id1).unwrap();
        assert_eq!(loaded1.name, "keep1");
        let loaded3: Hero = store.get(id3).unwrap();
        assert_eq!(loaded3.name, "keep2-v2");

        let index_size_after = std::fs::metadata(dir.path().join("save.idx")).unwrap().len();
        let data_size_after = std::fs::metadata(dir.path().join("save.dat")).unwrap().len();
        assert!(index_size_after < index_size_before);
        assert!(data_size_after < data_size_before);
        assert_eq!(index_size_after % ENTRY_SIZE as u64, 0);
    }

    #[test]
    fn defrag_of_empty_store() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let stats = store.defrag().unwrap();
        assert_eq!(stats.slots_scanned, 0);
        assert_eq!(stats.live_records, 0);
    }

    #[test]
    fn records_survive_reopen() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("save");

        let id = {
            let store = SaveStore::open(&base, test_key()).unwrap();
            store.add(&hero("persisted"), "keep").unwrap()
        };

        let store = SaveStore::open(&base, test_key()).unwrap();
        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded.name, "persisted");
    }

    #[test]
    fn wrong_key_never_returns_data() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("save");

        let id = {
            let store = SaveStore::open(&base, test_key()).unwrap();
            store.add(&hero("secret"), "").unwrap()
        };

        let store = SaveStore::open(&base, EncryptionKey::from_bytes(&[9u8; 32]).unwrap()).unwrap();
        let result: StoreResult<Hero> = store.get(id);
        assert!(matches!(result, Err(StoreError::DecryptionFailed { .. })));
    }

    #[test]
    fn second_handle_is_locked_out() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("save");

        let _store = SaveStore::open(&base, test_key()).unwrap();
        let result = SaveStore::open(&base, test_key());
        assert!(matches!(result, Err(StoreError::StoreLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("save");

        {
            let _store = SaveStore::open(&base, test_key()).unwrap();
        }
        assert!(SaveStore::open(&base, test_key()).is_ok());
    }

    /// Flips one byte of the data log at the given file offset.
    fn flip_data_byte(dir: &TempDir, offset: u64) {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(dir.path().join("save.dat"))
            .unwrap();
        file.seek(SeekFrom::Start(offset)).unwrap();
        let mut byte = [0u8; 1];
        std::io::Read::read_exact(&mut file, &mut byte).unwrap();
        file.seek(SeekFrom::Start(offset)).unwrap();
        file.write_all(&[byte[0] ^ 0x01]).unwrap();
    }

    #[test]
    fn tampered_hash_is_detected() {
        let dir = tempdir().unwrap();
        let id;
        {
            let store = open_store(&dir);
            id = store.add(&hero("tamper"), "").unwrap();
        }

        // Record layout: [hash_len 4B][hash 32B][ct_len 4B][ct ...].
        // Byte 10 sits inside the stored hash.
        flip_data_byte(&dir, 10);

        let store = open_store(&dir);
        let result: StoreResult<Hero> = store.get(id);
        assert!(matches!(result, Err(StoreError::IntegrityMismatch)));
    }

    #[test]
    fn tampered_ciphertext_is_detected() {
        let dir = tempdir().unwrap();
        let id;
        let data_len;
        {
            let store = open_store(&dir);
            id = store.add(&hero("tamper"), "").unwrap();
            data_len = std::fs::metadata(dir.path().join("save.dat")).unwrap().len();
        }

        // Last byte of the record is inside the GCM tag.
        flip_data_byte(&dir, data_len - 1);

        let store = open_store(&dir);
        let result: StoreResult<Hero> = store.get(id);
        assert!(matches!(result, Err(StoreError::DecryptionFailed { .. })));
    }

    #[test]
    fn misaligned_index_is_corruption() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.add(&hero("x"), "").unwrap();
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("save.idx"))
            .unwrap();
        file.write_all(&[0u8; 10]).unwrap();
        drop(file);

        let result = SaveStore::open(dir.path().join("save"), test_key());
        assert!(matches!(result, Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn orphaned_data_tail_is_ignored_and_reclaimed() {
        let dir = tempdir().unwrap();
        let id;
        {
            let store = open_store(&dir);
            id = store.add(&hero("survivor"), "keep").unwrap();
        }

        // Simulate a crash after a data append but before the index
        // append: unreferenced bytes at the end of the log.
        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("save.dat"))
            .unwrap();
        file.write_all(&[0xEE; 300]).unwrap();
        drop(file);

        let store = open_store(&dir);
        let loaded: Hero = store.get(id).unwrap();
        assert_eq!(loaded.name, "survivor");

        let size_with_tail = std::fs::metadata(dir.path().join("save.dat")).unwrap().len();
        let stats = store.defrag().unwrap();
        assert!(stats.reclaimed_bytes >= 300);
        let size_after = std::fs::metadata(dir.path().join("save.dat")).unwrap().len();
        assert!(size_after + 300 <= size_with_tail);

        let reloaded: Hero = store.get(id).unwrap();
        assert_eq!(reloaded.name, "survivor");
    }

    #[test]
    fn truncated_data_log_is_corruption() {
        let dir = tempdir().unwrap();
        let id;
        {
            let store = open_store(&dir);
            id = store.add(&hero("cut short"), "").unwrap();
        }

        let path = dir.path().join("save.dat");
        let len = std::fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 5).unwrap();
        drop(file);

        let store = open_store(&dir);
        let result: StoreResult<Hero> = store.get(id);
        assert!(matches!(result, Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn verify_checks_every_live_record() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        store.add(&hero("a"), "").unwrap();
        let id = store.add(&hero("b"), "").unwrap();
        store.add(&hero("c"), "").unwrap();
        store.delete(id).unwrap();

        assert_eq!(store.verify().unwrap(), 2);
    }

    #[test]
    fn verify_fails_on_tampered_record() {
        let dir = tempdir().unwrap();
        {
            let store = open_store(&dir);
            store.add(&hero("t"), "").unwrap();
        }

        flip_data_byte(&dir, 10);

        let store = open_store(&dir);
        assert!(store.verify().is_err());
    }

    #[test]
    fn concurrent_readers_all_succeed() {
        let dir = tempdir().unwrap();
        let store = Arc::new(open_store(&dir));

        let ids: Vec<RecordId> = (0..8)
            .map(|i| store.add(&hero(&format!("hero-{i}")), "").unwrap())
            .collect();

        std::thread::scope(|s| {
            for (i, id) in ids.iter().enumerate() {
                let store = Arc::clone(&store);
                let id = *id;
                s.spawn(move || {
                    for _ in 0..10 {
                        let loaded: Hero = store.get(id).unwrap();
                        assert_eq!(loaded.name, format!("hero-{i}"));
                    }
                });
            }
        });
    }

    #[test]
    fn missing_store_without_create() {
        let dir = tempdir().unwrap();
        let options = StoreOptions::new().create_if_missing(false);

        let result = SaveStore::open_with_options(dir.path().join("absent"), test_key(), options);
        assert!(matches!(result, Err(StoreError::StoreMissing { .. })));
    }

    #[test]
    fn unserializable_value_writes_nothing() {
        use serde::ser::Error as _;

        struct Unserializable;

        impl Serialize for Unserializable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(S::Error::custom("deliberately unserializable"))
            }
        }

        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let result = store.add(&Unserializable, "nope");
        assert!(matches!(result, Err(StoreError::Serialization { .. })));
        assert_eq!(store.index_entries().unwrap().len(), 0);
        assert_eq!(
            std::fs::metadata(dir.path().join("save.dat")).unwrap().len(),
            0
        );
    }

    #[test]
    fn misaligned_index_bytes_are_corruption() {
        let backend = InMemoryBackend::with_data(vec![0u8; ENTRY_SIZE + 1]);
        let result = read_entries(&backend);
        assert!(matches!(result, Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn payload_past_data_end_is_corruption() {
        let backend = InMemoryBackend::with_data(vec![0u8; 10]);
        let entry = IndexEntry::new([1u8; 16], "dangling", 0, 100);

        let result = read_payload_bytes(&backend, &entry);
        assert!(matches!(result, Err(StoreError::Corruption { .. })));
    }

    #[test]
    fn end_to_end_scenario() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Named {
            name: String,
        }

        let dir = tempdir().unwrap();
        let store = open_store(&dir);

        let id1 = store.add(&Named { name: "A".into() }, "first").unwrap();
        let id2 = store.add(&Named { name: "B".into() }, "second").unwrap();

        assert!(store.delete(id1).unwrap());

        assert_eq!(store.list_all().unwrap(), vec![(id2, "second".to_string())]);

        let gone: StoreResult<Named> = store.get(id1);
        assert!(matches!(gone, Err(StoreError::NotFound { .. })));

        let b: Named = store.get(id2).unwrap();
        assert_eq!(b, Named { name: "B".into() });
    }
}
