//! Fixed-width index entry codec.

use crate::error::{CodecError, CodecResult};

/// Width of the identifier field in bytes (128-bit id).
pub const ID_SIZE: usize = 16;
/// Byte budget for the zero-padded UTF-8 label field.
pub const LABEL_SIZE: usize = 64;
/// Total fixed width of one index slot:
/// id (16) + label (64) + offset (8) + length (4) = 92.
pub const ENTRY_SIZE: usize = ID_SIZE + LABEL_SIZE + 8 + 4;

/// The reserved all-zero identifier marking a tombstoned slot.
pub const TOMBSTONE_ID: [u8; ID_SIZE] = [0u8; ID_SIZE];

/// One fixed-width slot in the index file.
///
/// An entry locates a single logical record's payload in the data log.
/// Entries are append-only; deletion zeroes the identifier field in place
/// rather than removing the slot.
///
/// The label is advisory, not a key: it is truncated to [`LABEL_SIZE`]
/// bytes on write (at a character boundary, so stored labels stay valid
/// UTF-8) and data loss on truncation is accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// 128-bit record identifier; all-zero means tombstoned.
    pub id: [u8; ID_SIZE],
    /// Human-readable label, already truncated to the field budget.
    pub label: String,
    /// Byte offset of the record's payload in the data log.
    pub offset: u64,
    /// Total encoded length of the payload in the data log.
    pub len: u32,
}

impl IndexEntry {
    /// Creates an entry, truncating the label to [`LABEL_SIZE`] bytes.
    #[must_use]
    pub fn new(id: [u8; ID_SIZE], label: &str, offset: u64, len: u32) -> Self {
        Self {
            id,
            label: truncate_label(label).to_string(),
            offset,
            len,
        }
    }

    /// Returns whether this slot has been tombstoned.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.id == TOMBSTONE_ID
    }

    /// Encodes the entry to its fixed-width on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        buf[..ID_SIZE].copy_from_slice(&self.id);

        let label = truncate_label(&self.label).as_bytes();
        buf[ID_SIZE..ID_SIZE + label.len()].copy_from_slice(label);
        // remaining label bytes stay zero-padded

        buf[80..88].copy_from_slice(&self.offset.to_le_bytes());
        buf[88..92].copy_from_slice(&self.len.to_le_bytes());
        buf
    }

    /// Decodes an entry from exactly [`ENTRY_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEntrySize`] if the slice is not
    /// exactly one slot wide.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() != ENTRY_SIZE {
            return Err(CodecError::InvalidEntrySize {
                expected: ENTRY_SIZE,
                actual: bytes.len(),
            });
        }

        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&bytes[..ID_SIZE]);

        let label = decode_label(&bytes[ID_SIZE..ID_SIZE + LABEL_SIZE]);

        let offset = u64::from_le_bytes([
            bytes[80], bytes[81], bytes[82], bytes[83], bytes[84], bytes[85], bytes[86], bytes[87],
        ]);
        let len = u32::from_le_bytes([bytes[88], bytes[89], bytes[90], bytes[91]]);

        Ok(Self {
            id,
            label,
            offset,
            len,
        })
    }
}

/// Truncates a label to [`LABEL_SIZE`] bytes at a character boundary.
fn truncate_label(label: &str) -> &str {
    if label.len() <= LABEL_SIZE {
        return label;
    }
    let mut end = LABEL_SIZE;
    while !label.is_char_boundary(end) {
        end -= 1;
    }
    &label[..end]
}

/// Decodes the zero-padded label field.
///
/// Trailing zero bytes are padding, not label content. Invalid UTF-8 is
/// replaced lossily - the label is advisory.
fn decode_label(field: &[u8]) -> String {
    let end = field
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |pos| pos + 1);
    String::from_utf8_lossy(&field[..end]).into_owned()
}
