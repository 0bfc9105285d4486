//! Length-prefixed data log record codec.

use crate::error::{CodecError, CodecResult};

/// Width of each length prefix in bytes.
const LEN_PREFIX_SIZE: usize = 4;

/// Sanity cap on the hash length prefix. SHA-256 digests are 32 bytes;
/// the cap leaves room for larger digests without letting a corrupt
/// prefix drive a huge allocation.
const MAX_HASH_LEN: u32 = 64;

/// Sanity cap on the ciphertext length prefix (256 MB).
const MAX_CIPHERTEXT_LEN: u32 = 256 * 1024 * 1024;

/// One variable-width record in the data log.
///
/// On-disk layout, all integers little-endian:
///
/// ```text
/// [hash length: u32][hash bytes][ciphertext length: u32][ciphertext bytes]
/// ```
///
/// The hash is a digest of the *plaintext* payload, computed before
/// encryption; the codec does not interpret either field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRecord {
    /// Digest of the plaintext payload.
    pub hash: Vec<u8>,
    /// Encrypted payload bytes.
    pub ciphertext: Vec<u8>,
}

impl DataRecord {
    /// Creates a record from its two components.
    #[must_use]
    pub fn new(hash: Vec<u8>, ciphertext: Vec<u8>) -> Self {
        Self { hash, ciphertext }
    }

    /// Returns the total encoded length of this record.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        LEN_PREFIX_SIZE + self.hash.len() + LEN_PREFIX_SIZE + self.ciphertext.len()
    }

    /// Encodes the record for appending to the data log.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&(self.hash.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.hash);
        buf.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.ciphertext);
        buf
    }

    /// Decodes a record from the exact byte range the index points at.
    ///
    /// Both length prefixes are read and validated; the slice must be
    /// consumed exactly. Under- or over-long input means the index entry
    /// and the data log disagree, which is file corruption.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`], [`CodecError::TrailingBytes`]
    /// or [`CodecError::LengthOutOfRange`] on malformed input.
    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut cursor = Cursor::new(bytes);

        let hash_len = cursor.read_u32()?;
        if hash_len > MAX_HASH_LEN {
            return Err(CodecError::LengthOutOfRange {
                field: "hash",
                len: hash_len,
                max: MAX_HASH_LEN,
            });
        }
        let hash = cursor.read_bytes(hash_len as usize)?;

        let ciphertext_len = cursor.read_u32()?;
        if ciphertext_len > MAX_CIPHERTEXT_LEN {
            return Err(CodecError::LengthOutOfRange {
                field: "ciphertext",
                len: ciphertext_len,
                max: MAX_CIPHERTEXT_LEN,
            });
        }
        let ciphertext = cursor.read_bytes(ciphertext_len as usize)?;

        let extra = cursor.remaining();
        if extra != 0 {
            return Err(CodecError::TrailingBytes { extra });
        }

        Ok(Self { hash, ciphertext })
    }
}

/// Minimal cursor over a byte slice.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        let bytes = self.read_bytes(LEN_PREFIX_SIZE)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_bytes(&mut self, len: usize) -> CodecResult<Vec<u8>> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let out = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(out)
    }
}
