//! Error types for the record store.

use crate::id::RecordId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// `NotFound` (and the boolean returns of `update`/`delete`) are the only
/// soft outcomes; every other variant is fatal for the operation in
/// progress. Integrity and corruption failures mean the persisted store
/// may be unsafe to keep using without manual inspection - the store
/// never attempts automatic repair.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] savevault_storage::StorageError),

    /// Binary codec error. The on-disk bytes are malformed.
    #[error("codec error: {0}")]
    Codec(#[from] savevault_codec::CodecError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The value could not be serialized; nothing was written.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
    },

    /// The decrypted payload could not be deserialized into the
    /// requested type.
    #[error("deserialization failed: {message}")]
    Deserialization {
        /// Description of the failure.
        message: String,
    },

    /// Encryption failed.
    #[error("encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed (wrong key, or ciphertext tampered).
    #[error("decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The decrypted payload's recomputed digest does not match the
    /// stored hash: the record was tampered with or corrupted.
    #[error("integrity check failed: tampered or corrupted record")]
    IntegrityMismatch,

    /// The index file or data log is structurally damaged.
    #[error("store corruption: {message}")]
    Corruption {
        /// Description of the corruption.
        message: String,
    },

    /// No live record exists under the requested identifier.
    #[error("record not found: {id}")]
    NotFound {
        /// The identifier that was looked up.
        id: RecordId,
    },

    /// A live record already exists under the supplied identifier.
    #[error("record already live: {id}")]
    IdAlreadyLive {
        /// The identifier that collided.
        id: RecordId,
    },

    /// The all-zero identifier is reserved as the tombstone marker.
    #[error("the nil record id is reserved")]
    InvalidRecordId,

    /// Key material had the wrong length.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes.
        expected: usize,
        /// Actual size in bytes.
        actual: usize,
    },

    /// Key derivation failed.
    #[error("key derivation failed: {message}")]
    KeyDerivationFailed {
        /// Description of the failure.
        message: String,
    },

    /// The store does not exist and `create_if_missing` was disabled.
    #[error("store does not exist: {path}", path = .path.display())]
    StoreMissing {
        /// The missing index file path.
        path: PathBuf,
    },

    /// Another handle holds the store's exclusive lock.
    #[error("store locked: another handle has exclusive access")]
    StoreLocked,
}

impl StoreError {
    /// Creates a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization {
            message: message.into(),
        }
    }

    /// Creates an encryption failed error.
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a decryption failed error.
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self::Corruption {
            message: message.into(),
        }
    }

    /// Creates an invalid key size error.
    pub fn invalid_key_size(actual: usize, expected: usize) -> Self {
        Self::InvalidKeySize { expected, actual }
    }

    /// Creates a key derivation failed error.
    pub fn key_derivation_failed(message: impl Into<String>) -> Self {
        Self::KeyDerivationFailed {
            message: message.into(),
        }
    }
}
