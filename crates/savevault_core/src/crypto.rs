//! Hash-then-encrypt pipeline for persisted payloads.
//!
//! Every payload is protected in two layers:
//!
//! 1. A SHA-256 digest of the **plaintext** serialized payload, stored
//!    alongside the ciphertext in the data log.
//! 2. AES-256-GCM encryption of the plaintext under the store's key,
//!    with a fresh random nonce per record, nonce prepended.
//!
//! Reads follow the decrypt-then-verify discipline: decrypt first,
//! recompute the digest over the decrypted plaintext, and compare it to
//! the stored hash in constant time. Any mismatch is a hard failure and
//! no plaintext is returned.

use crate::error::{StoreError, StoreResult};
use aes_gcm::{
    aead::{generic_array::GenericArray, Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;
/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;
/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
/// Size of the SHA-256 payload digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Encryption key for a store.
///
/// Key material is injected at store open time - there is no baked-in
/// process-wide key. The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Generates a new random encryption key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Creates a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(StoreError::invalid_key_size(bytes.len(), KEY_SIZE));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        key_bytes.copy_from_slice(bytes);
        Ok(Self { bytes: key_bytes })
    }

    /// Returns the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this method - don't log or serialize the result.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Derives a key from a passphrase using HKDF-SHA256.
    ///
    /// The same passphrase and salt always derive the same key, so a
    /// store can be reopened without persisting key material.
    ///
    /// # Security Note
    ///
    /// HKDF is a key derivation function, not a password hashing
    /// function. It is appropriate when the input already has high
    /// entropy (a generated passphrase); for weak user-chosen passwords,
    /// prefer Argon2id or PBKDF2 upstream of this call.
    pub fn derive_from_passphrase(passphrase: &[u8], salt: &[u8]) -> StoreResult<Self> {
        use hkdf::Hkdf;

        let hk = Hkdf::<Sha256>::new(Some(salt), passphrase);

        let mut bytes = [0u8; KEY_SIZE];
        hk.expand(b"savevault-record-key-v1", &mut bytes)
            .map_err(|_| StoreError::key_derivation_failed("HKDF expand failed"))?;

        Ok(Self { bytes })
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Protects and unprotects record payloads.
///
/// `protect` produces the (hash, ciphertext) pair the data log stores;
/// `unprotect` reverses it, refusing to return plaintext that fails
/// either the AEAD tag or the stored-digest comparison.
pub struct RecordCipher {
    cipher: Aes256Gcm,
}

impl RecordCipher {
    /// Creates a cipher from the given key.
    #[must_use]
    pub fn new(key: EncryptionKey) -> Self {
        // Infallible: EncryptionKey is always exactly KEY_SIZE (32)
        // bytes, AES-256's key size.
        let key_array = GenericArray::from_slice(key.as_bytes());
        let cipher = Aes256Gcm::new(key_array);
        Self { cipher }
    }

    /// Hashes then encrypts a plaintext payload.
    ///
    /// Returns the SHA-256 digest of the plaintext and the ciphertext in
    /// `nonce (12 bytes) || ct || tag (16 bytes)` form.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn protect(&self, plaintext: &[u8]) -> StoreResult<([u8; HASH_SIZE], Vec<u8>)> {
        let hash: [u8; HASH_SIZE] = Sha256::digest(plaintext).into();

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| StoreError::encryption_failed("encryption error"))?;

        let mut framed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        framed.extend_from_slice(&nonce_bytes);
        framed.extend(ciphertext);

        Ok((hash, framed))
    }

    /// Decrypts a payload and verifies it against the stored hash.
    ///
    /// Decrypt-then-verify: the digest is recomputed over the decrypted
    /// plaintext and compared to `hash` in constant time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DecryptionFailed`] if the AEAD rejects the
    /// ciphertext (wrong key or tampered bytes), and
    /// [`StoreError::IntegrityMismatch`] if decryption succeeds but the
    /// recomputed digest differs from the stored one.
    pub fn unprotect(&self, hash: &[u8], ciphertext: &[u8]) -> StoreResult<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StoreError::decryption_failed("ciphertext too short"));
        }

        let nonce = Nonce::from_slice(&ciphertext[..NONCE_SIZE]);
        let plaintext = self
            .cipher
            .decrypt(nonce, &ciphertext[NONCE_SIZE..])
            .map_err(|_| StoreError::decryption_failed("decryption error"))?;

        let computed: [u8; HASH_SIZE] = Sha256::digest(&plaintext).into();
        if !bool::from(computed.as_slice().ct_eq(hash)) {
            return Err(StoreError::IntegrityMismatch);
        }

        Ok(plaintext)
    }
}

impl std::fmt::Debug for RecordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCipher")
            .field("cipher", &"Aes256Gcm")
            .finish()
    }
}
