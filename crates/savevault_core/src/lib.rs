//! # savevault core
//!
//! A secure indexed record store: serializable values persisted under
//! 128-bit identifiers, encrypted at rest and integrity-checked on read.
//!
//! Two files per store, named by a caller-supplied base path:
//!
//! - `<base>.dat` - append-only data log of encrypted, hash-tagged
//!   payloads, addressed by byte offset
//! - `<base>.idx` - fixed-width index mapping identifiers to their
//!   payload's offset and length, with tombstone-based deletion
//!
//! The [`SaveStore`] coordinator composes the two files with a
//! hash-then-encrypt pipeline: payloads are SHA-256 hashed, then
//! AES-256-GCM encrypted; reads decrypt first and verify the recomputed
//! digest before any data is returned.
//!
//! ## Example
//!
//! ```rust,no_run
//! use savevault_core::{EncryptionKey, SaveStore};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Hero { name: String, hp: u32 }
//!
//! # fn main() -> Result<(), savevault_core::StoreError> {
//! let store = SaveStore::open("saves/campaign", EncryptionKey::generate())?;
//! let id = store.add(&Hero { name: "Aria".into(), hp: 40 }, "first run")?;
//! let hero: Hero = store.get(id)?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crypto;
mod error;
mod id;
mod options;
mod store;

pub use crypto::{EncryptionKey, RecordCipher, HASH_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{StoreError, StoreResult};
pub use id::RecordId;
pub use options::StoreOptions;
pub use store::{DefragStats, SaveStore};

// The raw index slot type is part of the inspection surface.
pub use savevault_codec::IndexEntry;
