//! # savevault storage
//!
//! Byte-store backends for the savevault record store.
//!
//! This crate provides the lowest-level storage abstraction for savevault.
//! Backends are **opaque byte stores** - they do not interpret the data
//! they hold. The index-file and data-log formats are owned entirely by
//! the layers above.
//!
//! ## Design Principles
//!
//! - Backends are simple byte stores (read, append, patch, flush)
//! - No knowledge of index entries, data records, or encryption
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral storage
//! - [`FileBackend`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use savevault_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"hello world").unwrap();
//! let data = backend.read_at(offset, 11).unwrap();
//! assert_eq!(&data, b"hello world");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
