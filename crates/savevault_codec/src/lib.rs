//! # savevault codec
//!
//! Deterministic binary layout for the two savevault files.
//!
//! This crate owns the on-disk formats and nothing else - no I/O, no
//! crypto, no knowledge of what the ciphertext contains.
//!
//! ## Index file
//!
//! A sequence of fixed-width [`IndexEntry`] slots ([`ENTRY_SIZE`] bytes
//! each). An index file whose length is not a whole multiple of
//! [`ENTRY_SIZE`] is corrupt. A slot whose 16-byte identifier field is
//! all zero is a tombstone.
//!
//! ## Data log
//!
//! A sequence of variable-width [`DataRecord`]s, each laid out as
//! `[hash length: u32][hash bytes][ciphertext length: u32][ciphertext]`.
//! Records are addressed by byte offset; the index entry stores both the
//! offset and the record's total encoded length.
//!
//! ## Endianness
//!
//! Every multi-byte integer in both formats is **little-endian**.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod data;
mod error;
mod index;

pub use data::DataRecord;
pub use error::{CodecError, CodecResult};
pub use index::{IndexEntry, ENTRY_SIZE, ID_SIZE, LABEL_SIZE, TOMBSTONE_ID};
