//! # Keyward Storage
//!
//! Storage abstraction layer for Keyward backends.
//!
//! Provides the [`StorageBackend`] trait, an in-memory backend, the
//! [`BufferedBackend`] overlay that turns one request into an all-or-nothing
//! unit, and the sequenced collections every custody entity is stored in.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod buffer;
pub mod collection;
pub mod error;
pub mod memory;
pub mod page;

pub use backend::{StorageBackend, WriteOp};
pub use buffer::BufferedBackend;
pub use collection::{IdSet, SeqCollection, Sequence};
pub use error::StorageError;
pub use memory::MemoryBackend;
pub use page::{PageRequest, PageResponse};
