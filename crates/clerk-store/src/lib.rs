//! # clerk-store
//!
//! File persistence for an in-memory aggregate, for small processes that
//! keep their state in memory and write rarely.
//!
//! ## Key Concepts
//!
//! - **Store**: binds one aggregate to one file ([`Store`])
//! - **Save**: atomic temp-file-then-rename write of the whole aggregate
//! - **Rebase**: reload the file into the aggregate, overwriting memory
//! - **Migration**: one-shot transform from an older schema, gated on the
//!   file's last-modified stamp ([`Store::migrate`])
//!
//! Concurrency is handled by a reader-writer lock: [`Store::read`] for
//! shared access and [`Store::lock`] for exclusive access. There is no
//! cross-process locking; two processes on one path will race on the temp
//! file.

pub mod codec;
pub mod error;
pub mod lock;
pub mod migration;
pub mod persistence;
pub mod store;

pub use codec::{Codec, JsonCodec};
pub use error::{CodecError, MigrationError, Result, StoreError};
pub use lock::{ReadGuard, WriteGuard};
pub use migration::{parse_threshold, THRESHOLD_FORMAT};
pub use store::{Store, StoreBuilder, StoreOptions, DEFAULT_TEMP_SUFFIX};
