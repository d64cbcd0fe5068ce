//! Error taxonomy shared by every store operation.

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;

/// Boxed error produced by a [`Codec`](crate::codec::Codec).
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed error returned by a migration transform.
pub type MigrationError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store has no backing path yet.
    #[error("store not initialized")]
    NotInitialized,

    /// `init` was called on a store that is already bound.
    #[error("store already initialized with {}", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// The file was modified at or after the migration threshold.
    #[error("data in file (updated {recorded}) is not older than migration timestamp {threshold}")]
    StaleMigration {
        threshold: DateTime<FixedOffset>,
        recorded: DateTime<Utc>,
    },

    #[error("invalid migration timestamp {input:?}: {source}")]
    TimestampParse {
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("migration transform failed: {0}")]
    Transform(#[source] MigrationError),

    /// A non-empty path that names no file, such as `/` or `..`.
    #[error("cannot bind store to {}: path has no file name", path.display())]
    InvalidPath { path: PathBuf },

    #[error("invalid store options: {0}")]
    InvalidOptions(String),
}

impl StoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// True for the recoverable "migration already applied" condition.
    pub fn is_stale_migration(&self) -> bool {
        matches!(self, StoreError::StaleMigration { .. })
    }
}
