//! File I/O for a single persisted aggregate.
//!
//! # File Layout
//!
//! ```text
//! <dir>/
//! ├── data.json     # live file, replaced atomically on every save
//! └── data.json~    # temp file, only visible while a save is in flight
//! ```
//!
//! # Atomic Writes
//!
//! 1. Write to `data.json~`
//! 2. Rename to `data.json` (atomic on the same filesystem)
//!
//! A crash before step 2 leaves the live file untouched.
//!
//! # Record Format
//!
//! The codec sees an envelope rather than the bare aggregate:
//!
//! ```json
//! { "updated_at": "2024-05-01T10:00:00Z", "data": { ... } }
//! ```
//!
//! `updated_at` is what the migration gate compares against. Both fields
//! default when absent, so any schema version can read any other version's
//! envelope.

pub mod atomic;
pub mod rebase;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use atomic::write_atomic;
pub use rebase::{read_record, read_stamp, remove_file};

/// In-memory aggregate plus its last-modified stamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: DeserializeOwned + Default"))]
pub struct Record<T> {
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub data: T,
}

impl<T> Record<T> {
    pub fn new(data: T) -> Self {
        Self {
            updated_at: unix_epoch(),
            data,
        }
    }

    /// Stamp the record as modified now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Just the stamp of a record, for reading files whose `data` may be in a
/// schema the caller cannot decode.
#[derive(Debug, Deserialize)]
pub struct Stamp {
    #[serde(default = "unix_epoch")]
    pub updated_at: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

/// Live and temp paths a store is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub path: PathBuf,
    pub temp_path: PathBuf,
}

impl Binding {
    /// Derive the temp path as a sibling of `path` with `suffix` appended to
    /// the file name. Returns `None` for an empty path or one without a
    /// file name (`/`, `..`).
    pub fn new(path: &Path, suffix: &str) -> Option<Self> {
        if path.as_os_str().is_empty() {
            return None;
        }
        let mut name = path.file_name()?.to_os_string();
        name.push(suffix);
        let temp_path = match path.parent() {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        };
        Some(Self {
            path: path.to_path_buf(),
            temp_path,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_is_sibling_with_suffix() {
        let binding = Binding::new(Path::new("/var/lib/app/data.json"), "~").unwrap();
        assert_eq!(binding.path, PathBuf::from("/var/lib/app/data.json"));
        assert_eq!(binding.temp_path, PathBuf::from("/var/lib/app/data.json~"));
    }

    #[test]
    fn relative_path_keeps_relative_temp() {
        let binding = Binding::new(Path::new("data.json"), ".tmp").unwrap();
        assert_eq!(binding.temp_path, PathBuf::from("data.json.tmp"));
    }

    #[test]
    fn empty_path_has_no_binding() {
        assert!(Binding::new(Path::new(""), "~").is_none());
    }

    #[test]
    fn path_without_file_name_has_no_binding() {
        assert!(Binding::new(Path::new("/"), "~").is_none());
        assert!(Binding::new(Path::new(".."), "~").is_none());
    }

    #[test]
    fn missing_envelope_fields_default() {
        let record: Record<Vec<u32>> = serde_json::from_str("{}").unwrap();
        assert_eq!(record.updated_at, DateTime::<Utc>::UNIX_EPOCH);
        assert!(record.data.is_empty());
    }
}
