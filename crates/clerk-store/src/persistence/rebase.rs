//! Reading the live file back, and deleting it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;

use super::{Binding, Record, Stamp};
use crate::codec::Codec;
use crate::error::{Result, StoreError};

/// Decode the live file.
///
/// The file is created empty when missing, so a fresh store bootstraps
/// instead of failing. Returns `Ok(None)` for an empty file; callers keep
/// their in-memory value in that case.
pub fn read_record<T, C>(binding: &Binding, codec: &C) -> Result<Option<Record<T>>>
where
    T: DeserializeOwned + Default,
    C: Codec,
{
    read_envelope(binding, codec)
}

/// Decode only the `updated_at` stamp of the live file, whatever shape its
/// `data` has. Missing or empty files report the Unix epoch.
pub fn read_stamp<C: Codec>(binding: &Binding, codec: &C) -> Result<DateTime<Utc>> {
    Ok(read_envelope::<Stamp, C>(binding, codec)?
        .map(|stamp| stamp.updated_at)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
}

fn read_envelope<E, C>(binding: &Binding, codec: &C) -> Result<Option<E>>
where
    E: DeserializeOwned,
    C: Codec,
{
    let path = &binding.path;

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| StoreError::io("create", path, e))?;
            log::debug!("Created empty {}", path.display());
            return Ok(None);
        }
        Err(e) => return Err(StoreError::io("open", path, e)),
    };

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| StoreError::io("read", path, e))?;

    let envelope = codec
        .decode::<E>(&bytes)
        .map_err(|source| StoreError::Serialization {
            path: path.clone(),
            source,
        })?;

    log::debug!(
        "Read {} ({} bytes{})",
        path.display(),
        bytes.len(),
        if envelope.is_none() { ", empty" } else { "" }
    );
    Ok(envelope)
}

/// Delete `path`. A file that is already gone counts as success.
pub fn remove_file(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            log::debug!("Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::io("remove", path, e)),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::persistence::write_atomic;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_created_empty() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();

        let record = read_record::<HashMap<u32, u32>, _>(&binding, &JsonCodec::new()).unwrap();

        assert!(record.is_none());
        assert!(binding.path.exists());
        assert_eq!(fs::metadata(&binding.path).unwrap().len(), 0);
    }

    #[test]
    fn reads_back_written_record() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();
        let mut record = Record::new(HashMap::from([(1u32, 10u32), (2, 20)]));
        record.touch();

        write_atomic(&binding, &JsonCodec::new(), &record, false).unwrap();
        let back = read_record(&binding, &JsonCodec::new()).unwrap().unwrap();

        assert_eq!(back, record);
    }

    #[test]
    fn corrupt_file_is_serialization_error() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();
        fs::write(&binding.path, "{\"data\": [").unwrap();

        let err = read_record::<Vec<u32>, _>(&binding, &JsonCodec::new()).unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
    }

    #[test]
    fn orphaned_temp_is_ignored() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("p"), "~").unwrap();
        fs::write(&binding.temp_path, "{\"data\": {\"1\": 10, \"2\": 20}}").unwrap();

        let record = read_record::<HashMap<u32, u32>, _>(&binding, &JsonCodec::new()).unwrap();
        assert!(record.is_none());
    }

    #[test]
    fn read_only_file_can_be_rebased() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();
        let record = Record::new(vec![1u32, 2, 3]);
        write_atomic(&binding, &JsonCodec::new(), &record, false).unwrap();

        let mut perms = fs::metadata(&binding.path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&binding.path, perms).unwrap();

        let back = read_record::<Vec<u32>, _>(&binding, &JsonCodec::new())
            .unwrap()
            .unwrap();
        assert_eq!(back.data, vec![1, 2, 3]);
    }

    #[test]
    fn stamp_is_read_regardless_of_data_shape() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();
        fs::write(
            &binding.path,
            r#"{"updated_at":"2022-02-02T02:02:02Z","data":{"anything":[1,{"x":null}]}}"#,
        )
        .unwrap();

        let stamp = read_stamp(&binding, &JsonCodec::new()).unwrap();
        assert_eq!(stamp.to_rfc3339(), "2022-02-02T02:02:02+00:00");
    }

    #[test]
    fn stamp_of_missing_file_is_epoch() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();

        let stamp = read_stamp(&binding, &JsonCodec::new()).unwrap();
        assert_eq!(stamp, DateTime::<Utc>::UNIX_EPOCH);
        assert!(binding.path.exists());
    }

    #[test]
    fn remove_missing_file_succeeds() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("never-created.json");

        remove_file(&path).unwrap();
        remove_file(&path).unwrap();
    }

    #[test]
    fn remove_deletes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.json");
        fs::write(&path, "{}").unwrap();

        remove_file(&path).unwrap();
        assert!(!path.exists());
    }
}
