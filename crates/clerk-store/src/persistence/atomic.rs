//! Temp-file-then-rename writer.

use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};

use serde::Serialize;

use super::Binding;
use crate::codec::Codec;
use crate::error::{Result, StoreError};

/// Persist `value` to `binding.path` via `binding.temp_path`.
///
/// # Atomic Write Strategy
///
/// 1. Create or truncate the temp file and encode into it
/// 2. Flush (and `sync_all` when `sync` is set), then close
/// 3. Rename the temp file over the live path
///
/// Any failure before step 3 leaves the live file untouched. An encode
/// failure leaves the partially written temp file behind.
///
/// Not synchronized: callers hold the store's exclusive lock.
pub fn write_atomic<T, C>(binding: &Binding, codec: &C, value: &T, sync: bool) -> Result<()>
where
    T: Serialize,
    C: Codec,
{
    let temp = &binding.temp_path;

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp)
        .map_err(|e| StoreError::io("create", temp, e))?;

    let mut writer = BufWriter::new(file);
    if let Err(source) = codec.encode(value, &mut writer) {
        log::warn!(
            "Encoding {} failed, live file left untouched",
            binding.path.display()
        );
        return Err(StoreError::Serialization {
            path: binding.path.clone(),
            source,
        });
    }

    let file = writer
        .into_inner()
        .map_err(|e| StoreError::io("write", temp, e.into_error()))?;
    if sync {
        file.sync_all().map_err(|e| StoreError::io("sync", temp, e))?;
    }
    drop(file);

    fs::rename(temp, &binding.path).map_err(|e| StoreError::io("rename", &binding.path, e))?;

    log::debug!("Saved {}", binding.path.display());
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;
    use crate::error::CodecError;
    use serde::de::DeserializeOwned;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    /// Writes half of the JSON encoding, then fails, like a process dying
    /// mid-save.
    #[derive(Clone)]
    struct TruncatingCodec;

    impl Codec for TruncatingCodec {
        fn encode<T: Serialize>(
            &self,
            value: &T,
            writer: &mut dyn Write,
        ) -> std::result::Result<(), CodecError> {
            let bytes = serde_json::to_vec(value)?;
            writer.write_all(&bytes[..bytes.len() / 2])?;
            Err("interrupted".into())
        }

        fn decode<T: DeserializeOwned>(
            &self,
            bytes: &[u8],
        ) -> std::result::Result<Option<T>, CodecError> {
            JsonCodec::new().decode(bytes)
        }
    }

    fn sample() -> BTreeMap<u32, u32> {
        BTreeMap::from([(1, 10), (2, 20)])
    }

    #[test]
    fn write_replaces_live_file_and_removes_temp() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();

        write_atomic(&binding, &JsonCodec::new(), &sample(), true).unwrap();

        assert!(binding.path.exists());
        assert!(!binding.temp_path.exists());
        let back: BTreeMap<u32, u32> =
            serde_json::from_slice(&fs::read(&binding.path).unwrap()).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn failed_encode_leaves_live_file_byte_identical() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("data.json"), "~").unwrap();

        write_atomic(&binding, &JsonCodec::new(), &sample(), false).unwrap();
        let before = fs::read(&binding.path).unwrap();

        let mut bigger = sample();
        bigger.insert(3, 30);
        let err = write_atomic(&binding, &TruncatingCodec, &bigger, false).unwrap_err();

        assert!(matches!(err, StoreError::Serialization { .. }));
        assert_eq!(fs::read(&binding.path).unwrap(), before);
        assert!(binding.temp_path.exists());
    }

    #[test]
    fn interrupted_first_save_never_creates_live_file() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("p"), "~").unwrap();

        assert!(write_atomic(&binding, &TruncatingCodec, &sample(), false).is_err());

        assert!(!binding.path.exists());
        assert!(Path::new(&binding.temp_path).exists());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let binding = Binding::new(&dir.path().join("nope").join("data.json"), "~").unwrap();

        let err = write_atomic(&binding, &JsonCodec::new(), &sample(), false).unwrap_err();
        assert!(matches!(err, StoreError::Io { op: "create", .. }));
    }
}
