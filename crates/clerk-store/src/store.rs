//! The [`Store`] facade: one aggregate bound to one file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{Codec, JsonCodec};
use crate::error::{Result, StoreError};
use crate::persistence::{remove_file, Binding, Record};

/// Marker appended to the live file name to form the temp file name.
pub const DEFAULT_TEMP_SUFFIX: &str = "~";

/// Tunables for a [`Store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Appended to the live file name to derive the temp file. Two stores
    /// bound to the same path share it.
    pub temp_suffix: String,
    /// `fsync` the temp file before renaming it over the live file.
    pub sync_on_save: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            temp_suffix: DEFAULT_TEMP_SUFFIX.to_string(),
            sync_on_save: true,
        }
    }
}

/// Builder for a [`Store`] with non-default options or codec.
pub struct StoreBuilder<C = JsonCodec> {
    path: Option<PathBuf>,
    options: StoreOptions,
    codec: C,
}

impl StoreBuilder<JsonCodec> {
    pub fn new() -> Self {
        Self {
            path: None,
            options: StoreOptions::default(),
            codec: JsonCodec::default(),
        }
    }
}

impl Default for StoreBuilder<JsonCodec> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> StoreBuilder<C> {
    /// Bind the store to `path` at build time.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn temp_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.options.temp_suffix = suffix.into();
        self
    }

    pub fn sync_on_save(mut self, sync: bool) -> Self {
        self.options.sync_on_save = sync;
        self
    }

    pub fn options(mut self, options: StoreOptions) -> Self {
        self.options = options;
        self
    }

    /// Swap the serialization format.
    pub fn codec<D: Codec>(self, codec: D) -> StoreBuilder<D> {
        StoreBuilder {
            path: self.path,
            options: self.options,
            codec,
        }
    }

    /// Build the store around `data`.
    pub fn build<T>(self, data: T) -> Result<Store<T, C>> {
        if self.options.temp_suffix.is_empty() {
            return Err(StoreError::InvalidOptions(
                "temp suffix must not be empty".to_string(),
            ));
        }
        if self.options.temp_suffix.contains(std::path::is_separator) {
            return Err(StoreError::InvalidOptions(format!(
                "temp suffix {:?} must not contain a path separator",
                self.options.temp_suffix
            )));
        }

        let mut store = Store {
            binding: None,
            options: self.options,
            codec: self.codec,
            record: RwLock::new(Record::new(data)),
        };
        if let Some(path) = self.path {
            store.try_init(path)?;
        }
        Ok(store)
    }
}

/// Durable single-file persistence for an aggregate `T`.
///
/// # Lifecycle
///
/// 1. Create unbound with [`Store::new`], then [`Store::init`] once, or
///    use [`Store::open`]
/// 2. [`Store::rebase`] (or [`Store::migrate_or_rebase`]) at startup
/// 3. Mutate under [`Store::lock`], calling `save` on the guard
///
/// Every operation on an unbound store returns
/// [`StoreError::NotInitialized`].
///
/// # Example
///
/// ```no_run
/// use clerk_store::Store;
/// use std::collections::BTreeMap;
///
/// let store = Store::open("data.json", BTreeMap::<String, u32>::new());
/// store.rebase()?;
///
/// let mut data = store.lock()?;
/// data.insert("visits".to_string(), 1);
/// data.save()?;
/// # Ok::<(), clerk_store::StoreError>(())
/// ```
pub struct Store<T, C = JsonCodec> {
    pub(crate) binding: Option<Binding>,
    pub(crate) options: StoreOptions,
    pub(crate) codec: C,
    pub(crate) record: RwLock<Record<T>>,
}

impl<T> Store<T, JsonCodec> {
    /// Unbound store with default options.
    pub fn new(data: T) -> Self {
        Self::with_codec(data, JsonCodec::default())
    }

    /// Store bound to `path` with default options.
    ///
    /// An empty path leaves the store unbound.
    pub fn open(path: impl AsRef<Path>, data: T) -> Self {
        let mut store = Self::new(data);
        store.init(path);
        store
    }
}

impl<T, C: Codec> Store<T, C> {
    /// Unbound store using `codec`.
    pub fn with_codec(data: T, codec: C) -> Self {
        Self {
            binding: None,
            options: StoreOptions::default(),
            codec,
            record: RwLock::new(Record::new(data)),
        }
    }

    /// Bind the store to `path`.
    ///
    /// # Panics
    ///
    /// Panics if the store is already bound or `path` names no file; both
    /// are wiring bugs.
    pub fn init(&mut self, path: impl AsRef<Path>) {
        if let Err(err) = self.try_init(path) {
            panic!("clerk-store: {err}");
        }
    }

    /// Non-panicking [`Store::init`].
    ///
    /// An empty path leaves the store unbound; a path without a file name
    /// is rejected with [`StoreError::InvalidPath`].
    pub fn try_init(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Some(binding) = &self.binding {
            return Err(StoreError::AlreadyInitialized {
                path: binding.path.clone(),
            });
        }
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        let binding = Binding::new(path, &self.options.temp_suffix).ok_or_else(|| {
            StoreError::InvalidPath {
                path: path.to_path_buf(),
            }
        })?;
        self.binding = Some(binding);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    pub(crate) fn binding(&self) -> Result<&Binding> {
        self.binding.as_ref().ok_or(StoreError::NotInitialized)
    }

    pub fn path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.path.as_path())
    }

    pub fn temp_path(&self) -> Option<&Path> {
        self.binding.as_ref().map(|b| b.temp_path.as_path())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub(crate) fn display_path(&self) -> String {
        self.path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unbound>".to_string())
    }

    /// Time of the most recent exclusive-lock acquisition, save, or the
    /// stamp loaded by the last rebase.
    pub fn last_modified(&self) -> Result<DateTime<Utc>> {
        Ok(self.read()?.updated_at())
    }

    /// Lock, save and unlock in one step.
    pub fn save(&self) -> Result<()>
    where
        T: Serialize,
    {
        self.lock()?.save()
    }

    /// Reload the aggregate from disk, creating an empty file when missing.
    pub fn rebase(&self) -> Result<()>
    where
        T: DeserializeOwned + Default,
    {
        self.lock_unstamped()?.rebase()
    }

    /// Delete the live file and any orphaned temp file.
    pub fn remove(&self) -> Result<()> {
        let binding = self.binding()?;
        remove_file(&binding.path)?;
        remove_file(&binding.temp_path)
    }

    /// Unwrap the aggregate, dropping the binding.
    pub fn into_inner(self) -> T {
        self.record
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .data
    }
}

impl<T, C> fmt::Debug for Store<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("binding", &self.binding)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
