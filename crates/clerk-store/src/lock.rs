//! Reader-writer lock discipline around the aggregate.
//!
//! The lock is the only synchronization in the crate. Saving and rebasing go
//! through a held [`WriteGuard`], so several mutations can be batched under
//! one acquisition before a single save. Guards release on drop.
//!
//! Neither lock is reentrant: taking [`Store::lock`] twice on one thread
//! deadlocks.

use std::ops::{Deref, DerefMut};
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::Result;
use crate::persistence::{read_record, write_atomic, Binding, Record};
use crate::store::Store;

/// Shared access to the aggregate.
pub struct ReadGuard<'a, T> {
    record: RwLockReadGuard<'a, Record<T>>,
}

impl<T> ReadGuard<'_, T> {
    /// Last-modified stamp currently held in memory.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.record.updated_at
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record.data
    }
}

/// Exclusive access to the aggregate.
///
/// Acquiring one stamps the record's `updated_at`, whether or not a save
/// follows.
pub struct WriteGuard<'a, T, C> {
    binding: &'a Binding,
    codec: &'a C,
    sync_on_save: bool,
    record: RwLockWriteGuard<'a, Record<T>>,
}

impl<T, C: Codec> WriteGuard<'_, T, C> {
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.record.updated_at
    }

    /// Restamp `updated_at` without saving.
    pub fn touch(&mut self) {
        self.record.touch();
    }

    /// Persist the aggregate atomically. Restamps `updated_at` first.
    pub fn save(&mut self) -> Result<()>
    where
        T: Serialize,
    {
        self.record.touch();
        write_atomic(self.binding, self.codec, &*self.record, self.sync_on_save)
    }

    /// Replace the aggregate with the file's content.
    ///
    /// An empty or freshly created file leaves the aggregate as it is.
    pub fn rebase(&mut self) -> Result<()>
    where
        T: DeserializeOwned + Default,
    {
        if let Some(record) = read_record(self.binding, self.codec)? {
            *self.record = record;
        }
        Ok(())
    }

    /// Persist `record` and only then install it as the live state.
    pub(crate) fn replace_and_save(&mut self, record: Record<T>) -> Result<()>
    where
        T: Serialize,
    {
        write_atomic(self.binding, self.codec, &record, self.sync_on_save)?;
        *self.record = record;
        Ok(())
    }
}

impl<T, C> Deref for WriteGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.record.data
    }
}

impl<T, C> DerefMut for WriteGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.record.data
    }
}

impl<T, C: Codec> Store<T, C> {
    /// Acquire the exclusive lock and stamp `updated_at`.
    pub fn lock(&self) -> Result<WriteGuard<'_, T, C>> {
        let mut guard = self.lock_unstamped()?;
        guard.touch();
        Ok(guard)
    }

    /// Acquire the shared lock.
    pub fn read(&self) -> Result<ReadGuard<'_, T>> {
        self.binding()?;
        let record = self.record.read().unwrap_or_else(|poisoned| {
            log::warn!("Recovering poisoned read lock on {}", self.display_path());
            poisoned.into_inner()
        });
        Ok(ReadGuard { record })
    }

    /// Exclusive lock that leaves the stamp alone, for plain rebases.
    pub(crate) fn lock_unstamped(&self) -> Result<WriteGuard<'_, T, C>> {
        let binding = self.binding()?;
        let record = self.record.write().unwrap_or_else(|poisoned| {
            log::warn!("Recovering poisoned write lock on {}", self.display_path());
            poisoned.into_inner()
        });
        Ok(WriteGuard {
            binding,
            codec: &self.codec,
            sync_on_save: self.options.sync_on_save,
            record,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
