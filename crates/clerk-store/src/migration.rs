//! Timestamp-gated, one-shot schema migrations.
//!
//! # How It Works
//!
//! A migration first compares the caller's threshold with the `updated_at`
//! stamp recorded in the live file, without decoding its `data`:
//!
//! - threshold strictly after the stamp: the file is read into the
//!   *previous* schema type and the transform maps it into a fresh
//!   new-schema value, which is saved and installed
//! - otherwise: [`StoreError::StaleMigration`], the migration already ran
//!
//! Saving restamps the file with the current time, so a migration that ran
//! once is stale from then on.
//!
//! # Schema Versions
//!
//! Keep the old schema as its own type and map fields explicitly in the
//! transform:
//!
//! ```no_run
//! use clerk_store::Store;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Deserialize)]
//! struct UsersV1 { names: Vec<String> }
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct User { name: String, admin: bool }
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct UsersV2 { users: Vec<User> }
//!
//! let store = Store::open("data.json", UsersV2::default());
//! store.migrate_or_rebase("2024-03-01 09:00:00 +00", |old: &UsersV1, new: &mut UsersV2| {
//!     new.users = old.names.iter().map(|n| User { name: n.clone(), admin: false }).collect();
//!     Ok(())
//! });
//! ```
//!
//! The old schema type is only decoded while the migration is due, so it
//! may require fields the new schema dropped.

use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::{MigrationError, Result, StoreError};
use crate::persistence::{read_record, read_stamp, Record};
use crate::store::Store;

/// `chrono` format of a migration threshold: `2006-01-02 15:04:05 -07`.
pub const THRESHOLD_FORMAT: &str = "%Y-%m-%d %H:%M:%S %#z";

/// Parse a threshold such as `2024-03-01 09:00:00 +02`.
pub fn parse_threshold(input: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(input, THRESHOLD_FORMAT).map_err(|source| {
        StoreError::TimestampParse {
            input: input.to_string(),
            source,
        }
    })
}

impl<T, C> Store<T, C>
where
    T: Serialize + DeserializeOwned + Default,
    C: Codec,
{
    /// Run `transform` if `threshold` is strictly after the stamp recorded
    /// in the file, then save the new value.
    ///
    /// Returns [`StoreError::StaleMigration`] without calling `transform`
    /// otherwise. A failing transform or save leaves both the file and the
    /// in-memory aggregate unchanged.
    pub fn migrate<O, F>(&self, threshold: &str, transform: F) -> Result<()>
    where
        O: DeserializeOwned + Default,
        F: FnOnce(&O, &mut T) -> std::result::Result<(), MigrationError>,
    {
        let binding = self.binding()?;
        let threshold = parse_threshold(threshold)?;

        let mut guard = self.lock()?;

        // Gate on the stamp alone; after a migration the data is in the new
        // schema and may not decode as `O`.
        let recorded = read_stamp(binding, &self.codec)?;
        if threshold <= recorded {
            log::debug!(
                "Skipping migration {} for {}: data updated {}",
                threshold,
                binding.path.display(),
                recorded
            );
            return Err(StoreError::StaleMigration {
                threshold,
                recorded,
            });
        }

        let old = read_record::<O, C>(binding, &self.codec)?.unwrap_or_default();
        let mut migrated = Record::new(T::default());
        transform(&old.data, &mut migrated.data).map_err(StoreError::Transform)?;
        migrated.touch();
        guard.replace_and_save(migrated)?;

        log::info!(
            "Applied migration {} to {} (data was updated {})",
            threshold,
            binding.path.display(),
            recorded
        );
        Ok(())
    }

    /// [`Store::migrate`], falling back to a plain rebase when the migration
    /// is stale.
    pub fn try_migrate_or_rebase<O, F>(&self, threshold: &str, transform: F) -> Result<()>
    where
        O: DeserializeOwned + Default,
        F: FnOnce(&O, &mut T) -> std::result::Result<(), MigrationError>,
    {
        match self.migrate(threshold, transform) {
            Err(StoreError::StaleMigration { .. }) => self.rebase(),
            other => other,
        }
    }

    /// Startup helper around [`Store::try_migrate_or_rebase`].
    ///
    /// # Panics
    ///
    /// Panics on any error other than a stale migration; there is nothing
    /// sensible to recover to at startup.
    pub fn migrate_or_rebase<O, F>(&self, threshold: &str, transform: F)
    where
        O: DeserializeOwned + Default,
        F: FnOnce(&O, &mut T) -> std::result::Result<(), MigrationError>,
    {
        if let Err(err) = self.try_migrate_or_rebase(threshold, transform) {
            panic!("clerk-store: migration failed: {err}");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
