//! Typed facade over the kv table.
//!
//! Components depend on this repository interface rather than on SQLite
//! directly; values are serialized through serde_json.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

use super::database::Database;

/// Names of every persisted field the subsystem owns.
pub mod keys {
    /// Finalized check-in history (`Vec<CheckIn>`).
    pub const DIARY: &str = "diary";
    /// The single in-progress check-in, if any (`CheckIn`).
    pub const ACTIVE_CHECK_IN: &str = "active_check_in";
    /// Opaque server cursor for the problematic-event feed (`i64`).
    pub const LAST_KEY_BUNDLE_TAG: &str = "last_key_bundle_tag";
    /// Check-in ids already alerted on (`Vec<String>`).
    pub const NOTIFIED_IDS: &str = "notified_ids";
    /// Result of the latest matching pass (`Vec<ExposureEvent>`).
    pub const EXPOSURE_EVENTS: &str = "exposure_events";
    /// Next scheduled decoy submission (`DateTime<Utc>`).
    pub const DECOY_NEXT_FIRE_AT: &str = "decoy_next_fire_at";
    /// User has reported a positive test through this device (`bool`).
    pub const MARKED_AS_INFECTED: &str = "marked_as_infected";
    /// At least one checkout has completed successfully (`bool`).
    pub const HAS_CHECKED_OUT_ONCE: &str = "has_checked_out_once";
    /// First occurrence of the current run of sync failures
    /// (`DateTime<Utc>`); absent while syncs are healthy.
    pub const SYNC_ERROR_SINCE: &str = "sync_error_since";
}

/// Cheaply clonable typed key-value store.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        match self.db.kv_get(key)? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| StorageError::CorruptValue { key: key.to_string(), source }),
        }
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::CorruptValue {
            key: key.to_string(),
            source,
        })?;
        self.db.kv_set(key, &raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.db.kv_remove(key)
    }
}
