//! Check-in records and the durable diary.
//!
//! The diary is the history of finalized (checked-out) check-ins. The
//! single in-progress check-in lives in its own slot next to it; at most
//! one record system-wide has no departure time.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::intervals::Interval;
use crate::storage::{keys, Store};

/// Decoded venue metadata for display. Not used by matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueInfo {
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// Per-venue override of the automatic checkout cap, in seconds.
    #[serde(default)]
    pub auto_checkout_secs: Option<i64>,
}

/// A user-recorded presence at a venue.
///
/// `id` is assigned only after a successful checkout round-trip through the
/// presence-matching collaborator and stays empty before that. `departure`
/// is `None` while the check-in is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: String,
    /// The scanned venue-identifying payload, kept verbatim.
    pub venue_token: String,
    pub venue: VenueInfo,
    pub arrival: DateTime<Utc>,
    pub departure: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl CheckIn {
    pub fn new(venue_token: String, venue: VenueInfo, arrival: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            venue_token,
            venue,
            arrival,
            departure: None,
            comment: None,
            hidden: false,
        }
    }

    /// The presence window, once the check-in is finalized.
    pub fn interval(&self) -> Option<Interval> {
        self.departure.map(|departure| Interval::new(self.arrival, departure))
    }
}

/// Dedup identity is `(id, comment, arrival, departure)`. The venue payload
/// is excluded: its representation may differ across app versions while
/// referring to the same physical check-in.
impl PartialEq for CheckIn {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.comment.as_deref().unwrap_or("") == other.comment.as_deref().unwrap_or("")
            && self.arrival == other.arrival
            && self.departure == other.departure
    }
}

impl Eq for CheckIn {}

fn days_since_epoch(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(86_400)
}

/// Durable history of finalized check-ins.
///
/// The whole diary is one kv value; read-modify-write sequences are
/// serialized so concurrent mutations cannot lose entries.
#[derive(Clone)]
pub struct DiaryStore {
    store: Store,
    lock: Arc<Mutex<()>>,
}

impl DiaryStore {
    pub fn new(store: Store) -> Self {
        Self { store, lock: Arc::new(Mutex::new(())) }
    }

    pub fn all(&self) -> Result<Vec<CheckIn>, StorageError> {
        Ok(self.store.get(keys::DIARY)?.unwrap_or_default())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.all()?.is_empty())
    }

    pub fn append(&self, record: CheckIn) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        let mut records = self.all()?;
        records.push(record);
        self.store.set(keys::DIARY, &records)
    }

    pub fn remove(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        let records: Vec<CheckIn> =
            self.all()?.into_iter().filter(|r| r.id != id).collect();
        self.store.set(keys::DIARY, &records)
    }

    pub fn replace_all(&self, records: Vec<CheckIn>) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        self.store.set(keys::DIARY, &records)
    }

    /// Atomically swap an edited record in for its stored predecessor.
    pub fn swap(&self, id: &str, updated: CheckIn) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        let mut records: Vec<CheckIn> =
            self.all()?.into_iter().filter(|r| r.id != id).collect();
        records.push(updated);
        self.store.set(keys::DIARY, &records)
    }

    /// Remove a record the user no longer wants in the visible diary.
    pub fn hide(&self, id: &str) -> Result<(), StorageError> {
        self.remove(id)
    }

    /// Drop records whose arrival day is older than `days_to_keep` calendar
    /// days. `days_to_keep <= 0` clears the entire diary.
    pub fn prune_older_than(&self, days_to_keep: i64) -> Result<(), StorageError> {
        self.prune_older_than_at(days_to_keep, Utc::now())
    }

    pub(crate) fn prune_older_than_at(
        &self,
        days_to_keep: i64,
        today: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap();
        if days_to_keep <= 0 {
            return self.store.set(keys::DIARY, &Vec::<CheckIn>::new());
        }
        let day_limit = days_since_epoch(today) - days_to_keep;
        let records: Vec<CheckIn> = self
            .all()?
            .into_iter()
            .filter(|r| days_since_epoch(r.arrival) >= day_limit)
            .collect();
        self.store.set(keys::DIARY, &records)
    }
}
