//! Check-in lifecycle.
//!
//! Governs the single "currently checked in" slot: check-in, manual
//! checkout, automatic timeout checkout and the reminder hookup. The slot
//! and the diary are both persisted; a checkout only commits once the
//! presence-matching collaborator has accepted the record.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, DurationRound, Utc};
use tracing::debug;

use crate::alerts::AlertSink;
use crate::clock::Clock;
use crate::diary::{CheckIn, DiaryStore, VenueInfo};
use crate::error::CheckInError;
use crate::matching::PresenceMatcher;
use crate::storage::{keys, Store};

pub struct CheckInManager {
    store: Store,
    diary: DiaryStore,
    matcher: Arc<dyn PresenceMatcher>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    max_duration: Duration,
    reminder_after: Duration,
    /// Serializes slot transitions against each other.
    slot: Mutex<()>,
}

impl CheckInManager {
    pub fn new(
        store: Store,
        diary: DiaryStore,
        matcher: Arc<dyn PresenceMatcher>,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        max_duration: Duration,
        reminder_after: Duration,
    ) -> Self {
        Self {
            store,
            diary,
            matcher,
            alerts,
            clock,
            max_duration,
            reminder_after,
            slot: Mutex::new(()),
        }
    }

    pub fn diary(&self) -> &DiaryStore {
        &self.diary
    }

    /// The active check-in, if any.
    pub fn current(&self) -> Result<Option<CheckIn>, CheckInError> {
        Ok(self.store.get(keys::ACTIVE_CHECK_IN)?)
    }

    /// Start a new check-in at the current instant.
    ///
    /// Fails with [`CheckInError::AlreadyCheckedIn`] while another check-in
    /// is active; the caller must check out first.
    pub fn check_in(&self, venue_token: String, venue: VenueInfo) -> Result<CheckIn, CheckInError> {
        let _guard = self.slot.lock().unwrap();
        if self.store.get::<CheckIn>(keys::ACTIVE_CHECK_IN)?.is_some() {
            return Err(CheckInError::AlreadyCheckedIn);
        }
        let arrival = self.clock.now();
        let record = CheckIn::new(venue_token, venue, arrival);
        self.store.set(keys::ACTIVE_CHECK_IN, &record)?;
        self.alerts.schedule_checkout_reminder(arrival + self.reminder_after);
        debug!(venue = %record.venue.name, "checked in");
        Ok(record)
    }

    /// Finalize the active check-in with the given departure time.
    ///
    /// Submits the record to the presence matcher; only on success is the
    /// returned id assigned, the record appended to the diary, the slot
    /// cleared and pending reminders cancelled. On failure the slot stays
    /// occupied so checkout can be retried.
    pub fn check_out(&self, departure: DateTime<Utc>) -> Result<CheckIn, CheckInError> {
        let _guard = self.slot.lock().unwrap();
        let mut record = self
            .store
            .get::<CheckIn>(keys::ACTIVE_CHECK_IN)?
            .ok_or(CheckInError::NotCheckedIn)?;

        let (arrival, departure) = normalize_window(record.arrival, departure);
        let id = self
            .matcher
            .submit_check_in(&record.venue_token, &record.venue, arrival, departure)?;

        record.id = id;
        record.arrival = arrival;
        record.departure = Some(departure);
        self.diary.append(record.clone())?;
        self.store.remove(keys::ACTIVE_CHECK_IN)?;
        self.store.set(keys::HAS_CHECKED_OUT_ONCE, &true)?;
        self.alerts.cancel_reminders();
        debug!(id = %record.id, "checked out");
        Ok(record)
    }

    /// Check out automatically once the stay exceeds its cap.
    ///
    /// The synthesized departure is `arrival + cap`, never the query time;
    /// the recorded exposure window must not depend on when the check
    /// happens to run.
    pub fn auto_checkout_if_stale(&self) -> Result<Option<CheckIn>, CheckInError> {
        let Some(record) = self.store.get::<CheckIn>(keys::ACTIVE_CHECK_IN)? else {
            return Ok(None);
        };
        let cap = record
            .venue
            .auto_checkout_secs
            .map(Duration::seconds)
            .unwrap_or(self.max_duration);
        if record.arrival + cap <= self.clock.now() {
            return self.check_out(record.arrival + cap).map(Some);
        }
        Ok(None)
    }

    /// Apply an after-the-fact edit to a historical record.
    ///
    /// Resubmits under the same id, then atomically swaps the diary entry;
    /// a matcher rejection leaves the stored record untouched.
    pub fn update_record(&self, updated: CheckIn) -> Result<(), CheckInError> {
        let departure = updated.departure.ok_or(CheckInError::MissingDeparture)?;
        let (arrival, departure) = normalize_window(updated.arrival, departure);

        self.matcher.resubmit_check_in(
            &updated.id,
            &updated.venue_token,
            &updated.venue,
            arrival,
            departure,
        )?;

        let mut corrected = updated;
        corrected.arrival = arrival;
        corrected.departure = Some(departure);
        let id = corrected.id.clone();
        self.diary.swap(&id, corrected)?;
        Ok(())
    }
}

/// Normalize an arrival/departure pair: swap a reversed pair, round the
/// arrival down and the departure up to the minute, and widen a collapsed
/// pair to a one-minute window.
fn normalize_window(start: DateTime<Utc>, end: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let (start, end) = if start > end { (end, start) } else { (start, end) };

    let minute = Duration::minutes(1);
    let start = start.duration_trunc(minute).unwrap_or(start);
    let mut end = match end.duration_trunc(minute) {
        Ok(truncated) if truncated == end => end,
        Ok(truncated) => truncated + minute,
        Err(_) => end,
    };

    if start == end {
        end += minute;
    }
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogAlertSink;
    use crate::clock::FixedClock;
    use crate::error::MatchingError;
    use crate::matching::NaiveMatcher;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn venue() -> VenueInfo {
        VenueInfo { name: "Cafe".into(), address: String::new(), auto_checkout_secs: None }
    }

    fn manager_at(now: DateTime<Utc>) -> (CheckInManager, Arc<FixedClock>) {
        let store = Store::new(Arc::new(Database::open_memory().unwrap()));
        let clock = Arc::new(FixedClock::new(now));
        let manager = CheckInManager::new(
            store.clone(),
            DiaryStore::new(store),
            Arc::new(NaiveMatcher::new()),
            Arc::new(LogAlertSink),
            clock.clone(),
            Duration::hours(12),
            Duration::hours(8),
        );
        (manager, clock)
    }

    #[test]
    fn double_check_in_is_rejected() {
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let (manager, _) = manager_at(now);
        manager.check_in("t".into(), venue()).unwrap();
        assert!(matches!(
            manager.check_in("t".into(), venue()),
            Err(CheckInError::AlreadyCheckedIn)
        ));
    }

    #[test]
    fn checkout_assigns_id_and_moves_record_to_diary() {
        let now = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let (manager, clock) = manager_at(now);
        manager.check_in("t".into(), venue()).unwrap();
        clock.advance(Duration::hours(2));

        let record = manager.check_out(clock.now()).unwrap();
        assert!(!record.id.is_empty());
        assert!(manager.current().unwrap().is_none());
        assert_eq!(manager.diary().all().unwrap(), vec![record]);
    }

    #[test]
    fn failed_checkout_keeps_slot_for_retry() {
        struct RejectingMatcher;
        impl PresenceMatcher for RejectingMatcher {
            fn submit_check_in(
                &self,
                _: &str,
                _: &VenueInfo,
                _: DateTime<Utc>,
                _: DateTime<Utc>,
            ) -> Result<String, MatchingError> {
                Err(MatchingError("backend unavailable".into()))
            }
            fn resubmit_check_in(
                &self,
                _: &str,
                _: &str,
                _: &VenueInfo,
                _: DateTime<Utc>,
                _: DateTime<Utc>,
            ) -> Result<(), MatchingError> {
                Err(MatchingError("backend unavailable".into()))
            }
            fn find_matches(
                &self,
                _: &[CheckIn],
                _: &[crate::matching::ProblematicEvent],
            ) -> Vec<crate::matching::ExposureEvent> {
                Vec::new()
            }
            fn remove_exposure(&self, _: &crate::matching::ExposureEvent) {}
            fn clean_up_old_data(&self, _: i64) {}
            fn generate_upload_info(
                &self,
                _: &str,
                _: &VenueInfo,
                _: crate::intervals::Interval,
                _: bool,
            ) -> Vec<crate::matching::VenueUploadInfo> {
                Vec::new()
            }
        }

        let now = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let store = Store::new(Arc::new(Database::open_memory().unwrap()));
        let clock = Arc::new(FixedClock::new(now));
        let manager = CheckInManager::new(
            store.clone(),
            DiaryStore::new(store),
            Arc::new(RejectingMatcher),
            Arc::new(LogAlertSink),
            clock.clone(),
            Duration::hours(12),
            Duration::hours(8),
        );

        manager.check_in("t".into(), venue()).unwrap();
        clock.advance(Duration::hours(1));
        assert!(manager.check_out(clock.now()).is_err());
        // Slot still occupied, diary untouched.
        assert!(manager.current().unwrap().is_some());
        assert!(manager.diary().is_empty().unwrap());
    }

    #[test]
    fn auto_checkout_caps_departure_at_arrival_plus_max() {
        let arrival = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let (manager, clock) = manager_at(arrival);
        manager.check_in("t".into(), venue()).unwrap();

        // Queried 15 hours later with a 12 hour cap.
        clock.advance(Duration::hours(15));
        let record = manager.auto_checkout_if_stale().unwrap().unwrap();
        assert_eq!(record.departure, Some(arrival + Duration::hours(12)));
    }

    #[test]
    fn auto_checkout_honors_venue_override() {
        let arrival = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let (manager, clock) = manager_at(arrival);
        let mut short_stay = venue();
        short_stay.auto_checkout_secs = Some(3600);
        manager.check_in("t".into(), short_stay).unwrap();

        clock.advance(Duration::hours(2));
        let record = manager.auto_checkout_if_stale().unwrap().unwrap();
        assert_eq!(record.departure, Some(arrival + Duration::hours(1)));
    }

    #[test]
    fn auto_checkout_is_noop_before_cap() {
        let arrival = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();
        let (manager, clock) = manager_at(arrival);
        manager.check_in("t".into(), venue()).unwrap();
        clock.advance(Duration::hours(3));
        assert!(manager.auto_checkout_if_stale().unwrap().is_none());
        assert!(manager.current().unwrap().is_some());
    }

    #[test]
    fn normalize_swaps_rounds_and_widens() {
        let base = Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap();

        // Reversed pair swaps.
        let (start, end) = normalize_window(base + Duration::hours(2), base);
        assert_eq!((start, end), (base, base + Duration::hours(2)));

        // Sub-minute precision rounds outward.
        let (start, end) =
            normalize_window(base + Duration::seconds(30), base + Duration::seconds(90));
        assert_eq!(start, base);
        assert_eq!(end, base + Duration::minutes(2));

        // A collapsed pair becomes a one-minute window.
        let (start, end) = normalize_window(base, base);
        assert_eq!(end - start, Duration::minutes(1));
    }
}
