//! Presence-matching collaborator seam.
//!
//! The real matcher is an opaque cryptographic primitive: it decides,
//! without leaking anything to the network, which local check-ins overlap a
//! published problematic event. This core only depends on the trait;
//! [`NaiveMatcher`] is the plaintext stand-in used by the CLI and tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diary::{CheckIn, VenueInfo};
use crate::error::MatchingError;
use crate::intervals::Interval;

/// A backend-published record describing a venue/time window later flagged
/// as a transmission risk. All byte fields are opaque to this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicEvent {
    pub identity: String,
    pub secret_key_for_identity: String,
    /// Window start, milliseconds since epoch.
    pub start_time: i64,
    /// Window end, milliseconds since epoch.
    pub end_time: i64,
    pub encrypted_associated_data: String,
    pub cipher_text_nonce: String,
}

/// A confirmed overlap between a diary entry and a problematic event.
///
/// Identity for notification dedup is `checkin_id` alone: two matches
/// against the same check-in collapse into one alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    pub checkin_id: String,
    pub matched_event_id: String,
}

/// One venue/time slice of a user upload, pre-keyed by the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueUploadInfo {
    pub pre_id: String,
    pub time_key: String,
    pub notification_key: String,
    pub interval_start_ms: i64,
    pub interval_end_ms: i64,
    pub fake: bool,
}

/// Capability contract of the presence-matching primitive.
pub trait PresenceMatcher: Send + Sync {
    /// Register a finalized check-in; returns the identifier the diary
    /// stores for it.
    fn submit_check_in(
        &self,
        venue_token: &str,
        venue: &VenueInfo,
        arrival: DateTime<Utc>,
        departure: DateTime<Utc>,
    ) -> Result<String, MatchingError>;

    /// Re-register an edited check-in under its existing identifier.
    fn resubmit_check_in(
        &self,
        id: &str,
        venue_token: &str,
        venue: &VenueInfo,
        arrival: DateTime<Utc>,
        departure: DateTime<Utc>,
    ) -> Result<(), MatchingError>;

    /// Full recomputation: which of the given diary entries overlap which
    /// of the given problematic events.
    fn find_matches(
        &self,
        diary: &[CheckIn],
        problematic_events: &[ProblematicEvent],
    ) -> Vec<ExposureEvent>;

    /// Forget a previously reported exposure.
    fn remove_exposure(&self, exposure: &ExposureEvent);

    /// Drop matcher-side state older than `max_days` days.
    fn clean_up_old_data(&self, max_days: i64);

    /// Produce upload slices for one venue window of a positive report.
    fn generate_upload_info(
        &self,
        venue_token: &str,
        venue: &VenueInfo,
        window: Interval,
        fake: bool,
    ) -> Vec<VenueUploadInfo>;
}

/// Plaintext matcher: matches on venue-token identity and window overlap.
///
/// Carries none of the cryptographic protections of the real primitive --
/// useful only where those protections don't matter (local tooling, tests).
#[derive(Default)]
pub struct NaiveMatcher;

impl NaiveMatcher {
    pub fn new() -> Self {
        Self
    }
}

impl PresenceMatcher for NaiveMatcher {
    fn submit_check_in(
        &self,
        _venue_token: &str,
        _venue: &VenueInfo,
        _arrival: DateTime<Utc>,
        _departure: DateTime<Utc>,
    ) -> Result<String, MatchingError> {
        Ok(uuid::Uuid::new_v4().to_string())
    }

    fn resubmit_check_in(
        &self,
        _id: &str,
        _venue_token: &str,
        _venue: &VenueInfo,
        _arrival: DateTime<Utc>,
        _departure: DateTime<Utc>,
    ) -> Result<(), MatchingError> {
        Ok(())
    }

    fn find_matches(
        &self,
        diary: &[CheckIn],
        problematic_events: &[ProblematicEvent],
    ) -> Vec<ExposureEvent> {
        let mut matches = Vec::new();
        for record in diary {
            let Some(window) = record.interval() else { continue };
            for event in problematic_events {
                if event.identity != record.venue_token {
                    continue;
                }
                let event_window = Interval::new(
                    DateTime::from_timestamp_millis(event.start_time).unwrap_or_default(),
                    DateTime::from_timestamp_millis(event.end_time).unwrap_or_default(),
                );
                if window.overlaps(&event_window) {
                    matches.push(ExposureEvent {
                        checkin_id: record.id.clone(),
                        matched_event_id: event.identity.clone(),
                    });
                }
            }
        }
        matches
    }

    fn remove_exposure(&self, _exposure: &ExposureEvent) {}

    fn clean_up_old_data(&self, _max_days: i64) {}

    fn generate_upload_info(
        &self,
        venue_token: &str,
        _venue: &VenueInfo,
        window: Interval,
        fake: bool,
    ) -> Vec<VenueUploadInfo> {
        vec![VenueUploadInfo {
            pre_id: venue_token.to_string(),
            time_key: window.start.timestamp().to_string(),
            notification_key: String::new(),
            interval_start_ms: window.start.timestamp_millis(),
            interval_end_ms: window.end.timestamp_millis(),
            fake,
        }]
    }
}
