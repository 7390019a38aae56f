//! Explicit ownership root.
//!
//! One long-lived [`AppContext`] holds the store, the active-check-in slot
//! and the sync/reporting components, constructed once and injected where
//! needed -- there are no global singletons in this crate.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::alerts::AlertSink;
use crate::checkin::CheckInManager;
use crate::clock::Clock;
use crate::config::Config;
use crate::decoy::{DecoyRunner, DecoySchedule};
use crate::diary::DiaryStore;
use crate::error::CoreError;
use crate::matching::PresenceMatcher;
use crate::reporting::{KeyUploader, ReportingOrchestrator};
use crate::storage::{Database, Store};
use crate::sync::SyncEngine;
use crate::verify::PayloadVerifier;

/// The external collaborators every deployment provides.
pub struct Collaborators {
    pub matcher: Arc<dyn PresenceMatcher>,
    pub alerts: Arc<dyn AlertSink>,
    pub uploader: Arc<dyn KeyUploader>,
    pub verifier: Arc<dyn PayloadVerifier>,
}

/// The assembled subsystem.
pub struct AppContext {
    pub store: Store,
    pub check_ins: Arc<CheckInManager>,
    pub sync: SyncEngine,
    pub decoy_schedule: Arc<DecoySchedule>,
    pub decoy_runner: DecoyRunner,
    pub reporting: Arc<ReportingOrchestrator>,
    pub alerts: Arc<dyn AlertSink>,
}

impl AppContext {
    pub fn new(
        config: &Config,
        db: Arc<Database>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CoreError> {
        let Collaborators { matcher, alerts, uploader, verifier } = collaborators;

        let store = Store::new(db);
        let diary = DiaryStore::new(store.clone());
        let check_ins = Arc::new(CheckInManager::new(
            store.clone(),
            diary,
            matcher.clone(),
            alerts.clone(),
            clock.clone(),
            Duration::hours(config.checkin.max_duration_hours),
            Duration::hours(config.checkin.reminder_hours),
        ));
        let sync = SyncEngine::new(
            store.clone(),
            check_ins.clone(),
            matcher.clone(),
            verifier,
            clock.clone(),
            config,
        )?;
        let decoy_schedule = Arc::new(DecoySchedule::new(
            store.clone(),
            clock.clone(),
            config.decoy.rate_per_day,
        ));
        let reporting = Arc::new(ReportingOrchestrator::new(
            store.clone(),
            matcher,
            uploader,
            decoy_schedule.clone(),
            config,
        )?);
        let decoy_runner = DecoyRunner::new(
            decoy_schedule.clone(),
            reporting.clone(),
            clock,
            StdDuration::from_secs(config.decoy.min_start_delay_secs),
            StdDuration::from_secs(config.decoy.max_start_delay_secs),
        );

        Ok(Self {
            store,
            check_ins,
            sync,
            decoy_schedule,
            decoy_runner,
            reporting,
            alerts,
        })
    }
}
