//! Local alerting collaborator seam.
//!
//! Fire-and-forget calls into whatever notification surface the platform
//! offers. Nothing in this core relies on a return value from the sink.

use chrono::{DateTime, Utc};

/// Notification surface contract.
pub trait AlertSink: Send + Sync {
    /// Tell the user a new exposure was found.
    fn show_exposure_alert(&self);

    /// Schedule a "you are still checked in" reminder for the given time.
    fn schedule_checkout_reminder(&self, at: DateTime<Utc>);

    /// Cancel any pending checkout reminders.
    fn cancel_reminders(&self);
}

/// Sink that only logs; the default for headless use.
#[derive(Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn show_exposure_alert(&self) {
        tracing::info!("exposure alert");
    }

    fn schedule_checkout_reminder(&self, at: DateTime<Utc>) {
        tracing::debug!(%at, "checkout reminder scheduled");
    }

    fn cancel_reminders(&self) {
        tracing::debug!("checkout reminders cancelled");
    }
}
