//! Decoy ("fake") report scheduling.
//!
//! Real positive-test reports are rare events; to keep a network observer
//! from learning anything from the mere existence of report traffic, the
//! client submits indistinguishable decoy reports at exponentially
//! distributed intervals. Scheduling is persisted, so the cadence survives
//! restarts; only a successful decoy advances the schedule, so a dropped
//! request is retried at the next periodic wake-up instead of silently
//! drifting the cadence toward "never".

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::error::{CoreError, ReportError, StorageError};
use crate::storage::{keys, Store};

/// Decoys older than this are skipped rather than sent; the schedule just
/// moves on.
const MAX_FIRE_LAG: Duration = Duration::hours(48);

/// Exponential inter-arrival sampling.
pub struct ExponentialDistribution;

impl ExponentialDistribution {
    /// Draw from Exp(rate). `rate` is the inverse of the mean.
    pub fn sample<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> f64 {
        debug_assert!(rate > 0.0, "rate must be positive");
        // -ln(1-U) with U uniform on [0,1)
        -(1.0 - rng.gen::<f64>()).ln() / rate
    }
}

/// The report entry point a decoy run drives. Implemented by the reporting
/// orchestrator; decoys take the exact same path as real reports.
#[async_trait]
pub trait FakeReporter: Send + Sync {
    async fn report_fake(&self) -> Result<(), ReportError>;
}

/// Persisted schedule of the next decoy submission.
pub struct DecoySchedule {
    store: Store,
    clock: Arc<dyn Clock>,
    rate_per_day: f64,
    rng: Mutex<Box<dyn RngCore + Send>>,
    lock: Mutex<()>,
}

impl DecoySchedule {
    pub fn new(store: Store, clock: Arc<dyn Clock>, rate_per_day: f64) -> Self {
        Self::with_rng(store, clock, rate_per_day, StdRng::from_entropy())
    }

    pub fn with_rng(
        store: Store,
        clock: Arc<dyn Clock>,
        rate_per_day: f64,
        rng: impl RngCore + Send + 'static,
    ) -> Self {
        Self {
            store,
            clock,
            rate_per_day,
            rng: Mutex::new(Box::new(rng)),
            lock: Mutex::new(()),
        }
    }

    /// The next scheduled fire time, initializing the schedule on first use.
    pub fn next_fire_at(&self) -> Result<DateTime<Utc>, StorageError> {
        if let Some(at) = self.store.get(keys::DECOY_NEXT_FIRE_AT)? {
            Ok(at)
        } else {
            self.reschedule(false)
        }
    }

    /// The stored fire time without initializing anything.
    pub fn peek(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.store.get(keys::DECOY_NEXT_FIRE_AT)
    }

    /// Compute a fresh fire time if none is stored, the stored one is in
    /// the past, or `force` is set; otherwise return the stored value
    /// unchanged. Idempotent under repeated calls, safe to invoke
    /// opportunistically.
    pub fn reschedule(&self, force: bool) -> Result<DateTime<Utc>, StorageError> {
        let _guard = self.lock.lock().unwrap();
        let now = self.clock.now();
        let mut next = match self.store.get(keys::DECOY_NEXT_FIRE_AT)? {
            Some(at) => at,
            None => now + self.interval(),
        };
        if next <= now || force {
            next = next + self.interval();
        }
        self.store.set(keys::DECOY_NEXT_FIRE_AT, &next)?;
        Ok(next)
    }

    fn interval(&self) -> Duration {
        let mut rng = self.rng.lock().unwrap();
        let days = ExponentialDistribution::sample(self.rate_per_day, &mut **rng);
        Duration::milliseconds((days * 86_400_000.0) as i64)
    }
}

/// Executes due decoy submissions. Invoked by an external periodic
/// scheduler; a run where nothing is due is a no-op.
pub struct DecoyRunner {
    schedule: Arc<DecoySchedule>,
    reporter: Arc<dyn FakeReporter>,
    clock: Arc<dyn Clock>,
    min_start_delay: StdDuration,
    max_start_delay: StdDuration,
}

impl DecoyRunner {
    pub fn new(
        schedule: Arc<DecoySchedule>,
        reporter: Arc<dyn FakeReporter>,
        clock: Arc<dyn Clock>,
        min_start_delay: StdDuration,
        max_start_delay: StdDuration,
    ) -> Self {
        Self { schedule, reporter, clock, min_start_delay, max_start_delay }
    }

    /// Fire every due decoy, returning how many were sent.
    ///
    /// The first submission of a run waits a randomized 20-30 s so its
    /// network timing does not correlate with the scheduler's wake time.
    /// A failed submission leaves the schedule untouched and ends the run;
    /// the unexpired fire time makes the next wake-up retry it.
    pub async fn run(&self, cancel: CancelToken) -> Result<u32, CoreError> {
        let mut fakes_done: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let now = self.clock.now();
            let next = self.schedule.next_fire_at()?;
            if now < next {
                break;
            }
            if now - next > MAX_FIRE_LAG {
                // Planned too long ago; skip the request and move on.
                self.schedule.reschedule(false)?;
                continue;
            }

            if fakes_done == 0 {
                let delay = rand::thread_rng()
                    .gen_range(self.min_start_delay..=self.max_start_delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => break,
                }
            }

            match self.reporter.report_fake().await {
                Ok(()) => {
                    fakes_done += 1;
                    self.schedule.reschedule(false)?;
                }
                Err(err) => {
                    debug!(%err, "decoy report failed; retrying at next wake-up");
                    break;
                }
            }
        }
        debug!(fakes_done, "decoy run finished");
        Ok(fakes_done)
    }
}
