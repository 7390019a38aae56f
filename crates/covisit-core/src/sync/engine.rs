//! Periodic/on-demand sync against the problematic-event feed.
//!
//! Each pass fetches the feed incrementally via the opaque bundle tag,
//! hands the full diary and the full decoded batch to the presence matcher,
//! replaces the stored exposure set with the result and dedups alerts
//! through the notified-id set. Only the latest pass matters: starting a
//! new sync aborts the previous in-flight one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use tokio::task::AbortHandle;
use tracing::{debug, warn};
use url::Url;

use crate::cancel::CancelToken;
use crate::checkin::CheckInManager;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::{CoreError, NetworkError, StorageError};
use crate::matching::{ExposureEvent, PresenceMatcher};
use crate::storage::{keys, Store};
use crate::verify::PayloadVerifier;

use super::types::{ProblematicEventBatch, SyncOutcome};

pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    store: Store,
    check_ins: Arc<CheckInManager>,
    matcher: Arc<dyn PresenceMatcher>,
    verifier: Arc<dyn PayloadVerifier>,
    clock: Arc<dyn Clock>,
    http: reqwest::Client,
    trace_endpoint: Url,
    retention_days: i64,
    in_flight: Mutex<Option<AbortHandle>>,
    last_sync_failed: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        check_ins: Arc<CheckInManager>,
        matcher: Arc<dyn PresenceMatcher>,
        verifier: Arc<dyn PayloadVerifier>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.backend.timeout_secs))
            .build()
            .map_err(NetworkError::Transport)?;
        let trace_endpoint = Url::parse(&config.backend.trace_url)
            .and_then(|base| base.join("v1/traceKeys"))
            .map_err(|e| CoreError::Custom(format!("invalid trace URL: {e}")))?;

        Ok(Self {
            inner: Arc::new(SyncInner {
                store,
                check_ins,
                matcher,
                verifier,
                clock,
                http,
                trace_endpoint,
                retention_days: config.retention.days_to_keep,
                in_flight: Mutex::new(None),
                last_sync_failed: AtomicBool::new(false),
            }),
        })
    }

    /// Whether the most recent pass failed at the network layer.
    pub fn last_sync_failed(&self) -> bool {
        self.inner.last_sync_failed.load(Ordering::SeqCst)
    }

    /// First occurrence of the current run of sync failures, if any.
    pub fn sync_error_since(&self) -> Result<Option<DateTime<Utc>>, StorageError> {
        self.inner.store.get(keys::SYNC_ERROR_SINCE)
    }

    /// The exposure set produced by the latest matching pass.
    pub fn exposure_events(&self) -> Result<Vec<ExposureEvent>, StorageError> {
        Ok(self.inner.store.get(keys::EXPOSURE_EVENTS)?.unwrap_or_default())
    }

    /// Forget a reported exposure, both matcher-side and in the stored set.
    pub fn remove_exposure(&self, exposure: &ExposureEvent) -> Result<(), StorageError> {
        self.inner.matcher.remove_exposure(exposure);
        let events: Vec<ExposureEvent> = self
            .exposure_events()?
            .into_iter()
            .filter(|e| e != exposure)
            .collect();
        self.inner.store.set(keys::EXPOSURE_EVENTS, &events)
    }

    /// Run one sync pass.
    ///
    /// Skips without touching the network when there is nothing to match
    /// against (empty diary, no active check-in) or when the user has
    /// already self-reported -- syncing in either state is wasted work and
    /// a behavioral signal. A pass superseded by a newer one resolves to
    /// [`SyncOutcome::nothing`].
    pub async fn sync(&self, cancel: CancelToken) -> Result<SyncOutcome, CoreError> {
        // A stale open check-in must be closed before matching runs.
        if let Err(err) = self.inner.check_ins.auto_checkout_if_stale() {
            warn!(%err, "auto checkout before sync failed");
        }

        if self.inner.check_ins.diary().is_empty()?
            && self.inner.check_ins.current()?.is_none()
        {
            return Ok(SyncOutcome::nothing());
        }
        if self
            .inner
            .store
            .get::<bool>(keys::MARKED_AS_INFECTED)?
            .unwrap_or(false)
        {
            return Ok(SyncOutcome::nothing());
        }

        let task = {
            let inner = Arc::clone(&self.inner);
            let mut in_flight = self.inner.in_flight.lock().unwrap();
            if let Some(previous) = in_flight.take() {
                previous.abort();
            }
            let task = tokio::spawn(async move { inner.run(cancel).await });
            *in_flight = Some(task.abort_handle());
            task
        };

        match task.await {
            Ok(result) => result,
            Err(err) if err.is_cancelled() => Ok(SyncOutcome::nothing()),
            Err(err) => Err(CoreError::Custom(format!("sync task failed: {err}"))),
        }
    }
}

impl SyncInner {
    async fn run(&self, cancel: CancelToken) -> Result<SyncOutcome, CoreError> {
        self.last_sync_failed.store(false, Ordering::SeqCst);

        let mut request = self
            .http
            .get(self.trace_endpoint.clone())
            .header(ACCEPT, "application/json");
        if let Some(tag) = self.store.get::<i64>(keys::LAST_KEY_BUNDLE_TAG)? {
            request = request.query(&[("lastKeyBundleTag", tag.to_string())]);
        }

        let response = tokio::select! {
            response = request.send() => response,
            _ = cancel.cancelled() => return Ok(SyncOutcome::nothing()),
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => return Err(self.network_failure(NetworkError::Transport(err))?),
        };

        let status = response.status().as_u16();
        // Header lookups are case-insensitive in reqwest.
        let signature = response
            .headers()
            .get("Signature")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let bundle_tag = response
            .headers()
            .get("x-key-bundle-tag")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<i64>().ok());

        let body = tokio::select! {
            body = response.bytes() => body,
            _ = cancel.cancelled() => return Ok(SyncOutcome::nothing()),
        };
        let body = match body {
            Ok(body) => body,
            Err(err) => return Err(self.network_failure(NetworkError::Transport(err))?),
        };

        // An unverifiable payload yields no usable data this round; the
        // cursor and all cached state stay as they were.
        if let Err(err) = self.verifier.verify(signature.as_deref(), &body) {
            return Err(self.network_failure(err)?);
        }

        // The tag is server-side pagination progress, not content
        // correctness; persist it whenever the response carries one.
        if let Some(tag) = bundle_tag {
            debug!(tag, "received new key bundle tag");
            self.store.set(keys::LAST_KEY_BUNDLE_TAG, &tag)?;
        }

        if !matches!(status, 200 | 204 | 304) {
            return Err(self.network_failure(NetworkError::Status(status))?);
        }

        // Clean round trip: the sticky error state ends here.
        self.store.remove(keys::SYNC_ERROR_SINCE)?;

        let batch: ProblematicEventBatch = match serde_json::from_slice(&body) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(%err, "problematic-event batch failed to decode");
                return Ok(SyncOutcome::nothing());
            }
        };

        if cancel.is_cancelled() {
            return Ok(SyncOutcome::nothing());
        }

        self.matcher.clean_up_old_data(self.retention_days);
        let diary = self.check_ins.diary();
        diary.prune_older_than_at(self.retention_days, self.clock.now())?;

        let records = diary.all()?;
        let events = self.matcher.find_matches(&records, &batch.events);
        self.store.set(keys::EXPOSURE_EVENTS, &events)?;

        let mut notified: Vec<String> =
            self.store.get(keys::NOTIFIED_IDS)?.unwrap_or_default();
        let mut fresh: Vec<String> = Vec::new();
        for id in events.iter().map(|e| &e.checkin_id) {
            if !notified.contains(id) && !fresh.contains(id) {
                fresh.push(id.clone());
            }
        }
        notified.extend(fresh.iter().cloned());
        self.store.set(keys::NOTIFIED_IDS, &notified)?;

        debug!(
            exposures = events.len(),
            newly_notified = fresh.len(),
            "sync pass complete"
        );
        Ok(SyncOutcome { has_new_data: true, needs_notification: !fresh.is_empty() })
    }

    /// Record the failure in the sticky error state and hand the typed
    /// error back for propagation.
    fn network_failure(&self, err: NetworkError) -> Result<CoreError, StorageError> {
        self.last_sync_failed.store(true, Ordering::SeqCst);
        if self
            .store
            .get::<DateTime<Utc>>(keys::SYNC_ERROR_SINCE)?
            .is_none()
        {
            self.store.set(keys::SYNC_ERROR_SINCE, &self.clock.now())?;
        }
        Ok(err.into())
    }
}
