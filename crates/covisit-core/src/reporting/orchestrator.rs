//! Two-phase report submission.
//!
//! Phase 1 validates a one-time covid code into a bearer token; phase 2
//! submits exposure keys and the selected check-ins under that token. The
//! token is cached per code before phase 2 runs, so a phase-2 failure never
//! forces re-spending a single-use code. Decoy reports travel the exact
//! same path flagged fake; timing, retries and the error surface are
//! indistinguishable on the wire.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use rand::Rng;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::decoy::{DecoySchedule, FakeReporter};
use crate::diary::CheckIn;
use crate::error::{CoreError, NetworkError, ReportError};
use crate::intervals::{subtract, Interval};
use crate::matching::{PresenceMatcher, VenueUploadInfo};
use crate::storage::{keys, Store};

use super::code_validator::{CodeValidator, TokenBundle};
use super::KeyUploader;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserUploadPayload {
    version: u32,
    venue_infos: Vec<VenueUploadInfo>,
}

pub struct ReportingOrchestrator {
    validator: CodeValidator,
    uploader: Arc<dyn KeyUploader>,
    matcher: Arc<dyn PresenceMatcher>,
    decoy: Arc<DecoySchedule>,
    store: Store,
    http: reqwest::Client,
    upload_endpoint: Url,
    /// Codes validated this session whose phase 2 has not completed.
    token_cache: Mutex<HashMap<String, TokenBundle>>,
    /// Codes whose exposure keys already went out; a retry must not
    /// re-submit them.
    keys_submitted: Mutex<HashSet<String>>,
}

impl ReportingOrchestrator {
    pub fn new(
        store: Store,
        matcher: Arc<dyn PresenceMatcher>,
        uploader: Arc<dyn KeyUploader>,
        decoy: Arc<DecoySchedule>,
        config: &Config,
    ) -> Result<Self, CoreError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.backend.timeout_secs))
            .build()
            .map_err(NetworkError::Transport)?;
        let publish_base = Url::parse(&config.backend.publish_url)
            .map_err(|e| CoreError::Custom(format!("invalid publish URL: {e}")))?;
        let validator = CodeValidator::new(http.clone(), &publish_base)
            .map_err(|e| CoreError::Custom(format!("invalid publish URL: {e}")))?;
        let upload_endpoint = publish_base
            .join("v1/userupload")
            .map_err(|e| CoreError::Custom(format!("invalid publish URL: {e}")))?;

        Ok(Self {
            validator,
            uploader,
            matcher,
            decoy,
            store,
            http,
            upload_endpoint,
            token_cache: Mutex::new(HashMap::new()),
            keys_submitted: Mutex::new(HashSet::new()),
        })
    }

    /// Report a positive test (or a decoy shaped exactly like one).
    ///
    /// Returns the onset date for display. Errors are returned to the
    /// caller for inline retry; retrying with the same code reuses the
    /// cached token and skips already-completed sub-steps.
    pub async fn report(
        &self,
        code: &str,
        selected_check_ins: &[CheckIn],
        fake: bool,
    ) -> Result<NaiveDate, ReportError> {
        let bundle = self.token_for(code, fake).await?;

        let keys_already_sent = self.keys_submitted.lock().unwrap().contains(code);
        if !keys_already_sent {
            self.uploader.upload_keys(&bundle.token, bundle.onset, fake).await?;
            self.keys_submitted.lock().unwrap().insert(code.to_string());
        }

        self.send_check_ins(&bundle, selected_check_ins, fake).await?;

        // Full success: the code is consumed.
        self.token_cache.lock().unwrap().remove(code);
        self.keys_submitted.lock().unwrap().remove(code);

        if !fake {
            self.store.set(keys::MARKED_AS_INFECTED, &true)?;
            // Push the next decoy away from the real report.
            self.decoy.reschedule(true)?;
            debug!("positive report submitted");
        }
        Ok(bundle.onset)
    }

    /// Phase 1, memoized: validate the code or reuse the session cache.
    async fn token_for(&self, code: &str, fake: bool) -> Result<TokenBundle, ReportError> {
        let cached = self.token_cache.lock().unwrap().get(code).cloned();
        if let Some(bundle) = cached {
            return Ok(bundle);
        }
        let bundle = self.validator.validate(code, fake).await?;
        self.token_cache
            .lock()
            .unwrap()
            .insert(code.to_string(), bundle.clone());
        Ok(bundle)
    }

    async fn send_check_ins(
        &self,
        bundle: &TokenBundle,
        selected: &[CheckIn],
        fake: bool,
    ) -> Result<(), ReportError> {
        // Overlapping windows at the same venue are uploaded once.
        let mut covered: HashMap<String, Vec<Interval>> = HashMap::new();
        let mut venue_infos: Vec<VenueUploadInfo> = Vec::new();
        for record in selected {
            let Some(window) = record.interval() else { continue };
            let seen = covered.entry(record.venue_token.clone()).or_default();
            for piece in subtract(window, seen) {
                venue_infos.extend(self.matcher.generate_upload_info(
                    &record.venue_token,
                    &record.venue,
                    piece,
                    fake,
                ));
                seen.push(piece);
            }
        }

        let payload = UserUploadPayload { version: 3, venue_infos };
        let response = self
            .http
            .post(self.upload_endpoint.clone())
            .bearer_auth(&bundle.token)
            .json(&payload)
            .send()
            .await
            .map_err(NetworkError::Transport)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(NetworkError::Status(status).into());
        }
        Ok(())
    }
}

fn random_fake_code() -> String {
    rand::thread_rng()
        .gen_range(100_000_000_000u64..=999_999_999_999u64)
        .to_string()
}

#[async_trait]
impl FakeReporter for ReportingOrchestrator {
    async fn report_fake(&self) -> Result<(), ReportError> {
        let code = random_fake_code();
        self.report(&code, &[], true).await.map(|_| ())
    }
}
