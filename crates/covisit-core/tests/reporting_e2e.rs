//! E2E tests for the two-phase reporting flow against a mock backend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use mockito::Matcher;
use rand_pcg::Pcg64;
use rand::SeedableRng;

use covisit_core::clock::FixedClock;
use covisit_core::storage::keys;
use covisit_core::{
    CheckIn, Config, Database, DecoySchedule, FakeReporter, KeyUploader, NaiveMatcher,
    NetworkError, ReportError, ReportingOrchestrator, Store, VenueInfo,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, 10, 0, 0).unwrap()
}

fn bearer_token(claims: &str) -> String {
    format!("header.{}.signature", URL_SAFE_NO_PAD.encode(claims))
}

fn token_response(claims: &str) -> String {
    format!(r#"{{"accessToken":"{}"}}"#, bearer_token(claims))
}

#[derive(Default)]
struct RecordingUploader {
    calls: AtomicU32,
    fail: AtomicBool,
    last_fake: AtomicBool,
}

#[async_trait]
impl KeyUploader for RecordingUploader {
    async fn upload_keys(
        &self,
        _bearer: &str,
        _onset: NaiveDate,
        fake: bool,
    ) -> Result<(), NetworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_fake.store(fake, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            Err(NetworkError::Status(503))
        } else {
            Ok(())
        }
    }
}

struct Fixture {
    store: Store,
    schedule: Arc<DecoySchedule>,
    uploader: Arc<RecordingUploader>,
    orchestrator: ReportingOrchestrator,
}

fn fixture(publish_url: &str) -> Fixture {
    let store = Store::new(Arc::new(Database::open_memory().unwrap()));
    let clock = Arc::new(FixedClock::new(now()));
    let schedule = Arc::new(DecoySchedule::with_rng(
        store.clone(),
        clock,
        0.2,
        Pcg64::seed_from_u64(11),
    ));
    let uploader = Arc::new(RecordingUploader::default());

    let mut config = Config::default();
    config.backend.publish_url = publish_url.to_string();

    let orchestrator = ReportingOrchestrator::new(
        store.clone(),
        Arc::new(NaiveMatcher::new()),
        uploader.clone(),
        schedule.clone(),
        &config,
    )
    .unwrap();

    Fixture { store, schedule, uploader, orchestrator }
}

fn selected_check_in() -> CheckIn {
    let mut record = CheckIn::new(
        "venue-a".into(),
        VenueInfo { name: "Cafe".into(), address: String::new(), auto_checkout_secs: None },
        now() - Duration::hours(30),
    );
    record.id = "c1".into();
    record.departure = Some(now() - Duration::hours(28));
    record
}

#[tokio::test]
async fn full_report_marks_infected_and_reschedules_decoy() {
    let mut server = mockito::Server::new_async().await;
    let onset = server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::PartialJsonString(
            r#"{"authorizationCode":"123456789012","fake":0}"#.into(),
        ))
        .with_status(200)
        .with_body(token_response(r#"{"keydate":"2021-05-20"}"#))
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/v1/userupload")
        .match_header("authorization", Matcher::Regex("^Bearer header\\.".into()))
        .with_status(200)
        .create_async()
        .await;

    let Fixture { store, schedule, uploader, orchestrator } = fixture(&server.url());
    assert!(schedule.peek().unwrap().is_none());

    let onset_date = orchestrator
        .report("123456789012", &[selected_check_in()], false)
        .await
        .unwrap();

    assert_eq!(onset_date, NaiveDate::from_ymd_opt(2021, 5, 20).unwrap());
    onset.assert_async().await;
    upload.assert_async().await;
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
    assert!(!uploader.last_fake.load(Ordering::SeqCst));
    assert_eq!(store.get::<bool>(keys::MARKED_AS_INFECTED).unwrap(), Some(true));
    // The next decoy is pushed away from the real report.
    assert!(schedule.peek().unwrap().is_some());
}

#[tokio::test]
async fn phase_two_retry_reuses_token_and_skips_key_upload() {
    let mut server = mockito::Server::new_async().await;
    let onset = server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::Any)
        .with_status(200)
        .with_body(token_response(r#"{"keydate":"2021-05-20"}"#))
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/v1/userupload")
        .with_status(500)
        .create_async()
        .await;

    let Fixture { uploader, orchestrator, .. } = fixture(&server.url());

    let err = orchestrator
        .report("111222333444", &[selected_check_in()], false)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Network(NetworkError::Status(500))));
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);

    // Retry with the same code: the cached token is reused (the validation
    // endpoint sees exactly one request) and the keys are not re-submitted.
    server
        .mock("POST", "/v1/userupload")
        .with_status(200)
        .create_async()
        .await;
    orchestrator
        .report("111222333444", &[selected_check_in()], false)
        .await
        .unwrap();

    onset.assert_async().await;
    assert_eq!(uploader.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_code_is_terminal_and_never_cached() {
    let mut server = mockito::Server::new_async().await;
    let onset = server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::Any)
        .with_status(404)
        .expect(2)
        .create_async()
        .await;

    let Fixture { store, orchestrator, .. } = fixture(&server.url());

    for _ in 0..2 {
        let err = orchestrator.report("999999999999", &[], false).await.unwrap_err();
        assert!(matches!(err, ReportError::InvalidCode));
    }
    // Both attempts reached the backend: a rejected code is not cached.
    onset.assert_async().await;
    assert_eq!(store.get::<bool>(keys::MARKED_AS_INFECTED).unwrap(), None);
}

#[tokio::test]
async fn malformed_token_claims_surface_as_parse_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"accessToken":"not-a-token"}"#)
        .create_async()
        .await;

    let Fixture { orchestrator, .. } = fixture(&server.url());

    let err = orchestrator.report("123123123123", &[], false).await.unwrap_err();
    assert!(matches!(err, ReportError::Network(NetworkError::Parse)));
}

#[tokio::test]
async fn fake_report_takes_the_identical_path_without_bookkeeping() {
    let mut server = mockito::Server::new_async().await;
    let onset = server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::PartialJsonString(r#"{"fake":1}"#.into()))
        .with_status(200)
        .with_body(token_response(r#"{"keydate":"2021-05-20"}"#))
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/v1/userupload")
        .with_status(200)
        .create_async()
        .await;

    let Fixture { store, schedule, uploader, orchestrator } = fixture(&server.url());

    orchestrator.report_fake().await.unwrap();

    onset.assert_async().await;
    upload.assert_async().await;
    assert!(uploader.last_fake.load(Ordering::SeqCst));
    // No local bookkeeping for decoys.
    assert_eq!(store.get::<bool>(keys::MARKED_AS_INFECTED).unwrap(), None);
    assert!(schedule.peek().unwrap().is_none());
}

#[tokio::test]
async fn overlapping_selected_check_ins_upload_each_window_once() {
    let mut server = mockito::Server::new_async().await;
    // Two overlapping check-ins at one venue must produce non-overlapping
    // upload slices: the second one contributes only its uncovered tail.
    let upload = server
        .mock("POST", "/v1/userupload")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""version":3"#.into()),
            Matcher::Regex(format!(
                r#""intervalStartMs":{}"#,
                (now() - Duration::hours(28)).timestamp_millis()
            )),
        ]))
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::Any)
        .with_status(200)
        .with_body(token_response(r#"{"keydate":"2021-05-20"}"#))
        .create_async()
        .await;

    let Fixture { orchestrator, .. } = fixture(&server.url());

    let first = selected_check_in(); // 30h..28h ago
    let mut second = selected_check_in();
    second.id = "c2".into();
    second.arrival = now() - Duration::hours(29);
    second.departure = Some(now() - Duration::hours(27)); // overlaps first by 1h

    orchestrator
        .report("123456789012", &[first, second], false)
        .await
        .unwrap();

    upload.assert_async().await;
}

#[tokio::test]
async fn failed_key_upload_aborts_before_check_in_submission() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/onset")
        .match_body(Matcher::Any)
        .with_status(200)
        .with_body(token_response(r#"{"keydate":"2021-05-20"}"#))
        .create_async()
        .await;
    let upload = server
        .mock("POST", "/v1/userupload")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let Fixture { uploader, orchestrator, .. } = fixture(&server.url());
    uploader.fail.store(true, Ordering::SeqCst);

    let err = orchestrator
        .report("123456789012", &[selected_check_in()], false)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Network(NetworkError::Status(503))));
    upload.assert_async().await;
}
