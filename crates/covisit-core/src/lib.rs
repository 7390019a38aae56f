//! # Covisit Core Library
//!
//! Privacy-preserving check-in and exposure-matching subsystem: a venue
//! check-in diary, periodic sync of encrypted problematic-event data,
//! overlap detection through an injected presence matcher, and a two-phase
//! positive-test reporting flow padded with indistinguishable decoy
//! traffic.
//!
//! ## Architecture
//!
//! - **Check-in lifecycle**: one active check-in slot, checkout into the
//!   durable diary, deterministic automatic checkout
//! - **Sync engine**: incremental, single-flight fetch of problematic
//!   events with notification dedup and retention pruning
//! - **Decoy scheduler**: exponentially distributed fake reports sharing
//!   the real reporting path
//! - **Reporting**: covid-code validation with a session token cache, then
//!   key and check-in submission under the issued bearer token
//!
//! UI, push presentation and the cryptographic matcher itself are external
//! collaborators, injected through the traits in [`matching`], [`alerts`],
//! [`verify`] and [`reporting`].

pub mod alerts;
pub mod cancel;
pub mod checkin;
pub mod clock;
pub mod config;
pub mod context;
pub mod decoy;
pub mod diary;
pub mod error;
pub mod intervals;
pub mod matching;
pub mod reporting;
pub mod storage;
pub mod sync;
pub mod verify;

pub use alerts::{AlertSink, LogAlertSink};
pub use cancel::CancelToken;
pub use checkin::CheckInManager;
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use context::{AppContext, Collaborators};
pub use decoy::{DecoyRunner, DecoySchedule, ExponentialDistribution, FakeReporter};
pub use diary::{CheckIn, DiaryStore, VenueInfo};
pub use error::{CheckInError, CoreError, NetworkError, ReportError, StorageError};
pub use intervals::{subtract, Interval};
pub use matching::{ExposureEvent, NaiveMatcher, PresenceMatcher, ProblematicEvent};
pub use reporting::{HttpKeyUploader, KeyUploader, ReportingOrchestrator, TokenBundle};
pub use storage::{Database, Store};
pub use sync::{SyncEngine, SyncOutcome};
pub use verify::{AcceptAllVerifier, PayloadVerifier};
