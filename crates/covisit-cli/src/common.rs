//! Shared context assembly for all subcommands.

use std::sync::Arc;

use covisit_core::{
    AcceptAllVerifier, AppContext, Collaborators, Config, Database, HttpKeyUploader,
    LogAlertSink, NaiveMatcher, SystemClock,
};
use url::Url;

/// Build the subsystem with the headless collaborator set: the plaintext
/// matcher, log-only alerts, plain-HTTP key upload and no feed signature
/// checking.
pub fn context() -> Result<AppContext, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let db = Arc::new(Database::open()?);

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.backend.timeout_secs))
        .build()?;
    let publish_base = Url::parse(&config.backend.publish_url)?;
    let uploader = Arc::new(HttpKeyUploader::new(http, &publish_base)?);

    let collaborators = Collaborators {
        matcher: Arc::new(NaiveMatcher::new()),
        alerts: Arc::new(LogAlertSink),
        uploader,
        verifier: Arc::new(AcceptAllVerifier),
    };

    Ok(AppContext::new(&config, db, collaborators, Arc::new(SystemClock))?)
}
