//! Positive-test reporting.

mod code_validator;
mod orchestrator;

pub use code_validator::{CodeValidator, TokenBundle};
pub use orchestrator::ReportingOrchestrator;

use async_trait::async_trait;
use chrono::NaiveDate;
use url::Url;

use crate::error::NetworkError;

/// Exposure-key submission seam.
///
/// On mobile targets this is implemented over the platform's exposure
/// notification SDK; [`HttpKeyUploader`] is the plain-HTTP stand-in used by
/// headless tooling.
#[async_trait]
pub trait KeyUploader: Send + Sync {
    async fn upload_keys(
        &self,
        bearer: &str,
        onset: NaiveDate,
        fake: bool,
    ) -> Result<(), NetworkError>;
}

pub struct HttpKeyUploader {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpKeyUploader {
    pub fn new(http: reqwest::Client, publish_base: &Url) -> Result<Self, url::ParseError> {
        Ok(Self { http, endpoint: publish_base.join("v1/gaen/exposed")? })
    }
}

#[async_trait]
impl KeyUploader for HttpKeyUploader {
    async fn upload_keys(
        &self,
        bearer: &str,
        onset: NaiveDate,
        fake: bool,
    ) -> Result<(), NetworkError> {
        let body = serde_json::json!({
            "onset": onset.format("%Y-%m-%d").to_string(),
            "fake": if fake { 1 } else { 0 },
        });
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(bearer)
            .json(&body)
            .send()
            .await
            .map_err(NetworkError::Transport)?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(NetworkError::Status(status));
        }
        Ok(())
    }
}
