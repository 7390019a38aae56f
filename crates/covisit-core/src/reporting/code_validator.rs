//! One-time covid-code validation.
//!
//! Exchanges a covid code for a bearer token whose claims carry the onset
//! date. A 404 means the code is unknown or already spent -- terminal for
//! that code. Every decode miss surfaces as a parse error on the same
//! channel as network failures; the caller cannot act differently.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::NaiveDate;
use serde::Deserialize;
use url::Url;

use crate::error::{NetworkError, ReportError};

/// A validated code: the bearer token to report under and the onset date
/// embedded in its claims.
#[derive(Debug, Clone)]
pub struct TokenBundle {
    pub code: String,
    pub token: String,
    pub onset: NaiveDate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TokenClaims {
    onset: Option<String>,
    keydate: Option<String>,
}

pub struct CodeValidator {
    http: reqwest::Client,
    endpoint: Url,
}

impl CodeValidator {
    pub fn new(http: reqwest::Client, publish_base: &Url) -> Result<Self, url::ParseError> {
        Ok(Self { http, endpoint: publish_base.join("v1/onset")? })
    }

    /// Validate a covid code, fake or real, into a [`TokenBundle`].
    pub async fn validate(&self, code: &str, fake: bool) -> Result<TokenBundle, ReportError> {
        let body = serde_json::json!({
            "authorizationCode": code,
            "fake": if fake { 1 } else { 0 },
        });

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(NetworkError::Transport)?;

        let status = response.status().as_u16();
        if status == 404 {
            return Err(ReportError::InvalidCode);
        }
        if status >= 400 {
            return Err(NetworkError::Status(status).into());
        }

        let payload: AuthorizationResponse =
            response.json().await.map_err(|_| NetworkError::Parse)?;
        let claims = decode_claims(&payload.access_token).ok_or(NetworkError::Parse)?;
        let date = claims.keydate.or(claims.onset).ok_or(NetworkError::Parse)?;
        let onset =
            NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| NetworkError::Parse)?;

        Ok(TokenBundle { code: code.to_string(), token: payload.access_token, onset })
    }
}

/// Decode the claims from the token's payload segment (base64, padded).
fn decode_claims(token: &str) -> Option<TokenClaims> {
    let payload = token.split('.').nth(1)?;
    let mut padded = payload.replace('-', "+").replace('_', "/");
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let bytes = BASE64.decode(padded).ok()?;
    serde_json::from_slice(&bytes).ok()
}
