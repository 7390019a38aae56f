//! Signed-payload verification seam for the problematic-event feed.
//!
//! A verification failure means "no usable data this round": the sync pass
//! keeps its cursor and cached state and reports a signature error.

use crate::error::NetworkError;

/// Verifier contract for the feed's detached signature header.
pub trait PayloadVerifier: Send + Sync {
    fn verify(&self, signature: Option<&str>, body: &[u8]) -> Result<(), NetworkError>;
}

/// Accepts every payload. Deployments with a pinned signing key inject
/// their own implementation.
#[derive(Default)]
pub struct AcceptAllVerifier;

impl PayloadVerifier for AcceptAllVerifier {
    fn verify(&self, _signature: Option<&str>, _body: &[u8]) -> Result<(), NetworkError> {
        Ok(())
    }
}
