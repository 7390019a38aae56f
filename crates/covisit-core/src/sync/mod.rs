//! Problematic-event sync.

mod engine;
mod types;

pub use engine::SyncEngine;
pub use types::{ProblematicEventBatch, SyncOutcome};
