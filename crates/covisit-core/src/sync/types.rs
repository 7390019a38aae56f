//! Wire and outcome types for the problematic-event sync.

use serde::{Deserialize, Serialize};

use crate::matching::ProblematicEvent;

/// One fetch of the problematic-event feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicEventBatch {
    #[serde(default)]
    pub events: Vec<ProblematicEvent>,
}

/// Result of a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncOutcome {
    /// The feed returned a decodable batch this pass.
    pub has_new_data: bool,
    /// At least one exposure was found that has not been alerted on yet.
    pub needs_notification: bool,
}

impl SyncOutcome {
    /// The "nothing happened" outcome used by skip guards and superseded
    /// passes.
    pub fn nothing() -> Self {
        Self::default()
    }
}
