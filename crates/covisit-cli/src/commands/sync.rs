use clap::Subcommand;
use covisit_core::{AlertSink, CancelToken};

use crate::common;

#[derive(Subcommand)]
pub enum SyncAction {
    /// Run one sync pass against the problematic-event feed
    Run,
    /// Print sync status and the current exposure set as JSON
    Status,
}

pub async fn run(action: SyncAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = common::context()?;
    match action {
        SyncAction::Run => {
            let outcome = ctx.sync.sync(CancelToken::new()).await?;
            if outcome.needs_notification {
                ctx.alerts.show_exposure_alert();
            }
            println!(
                "new data: {}, needs notification: {}",
                outcome.has_new_data, outcome.needs_notification
            );
        }
        SyncAction::Status => {
            let status = serde_json::json!({
                "lastSyncFailed": ctx.sync.last_sync_failed(),
                "errorSince": ctx.sync.sync_error_since()?,
                "exposureEvents": ctx.sync.exposure_events()?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }
    Ok(())
}
