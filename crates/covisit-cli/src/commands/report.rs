use clap::Subcommand;

use crate::common;

#[derive(Subcommand)]
pub enum ReportAction {
    /// Validate a covid code and submit keys plus selected check-ins
    Send {
        /// The one-time covid code
        code: String,
        /// Diary entry ids to share; repeatable
        #[arg(long = "checkin")]
        checkins: Vec<String>,
    },
}

pub async fn run(action: ReportAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = common::context()?;
    match action {
        ReportAction::Send { code, checkins } => {
            let selected: Vec<_> = ctx
                .check_ins
                .diary()
                .all()?
                .into_iter()
                .filter(|record| checkins.contains(&record.id))
                .collect();
            let onset = ctx.reporting.report(&code, &selected, false).await?;
            println!("report accepted, onset {onset}");
        }
    }
    Ok(())
}
