use clap::Subcommand;
use covisit_core::CancelToken;

use crate::common;

#[derive(Subcommand)]
pub enum DecoyAction {
    /// Fire any due decoy submissions (no-op before the scheduled time)
    Run,
    /// Print the next scheduled decoy fire time
    Status,
    /// Recompute the schedule; --force always advances it
    Reschedule {
        #[arg(long)]
        force: bool,
    },
}

pub async fn run(action: DecoyAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = common::context()?;
    match action {
        DecoyAction::Run => {
            let fired = ctx.decoy_runner.run(CancelToken::new()).await?;
            println!("decoys sent: {fired}");
        }
        DecoyAction::Status => match ctx.decoy_schedule.peek()? {
            Some(at) => println!("next decoy: {at}"),
            None => println!("not scheduled yet"),
        },
        DecoyAction::Reschedule { force } => {
            let at = ctx.decoy_schedule.reschedule(force)?;
            println!("next decoy: {at}");
        }
    }
    Ok(())
}
