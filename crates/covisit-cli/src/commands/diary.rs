use clap::Subcommand;

use crate::common;

#[derive(Subcommand)]
pub enum DiaryAction {
    /// Print the diary as JSON
    List,
    /// Remove an entry from the visible diary
    Hide {
        /// Entry identifier
        id: String,
    },
    /// Drop entries older than the given number of days (0 wipes the diary)
    Prune {
        #[arg(long, default_value = "14")]
        days: i64,
    },
}

pub fn run(action: DiaryAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = common::context()?;
    let diary = ctx.check_ins.diary();
    match action {
        DiaryAction::List => {
            println!("{}", serde_json::to_string_pretty(&diary.all()?)?);
        }
        DiaryAction::Hide { id } => {
            diary.hide(&id)?;
            println!("hidden: {id}");
        }
        DiaryAction::Prune { days } => {
            diary.prune_older_than(days)?;
            println!("pruned to {days} days");
        }
    }
    Ok(())
}
