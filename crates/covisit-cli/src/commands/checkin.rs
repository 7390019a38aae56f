use chrono::{DateTime, Utc};
use clap::Subcommand;
use covisit_core::VenueInfo;

use crate::common;

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Check in at a venue
    Start {
        /// The scanned venue payload
        venue_token: String,
        /// Venue display name
        #[arg(long)]
        name: String,
        /// Venue address
        #[arg(long, default_value = "")]
        address: String,
    },
    /// Check out of the current venue
    Out {
        /// Departure time (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Check out automatically if the stay exceeded its cap
    Auto,
    /// Print the active check-in as JSON
    Status,
}

pub fn run(action: CheckinAction) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = common::context()?;
    match action {
        CheckinAction::Start { venue_token, name, address } => {
            let venue = VenueInfo { name, address, auto_checkout_secs: None };
            let record = ctx.check_ins.check_in(venue_token, venue)?;
            println!("checked in at {} ({})", record.venue.name, record.arrival);
        }
        CheckinAction::Out { at } => {
            let record = ctx.check_ins.check_out(at.unwrap_or_else(Utc::now))?;
            println!("checked out: {}", record.id);
        }
        CheckinAction::Auto => match ctx.check_ins.auto_checkout_if_stale()? {
            Some(record) => println!("auto checked out: {}", record.id),
            None => println!("nothing to do"),
        },
        CheckinAction::Status => {
            println!("{}", serde_json::to_string_pretty(&ctx.check_ins.current()?)?);
        }
    }
    Ok(())
}
