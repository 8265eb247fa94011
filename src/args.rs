use clap::{Parser, Subcommand};

use crate::db::models::leaderboard::Period;

#[derive(Parser, Debug)]
#[command(version, about = "Weekly and monthly quiz leaderboards")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the scheduler and the HTTP API (default)
    Serve,

    /// Rebuild leaderboards from the solve records once and exit
    Recompute {
        /// Only this period (`weekly` or `monthly`); both when omitted
        #[arg(short, long)]
        period: Option<Period>,
    },

    /// Announce the current top entry of a period once and exit
    Announce {
        #[arg(short, long)]
        period: Period,

        /// Replace a winner already announced for this window
        #[arg(short, long)]
        force: bool,
    },

    /// Apply database migrations and exit
    Migrate,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
