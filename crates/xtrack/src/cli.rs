//! Command-line definitions.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

/// Watch accounts for follow and unfollow activity.
#[derive(Parser, Debug)]
#[command(name = "xtrack")]
#[command(version)]
#[command(
    long_about = "xtrack polls the social-graph API for every watched account, records follow and unfollow events in a local SQLite database, and announces changes on Discord and Telegram."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the reconciliation loop until interrupted
    Run,

    /// Start watching an account and store its current following set
    Add {
        /// Username, with or without a leading @
        username: String,
    },

    /// Stop watching an account and delete its history
    Remove {
        username: String,
    },

    /// List watched accounts
    List,

    /// Show recorded follow and unfollow events for an account
    Events {
        username: String,

        /// Only events detected at or after this RFC3339 time
        #[arg(long, value_parser = parse_rfc3339)]
        since: Option<DateTime<Utc>>,
    },

    /// Show tracker status
    Status,

    /// Run one reconciliation cycle now
    Check,
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC3339 timestamp such as 2025-01-31T12:00:00Z: {e}"))
}
