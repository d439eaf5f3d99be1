//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::listen::ListenArgs;
use crate::commands::report::ReportLocationArgs;
use crate::commands::session::LoginArgs;
use crate::commands::tickets::TicketsCommand;
use crate::commands::track::TrackCommand;

/// FieldSync field engineer client.
#[derive(Parser, Debug)]
#[command(name = "fieldsync")]
#[command(author, version = env!("FIELDSYNC_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Backend base URL; remembered after a successful login
    #[arg(long, env = "FIELDSYNC_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Directory holding the session, tracking marker and task registration
    #[arg(long, env = "FIELDSYNC_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with email and password
    Login(LoginArgs),

    /// End the session and stop location tracking
    Logout,

    /// Display the logged-in user
    Whoami,

    /// Ticket operations
    Tickets(TicketsCommand),

    /// Background location tracking
    Track(TrackCommand),

    /// Run one background location task invocation
    ReportLocation(ReportLocationArgs),

    /// Print realtime events until interrupted
    Listen(ListenArgs),
}
