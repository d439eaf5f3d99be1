//! fieldsync - command-line client for field engineers.
//!
//! A thin wrapper over `fieldsync-client`: log in, inspect tickets, arm and
//! disarm background location tracking, and run the location task body
//! (`report-location`) from an external scheduler such as cron or a systemd
//! timer.

mod cli;
mod commands;
mod context;
mod output;
mod platform;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use cli::Cli;
use context::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let ctx = AppContext::resolve(cli.api_url.as_deref(), cli.data_dir.as_deref())?;
    commands::handle(&ctx, cli.command).await
}

fn init_logging(verbosity: u8, json: bool) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info,fieldsync_client=info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so command output on stdout stays parseable.
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
