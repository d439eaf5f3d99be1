//! Subcommand implementations.

pub mod listen;
pub mod report;
pub mod session;
pub mod tickets;
pub mod track;

use anyhow::{Result, anyhow};
use tracing::warn;

use fieldsync_client::SessionManager;

use crate::cli::Commands;
use crate::context::AppContext;

pub async fn handle(ctx: &AppContext, command: Commands) -> Result<()> {
    match command {
        Commands::Login(args) => session::login(ctx, args).await,
        Commands::Logout => session::logout(ctx).await,
        Commands::Whoami => session::whoami(ctx).await,
        Commands::Tickets(cmd) => tickets::handle(ctx, cmd).await,
        Commands::Track(cmd) => track::handle(ctx, cmd).await,
        Commands::ReportLocation(args) => report::run(ctx, args).await,
        Commands::Listen(args) => listen::run(ctx, args).await,
    }
}

/// Turn a backend error into a command error, ending the session first if
/// the backend no longer accepts it.
pub(crate) async fn check_session(
    session: &SessionManager,
    err: fieldsync_core::Error,
    what: &str,
) -> anyhow::Error {
    if err.requires_login() {
        if let Err(e) = session.logout().await {
            warn!(error = %e, "Logout after rejected session failed");
        }
        return anyhow!("{}: {}. Session ended; run 'fieldsync login' again.", what, err);
    }
    anyhow!("{}: {}", what, err)
}
