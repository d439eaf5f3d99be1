//! Arming and disarming background location tracking.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use fieldsync_client::{StartOutcome, TrackingState};
use fieldsync_core::{Error, TicketId};

use super::check_session;
use crate::context::AppContext;
use crate::output;

#[derive(Args, Debug)]
pub struct TrackCommand {
    #[command(subcommand)]
    pub command: TrackSubcommand,

    /// Grant background location access to the location task
    #[arg(long, global = true)]
    pub allow_background_location: bool,
}

#[derive(Subcommand, Debug)]
pub enum TrackSubcommand {
    /// Start reporting location for a ticket
    Start {
        /// Ticket id
        ticket: String,
    },

    /// Stop reporting location
    Stop,

    /// Show whether the location task is registered
    Status,

    /// Start or stop tracking to match the backend's active ticket
    Sync,
}

pub async fn handle(ctx: &AppContext, cmd: TrackCommand) -> Result<()> {
    match cmd.command {
        TrackSubcommand::Start { ticket } => {
            let id = TicketId::new(ticket).context("Invalid ticket id")?;
            let tracker = ctx.tracker(cmd.allow_background_location);
            match tracker.start(&id).await {
                Ok(StartOutcome::Started) => output::success("Location tracking started"),
                Ok(StartOutcome::AlreadyTracking) => {
                    output::success("Already tracking; active ticket updated")
                }
                Err(Error::PermissionDenied(denied)) => {
                    anyhow::bail!(
                        "Cannot start tracking: {}. Pass --allow-background-location.",
                        denied
                    );
                }
                Err(e) => return Err(e).context("Failed to start tracking"),
            }
            output::field("Ticket", id.as_str());
        }
        TrackSubcommand::Stop => {
            ctx.tracker(false)
                .stop()
                .await
                .context("Failed to stop tracking")?;
            output::success("Location tracking stopped");
        }
        TrackSubcommand::Status => status(ctx).await?,
        TrackSubcommand::Sync => {
            let session = ctx.require_session(cmd.allow_background_location).await?;
            let sync = match session.sync_active_ticket().await {
                Ok(sync) => sync,
                Err(e) => return Err(check_session(&session, e, "Failed to sync").await),
            };

            match &sync.ticket {
                Some(ticket) => output::ticket(ticket),
                None => eprintln!("{}", "No active ticket.".dimmed()),
            }
            match sync.tracking {
                TrackingState::Started => output::success("Location tracking started"),
                TrackingState::AlreadyTracking => output::success("Location tracking active"),
                TrackingState::Stopped => output::success("Location tracking stopped"),
                TrackingState::PermissionDenied(denied) => output::warning(&format!(
                    "Tracking not started: {}. Pass --allow-background-location.",
                    denied
                )),
            }
        }
    }

    Ok(())
}

async fn status(ctx: &AppContext) -> Result<()> {
    let registration = ctx
        .scheduler()
        .registration()
        .await
        .context("Failed to read task registration")?;
    let marker = ctx
        .store()
        .load_active_ticket()
        .await
        .context("Failed to read active ticket")?;

    match registration {
        Some(registration) => {
            output::field("Tracking", &"active".green().to_string());
            output::field("Since", &registration.registered_at.to_rfc3339());
            output::field("Interval", &format!("{}s", registration.interval_secs));
        }
        None => output::field("Tracking", &"inactive".dimmed().to_string()),
    }
    output::field(
        "Ticket",
        marker.as_ref().map(TicketId::as_str).unwrap_or("-"),
    );

    Ok(())
}
