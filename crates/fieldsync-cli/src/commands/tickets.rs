//! Ticket listing and responses.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use fieldsync_core::{AssignmentResponse, TicketId};

use super::check_session;
use crate::context::AppContext;
use crate::output;

#[derive(Args, Debug)]
pub struct TicketsCommand {
    #[command(subcommand)]
    pub command: TicketsSubcommand,

    /// Output tickets as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum TicketsSubcommand {
    /// Show the ticket currently being worked
    Active,

    /// List tickets open for acceptance
    Available,

    /// List assignments awaiting a response
    Pending,

    /// List completed tickets
    History,

    /// Accept an available ticket
    Accept {
        /// Ticket id
        ticket: String,
    },

    /// Accept or reject a pending assignment
    Respond {
        /// Ticket id
        ticket: String,

        /// accepted or rejected
        response: AssignmentResponse,
    },
}

pub async fn handle(ctx: &AppContext, cmd: TicketsCommand) -> Result<()> {
    let session = ctx.require_session(false).await?;
    let tickets = session.client().tickets();

    match cmd.command {
        TicketsSubcommand::Active => {
            let ticket = match tickets.active_ticket().await {
                Ok(ticket) => ticket,
                Err(e) => return Err(check_session(&session, e, "Failed to load active ticket").await),
            };
            match ticket {
                Some(ticket) if cmd.json => output::json_pretty(&ticket)?,
                Some(ticket) => output::ticket(&ticket),
                None if cmd.json => println!("null"),
                None => eprintln!("{}", "No active ticket.".dimmed()),
            }
        }
        TicketsSubcommand::Available => {
            let list = match tickets.available().await {
                Ok(list) => list,
                Err(e) => return Err(check_session(&session, e, "Failed to list tickets").await),
            };
            if cmd.json {
                output::json_pretty(&list)?;
            } else {
                output::tickets(&list, "No available tickets.");
            }
        }
        TicketsSubcommand::Pending => {
            let list = match tickets.pending_assignments().await {
                Ok(list) => list,
                Err(e) => return Err(check_session(&session, e, "Failed to list assignments").await),
            };
            if cmd.json {
                output::json_pretty(&list)?;
            } else {
                output::tickets(&list, "No pending assignments.");
            }
        }
        TicketsSubcommand::History => {
            let list = match tickets.history().await {
                Ok(list) => list,
                Err(e) => return Err(check_session(&session, e, "Failed to load history").await),
            };
            if cmd.json {
                output::json_pretty(&list)?;
            } else {
                output::tickets(&list, "No completed tickets.");
            }
        }
        TicketsSubcommand::Accept { ticket } => {
            let id = TicketId::new(ticket).context("Invalid ticket id")?;
            let message = match tickets.accept(&id).await {
                Ok(message) => message,
                Err(e) => return Err(check_session(&session, e, "Failed to accept ticket").await),
            };
            output::success(message.as_deref().unwrap_or("Ticket accepted"));
        }
        TicketsSubcommand::Respond { ticket, response } => {
            let id = TicketId::new(ticket).context("Invalid ticket id")?;
            let message = match tickets.respond_assignment(&id, response).await {
                Ok(message) => message,
                Err(e) => {
                    return Err(check_session(&session, e, "Failed to respond to assignment").await);
                }
            };
            output::success(message.as_deref().unwrap_or("Response recorded"));
        }
    }

    Ok(())
}
