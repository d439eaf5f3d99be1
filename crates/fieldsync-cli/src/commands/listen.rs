//! Listen command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use serde_json::json;

use fieldsync_client::{ChannelEvent, RealtimeChannelManager};

use crate::context::AppContext;
use crate::output;

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Output events as JSON
    #[arg(long)]
    pub json: bool,

    /// Only print events whose name starts with this prefix
    #[arg(long)]
    pub filter: Option<String>,
}

pub async fn run(ctx: &AppContext, args: ListenArgs) -> Result<()> {
    let session = ctx.require_session(false).await?;
    let token = session
        .client()
        .access_token()
        .context("No access token in session")?;

    let manager = RealtimeChannelManager::new(ctx.config()?);
    let _auth = session.watch_auth_events();
    let _follow = manager.follow(session.client().subscribe_token());

    eprintln!("{}", "Connecting to realtime channel...".dimmed());
    manager
        .ensure(&token)
        .await
        .context("Failed to open realtime channel")?;
    eprintln!("{}", "Press Ctrl+C to stop.".dimmed());
    eprintln!();

    // Survives the channel being replaced after a token refresh.
    let mut events = manager.events();
    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => print_event(&event, &args)?,
                None => {
                    output::warning("Realtime channel closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                manager.close().await;
                break;
            }
        }
    }

    Ok(())
}

fn print_event(event: &ChannelEvent, args: &ListenArgs) -> Result<()> {
    if let Some(prefix) = &args.filter
        && !event.event.starts_with(prefix.as_str())
    {
        return Ok(());
    }

    if args.json {
        return output::json(&json!({ "event": event.event, "data": event.data }));
    }

    println!("{} {}", event.event.green(), event.data);
    Ok(())
}
