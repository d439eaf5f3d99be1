//! One run of the background location task.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde_json::json;

use fieldsync_client::{InvocationOutcome, LocationReporter};
use fieldsync_core::LocationSample;

use crate::context::AppContext;
use crate::output;

#[derive(Args, Debug)]
pub struct ReportLocationArgs {
    /// Latitude in decimal degrees
    #[arg(long, allow_hyphen_values = true, requires = "longitude")]
    pub latitude: Option<f64>,

    /// Longitude in decimal degrees
    #[arg(long, allow_hyphen_values = true, requires = "latitude")]
    pub longitude: Option<f64>,

    /// Horizontal accuracy in meters
    #[arg(long)]
    pub accuracy: Option<f64>,

    /// When the fix was taken (RFC 3339); defaults to now
    #[arg(long)]
    pub recorded_at: Option<DateTime<Utc>>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReportLocationArgs {
    fn samples(&self) -> Vec<LocationSample> {
        let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) else {
            return Vec::new();
        };

        let mut sample = LocationSample::new(latitude, longitude);
        sample.accuracy = self.accuracy;
        if let Some(recorded_at) = self.recorded_at {
            sample.recorded_at = recorded_at;
        }
        vec![sample]
    }
}

/// Runs without the foreground session: credentials come from storage and
/// the outcome never turns into a failing exit status.
pub async fn run(ctx: &AppContext, args: ReportLocationArgs) -> Result<()> {
    let reporter = LocationReporter::from_storage(ctx.config()?, ctx.store(), ctx.scheduler())
        .context("Failed to build reporter")?;

    let outcome = reporter.invoke(&args.samples()).await;

    if args.json {
        return output::json(&outcome_json(&outcome));
    }

    match &outcome {
        InvocationOutcome::NoMarker => eprintln!("{}", "Not tracking any ticket.".dimmed()),
        InvocationOutcome::Reported { ticket } => {
            output::success(&format!("Location reported for {}", ticket))
        }
        InvocationOutcome::Deregistered { ticket } => {
            output::success(&format!("Ticket {} no longer active; tracking stopped", ticket))
        }
        InvocationOutcome::NoSample { ticket } => {
            output::warning(&format!("No location sample for {}", ticket))
        }
        InvocationOutcome::Skipped { ticket, reason } => {
            output::warning(&format!("Skipped report for {}: {}", ticket, reason))
        }
        InvocationOutcome::Failed(err) => output::warning(&format!("Report failed: {}", err)),
    }

    Ok(())
}

fn outcome_json(outcome: &InvocationOutcome) -> serde_json::Value {
    match outcome {
        InvocationOutcome::NoMarker => json!({ "outcome": "noMarker" }),
        InvocationOutcome::Reported { ticket } => json!({ "outcome": "reported", "ticket": ticket }),
        InvocationOutcome::Deregistered { ticket } => {
            json!({ "outcome": "deregistered", "ticket": ticket })
        }
        InvocationOutcome::NoSample { ticket } => json!({ "outcome": "noSample", "ticket": ticket }),
        InvocationOutcome::Skipped { ticket, reason } => json!({
            "outcome": "skipped",
            "ticket": ticket,
            "reason": reason.to_string(),
        }),
        InvocationOutcome::Failed(err) => json!({ "outcome": "failed", "reason": err.to_string() }),
    }
}
