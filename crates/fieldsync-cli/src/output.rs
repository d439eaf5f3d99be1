//! Output formatting helpers.

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;

use fieldsync_core::Ticket;

/// Print a success message.
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning to stderr.
pub fn warning(msg: &str) {
    eprintln!("{} {}", "!".yellow(), msg);
}

/// Print a labeled field.
pub fn field(label: &str, value: &str) {
    println!("{}: {}", label.dimmed(), value);
}

/// Print a value as compact JSON.
pub fn json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string(value)?;
    println!("{}", json);
    Ok(())
}

/// Print a value as pretty-printed JSON.
pub fn json_pretty<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

/// Print one ticket as a summary line.
pub fn ticket(ticket: &Ticket) {
    let number = ticket.ticket_id.as_deref().unwrap_or("-");
    let status = ticket.status.as_deref().unwrap_or("unknown");
    println!(
        "{} {} {}",
        number.bold(),
        format!("[{}]", status).cyan(),
        ticket.id.as_str().dimmed()
    );

    if let Some(company) = &ticket.company_name {
        println!("  {}", company);
    }
    if let Some(address) = &ticket.site_address {
        println!("  {}", address.dimmed());
    }
}

/// Print a ticket list, or a note when it is empty.
pub fn tickets(tickets: &[Ticket], empty: &str) {
    if tickets.is_empty() {
        eprintln!("{}", empty.dimmed());
        return;
    }

    for t in tickets {
        ticket(t);
    }
}
