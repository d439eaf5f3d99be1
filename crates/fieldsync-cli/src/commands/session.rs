//! Login, logout and whoami.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::context::AppContext;
use crate::output;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Account password
    #[arg(long, env = "FIELDSYNC_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn login(ctx: &AppContext, args: LoginArgs) -> Result<()> {
    let session = ctx.session(false).await?;

    eprintln!("{}", "Logging in...".dimmed());

    let user = session
        .sign_in(&args.email, &args.password)
        .await
        .context("Failed to login")?;

    ctx.remember_api_url()?;

    output::success("Logged in successfully");
    println!();
    output::field("User", user.display_name());
    if let Some(email) = &user.email {
        output::field("Email", email);
    }
    output::field("Backend", &session.client().base_url().to_string());

    if user.is_password_temporary {
        output::warning("Your password is temporary. Change it before your next shift.");
    }

    Ok(())
}

pub async fn logout(ctx: &AppContext) -> Result<()> {
    let session = ctx.session(false).await?;
    session.logout().await.context("Failed to logout")?;
    output::success("Logged out");
    Ok(())
}

pub async fn whoami(ctx: &AppContext) -> Result<()> {
    let session = ctx.require_session(false).await?;
    let state = session.state();
    let Some(current) = state.session() else {
        anyhow::bail!("Not logged in. Run 'fieldsync login' first.");
    };

    output::field("User", current.user.display_name());
    if let Some(email) = &current.user.email {
        output::field("Email", email);
    }
    if let Some(role) = &current.user.role {
        output::field("Role", role);
    }
    output::field("Backend", &session.client().base_url().to_string());

    Ok(())
}
