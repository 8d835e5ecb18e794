//! Session commands - login, logout, status.

use anyhow::Result;
use chrono::Utc;
use clap::Args;
use console::{Style, style};
use responder_auth::{CredentialStore, HydrateOutcome, LoginCredentials, SignInStatus};

use super::Context;

/// Arguments for the login command.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account username
    #[arg(short, long)]
    pub username: String,

    /// Account password (prompted for when omitted)
    #[arg(short, long, env = "RESPONDER_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Sign in and persist the session.
pub async fn login(args: LoginArgs, ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;

    if let HydrateOutcome::SignedIn { user_id, .. } = &session.hydrated
        && !ctx.json_output
    {
        println!(
            "{}",
            Style::new()
                .dim()
                .apply_to(format!("Replacing existing session for {}", user_id))
        );
    }

    let password = match args.password {
        Some(password) => password,
        None => rpassword::prompt_password("Password: ")?,
    };

    let credentials = LoginCredentials {
        username: args.username,
        password,
    };

    let profile = session.store.login(&credentials).await?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        let green = Style::new().green();
        println!(
            "{} Signed in as {}",
            green.apply_to("✓"),
            profile.name.as_deref().unwrap_or(&profile.sub)
        );
        if ctx.verbose {
            println!("{}", Style::new().dim().apply_to(format!("User id: {}", profile.sub)));
        }
    }

    Ok(())
}

/// Sign out and remove stored tokens.
pub async fn logout(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    let was_signed_in = matches!(session.hydrated, HydrateOutcome::SignedIn { .. });

    session.store.logout(None).await;

    if ctx.json_output {
        println!("{}", serde_json::json!({ "signed_out": was_signed_in }));
    } else if was_signed_in {
        println!("Signed out.");
    } else {
        println!("No session found.");
    }

    Ok(())
}

/// Show the current session.
pub async fn status(ctx: &Context) -> Result<()> {
    let session = ctx.session().await?;
    let store = &session.store;
    let state = store.snapshot();
    let now = Utc::now();

    let access_age = state
        .access_token_obtained_at
        .map(|at| (now - at).num_seconds());
    let refresh_age = state
        .refresh_token_obtained_at
        .map(|at| (now - at).num_seconds());

    if ctx.json_output {
        let json = serde_json::json!({
            "status": state.status,
            "user_id": state.user_id,
            "authenticated": store.is_authenticated(),
            "access_token_age_secs": access_age,
            "refresh_token_age_secs": refresh_age,
            "access_token_expiring_soon": store.is_access_token_expiring_soon(),
            "refresh_token_expired": store.is_refresh_token_expired(),
            "api_root": ctx.config.api_root(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!("{}", style("Session").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("API:      {}", ctx.config.api_root());

    if state.status != SignInStatus::SignedIn {
        println!("Status:   {}", style("signed out").yellow());
        println!(
            "{}",
            dim.apply_to("Run 'responder login --username <name>' to sign in")
        );
        return Ok(());
    }

    println!("Status:   {}", style("signed in").green());
    if let Some(user_id) = &state.user_id {
        println!("User:     {}", user_id);
    }
    if let Some(age) = access_age {
        let note = if store.is_access_token_expiring_soon() {
            style(" (refreshes on next request)").yellow().to_string()
        } else {
            String::new()
        };
        println!("Access:   obtained {}{}", format_age(age), note);
    }
    if let Some(age) = refresh_age {
        println!("Refresh:  obtained {}", format_age(age));
    }

    Ok(())
}

fn format_age(secs: i64) -> String {
    match secs {
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h {}m ago", s / 3600, (s % 3600) / 60),
        s => format!("{}d ago", s / 86_400),
    }
}
