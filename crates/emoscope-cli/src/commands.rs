//! Command handlers. Each one works against the single session the
//! process creates in `main`.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use futures::StreamExt;
use tracing::{debug, info, warn};

use emoscope_core::auth::{FileTokenStore, SessionState};
use emoscope_core::config::TokenBackend;
use emoscope_core::models::{NewUser, UserProfile, UserRole};
use emoscope_core::{ApiClient, Config, GuardDecision, RouteGuard, SessionManager};

use crate::cli::Command;
use crate::format::{age_display, mask_token, truncate_string};

/// Read by `login` instead of prompting
const ENV_PASSWORD: &str = "EMOSCOPE_PASSWORD";

pub struct CommandContext<'a> {
    pub session: &'a SessionManager,
    pub config: &'a mut Config,
    /// Explicit `--config` path, if any
    pub config_path: Option<&'a Path>,
}

pub async fn run(command: Command, ctx: CommandContext<'_>) -> Result<()> {
    match command {
        Command::Login { username } => login(ctx, username).await,
        Command::Logout => logout(ctx).await,
        Command::Status => status(ctx).await,
        Command::Whoami => whoami(ctx).await,
        Command::Check { path } => check(ctx, &path).await,
        Command::Users => list_users(ctx).await,
        Command::AddUser { username, email, admin } => add_user(ctx, username, email, admin).await,
        Command::Watch => watch(ctx).await,
    }
}

// ============================================================================
// Session
// ============================================================================

async fn login(ctx: CommandContext<'_>, username: Option<String>) -> Result<()> {
    let username = match username.or_else(|| ctx.config.last_username.clone()) {
        Some(name) => name,
        None => prompt_line("Username: ")?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ").context("Failed to read password")?,
    };

    // Settle any stored session first so the login is not raced by it
    ctx.session.initialize().await;

    if !ctx.session.login(&username, &password).await {
        bail!("Login failed. Check your username and password, and that the server is reachable.");
    }

    let name = ctx
        .session
        .user()
        .map(|u| u.display_name())
        .unwrap_or_else(|| username.clone());
    println!("Logged in as {}", name);

    ctx.config.last_username = Some(username);
    if let Err(e) = save_config(ctx.config, ctx.config_path) {
        warn!(error = %e, "Failed to save config");
    }
    Ok(())
}

async fn logout(ctx: CommandContext<'_>) -> Result<()> {
    ctx.session.logout();
    println!("Logged out");
    Ok(())
}

async fn status(ctx: CommandContext<'_>) -> Result<()> {
    ctx.session.initialize().await;
    let state = ctx.session.snapshot();

    println!("Server:   {}", ctx.session.api().base_url());
    println!("Storage:  {}", ctx.session.store_name());
    println!("Session:  {}", state.label());

    if let SessionState::Authenticated { user, token } = &state {
        println!("User:     {}", user.display_name());
        if let Some(ref role) = user.role {
            println!("Role:     {}", role);
        }
        println!("Token:    {}", mask_token(token));
        if ctx.config.token_backend == TokenBackend::File {
            let store = FileTokenStore::new(ctx.config.data_dir()?);
            if let Ok(Some(record)) = store.load_record() {
                println!("Saved:    {}", age_display(record.saved_at, Utc::now()));
            }
        }
    }
    Ok(())
}

async fn whoami(ctx: CommandContext<'_>) -> Result<()> {
    ctx.session.initialize().await;
    let Some(user) = ctx.session.user() else {
        bail!("Not logged in");
    };
    println!("{}", serde_json::to_string_pretty(&user)?);
    Ok(())
}

async fn check(ctx: CommandContext<'_>, path: &str) -> Result<()> {
    let mut guard = RouteGuard::for_session(ctx.session);
    debug!(path, decision = ?guard.check(path), "Before session restore");

    ctx.session.initialize().await;
    let decision = guard.resolve(path).await;
    match decision {
        GuardDecision::Allow => println!("{}: allowed", path),
        GuardDecision::Forbidden => println!("{}: forbidden for this account", path),
        GuardDecision::Redirect { to, from } => println!("{}: redirect to {} (then back to {})", path, to, from),
        GuardDecision::Pending => println!("{}: session unresolved", path),
    }
    Ok(())
}

async fn watch(ctx: CommandContext<'_>) -> Result<()> {
    ctx.session.initialize().await;
    let period = ctx.config.revalidate_period();
    let revalidation = ctx.session.spawn_revalidation(period);
    info!(period_secs = period.as_secs(), "Watching session");

    let mut rx = ctx.session.subscribe();
    print_state(&rx.borrow_and_update());

    let mut decisions = Box::pin(RouteGuard::for_session(ctx.session).decisions("/dashboard"));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                print_state(&rx.borrow_and_update());
            }
            Some(decision) = decisions.next() => {
                debug!(?decision, "Dashboard access");
            }
        }
    }

    revalidation.abort();
    Ok(())
}

fn print_state(state: &SessionState) {
    let now = Utc::now().format("%H:%M:%S");
    match state.user() {
        Some(user) => println!("[{}] {} ({})", now, state.label(), user.display_name()),
        None => println!("[{}] {}", now, state.label()),
    }
}

// ============================================================================
// Users (admin)
// ============================================================================

/// Client for a protected call, or an error if not logged in
async fn authorized(ctx: &CommandContext<'_>) -> Result<ApiClient> {
    ctx.session.initialize().await;
    match ctx.session.authorized_client() {
        Some(client) => Ok(client),
        None => bail!("Not logged in. Run 'emoscope login' first."),
    }
}

async fn list_users(ctx: CommandContext<'_>) -> Result<()> {
    let client = authorized(&ctx).await?;
    let users = match client.list_users().await {
        Ok(users) => users,
        Err(e) => {
            if ctx.session.handle_api_error(&client, &e) {
                bail!("Session expired. Please log in again.");
            }
            return Err(e).context("Failed to list users");
        }
    };

    println!("{:<20} {:<30} {:<6} {}", "USERNAME", "EMAIL", "ROLE", "ACTIVE");
    for user in &users {
        print_user_row(user);
    }
    Ok(())
}

fn print_user_row(user: &UserProfile) {
    println!(
        "{:<20} {:<30} {:<6} {}",
        truncate_string(&user.display_name(), 20),
        truncate_string(user.email.as_deref().unwrap_or("-"), 30),
        user.role.as_deref().unwrap_or("-"),
        match user.is_active {
            Some(true) => "yes",
            Some(false) => "no",
            None => "-",
        }
    );
}

async fn add_user(ctx: CommandContext<'_>, username: String, email: String, admin: bool) -> Result<()> {
    let client = authorized(&ctx).await?;

    let password = rpassword::prompt_password(format!("Password for {}: ", username))
        .context("Failed to read password")?;
    let confirm = rpassword::prompt_password("Confirm password: ").context("Failed to read password")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    if password.is_empty() {
        bail!("Password must not be empty");
    }

    let new_user = NewUser {
        username,
        email,
        password,
        role: if admin { UserRole::Admin } else { UserRole::User },
    };
    let created = match client.create_user(&new_user).await {
        Ok(user) => user,
        Err(e) => {
            if ctx.session.handle_api_error(&client, &e) {
                bail!("Session expired. Please log in again.");
            }
            return Err(e).context("Failed to create user");
        }
    };

    println!("Created {}", created.display_name());
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line).context("Failed to read input")?;
    let line = line.trim().to_string();
    if line.is_empty() {
        bail!("Username required");
    }
    Ok(line)
}

fn save_config(config: &Config, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => config.save_to(path),
        None => config.save(),
    }
}
