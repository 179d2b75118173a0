use anyhow::{Context, Result};
use std::sync::Arc;

use session_keeper::auth::{codec, SqliteStorage};
use session_keeper::config::{Command, Config};
use session_keeper::http_client::ReqwestTransport;
use session_keeper::navigation::{HistoryNavigator, Navigator};
use session_keeper::SessionContext;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!("API: {}", config.base_url);
    tracing::debug!("Session database: {}", config.session_db_file.display());

    let storage = Arc::new(SqliteStorage::open(&config.session_db_file)?);
    let transport = Arc::new(
        ReqwestTransport::new(
            &config.base_url,
            config.http_max_connections,
            config.http_connect_timeout,
            config.http_request_timeout,
        )
        .context("Failed to initialize HTTP transport")?,
    );
    let navigator = Arc::new(HistoryNavigator::new(&config.start_page));

    let ctx = SessionContext::new(
        config.session.clone(),
        storage,
        transport,
        navigator.clone(),
    );

    match config.command.clone() {
        Command::Login { email, password } => {
            ctx.guard
                .login(&email, &password)
                .await
                .context("Login failed")?;
            println!("Logged in as {}", email);
            println!("Continue at: {}", navigator.current_path());
        }

        Command::Status => print_status(&ctx),

        Command::Refresh => match ctx.coordinator.refresh().await {
            Ok(token) => {
                println!("Access token renewed");
                if let Some(exp) = codec::expires_at(&token) {
                    println!("Expires:     {}", exp.to_rfc3339());
                }
            }
            Err(e) => {
                ctx.guard.force_logout();
                anyhow::bail!("Token refresh failed, session cleared: {}", e);
            }
        },

        Command::Fetch { path } => {
            if let Some(access) = ctx.guard.on_page_load() {
                if !access.settled().await {
                    anyhow::bail!("Not logged in (run `session-keeper login`)");
                }
            }

            let response = ctx
                .interceptor
                .get(&path)
                .await
                .with_context(|| format!("Request to {} failed", path))?;

            println!("HTTP {}", response.status);
            println!("{}", serde_json::to_string_pretty(&response.data)?);
        }

        Command::Logout => {
            ctx.guard.logout().await;
            println!("Logged out");
        }

        Command::Watch => {
            if !ctx.guard.is_authenticated() {
                anyhow::bail!("Not logged in (run `session-keeper login`)");
            }

            tracing::info!(
                "Keeping session alive, refreshing every {}s",
                ctx.settings.refresh_interval.as_secs()
            );
            let cycle = ctx.guard.spawn_proactive_refresh();

            shutdown_signal().await;
            cycle.abort();
            tracing::info!("Watch stopped");
        }
    }

    Ok(())
}

/// Print what the stored session says about itself
fn print_status(ctx: &SessionContext) {
    if !ctx.guard.is_authenticated() {
        println!("Not logged in");
        return;
    }

    println!("Logged in");
    if let Some(email) = ctx.store.user_email() {
        println!("  Email:    {}", email);
    }
    if let Some(user) = ctx.guard.user_from_token() {
        println!("  User id:  {}", user.id);
        println!("  Premium:  {}", user.is_premium.unwrap_or(false));
    }
    if let Some(token) = ctx.store.access_token() {
        match codec::expires_at(&token) {
            Some(exp) if codec::is_expired(&token) => {
                println!("  Expired:  {}", exp.to_rfc3339())
            }
            Some(exp) => println!("  Expires:  {}", exp.to_rfc3339()),
            None => println!("  Expires:  unknown"),
        }
    }
    println!(
        "  Refresh token: {}",
        if ctx.store.refresh_token().is_some() {
            "stored"
        } else {
            "missing"
        }
    );
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, stopping...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, stopping...");
        },
    }
}
