use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Session Keeper - keeps an API session alive from the command line
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Base URL of the API
    #[arg(short = 'u', long, env = "API_BASE_URL", default_value = "http://127.0.0.1:5000")]
    pub base_url: String,

    /// Path to the session SQLite database
    #[arg(short = 'd', long, env = "SESSION_DB_FILE")]
    pub db_file: Option<String>,

    /// Page the client starts on
    #[arg(long, env = "START_PAGE", default_value = "/dashboard/")]
    pub page: String,

    /// Proactive refresh interval in seconds
    #[arg(long, env = "TOKEN_REFRESH_INTERVAL", default_value = "1500")]
    pub refresh_interval: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and store the issued tokens
    Login { email: String, password: String },
    /// Show whether a session is stored and what its token claims
    Status,
    /// Renew the access token now
    Refresh,
    /// GET a path through the authenticated client and print the JSON
    Fetch { path: String },
    /// Log out and forget the session
    Logout,
    /// Keep the session fresh until Ctrl+C
    Watch,
}

/// Paths and cadence the session layer works with
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub refresh_path: String,
    pub logout_path: String,
    pub login_api_path: String,
    pub login_page: String,
    pub register_page: String,
    pub landing_page: String,
    /// Pages under this prefix require a session
    pub protected_prefix: String,
    /// Fixed cadence of the proactive refresh cycle
    pub refresh_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            login_api_path: "/api/auth/login".to_string(),
            login_page: "/login".to_string(),
            register_page: "/register".to_string(),
            landing_page: "/dashboard/".to_string(),
            protected_prefix: "/dashboard/".to_string(),
            // Tokens live 30 minutes, renew 5 minutes early
            refresh_interval: Duration::from_secs(25 * 60),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    // API
    pub base_url: String,

    // Session persistence
    pub session_db_file: PathBuf,
    pub start_page: String,

    // HTTP client
    pub http_max_connections: usize,
    pub http_connect_timeout: u64,
    pub http_request_timeout: u64,

    // Logging
    pub log_level: String,

    pub session: SessionSettings,
    pub command: Command,
}

impl Config {
    /// Load configuration from all sources with priority: CLI > ENV > defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Self::from_args(CliArgs::parse())
    }

    /// Build configuration from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let session_db_file = args
            .db_file
            .map(|s| expand_tilde(&s))
            .or_else(default_db_path)
            .context("SESSION_DB_FILE is required (use -d or set SESSION_DB_FILE env var)")?;

        let session = SessionSettings {
            refresh_path: env_or("REFRESH_PATH", "/api/auth/refresh"),
            logout_path: env_or("LOGOUT_PATH", "/api/auth/logout"),
            login_api_path: env_or("LOGIN_API_PATH", "/api/auth/login"),
            refresh_interval: Duration::from_secs(args.refresh_interval),
            ..SessionSettings::default()
        };

        Ok(Config {
            base_url: args.base_url,
            session_db_file,
            start_page: args.page,
            http_max_connections: std::env::var("HTTP_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_connect_timeout: std::env::var("HTTP_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            http_request_timeout: args.http_timeout,
            log_level: args.log_level,
            session,
            command: args.command,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("API_BASE_URL must be an http(s) URL: {}", self.base_url);
        }

        if self.session.refresh_interval.is_zero() {
            anyhow::bail!("TOKEN_REFRESH_INTERVAL must be greater than zero");
        }

        if !self.start_page.starts_with('/') {
            anyhow::bail!("START_PAGE must be an absolute path: {}", self.start_page);
        }

        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Default location of the session database
fn default_db_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("session-keeper").join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
