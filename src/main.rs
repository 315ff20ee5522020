use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::{Value, json};

use medportal::config::{ConfigError, normalize_base_url};
use medportal::loader::{BoundaryError, ErrorBoundary, ResourceLoader};
use medportal::routing::Resolution;
use medportal::session::SessionError;
use medportal::{ApiError, AppConfig, AuthCoordinator, AuthSnapshot};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Load(#[from] BoundaryError<ApiError>),
    #[error("sign-in failed: {0}")]
    SignInRejected(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "medportal", about = "Telemedicine session and route-guard CLI")]
struct Cli {
    /// Overrides `MEDPORTAL_API_BASE_URL`.
    #[arg(long)]
    api_base_url: Option<String>,

    /// Overrides `MEDPORTAL_TOKEN_PATH`.
    #[arg(long)]
    token_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate the stored token against the profile API.
    Status,
    /// Store a session token and load its profile.
    Login {
        #[arg(long, env = "MEDPORTAL_SESSION_TOKEN")]
        token: String,
    },
    /// Discard the stored token.
    Logout,
    /// Show what navigating to a path would do for the current session.
    Resolve { path: String },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(url) = cli.api_base_url {
        config.api_base_url = normalize_base_url(&url)?;
    }
    if let Some(path) = cli.token_path {
        config.token_path = path;
    }

    let auth = AuthCoordinator::from_config(&config)?;
    let loader = ResourceLoader::new("session", config.loader);

    match cli.command {
        Command::Status => run_status(&auth, &loader).await,
        Command::Login { token } => run_login(&auth, &token).await,
        Command::Logout => run_logout(&auth),
        Command::Resolve { path } => run_resolve(&auth, &path).await,
    }
}

async fn run_status(auth: &AuthCoordinator, loader: &ResourceLoader) -> Result<(), CliError> {
    let boundary = ErrorBoundary::new();
    let cancel = auth.cancel_token();
    let cancel = &cancel;

    // transient profile failures are retried here; the store itself never retries
    let snapshot = boundary
        .run_when("session", loader, cancel, ApiError::is_transient, move |_| async move {
            let snapshot = auth.revalidate(cancel).await;
            if let Some(e) = snapshot.error.as_ref().filter(|e| e.is_transient()) {
                return Err(e.clone());
            }
            Ok(snapshot)
        })
        .await?;

    print_json(&snapshot_json(auth, &snapshot))
}

async fn run_login(auth: &AuthCoordinator, token: &str) -> Result<(), CliError> {
    let snapshot = auth.sign_in(token, &auth.cancel_token()).await?;
    if !snapshot.is_authenticated {
        let reason = snapshot.error.map_or_else(|| "token rejected".to_owned(), |e| e.to_string());
        return Err(CliError::SignInRejected(reason));
    }
    print_json(&json!({
        "session": snapshot_json(auth, &snapshot),
        "redirect": auth.redirect_to_dashboard().map(|r| r.to),
    }))
}

fn run_logout(auth: &AuthCoordinator) -> Result<(), CliError> {
    let redirect = auth.logout()?;
    print_json(&json!({ "signed_out": true, "redirect": redirect.to }))
}

async fn run_resolve(auth: &AuthCoordinator, path: &str) -> Result<(), CliError> {
    auth.ensure_session(&auth.cancel_token()).await;
    let resolution = match auth.resolve(path) {
        Resolution::Render(path) => json!({ "action": "render", "path": path }),
        Resolution::Loading => json!({ "action": "loading" }),
        Resolution::Redirect(redirect) => json!({ "action": "redirect", "to": redirect.to }),
    };
    print_json(&json!({ "requested": path, "resolution": resolution }))
}

fn snapshot_json(auth: &AuthCoordinator, snapshot: &AuthSnapshot) -> Value {
    json!({
        "session_id": auth.session_id().to_string(),
        "authenticated": snapshot.is_authenticated,
        "loading": snapshot.is_loading,
        "user": snapshot.user,
        "error": snapshot.error.as_ref().map(|e| json!({ "code": e.error_code(), "message": e.to_string() })),
    })
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
