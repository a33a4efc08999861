use std::path::PathBuf;

use biblio_session::storage::check_stored_auth;
use biblio_session::{
    ClientConfig, ConfigError, Credentials, FileStore, HttpGateway, SessionController, SessionState,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;


type Controller = SessionController<HttpGateway<FileStore>>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("API unreachable: {0}")]
    ApiUnreachable(String),
}

#[derive(Parser, Debug)]
#[command(name = "biblio", about = "Biblioteca Digital session CLI")]
struct Cli {
    /// Overrides `BIBLIO_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// File holding the persisted token and user snapshot.
    #[arg(long, env = "BIBLIO_STORE", default_value = ".biblio/session.json")]
    store: PathBuf,

    /// Overrides `BIBLIO_REQUEST_TIMEOUT_SECS`.
    #[arg(long)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show stored credentials and validate them against the API.
    Status,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "BIBLIO_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Check that the auth API answers.
    Ping,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli, |key| std::env::var(key).ok())?;
    let gateway = HttpGateway::new(&config, FileStore::new(&cli.store))?;
    let controller = SessionController::new(gateway);

    match cli.command {
        Command::Status => {
            run_status(&controller).await;
            Ok(())
        }
        Command::Login { email, password } => run_login(&controller, Credentials::new(email, password)).await,
        Command::Logout => {
            controller.logout().await;
            println!("logged out");
            Ok(())
        }
        Command::Ping => run_ping(&controller).await,
    }
}

/// Flags shadow their `BIBLIO_*` variables before anything is validated,
/// so a bad environment value cannot block a valid override.
fn build_config(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Result<ClientConfig, CliError> {
    let flag = |key: &str| match key {
        "BIBLIO_API_URL" => cli.api_url.clone(),
        "BIBLIO_REQUEST_TIMEOUT_SECS" => cli.timeout_secs.map(|secs| secs.to_string()),
        _ => None,
    };
    Ok(ClientConfig::from_vars(|key| flag(key).or_else(|| env(key)))?)
}

async fn run_status(controller: &Controller) {
    let stored = check_stored_auth(controller.gateway().store());
    println!("token:     {}", presence(stored.has_token));
    println!("user_data: {}", presence(stored.has_user));

    controller.initialize().await;
    for line in describe(&controller.state()) {
        println!("{line}");
    }
}

async fn run_login(controller: &Controller, credentials: Credentials) -> Result<(), CliError> {
    if !controller.login(&credentials).await {
        return Err(CliError::LoginFailed(controller.last_error().unwrap_or_default()));
    }
    for line in describe(&controller.state()) {
        println!("{line}");
    }
    Ok(())
}

async fn run_ping(controller: &Controller) -> Result<(), CliError> {
    let health = controller.gateway().probe().await;
    if !health.connected {
        return Err(CliError::ApiUnreachable(health.error.unwrap_or_default()));
    }
    match health.error {
        Some(error) => println!("connected ({error})"),
        None => println!("ok"),
    }
    Ok(())
}

fn presence(flag: bool) -> &'static str {
    if flag { "present" } else { "absent" }
}

/// Human-readable lines for a session snapshot.
fn describe(state: &SessionState) -> Vec<String> {
    let mut lines = vec![format!("status:    {}", state.status())];
    if let Some(user) = state.current_user() {
        lines.push(format!("user:      {} <{}>", user.display_name(), user.email));
        lines.push(format!("type:      {}", user.account_type));
    }
    if let Some(error) = state.last_error() {
        lines.push(format!("error:     {error}"));
    }
    lines
}
