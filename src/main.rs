use clap::{Parser, Subcommand};
use infinity_admin::{ApiConfig, AppError, AppState, SessionEvent, UpdateProfile};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_TOKEN_FILE: &str = ".infinity/session.json";

/// Command line client for the Infinity admin API
#[derive(Parser, Debug)]
#[command(name = "infinity-admin")]
#[command(about = "Sign in to the Infinity admin API and manage your profile")]
#[command(version)]
struct Cli {
    /// Session file; overrides INFINITY_TOKEN_FILE
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Sign in and store the session
    Login { email: String, password: String },
    /// Show the signed-in profile
    Me,
    /// Change the profile name
    UpdateName { name: String },
    /// End the session
    Logout,
    /// Show whether a session is stored
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "infinity_admin=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_auth_expired() {
                eprintln!("Session expired. Run `infinity-admin login <email> <password>`.");
            } else {
                eprintln!("{}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let mut config = ApiConfig::from_env()?;
    if let Some(path) = cli.token_file {
        config = config.with_token_file(Some(path));
    } else if config.token_file.is_none() {
        config = config.with_token_file(Some(PathBuf::from(DEFAULT_TOKEN_FILE)));
    }

    // Create shared application state; every service below borrows from it
    let state = AppState::from_config(config)?;
    info!(base_url = %state.config.base_url, "Infinity admin client ready");

    // The login redirect arrives as an Expired event
    let mut session_events = state.events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = session_events.recv().await {
            if event == SessionEvent::Expired {
                error!("Session expired, login required");
            }
        }
    });

    match cli.command {
        Command::Login { email, password } => {
            let user = state.session.login(&email, &password).await?;
            println!(
                "Logged in as {} ({})",
                user.name.as_deref().unwrap_or(&user.email),
                user.role.as_deref().unwrap_or("no role")
            );
        }
        Command::Me => {
            let profile = state.users.get_profile().await?;
            println!("{:#?}", profile);
        }
        Command::UpdateName { name } => {
            let profile = state
                .users
                .update_profile(&UpdateProfile::name(name))
                .await?;
            println!("{:#?}", profile);
        }
        Command::Logout => {
            state.session.logout().await?;
            println!("Logged out");
        }
        Command::Status => match state.session.restore().await? {
            Some(user) => println!("Signed in as {} <{}>", user.id, user.email),
            None => println!("Not signed in"),
        },
    }

    Ok(())
}
