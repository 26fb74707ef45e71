//! tokenkeeper - inspect and drive a persisted auth token lifecycle.

mod app;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokenkeeper_config_and_utils::{init_logging, Config, Paths};
use tokenkeeper_core::{Expiration, StorageScope};

/// tokenkeeper command-line interface.
#[derive(Parser)]
#[command(name = "tokenkeeper")]
#[command(about = "Inspect and drive a persisted auth token lifecycle")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, storage and logs. Defaults to ~/.tokenkeeper
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Storage scope (session, local). Overrides the configured scope
    #[arg(long, global = true)]
    scope: Option<StorageScope>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to the config file
    Init,
    /// Show the current auth state
    Status,
    /// Sign in (only available with a development token)
    SignIn,
    /// Store a token obtained elsewhere
    Set {
        /// Auth token
        #[arg(long)]
        token: String,
        /// Seconds from now, or an RFC 3339 instant
        #[arg(long)]
        expires: Option<Expiration>,
        /// Renew token
        #[arg(long)]
        renew: Option<String>,
        /// Renew token expiry: seconds from now, or an RFC 3339 instant
        #[arg(long, requires = "renew")]
        renew_expires: Option<Expiration>,
        /// User payload as JSON
        #[arg(long)]
        user: Option<Value>,
    },
    /// Clear the stored auth state
    SignOut,
    /// Log token changes until the duration elapses or Ctrl-C
    Watch {
        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(scope) = cli.scope {
        config.storage_scope = scope;
    }

    init_logging(cli.log_level.as_deref().unwrap_or(&config.log_level));

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Init => app::init(&config, &paths)?,
        Commands::Status => app::status(&config, &paths).await?,
        Commands::SignIn => app::sign_in(&config, &paths).await?,
        Commands::Set {
            token,
            expires,
            renew,
            renew_expires,
            user,
        } => {
            let request = app::SetRequest {
                token,
                expires,
                renew,
                renew_expires,
                user,
            };
            app::set(&config, &paths, request).await?
        }
        Commands::SignOut => app::sign_out(&config, &paths).await?,
        Commands::Watch { seconds } => app::watch(&config, &paths, seconds).await?,
    }

    Ok(())
}
