mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chatsync_core::{ChatClient, ClientConfig, StorageMode};

use crate::cli::{Cli, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = build_client_config(&cli.global)?;
    let client = ChatClient::new(config).await?;

    tracing::debug!(command = ?cli.command, "dispatching command");
    commands::dispatch(cli.command, &client).await
}

/// Build a `ClientConfig` from the config file, profile, and CLI overrides.
fn build_client_config(global: &GlobalOpts) -> Result<ClientConfig, CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(chatsync_config::config_path);
    let cfg = chatsync_config::load_config_from(&path)?;

    let (name, profile) = cfg
        .profile(global.profile.as_deref())
        .map_err(|_| CliError::NoProfile {
            profile: global
                .profile
                .clone()
                .or_else(|| cfg.default_profile.clone())
                .unwrap_or_else(|| "default".into()),
            path: path.display().to_string(),
        })?;

    // A token on the command line stands in for the profile's own.
    let mut profile = profile.clone();
    if let Some(token) = &global.token {
        profile.token = Some(token.clone());
        profile.token_env = None;
    }

    let mut config = chatsync_config::profile_to_client_config(&profile, name, &cfg.defaults)?;
    if global.in_memory {
        config.storage = StorageMode::InMemory;
    }
    if let StorageMode::OnDisk { root } = &config.storage {
        tracing::debug!(root = %root.display(), "using on-disk cache");
    }
    Ok(config)
}
