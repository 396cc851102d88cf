//! Zen CLI - schedule-based app blocker
//!
//! Runs the blocking daemon and talks to it over a Unix socket:
//! - Per-app block windows, or all-day blocking
//! - A full-screen overlay when a blocked app comes to the front
//! - Short breaks that end on their own

use anyhow::Result;
use clap::{CommandFactory, Parser};

use zen::cli::{Cli, Commands, Display, IpcClient};
use zen::config::ZenConfig;
use zen::daemon::run_daemon;

/// Main entry point
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    if let Err(e) = execute(cli).await {
        Display::show_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

/// Initializes the tracing subscriber for logging.
///
/// `RUST_LOG` wins; otherwise the level is `warn`, or `debug` with `--verbose`.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

/// Loads the config named on the command line, or the default one.
fn load_config(cli: &Cli) -> Result<ZenConfig> {
    let config = match &cli.config {
        Some(path) => ZenConfig::load_from(path)?,
        None => ZenConfig::load()?,
    };
    Ok(config)
}

/// Executes the CLI command.
async fn execute(cli: Cli) -> Result<()> {
    if cli.verbose {
        tracing::info!("Verbose mode enabled");
    }

    let Some(command) = cli.command.clone() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        generate_completions(shell);
        return Ok(());
    }

    let config = load_config(&cli)?;
    if let Commands::Daemon = command {
        return run_daemon(config).await;
    }

    let client = IpcClient::from_config(&config)?;
    match command {
        Commands::Status => {
            let response = client.status().await?;
            Display::show_status(&response);
        }
        Commands::List => {
            let response = client.list().await?;
            Display::show_list(&response);
        }
        Commands::Block(args) => {
            let response = client.schedule(&args.app, args.schedule()).await?;
            Display::show_schedule_success(&response);
        }
        Commands::Unblock { app } => {
            let response = client.remove(&app).await?;
            Display::show_message(&response);
        }
        Commands::Clear { app } => {
            let response = client
                .schedule(&app, zen::types::Schedule::Unrestricted)
                .await?;
            Display::show_schedule_success(&response);
        }
        Commands::Break { app } => {
            let response = client.grant_break(&app).await?;
            Display::show_break_success(&response);
        }
        Commands::Dismiss { app } => {
            let response = client.dismiss(&app).await?;
            Display::show_message(&response);
        }
        Commands::Foreground { app } => {
            let response = client.foreground(app).await?;
            Display::show_message(&response);
        }
        Commands::Display { state } => {
            let response = client.display(state.is_on()).await?;
            Display::show_message(&response);
        }
        Commands::Permission { permission, state } => {
            let response = client.permission(permission, state.is_granted()).await?;
            Display::show_message(&response);
        }
        Commands::StopDaemon => {
            let response = client.shutdown().await?;
            Display::show_message(&response);
        }
        Commands::Daemon | Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Generates shell completion scripts.
fn generate_completions(shell: clap_complete::Shell) {
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();
    generate(shell, &mut cmd, bin_name, &mut io::stdout());
}

// ============================================================================
// Tests
// ============================================================================
