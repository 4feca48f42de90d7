//! castplayer - play locally, hand off to a Chromecast and back
//!
//! # Usage
//!
//! ```bash
//! # Interactive console
//! castplayer
//!
//! # Start item 3 and cast it as soon as the receiver answers
//! castplayer run --index 3 --cast --device "Living Room TV"
//!
//! # Scripting
//! castplayer catalog --json
//! castplayer status --json
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use castplayer::cli::{Cli, Command, ExitCode, Output, RunCmd};
use castplayer::commands;
use castplayer::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_error) = load_config(&cli);
    init_tracing(&config);
    if let Some(e) = config_error {
        warn!(error = %format!("{:#}", e), "ignoring invalid config");
    }

    let exit_code = run_cli(cli, config).await;
    std::process::exit(exit_code.into());
}

/// Config file, then environment, then `--device`. An invalid file falls
/// back to defaults; its error is returned for logging once tracing is up.
fn load_config(cli: &Cli) -> (Config, Option<anyhow::Error>) {
    let (config, error) = match Config::load(cli.config.as_deref()) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    let mut config = config.with_env();
    if let Some(device) = &cli.device {
        config.default_device = Some(device.clone());
    }
    (config, error)
}

/// Logs go to stderr so stdout stays parseable
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli, config: Config) -> ExitCode {
    let output = Output::new(&cli);

    match cli.command {
        Some(Command::Run(cmd)) => commands::run_cmd(cmd, &config, &output).await,

        Some(Command::Catalog(cmd)) => commands::catalog_cmd(cmd, &config, &output).await,

        Some(Command::Status(cmd)) => commands::status_cmd(cmd, &config, &output).await,

        None => commands::run_cmd(RunCmd::default(), &config, &output).await,
    }
}
