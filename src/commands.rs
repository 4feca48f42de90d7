//! CLI Command Handlers
//!
//! Implements the CLI commands on top of the controller and the backends.
//! Each handler takes CLI args, the loaded config and Output, returns ExitCode.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::api::{Catalog, CatalogClient};
use crate::cli::{CatalogCmd, CatalogEntry, ExitCode, Output, ReceiverStatus, RunCmd, StatusCmd};
use crate::config::Config;
use crate::controller::{Command, Controller, ControllerHandle, Snapshot};
use crate::stream::{CastError, CattService, PlayerType, ProcessPlayer};
use crate::ui::{self, ConsoleInput};

/// How long shutdown waits for the controller to stop both drivers
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Catalog from the network, or the built-in copy
async fn load_catalog(url: Option<&str>, offline: bool, config: &Config, output: &Output) -> Catalog {
    if offline {
        return Catalog::builtin();
    }
    let url = url.unwrap_or(&config.catalog_url);
    output.info(format!("Loading catalog from {}...", url));
    CatalogClient::with_url(url).fetch_or_builtin().await
}

fn cast_service(config: &Config) -> CattService {
    CattService::with_path(config.catt_path.clone())
        .with_device(config.default_device.clone())
        .with_poll_interval(config.status_poll_interval())
}

// =============================================================================
// Run Command (interactive console)
// =============================================================================

pub async fn run_cmd(cmd: RunCmd, config: &Config, output: &Output) -> ExitCode {
    let player_type: PlayerType = cmd.player.map(Into::into).unwrap_or(config.player);
    if !player_type.is_available().await {
        return output.error(
            format!(
                "{} not found. Install it or pick another player with --player",
                player_type.display_name()
            ),
            ExitCode::PlayerNotFound,
        );
    }

    let catalog = load_catalog(cmd.catalog_url.as_deref(), cmd.offline, config, output).await;
    if let Some(index) = cmd.index {
        if index >= catalog.len() {
            return output.error(
                format!("No catalog item {} ({} items)", index, catalog.len()),
                ExitCode::InvalidArgs,
            );
        }
    }

    let mut controller_config = config.controller_config();
    if cmd.no_autoplay {
        controller_config.state.autoplay = false;
    }

    let (controller, handle) = Controller::new(
        Arc::new(cast_service(config)),
        Box::new(ProcessPlayer::new(player_type)),
        catalog.clone(),
        controller_config,
    );
    let task = tokio::spawn(controller.run());
    info!(player = %player_type, items = catalog.len(), "controller started");

    if let Some(index) = cmd.index {
        if handle.send(Command::Select(index)).await.is_err() {
            return output.error("Controller stopped unexpectedly", ExitCode::Error);
        }
    }
    if cmd.cast {
        tokio::spawn(request_session_when_available(handle.clone()));
    }

    if !output.json {
        print_catalog(&catalog, &config.media_root);
        output.info(ui::console::HELP);
    }

    let code = console_loop(&handle, &catalog, &config.media_root, output).await;

    let _ = handle.send(Command::Shutdown).await;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await.is_err() {
        warn!("controller did not stop in time");
    }
    code
}

/// Request a session once the remote service reports itself available
async fn request_session_when_available(handle: ControllerHandle) {
    let mut snapshots = handle.subscribe();
    loop {
        if snapshots.borrow_and_update().remote_available {
            break;
        }
        if snapshots.changed().await.is_err() {
            return;
        }
    }
    debug!("remote available, requesting session");
    let _ = handle.send(Command::RequestSession).await;
}

/// Read console lines until quit, EOF or Ctrl-C, echoing state changes
async fn console_loop(
    handle: &ControllerHandle,
    catalog: &Catalog,
    media_root: &str,
    output: &Output,
) -> ExitCode {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut snapshots = handle.subscribe();
    let mut last = snapshots.borrow_and_update().clone();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return ExitCode::Success,
                    Err(e) => return output.error(format!("Failed to read input: {}", e), ExitCode::Error),
                };
                match ui::parse_line(&line) {
                    Ok(None) => {}
                    Ok(Some(ConsoleInput::Quit)) => return ExitCode::Success,
                    Ok(Some(ConsoleInput::Help)) => println!("{}", ui::console::HELP),
                    Ok(Some(ConsoleInput::List)) => print_catalog(catalog, media_root),
                    Ok(Some(ConsoleInput::Status)) => print_snapshot(&handle.snapshot(), output, true),
                    Ok(Some(ConsoleInput::Controller(command))) => {
                        if handle.send(command).await.is_err() {
                            return output.error("Controller stopped unexpectedly", ExitCode::Error);
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    return ExitCode::Success;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if output.json || headline_changed(&last, &snapshot) {
                    print_snapshot(&snapshot, output, false);
                }
                last = snapshot;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return ExitCode::Success;
            }
        }
    }
}

/// Whether anything besides the ticking position changed
fn headline_changed(old: &Snapshot, new: &Snapshot) -> bool {
    old.player_state != new.player_state
        || old.driver != new.driver
        || old.device_state != new.device_state
        || old.title != new.title
        || old.error != new.error
        || old.muted != new.muted
        || old.fullscreen != new.fullscreen
        || (old.volume - new.volume).abs() > f32::EPSILON
}

fn print_snapshot(snapshot: &Snapshot, output: &Output, full: bool) {
    if output.json {
        if let Err(e) = output.print_json_line(snapshot) {
            warn!(error = %e, "failed to serialize snapshot");
        }
    } else if full {
        println!("{}", ui::render(snapshot));
    } else if !output.quiet {
        println!("{}", ui::status_line(snapshot));
    }
}

fn print_catalog(catalog: &Catalog, media_root: &str) {
    for (index, item) in catalog.items().iter().enumerate() {
        let entry = CatalogEntry::new(index, item, media_root);
        let playable = if entry.source.is_some() { "" } else { "  (no source)" };
        println!("{:>3}  {}  - {}{}", entry.index, entry.title, entry.subtitle, playable);
    }
}

// =============================================================================
// Catalog Command
// =============================================================================

pub async fn catalog_cmd(cmd: CatalogCmd, config: &Config, output: &Output) -> ExitCode {
    let catalog = if cmd.offline {
        Catalog::builtin()
    } else {
        let url = cmd.catalog_url.as_deref().unwrap_or(&config.catalog_url);
        match CatalogClient::with_url(url).fetch().await {
            Ok(catalog) => catalog,
            Err(e) => {
                return output.error(
                    format!("Failed to load catalog: {:#}", e),
                    ExitCode::NetworkError,
                )
            }
        }
    };

    let mut entries: Vec<CatalogEntry> = catalog
        .items()
        .iter()
        .enumerate()
        .map(|(index, item)| CatalogEntry::new(index, item, &config.media_root))
        .collect();
    if let Some(limit) = cmd.limit {
        entries.truncate(limit);
    }

    if output.json {
        if let Err(e) = output.print(&entries) {
            return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
        }
    } else {
        for entry in &entries {
            println!("{:>3}  {}  - {}", entry.index, entry.title, entry.subtitle);
        }
    }
    ExitCode::Success
}

// =============================================================================
// Status Command
// =============================================================================

pub async fn status_cmd(_cmd: StatusCmd, config: &Config, output: &Output) -> ExitCode {
    let service = cast_service(config);
    let device = service.device().map(String::from);

    let status = match service.status().await {
        Ok(Some(status)) => ReceiverStatus::from_status(&status, device),
        Ok(None) => ReceiverStatus::idle(device),
        Err(e @ CastError::NotInstalled(_)) => return output.error(e.to_string(), ExitCode::Error),
        Err(CastError::NoDevice) => {
            return output.error(
                "No cast device. Use --device or set CASTPLAYER_DEVICE",
                ExitCode::DeviceNotFound,
            )
        }
        Err(e) => {
            // Unreachable receiver reads as idle
            debug!(error = %e, "status failed");
            ReceiverStatus::idle(device)
        }
    };

    if let Err(e) = output.print(&status) {
        return output.error(format!("Failed to serialize: {}", e), ExitCode::Error);
    }
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceState, PlayerState};

    #[test]
    fn test_position_tick_is_not_a_headline_change() {
        let old = Snapshot::default();
        let mut new = old.clone();
        new.position.current_time = 12.0;
        assert!(!headline_changed(&old, &new));

        new.player_state = PlayerState::Playing;
        assert!(headline_changed(&old, &new));
    }

    #[test]
    fn test_device_state_is_a_headline_change() {
        let old = Snapshot::default();
        let new = Snapshot {
            device_state: DeviceState::Active,
            ..old.clone()
        };
        assert!(headline_changed(&old, &new));
    }

    #[tokio::test]
    async fn test_offline_catalog_skips_network() {
        let output = Output {
            json: true,
            quiet: true,
        };
        let config = Config {
            catalog_url: "http://127.0.0.1:1/unreachable.json".to_string(),
            ..Config::default()
        };
        let catalog = load_catalog(None, true, &config, &output).await;
        assert_eq!(catalog, Catalog::builtin());
    }
}
