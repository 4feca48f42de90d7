//! CLI - Command Line Interface for castplayer
//!
//! Run without arguments for the interactive player console. The other
//! subcommands are one-shot and scriptable; their output is JSON-parseable.
//!
//! # Examples
//!
//! ```bash
//! # Interactive console, start item 3 and hand off to the TV
//! castplayer run --index 3 --cast -d "Living Room TV"
//!
//! # List the catalog
//! castplayer catalog --json
//!
//! # Receiver status
//! castplayer status -d "Living Room TV"
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::models::{MediaItem, MediaStatus, PlayerState};
use crate::stream::PlayerType;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments
    InvalidArgs = 2,
    /// Network error
    NetworkError = 3,
    /// Device not found
    DeviceNotFound = 4,
    /// Local player not installed
    PlayerNotFound = 5,
    /// Cast failed
    CastFailed = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// castplayer - play locally, hand off to a Chromecast and back
///
/// Run without arguments to launch the interactive console.
#[derive(Parser, Debug)]
#[command(
    name = "castplayer",
    version,
    author = "Gorka & Hermes",
    about = "Dual-mode video player: local playback with Chromecast hand-off",
    long_about = "Plays the sample video catalog in VLC or mpv and hands \
                  playback over to a Chromecast (via catt) at the current \
                  position. Ending the cast session resumes locally.\n\n\
                  Run without arguments to launch the interactive console.",
    after_help = "EXAMPLES:\n\
                  castplayer                           Interactive console\n\
                  castplayer run -i 3 --cast -d TV     Play item 3, cast to TV\n\
                  castplayer catalog --json            List the catalog\n\
                  castplayer status -d TV              Receiver status"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Target Chromecast device name
    #[arg(long, short = 'd', global = true)]
    pub device: Option<String>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run (omit for the interactive console)
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Whether the interactive console runs (no subcommand, or `run`)
    pub fn is_interactive(&self) -> bool {
        matches!(self.command, None | Some(Command::Run(_)))
    }

    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Interactive player console (default)
    #[command(visible_alias = "r")]
    Run(RunCmd),

    /// List the media catalog
    #[command(visible_alias = "ls")]
    Catalog(CatalogCmd),

    /// Get receiver playback status
    Status(StatusCmd),
}

/// Local player choice
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerChoice {
    /// VLC media player (default)
    #[default]
    Vlc,
    /// mpv media player
    Mpv,
}

impl From<PlayerChoice> for PlayerType {
    fn from(choice: PlayerChoice) -> Self {
        match choice {
            PlayerChoice::Vlc => PlayerType::Vlc,
            PlayerChoice::Mpv => PlayerType::Mpv,
        }
    }
}

/// Interactive console options
#[derive(Args, Debug, Default)]
pub struct RunCmd {
    /// Catalog item to start playing
    #[arg(long, short = 'i')]
    pub index: Option<usize>,

    /// Local player (overrides config)
    #[arg(long, short = 'p', value_enum)]
    pub player: Option<PlayerChoice>,

    /// Start a cast session as soon as the receiver is reachable
    #[arg(long)]
    pub cast: bool,

    /// Catalog URL (overrides config)
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Use the built-in catalog, skip the network
    #[arg(long)]
    pub offline: bool,

    /// Load remote media paused
    #[arg(long)]
    pub no_autoplay: bool,
}

/// List the media catalog
#[derive(Args, Debug)]
pub struct CatalogCmd {
    /// Maximum number of items
    #[arg(long, short = 'l')]
    pub limit: Option<usize>,

    /// Catalog URL (overrides config)
    #[arg(long)]
    pub catalog_url: Option<String>,

    /// Use the built-in catalog, skip the network
    #[arg(long)]
    pub offline: bool,
}

/// Get receiver playback status
#[derive(Args, Debug)]
pub struct StatusCmd {}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Generic JSON output wrapper with status
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "is_zero")]
    pub exit_code: i32,
}

fn is_zero(n: &i32) -> bool {
    *n == 0
}

impl<T: Serialize> JsonOutput<T> {
    /// Create success output with data
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: 0,
        }
    }

    /// Create error output (no data)
    pub fn error_msg(msg: impl Into<String>, code: ExitCode) -> JsonOutput<()> {
        JsonOutput::<()> {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// One catalog line
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    pub index: usize,
    pub title: String,
    pub subtitle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub thumbnail: String,
}

impl CatalogEntry {
    pub fn new(index: usize, item: &MediaItem, media_root: &str) -> Self {
        Self {
            index,
            title: item.title.clone(),
            subtitle: item.subtitle.clone(),
            source: item.source_url().map(str::to_string),
            thumbnail: item.thumbnail_url(media_root),
        }
    }
}

/// Receiver status response
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ReceiverStatus {
    pub state: PlayerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    pub position: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muted: Option<bool>,
}

impl ReceiverStatus {
    pub fn idle(device: Option<String>) -> Self {
        Self {
            state: PlayerState::Idle,
            device,
            position: 0.0,
            duration: None,
            progress: None,
            volume: None,
            muted: None,
        }
    }

    pub fn from_status(status: &MediaStatus, device: Option<String>) -> Self {
        Self {
            state: status.player_state,
            device,
            position: status.current_time,
            duration: status.duration,
            progress: status
                .duration
                .filter(|d| *d > 0.0)
                .map(|d| (status.current_time / d).clamp(0.0, 1.0)),
            volume: status.volume.map(|v| (v * 100.0).round() as u8),
            muted: status.muted,
        }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Output handler for consistent formatting
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Print success data
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        if self.json {
            let output = JsonOutput::success(data);
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            // For non-JSON, caller should handle formatting
            println!("{}", serde_json::to_string_pretty(&data)?);
        }
        Ok(())
    }

    /// Print raw JSON on a single line (streamed snapshots)
    pub fn print_json_line<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string(data)?);
        Ok(())
    }

    /// Print error and return exit code
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            let output = JsonOutput::<()>::error_msg(&msg, code);
            if let Ok(json) = serde_json::to_string_pretty(&output) {
                eprintln!("{}", json);
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Print info message (suppressed in quiet mode)
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
