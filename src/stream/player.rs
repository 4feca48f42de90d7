//! Local Player - VLC/mpv playback support
//!
//! The controller drives the local side through the [`LocalPlayer`] trait.
//! [`ProcessPlayer`] implements it by running VLC or mpv as a child process:
//! - play spawns the player at the pending start offset
//! - pause/resume suspend and continue the process (unix)
//! - seek restarts the player at the new offset

use std::process::Stdio;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Supported local players
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerType {
    /// VLC media player (default)
    #[default]
    Vlc,
    /// mpv media player
    Mpv,
}

impl PlayerType {
    /// Get the command name for this player
    pub fn command(&self) -> &'static str {
        match self {
            PlayerType::Vlc => {
                // On macOS, VLC is an app bundle - check for it
                #[cfg(target_os = "macos")]
                if std::path::Path::new("/Applications/VLC.app").exists() {
                    return "/Applications/VLC.app/Contents/MacOS/VLC";
                }
                "vlc"
            }
            PlayerType::Mpv => "mpv",
        }
    }

    /// Get a display name for this player
    pub fn display_name(&self) -> &'static str {
        match self {
            PlayerType::Vlc => "VLC",
            PlayerType::Mpv => "mpv",
        }
    }

    /// Check if the player is available on the system
    pub async fn is_available(&self) -> bool {
        let cmd = self.command();

        // If it's a full path (macOS app bundle), check if it exists
        if cmd.starts_with('/') {
            return std::path::Path::new(cmd).exists();
        }

        Command::new("which")
            .arg(cmd)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

impl std::fmt::Display for PlayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for PlayerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vlc" => Ok(PlayerType::Vlc),
            "mpv" => Ok(PlayerType::Mpv),
            other => Err(format!("unknown player '{}'", other)),
        }
    }
}

/// Errors from local player operations
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
    #[error("No media loaded")]
    NothingLoaded,
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
}

/// Resolves once loaded media is ready to play, with its duration if known
pub type ReadyHandle = oneshot::Receiver<Result<Option<f64>, PlayerError>>;

/// The local playback element
pub trait LocalPlayer: Send {
    /// Load a media URL; the returned handle resolves when it can be played
    fn load(&mut self, url: &str) -> Result<ReadyHandle, PlayerError>;

    fn play(&mut self) -> Result<(), PlayerError>;

    fn pause(&mut self) -> Result<(), PlayerError>;

    fn stop(&mut self) -> Result<(), PlayerError>;

    /// Seek to an absolute position in seconds
    fn seek(&mut self, position: f64) -> Result<(), PlayerError>;

    /// Set volume (0.0 - 1.0)
    fn set_volume(&mut self, level: f32) -> Result<(), PlayerError>;

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError>;

    fn set_fullscreen(&mut self, _fullscreen: bool) -> Result<(), PlayerError> {
        Ok(())
    }
}

// =============================================================================
// Process Player
// =============================================================================

/// Local player backed by a VLC/mpv child process
pub struct ProcessPlayer {
    player_type: PlayerType,
    url: Option<String>,
    /// Offset the next spawn starts at
    start_at: f64,
    volume: f32,
    muted: bool,
    fullscreen: bool,
    child: Option<Child>,
    suspended: bool,
}

impl ProcessPlayer {
    /// Create a new local player with the specified type
    pub fn new(player_type: PlayerType) -> Self {
        Self {
            player_type,
            url: None,
            start_at: 0.0,
            volume: 1.0,
            muted: false,
            fullscreen: false,
            child: None,
            suspended: false,
        }
    }

    /// Create a VLC player
    pub fn vlc() -> Self {
        Self::new(PlayerType::Vlc)
    }

    /// Create an mpv player
    pub fn mpv() -> Self {
        Self::new(PlayerType::Mpv)
    }

    /// Get the player type
    pub fn player_type(&self) -> PlayerType {
        self.player_type
    }

    /// Whether a player process is currently running
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(_) => {
                self.child = None;
                false
            }
            None => false,
        }
    }

    /// Command line for the current media at the current offset
    fn command(&self, url: &str) -> Command {
        let mut cmd = Command::new(self.player_type.command());
        cmd.arg(url);

        match self.player_type {
            PlayerType::Vlc => {
                if self.start_at > 0.0 {
                    cmd.arg(format!("--start-time={:.0}", self.start_at));
                }
                if self.muted {
                    cmd.arg("--no-audio");
                }
                if self.fullscreen {
                    cmd.arg("--fullscreen");
                }
                cmd.arg("--no-video-title-show"); // Don't show filename overlay
            }
            PlayerType::Mpv => {
                if self.start_at > 0.0 {
                    cmd.arg(format!("--start={:.0}", self.start_at));
                }
                cmd.arg(format!("--volume={:.0}", self.volume * 100.0));
                cmd.arg(format!("--mute={}", if self.muted { "yes" } else { "no" }));
                if self.fullscreen {
                    cmd.arg("--fullscreen");
                }
                cmd.arg("--force-window=immediate"); // Show window immediately
            }
        }

        // Don't capture output - let it display normally
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn(&mut self) -> Result<(), PlayerError> {
        let url = self.url.clone().ok_or(PlayerError::NothingLoaded)?;
        let child = self.command(&url).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PlayerError::NotFound(self.player_type.command().to_string())
            } else {
                PlayerError::StartFailed(e)
            }
        })?;
        info!(player = %self.player_type, start_at = self.start_at, "player started");
        self.child = Some(child);
        self.suspended = false;
        Ok(())
    }

    fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
        }
        self.suspended = false;
    }

    /// Restart a running player so it picks up new settings
    fn respawn_if_running(&mut self) -> Result<(), PlayerError> {
        if self.is_running() {
            self.kill();
            self.spawn()?;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn signal(&mut self, signal: libc::c_int) -> Result<(), PlayerError> {
        let Some(pid) = self.child.as_ref().and_then(|c| c.id()) else {
            return Ok(());
        };
        // SAFETY: pid belongs to a child we spawned and have not reaped
        let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
        if rc == 0 {
            Ok(())
        } else {
            Err(PlayerError::StartFailed(std::io::Error::last_os_error()))
        }
    }
}

impl LocalPlayer for ProcessPlayer {
    fn load(&mut self, url: &str) -> Result<ReadyHandle, PlayerError> {
        self.kill();
        self.url = Some(url.to_string());
        self.start_at = 0.0;
        debug!(url, "media loaded");

        // External players do not report duration
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(None));
        Ok(rx)
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        if !self.is_running() {
            return self.spawn();
        }
        if self.suspended {
            #[cfg(unix)]
            self.signal(libc::SIGCONT)?;
            self.suspended = false;
        }
        Ok(())
    }

    #[cfg(unix)]
    fn pause(&mut self) -> Result<(), PlayerError> {
        if self.is_running() && !self.suspended {
            self.signal(libc::SIGSTOP)?;
            self.suspended = true;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn pause(&mut self) -> Result<(), PlayerError> {
        Err(PlayerError::Unsupported("pause"))
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.kill();
        self.start_at = 0.0;
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        self.start_at = position.max(0.0);
        self.respawn_if_running()
    }

    fn set_volume(&mut self, level: f32) -> Result<(), PlayerError> {
        self.volume = level.clamp(0.0, 1.0);
        debug!(volume = self.volume, "volume applies from next start");
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError> {
        self.muted = muted;
        debug!(muted, "mute applies from next start");
        Ok(())
    }

    fn set_fullscreen(&mut self, fullscreen: bool) -> Result<(), PlayerError> {
        self.fullscreen = fullscreen;
        Ok(())
    }
}

impl Drop for ProcessPlayer {
    fn drop(&mut self) {
        self.kill();
    }
}
