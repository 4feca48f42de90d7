//! Data structures and types for castplayer
//!
//! Contains the shared models used across the crate organized by domain:
//! - **Catalog**: media items as fetched from the sample catalog
//! - **Playback**: device/player states, drivers and positions
//! - **Cast**: remote status reports, load requests and session info
//! - **Seek**: the two pointer input modes plus explicit times

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Catalog Models
// =============================================================================

/// A single entry of the media catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    /// Thumbnail path, relative to the media source root
    #[serde(default)]
    pub thumb: String,
    /// Playable URLs; only the first one is used
    #[serde(default)]
    pub sources: Vec<String>,
}

impl MediaItem {
    /// First playable source, if the item has one
    pub fn source_url(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    /// Absolute thumbnail URL under the given media root
    pub fn thumbnail_url(&self, root: &str) -> String {
        if self.thumb.starts_with("http://") || self.thumb.starts_with("https://") {
            return self.thumb.clone();
        }
        format!(
            "{}/{}",
            root.trim_end_matches('/'),
            self.thumb.trim_start_matches('/')
        )
    }
}

impl fmt::Display for MediaItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subtitle.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.title, self.subtitle)
        }
    }
}

// =============================================================================
// Playback Models
// =============================================================================

/// Whether a remote session is currently bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    /// No session, receivers may or may not be around
    #[default]
    Idle,
    /// A session is bound and media can be cast
    Active,
    /// A session is bound but a recent remote command failed
    Warning,
    /// The last session request failed
    Error,
}

impl DeviceState {
    /// Active or Warning: a session is bound either way
    pub fn is_connected(&self) -> bool {
        matches!(self, DeviceState::Active | DeviceState::Warning)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Idle => write!(f, "Idle"),
            DeviceState::Active => write!(f, "Active"),
            DeviceState::Warning => write!(f, "Warning"),
            DeviceState::Error => write!(f, "Error"),
        }
    }
}

/// Player state, tracked separately for the local and the remote driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Playing,
    Paused,
    Stopped,
    Seeking,
    Error,
}

impl PlayerState {
    /// Parse a player state reported by a receiver (e.g. "PLAYING")
    pub fn from_cast_state(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PLAYING" => PlayerState::Playing,
            "PAUSED" => PlayerState::Paused,
            "BUFFERING" | "LOADING" => PlayerState::Loading,
            "LOADED" => PlayerState::Loaded,
            "STOPPED" => PlayerState::Stopped,
            "SEEKING" => PlayerState::Seeking,
            "ERROR" => PlayerState::Error,
            _ => PlayerState::Idle,
        }
    }

    /// Playing or Paused: media is loaded and seekable
    pub fn is_engaged(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }

    /// Whether a play/pause affordance should show "pause"
    pub fn shows_pause(&self) -> bool {
        matches!(
            self,
            PlayerState::Loaded | PlayerState::Playing | PlayerState::Seeking
        )
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerState::Idle => write!(f, "IDLE"),
            PlayerState::Loading => write!(f, "LOADING"),
            PlayerState::Loaded => write!(f, "LOADED"),
            PlayerState::Playing => write!(f, "PLAYING"),
            PlayerState::Paused => write!(f, "PAUSED"),
            PlayerState::Stopped => write!(f, "STOPPED"),
            PlayerState::Seeking => write!(f, "SEEKING"),
            PlayerState::Error => write!(f, "ERROR"),
        }
    }
}

/// Which side is authoritative for advancing the playback position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Local,
    Remote,
    #[default]
    None,
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Local => write!(f, "local"),
            Driver::Remote => write!(f, "remote"),
            Driver::None => write!(f, "none"),
        }
    }
}

/// Position inside the current media, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlaybackPosition {
    pub current_time: f64,
    /// `None` while the duration is unknown
    pub duration: Option<f64>,
}

impl PlaybackPosition {
    /// Progress as a fraction (0.0-1.0), 0 while the duration is unknown
    pub fn progress(&self) -> f64 {
        match self.duration {
            Some(d) if d > 0.0 => (self.current_time / d).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Whether the position has reached a known end
    pub fn at_end(&self) -> bool {
        matches!(self.duration, Some(d) if d > 0.0 && self.current_time >= d)
    }
}

impl fmt::Display for PlaybackPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.duration {
            Some(d) => write!(
                f,
                "{} / {}",
                format_seconds(self.current_time),
                format_seconds(d)
            ),
            None => write!(f, "{} / --:--", format_seconds(self.current_time)),
        }
    }
}

// =============================================================================
// Cast Models
// =============================================================================

/// Why a receiver went idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleReason {
    Finished,
    Cancelled,
    Interrupted,
    Error,
}

impl IdleReason {
    /// Parse an idle reason as reported by a receiver (e.g. "FINISHED")
    pub fn from_cast_reason(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "FINISHED" => Some(IdleReason::Finished),
            "CANCELLED" => Some(IdleReason::Cancelled),
            "INTERRUPTED" => Some(IdleReason::Interrupted),
            "ERROR" => Some(IdleReason::Error),
            _ => None,
        }
    }
}

/// Authoritative status report from the remote media session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaStatus {
    pub media_session_id: u64,
    pub player_state: PlayerState,
    pub idle_reason: Option<IdleReason>,
    pub current_time: f64,
    pub duration: Option<f64>,
    pub volume: Option<f32>,
    pub muted: Option<bool>,
}

impl MediaStatus {
    /// Idle because the media played to its end
    pub fn is_finished(&self) -> bool {
        self.player_state == PlayerState::Idle && self.idle_reason == Some(IdleReason::Finished)
    }

    /// Parse status from catt status output
    /// Format:
    /// ```text
    /// State: PLAYING
    /// Duration: 10234.5
    /// Current time: 1234.5
    /// Volume: 80
    /// Volume muted: False
    /// Idle reason: FINISHED
    /// ```
    pub fn parse_catt_status(output: &str, media_session_id: u64) -> Option<Self> {
        let mut state = None;
        let mut idle_reason = None;
        let mut current_time = 0.0;
        let mut duration = None;
        let mut volume = None;
        let mut muted = None;

        for line in output.lines() {
            let line = line.trim();
            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim().to_lowercase();
                let value = value.trim();

                match key.as_str() {
                    "state" => state = Some(PlayerState::from_cast_state(value)),
                    "idle reason" => idle_reason = IdleReason::from_cast_reason(value),
                    "duration" => duration = value.parse::<f64>().ok().filter(|d| *d > 0.0),
                    "current time" => {
                        if let Ok(secs) = value.parse::<f64>() {
                            current_time = secs;
                        }
                    }
                    "volume" => {
                        if let Ok(vol) = value.parse::<f32>() {
                            volume = Some((vol / 100.0).clamp(0.0, 1.0)); // catt reports 0-100
                        }
                    }
                    "volume muted" => muted = Some(value.eq_ignore_ascii_case("true")),
                    _ => {}
                }
            }
        }

        Some(Self {
            media_session_id,
            player_state: state?,
            idle_reason,
            current_time,
            duration,
            volume,
            muted,
        })
    }
}

/// Custom payload attached to a load request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPayload {
    pub title: String,
    pub thumb: String,
}

/// Request to load a media item into the remote session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub content_id: String,
    pub content_type: String,
    pub autoplay: bool,
    /// Start offset in seconds (non-zero when resuming from local playback)
    pub current_time: f64,
    pub custom_data: LoadPayload,
}

impl LoadRequest {
    pub const VIDEO_MP4: &'static str = "video/mp4";

    /// Build a load request for a catalog item, `None` if it has no source
    pub fn for_item(item: &MediaItem, autoplay: bool, current_time: f64) -> Option<Self> {
        Some(Self {
            content_id: item.source_url()?.to_string(),
            content_type: Self::VIDEO_MP4.to_string(),
            autoplay,
            current_time,
            custom_data: LoadPayload {
                title: item.title.clone(),
                thumb: item.thumb.clone(),
            },
        })
    }
}

/// Identity of a bound remote session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub receiver_name: String,
}

/// A media instance loaded inside a remote session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSessionInfo {
    pub media_session_id: u64,
    pub duration: Option<f64>,
    pub current_time: f64,
    pub player_state: PlayerState,
}

// =============================================================================
// Seek Models
// =============================================================================

/// Seek input, keeping the two pointer modes distinct
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeekTarget {
    /// Drag of the position indicator: offset fraction relative to now
    DragRelative(f64),
    /// Click on the progress bar: absolute fraction of the duration
    Absolute(f64),
    /// Explicit position in seconds
    Time(f64),
}

impl SeekTarget {
    /// Drag of `dx` pixels along a progress bar `width` pixels wide
    pub fn drag(dx: f64, width: f64) -> Self {
        SeekTarget::DragRelative(if width > 0.0 { dx / width } else { 0.0 })
    }

    /// Click at `x` pixels along a progress bar `width` pixels wide
    pub fn click(x: f64, width: f64) -> Self {
        SeekTarget::Absolute(if width > 0.0 { x / width } else { 0.0 })
    }

    /// Absolute target time, clamped to the media.
    ///
    /// Fraction targets need a known duration; they resolve to `None` otherwise.
    pub fn resolve(&self, current_time: f64, duration: Option<f64>) -> Option<f64> {
        let target = match (*self, duration) {
            (SeekTarget::DragRelative(frac), Some(d)) => current_time + d * frac,
            (SeekTarget::Absolute(frac), Some(d)) => frac * d,
            (SeekTarget::Time(secs), _) => secs,
            (_, None) => return None,
        };
        let target = target.max(0.0);
        Some(match duration {
            Some(d) => target.min(d),
            None => target,
        })
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Format seconds as HH:MM:SS or MM:SS
pub fn format_seconds(secs: f64) -> String {
    let total_secs = if secs.is_finite() && secs > 0.0 {
        secs as u64
    } else {
        0
    };
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}", mins, secs)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
