//! Now Playing view
//!
//! Renders a controller [`Snapshot`] as text: title, progress bar, position,
//! volume and the cast indicator.

use crate::controller::Snapshot;
use crate::models::{format_seconds, DeviceState, Driver, PlayerState};

/// Width of the progress bar in characters
pub const BAR_WIDTH: usize = 40;

/// Progress bar for a fraction (0.0 - 1.0)
pub fn progress_bar(progress: f64, width: usize) -> String {
    let progress = if progress.is_finite() {
        progress.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = ((progress * width as f64) as usize).min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// Icon for the state of the active driver
pub fn state_icon(state: PlayerState) -> &'static str {
    match state {
        PlayerState::Playing => "▶",
        PlayerState::Paused => "⏸",
        PlayerState::Loading | PlayerState::Seeking => "…",
        PlayerState::Error => "✖",
        _ => "■",
    }
}

/// Cast icon: off, connected, or connected with a failing command
pub fn cast_indicator(snapshot: &Snapshot) -> &'static str {
    match snapshot.device_state {
        DeviceState::Active => "[cast: on]",
        DeviceState::Warning => "[cast: on!]",
        DeviceState::Error => "[cast: error]",
        DeviceState::Idle if snapshot.remote_available => "[cast: off]",
        DeviceState::Idle => "[cast: n/a]",
    }
}

/// "PLAYING on Living Room" while remote media is engaged
pub fn cast_message(snapshot: &Snapshot) -> Option<String> {
    if snapshot.driver != Driver::Remote {
        return None;
    }
    let receiver = snapshot.receiver.as_deref()?;
    match snapshot.cast_state {
        PlayerState::Idle | PlayerState::Stopped => Some(format!("Connected to {}", receiver)),
        state => Some(format!("{} on {}", state, receiver)),
    }
}

/// Compact single-line status
pub fn status_line(snapshot: &Snapshot) -> String {
    let title = snapshot.title.as_deref().unwrap_or("-");
    let volume = if snapshot.muted {
        "muted".to_string()
    } else {
        format!("vol {:.0}%", snapshot.volume * 100.0)
    };
    format!(
        "{} {}  {}  {}  {}  {}",
        state_icon(snapshot.player_state),
        title,
        progress_bar(snapshot.position.progress(), 20),
        snapshot.position,
        volume,
        cast_indicator(snapshot),
    )
}

/// Full "now playing" block
pub fn render(snapshot: &Snapshot) -> String {
    let mut lines = Vec::new();
    let title = snapshot.title.as_deref().unwrap_or("Nothing selected");
    lines.push(format!(" {} NOW PLAYING: {}", state_icon(snapshot.player_state), title));
    lines.push(format!(" {}", progress_bar(snapshot.position.progress(), BAR_WIDTH)));

    let duration = match snapshot.position.duration {
        Some(d) => format_seconds(d),
        None => "--:--".to_string(),
    };
    lines.push(format!(
        " {} / {}   {}   Volume: {:.0}%{}",
        format_seconds(snapshot.position.current_time),
        duration,
        snapshot.player_state,
        snapshot.volume * 100.0,
        if snapshot.muted { " (muted)" } else { "" },
    ));

    let mut footer = format!(" {} driver: {}", cast_indicator(snapshot), snapshot.driver);
    if let Some(message) = cast_message(snapshot) {
        footer.push_str(&format!("  {}", message));
    }
    if snapshot.fullscreen {
        footer.push_str("  [fullscreen]");
    }
    lines.push(footer);

    if let Some(error) = &snapshot.error {
        lines.push(format!(" ! {}", error));
    }
    lines.join("\n")
}
