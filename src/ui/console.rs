//! Interactive console input
//!
//! Parses the lines typed into `castplayer run` into controller commands.

use crate::controller::Command;
use crate::models::SeekTarget;

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Controller(Command),
    /// Print the now playing block
    Status,
    /// Print the catalog
    List,
    Help,
    Quit,
}

pub const HELP: &str = "\
Commands:
  list                 show the catalog
  <n> | select <n>     play catalog item n
  play | pause | p     play, pause, toggle
  stop                 stop playback
  seek <t>             seek to seconds, MM:SS or HH:MM:SS
  seek <n>%            seek to a fraction of the duration
  click <x> <width>    seek to a click on a progress bar
  drag <dx> <width>    seek by a drag of the position indicator
  vol <0-100>          set volume
  mute | unmute        mute control (mute toggle flips it)
  cast | uncast        start or end the remote session
  fullscreen on|off    toggle fullscreen
  status               show what is playing
  quit                 exit";

/// Parse a console line; `Ok(None)` for blank input
pub fn parse_line(line: &str) -> Result<Option<ConsoleInput>, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();
    let arg = |i: usize| -> Result<&str, String> {
        args.get(i)
            .copied()
            .ok_or_else(|| format!("'{}' needs more arguments", head))
    };

    let command = match head.to_lowercase().as_str() {
        "q" | "quit" | "exit" => return Ok(Some(ConsoleInput::Quit)),
        "h" | "help" | "?" => return Ok(Some(ConsoleInput::Help)),
        "l" | "ls" | "list" => return Ok(Some(ConsoleInput::List)),
        "s" | "status" => return Ok(Some(ConsoleInput::Status)),
        "select" => Command::Select(parse_index(arg(0)?)?),
        n if n.chars().all(|c| c.is_ascii_digit()) => Command::Select(parse_index(n)?),
        "play" => Command::Play,
        "pause" => Command::Pause,
        "p" | "toggle" => Command::TogglePlay,
        "stop" => Command::Stop,
        "seek" => Command::Seek(parse_seek(arg(0)?)?),
        "click" => Command::Seek(SeekTarget::click(
            parse_number(arg(0)?)?,
            parse_number(arg(1)?)?,
        )),
        "drag" => Command::Seek(SeekTarget::drag(
            parse_number(arg(0)?)?,
            parse_number(arg(1)?)?,
        )),
        "vol" | "volume" => Command::SetVolume(parse_volume(arg(0)?)?),
        "mute" => match args.first() {
            Some(&"toggle") => Command::ToggleMute,
            _ => Command::Mute(true),
        },
        "unmute" => Command::Mute(false),
        "cast" => Command::RequestSession,
        "uncast" | "disconnect" => Command::EndSession,
        "fullscreen" | "fs" => match args.first().copied() {
            Some("off") => Command::SetFullscreen(false),
            _ => Command::SetFullscreen(true),
        },
        other => return Err(format!("Unknown command '{}'. Type 'help'.", other)),
    };
    Ok(Some(ConsoleInput::Controller(command)))
}

fn parse_index(s: &str) -> Result<usize, String> {
    s.parse()
        .map_err(|_| format!("Invalid catalog index '{}'", s))
}

fn parse_number(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| format!("Invalid number '{}'", s))
}

/// Seconds, a timestamp, or a percentage of the duration
fn parse_seek(s: &str) -> Result<SeekTarget, String> {
    if let Some(pct) = s.strip_suffix('%') {
        return Ok(SeekTarget::Absolute(parse_number(pct)? / 100.0));
    }
    if let Ok(secs) = s.parse::<f64>() {
        if secs.is_finite() {
            return Ok(SeekTarget::Time(secs));
        }
    }
    parse_timestamp(s)
        .map(|secs| SeekTarget::Time(secs as f64))
        .ok_or_else(|| format!("Invalid seek position '{}'", s))
}

/// Parse timestamp string (HH:MM:SS or MM:SS) to seconds
fn parse_timestamp(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            mins.checked_mul(60)?.checked_add(secs)
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: u64 = parts[2].parse().ok()?;
            hours
                .checked_mul(3600)?
                .checked_add(mins.checked_mul(60)?)?
                .checked_add(secs)
        }
        _ => None,
    }
}

/// Volume as 0-100, mapped to 0.0-1.0
fn parse_volume(s: &str) -> Result<f32, String> {
    let level = s
        .trim_end_matches('%')
        .parse::<f32>()
        .map_err(|_| format!("Invalid volume '{}'", s))?;
    Ok((level / 100.0).clamp(0.0, 1.0))
}
