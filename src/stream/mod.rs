//! Playback backends
//!
//! - Cast: remote session, session and media-session traits, catt implementation
//! - Player: local playback element, VLC/mpv implementation

pub mod cast;
pub mod player;

pub use cast::{
    CastError, CattService, JoinedSession, MediaSession, RemoteSessionService, Session,
};
pub use player::{LocalPlayer, PlayerError, PlayerType, ProcessPlayer, ReadyHandle};
