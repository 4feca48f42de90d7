//! castplayer - local playback with Chromecast hand-off
//!
//! Plays media from a sample catalog in a local player and moves playback
//! to a Chromecast receiver (and back) at the current position.
//!
//! # Modules
//!
//! - `models` - Catalog items, player/device state, cast status, positions
//! - `api` - Catalog client
//! - `stream` - Remote session traits (catt) and the local player (VLC/mpv)
//! - `controller` - Playback state machine and its event loop
//! - `ui` - Console rendering and input parsing
//! - `cli` / `commands` - Command line surface

pub mod api;
pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod models;
pub mod stream;
pub mod ui;

// Re-export commonly used types
pub use models::{
    DeviceState, Driver, IdleReason, LoadRequest, MediaItem, MediaStatus, PlaybackPosition,
    PlayerState, SeekTarget,
};

pub use api::{Catalog, CatalogClient};
pub use config::Config;
pub use controller::{Command, Controller, ControllerConfig, ControllerHandle, Failure, Snapshot};
