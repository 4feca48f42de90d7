//! Playback controller
//!
//! - State: [`PlaybackState`], the pure state machine. Every command and event
//!   is a transition returning the [`Effect`]s to carry out.
//! - Runner: [`Controller`], the single event loop that owns the state,
//!   executes effects against the local player and the remote session, and
//!   publishes a [`Snapshot`] after each step.

pub mod runner;
pub mod state;

pub use runner::{Command, Controller, ControllerConfig, ControllerHandle};
pub use state::{
    damped_volume, Completion, Effect, LocalCommand, PlaybackState, RemoteCommand, StateConfig,
    DEFAULT_TICK_INTERVAL,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{DeviceState, Driver, PlaybackPosition, PlayerState};

/// Failures surfaced by the controller; none of them stop the event loop
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Failure {
    /// Remote service not ready yet; availability is retried with backoff
    #[error("Remote playback unavailable: {0}")]
    Initialization(String),
    #[error("Session request failed: {0}")]
    SessionRequest(String),
    #[error("Load media failed: {0}")]
    LoadMedia(String),
    /// A remote command failed and its optimistic update was rolled back
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
    #[error("Local playback failed: {0}")]
    LocalPlayer(String),
}

/// Read-only view of the controller state for presentation
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub driver: Driver,
    pub device_state: DeviceState,
    pub local_state: PlayerState,
    pub cast_state: PlayerState,
    /// State of whichever driver is active
    pub player_state: PlayerState,
    pub media_index: usize,
    pub title: Option<String>,
    pub position: PlaybackPosition,
    pub volume: f32,
    pub muted: bool,
    pub fullscreen: bool,
    /// Receiver name while a session is bound
    pub receiver: Option<String>,
    pub remote_available: bool,
    pub timer_running: bool,
    pub error: Option<String>,
}
