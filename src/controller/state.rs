//! Playback state machine
//!
//! [`PlaybackState`] holds everything the controller knows. Each operation
//! mutates it and returns the [`Effect`]s the runner has to carry out; nothing
//! in here performs I/O or reads the clock.
//!
//! Ordering rules:
//! - Remote status is authoritative. A progress tick dated before, or within
//!   one tick interval after, the last authoritative update does not write.
//! - Only one progress timer exists. Starting one bumps the epoch; ticks from
//!   older epochs are ignored.
//! - Mode switches bump the generation. Completions and data-ready events
//!   tagged with an older generation are dropped.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Failure, Snapshot};
use crate::api::Catalog;
use crate::models::{
    DeviceState, Driver, LoadRequest, MediaSessionInfo, MediaStatus, PlaybackPosition,
    PlayerState, SeekTarget, SessionInfo,
};
use crate::stream::{CastError, PlayerError};

/// Default progress timer interval
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Effects
// =============================================================================

/// Command for the local player
#[derive(Debug, Clone, PartialEq)]
pub enum LocalCommand {
    Load { url: String },
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetVolume(f32),
    SetMuted(bool),
    SetFullscreen(bool),
}

/// Command for the remote session service, session or media session
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    RequestSession,
    EndSession,
    Load(LoadRequest),
    Play,
    Pause,
    Stop,
    Seek(f64),
    SetVolume(f32),
    SetMuted(bool),
}

impl RemoteCommand {
    pub fn name(&self) -> &'static str {
        match self {
            RemoteCommand::RequestSession => "request session",
            RemoteCommand::EndSession => "end session",
            RemoteCommand::Load(_) => "load",
            RemoteCommand::Play => "play",
            RemoteCommand::Pause => "pause",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Seek(_) => "seek",
            RemoteCommand::SetVolume(_) => "volume",
            RemoteCommand::SetMuted(_) => "mute",
        }
    }

    /// Play/pause/stop/seek: commands whose outcome the receiver reports back
    fn is_transport(&self) -> bool {
        matches!(
            self,
            RemoteCommand::Play | RemoteCommand::Pause | RemoteCommand::Stop | RemoteCommand::Seek(_)
        )
    }
}

/// Side effect requested by a transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Local(LocalCommand),
    /// Run a remote command; its completion must carry `generation` back
    Remote {
        generation: u64,
        command: RemoteCommand,
    },
    /// Replace the progress timer with a new one for `epoch`
    StartTimer { epoch: u64 },
    CancelTimer,
}

/// Outcome of a remote command
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    SessionRequested(Result<SessionInfo, CastError>),
    SessionEnded(Result<(), CastError>),
    MediaLoaded(Result<MediaSessionInfo, CastError>),
    Acknowledged {
        command: RemoteCommand,
        result: Result<(), CastError>,
    },
}

// =============================================================================
// State
// =============================================================================

/// Tunables for a new state machine
#[derive(Debug, Clone, Copy)]
pub struct StateConfig {
    pub tick_interval: Duration,
    pub autoplay: bool,
    pub initial_volume: f32,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            autoplay: true,
            initial_volume: 1.0,
        }
    }
}

/// Controller state
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackState {
    pub device_state: DeviceState,
    pub local_state: PlayerState,
    pub cast_state: PlayerState,
    pub current_media_index: usize,
    pub current_media_time: f64,
    pub current_media_duration: Option<f64>,
    pub current_volume: f32,
    pub muted: bool,
    pub fullscreen: bool,
    pub autoplay: bool,
    pub remote_available: bool,
    pub session: Option<SessionInfo>,
    pub media_session: Option<MediaSessionInfo>,
    pub generation: u64,
    /// Epoch of the running progress timer
    pub timer_epoch: Option<u64>,
    /// Offset the local player seeks to once its media is ready
    pub pending_local_start: Option<f64>,
    pub last_error: Option<Failure>,
    #[serde(skip)]
    tick_interval: Duration,
    #[serde(skip)]
    last_authoritative: Option<Instant>,
    #[serde(skip)]
    epochs: u64,
    #[serde(skip)]
    confirmed_cast: PlayerState,
    #[serde(skip)]
    confirmed_volume: f32,
    /// Remote position to restore when a seek or stop is refused
    #[serde(skip)]
    confirmed_time: f64,
    #[serde(skip)]
    confirmed_muted: bool,
    /// Transport commands sent but not yet acknowledged
    #[serde(skip)]
    in_flight: u32,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::new(StateConfig::default())
    }
}

impl PlaybackState {
    pub fn new(config: StateConfig) -> Self {
        let volume = config.initial_volume.clamp(0.0, 1.0);
        Self {
            device_state: DeviceState::Idle,
            local_state: PlayerState::Idle,
            cast_state: PlayerState::Idle,
            current_media_index: 0,
            current_media_time: 0.0,
            current_media_duration: None,
            current_volume: volume,
            muted: false,
            fullscreen: false,
            autoplay: config.autoplay,
            remote_available: false,
            session: None,
            media_session: None,
            generation: 0,
            timer_epoch: None,
            pending_local_start: None,
            last_error: None,
            tick_interval: config.tick_interval,
            last_authoritative: None,
            epochs: 0,
            confirmed_cast: PlayerState::Idle,
            confirmed_volume: volume,
            confirmed_time: 0.0,
            confirmed_muted: false,
            in_flight: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Remote while a session is bound, local once the local player was used
    pub fn driver(&self) -> Driver {
        if self.session.is_some() {
            Driver::Remote
        } else if self.local_state != PlayerState::Idle {
            Driver::Local
        } else {
            Driver::None
        }
    }

    /// State of the active driver
    pub fn player_state(&self) -> PlayerState {
        match self.driver() {
            Driver::Remote => self.cast_state,
            Driver::Local => self.local_state,
            Driver::None => PlayerState::Idle,
        }
    }

    pub fn position(&self) -> PlaybackPosition {
        PlaybackPosition {
            current_time: self.current_media_time,
            duration: self.current_media_duration,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer_epoch.is_some()
    }

    /// Whether progress ticks should advance the position right now.
    ///
    /// Until remote media is loaded a bound session leaves the local player
    /// running, so its progress still counts.
    fn is_advancing(&self) -> bool {
        match self.driver() {
            Driver::Remote => {
                self.cast_state == PlayerState::Playing
                    || (self.media_session.is_none() && self.local_state == PlayerState::Playing)
            }
            Driver::Local => self.local_state == PlayerState::Playing,
            Driver::None => false,
        }
    }

    pub fn snapshot(&self, catalog: &Catalog) -> Snapshot {
        Snapshot {
            driver: self.driver(),
            device_state: self.device_state,
            local_state: self.local_state,
            cast_state: self.cast_state,
            player_state: self.player_state(),
            media_index: self.current_media_index,
            title: catalog
                .get(self.current_media_index)
                .map(|item| item.title.clone()),
            position: self.position(),
            volume: self.current_volume,
            muted: self.muted,
            fullscreen: self.fullscreen,
            receiver: self.session.as_ref().map(|s| s.receiver_name.clone()),
            remote_available: self.remote_available,
            timer_running: self.is_timer_running(),
            error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn remote(&mut self, command: RemoteCommand) -> Effect {
        if command.is_transport() {
            self.in_flight += 1;
        }
        Effect::Remote {
            generation: self.generation,
            command,
        }
    }

    fn start_timer(&mut self, fx: &mut Vec<Effect>) {
        self.epochs += 1;
        self.timer_epoch = Some(self.epochs);
        fx.push(Effect::StartTimer { epoch: self.epochs });
    }

    fn cancel_timer(&mut self, fx: &mut Vec<Effect>) {
        if self.timer_epoch.take().is_some() {
            fx.push(Effect::CancelTimer);
        }
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.in_flight = 0;
    }

    fn set_cast_confirmed(&mut self, state: PlayerState) {
        self.cast_state = state;
        self.confirmed_cast = state;
    }

    fn set_time_confirmed(&mut self, time: f64) {
        self.current_media_time = time;
        self.confirmed_time = time;
    }

    /// Remember the position a refused seek or stop falls back to. While
    /// another transport command is pending the current time is optimistic.
    fn hold_position(&mut self) {
        if self.in_flight == 0 {
            self.confirmed_time = self.current_media_time;
        }
    }

    fn remote_succeeded(&mut self) {
        if self.device_state == DeviceState::Warning {
            self.device_state = DeviceState::Active;
        }
    }

    fn remote_failed(&mut self, failure: Failure) {
        warn!(error = %failure, "remote command failed");
        if self.device_state.is_connected() {
            self.device_state = DeviceState::Warning;
        }
        self.last_error = Some(failure);
    }

    fn bind_session(&mut self, info: SessionInfo) {
        info!(receiver = %info.receiver_name, session_id = %info.session_id, "session bound");
        self.session = Some(info);
        self.device_state = DeviceState::Active;
        self.media_session = None;
        self.set_cast_confirmed(PlayerState::Idle);
        self.bump_generation();
    }

    /// Stop the local player if it is doing anything
    fn release_local(&mut self, fx: &mut Vec<Effect>) {
        if !matches!(
            self.local_state,
            PlayerState::Idle | PlayerState::Stopped | PlayerState::Error
        ) {
            fx.push(Effect::Local(LocalCommand::Stop));
            self.local_state = PlayerState::Stopped;
        }
        self.pending_local_start = None;
    }

    /// Play the current item locally, seeking to `at` if given
    fn play_locally(&mut self, catalog: &Catalog, at: Option<f64>) -> Vec<Effect> {
        let mut fx = Vec::new();

        if self.local_state.is_engaged() {
            if let Some(t) = at {
                fx.push(Effect::Local(LocalCommand::Seek(t)));
                self.current_media_time = t;
            }
            fx.push(Effect::Local(LocalCommand::Play));
            self.local_state = PlayerState::Playing;
            self.start_timer(&mut fx);
            return fx;
        }

        let Some(item) = catalog.get(self.current_media_index) else {
            debug!(index = self.current_media_index, "nothing to play locally");
            return fx;
        };
        let Some(url) = item.source_url() else {
            warn!(title = %item.title, "media has no playable source");
            self.local_state = PlayerState::Error;
            self.last_error = Some(Failure::LocalPlayer(format!(
                "{} has no playable source",
                item.title
            )));
            return fx;
        };

        let start = at.unwrap_or(0.0);
        fx.push(Effect::Local(LocalCommand::Load {
            url: url.to_string(),
        }));
        self.bump_generation();
        self.local_state = PlayerState::Loading;
        self.pending_local_start = Some(start);
        self.current_media_time = start;
        fx
    }

    /// Drop the session and continue on the local player where it left off
    fn fall_back_to_local(&mut self, catalog: &Catalog) -> Vec<Effect> {
        let mut fx = Vec::new();
        self.session = None;
        self.media_session = None;
        self.device_state = DeviceState::Idle;
        self.set_cast_confirmed(PlayerState::Idle);
        self.cancel_timer(&mut fx);
        self.bump_generation();

        let resume_at = self.current_media_time;
        info!(at = resume_at, "resuming local playback");
        fx.extend(self.play_locally(catalog, Some(resume_at)));
        fx
    }

    // -------------------------------------------------------------------------
    // User Commands
    // -------------------------------------------------------------------------

    /// Select a catalog item and start playing it on the active driver
    pub fn select_media(&mut self, catalog: &Catalog, index: usize) -> Vec<Effect> {
        if index >= catalog.len() {
            warn!(index, len = catalog.len(), "media index out of range");
            return Vec::new();
        }

        let mut fx = Vec::new();
        self.current_media_index = index;
        self.current_media_time = 0.0;
        self.current_media_duration = None;
        self.pending_local_start = None;
        self.last_authoritative = None;
        self.cancel_timer(&mut fx);
        self.bump_generation();

        if self.session.is_some() {
            self.media_session = None;
            self.set_cast_confirmed(PlayerState::Idle);
            fx.extend(self.load_media(catalog, index));
        } else {
            // Force a reload even if the player is engaged
            if self.local_state.is_engaged() {
                self.local_state = PlayerState::Stopped;
            }
            fx.extend(self.play_locally(catalog, Some(0.0)));
        }
        fx
    }

    /// Load a catalog item into the bound session
    pub fn load_media(&mut self, catalog: &Catalog, index: usize) -> Vec<Effect> {
        if self.session.is_none() {
            debug!("no session bound, load ignored");
            return Vec::new();
        }
        let Some(item) = catalog.get(index) else {
            warn!(index, "media index out of range");
            return Vec::new();
        };
        self.current_media_index = index;

        let start = if self.local_state == PlayerState::Playing {
            self.current_media_time
        } else {
            0.0
        };

        match LoadRequest::for_item(item, self.autoplay, start) {
            Some(request) => {
                info!(title = %item.title, start, "loading media on receiver");
                self.media_session = None;
                self.cast_state = PlayerState::Loading;
                vec![self.remote(RemoteCommand::Load(request))]
            }
            None => {
                self.set_cast_confirmed(PlayerState::Idle);
                self.remote_failed(Failure::LoadMedia(format!(
                    "{} has no playable source",
                    item.title
                )));
                Vec::new()
            }
        }
    }

    pub fn request_remote_session(&mut self) -> Vec<Effect> {
        if self.session.is_some() {
            debug!("session already bound");
            return Vec::new();
        }
        if !self.remote_available {
            warn!("remote session service not available yet");
            self.last_error = Some(Failure::Initialization(
                "remote session service not available yet".to_string(),
            ));
            return Vec::new();
        }
        vec![self.remote(RemoteCommand::RequestSession)]
    }

    pub fn end_remote_session(&mut self) -> Vec<Effect> {
        if self.session.is_none() {
            debug!("no session to end");
            return Vec::new();
        }
        vec![self.remote(RemoteCommand::EndSession)]
    }

    pub fn play(&mut self, catalog: &Catalog) -> Vec<Effect> {
        if self.session.is_some() {
            if self.media_session.is_none() {
                return self.load_media(catalog, self.current_media_index);
            }
            return match self.cast_state {
                PlayerState::Loaded | PlayerState::Paused => {
                    let mut fx = vec![self.remote(RemoteCommand::Play)];
                    self.cast_state = PlayerState::Playing;
                    self.start_timer(&mut fx);
                    fx
                }
                PlayerState::Idle
                | PlayerState::Loading
                | PlayerState::Stopped
                | PlayerState::Error => self.load_media(catalog, self.current_media_index),
                PlayerState::Playing | PlayerState::Seeking => Vec::new(),
            };
        }

        match self.local_state {
            PlayerState::Paused => self.play_locally(catalog, None),
            PlayerState::Playing | PlayerState::Loading | PlayerState::Seeking => Vec::new(),
            PlayerState::Idle | PlayerState::Loaded | PlayerState::Stopped | PlayerState::Error => {
                self.play_locally(catalog, Some(0.0))
            }
        }
    }

    pub fn pause(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.session.is_some() {
            if self.cast_state == PlayerState::Playing && self.media_session.is_some() {
                fx.push(self.remote(RemoteCommand::Pause));
                self.cast_state = PlayerState::Paused;
                self.cancel_timer(&mut fx);
            }
        } else if self.local_state == PlayerState::Playing {
            fx.push(Effect::Local(LocalCommand::Pause));
            self.local_state = PlayerState::Paused;
            self.cancel_timer(&mut fx);
        }
        fx
    }

    pub fn stop(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.session.is_some() {
            if self.media_session.is_some()
                && matches!(
                    self.cast_state,
                    PlayerState::Loaded
                        | PlayerState::Playing
                        | PlayerState::Paused
                        | PlayerState::Seeking
                )
            {
                self.hold_position();
                fx.push(self.remote(RemoteCommand::Stop));
                self.cast_state = PlayerState::Stopped;
                self.current_media_time = 0.0;
                self.cancel_timer(&mut fx);
            }
        } else if !matches!(
            self.local_state,
            PlayerState::Idle | PlayerState::Stopped | PlayerState::Error
        ) {
            self.release_local(&mut fx);
            self.current_media_time = 0.0;
            self.cancel_timer(&mut fx);
        }
        fx
    }

    pub fn seek(&mut self, target: SeekTarget) -> Vec<Effect> {
        let Some(time) = target.resolve(self.current_media_time, self.current_media_duration)
        else {
            debug!(?target, "seek ignored, duration unknown");
            return Vec::new();
        };

        let mut fx = Vec::new();
        if self.session.is_some() {
            if self.media_session.is_none() || !self.cast_state.is_engaged() {
                return fx;
            }
            self.hold_position();
            fx.push(self.remote(RemoteCommand::Seek(time)));
            self.cast_state = PlayerState::Seeking;
            self.current_media_time = time;
            self.cancel_timer(&mut fx);
        } else if self.local_state.is_engaged() {
            fx.push(Effect::Local(LocalCommand::Seek(time)));
            fx.push(Effect::Local(LocalCommand::Play));
            self.current_media_time = time;
            self.local_state = PlayerState::Playing;
            self.start_timer(&mut fx);
        }
        fx
    }

    pub fn set_volume(&mut self, level: f32) -> Vec<Effect> {
        if !level.is_finite() {
            return Vec::new();
        }
        let level = level.clamp(0.0, 1.0);
        if self.session.is_some() {
            let target = damped_volume(self.current_volume, level);
            self.current_volume = target;
            vec![self.remote(RemoteCommand::SetVolume(target))]
        } else {
            self.current_volume = level;
            vec![Effect::Local(LocalCommand::SetVolume(level))]
        }
    }

    pub fn mute(&mut self, muted: bool) -> Vec<Effect> {
        self.muted = muted;
        if self.session.is_some() {
            vec![self.remote(RemoteCommand::SetMuted(muted))]
        } else {
            vec![Effect::Local(LocalCommand::SetMuted(muted))]
        }
    }

    pub fn set_fullscreen(&mut self, fullscreen: bool) -> Vec<Effect> {
        self.fullscreen = fullscreen;
        vec![Effect::Local(LocalCommand::SetFullscreen(fullscreen))]
    }

    // -------------------------------------------------------------------------
    // Remote Events
    // -------------------------------------------------------------------------

    /// The remote session service finished initializing
    pub fn on_remote_available(&mut self) {
        self.remote_available = true;
        if matches!(self.last_error, Some(Failure::Initialization(_))) {
            self.last_error = None;
        }
    }

    /// A session was already running on the receiver at startup
    pub fn on_session_joined(
        &mut self,
        catalog: &Catalog,
        info: SessionInfo,
        media: Option<MediaSessionInfo>,
        now: Instant,
    ) -> Vec<Effect> {
        if self.session.is_some() {
            debug!("session already bound, join ignored");
            return Vec::new();
        }
        self.bind_session(info);

        let Some(media) = media else {
            return self.load_media(catalog, self.current_media_index);
        };

        let mut fx = Vec::new();
        self.set_cast_confirmed(media.player_state);
        self.set_time_confirmed(media.current_time);
        if media.duration.is_some() {
            self.current_media_duration = media.duration;
        }
        self.last_authoritative = Some(now);
        self.media_session = Some(media);
        self.release_local(&mut fx);
        if self.cast_state == PlayerState::Playing {
            self.start_timer(&mut fx);
        } else {
            self.cancel_timer(&mut fx);
        }
        fx
    }

    pub fn on_completion(
        &mut self,
        catalog: &Catalog,
        generation: u64,
        completion: Completion,
        now: Instant,
    ) -> Vec<Effect> {
        match completion {
            // A granted session is never stale: something has to own it
            Completion::SessionRequested(result) => self.on_session_requested(catalog, result),
            _ if generation != self.generation => {
                debug!(generation, current = self.generation, "dropping stale completion");
                Vec::new()
            }
            Completion::SessionEnded(Ok(())) => {
                info!("session ended");
                self.fall_back_to_local(catalog)
            }
            Completion::SessionEnded(Err(e)) => {
                self.remote_failed(Failure::Command {
                    command: RemoteCommand::EndSession.name().to_string(),
                    message: e.to_string(),
                });
                Vec::new()
            }
            Completion::MediaLoaded(result) => self.on_media_loaded(result, now),
            Completion::Acknowledged { command, result } => self.on_acknowledged(command, result),
        }
    }

    fn on_session_requested(
        &mut self,
        catalog: &Catalog,
        result: Result<SessionInfo, CastError>,
    ) -> Vec<Effect> {
        match result {
            Ok(info) => {
                if self.session.is_some() {
                    debug!("session already bound, ignoring new one");
                    return Vec::new();
                }
                self.bind_session(info);
                self.load_media(catalog, self.current_media_index)
            }
            Err(e) => {
                warn!(error = %e, "session request failed");
                self.device_state = DeviceState::Error;
                self.last_error = Some(Failure::SessionRequest(e.to_string()));
                Vec::new()
            }
        }
    }

    fn on_media_loaded(
        &mut self,
        result: Result<MediaSessionInfo, CastError>,
        now: Instant,
    ) -> Vec<Effect> {
        let mut fx = Vec::new();
        match result {
            Ok(media) => {
                if self.session.is_none() {
                    return fx;
                }
                self.remote_succeeded();
                let state = if self.autoplay {
                    PlayerState::Playing
                } else {
                    PlayerState::Loaded
                };
                self.set_cast_confirmed(state);
                self.set_time_confirmed(media.current_time);
                if media.duration.is_some() {
                    self.current_media_duration = media.duration;
                }
                self.last_authoritative = Some(now);
                self.media_session = Some(media);
                self.release_local(&mut fx);
                if state == PlayerState::Playing {
                    self.start_timer(&mut fx);
                } else {
                    self.cancel_timer(&mut fx);
                }
            }
            Err(e) => {
                self.set_cast_confirmed(PlayerState::Idle);
                self.remote_failed(Failure::LoadMedia(e.to_string()));
            }
        }
        fx
    }

    fn on_acknowledged(
        &mut self,
        command: RemoteCommand,
        result: Result<(), CastError>,
    ) -> Vec<Effect> {
        let mut fx = Vec::new();
        if command.is_transport() {
            self.in_flight = self.in_flight.saturating_sub(1);
        }

        match result {
            Ok(()) => {
                self.remote_succeeded();
                match command {
                    RemoteCommand::Play => self.confirmed_cast = PlayerState::Playing,
                    RemoteCommand::Pause => self.confirmed_cast = PlayerState::Paused,
                    RemoteCommand::Stop => {
                        self.confirmed_cast = PlayerState::Stopped;
                        self.confirmed_time = 0.0;
                    }
                    RemoteCommand::Seek(position) => {
                        self.confirmed_cast = PlayerState::Playing;
                        self.confirmed_time = position;
                        if self.cast_state == PlayerState::Seeking {
                            self.cast_state = PlayerState::Playing;
                            self.start_timer(&mut fx);
                        }
                    }
                    RemoteCommand::SetVolume(level) => self.confirmed_volume = level,
                    RemoteCommand::SetMuted(muted) => self.confirmed_muted = muted,
                    _ => {}
                }
            }
            Err(e) => {
                self.remote_failed(Failure::Command {
                    command: command.name().to_string(),
                    message: e.to_string(),
                });
                match command {
                    RemoteCommand::SetVolume(_) => self.current_volume = self.confirmed_volume,
                    RemoteCommand::SetMuted(_) => self.muted = self.confirmed_muted,
                    RemoteCommand::Play
                    | RemoteCommand::Pause
                    | RemoteCommand::Stop
                    | RemoteCommand::Seek(_) => {
                        if matches!(command, RemoteCommand::Stop | RemoteCommand::Seek(_)) {
                            self.current_media_time = self.confirmed_time;
                        }
                        self.cast_state = self.confirmed_cast;
                        if self.cast_state == PlayerState::Playing {
                            self.start_timer(&mut fx);
                        } else {
                            self.cancel_timer(&mut fx);
                        }
                    }
                    _ => {}
                }
            }
        }
        fx
    }

    /// Authoritative status from the remote media session
    pub fn on_remote_status(&mut self, status: MediaStatus, now: Instant) -> Vec<Effect> {
        let current = self.media_session.as_ref().map(|m| m.media_session_id);
        if current != Some(status.media_session_id) {
            debug!(
                media_session_id = status.media_session_id,
                "dropping status for stale media session"
            );
            return Vec::new();
        }

        let mut fx = Vec::new();
        if status.is_finished() {
            info!("remote playback finished");
            self.set_cast_confirmed(PlayerState::Stopped);
            self.set_time_confirmed(0.0);
            self.last_authoritative = Some(now);
            self.cancel_timer(&mut fx);
            return fx;
        }
        if status.player_state == PlayerState::Idle && status.idle_reason.is_some() {
            return self.on_media_session_ended();
        }

        self.set_time_confirmed(status.current_time);
        if status.duration.is_some() {
            self.current_media_duration = status.duration;
        }
        self.last_authoritative = Some(now);
        if let Some(volume) = status.volume {
            self.current_volume = volume;
            self.confirmed_volume = volume;
        }
        if let Some(muted) = status.muted {
            self.muted = muted;
            self.confirmed_muted = muted;
        }

        // Optimistic state stands until the receiver has caught up
        if self.in_flight == 0 && self.cast_state != PlayerState::Seeking {
            match status.player_state {
                PlayerState::Playing if self.cast_state != PlayerState::Playing => {
                    self.set_cast_confirmed(PlayerState::Playing);
                    self.start_timer(&mut fx);
                }
                PlayerState::Paused if self.cast_state != PlayerState::Paused => {
                    self.set_cast_confirmed(PlayerState::Paused);
                    self.cancel_timer(&mut fx);
                }
                _ => {}
            }
        }
        fx
    }

    /// The media instance is gone while the session itself lives on
    pub fn on_media_session_ended(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        info!("remote media session ended");
        self.set_time_confirmed(0.0);
        self.set_cast_confirmed(PlayerState::Idle);
        self.media_session = None;
        self.cancel_timer(&mut fx);
        fx
    }

    /// Liveness change of the session identified by `session_id`
    pub fn on_liveness(&mut self, catalog: &Catalog, session_id: &str, alive: bool) -> Vec<Effect> {
        if alive {
            return Vec::new();
        }
        match &self.session {
            Some(session) if session.session_id == session_id => {}
            _ => {
                debug!(session_id, "liveness from stale session");
                return Vec::new();
            }
        }
        info!("remote session lost");
        self.fall_back_to_local(catalog)
    }

    // -------------------------------------------------------------------------
    // Local Events
    // -------------------------------------------------------------------------

    /// The local player finished loading media
    pub fn on_local_ready(
        &mut self,
        generation: u64,
        result: Result<Option<f64>, PlayerError>,
    ) -> Vec<Effect> {
        if generation != self.generation || self.local_state != PlayerState::Loading {
            debug!(generation, current = self.generation, "dropping stale local ready");
            return Vec::new();
        }

        match result {
            Ok(duration) => {
                let mut fx = Vec::new();
                if duration.is_some() {
                    self.current_media_duration = duration;
                }
                let start = self.pending_local_start.take().unwrap_or(0.0);
                if start > 0.0 {
                    fx.push(Effect::Local(LocalCommand::Seek(start)));
                }
                fx.push(Effect::Local(LocalCommand::Play));
                self.current_media_time = start;
                self.local_state = PlayerState::Playing;
                self.start_timer(&mut fx);
                fx
            }
            Err(e) => self.on_local_failure(e),
        }
    }

    pub fn on_local_failure(&mut self, error: PlayerError) -> Vec<Effect> {
        warn!(error = %error, "local player failed");
        let mut fx = Vec::new();
        self.local_state = PlayerState::Error;
        self.pending_local_start = None;
        self.last_error = Some(Failure::LocalPlayer(error.to_string()));
        if self.session.is_none() {
            self.cancel_timer(&mut fx);
        }
        fx
    }

    // -------------------------------------------------------------------------
    // Progress Timer
    // -------------------------------------------------------------------------

    /// Progress timer tick for `epoch`, fired at `at`
    pub fn tick(&mut self, epoch: u64, at: Instant) -> Vec<Effect> {
        if self.timer_epoch != Some(epoch) {
            debug!(epoch, "tick from canceled timer");
            return Vec::new();
        }
        if !self.is_advancing() {
            return Vec::new();
        }
        if let Some(last) = self.last_authoritative {
            if at < last + self.tick_interval {
                return Vec::new();
            }
        }

        let mut fx = Vec::new();
        self.current_media_time += self.tick_interval.as_secs_f64();
        if self.position().at_end() {
            debug!("reached end of media");
            self.current_media_time = 0.0;
            self.cancel_timer(&mut fx);
            if self.session.is_none() && self.local_state == PlayerState::Playing {
                self.release_local(&mut fx);
            }
        }
        fx
    }
}

/// Remote volume after a request: increases move half-way, 1.0 and up is max
pub fn damped_volume(current: f32, requested: f32) -> f32 {
    if requested >= 1.0 {
        1.0
    } else if requested > current {
        current + (requested - current) / 2.0
    } else {
        requested.max(0.0)
    }
}
