//! Controller event loop
//!
//! One task owns the [`PlaybackState`] and serializes everything that can
//! change it: user commands, remote completions, status and liveness reports,
//! local data-ready events and progress ticks. Remote calls run in spawned
//! tasks and report back through the event channel, so nothing blocks the loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, warn};

use super::state::{Completion, Effect, LocalCommand, PlaybackState, RemoteCommand, StateConfig};
use super::Snapshot;
use crate::api::Catalog;
use crate::models::{MediaStatus, SeekTarget};
use crate::stream::{
    CastError, JoinedSession, LocalPlayer, MediaSession, PlayerError, RemoteSessionService,
    Session,
};

/// User commands accepted by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Select(usize),
    Play,
    Pause,
    /// Play if paused, pause if playing
    TogglePlay,
    Stop,
    Seek(SeekTarget),
    SetVolume(f32),
    Mute(bool),
    ToggleMute,
    RequestSession,
    EndSession,
    SetFullscreen(bool),
    Shutdown,
}

/// Controller tunables
#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub state: StateConfig,
    /// First delay between availability checks of the remote service
    pub init_backoff: Duration,
    /// Upper bound for the availability backoff
    pub init_backoff_max: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            state: StateConfig::default(),
            init_backoff: Duration::from_secs(1),
            init_backoff_max: Duration::from_secs(30),
        }
    }
}

/// Events fed back into the loop
enum Event {
    Completion {
        generation: u64,
        completion: Completion,
        session: Option<Arc<dyn Session>>,
        media: Option<Arc<dyn MediaSession>>,
    },
    Status {
        session_id: String,
        status: MediaStatus,
    },
    Liveness {
        session_id: String,
        alive: bool,
    },
    LocalReady {
        generation: u64,
        result: Result<Option<f64>, PlayerError>,
    },
    RemoteReady(Option<JoinedSession>),
}

/// Cheap handle for talking to a running controller
#[derive(Clone)]
pub struct ControllerHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Snapshot>,
}

impl ControllerHandle {
    /// Send a command; fails once the controller has shut down
    pub async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| anyhow::anyhow!("controller is not running"))
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

/// Dual-mode playback controller
pub struct Controller {
    state: PlaybackState,
    catalog: Catalog,
    config: ControllerConfig,
    remote: Arc<dyn RemoteSessionService>,
    local: Box<dyn LocalPlayer>,
    session: Option<Arc<dyn Session>>,
    media: Option<Arc<dyn MediaSession>>,
    /// Running progress timer and its epoch
    timer: Option<(u64, Interval)>,
    commands: mpsc::Receiver<Command>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    snapshots: watch::Sender<Snapshot>,
    /// Status and liveness forwarders of the bound session
    forwarders: Vec<JoinHandle<()>>,
    init_task: Option<JoinHandle<()>>,
}

impl Controller {
    pub fn new(
        remote: Arc<dyn RemoteSessionService>,
        local: Box<dyn LocalPlayer>,
        catalog: Catalog,
        config: ControllerConfig,
    ) -> (Self, ControllerHandle) {
        let state = PlaybackState::new(config.state);
        let (commands_tx, commands) = mpsc::channel(32);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshots, snapshots_rx) = watch::channel(state.snapshot(&catalog));

        let controller = Self {
            state,
            catalog,
            config,
            remote,
            local,
            session: None,
            media: None,
            timer: None,
            commands,
            events_tx,
            events_rx,
            snapshots,
            forwarders: Vec::new(),
            init_task: None,
        };
        let handle = ControllerHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
        };
        (controller, handle)
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run until [`Command::Shutdown`] or until every handle is dropped
    pub async fn run(mut self) {
        self.initialize();
        self.publish();

        loop {
            let step = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => Step::Command(command),
                },
                Some(event) = self.events_rx.recv() => Step::Event(event),
                (epoch, at) = next_tick(&mut self.timer) => Step::Tick(epoch, at),
            };

            match step {
                Step::Command(command) => self.handle_command(command),
                Step::Event(event) => self.handle_event(event),
                Step::Tick(epoch, at) => {
                    let fx = self.state.tick(epoch, at.into_std());
                    self.apply(fx);
                }
            }
            self.publish();
        }

        self.shutdown();
    }

    /// Start polling the remote service in the background
    fn initialize(&mut self) {
        let remote = self.remote.clone();
        let tx = self.events_tx.clone();
        let base = self.config.init_backoff;
        let max = self.config.init_backoff_max;

        self.init_task = Some(tokio::spawn(async move {
            let mut delay = base;
            let mut attempt = 1u32;
            while !remote.is_available().await {
                debug!(attempt, retry_in = ?delay, "remote session service unavailable");
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(max);
                attempt += 1;
            }
            info!("remote session service available");

            let joined = match remote.discover_session().await {
                Ok(joined) => joined,
                Err(e) => {
                    warn!(error = %e, "session discovery failed");
                    None
                }
            };
            let _ = tx.send(Event::RemoteReady(joined));
        }));
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.init_task.take() {
            task.abort();
        }
        self.detach_session();
        if let Err(e) = self.local.stop() {
            debug!(error = %e, "failed to stop local player on shutdown");
        }
        info!("controller stopped");
    }

    fn publish(&self) {
        self.snapshots
            .send_replace(self.state.snapshot(&self.catalog));
    }

    // -------------------------------------------------------------------------
    // Commands & Events
    // -------------------------------------------------------------------------

    fn handle_command(&mut self, command: Command) {
        debug!(?command, "command");
        let catalog = &self.catalog;
        let fx = match command {
            Command::Select(index) => self.state.select_media(catalog, index),
            Command::Play => self.state.play(catalog),
            Command::Pause => self.state.pause(),
            Command::TogglePlay => {
                if self.state.player_state().shows_pause() {
                    self.state.pause()
                } else {
                    self.state.play(catalog)
                }
            }
            Command::Stop => self.state.stop(),
            Command::Seek(target) => self.state.seek(target),
            Command::SetVolume(level) => self.state.set_volume(level),
            Command::Mute(muted) => self.state.mute(muted),
            Command::ToggleMute => {
                let muted = !self.state.muted;
                self.state.mute(muted)
            }
            Command::RequestSession => self.state.request_remote_session(),
            Command::EndSession => self.state.end_remote_session(),
            Command::SetFullscreen(fullscreen) => self.state.set_fullscreen(fullscreen),
            Command::Shutdown => Vec::new(),
        };
        self.apply(fx);
    }

    fn handle_event(&mut self, event: Event) {
        let now = Instant::now().into_std();
        match event {
            Event::Completion {
                generation,
                completion,
                session,
                media,
            } => {
                let fx = self
                    .state
                    .on_completion(&self.catalog, generation, completion, now);
                if let Some(session) = session {
                    self.adopt_session(session);
                }
                if let Some(media) = media {
                    self.adopt_media(media);
                }
                self.sync_handles();
                self.apply(fx);
            }
            Event::Status { session_id, status } => {
                if !self.is_current_session(&session_id) {
                    return;
                }
                let fx = self.state.on_remote_status(status, now);
                self.sync_handles();
                self.apply(fx);
            }
            Event::Liveness { session_id, alive } => {
                let fx = self.state.on_liveness(&self.catalog, &session_id, alive);
                self.sync_handles();
                self.apply(fx);
            }
            Event::LocalReady { generation, result } => {
                let fx = self.state.on_local_ready(generation, result);
                self.apply(fx);
            }
            Event::RemoteReady(joined) => {
                self.state.on_remote_available();
                let Some(joined) = joined else {
                    return;
                };
                let info = joined.session.info();
                let media_info = joined.media.as_ref().map(|m| m.info());
                let fx = self
                    .state
                    .on_session_joined(&self.catalog, info, media_info, now);
                self.adopt_session(joined.session);
                if let Some(media) = joined.media {
                    self.adopt_media(media);
                }
                self.sync_handles();
                self.apply(fx);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Session Handles
    // -------------------------------------------------------------------------

    fn is_current_session(&self, session_id: &str) -> bool {
        self.state
            .session
            .as_ref()
            .is_some_and(|s| s.session_id == session_id)
    }

    /// Keep a session handle if the state bound its id
    fn adopt_session(&mut self, session: Arc<dyn Session>) {
        let info = session.info();
        if !self.is_current_session(&info.session_id) {
            debug!(session_id = %info.session_id, "discarding unbound session");
            return;
        }
        if self
            .session
            .as_ref()
            .is_some_and(|s| s.info().session_id == info.session_id)
        {
            return;
        }
        self.detach_session();
        self.attach(session);
    }

    /// Keep a media handle if the state bound its id
    fn adopt_media(&mut self, media: Arc<dyn MediaSession>) {
        let id = media.info().media_session_id;
        let bound = self
            .state
            .media_session
            .as_ref()
            .map(|m| m.media_session_id);
        if bound == Some(id) {
            self.media = Some(media);
        } else {
            debug!(media_session_id = id, "discarding unbound media session");
        }
    }

    /// Drop handles the state no longer refers to
    fn sync_handles(&mut self) {
        if self.state.session.is_none() && self.session.is_some() {
            self.detach_session();
        }
        if self.state.media_session.is_none() {
            self.media = None;
        }
    }

    /// Subscribe to status and liveness of a newly bound session
    fn attach(&mut self, session: Arc<dyn Session>) {
        let session_id = session.info().session_id;

        let mut status_rx = session.subscribe_status();
        let tx = self.events_tx.clone();
        let id = session_id.clone();
        self.forwarders.push(tokio::spawn(async move {
            loop {
                match status_rx.recv().await {
                    Ok(status) => {
                        let event = Event::Status {
                            session_id: id.clone(),
                            status,
                        };
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "status updates skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));

        let mut alive_rx = session.subscribe_liveness();
        let tx = self.events_tx.clone();
        let id = session_id;
        self.forwarders.push(tokio::spawn(async move {
            while alive_rx.changed().await.is_ok() {
                let alive = *alive_rx.borrow_and_update();
                let event = Event::Liveness {
                    session_id: id.clone(),
                    alive,
                };
                if tx.send(event).is_err() || !alive {
                    break;
                }
            }
        }));

        self.session = Some(session);
    }

    fn detach_session(&mut self) {
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        self.session = None;
        self.media = None;
    }

    // -------------------------------------------------------------------------
    // Effects
    // -------------------------------------------------------------------------

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTimer { epoch } => {
                    let period = self.state.tick_interval();
                    let interval = tokio::time::interval_at(Instant::now() + period, period);
                    self.timer = Some((epoch, interval));
                }
                Effect::CancelTimer => self.timer = None,
                Effect::Local(command) => self.run_local(command),
                Effect::Remote {
                    generation,
                    command,
                } => self.spawn_remote(generation, command),
            }
        }
    }

    fn run_local(&mut self, command: LocalCommand) {
        debug!(?command, "local player");
        let result = match command {
            LocalCommand::Load { url } => match self.local.load(&url) {
                Ok(ready) => {
                    let generation = self.state.generation;
                    let tx = self.events_tx.clone();
                    tokio::spawn(async move {
                        let result = ready.await.unwrap_or(Err(PlayerError::NothingLoaded));
                        let _ = tx.send(Event::LocalReady { generation, result });
                    });
                    Ok(())
                }
                Err(e) => Err(e),
            },
            LocalCommand::Play => self.local.play(),
            LocalCommand::Pause => self.local.pause(),
            LocalCommand::Stop => self.local.stop(),
            LocalCommand::Seek(position) => self.local.seek(position),
            LocalCommand::SetVolume(level) => self.local.set_volume(level),
            LocalCommand::SetMuted(muted) => self.local.set_muted(muted),
            LocalCommand::SetFullscreen(fullscreen) => self.local.set_fullscreen(fullscreen),
        };

        if let Err(e) = result {
            let fx = self.state.on_local_failure(e);
            self.apply(fx);
        }
    }

    fn spawn_remote(&mut self, generation: u64, command: RemoteCommand) {
        debug!(generation, command = command.name(), "remote command");
        let tx = self.events_tx.clone();

        match command {
            RemoteCommand::RequestSession => {
                let remote = self.remote.clone();
                tokio::spawn(async move {
                    let (completion, session) = match remote.request_session().await {
                        Ok(session) => (Completion::SessionRequested(Ok(session.info())), Some(session)),
                        Err(e) => (Completion::SessionRequested(Err(e)), None),
                    };
                    let _ = tx.send(Event::Completion {
                        generation,
                        completion,
                        session,
                        media: None,
                    });
                });
            }
            RemoteCommand::EndSession => {
                let session = self.session.clone();
                tokio::spawn(async move {
                    let result = match session {
                        Some(session) => session.stop().await,
                        None => Ok(()),
                    };
                    complete(&tx, generation, Completion::SessionEnded(result));
                });
            }
            RemoteCommand::Load(request) => {
                let Some(session) = self.session.clone() else {
                    complete(
                        &tx,
                        generation,
                        Completion::MediaLoaded(Err(CastError::Load("no session".to_string()))),
                    );
                    return;
                };
                tokio::spawn(async move {
                    let (completion, media) = match session.load_media(request).await {
                        Ok(media) => (Completion::MediaLoaded(Ok(media.info())), Some(media)),
                        Err(e) => (Completion::MediaLoaded(Err(e)), None),
                    };
                    let _ = tx.send(Event::Completion {
                        generation,
                        completion,
                        session: None,
                        media,
                    });
                });
            }
            RemoteCommand::SetVolume(_) | RemoteCommand::SetMuted(_) => {
                let session = self.session.clone();
                tokio::spawn(async move {
                    let result = match (&session, &command) {
                        (Some(s), RemoteCommand::SetVolume(level)) => s.set_volume(*level).await,
                        (Some(s), RemoteCommand::SetMuted(muted)) => s.set_muted(*muted).await,
                        _ => Err(CastError::NoMediaSession),
                    };
                    complete(&tx, generation, Completion::Acknowledged { command, result });
                });
            }
            RemoteCommand::Play | RemoteCommand::Pause | RemoteCommand::Stop | RemoteCommand::Seek(_) => {
                let media = self.media.clone();
                tokio::spawn(async move {
                    let result = match (&media, &command) {
                        (Some(m), RemoteCommand::Play) => m.play().await,
                        (Some(m), RemoteCommand::Pause) => m.pause().await,
                        (Some(m), RemoteCommand::Stop) => m.stop().await,
                        (Some(m), RemoteCommand::Seek(position)) => m.seek(*position).await,
                        _ => Err(CastError::NoMediaSession),
                    };
                    complete(&tx, generation, Completion::Acknowledged { command, result });
                });
            }
        }
    }
}

/// One unit of work for the loop
enum Step {
    Command(Command),
    Event(Event),
    Tick(u64, Instant),
}

fn complete(tx: &mpsc::UnboundedSender<Event>, generation: u64, completion: Completion) {
    let _ = tx.send(Event::Completion {
        generation,
        completion,
        session: None,
        media: None,
    });
}

/// Next tick of the progress timer; pends forever while none is running
async fn next_tick(timer: &mut Option<(u64, Interval)>) -> (u64, Instant) {
    match timer {
        Some((epoch, interval)) => {
            let at = interval.tick().await;
            (*epoch, at)
        }
        None => std::future::pending().await,
    }
}
