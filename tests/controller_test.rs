//! Controller integration tests
//!
//! Drives a running [`Controller`] through its handle against an in-memory
//! receiver and local player. Time is paused, so progress timers and retry
//! backoff run instantly.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use castplayer::api::Catalog;
use castplayer::controller::{Command, Controller, ControllerConfig, ControllerHandle, Snapshot};
use castplayer::models::{
    DeviceState, Driver, IdleReason, LoadRequest, MediaSessionInfo, MediaStatus, PlayerState,
    SessionInfo,
};
use castplayer::stream::{
    CastError, JoinedSession, LocalPlayer, MediaSession, PlayerError, ReadyHandle,
    RemoteSessionService, Session,
};

// =============================================================================
// Fakes
// =============================================================================

/// Shared call log
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }
}

struct FakeLocal {
    log: Log,
    duration: Option<f64>,
}

impl LocalPlayer for FakeLocal {
    fn load(&mut self, url: &str) -> Result<ReadyHandle, PlayerError> {
        self.log.push(format!("load {}", url));
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Ok(self.duration));
        Ok(rx)
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.log.push("play");
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.log.push("pause");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        self.log.push("stop");
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        self.log.push(format!("seek {}", position));
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<(), PlayerError> {
        self.log.push(format!("volume {}", level));
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<(), PlayerError> {
        self.log.push(format!("muted {}", muted));
        Ok(())
    }
}

struct FakeMedia {
    info: MediaSessionInfo,
    log: Log,
    fail_pause: bool,
}

#[async_trait]
impl MediaSession for FakeMedia {
    fn info(&self) -> MediaSessionInfo {
        self.info.clone()
    }

    async fn play(&self) -> Result<(), CastError> {
        self.log.push("remote play");
        Ok(())
    }

    async fn pause(&self) -> Result<(), CastError> {
        self.log.push("remote pause");
        if self.fail_pause {
            return Err(CastError::Command {
                command: "pause".to_string(),
                message: "receiver busy".to_string(),
            });
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), CastError> {
        self.log.push("remote stop");
        Ok(())
    }

    async fn seek(&self, position: f64) -> Result<(), CastError> {
        self.log.push(format!("remote seek {}", position));
        Ok(())
    }
}

struct FakeSession {
    info: SessionInfo,
    log: Log,
    status: broadcast::Sender<MediaStatus>,
    alive: watch::Sender<bool>,
    media_ids: AtomicU64,
    loads: Mutex<Vec<LoadRequest>>,
    fail_pause: bool,
}

impl FakeSession {
    fn new(id: &str, log: Log, fail_pause: bool) -> Self {
        let (status, _) = broadcast::channel(16);
        let (alive, _) = watch::channel(true);
        Self {
            info: SessionInfo {
                session_id: id.to_string(),
                receiver_name: "Living Room".to_string(),
            },
            log,
            status,
            alive,
            media_ids: AtomicU64::new(0),
            loads: Mutex::new(Vec::new()),
            fail_pause,
        }
    }

    fn loads(&self) -> Vec<LoadRequest> {
        self.loads.lock().unwrap().clone()
    }

    fn current_media_id(&self) -> u64 {
        self.media_ids.load(Ordering::SeqCst)
    }

    fn push_status(&self, player_state: PlayerState, current_time: f64) {
        let _ = self.status.send(MediaStatus {
            media_session_id: self.current_media_id(),
            player_state,
            idle_reason: None,
            current_time,
            duration: Some(600.0),
            volume: None,
            muted: None,
        });
    }

    fn push_finished(&self) {
        let _ = self.status.send(MediaStatus {
            media_session_id: self.current_media_id(),
            player_state: PlayerState::Idle,
            idle_reason: Some(IdleReason::Finished),
            current_time: 0.0,
            duration: Some(600.0),
            volume: None,
            muted: None,
        });
    }

    fn die(&self) {
        let _ = self.alive.send(false);
    }
}

#[async_trait]
impl Session for FakeSession {
    fn info(&self) -> SessionInfo {
        self.info.clone()
    }

    async fn load_media(&self, request: LoadRequest) -> Result<Arc<dyn MediaSession>, CastError> {
        self.log.push(format!("remote load {}", request.content_id));
        let id = self.media_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let player_state = if request.autoplay {
            PlayerState::Playing
        } else {
            PlayerState::Paused
        };
        let info = MediaSessionInfo {
            media_session_id: id,
            duration: Some(600.0),
            current_time: request.current_time,
            player_state,
        };
        self.loads.lock().unwrap().push(request);
        Ok(Arc::new(FakeMedia {
            info,
            log: self.log.clone(),
            fail_pause: self.fail_pause,
        }))
    }

    async fn stop(&self) -> Result<(), CastError> {
        self.log.push("remote end session");
        Ok(())
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        self.log.push(format!("remote volume {}", level));
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), CastError> {
        self.log.push(format!("remote muted {}", muted));
        Ok(())
    }

    fn subscribe_status(&self) -> broadcast::Receiver<MediaStatus> {
        self.status.subscribe()
    }

    fn subscribe_liveness(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }
}

#[derive(Default)]
struct FakeService {
    available: AtomicBool,
    /// Session already running on the receiver at startup
    joined: Mutex<Option<JoinedSession>>,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    fail_pause: bool,
    log: Log,
}

impl FakeService {
    fn available() -> Self {
        let service = Self::default();
        service.available.store(true, Ordering::SeqCst);
        service
    }

    fn session(&self, index: usize) -> Arc<FakeSession> {
        self.sessions.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl RemoteSessionService for FakeService {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn discover_session(&self) -> Result<Option<JoinedSession>, CastError> {
        Ok(self.joined.lock().unwrap().take())
    }

    async fn request_session(&self) -> Result<Arc<dyn Session>, CastError> {
        let mut sessions = self.sessions.lock().unwrap();
        let id = format!("session-{}", sessions.len() + 1);
        let session = Arc::new(FakeSession::new(&id, self.log.clone(), self.fail_pause));
        sessions.push(session.clone());
        Ok(session)
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    handle: ControllerHandle,
    service: Arc<FakeService>,
    local: Log,
    task: JoinHandle<()>,
}

fn start(service: FakeService) -> Harness {
    let service = Arc::new(service);
    let local = Log::default();
    let player = FakeLocal {
        log: local.clone(),
        duration: Some(600.0),
    };
    let (controller, handle) = Controller::new(
        service.clone(),
        Box::new(player),
        Catalog::builtin(),
        ControllerConfig::default(),
    );
    let task = tokio::spawn(controller.run());
    Harness {
        handle,
        service,
        local,
        task,
    }
}

/// Wait until a published snapshot satisfies `pred`
async fn wait_for(
    handle: &ControllerHandle,
    what: &str,
    pred: impl Fn(&Snapshot) -> bool,
) -> Snapshot {
    let mut rx = handle.subscribe();
    let waited = tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            {
                let snapshot = rx.borrow_and_update();
                if pred(&snapshot) {
                    return snapshot.clone();
                }
            }
            rx.changed().await.expect("controller stopped");
        }
    })
    .await;
    waited.unwrap_or_else(|_| panic!("timed out waiting for {}: {:?}", what, handle.snapshot()))
}

/// Play `index` locally, then hand it to a new cast session
async fn start_casting(h: &Harness, index: usize) -> Snapshot {
    wait_for(&h.handle, "remote available", |s| s.remote_available).await;
    h.handle.send(Command::Select(index)).await.unwrap();
    wait_for(&h.handle, "local playback", |s| {
        s.local_state == PlayerState::Playing
    })
    .await;

    h.handle.send(Command::RequestSession).await.unwrap();
    wait_for(&h.handle, "remote playback", |s| {
        s.driver == Driver::Remote && s.cast_state == PlayerState::Playing
    })
    .await
}

// =============================================================================
// Hand-off Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cast_last_item_playing_with_timer() {
    let h = start(FakeService::available());
    let catalog = Catalog::builtin();
    assert_eq!(catalog.len(), 13);

    let snapshot = start_casting(&h, 12).await;

    assert_eq!(snapshot.device_state, DeviceState::Active);
    assert_eq!(snapshot.player_state, PlayerState::Playing);
    assert_eq!(snapshot.media_index, 12);
    assert!(snapshot.timer_running);
    assert_eq!(snapshot.receiver.as_deref(), Some("Living Room"));

    let loads = h.service.session(0).loads();
    assert_eq!(loads.len(), 1);
    assert_eq!(
        Some(loads[0].content_id.as_str()),
        catalog.get(12).and_then(|item| item.source_url())
    );
    assert_eq!(loads[0].content_type, LoadRequest::VIDEO_MP4);
    assert!(loads[0].autoplay);

    // Local player released once the receiver took over
    assert!(h.local.contains("stop"));
}

#[tokio::test(start_paused = true)]
async fn test_finished_status_stops_and_rewinds() {
    let h = start(FakeService::available());
    start_casting(&h, 2).await;

    h.service.session(0).push_finished();
    let snapshot = wait_for(&h.handle, "stopped", |s| {
        s.cast_state == PlayerState::Stopped
    })
    .await;

    assert_eq!(snapshot.position.current_time, 0.0);
    assert!(!snapshot.timer_running);
    assert_eq!(snapshot.driver, Driver::Remote);
}

#[tokio::test(start_paused = true)]
async fn test_lost_session_resumes_locally_at_position() {
    let h = start(FakeService::available());
    start_casting(&h, 0).await;

    let session = h.service.session(0);
    session.push_status(PlayerState::Paused, 42.0);
    wait_for(&h.handle, "position 42", |s| {
        s.cast_state == PlayerState::Paused && s.position.current_time == 42.0
    })
    .await;

    session.die();
    let snapshot = wait_for(&h.handle, "local resume", |s| {
        s.driver == Driver::Local && s.local_state == PlayerState::Playing
    })
    .await;

    assert_eq!(snapshot.device_state, DeviceState::Idle);
    assert_eq!(snapshot.receiver, None);
    assert!(h.local.contains("seek 42"));
    assert!(snapshot.timer_running);
}

#[tokio::test(start_paused = true)]
async fn test_end_session_resumes_locally() {
    let h = start(FakeService::available());
    start_casting(&h, 1).await;

    h.handle.send(Command::EndSession).await.unwrap();
    let snapshot = wait_for(&h.handle, "local resume", |s| {
        s.driver == Driver::Local && s.local_state == PlayerState::Playing
    })
    .await;

    assert_eq!(snapshot.device_state, DeviceState::Idle);
    assert!(h.service.log.contains("remote end session"));
}

#[tokio::test(start_paused = true)]
async fn test_select_while_casting_loads_on_receiver() {
    let h = start(FakeService::available());
    start_casting(&h, 0).await;

    h.handle.send(Command::Select(3)).await.unwrap();
    let snapshot = wait_for(&h.handle, "item 3 on receiver", |s| {
        s.media_index == 3 && s.cast_state == PlayerState::Playing
    })
    .await;

    assert_eq!(snapshot.driver, Driver::Remote);
    let loads = h.service.session(0).loads();
    assert_eq!(loads.len(), 2);
    assert_eq!(loads[1].current_time, 0.0);
}

// =============================================================================
// Remote Command Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_failed_remote_pause_rolls_back() {
    let h = start(FakeService {
        fail_pause: true,
        ..FakeService::available()
    });
    start_casting(&h, 0).await;

    h.handle.send(Command::Pause).await.unwrap();
    let snapshot = wait_for(&h.handle, "warning", |s| {
        s.device_state == DeviceState::Warning
    })
    .await;

    assert_eq!(snapshot.cast_state, PlayerState::Playing);
    assert!(snapshot.timer_running);
    assert!(snapshot.error.is_some());
    assert!(h.service.log.contains("remote pause"));
}

#[tokio::test(start_paused = true)]
async fn test_remote_volume_is_damped() {
    let h = start(FakeService::available());
    start_casting(&h, 0).await;

    h.handle.send(Command::SetVolume(0.2)).await.unwrap();
    wait_for(&h.handle, "volume 0.2", |s| (s.volume - 0.2).abs() < 1e-6).await;

    h.handle.send(Command::SetVolume(0.8)).await.unwrap();
    // Increases move half-way
    wait_for(&h.handle, "volume 0.5", |s| (s.volume - 0.5).abs() < 1e-6).await;
    assert!(h.service.log.contains("remote volume 0.5"));
}

// =============================================================================
// Startup Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_local_playback_while_remote_unavailable() {
    let h = start(FakeService::default());

    h.handle.send(Command::Select(0)).await.unwrap();
    let snapshot = wait_for(&h.handle, "local playback", |s| {
        s.local_state == PlayerState::Playing
    })
    .await;
    assert!(!snapshot.remote_available);
    assert_eq!(snapshot.driver, Driver::Local);

    h.handle.send(Command::RequestSession).await.unwrap();
    let snapshot = wait_for(&h.handle, "init error", |s| s.error.is_some()).await;
    assert_eq!(snapshot.device_state, DeviceState::Idle);

    // Retried with backoff until the receiver shows up
    h.service.available.store(true, Ordering::SeqCst);
    let snapshot = wait_for(&h.handle, "remote available", |s| s.remote_available).await;
    assert_eq!(snapshot.error, None);
}

#[tokio::test(start_paused = true)]
async fn test_joins_running_session_at_startup() {
    let service = FakeService::available();
    let session = Arc::new(FakeSession::new("running", service.log.clone(), false));
    let media: Arc<dyn MediaSession> = Arc::new(FakeMedia {
        info: MediaSessionInfo {
            media_session_id: 7,
            duration: Some(600.0),
            current_time: 100.0,
            player_state: PlayerState::Playing,
        },
        log: service.log.clone(),
        fail_pause: false,
    });
    *service.joined.lock().unwrap() = Some(JoinedSession {
        session: session.clone(),
        media: Some(media),
    });

    let h = start(service);
    let snapshot = wait_for(&h.handle, "joined", |s| {
        s.driver == Driver::Remote && s.cast_state == PlayerState::Playing
    })
    .await;

    assert!(snapshot.position.current_time >= 100.0);
    assert!(snapshot.timer_running);
    // Nothing was loaded locally
    assert!(h.local.entries().iter().all(|e| !e.starts_with("load")));
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_local_player() {
    let h = start(FakeService::default());
    h.handle.send(Command::Select(0)).await.unwrap();
    wait_for(&h.handle, "local playback", |s| {
        s.local_state == PlayerState::Playing
    })
    .await;

    h.handle.send(Command::Shutdown).await.unwrap();
    h.task.await.unwrap();
    assert!(h.local.contains("stop"));
    assert!(h.handle.send(Command::Play).await.is_err());
}
