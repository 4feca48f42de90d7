//! Chromecast control via catt CLI
//!
//! The controller talks to the receiver through three async traits:
//! - [`RemoteSessionService`]: availability, discovery of an ongoing session,
//!   and explicit session requests
//! - [`Session`]: a bound receiver; loads media, sets volume, reports status
//!   and liveness
//! - [`MediaSession`]: one loaded media instance (play/pause/stop/seek)
//!
//! [`CattService`] implements them on top of the `catt` CLI. Status is polled
//! with `catt status`; repeated failures mark the session as dead.

use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{
    IdleReason, LoadRequest, MediaSessionInfo, MediaStatus, PlayerState, SessionInfo,
};

/// Default interval between `catt status` polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Consecutive failed polls after which the session is reported dead
const MAX_POLL_FAILURES: u32 = 3;

/// Errors from remote session operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CastError {
    #[error("catt not found at '{0}'. Install with: pip install catt")]
    NotInstalled(String),
    #[error("No cast device configured")]
    NoDevice,
    #[error("Session request failed: {0}")]
    SessionRequest(String),
    #[error("Load failed: {0}")]
    Load(String),
    #[error("No media loaded in the session")]
    NoMediaSession,
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
}

// =============================================================================
// Service Traits
// =============================================================================

/// A session that was already running on the receiver when we connected
pub struct JoinedSession {
    pub session: Arc<dyn Session>,
    /// Media instance playing in the session, if any
    pub media: Option<Arc<dyn MediaSession>>,
}

/// Entry point to the remote receiver
#[async_trait]
pub trait RemoteSessionService: Send + Sync {
    /// Whether the remote side can be used at all right now
    async fn is_available(&self) -> bool;

    /// Look for an ongoing session to auto-join
    async fn discover_session(&self) -> Result<Option<JoinedSession>, CastError>;

    /// Ask the receiver for a new session
    async fn request_session(&self) -> Result<Arc<dyn Session>, CastError>;
}

/// A bound remote session
#[async_trait]
pub trait Session: Send + Sync {
    fn info(&self) -> SessionInfo;

    async fn load_media(&self, request: LoadRequest) -> Result<Arc<dyn MediaSession>, CastError>;

    /// Stop the receiver application, ending the session
    async fn stop(&self) -> Result<(), CastError>;

    /// Set receiver volume (0.0 - 1.0)
    async fn set_volume(&self, level: f32) -> Result<(), CastError>;

    async fn set_muted(&self, muted: bool) -> Result<(), CastError>;

    /// Authoritative media status updates
    fn subscribe_status(&self) -> broadcast::Receiver<MediaStatus>;

    /// Liveness of the session; flips to `false` once when it dies
    fn subscribe_liveness(&self) -> watch::Receiver<bool>;
}

/// A media instance loaded in a remote session
#[async_trait]
pub trait MediaSession: Send + Sync {
    fn info(&self) -> MediaSessionInfo;

    async fn play(&self) -> Result<(), CastError>;

    async fn pause(&self) -> Result<(), CastError>;

    async fn stop(&self) -> Result<(), CastError>;

    /// Seek to an absolute position in seconds
    async fn seek(&self, position: f64) -> Result<(), CastError>;
}

// =============================================================================
// catt Invocation
// =============================================================================

/// A `catt` binary bound to an optional device
#[derive(Debug, Clone)]
struct Catt {
    path: String,
    device: Option<String>,
}

impl Catt {
    fn args(&self, args: &[String]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(d) = &self.device {
            full.push("-d".to_string());
            full.push(d.clone());
        }
        full.extend(args.iter().cloned());
        full
    }

    /// Run catt and return its stdout
    async fn run(&self, args: &[String]) -> Result<String, CastError> {
        let action = args.first().cloned().unwrap_or_default();
        let full = self.args(args);
        debug!(catt = %self.path, args = ?full, "running catt");

        let result = Command::new(&self.path)
            .args(&full)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CastError::NotInstalled(self.path.clone())
                } else {
                    CastError::Command {
                        command: action.clone(),
                        message: e.to_string(),
                    }
                }
            })?;

        if result.status.success() {
            Ok(String::from_utf8_lossy(&result.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&result.stderr);
            Err(CastError::Command {
                command: action,
                message: stderr.trim().to_string(),
            })
        }
    }

    async fn action(&self, action: &str) -> Result<(), CastError> {
        self.run(&[action.to_string()]).await.map(|_| ())
    }
}

// =============================================================================
// catt Service
// =============================================================================

/// Remote session service backed by the catt CLI
pub struct CattService {
    catt: Catt,
    poll_interval: Duration,
}

impl CattService {
    /// Create a service using `catt` from PATH and catt's default device
    pub fn new() -> Self {
        Self::with_path("catt")
    }

    /// Create with custom catt path
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            catt: Catt {
                path: path.into(),
                device: None,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Target a specific device by name or IP
    pub fn with_device(mut self, device: Option<String>) -> Self {
        self.catt.device = device;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn device(&self) -> Option<&str> {
        self.catt.device.as_deref()
    }

    /// One-shot `catt status` against the configured device
    pub async fn status(&self) -> Result<Option<MediaStatus>, CastError> {
        let output = self.catt.run(&["status".to_string()]).await?;
        Ok(MediaStatus::parse_catt_status(&output, 0))
    }

    fn open_session(&self) -> Arc<CattSession> {
        let receiver_name = self
            .catt
            .device
            .clone()
            .unwrap_or_else(|| "default device".to_string());
        CattSession::start(
            self.catt.clone(),
            SessionInfo {
                session_id: uuid::Uuid::new_v4().to_string(),
                receiver_name,
            },
            self.poll_interval,
        )
    }
}

impl Default for CattService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSessionService for CattService {
    async fn is_available(&self) -> bool {
        Command::new(&self.catt.path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn discover_session(&self) -> Result<Option<JoinedSession>, CastError> {
        // Without a configured device there is nothing to rejoin
        if self.catt.device.is_none() {
            return Ok(None);
        }

        let status = match self.status().await {
            Ok(Some(status)) => status,
            Ok(None) => return Ok(None),
            Err(e) => {
                debug!(error = %e, "no ongoing session");
                return Ok(None);
            }
        };

        if !status.player_state.is_engaged() {
            return Ok(None);
        }

        let session = self.open_session();
        let media = session.adopt_media(&status);
        info!(
            receiver = %session.info.receiver_name,
            state = %status.player_state,
            "joined ongoing session"
        );
        Ok(Some(JoinedSession {
            session,
            media: Some(media),
        }))
    }

    async fn request_session(&self) -> Result<Arc<dyn Session>, CastError> {
        let device = self.catt.device.clone().ok_or(CastError::NoDevice)?;

        // `catt info` fails when the device cannot be reached
        self.catt
            .run(&["info".to_string()])
            .await
            .map_err(|e| CastError::SessionRequest(format!("{}: {}", device, e)))?;

        let session: Arc<dyn Session> = self.open_session();
        info!(receiver = %device, "session started");
        Ok(session)
    }
}

// =============================================================================
// catt Session
// =============================================================================

/// A bound catt device, polled for status in the background
pub struct CattSession {
    info: SessionInfo,
    catt: Catt,
    status_tx: broadcast::Sender<MediaStatus>,
    alive_rx: watch::Receiver<bool>,
    /// Id handed to the next loaded media instance
    next_media_id: AtomicU64,
    /// Id of the media instance status reports are attributed to (0 = none)
    current_media: Arc<AtomicU64>,
    poller: JoinHandle<()>,
}

impl CattSession {
    fn start(catt: Catt, info: SessionInfo, poll_interval: Duration) -> Arc<Self> {
        let (status_tx, _) = broadcast::channel(32);
        let (alive_tx, alive_rx) = watch::channel(true);
        let current_media = Arc::new(AtomicU64::new(0));

        let poller = tokio::spawn(poll_status(
            catt.clone(),
            poll_interval,
            status_tx.clone(),
            alive_tx,
            current_media.clone(),
        ));

        Arc::new(Self {
            info,
            catt,
            status_tx,
            alive_rx,
            next_media_id: AtomicU64::new(1),
            current_media,
            poller,
        })
    }

    fn allocate_media_id(&self) -> u64 {
        let id = self.next_media_id.fetch_add(1, Ordering::SeqCst);
        self.current_media.store(id, Ordering::SeqCst);
        id
    }

    /// Wrap media already playing on the receiver
    fn adopt_media(&self, status: &MediaStatus) -> Arc<dyn MediaSession> {
        let id = self.allocate_media_id();
        Arc::new(CattMediaSession {
            info: MediaSessionInfo {
                media_session_id: id,
                duration: status.duration,
                current_time: status.current_time,
                player_state: status.player_state,
            },
            catt: self.catt.clone(),
        })
    }
}

impl Drop for CattSession {
    fn drop(&mut self) {
        self.poller.abort();
    }
}

#[async_trait]
impl Session for CattSession {
    fn info(&self) -> SessionInfo {
        self.info.clone()
    }

    async fn load_media(&self, request: LoadRequest) -> Result<Arc<dyn MediaSession>, CastError> {
        // Status for the previous media no longer applies
        self.current_media.store(0, Ordering::SeqCst);

        let mut args = vec!["cast".to_string(), request.content_id.clone()];
        if request.current_time > 0.0 {
            args.push("--seek-to".to_string());
            args.push(format!("{:.0}", request.current_time));
        }
        self.catt
            .run(&args)
            .await
            .map_err(|e| CastError::Load(e.to_string()))?;

        if !request.autoplay {
            self.catt.action("pause").await?;
        }

        let status = match self.catt.run(&["status".to_string()]).await {
            Ok(output) => MediaStatus::parse_catt_status(&output, 0),
            Err(e) => {
                debug!(error = %e, "status after load unavailable");
                None
            }
        };

        let id = self.allocate_media_id();
        let player_state = if request.autoplay {
            PlayerState::Playing
        } else {
            PlayerState::Loaded
        };
        info!(title = %request.custom_data.title, media_session_id = id, "media loaded");

        Ok(Arc::new(CattMediaSession {
            info: MediaSessionInfo {
                media_session_id: id,
                duration: status.as_ref().and_then(|s| s.duration),
                current_time: status
                    .as_ref()
                    .map(|s| s.current_time)
                    .unwrap_or(request.current_time),
                player_state,
            },
            catt: self.catt.clone(),
        }))
    }

    async fn stop(&self) -> Result<(), CastError> {
        // A refused stop leaves the session running, so polling goes on
        self.catt.action("stop").await?;
        self.poller.abort();
        Ok(())
    }

    async fn set_volume(&self, level: f32) -> Result<(), CastError> {
        let percent = (level.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.catt
            .run(&["volume".to_string(), percent.to_string()])
            .await
            .map(|_| ())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), CastError> {
        let flag = if muted { "true" } else { "false" };
        self.catt
            .run(&["volumemute".to_string(), flag.to_string()])
            .await
            .map(|_| ())
    }

    fn subscribe_status(&self) -> broadcast::Receiver<MediaStatus> {
        self.status_tx.subscribe()
    }

    fn subscribe_liveness(&self) -> watch::Receiver<bool> {
        self.alive_rx.clone()
    }
}

/// Poll `catt status` until the device stops answering
async fn poll_status(
    catt: Catt,
    interval: Duration,
    status_tx: broadcast::Sender<MediaStatus>,
    alive_tx: watch::Sender<bool>,
    current_media: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut failures = 0u32;
    let mut last_state = PlayerState::Idle;

    loop {
        ticker.tick().await;

        let output = match catt.run(&["status".to_string()]).await {
            Ok(output) => {
                failures = 0;
                output
            }
            // catt status also fails when the receiver is up but idle
            Err(e) if catt.run(&["info".to_string()]).await.is_ok() => {
                debug!(error = %e, "receiver reachable, nothing playing");
                failures = 0;
                String::new()
            }
            Err(e) => {
                failures += 1;
                debug!(error = %e, failures, "status poll failed");
                if failures >= MAX_POLL_FAILURES {
                    warn!("receiver stopped answering, session lost");
                    let _ = alive_tx.send(false);
                    return;
                }
                continue;
            }
        };

        let media_id = current_media.load(Ordering::SeqCst);
        if media_id == 0 {
            continue;
        }

        let status = match MediaStatus::parse_catt_status(&output, media_id) {
            Some(status) => status,
            // catt prints no state once playback ended
            None if last_state == PlayerState::Playing => MediaStatus {
                media_session_id: media_id,
                player_state: PlayerState::Idle,
                idle_reason: Some(IdleReason::Finished),
                current_time: 0.0,
                duration: None,
                volume: None,
                muted: None,
            },
            None => continue,
        };

        last_state = status.player_state;
        // No subscribers is fine, the controller may not have attached yet
        let _ = status_tx.send(status);
    }
}

// =============================================================================
// catt Media Session
// =============================================================================

/// Media instance on a catt device
pub struct CattMediaSession {
    info: MediaSessionInfo,
    catt: Catt,
}

#[async_trait]
impl MediaSession for CattMediaSession {
    fn info(&self) -> MediaSessionInfo {
        self.info.clone()
    }

    async fn play(&self) -> Result<(), CastError> {
        self.catt.action("play").await
    }

    async fn pause(&self) -> Result<(), CastError> {
        self.catt.action("pause").await
    }

    async fn stop(&self) -> Result<(), CastError> {
        self.catt.action("stop").await
    }

    async fn seek(&self, position: f64) -> Result<(), CastError> {
        self.catt
            .run(&["seek".to_string(), format!("{:.0}", position.max(0.0))])
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catt_args_with_device() {
        let catt = Catt {
            path: "catt".to_string(),
            device: Some("Living Room".to_string()),
        };
        assert_eq!(
            catt.args(&["status".to_string()]),
            vec!["-d", "Living Room", "status"]
        );
    }

    #[test]
    fn test_catt_args_without_device() {
        let catt = Catt {
            path: "catt".to_string(),
            device: None,
        };
        assert_eq!(catt.args(&["play".to_string()]), vec!["play"]);
    }

    #[tokio::test]
    async fn test_missing_catt_binary() {
        let service = CattService::with_path("/nonexistent/catt-binary");
        assert!(!service.is_available().await);
        assert_eq!(
            service.status().await.unwrap_err(),
            CastError::NotInstalled("/nonexistent/catt-binary".to_string())
        );
    }

    #[tokio::test]
    async fn test_request_session_requires_device() {
        let service = CattService::with_path("/nonexistent/catt-binary");
        assert_eq!(
            service.request_session().await.err(),
            Some(CastError::NoDevice)
        );
    }

    #[tokio::test]
    async fn test_discover_without_device() {
        let service = CattService::new();
        assert!(service.discover_session().await.unwrap().is_none());
    }

    // -------------------------------------------------------------------------
    // Status polling against a scripted catt
    // -------------------------------------------------------------------------

    #[cfg(unix)]
    mod polling {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        const WAIT: Duration = Duration::from_secs(5);

        /// Shell stand-in for catt, driven by marker files next to it
        const SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
if [ "$1" = "-d" ]; then shift 2; fi
case "$1" in
  --version|info)
    [ -f "$dir/reachable" ] && exit 0
    exit 1 ;;
  status)
    if [ -f "$dir/playing" ]; then
      printf 'State: PLAYING\nCurrent time: 12\nDuration: 600\n'
      exit 0
    fi
    [ -f "$dir/reachable" ] && { echo "Error: Nothing is currently playing." >&2; exit 1; }
    exit 1 ;;
  stop)
    [ -f "$dir/stop_ok" ] && exit 0
    echo "stop refused" >&2
    exit 1 ;;
  *) exit 0 ;;
esac
"#;

        struct FakeCatt {
            dir: PathBuf,
        }

        impl FakeCatt {
            fn new(markers: &[&str]) -> Self {
                let dir = std::env::temp_dir()
                    .join(format!("castplayer-catt-{}", uuid::Uuid::new_v4()));
                std::fs::create_dir_all(&dir).unwrap();
                let script = dir.join("catt");
                std::fs::write(&script, SCRIPT).unwrap();
                std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))
                    .unwrap();
                let fake = Self { dir };
                for marker in markers {
                    fake.set(marker, true);
                }
                fake
            }

            fn set(&self, marker: &str, on: bool) {
                let path = self.dir.join(marker);
                if on {
                    std::fs::write(path, "").unwrap();
                } else {
                    let _ = std::fs::remove_file(path);
                }
            }

            fn service(&self) -> CattService {
                CattService::with_path(self.dir.join("catt").to_string_lossy().to_string())
                    .with_device(Some("TV".to_string()))
                    .with_poll_interval(Duration::from_millis(20))
            }
        }

        impl Drop for FakeCatt {
            fn drop(&mut self) {
                let _ = std::fs::remove_dir_all(&self.dir);
            }
        }

        async fn wait_dead(session: &CattSession) {
            let mut alive = session.subscribe_liveness();
            tokio::time::timeout(WAIT, alive.wait_for(|alive| !*alive))
                .await
                .expect("liveness never dropped")
                .unwrap();
        }

        async fn next_status(status: &mut broadcast::Receiver<MediaStatus>) -> MediaStatus {
            tokio::time::timeout(WAIT, status.recv())
                .await
                .expect("no status")
                .unwrap()
        }

        #[tokio::test]
        async fn test_unreachable_receiver_loses_session() {
            let fake = FakeCatt::new(&[]);
            let session = fake.service().open_session();
            wait_dead(&session).await;
        }

        #[tokio::test]
        async fn test_idle_receiver_keeps_session() {
            let fake = FakeCatt::new(&["reachable"]);
            let session = fake.service().open_session();
            session.allocate_media_id();

            // Well past MAX_POLL_FAILURES polls
            tokio::time::sleep(Duration::from_millis(400)).await;
            assert!(*session.subscribe_liveness().borrow());
        }

        #[tokio::test]
        async fn test_playback_end_reports_finished() {
            let fake = FakeCatt::new(&["reachable", "playing"]);
            let session = fake.service().open_session();
            let media_id = session.allocate_media_id();
            let mut status = session.subscribe_status();

            let playing = next_status(&mut status).await;
            assert_eq!(playing.media_session_id, media_id);
            assert_eq!(playing.player_state, PlayerState::Playing);
            assert_eq!(playing.current_time, 12.0);

            fake.set("playing", false);
            let finished = loop {
                let next = next_status(&mut status).await;
                if next.player_state != PlayerState::Playing {
                    break next;
                }
            };
            assert!(finished.is_finished());
            assert!(*session.subscribe_liveness().borrow());
        }

        #[tokio::test]
        async fn test_refused_stop_keeps_polling() {
            let fake = FakeCatt::new(&["reachable", "playing"]);
            let session = fake.service().open_session();
            session.allocate_media_id();

            assert!(matches!(
                Session::stop(session.as_ref()).await,
                Err(CastError::Command { .. })
            ));

            let mut status = session.subscribe_status();
            assert_eq!(next_status(&mut status).await.player_state, PlayerState::Playing);

            fake.set("playing", false);
            fake.set("reachable", false);
            wait_dead(&session).await;
        }

        #[tokio::test]
        async fn test_stop_ends_polling() {
            let fake = FakeCatt::new(&["reachable", "playing", "stop_ok"]);
            let session = fake.service().open_session();
            session.allocate_media_id();

            Session::stop(session.as_ref()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(session.poller.is_finished());
        }
    }
}
