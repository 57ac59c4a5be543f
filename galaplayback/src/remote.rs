//! [`MediaHandle`] backed by a media element living in the visitor's browser.
//!
//! Commands go out on a broadcast channel that the page streams over SSE.
//! The browser answers with [`MediaReport`]s posted back over HTTP: play
//! results settle the matching pending request, the other reports update the
//! local mirror of the element and are handed to the controller as
//! [`MediaSignal`]s.

use crate::errors::{PlaybackError, Result};
use crate::media::{MediaHandle, MediaKind, MediaSignal, PlayRejection, PreloadHint, ReadyLevel};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

/// Instruction for one element of the page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum MediaCommand {
    SetMuted { muted: bool },
    SetLoop { looping: bool },
    SetPreload { preload: PreloadHint },
    SetVolume { volume: f64 },
    Play { request_id: u64 },
    Pause,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemoteCommand {
    pub element: String,
    pub command: MediaCommand,
}

/// What the browser reports about an element.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaReport {
    PlayResult {
        request_id: u64,
        ok: bool,
        #[serde(default)]
        error_code: Option<u16>,
        #[serde(default)]
        error_name: Option<String>,
    },
    /// HTML `readyState` (0..=4)
    Ready { ready_state: u8 },
    Error { code: u16 },
    Playing,
    Paused,
    Ended,
}

#[derive(Debug, Clone)]
struct Mirror {
    muted: bool,
    looping: bool,
    preload: PreloadHint,
    volume: f64,
    ready: ReadyLevel,
    error_code: Option<u16>,
    paused: bool,
}

impl Default for Mirror {
    fn default() -> Self {
        Self {
            muted: false,
            looping: false,
            preload: PreloadHint::Auto,
            volume: 1.0,
            ready: ReadyLevel::Empty,
            error_code: None,
            paused: true,
        }
    }
}

type PendingPlay = oneshot::Sender<std::result::Result<(), PlayRejection>>;

pub struct RemoteMedia {
    element: String,
    kind: MediaKind,
    source: String,
    commands: broadcast::Sender<RemoteCommand>,
    command_timeout: Duration,
    mirror: Mutex<Mirror>,
    pending: Mutex<HashMap<u64, PendingPlay>>,
    next_request: AtomicU64,
}

impl RemoteMedia {
    pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

    pub fn new(
        element: impl Into<String>,
        kind: MediaKind,
        source: impl Into<String>,
        commands: broadcast::Sender<RemoteCommand>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            element: element.into(),
            kind,
            source: source.into(),
            commands,
            command_timeout,
            mirror: Mutex::new(Mirror::default()),
            pending: Mutex::new(HashMap::new()),
            next_request: AtomicU64::new(0),
        }
    }

    pub fn element(&self) -> &str {
        &self.element
    }

    pub fn is_paused(&self) -> bool {
        self.mirror.lock().paused
    }

    pub fn volume(&self) -> f64 {
        self.mirror.lock().volume
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    fn emit(&self, command: MediaCommand) {
        // sans abonné la commande est perdue, le miroir reste à jour
        let _ = self.commands.send(RemoteCommand {
            element: self.element.clone(),
            command,
        });
    }

    /// Resolves a pending play request.
    pub fn settle(
        &self,
        request_id: u64,
        outcome: std::result::Result<(), PlayRejection>,
    ) -> Result<()> {
        let sender = self
            .pending
            .lock()
            .remove(&request_id)
            .ok_or(PlaybackError::UnknownPlayRequest(request_id))?;

        if outcome.is_ok() {
            let mut mirror = self.mirror.lock();
            mirror.paused = false;
            mirror.error_code = None;
        }
        // la requête a pu expirer entre-temps
        let _ = sender.send(outcome);
        Ok(())
    }

    /// Applies a browser report. Returns the signal to forward to the
    /// controller, if any.
    pub fn apply_report(&self, report: MediaReport) -> Result<Option<MediaSignal>> {
        match report {
            MediaReport::PlayResult {
                request_id,
                ok,
                error_code,
                error_name,
            } => {
                if let Some(code) = error_code {
                    self.mirror.lock().error_code = Some(code);
                }
                let outcome = if ok {
                    Ok(())
                } else {
                    Err(PlayRejection {
                        error_code,
                        error_name,
                    })
                };
                self.settle(request_id, outcome)?;
                Ok(None)
            }
            MediaReport::Ready { ready_state } => {
                let level = ReadyLevel::from_ready_state(ready_state);
                self.mirror.lock().ready = level;
                Ok(Some(MediaSignal::Ready(level)))
            }
            MediaReport::Error { code } => {
                self.mirror.lock().error_code = Some(code);
                Ok(Some(MediaSignal::Error(code)))
            }
            MediaReport::Playing => {
                let mut mirror = self.mirror.lock();
                mirror.paused = false;
                mirror.error_code = None;
                Ok(Some(MediaSignal::Playing))
            }
            MediaReport::Paused => {
                self.mirror.lock().paused = true;
                Ok(Some(MediaSignal::Paused))
            }
            MediaReport::Ended => {
                self.mirror.lock().paused = true;
                Ok(Some(MediaSignal::Ended))
            }
        }
    }

    /// Re-sends the element configuration, for a browser that just attached.
    pub fn replay_state(&self) {
        let mirror = self.mirror.lock().clone();
        self.emit(MediaCommand::SetPreload {
            preload: mirror.preload,
        });
        self.emit(MediaCommand::SetLoop {
            looping: mirror.looping,
        });
        self.emit(MediaCommand::SetVolume {
            volume: mirror.volume,
        });
        self.emit(MediaCommand::SetMuted {
            muted: mirror.muted,
        });
    }
}

#[async_trait]
impl MediaHandle for RemoteMedia {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn source(&self) -> String {
        self.source.clone()
    }

    fn set_muted(&self, muted: bool) {
        self.mirror.lock().muted = muted;
        self.emit(MediaCommand::SetMuted { muted });
    }

    fn is_muted(&self) -> bool {
        self.mirror.lock().muted
    }

    fn set_loop(&self, looping: bool) {
        self.mirror.lock().looping = looping;
        self.emit(MediaCommand::SetLoop { looping });
    }

    fn set_preload(&self, hint: PreloadHint) {
        self.mirror.lock().preload = hint;
        self.emit(MediaCommand::SetPreload { preload: hint });
    }

    fn set_volume(&self, volume: f64) {
        let volume = volume.clamp(0.0, 1.0);
        self.mirror.lock().volume = volume;
        self.emit(MediaCommand::SetVolume { volume });
    }

    fn ready_level(&self) -> ReadyLevel {
        self.mirror.lock().ready
    }

    fn error_code(&self) -> Option<u16> {
        self.mirror.lock().error_code
    }

    async fn play(&self) -> std::result::Result<(), PlayRejection> {
        if self.commands.receiver_count() == 0 {
            warn!(element = %self.element, "No browser attached, play request rejected");
            return Err(PlayRejection::aborted());
        }

        let request_id = self.next_request.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(request_id, tx);
        self.emit(MediaCommand::Play { request_id });
        debug!(element = %self.element, request_id, "Play request sent");

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(PlayRejection::aborted()),
            Err(_) => {
                self.pending.lock().remove(&request_id);
                warn!(element = %self.element, request_id, "Play request timed out");
                Err(PlayRejection::aborted())
            }
        }
    }

    fn pause(&self) {
        self.mirror.lock().paused = true;
        self.emit(MediaCommand::Pause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn remote(commands: &broadcast::Sender<RemoteCommand>) -> Arc<RemoteMedia> {
        Arc::new(RemoteMedia::new(
            "music",
            MediaKind::Audio,
            "/music/background.mp3",
            commands.clone(),
            Duration::from_secs(15),
        ))
    }

    async fn next_play_request(rx: &mut broadcast::Receiver<RemoteCommand>) -> u64 {
        loop {
            let command = rx.recv().await.unwrap();
            if let MediaCommand::Play { request_id } = command.command {
                return request_id;
            }
        }
    }

    #[tokio::test]
    async fn test_play_without_browser_is_rejected() {
        let (commands, _) = broadcast::channel(16);
        let media = remote(&commands);
        assert_eq!(media.play().await, Err(PlayRejection::aborted()));
        assert_eq!(media.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_play_is_settled_by_report() {
        let (commands, mut rx) = broadcast::channel(16);
        let media = remote(&commands);

        let player = tokio::spawn({
            let media = media.clone();
            async move { media.play().await }
        });

        let request_id = next_play_request(&mut rx).await;
        let signal = media
            .apply_report(MediaReport::PlayResult {
                request_id,
                ok: true,
                error_code: None,
                error_name: None,
            })
            .unwrap();
        assert_eq!(signal, None);
        assert_eq!(player.await.unwrap(), Ok(()));
        assert!(!media.is_paused());
    }

    #[tokio::test]
    async fn test_refused_play_carries_the_exception() {
        let (commands, mut rx) = broadcast::channel(16);
        let media = remote(&commands);

        let player = tokio::spawn({
            let media = media.clone();
            async move { media.play().await }
        });

        let request_id = next_play_request(&mut rx).await;
        media
            .apply_report(MediaReport::PlayResult {
                request_id,
                ok: false,
                error_code: None,
                error_name: Some("NotAllowedError".to_string()),
            })
            .unwrap();
        assert_eq!(
            player.await.unwrap(),
            Err(PlayRejection::with_name("NotAllowedError"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_play_times_out() {
        let (commands, _rx) = broadcast::channel(16);
        let media = remote(&commands);

        assert_eq!(media.play().await, Err(PlayRejection::aborted()));
        assert_eq!(media.pending_requests(), 0);
    }

    #[test]
    fn test_unknown_request() {
        let (commands, _rx) = broadcast::channel(16);
        let media = remote(&commands);
        assert_eq!(
            media.settle(7, Ok(())),
            Err(PlaybackError::UnknownPlayRequest(7))
        );
    }

    #[test]
    fn test_reports_update_the_mirror() {
        let (commands, _rx) = broadcast::channel(16);
        let media = remote(&commands);

        assert_eq!(
            media.apply_report(MediaReport::Ready { ready_state: 4 }).unwrap(),
            Some(MediaSignal::Ready(ReadyLevel::CanPlayThrough))
        );
        assert_eq!(media.ready_level(), ReadyLevel::CanPlayThrough);

        media.apply_report(MediaReport::Error { code: 2 }).unwrap();
        assert_eq!(media.error_code(), Some(2));

        media.apply_report(MediaReport::Playing).unwrap();
        assert_eq!(media.error_code(), None);
        assert!(!media.is_paused());

        assert_eq!(
            media.apply_report(MediaReport::Ended).unwrap(),
            Some(MediaSignal::Ended)
        );
        assert!(media.is_paused());
    }

    #[test]
    fn test_setters_emit_commands() {
        let (commands, mut rx) = broadcast::channel(16);
        let media = remote(&commands);

        media.set_muted(true);
        media.set_volume(1.7);

        assert_eq!(
            rx.try_recv().unwrap().command,
            MediaCommand::SetMuted { muted: true }
        );
        assert_eq!(
            rx.try_recv().unwrap().command,
            MediaCommand::SetVolume { volume: 1.0 }
        );
        assert!(media.is_muted());
    }

    #[test]
    fn test_report_wire_format() {
        let report: MediaReport = serde_json::from_str(
            r#"{"type":"play_result","request_id":3,"ok":false,"error_code":4}"#,
        )
        .unwrap();
        assert_eq!(
            report,
            MediaReport::PlayResult {
                request_id: 3,
                ok: false,
                error_code: Some(4),
                error_name: None,
            }
        );

        let command = serde_json::to_value(RemoteCommand {
            element: "reveal".to_string(),
            command: MediaCommand::Play { request_id: 1 },
        })
        .unwrap();
        assert_eq!(
            command,
            serde_json::json!({"element": "reveal", "command": {"command": "play", "request_id": 1}})
        );
    }
}
