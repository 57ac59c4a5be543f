//! Runtime of one playback controller.
//!
//! A single tokio task owns the [`PlaybackMachine`] and consumes events from
//! an mpsc channel. Play requests and timers run in their own tasks and feed
//! their outcome back as events, so the machine is never touched concurrently.
//!
//! ```text
//!  PlaybackController ──events──▶ runtime task ──effects──▶ MediaHandle
//!        ▲                           │   ▲                      │
//!        └──────── watch<status> ────┘   └── timers / attempts ─┘
//! ```

use crate::capability::CapabilityProfile;
use crate::errors::{PlaybackError, Result};
use crate::machine::{Effect, Event, PlaybackMachine, PlaybackStatus};
use crate::media::{MediaHandle, MediaSignal, ReadyLevel};
use crate::scheduler::RetryPolicy;
use crate::strategy::{self, AttemptMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle on a mounted controller.
///
/// Dropping it unmounts the controller.
pub struct PlaybackController {
    name: String,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Receiver<PlaybackStatus>,
    cancel: CancellationToken,
    media: Arc<dyn MediaHandle>,
}

impl PlaybackController {
    /// Mounts a controller on `media` and starts its runtime task.
    ///
    /// The capability profile is the one computed once for the page load.
    /// Must be called from within a tokio runtime.
    pub fn mount(
        name: impl Into<String>,
        media: Arc<dyn MediaHandle>,
        capability: CapabilityProfile,
        policy: RetryPolicy,
    ) -> Self {
        let name = name.into();
        let (events, rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(PlaybackStatus::default());
        let cancel = CancellationToken::new();

        let ready_level = media.ready_level();
        let runtime = Runtime {
            machine: PlaybackMachine::new(name.clone(), policy),
            media: media.clone(),
            events: events.clone(),
            status: status_tx,
            cancel: cancel.clone(),
            timers: Timers::default(),
        };
        tokio::spawn(runtime.run(rx));

        debug!(controller = %name, source = %media.source(), "Mounting playback controller");
        let _ = events.send(Event::Mounted {
            capability,
            ready_level,
        });

        Self {
            name,
            events,
            status,
            cancel,
            media,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media(&self) -> &Arc<dyn MediaHandle> {
        &self.media
    }

    fn send(&self, event: Event) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PlaybackError::unmounted(&self.name));
        }
        self.events
            .send(event)
            .map_err(|_| PlaybackError::unmounted(&self.name))
    }

    /// Explicit resume from `Paused`. Ignored in other phases.
    pub fn start(&self) -> Result<()> {
        self.send(Event::PlayRequested)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Event::PauseRequested)
    }

    /// Explicit user retry: clears the failure count and tries audibly first.
    pub fn retry(&self) -> Result<()> {
        self.send(Event::RetryRequested)
    }

    /// Any user interaction with the page (click, touch, key, scroll).
    pub fn gesture(&self) -> Result<()> {
        self.send(Event::Gesture)
    }

    pub fn notify(&self, signal: MediaSignal) -> Result<()> {
        let event = match signal {
            MediaSignal::Ready(level) => Event::ReadinessChanged { level },
            MediaSignal::Error(code) => Event::MediaError { code },
            MediaSignal::Playing => Event::MediaPlaying,
            MediaSignal::Paused => Event::MediaPaused,
            MediaSignal::Ended => Event::MediaEnded,
        };
        self.send(event)
    }

    pub fn notify_ready(&self, level: ReadyLevel) -> Result<()> {
        self.notify(MediaSignal::Ready(level))
    }

    pub fn notify_error(&self, code: u16) -> Result<()> {
        self.notify(MediaSignal::Error(code))
    }

    pub fn notify_playing(&self) -> Result<()> {
        self.notify(MediaSignal::Playing)
    }

    pub fn notify_paused(&self) -> Result<()> {
        self.notify(MediaSignal::Paused)
    }

    pub fn notify_ended(&self) -> Result<()> {
        self.notify(MediaSignal::Ended)
    }

    /// Last published status.
    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    /// Receiver notified on every status change.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.clone()
    }

    /// Waits until the status satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<PlaybackStatus>
    where
        F: FnMut(&PlaybackStatus) -> bool,
    {
        let mut rx = self.status.clone();
        rx.wait_for(|status| predicate(status))
            .await
            .map(|status| status.clone())
            .map_err(|_| PlaybackError::unmounted(&self.name))
    }

    /// Cancels every timer and detaches from the element. Idempotent.
    pub fn unmount(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.cancel.cancel();
        debug!(controller = %self.name, "Playback controller unmounted");
    }

    pub fn is_unmounted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[derive(Default)]
struct Timers {
    retry: Option<CancellationToken>,
    readiness: Option<CancellationToken>,
    unmute: Option<CancellationToken>,
}

impl Timers {
    fn cancel_all(&mut self) {
        for token in [self.retry.take(), self.readiness.take(), self.unmute.take()]
            .into_iter()
            .flatten()
        {
            token.cancel();
        }
    }
}

fn replace_timer(slot: &mut Option<CancellationToken>, token: Option<CancellationToken>) {
    if let Some(previous) = std::mem::replace(slot, token) {
        previous.cancel();
    }
}

struct Runtime {
    machine: PlaybackMachine,
    media: Arc<dyn MediaHandle>,
    events: mpsc::UnboundedSender<Event>,
    status: watch::Sender<PlaybackStatus>,
    cancel: CancellationToken,
    timers: Timers,
}

impl Runtime {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Event>) {
        let cancel = self.cancel.clone();
        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    for effect in self.machine.handle(Event::Unmount) {
                        self.apply(effect);
                    }
                    break;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            for effect in self.machine.handle(event) {
                self.apply(effect);
            }

            let status = self.machine.status();
            self.status.send_if_modified(|current| {
                if *current != status {
                    *current = status;
                    true
                } else {
                    false
                }
            });

            if self.machine.is_unmounted() {
                break;
            }
        }

        self.timers.cancel_all();
        self.cancel.cancel();
        debug!(controller = %self.machine.name(), "Playback runtime stopped");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::SetPreload(hint) => self.media.set_preload(hint),
            Effect::Attempt {
                id,
                mode,
                has_user_interacted,
            } => self.spawn_attempt(id, mode, has_user_interacted),
            Effect::ArmRetry { generation, delay } => {
                let token = self.spawn_timer(delay, Event::RetryTimerFired { generation });
                replace_timer(&mut self.timers.retry, Some(token));
            }
            Effect::CancelRetry => replace_timer(&mut self.timers.retry, None),
            Effect::ArmReadinessTimeout {
                generation,
                timeout,
            } => {
                let token = self.spawn_timer(timeout, Event::ReadinessTimedOut { generation });
                replace_timer(&mut self.timers.readiness, Some(token));
            }
            Effect::CancelReadinessTimeout => replace_timer(&mut self.timers.readiness, None),
            Effect::ArmUnmute { generation, delay } => {
                let token = self.spawn_timer(delay, Event::UnmuteTimerFired { generation });
                replace_timer(&mut self.timers.unmute, Some(token));
            }
            Effect::CancelUnmute => replace_timer(&mut self.timers.unmute, None),
            Effect::Unmute => self.media.set_muted(false),
            Effect::Pause => self.media.pause(),
            Effect::Teardown => self.timers.cancel_all(),
        }
    }

    /// The play request is not cancellable: its result is simply discarded
    /// by the machine if it arrives late.
    fn spawn_attempt(&self, id: u64, mode: AttemptMode, has_user_interacted: bool) {
        let media = self.media.clone();
        let events = self.events.clone();
        debug!(controller = %self.machine.name(), id, ?mode, "Issuing play attempt");
        tokio::spawn(async move {
            let result = strategy::attempt(media.as_ref(), mode, has_user_interacted).await;
            let _ = events.send(Event::AttemptSettled { id, result });
        });
    }

    fn spawn_timer(&self, delay: Duration, event: Event) -> CancellationToken {
        let token = self.cancel.child_token();
        let guard = token.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = events.send(event);
                }
            }
        });
        token
    }
}
