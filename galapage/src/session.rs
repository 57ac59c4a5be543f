//! Sessions de page
//!
//! Un chargement de page = une session. Elle possède les contrôleurs de
//! lecture des trois éléments média (`music`, `countdown`, `reveal`), le
//! compte à rebours et la zone de déclenchement, ainsi que deux canaux
//! diffusés au navigateur par SSE : les commandes média et les événements
//! de page.

use crate::countdown::{Countdown, CountdownState};
use crate::errors::{PageError, Result};
use crate::trigger::{StartSignal, TriggerZone};
use chrono::{DateTime, Utc};
use galaconfig::Config;
use galaplayback::{
    CapabilityDetector, CapabilityProfile, MediaHandle, MediaKind, MediaReport, PlaybackController,
    PlaybackStatus, RemoteCommand, RemoteMedia, RetryPolicy,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

pub const MUSIC: &str = "music";
pub const COUNTDOWN: &str = "countdown";
pub const REVEAL: &str = "reveal";

/// Éléments média connus d'une page
pub const ELEMENTS: [&str; 3] = [MUSIC, COUNTDOWN, REVEAL];

const CHANNEL_CAPACITY: usize = 256;

fn element_name(element: &str) -> Result<&'static str> {
    ELEMENTS
        .iter()
        .copied()
        .find(|known| *known == element)
        .ok_or_else(|| PageError::UnknownElement(element.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MediaAction {
    Start,
    Pause,
    Retry,
}

impl FromStr for MediaAction {
    type Err = PageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(MediaAction::Start),
            "pause" => Ok(MediaAction::Pause),
            "retry" => Ok(MediaAction::Retry),
            other => Err(PageError::UnknownAction(other.to_string())),
        }
    }
}

/// Réglages communs à toutes les sessions
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub countdown_seconds: u64,
    pub music_src: String,
    pub music_volume: f64,
    pub countdown_audio_src: String,
    pub reveal_video_src: String,
    pub policy: RetryPolicy,
    pub command_timeout: Duration,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            countdown_seconds: 10,
            music_src: "/music/background.mp3".to_string(),
            music_volume: 0.3,
            countdown_audio_src: "/music/countdown-10-to-0.wav".to_string(),
            reveal_video_src: "/video/reveal.mp4".to_string(),
            policy: RetryPolicy::default(),
            command_timeout: RemoteMedia::DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl PageSettings {
    pub fn from_config(config: &Config) -> Self {
        let default = Self::default();
        Self {
            countdown_seconds: config
                .get_countdown_seconds()
                .unwrap_or(default.countdown_seconds),
            music_src: config.get_music_src(),
            music_volume: config.get_music_volume(),
            countdown_audio_src: config.get_countdown_audio_src(),
            reveal_video_src: config.get_reveal_video_src(),
            policy: RetryPolicy::from_config(config),
            command_timeout: config
                .get_command_timeout_secs()
                .map(Duration::from_secs)
                .unwrap_or(default.command_timeout),
        }
    }
}

/// Événement poussé au navigateur
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PageEvent {
    Status {
        element: String,
        status: PlaybackStatus,
        explanation: Option<String>,
    },
    Countdown {
        remaining: u64,
    },
    CountdownComplete,
    Reveal {
        src: String,
    },
    Closed,
}

impl PageEvent {
    fn status(element: &str, status: PlaybackStatus) -> Self {
        PageEvent::Status {
            element: element.to_string(),
            explanation: status.last_error.map(|e| e.explanation().to_string()),
            status,
        }
    }

    /// Nom de l'événement SSE
    pub fn name(&self) -> &'static str {
        match self {
            PageEvent::Status { .. } => "status",
            PageEvent::Countdown { .. } => "countdown",
            PageEvent::CountdownComplete => "countdown_complete",
            PageEvent::Reveal { .. } => "reveal",
            PageEvent::Closed => "closed",
        }
    }
}

/// État d'un élément vu par l'API
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MediaStatus {
    pub element: String,
    pub mounted: bool,
    pub status: PlaybackStatus,
    pub explanation: Option<String>,
}

struct MountedElement {
    media: Arc<RemoteMedia>,
    controller: PlaybackController,
}

pub struct PageSession {
    id: Uuid,
    created_at: DateTime<Utc>,
    capability: CapabilityProfile,
    settings: PageSettings,
    commands: broadcast::Sender<RemoteCommand>,
    events: broadcast::Sender<PageEvent>,
    elements: RwLock<HashMap<&'static str, MountedElement>>,
    countdown: Arc<Countdown>,
    trigger: TriggerZone,
    interacted: AtomicBool,
    /// Flux SSE actuellement branchés
    streams: AtomicUsize,
    cancel: CancellationToken,
}

impl PageSession {
    /// Ouvre une session. La musique est montée au premier attachement du
    /// navigateur ([`PageSession::attach`]), pas avant : sans abonné, toute
    /// demande de lecture serait refusée.
    pub fn open(settings: PageSettings, capability: CapabilityProfile) -> Arc<Self> {
        let cancel = CancellationToken::new();
        let countdown = Countdown::new(settings.countdown_seconds, cancel.child_token());
        let (commands, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);

        let session = Arc::new_cyclic(|weak: &Weak<PageSession>| {
            let weak = weak.clone();
            let signal = StartSignal::new(move || {
                weak.upgrade()
                    .map(|session| session.start_countdown())
                    .unwrap_or(false)
            });

            PageSession {
                id: Uuid::new_v4(),
                created_at: Utc::now(),
                capability,
                settings,
                commands,
                events,
                elements: RwLock::new(HashMap::new()),
                countdown,
                trigger: TriggerZone::new(signal),
                interacted: AtomicBool::new(false),
                streams: AtomicUsize::new(0),
                cancel,
            }
        });

        let weak = Arc::downgrade(&session);
        session.countdown.on_complete(move || {
            if let Some(session) = weak.upgrade() {
                session.on_countdown_complete();
            }
        });
        session.spawn_countdown_forwarder();

        info!(
            session = %session.id,
            restricted = session.capability.is_restricted_platform,
            "📄 Page session opened"
        );
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn capability(&self) -> &CapabilityProfile {
        &self.capability
    }

    pub fn settings(&self) -> &PageSettings {
        &self.settings
    }

    pub fn countdown(&self) -> CountdownState {
        self.countdown.state()
    }

    pub fn has_interacted(&self) -> bool {
        self.interacted.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(PageError::Closed(self.id))
        } else {
            Ok(())
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }

    /// Branche un navigateur : abonnements aux commandes et aux événements,
    /// rejeu de l'état des éléments déjà montés, puis montage de la musique.
    pub fn attach(
        &self,
    ) -> Result<(
        broadcast::Receiver<RemoteCommand>,
        broadcast::Receiver<PageEvent>,
    )> {
        self.ensure_open()?;
        self.streams.fetch_add(1, Ordering::SeqCst);
        let commands = self.commands.subscribe();
        let events = self.events.subscribe();

        let mounted: Vec<Arc<RemoteMedia>> = self
            .elements
            .read()
            .values()
            .map(|e| e.media.clone())
            .collect();
        for media in mounted {
            media.replay_state();
        }

        self.mount(
            MUSIC,
            MediaKind::Audio,
            self.settings.music_src.clone(),
            true,
            self.settings.music_volume,
        );

        debug!(session = %self.id, "Browser attached");
        Ok((commands, events))
    }

    /// Débranche un navigateur. Renvoie le nombre de flux encore branchés.
    pub fn detach(&self) -> usize {
        let previous = self
            .streams
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        let remaining = previous.saturating_sub(1);
        debug!(session = %self.id, remaining, "Browser detached");
        remaining
    }

    pub fn attached_streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    /// Statut courant de chaque élément monté, plus le compte à rebours
    pub fn snapshot(&self) -> Vec<PageEvent> {
        let mut events: Vec<PageEvent> = self
            .elements
            .read()
            .iter()
            .map(|(name, e)| PageEvent::status(name, e.controller.status()))
            .collect();
        let countdown = self.countdown.state();
        if countdown.started {
            events.push(PageEvent::Countdown {
                remaining: countdown.remaining,
            });
        }
        events
    }

    /// Interaction quelconque du visiteur (clic, toucher, touche, défilement)
    pub fn interact(&self) -> Result<()> {
        self.ensure_open()?;
        if !self.interacted.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id, "First user interaction");
        }
        for element in self.elements.read().values() {
            // un contrôleur démonté ne concerne plus la page
            let _ = element.controller.gesture();
        }
        Ok(())
    }

    /// Le visiteur a atteint la zone de déclenchement. Compte comme une
    /// interaction. Renvoie `true` si le compte à rebours vient de démarrer.
    pub fn trigger(&self, back: bool) -> Result<bool> {
        self.interact()?;
        Ok(if back {
            self.trigger.enter_back()
        } else {
            self.trigger.enter()
        })
    }

    fn start_countdown(&self) -> bool {
        if self.is_closed() || !self.countdown.start() {
            return false;
        }
        self.mount(
            COUNTDOWN,
            MediaKind::Audio,
            self.settings.countdown_audio_src.clone(),
            false,
            1.0,
        );
        true
    }

    fn on_countdown_complete(&self) {
        if self.is_closed() {
            return;
        }
        let _ = self.events.send(PageEvent::Countdown { remaining: 0 });
        let _ = self.events.send(PageEvent::CountdownComplete);
        self.mount(
            REVEAL,
            MediaKind::Video,
            self.settings.reveal_video_src.clone(),
            true,
            1.0,
        );
        info!(session = %self.id, "✨ Reveal");
        let _ = self.events.send(PageEvent::Reveal {
            src: self.settings.reveal_video_src.clone(),
        });
    }

    fn mount(&self, name: &'static str, kind: MediaKind, src: String, looping: bool, volume: f64) {
        if self.is_closed() {
            return;
        }
        let mut elements = self.elements.write();
        if elements.contains_key(name) {
            return;
        }

        let media = Arc::new(RemoteMedia::new(
            name,
            kind,
            src,
            self.commands.clone(),
            self.settings.command_timeout,
        ));
        media.set_loop(looping);
        media.set_volume(volume);

        let controller = PlaybackController::mount(
            name,
            media.clone(),
            self.capability.clone(),
            self.settings.policy,
        );
        self.spawn_status_forwarder(name, controller.subscribe());
        if self.has_interacted() {
            let _ = controller.gesture();
        }

        info!(session = %self.id, element = name, source = %media.source(), "🎬 Media element mounted");
        elements.insert(name, MountedElement { media, controller });
    }

    fn spawn_status_forwarder(&self, element: &'static str, mut rx: watch::Receiver<PlaybackStatus>) {
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let status = rx.borrow_and_update().clone();
                        let _ = events.send(PageEvent::status(element, status));
                    }
                }
            }
        });
    }

    fn spawn_countdown_forwarder(&self) {
        let mut rx = self.countdown.subscribe();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *rx.borrow_and_update();
                        // le dernier tick part du hook de fin, avant la révélation
                        if state.completed {
                            break;
                        }
                        if state.started {
                            let _ = events.send(PageEvent::Countdown { remaining: state.remaining });
                        }
                    }
                }
            }
        });
    }

    fn with_element<T>(
        &self,
        element: &str,
        f: impl FnOnce(&MountedElement) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        let name = element_name(element)?;
        let elements = self.elements.read();
        let mounted = elements
            .get(name)
            .ok_or_else(|| PageError::NotMounted(name.to_string()))?;
        f(mounted)
    }

    pub fn media_status(&self, element: &str) -> Result<MediaStatus> {
        self.ensure_open()?;
        let name = element_name(element)?;
        let (mounted, status) = match self.elements.read().get(name) {
            Some(e) => (true, e.controller.status()),
            None => (false, PlaybackStatus::default()),
        };
        Ok(MediaStatus {
            element: name.to_string(),
            mounted,
            explanation: status.last_error.map(|e| e.explanation().to_string()),
            status,
        })
    }

    pub fn control(&self, element: &str, action: MediaAction) -> Result<PlaybackStatus> {
        self.with_element(element, |e| {
            match action {
                MediaAction::Start => e.controller.start()?,
                MediaAction::Pause => e.controller.pause()?,
                MediaAction::Retry => e.controller.retry()?,
            }
            Ok(e.controller.status())
        })
    }

    /// Applique un rapport du navigateur et le relaie au contrôleur
    pub fn report(&self, element: &str, report: MediaReport) -> Result<()> {
        self.with_element(element, |e| {
            if let Some(signal) = e.media.apply_report(report)? {
                e.controller.notify(signal)?;
            }
            Ok(())
        })
    }

    /// Démonte tout. Idempotent.
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.cancel.cancel();
        for (_, element) in self.elements.write().drain() {
            element.controller.unmount();
        }
        let _ = self.events.send(PageEvent::Closed);
        info!(session = %self.id, "📄 Page session closed");
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Sessions ouvertes, indexées par identifiant
pub struct SessionRegistry {
    detector: CapabilityDetector,
    settings: PageSettings,
    sessions: RwLock<HashMap<Uuid, Arc<PageSession>>>,
}

impl SessionRegistry {
    pub fn new(detector: CapabilityDetector, settings: PageSettings) -> Self {
        Self {
            detector,
            settings,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            CapabilityDetector::from_config(config),
            PageSettings::from_config(config),
        )
    }

    /// Ouvre une session pour un chargement de page. Le `User-Agent` n'est
    /// lu qu'ici.
    pub fn create(&self, user_agent: Option<&str>) -> Arc<PageSession> {
        let capability = self.detector.detect(user_agent);
        let session = PageSession::open(self.settings.clone(), capability);
        self.sessions.write().insert(session.id(), session.clone());
        session
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<PageSession>> {
        self.sessions
            .read()
            .get(&id)
            .cloned()
            .ok_or(PageError::UnknownSession(id))
    }

    pub fn close(&self, id: Uuid) -> Result<()> {
        let session = self
            .sessions
            .write()
            .remove(&id)
            .ok_or(PageError::UnknownSession(id))?;
        session.close();
        Ok(())
    }

    /// Un flux SSE de la session s'est terminé. Sans plus aucun flux
    /// branché, la session est fermée et oubliée.
    pub fn release(&self, id: Uuid) {
        let Ok(session) = self.get(id) else {
            return;
        };
        if session.detach() > 0 {
            return;
        }
        if self.sessions.write().remove(&id).is_some() {
            info!(session = %id, "🔌 Last browser stream gone");
            session.close();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(CapabilityDetector::default(), PageSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_action_parsing() {
        assert_eq!("retry".parse::<MediaAction>(), Ok(MediaAction::Retry));
        assert_eq!(
            "rewind".parse::<MediaAction>(),
            Err(PageError::UnknownAction("rewind".into()))
        );
    }

    #[test]
    fn test_element_names() {
        assert_eq!(element_name("music"), Ok(MUSIC));
        assert_eq!(
            element_name("poster"),
            Err(PageError::UnknownElement("poster".into()))
        );
    }

    #[test]
    fn test_status_event_carries_explanation() {
        let status = PlaybackStatus {
            last_error: Some(galaplayback::ErrorCategory::DecodeFailure),
            ..PlaybackStatus::default()
        };
        match PageEvent::status(REVEAL, status) {
            PageEvent::Status { explanation, .. } => assert_eq!(
                explanation.as_deref(),
                Some(galaplayback::ErrorCategory::DecodeFailure.explanation())
            ),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_page_event_wire_format() {
        let json = serde_json::to_value(PageEvent::Countdown { remaining: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "countdown", "remaining": 4}));
    }
}
