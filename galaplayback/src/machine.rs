//! Playback controller state machine.
//!
//! [`PlaybackMachine::handle`] is the only place where controller state
//! changes. It performs no I/O: it returns [`Effect`]s that the runtime in
//! [`crate::controller`] executes, and the outcome of those effects comes back
//! as new [`Event`]s. Timers and attempts carry an id so that late arrivals
//! from a cancelled timer or a superseded attempt are recognised and dropped.

use crate::capability::CapabilityProfile;
use crate::classifier::{ErrorCategory, LowLevelFailure, classify};
use crate::media::{PreloadHint, ReadyLevel};
use crate::scheduler::{RetryDecision, RetryPolicy, RetryScheduler};
use crate::strategy::{AttemptMode, AttemptResult, wants_deferred_unmute};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Detecting,
    Attempting,
    Playing,
    Paused,
    NeedsGesture,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Detecting => "detecting",
            Phase::Attempting => "attempting",
            Phase::Playing => "playing",
            Phase::Paused => "paused",
            Phase::NeedsGesture => "needs_gesture",
        }
    }
}

/// Externally observable controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlaybackStatus {
    pub phase: Phase,
    pub last_error: Option<ErrorCategory>,
    pub retry_count: u32,
    pub has_user_interacted: bool,
    pub is_restricted_platform: bool,
}

impl PlaybackStatus {
    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Playing
    }
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            last_error: None,
            retry_count: 0,
            has_user_interacted: false,
            is_restricted_platform: false,
        }
    }
}

/// Inputs of the transition function.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The element exists; the capability profile was computed for this page load.
    Mounted {
        capability: CapabilityProfile,
        ready_level: ReadyLevel,
    },
    AttemptSettled {
        id: u64,
        result: AttemptResult,
    },
    RetryTimerFired {
        generation: u64,
    },
    ReadinessChanged {
        level: ReadyLevel,
    },
    ReadinessTimedOut {
        generation: u64,
    },
    UnmuteTimerFired {
        generation: u64,
    },
    /// `start()`
    PlayRequested,
    /// `pause()`
    PauseRequested,
    /// `retry()`, an explicit user action
    RetryRequested,
    /// Any user interaction with the page
    Gesture,
    MediaError {
        code: u16,
    },
    MediaPlaying,
    MediaPaused,
    MediaEnded,
    Unmount,
}

/// Side effects requested by the transition function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SetPreload(PreloadHint),
    Attempt {
        id: u64,
        mode: AttemptMode,
        has_user_interacted: bool,
    },
    ArmRetry {
        generation: u64,
        delay: Duration,
    },
    CancelRetry,
    ArmReadinessTimeout {
        generation: u64,
        timeout: Duration,
    },
    CancelReadinessTimeout,
    ArmUnmute {
        generation: u64,
        delay: Duration,
    },
    CancelUnmute,
    Unmute,
    Pause,
    Teardown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Round {
    /// Muted attempts driven by the retry scheduler.
    Auto,
    /// Audible attempt from a user interaction, with one muted fallback.
    Gesture { fallback_used: bool },
}

#[derive(Debug, Clone, Copy)]
struct PendingAttempt {
    id: u64,
    mode: AttemptMode,
}

#[derive(Debug, Clone, Copy)]
struct ReadinessWait {
    generation: u64,
    mode: AttemptMode,
}

#[derive(Debug, Clone)]
pub struct PlaybackMachine {
    name: String,
    scheduler: RetryScheduler,
    phase: Phase,
    has_user_interacted: bool,
    last_error: Option<ErrorCategory>,
    capability: CapabilityProfile,
    ready_level: ReadyLevel,
    round: Round,
    pending: Option<PendingAttempt>,
    next_attempt_id: u64,
    generation: u64,
    retry_timer: Option<u64>,
    readiness_wait: Option<ReadinessWait>,
    unmute_timer: Option<u64>,
    muted_start: bool,
    unmounted: bool,
}

impl PlaybackMachine {
    pub fn new(name: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            name: name.into(),
            scheduler: RetryScheduler::new(policy),
            phase: Phase::Idle,
            has_user_interacted: false,
            last_error: None,
            capability: CapabilityProfile::unrestricted(),
            ready_level: ReadyLevel::Empty,
            round: Round::Auto,
            pending: None,
            next_attempt_id: 0,
            generation: 0,
            retry_timer: None,
            readiness_wait: None,
            unmute_timer: None,
            muted_start: false,
            unmounted: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn last_error(&self) -> Option<ErrorCategory> {
        self.last_error
    }

    pub fn has_pending_attempt(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_unmounted(&self) -> bool {
        self.unmounted
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            phase: self.phase,
            last_error: self.last_error,
            retry_count: self.scheduler.failures(),
            has_user_interacted: self.has_user_interacted,
            is_restricted_platform: self.capability.is_restricted_platform,
        }
    }

    /// Applies one event and returns the effects to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.unmounted {
            debug!(controller = %self.name, ?event, "Event after unmount discarded");
            return fx;
        }

        let before = self.phase;
        match event {
            Event::Mounted {
                capability,
                ready_level,
            } => self.on_mounted(capability, ready_level, &mut fx),
            Event::AttemptSettled { id, result } => self.on_attempt_settled(id, result, &mut fx),
            Event::RetryTimerFired { generation } => self.on_retry_timer(generation, &mut fx),
            Event::ReadinessChanged { level } => self.on_readiness(level, &mut fx),
            Event::ReadinessTimedOut { generation } => {
                self.on_readiness_timeout(generation, &mut fx)
            }
            Event::UnmuteTimerFired { generation } => self.on_unmute_timer(generation, &mut fx),
            Event::PlayRequested => self.on_play_requested(&mut fx),
            Event::PauseRequested => self.on_pause_requested(&mut fx),
            Event::RetryRequested => self.on_interaction(AttemptMode::Unmuted, true, &mut fx),
            Event::Gesture => self.on_interaction(AttemptMode::UserGesture, false, &mut fx),
            Event::MediaError { code } => self.on_media_error(code, &mut fx),
            Event::MediaPlaying => self.on_media_playing(&mut fx),
            Event::MediaPaused | Event::MediaEnded => self.on_media_stopped(&mut fx),
            Event::Unmount => {
                self.unmounted = true;
                self.pending = None;
                self.cancel_timers(&mut fx);
                fx.push(Effect::Teardown);
            }
        }

        if before != self.phase {
            info!(
                controller = %self.name,
                from = before.as_str(),
                to = self.phase.as_str(),
                last_error = ?self.last_error,
                "Playback phase changed"
            );
        }
        fx
    }

    fn on_mounted(
        &mut self,
        capability: CapabilityProfile,
        ready_level: ReadyLevel,
        fx: &mut Vec<Effect>,
    ) {
        if self.phase != Phase::Idle {
            warn!(controller = %self.name, "Already mounted, ignoring");
            return;
        }

        self.phase = Phase::Detecting;
        self.ready_level = ready_level;
        fx.push(Effect::SetPreload(capability.preferred_preload));
        self.capability = capability;

        match self.scheduler.admit(&self.capability) {
            Some(RetryDecision::Bypassed) => {
                self.last_error = Some(ErrorCategory::PlatformRestricted);
                self.enter_needs_gesture(fx);
            }
            Some(_) => self.enter_needs_gesture(fx),
            None => self.begin_auto_round(fx),
        }
    }

    fn on_attempt_settled(&mut self, id: u64, result: AttemptResult, fx: &mut Vec<Effect>) {
        let Some(pending) = self.pending.filter(|p| p.id == id) else {
            debug!(controller = %self.name, id, "Stale attempt result discarded");
            // l'élément joue alors que l'état dit le contraire : on l'arrête
            if result.succeeded && self.phase != Phase::Playing && self.pending.is_none() {
                fx.push(Effect::Pause);
            }
            return;
        };
        self.pending = None;

        match result.category() {
            None => self.enter_playing(pending.mode, fx),
            Some(category) => self.on_attempt_failed(pending.mode, category, fx),
        }
    }

    fn on_attempt_failed(&mut self, mode: AttemptMode, category: ErrorCategory, fx: &mut Vec<Effect>) {
        self.last_error = Some(category);

        match self.round {
            Round::Auto => match self.scheduler.on_failure() {
                RetryDecision::RetryAfter(delay) => {
                    let generation = self.next_generation();
                    self.retry_timer = Some(generation);
                    debug!(controller = %self.name, ?delay, %category, "Delayed retry armed");
                    fx.push(Effect::ArmRetry { generation, delay });
                }
                RetryDecision::Exhausted | RetryDecision::Bypassed => {
                    self.enter_needs_gesture(fx)
                }
            },
            Round::Gesture { fallback_used } => {
                self.scheduler.record_failure();
                if !fallback_used && mode.is_audible() && !self.scheduler.is_exhausted() {
                    debug!(controller = %self.name, %category, "Audible attempt failed, muted fallback");
                    self.round = Round::Gesture {
                        fallback_used: true,
                    };
                    self.issue(AttemptMode::Muted, fx);
                } else {
                    self.enter_needs_gesture(fx);
                }
            }
        }
    }

    fn on_retry_timer(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        if self.retry_timer != Some(generation) {
            return;
        }
        self.retry_timer = None;
        if self.phase == Phase::Attempting && self.pending.is_none() {
            self.issue(AttemptMode::Muted, fx);
        }
    }

    fn on_readiness(&mut self, level: ReadyLevel, fx: &mut Vec<Effect>) {
        self.ready_level = level;
        if self.phase != Phase::Attempting || self.pending.is_some() {
            return;
        }

        if let Some(wait) = self.readiness_wait {
            if level >= ReadyLevel::CanPlayThrough {
                self.readiness_wait = None;
                fx.push(Effect::CancelReadinessTimeout);
                self.issue(wait.mode, fx);
            }
        } else if self.retry_timer.is_some() && level.can_play() {
            // c'est la même relance, avancée
            self.retry_timer = None;
            fx.push(Effect::CancelRetry);
            self.issue(AttemptMode::Muted, fx);
        }
    }

    fn on_readiness_timeout(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        match self.readiness_wait {
            Some(wait) if wait.generation == generation && self.phase == Phase::Attempting => {
                self.readiness_wait = None;
                self.scheduler.record_failure();
                self.last_error = Some(classify(&LowLevelFailure::ReadinessTimeout));
                self.enter_needs_gesture(fx);
            }
            _ => {}
        }
    }

    fn on_unmute_timer(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        if self.unmute_timer != Some(generation) {
            return;
        }
        self.unmute_timer = None;
        if self.phase == Phase::Playing {
            self.muted_start = false;
            fx.push(Effect::Unmute);
        }
    }

    fn on_play_requested(&mut self, fx: &mut Vec<Effect>) {
        match self.phase {
            // pas de relance automatique sur TV : même chemin qu'un geste,
            // avec attente du chargement complet
            Phase::Paused if self.capability.is_restricted_platform => {
                let mode = if self.has_user_interacted {
                    AttemptMode::UserGesture
                } else {
                    AttemptMode::Muted
                };
                self.begin_gesture_round(mode, fx);
            }
            Phase::Paused => self.begin_auto_round(fx),
            Phase::NeedsGesture => {
                debug!(controller = %self.name, "start() needs a user interaction, ignored")
            }
            _ => {}
        }
    }

    fn on_pause_requested(&mut self, fx: &mut Vec<Effect>) {
        match self.phase {
            Phase::Playing | Phase::Attempting => {
                self.pending = None;
                self.cancel_timers(fx);
                self.phase = Phase::Paused;
                fx.push(Effect::Pause);
            }
            _ => {}
        }
    }

    fn on_interaction(&mut self, mode: AttemptMode, explicit_retry: bool, fx: &mut Vec<Effect>) {
        self.has_user_interacted = true;

        match self.phase {
            Phase::NeedsGesture => self.begin_gesture_round(mode, fx),
            Phase::Paused if explicit_retry => self.begin_gesture_round(mode, fx),
            // la relance différée est remplacée par la tentative audible
            Phase::Attempting if self.pending.is_none() && self.readiness_wait.is_none() => {
                self.cancel_timers(fx);
                self.begin_gesture_round(mode, fx);
            }
            Phase::Playing if self.muted_start && self.unmute_timer.is_none() => {
                self.arm_unmute(fx);
            }
            _ => {}
        }
    }

    fn on_media_error(&mut self, code: u16, fx: &mut Vec<Effect>) {
        let category = classify(&LowLevelFailure::MediaError(code));
        match self.phase {
            Phase::Attempting | Phase::Playing => {
                self.scheduler.record_failure();
                self.last_error = Some(category);
                self.enter_needs_gesture(fx);
            }
            _ => debug!(controller = %self.name, code, %category, "Media error outside playback ignored"),
        }
    }

    fn on_media_playing(&mut self, fx: &mut Vec<Effect>) {
        match self.phase {
            // lecture lancée par les contrôles natifs de l'élément ; seul un
            // Gesture enregistre l'interaction
            Phase::NeedsGesture | Phase::Paused => {
                self.cancel_timers(fx);
                self.mark_playing(false);
            }
            Phase::Attempting if self.pending.is_none() => {
                self.cancel_timers(fx);
                self.mark_playing(false);
            }
            _ => {}
        }
    }

    fn on_media_stopped(&mut self, fx: &mut Vec<Effect>) {
        if self.phase == Phase::Playing {
            self.cancel_timers(fx);
            self.phase = Phase::Paused;
        }
    }

    fn begin_auto_round(&mut self, fx: &mut Vec<Effect>) {
        self.scheduler.begin_round();
        self.round = Round::Auto;
        self.phase = Phase::Attempting;
        self.issue(AttemptMode::Muted, fx);
    }

    fn begin_gesture_round(&mut self, mode: AttemptMode, fx: &mut Vec<Effect>) {
        self.scheduler.reset();
        self.last_error = None;
        self.round = Round::Gesture {
            fallback_used: false,
        };
        self.phase = Phase::Attempting;

        if self.capability.is_restricted_platform && self.ready_level < ReadyLevel::CanPlayThrough {
            let generation = self.next_generation();
            self.readiness_wait = Some(ReadinessWait { generation, mode });
            debug!(controller = %self.name, ready = ?self.ready_level, "Waiting for readiness before play");
            fx.push(Effect::ArmReadinessTimeout {
                generation,
                timeout: self.scheduler.policy().readiness_timeout,
            });
        } else {
            self.issue(mode, fx);
        }
    }

    fn issue(&mut self, mode: AttemptMode, fx: &mut Vec<Effect>) {
        self.next_attempt_id += 1;
        let id = self.next_attempt_id;
        self.pending = Some(PendingAttempt { id, mode });
        fx.push(Effect::Attempt {
            id,
            mode,
            has_user_interacted: self.has_user_interacted,
        });
    }

    fn enter_playing(&mut self, mode: AttemptMode, fx: &mut Vec<Effect>) {
        self.mark_playing(mode == AttemptMode::Muted);
        if wants_deferred_unmute(mode, self.has_user_interacted) {
            self.arm_unmute(fx);
        }
    }

    fn mark_playing(&mut self, muted_start: bool) {
        self.phase = Phase::Playing;
        self.pending = None;
        self.scheduler.reset();
        self.last_error = None;
        self.round = Round::Auto;
        self.muted_start = muted_start;
    }

    fn enter_needs_gesture(&mut self, fx: &mut Vec<Effect>) {
        self.pending = None;
        self.cancel_timers(fx);
        self.phase = Phase::NeedsGesture;
    }

    fn arm_unmute(&mut self, fx: &mut Vec<Effect>) {
        let generation = self.next_generation();
        self.unmute_timer = Some(generation);
        fx.push(Effect::ArmUnmute {
            generation,
            delay: self.scheduler.policy().unmute_delay,
        });
    }

    fn cancel_timers(&mut self, fx: &mut Vec<Effect>) {
        if self.retry_timer.take().is_some() {
            fx.push(Effect::CancelRetry);
        }
        if self.readiness_wait.take().is_some() {
            fx.push(Effect::CancelReadinessTimeout);
        }
        if self.unmute_timer.take().is_some() {
            fx.push(Effect::CancelUnmute);
        }
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mounted(machine: &mut PlaybackMachine, capability: CapabilityProfile) -> Vec<Effect> {
        machine.handle(Event::Mounted {
            capability,
            ready_level: ReadyLevel::Metadata,
        })
    }

    fn attempt_of(fx: &[Effect]) -> Option<(u64, AttemptMode)> {
        fx.iter().find_map(|e| match e {
            Effect::Attempt { id, mode, .. } => Some((*id, *mode)),
            _ => None,
        })
    }

    fn retry_timer_of(fx: &[Effect]) -> Option<u64> {
        fx.iter().find_map(|e| match e {
            Effect::ArmRetry { generation, .. } => Some(*generation),
            _ => None,
        })
    }

    fn blocked() -> AttemptResult {
        AttemptResult::failed(ErrorCategory::AutoplayBlocked)
    }

    fn machine() -> PlaybackMachine {
        PlaybackMachine::new("test", RetryPolicy::default())
    }

    /// Amène la machine en NeedsGesture après deux refus.
    fn exhausted_machine() -> PlaybackMachine {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        let generation = retry_timer_of(&fx).unwrap();
        let fx = m.handle(Event::RetryTimerFired { generation });
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled { id, result: blocked() });
        assert_eq!(m.phase(), Phase::NeedsGesture);
        m
    }

    #[test]
    fn test_restricted_platform_never_attempts() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::restricted());

        assert_eq!(m.phase(), Phase::NeedsGesture);
        assert_eq!(m.last_error(), Some(ErrorCategory::PlatformRestricted));
        assert_eq!(fx, vec![Effect::SetPreload(PreloadHint::MetadataOnly)]);

        // la disponibilité du média ne déclenche rien
        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlayThrough,
        });
        assert!(attempt_of(&fx).is_none());
        let fx = m.handle(Event::PlayRequested);
        assert!(attempt_of(&fx).is_none());
    }

    #[test]
    fn test_first_muted_attempt_succeeds() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        assert_eq!(fx[0], Effect::SetPreload(PreloadHint::Auto));
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::Muted);
        assert_eq!(m.phase(), Phase::Attempting);

        let fx = m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        assert_eq!(m.phase(), Phase::Playing);
        assert_eq!(m.status().retry_count, 0);
        // pas d'interaction : pas de démute différé
        assert!(fx.is_empty());
    }

    #[test]
    fn test_two_refusals_need_a_gesture() {
        let m = exhausted_machine();
        let status = m.status();
        assert_eq!(status.last_error, Some(ErrorCategory::AutoplayBlocked));
        assert_eq!(status.retry_count, 2);
        assert!(!m.has_pending_attempt());
    }

    #[test]
    fn test_retry_issues_an_unmuted_attempt_first() {
        let mut m = exhausted_machine();
        let fx = m.handle(Event::RetryRequested);
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::Unmuted);
        assert!(matches!(
            fx[0],
            Effect::Attempt {
                has_user_interacted: true,
                ..
            }
        ));
        assert_eq!(m.status().retry_count, 0);
        assert_eq!(m.last_error(), None);

        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        let status = m.status();
        assert_eq!(status.phase, Phase::Playing);
        assert!(status.has_user_interacted);
    }

    #[test]
    fn test_decode_error_while_playing() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });

        m.handle(Event::MediaError { code: 3 });
        assert_eq!(m.phase(), Phase::NeedsGesture);
        assert_eq!(m.last_error(), Some(ErrorCategory::DecodeFailure));
        assert_eq!(m.status().retry_count, 1);
    }

    #[test]
    fn test_gesture_falls_back_to_muted_once() {
        let mut m = exhausted_machine();
        let fx = m.handle(Event::Gesture);
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::UserGesture);

        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::Muted);
        assert_eq!(m.phase(), Phase::Attempting);

        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        assert!(attempt_of(&fx).is_none());
        assert_eq!(m.phase(), Phase::NeedsGesture);
        assert_eq!(m.status().retry_count, 2);
    }

    #[test]
    fn test_muted_fallback_success_schedules_unmute() {
        let mut m = exhausted_machine();
        let fx = m.handle(Event::Gesture);
        let (id, _) = attempt_of(&fx).unwrap();
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        let (id, _) = attempt_of(&fx).unwrap();

        let fx = m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        assert_eq!(m.phase(), Phase::Playing);
        let generation = match fx.as_slice() {
            [Effect::ArmUnmute { generation, delay }] => {
                assert_eq!(*delay, Duration::from_millis(500));
                *generation
            }
            other => panic!("unexpected effects {:?}", other),
        };

        let fx = m.handle(Event::UnmuteTimerFired { generation });
        assert_eq!(fx, vec![Effect::Unmute]);
    }

    #[test]
    fn test_readiness_fires_the_armed_retry_early() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        let generation = retry_timer_of(&fx).unwrap();

        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlay,
        });
        assert_eq!(fx[0], Effect::CancelRetry);
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::Muted);

        // le minuteur annulé qui se déclencherait quand même est ignoré
        assert!(m.handle(Event::RetryTimerFired { generation }).is_empty());

        // c'était la relance : un nouvel échec épuise le budget
        m.handle(Event::AttemptSettled { id, result: blocked() });
        assert_eq!(m.phase(), Phase::NeedsGesture);
    }

    #[test]
    fn test_at_most_one_pending_attempt() {
        let mut m = machine();
        mounted(&mut m, CapabilityProfile::unrestricted());
        assert!(m.has_pending_attempt());

        for event in [
            Event::ReadinessChanged {
                level: ReadyLevel::CanPlayThrough,
            },
            Event::PlayRequested,
            Event::Gesture,
            Event::RetryRequested,
        ] {
            let fx = m.handle(event);
            assert!(attempt_of(&fx).is_none());
        }
    }

    #[test]
    fn test_readiness_while_playing_is_suppressed() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlayThrough,
        });
        assert!(fx.is_empty());
    }

    #[test]
    fn test_stale_attempt_result_is_ignored() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();

        let fx = m.handle(Event::AttemptSettled {
            id: id + 10,
            result: AttemptResult::success(),
        });
        assert!(fx.is_empty());
        assert_eq!(m.phase(), Phase::Attempting);
    }

    #[test]
    fn test_restricted_gesture_waits_for_readiness() {
        let mut m = machine();
        mounted(&mut m, CapabilityProfile::restricted());

        let fx = m.handle(Event::Gesture);
        assert!(attempt_of(&fx).is_none());
        assert!(matches!(
            fx.as_slice(),
            [Effect::ArmReadinessTimeout { timeout, .. }] if *timeout == Duration::from_secs(10)
        ));
        assert_eq!(m.phase(), Phase::Attempting);

        // CanPlay ne suffit pas
        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlay,
        });
        assert!(fx.is_empty());

        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlayThrough,
        });
        assert_eq!(fx[0], Effect::CancelReadinessTimeout);
        assert_eq!(attempt_of(&fx).map(|(_, mode)| mode), Some(AttemptMode::UserGesture));
    }

    #[test]
    fn test_restricted_gesture_readiness_timeout() {
        let mut m = machine();
        mounted(&mut m, CapabilityProfile::restricted());
        let fx = m.handle(Event::Gesture);
        let generation = match fx[0] {
            Effect::ArmReadinessTimeout { generation, .. } => generation,
            other => panic!("unexpected effect {:?}", other),
        };

        m.handle(Event::ReadinessTimedOut { generation });
        assert_eq!(m.phase(), Phase::NeedsGesture);
        assert_eq!(m.last_error(), Some(ErrorCategory::ReadinessTimeout));
    }

    #[test]
    fn test_restricted_gesture_with_ready_media_plays_at_once() {
        let mut m = machine();
        m.handle(Event::Mounted {
            capability: CapabilityProfile::restricted(),
            ready_level: ReadyLevel::CanPlayThrough,
        });
        let fx = m.handle(Event::Gesture);
        assert_eq!(attempt_of(&fx).map(|(_, mode)| mode), Some(AttemptMode::UserGesture));
    }

    #[test]
    fn test_pause_and_resume() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });

        let fx = m.handle(Event::PauseRequested);
        assert_eq!(fx, vec![Effect::Pause]);
        assert_eq!(m.phase(), Phase::Paused);

        let fx = m.handle(Event::PlayRequested);
        assert_eq!(attempt_of(&fx).map(|(_, mode)| mode), Some(AttemptMode::Muted));
        assert_eq!(m.phase(), Phase::Attempting);
    }

    #[test]
    fn test_pause_during_attempt_discards_late_success() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();

        m.handle(Event::PauseRequested);
        assert_eq!(m.phase(), Phase::Paused);

        let fx = m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        assert_eq!(fx, vec![Effect::Pause]);
        assert_eq!(m.phase(), Phase::Paused);
    }

    #[test]
    fn test_ended_moves_to_paused() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        m.handle(Event::MediaEnded);
        assert_eq!(m.phase(), Phase::Paused);
    }

    #[test]
    fn test_native_controls_start_playback() {
        let mut m = machine();
        mounted(&mut m, CapabilityProfile::restricted());
        m.handle(Event::MediaPlaying);
        let status = m.status();
        assert_eq!(status.phase, Phase::Playing);
        assert_eq!(status.last_error, None);
        assert!(!status.has_user_interacted);
    }

    #[test]
    fn test_late_success_after_media_error_pauses_the_element() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();

        m.handle(Event::MediaError { code: 2 });
        assert_eq!(m.phase(), Phase::NeedsGesture);

        let fx = m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        assert_eq!(fx, vec![Effect::Pause]);
        assert_eq!(m.phase(), Phase::NeedsGesture);

        m.handle(Event::MediaPlaying);
        assert!(!m.status().has_user_interacted);
    }

    #[test]
    fn test_late_success_does_not_pause_a_newer_attempt() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (old, _) = attempt_of(&fx).unwrap();
        m.handle(Event::MediaError { code: 2 });
        let fx = m.handle(Event::Gesture);
        assert!(attempt_of(&fx).is_some());

        let fx = m.handle(Event::AttemptSettled {
            id: old,
            result: AttemptResult::success(),
        });
        assert!(fx.is_empty());
        assert!(m.has_pending_attempt());
    }

    #[test]
    fn test_restricted_resume_waits_for_readiness_without_retry() {
        let mut m = machine();
        m.handle(Event::Mounted {
            capability: CapabilityProfile::restricted(),
            ready_level: ReadyLevel::CanPlayThrough,
        });
        let fx = m.handle(Event::Gesture);
        let (id, _) = attempt_of(&fx).unwrap();
        m.handle(Event::AttemptSettled {
            id,
            result: AttemptResult::success(),
        });
        m.handle(Event::PauseRequested);
        m.handle(Event::ReadinessChanged {
            level: ReadyLevel::Metadata,
        });

        let fx = m.handle(Event::PlayRequested);
        assert!(attempt_of(&fx).is_none());
        assert!(matches!(fx.as_slice(), [Effect::ArmReadinessTimeout { .. }]));
        assert_eq!(m.phase(), Phase::Attempting);

        let fx = m.handle(Event::ReadinessChanged {
            level: ReadyLevel::CanPlayThrough,
        });
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::UserGesture);

        // un refus tombe sur le repli muet, jamais sur une relance différée
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        assert!(retry_timer_of(&fx).is_none());
        let (id, mode) = attempt_of(&fx).unwrap();
        assert_eq!(mode, AttemptMode::Muted);
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        assert!(retry_timer_of(&fx).is_none());
        assert_eq!(m.phase(), Phase::NeedsGesture);
    }

    #[test]
    fn test_unmount_discards_later_events() {
        let mut m = machine();
        let fx = mounted(&mut m, CapabilityProfile::unrestricted());
        let (id, _) = attempt_of(&fx).unwrap();
        let fx = m.handle(Event::AttemptSettled { id, result: blocked() });
        assert!(retry_timer_of(&fx).is_some());

        let fx = m.handle(Event::Unmount);
        assert_eq!(fx, vec![Effect::CancelRetry, Effect::Teardown]);
        assert!(m.is_unmounted());

        assert!(m.handle(Event::Gesture).is_empty());
        assert!(m.handle(Event::RetryTimerFired { generation: 1 }).is_empty());
    }

    #[test]
    fn test_interaction_is_monotonic() {
        let mut m = machine();
        mounted(&mut m, CapabilityProfile::unrestricted());
        m.handle(Event::Gesture);
        assert!(m.status().has_user_interacted);

        for event in [
            Event::PauseRequested,
            Event::PlayRequested,
            Event::MediaError { code: 2 },
            Event::MediaPaused,
            Event::ReadinessChanged {
                level: ReadyLevel::Empty,
            },
        ] {
            m.handle(event);
            assert!(m.status().has_user_interacted);
        }
    }

    #[test]
    fn test_retry_count_stays_bounded() {
        let mut m = exhausted_machine();
        for _ in 0..5 {
            let fx = m.handle(Event::RetryRequested);
            if let Some((id, _)) = attempt_of(&fx) {
                m.handle(Event::MediaError { code: 2 });
                m.handle(Event::AttemptSettled { id, result: blocked() });
            }
            let status = m.status();
            assert!(status.retry_count <= RetryPolicy::DEFAULT_MAX_FAILURES);
            if status.retry_count == RetryPolicy::DEFAULT_MAX_FAILURES {
                assert_eq!(status.phase, Phase::NeedsGesture);
            }
        }
    }

    #[test]
    fn test_transitions_are_deterministic() {
        let script = |m: &mut PlaybackMachine| {
            let mut all = mounted(m, CapabilityProfile::unrestricted());
            all.extend(m.handle(Event::AttemptSettled {
                id: 1,
                result: blocked(),
            }));
            all.extend(m.handle(Event::Gesture));
            all.extend(m.handle(Event::AttemptSettled {
                id: 2,
                result: AttemptResult::success(),
            }));
            all
        };

        let mut a = machine();
        let mut b = machine();
        assert_eq!(script(&mut a), script(&mut b));
        assert_eq!(a.status(), b.status());
    }
}
