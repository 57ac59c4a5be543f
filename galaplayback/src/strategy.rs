//! The three ways of asking an element to play.

use crate::classifier::{ErrorCategory, LowLevelFailure, classify};
use crate::media::MediaHandle;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AttemptMode {
    /// Muted playback, allowed by most autoplay policies.
    Muted,
    /// Audible playback, needs a recorded user interaction.
    Unmuted,
    /// Audible playback issued from within a user-input handler.
    UserGesture,
}

impl AttemptMode {
    pub fn is_audible(&self) -> bool {
        !matches!(self, AttemptMode::Muted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptResult {
    pub succeeded: bool,
    pub failure: Option<ErrorCategory>,
}

impl AttemptResult {
    pub fn success() -> Self {
        Self {
            succeeded: true,
            failure: None,
        }
    }

    pub fn failed(category: ErrorCategory) -> Self {
        Self {
            succeeded: false,
            failure: Some(category),
        }
    }

    /// Category of a failed attempt, `Unknown` if none was recorded.
    pub fn category(&self) -> Option<ErrorCategory> {
        if self.succeeded {
            None
        } else {
            Some(self.failure.unwrap_or(ErrorCategory::Unknown))
        }
    }
}

/// Issues one play request. Never fails: refusals come back as a failed
/// [`AttemptResult`].
pub async fn attempt(
    media: &dyn MediaHandle,
    mode: AttemptMode,
    has_user_interacted: bool,
) -> AttemptResult {
    if mode.is_audible() {
        if !has_user_interacted {
            debug!(?mode, "Audible attempt without user interaction, not issued");
            return AttemptResult::failed(ErrorCategory::AutoplayBlocked);
        }
        media.set_muted(false);
    } else {
        media.set_muted(true);
    }

    match media.play().await {
        // L'élément peut accepter play() tout en étant en erreur
        Ok(()) => match media.error_code() {
            Some(code) => {
                let category = classify(&LowLevelFailure::MediaError(code));
                debug!(?mode, code, %category, "Play accepted but element reports an error");
                AttemptResult::failed(category)
            }
            None => {
                debug!(?mode, "Play accepted");
                AttemptResult::success()
            }
        },
        Err(rejection) => {
            let category = classify(&rejection.clone().into());
            debug!(?mode, %rejection, %category, "Play rejected");
            AttemptResult::failed(category)
        }
    }
}

/// A muted success is followed by a deferred unmute only once the user
/// interacted with the page.
pub fn wants_deferred_unmute(mode: AttemptMode, has_user_interacted: bool) -> bool {
    mode == AttemptMode::Muted && has_user_interacted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, PlayRejection, PreloadHint, ReadyLevel};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeMedia {
        muted: Mutex<bool>,
        plays: Mutex<usize>,
        result: Mutex<Option<PlayRejection>>,
        error_code: Mutex<Option<u16>>,
    }

    #[async_trait]
    impl MediaHandle for FakeMedia {
        fn kind(&self) -> MediaKind {
            MediaKind::Video
        }
        fn source(&self) -> String {
            "/video/reveal.mp4".to_string()
        }
        fn set_muted(&self, muted: bool) {
            *self.muted.lock() = muted;
        }
        fn is_muted(&self) -> bool {
            *self.muted.lock()
        }
        fn set_loop(&self, _looping: bool) {}
        fn set_preload(&self, _hint: PreloadHint) {}
        fn set_volume(&self, _volume: f64) {}
        fn ready_level(&self) -> ReadyLevel {
            ReadyLevel::CanPlayThrough
        }
        fn error_code(&self) -> Option<u16> {
            *self.error_code.lock()
        }
        async fn play(&self) -> Result<(), PlayRejection> {
            *self.plays.lock() += 1;
            match self.result.lock().clone() {
                Some(rejection) => Err(rejection),
                None => Ok(()),
            }
        }
        fn pause(&self) {}
    }

    #[tokio::test]
    async fn test_muted_attempt_forces_mute() {
        let media = FakeMedia::default();
        let result = attempt(&media, AttemptMode::Muted, false).await;
        assert!(result.succeeded);
        assert!(media.is_muted());
        assert_eq!(*media.plays.lock(), 1);
    }

    #[tokio::test]
    async fn test_unmuted_without_interaction_fails_fast() {
        let media = FakeMedia::default();
        let result = attempt(&media, AttemptMode::Unmuted, false).await;
        assert_eq!(result.failure, Some(ErrorCategory::AutoplayBlocked));
        assert_eq!(*media.plays.lock(), 0);
    }

    #[tokio::test]
    async fn test_gesture_attempt_unmutes() {
        let media = FakeMedia::default();
        media.set_muted(true);
        let result = attempt(&media, AttemptMode::UserGesture, true).await;
        assert!(result.succeeded);
        assert!(!media.is_muted());
    }

    #[tokio::test]
    async fn test_rejection_is_classified() {
        let media = FakeMedia::default();
        *media.result.lock() = Some(PlayRejection::with_name("NotAllowedError"));
        let result = attempt(&media, AttemptMode::Muted, false).await;
        assert!(!result.succeeded);
        assert_eq!(result.category(), Some(ErrorCategory::AutoplayBlocked));
    }

    #[tokio::test]
    async fn test_success_with_error_code_is_a_failure() {
        let media = FakeMedia::default();
        *media.error_code.lock() = Some(4);
        let result = attempt(&media, AttemptMode::Muted, false).await;
        assert_eq!(result.failure, Some(ErrorCategory::FormatUnsupported));
    }

    #[test]
    fn test_deferred_unmute() {
        assert!(wants_deferred_unmute(AttemptMode::Muted, true));
        assert!(!wants_deferred_unmute(AttemptMode::Muted, false));
        assert!(!wants_deferred_unmute(AttemptMode::Unmuted, true));
    }
}
