//! Abstraction of one playable resource (an `<audio>` or `<video>` element).
//!
//! The controller never talks to a browser directly: it drives a
//! [`MediaHandle`], which can be a remote element reached over SSE
//! (see [`crate::remote::RemoteMedia`]) or a scripted double in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media element driven by a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Audio,
    Video,
}

/// How much of the resource is buffered, ordered from nothing to enough
/// data to play through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ReadyLevel {
    Empty,
    Metadata,
    CanPlay,
    CanPlayThrough,
}

impl ReadyLevel {
    /// Maps an HTML `readyState` value (0..=4).
    pub fn from_ready_state(state: u8) -> Self {
        match state {
            0 => ReadyLevel::Empty,
            1 => ReadyLevel::Metadata,
            2 | 3 => ReadyLevel::CanPlay,
            _ => ReadyLevel::CanPlayThrough,
        }
    }

    pub fn can_play(&self) -> bool {
        *self >= ReadyLevel::CanPlay
    }
}

/// Standard media error codes reported by a media element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MediaErrorCode {
    Aborted = 1,
    Network = 2,
    Decode = 3,
    SrcNotSupported = 4,
}

impl MediaErrorCode {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(MediaErrorCode::Aborted),
            2 => Some(MediaErrorCode::Network),
            3 => Some(MediaErrorCode::Decode),
            4 => Some(MediaErrorCode::SrcNotSupported),
            _ => None,
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

/// Preload hint applied to the element before any attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum PreloadHint {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "metadata")]
    MetadataOnly,
}

impl PreloadHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreloadHint::Auto => "auto",
            PreloadHint::MetadataOnly => "metadata",
        }
    }
}

/// Why a play request was refused by the element.
///
/// `error_code` carries the element's media error code when it reported one,
/// `error_name` the DOM exception name (`NotAllowedError`, `AbortError`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRejection {
    pub error_code: Option<u16>,
    pub error_name: Option<String>,
}

impl PlayRejection {
    /// A bare refusal, the usual shape of an autoplay block.
    pub fn refused() -> Self {
        Self::default()
    }

    pub fn with_code(code: u16) -> Self {
        Self {
            error_code: Some(code),
            error_name: None,
        }
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            error_code: None,
            error_name: Some(name.into()),
        }
    }

    /// Used when the request never got an answer.
    pub fn aborted() -> Self {
        Self::with_code(MediaErrorCode::Aborted.code())
    }
}

impl fmt::Display for PlayRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error_name, self.error_code) {
            (Some(name), Some(code)) => write!(f, "{} (media error {})", name, code),
            (Some(name), None) => write!(f, "{}", name),
            (None, Some(code)) => write!(f, "media error {}", code),
            (None, None) => write!(f, "play request refused"),
        }
    }
}

/// Notification coming from the element itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSignal {
    Ready(ReadyLevel),
    Error(u16),
    Playing,
    Paused,
    Ended,
}

/// One playable resource, owned by exactly one controller.
///
/// Setters are fire-and-forget; only [`MediaHandle::play`] reports back.
#[async_trait]
pub trait MediaHandle: Send + Sync {
    fn kind(&self) -> MediaKind;

    fn source(&self) -> String;

    fn set_muted(&self, muted: bool);

    fn is_muted(&self) -> bool;

    fn set_loop(&self, looping: bool);

    fn set_preload(&self, hint: PreloadHint);

    fn set_volume(&self, volume: f64);

    fn ready_level(&self) -> ReadyLevel;

    /// Current media error code, if the element is in an error state.
    fn error_code(&self) -> Option<u16>;

    /// Requests playback and resolves once the element accepted or refused it.
    async fn play(&self) -> Result<(), PlayRejection>;

    fn pause(&self);
}
