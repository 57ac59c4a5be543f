//! Maps low-level playback failures onto a small fixed taxonomy.

use crate::media::{MediaErrorCode, PlayRejection};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure categories surfaced to the page as `lastError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ErrorCategory {
    PlatformRestricted,
    AutoplayBlocked,
    NetworkFailure,
    DecodeFailure,
    FormatUnsupported,
    Aborted,
    ReadinessTimeout,
    Unknown,
}

impl ErrorCategory {
    /// Short text the UI can show next to its play button.
    pub fn explanation(&self) -> &'static str {
        match self {
            ErrorCategory::PlatformRestricted => {
                "This TV browser does not allow automatic playback. Press play to start."
            }
            ErrorCategory::AutoplayBlocked => {
                "Your browser blocked automatic playback. Tap or click to start."
            }
            ErrorCategory::NetworkFailure => "The media could not be downloaded. Check your connection.",
            ErrorCategory::DecodeFailure => "The media file could not be decoded.",
            ErrorCategory::FormatUnsupported => "This media format is not supported by your browser.",
            ErrorCategory::Aborted => "Loading of the media was interrupted.",
            ErrorCategory::ReadinessTimeout => "The media took too long to load.",
            ErrorCategory::Unknown => "Playback failed for an unknown reason.",
        }
    }

    pub fn is_network_related(&self) -> bool {
        matches!(
            self,
            ErrorCategory::NetworkFailure | ErrorCategory::ReadinessTimeout
        )
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Raw failure as observed on the media element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowLevelFailure {
    /// Error code reported by the element itself.
    MediaError(u16),
    /// A refused `play()` request.
    PlayRejected {
        media_error: Option<u16>,
        exception: Option<String>,
    },
    /// A DOM exception name thrown outside of `play()`.
    Exception(String),
    /// The element never became ready in time.
    ReadinessTimeout,
}

impl From<PlayRejection> for LowLevelFailure {
    fn from(rejection: PlayRejection) -> Self {
        LowLevelFailure::PlayRejected {
            media_error: rejection.error_code,
            exception: rejection.error_name,
        }
    }
}

/// Total classification: every input maps to exactly one category.
pub fn classify(failure: &LowLevelFailure) -> ErrorCategory {
    match failure {
        LowLevelFailure::MediaError(code) => classify_media_error(*code),
        LowLevelFailure::PlayRejected {
            media_error: Some(code),
            ..
        } => classify_media_error(*code),
        LowLevelFailure::PlayRejected {
            media_error: None,
            exception: Some(name),
        } => match classify_exception(name) {
            ErrorCategory::Unknown => ErrorCategory::AutoplayBlocked,
            category => category,
        },
        LowLevelFailure::PlayRejected {
            media_error: None,
            exception: None,
        } => ErrorCategory::AutoplayBlocked,
        LowLevelFailure::Exception(name) => classify_exception(name),
        LowLevelFailure::ReadinessTimeout => ErrorCategory::ReadinessTimeout,
    }
}

fn classify_media_error(code: u16) -> ErrorCategory {
    match MediaErrorCode::from_code(code) {
        Some(MediaErrorCode::Aborted) => ErrorCategory::Aborted,
        Some(MediaErrorCode::Network) => ErrorCategory::NetworkFailure,
        Some(MediaErrorCode::Decode) => ErrorCategory::DecodeFailure,
        Some(MediaErrorCode::SrcNotSupported) => ErrorCategory::FormatUnsupported,
        None => ErrorCategory::Unknown,
    }
}

fn classify_exception(name: &str) -> ErrorCategory {
    match name.trim() {
        "NotAllowedError" => ErrorCategory::AutoplayBlocked,
        "AbortError" => ErrorCategory::Aborted,
        "NotSupportedError" => ErrorCategory::FormatUnsupported,
        "NetworkError" => ErrorCategory::NetworkFailure,
        _ => ErrorCategory::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_error_codes() {
        assert_eq!(classify(&LowLevelFailure::MediaError(1)), ErrorCategory::Aborted);
        assert_eq!(classify(&LowLevelFailure::MediaError(2)), ErrorCategory::NetworkFailure);
        assert_eq!(classify(&LowLevelFailure::MediaError(3)), ErrorCategory::DecodeFailure);
        assert_eq!(
            classify(&LowLevelFailure::MediaError(4)),
            ErrorCategory::FormatUnsupported
        );
    }

    #[test]
    fn test_classification_is_total() {
        for code in [0u16, 5, 42, u16::MAX] {
            assert_eq!(classify(&LowLevelFailure::MediaError(code)), ErrorCategory::Unknown);
        }
        assert_eq!(
            classify(&LowLevelFailure::Exception("SecurityError".into())),
            ErrorCategory::Unknown
        );
        assert_eq!(
            classify(&LowLevelFailure::Exception(String::new())),
            ErrorCategory::Unknown
        );
    }

    #[test]
    fn test_rejected_play() {
        assert_eq!(
            classify(&PlayRejection::refused().into()),
            ErrorCategory::AutoplayBlocked
        );
        assert_eq!(
            classify(&PlayRejection::with_code(3).into()),
            ErrorCategory::DecodeFailure
        );
        assert_eq!(
            classify(&PlayRejection::with_name("NotSupportedError").into()),
            ErrorCategory::FormatUnsupported
        );
        // un nom inconnu sans code reste un refus de lecture
        assert_eq!(
            classify(&PlayRejection::with_name("WeirdError").into()),
            ErrorCategory::AutoplayBlocked
        );
    }

    #[test]
    fn test_exceptions() {
        assert_eq!(
            classify(&LowLevelFailure::Exception("NotAllowedError".into())),
            ErrorCategory::AutoplayBlocked
        );
        assert_eq!(
            classify(&LowLevelFailure::Exception("AbortError".into())),
            ErrorCategory::Aborted
        );
        assert_eq!(
            classify(&LowLevelFailure::Exception("NetworkError".into())),
            ErrorCategory::NetworkFailure
        );
    }

    #[test]
    fn test_readiness_timeout_is_network_related() {
        let category = classify(&LowLevelFailure::ReadinessTimeout);
        assert_eq!(category, ErrorCategory::ReadinessTimeout);
        assert!(category.is_network_related());
        assert!(!ErrorCategory::DecodeFailure.is_network_related());
    }

    #[test]
    fn test_every_category_has_an_explanation() {
        for category in [
            ErrorCategory::PlatformRestricted,
            ErrorCategory::AutoplayBlocked,
            ErrorCategory::NetworkFailure,
            ErrorCategory::DecodeFailure,
            ErrorCategory::FormatUnsupported,
            ErrorCategory::Aborted,
            ErrorCategory::ReadinessTimeout,
            ErrorCategory::Unknown,
        ] {
            assert!(!category.explanation().is_empty());
        }
    }
}
