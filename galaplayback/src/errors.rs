use thiserror::Error;

/// Errors of the controller runtime and of the remote media bridge.
///
/// Playback failures are not errors: they surface as
/// [`crate::ErrorCategory`] values in the controller status.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Controller {0} is unmounted")]
    Unmounted(String),
    #[error("Unknown play request {0}")]
    UnknownPlayRequest(u64),
    #[error("Unknown media element '{0}'")]
    UnknownElement(String),
}

impl PlaybackError {
    pub fn unmounted(name: &str) -> Self {
        PlaybackError::Unmounted(name.to_string())
    }

    pub fn unknown_element(name: &str) -> Self {
        PlaybackError::UnknownElement(name.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlaybackError>;
