use galaplayback::PlaybackError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    #[error("Unknown session {0}")]
    UnknownSession(Uuid),
    #[error("Unknown media element '{0}'")]
    UnknownElement(String),
    #[error("Media element '{0}' is not mounted yet")]
    NotMounted(String),
    #[error("Unknown media action '{0}'")]
    UnknownAction(String),
    #[error("Session {0} is closed")]
    Closed(Uuid),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

pub type Result<T> = std::result::Result<T, PageError>;
