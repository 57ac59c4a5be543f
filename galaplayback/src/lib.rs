//! # galaplayback - Adaptive media playback controller
//!
//! Starts an `<audio>` or `<video>` element automatically under browser
//! autoplay restrictions, degrading from muted autoplay to an explicit user
//! gesture, and exposes a stable "is it actually playing" status.
//!
//! ## Architecture
//!
//! - [`capability`] : restrictive embedded-TV browser detection
//! - [`strategy`] : the `Muted` / `Unmuted` / `UserGesture` play requests
//! - [`scheduler`] : bounded retry with a fixed delay
//! - [`classifier`] : low-level failures to [`ErrorCategory`]
//! - [`machine`] : the pure transition function
//! - [`controller`] : the tokio runtime driving a machine
//! - [`remote`] : a [`MediaHandle`] living in the visitor's browser
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use galaplayback::{
//!     CapabilityDetector, MediaKind, PlaybackController, RemoteMedia, RetryPolicy,
//! };
//! use std::{sync::Arc, time::Duration};
//! use tokio::sync::broadcast;
//!
//! # async fn example() -> galaplayback::Result<()> {
//! let (commands, _browser) = broadcast::channel(64);
//! let media = Arc::new(RemoteMedia::new(
//!     "music",
//!     MediaKind::Audio,
//!     "/music/background.mp3",
//!     commands,
//!     Duration::from_secs(15),
//! ));
//!
//! let profile = CapabilityDetector::default().detect(Some("Mozilla/5.0"));
//! let controller = PlaybackController::mount("music", media, profile, RetryPolicy::default());
//!
//! let status = controller.wait_for(|s| s.phase != galaplayback::Phase::Idle).await?;
//! println!("{:?}", status.phase);
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod classifier;
pub mod controller;
pub mod errors;
pub mod machine;
pub mod media;
pub mod remote;
pub mod scheduler;
pub mod strategy;

pub use capability::{
    CapabilityDetector, CapabilityProfile, is_codec_supported, restricted_platform_recommendations,
};
pub use classifier::{ErrorCategory, LowLevelFailure, classify};
pub use controller::PlaybackController;
pub use errors::{PlaybackError, Result};
pub use machine::{Effect, Event, Phase, PlaybackMachine, PlaybackStatus};
pub use media::{
    MediaErrorCode, MediaHandle, MediaKind, MediaSignal, PlayRejection, PreloadHint, ReadyLevel,
};
pub use remote::{MediaCommand, MediaReport, RemoteCommand, RemoteMedia};
pub use scheduler::{RetryDecision, RetryPolicy, RetryScheduler};
pub use strategy::{AttemptMode, AttemptResult};
