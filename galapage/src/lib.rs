//! # galapage - Composition de la page de fête
//!
//! Relie le compte à rebours, la zone de déclenchement au défilement et les
//! contrôleurs de lecture de `galaplayback` pour chaque chargement de page.
//!
//! ## Architecture
//!
//! - [`countdown`] : compte à rebours idempotent avec hook de fin
//! - [`trigger`] : zone de déclenchement et signal de démarrage injecté
//! - [`session`] : sessions de page, éléments média distants, registre
//! - [`api`] : routes REST et flux SSE sous `/api/page`
//!
//! ## Déroulé d'une page
//!
//! 1. `POST /api/page/sessions` : détection de la plateforme depuis le `User-Agent`
//! 2. `GET .../events` : le navigateur s'abonne, la musique de fond est montée
//! 3. `POST .../trigger` : le compte à rebours démarre avec son audio
//! 4. à zéro : la vidéo de révélation est montée et l'événement `reveal` émis

pub mod api;
pub mod countdown;
pub mod errors;
mod server_ext;
pub mod session;
pub mod trigger;

pub use api::{PageApiDoc, SessionInfo, create_page_router};
pub use countdown::{Countdown, CountdownState};
pub use errors::{PageError, Result};
pub use server_ext::PageExt;
pub use session::{
    ELEMENTS, MediaAction, MediaStatus, PageEvent, PageSession, PageSettings, SessionRegistry,
};
pub use trigger::{StartSignal, TriggerZone};
