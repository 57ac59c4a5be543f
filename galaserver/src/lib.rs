//! # galaserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit le serveur HTTP de Gala : routes JSON, handlers avec
//! état, fichiers statiques du site, documentation OpenAPI et logs en temps réel.
//!
//! ## Architecture
//!
//! - [`server`] : Implémentation du serveur principal et du builder
//! - [`logs`] : Bootstrap `tracing`, buffer circulaire et routes SSE de logs
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use galaserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new_configured().build();
//!     server.init_logging(LoggingOptions::from_config()).await?;
//!
//!     server.add_route("/info", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};

/// Corps d'erreur JSON commun aux API REST
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
