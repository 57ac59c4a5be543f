//! Extension de `galaserver::Server` pour l'API de page

use crate::api::{PageApiDoc, create_page_router};
use crate::session::SessionRegistry;
use galaserver::Server;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

/// Trait d'extension pour ajouter les sessions de page à galaserver
#[async_trait::async_trait]
pub trait PageExt {
    /// Enregistre l'API de page
    ///
    /// # Routes enregistrées
    ///
    /// - `/api/page/sessions/...` - voir [`crate::api`]
    /// - `GET /swagger-ui/page` - Documentation interactive
    async fn init_page(&mut self, registry: SessionRegistry) -> Arc<SessionRegistry>;

    /// Même chose avec les sections `playback` et `page` de la configuration
    async fn init_page_configured(&mut self) -> Arc<SessionRegistry>;
}

#[async_trait::async_trait]
impl PageExt for Server {
    async fn init_page(&mut self, registry: SessionRegistry) -> Arc<SessionRegistry> {
        let registry = Arc::new(registry);
        self.add_openapi(
            create_page_router(registry.clone()),
            PageApiDoc::openapi(),
            "page",
        )
        .await;
        info!("🎉 Page API registered");
        registry
    }

    async fn init_page_configured(&mut self) -> Arc<SessionRegistry> {
        let config = galaconfig::get_config();
        self.init_page(SessionRegistry::from_config(&config)).await
    }
}
