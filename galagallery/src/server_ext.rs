//! Extension de `galaserver::Server` pour la galerie
//!
//! `galagallery` ajoute ses routes au serveur sans que `galaserver` connaisse
//! la galerie.

use crate::Gallery;
use crate::api::{ImagesApiDoc, create_images_router};
use galaserver::Server;
use std::sync::Arc;
use tracing::info;
use utoipa::OpenApi;

/// Trait d'extension pour ajouter la galerie à galaserver
#[async_trait::async_trait]
pub trait GalleryExt {
    /// Enregistre l'API de listing
    ///
    /// # Routes enregistrées
    ///
    /// - `GET /api/images?folder={folder}` - Liste triée des images
    /// - `GET /swagger-ui/images` - Documentation interactive
    async fn init_gallery(&mut self, gallery: Gallery) -> Arc<Gallery>;

    /// Même chose avec la section `gallery` de la configuration globale
    async fn init_gallery_configured(&mut self) -> Arc<Gallery>;
}

#[async_trait::async_trait]
impl GalleryExt for Server {
    async fn init_gallery(&mut self, gallery: Gallery) -> Arc<Gallery> {
        info!(
            root = %gallery.root().display(),
            folders = ?gallery.folders(),
            "🖼️ Gallery API registered"
        );
        let gallery = Arc::new(gallery);
        self.add_openapi(
            create_images_router(gallery.clone()),
            ImagesApiDoc::openapi(),
            "images",
        )
        .await;
        gallery
    }

    async fn init_gallery_configured(&mut self) -> Arc<Gallery> {
        let config = galaconfig::get_config();
        self.init_gallery(Gallery::from_config(&config)).await
    }
}
