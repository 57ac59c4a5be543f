use galaconfig::get_config;
use galagallery::GalleryExt;
use galapage::PageExt;
use galaserver::{LoggingOptions, ServerBuilder};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();

    // ========== PHASE 1 : Serveur et logs ==========

    let mut server = ServerBuilder::new_configured().build();
    server.init_logging(LoggingOptions::from_config()).await?;
    info!("📁 Configuration loaded from {}", config.directory());

    server
        .add_route("/info", || async {
            serde_json::json!({
                "name": "Gala",
                "version": env!("CARGO_PKG_VERSION"),
            })
        })
        .await;

    // ========== PHASE 2 : APIs de la page ==========

    info!("🖼️ Registering gallery API...");
    let gallery = server.init_gallery_configured().await;
    for folder in gallery.folders() {
        info!("  - {}", gallery.root().join(folder).display());
    }

    info!("🎵 Registering page sessions API...");
    server.init_page_configured().await;

    // Le site statique en dernier : fallback des routes API
    let public_dir = config.resolve_path(&config.get_public_dir());
    info!("🌍 Serving {}", public_dir.display());
    server.add_static_dir("/", &public_dir).await;

    // ========== PHASE 3 : Démarrage du serveur ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    info!("✅ Gala is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}
