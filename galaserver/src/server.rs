//! # Serveur HTTP de Gala
//!
//! [`Server`] enveloppe un `axum::Router` partagé. Les crates de Gala y
//! greffent leurs routes pendant la phase d'initialisation, puis
//! [`Server::start`] sert le tout :
//!
//! - 🚀 `add_route()` : endpoint JSON à partir d'une closure
//! - 🎯 `add_handler_with_state()` : handler Axum avec état (SSE, dumps...)
//! - 📚 `add_openapi()` : API sous `/api/{name}` + Swagger UI
//! - 📁 `add_static_dir()` : le site, servi depuis le disque
//! - ⚡ arrêt sur Ctrl+C

use crate::logs::{
    LogState, LoggingOptions, LogsApiDoc, create_logs_router, init_logging, log_dump, log_sse,
};
use anyhow::{Context, Result};
use axum::Router;
use axum::handler::Handler;
use axum::routing::{MethodRouter, get};
use galaconfig::get_config;
use serde::Serialize;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::{signal, sync::RwLock, task::JoinHandle};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Ce que le serveur annonce de lui-même
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerInfo {
    pub name: String,
    pub base_url: String,
    pub http_port: u16,
}

pub struct Server {
    info: ServerInfo,
    router: Arc<RwLock<Router>>,
    join_handle: Option<JoinHandle<()>>,
    log_state: Option<LogState>,
}

impl Server {
    /// `base_url` est l'hôte annoncé dans les logs (ex: "localhost")
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                base_url: base_url.into(),
                http_port,
            },
            router: Arc::new(RwLock::new(Router::new())),
            join_handle: None,
            log_state: None,
        }
    }

    pub fn new_configured() -> Self {
        ServerBuilder::new_configured().build()
    }

    async fn update_router(&self, f: impl FnOnce(Router) -> Router) {
        let mut router = self.router.write().await;
        *router = f(std::mem::take(&mut *router));
    }

    /// Monte `route` sous `path`, ou à la racine si `path == "/"`
    async fn mount(&mut self, path: &str, route: Router) {
        let path = path.to_string();
        self.update_router(move |router| {
            if path == "/" {
                router.merge(route)
            } else {
                router.nest(&path, route)
            }
        })
        .await;
    }

    async fn mount_method(&mut self, path: &str, method: MethodRouter) {
        self.mount(path, Router::new().route("/", method)).await;
    }

    /// Endpoint `GET` renvoyant en JSON le résultat de la closure
    ///
    /// ```rust,no_run
    /// # use galaserver::Server;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let mut server = Server::new("Test", "localhost", 3000);
    /// server.add_route("/info", || async {
    ///     serde_json::json!({"version": "1.0.0"})
    /// }).await;
    /// # }
    /// ```
    pub async fn add_route<F, Fut, T>(&mut self, path: &str, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move || {
            let f = f.clone();
            async move { axum::Json(f().await) }
        };
        self.mount_method(path, get(handler)).await;
    }

    /// Handler Axum avec état, en `GET`
    pub async fn add_handler_with_state<H, T, S>(&mut self, path: &str, handler: H, state: S)
    where
        H: Handler<T, S> + Clone + 'static,
        T: 'static,
        S: Clone + Send + Sync + 'static,
    {
        self.mount(path, Router::new().route("/", get(handler)).with_state(state))
            .await;
    }

    /// Sert un répertoire du disque
    ///
    /// Sous `/`, le répertoire devient le fallback du router : toutes les
    /// routes déjà enregistrées restent prioritaires.
    pub async fn add_static_dir(&mut self, path: &str, dir: impl AsRef<Path>) {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "⚠️ Static directory not found, serving it anyway");
        }
        let files = ServeDir::new(dir);
        let path = path.to_string();

        self.update_router(move |router| {
            if path == "/" {
                router.fallback_service(files)
            } else {
                router.nest_service(&path, files)
            }
        })
        .await;
    }

    /// API documentée : routes sous `/api/{name}`, spécification sous
    /// `/api-docs/{name}.json`, Swagger UI sous `/swagger-ui/{name}`
    pub async fn add_openapi(
        &mut self,
        api_router: Router,
        openapi: utoipa::openapi::OpenApi,
        name: &str,
    ) {
        // SwaggerUi veut des chemins 'static ; une API est enregistrée une
        // seule fois par processus
        let ui_path: &'static str = Box::leak(format!("/swagger-ui/{}", name).into_boxed_str());
        let spec_path: &'static str = Box::leak(format!("/api-docs/{}.json", name).into_boxed_str());
        let swagger = SwaggerUi::new(ui_path).url(spec_path, openapi);

        let api = Router::new().nest(&format!("/api/{}", name), api_router);
        self.update_router(move |router| router.merge(api).merge(swagger))
            .await;
    }

    /// Copie du router courant, pour les tests
    pub async fn router(&self) -> Router {
        self.router.read().await.clone()
    }

    /// Ouvre le port et sert les requêtes en tâche de fond jusqu'à Ctrl+C
    ///
    /// Un port déjà occupé est une erreur immédiate.
    pub async fn start(&mut self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.info.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Cannot listen on {}", addr))?;

        let app = self.router().await.layer(TraceLayer::new_for_http());
        info!(
            "Server {} running at http://{}:{}",
            self.info.name, self.info.base_url, self.info.http_port
        );

        self.join_handle = Some(tokio::spawn(async move {
            let serve = axum::serve(listener, app.into_make_service()).into_future();
            tokio::select! {
                result = serve => {
                    if let Err(e) = result {
                        error!("❌ HTTP server stopped: {}", e);
                    }
                }
                result = signal::ctrl_c() => match result {
                    Ok(()) => info!("Ctrl+C reçu, arrêt"),
                    Err(e) => error!("❌ Failed to listen for Ctrl+C: {}", e),
                },
            }
        }));

        Ok(())
    }

    /// Attend l'arrêt du serveur lancé par [`Server::start`]
    pub async fn wait(&mut self) {
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.await;
        }
    }

    pub fn info(&self) -> ServerInfo {
        self.info.clone()
    }

    /// État des logs, si `init_logging` a été appelé
    pub fn log_state(&self) -> Option<&LogState> {
        self.log_state.as_ref()
    }

    /// Installe le logging global et enregistre `/log-sse`, `/log-dump` et
    /// `/api/logs/log_setup`
    pub async fn init_logging(&mut self, options: LoggingOptions) -> Result<()> {
        let log_state = init_logging(options)?;
        self.attach_log_state(log_state).await;
        Ok(())
    }

    /// Enregistre les routes de logs sur un `LogState` existant
    pub async fn attach_log_state(&mut self, log_state: LogState) {
        self.add_handler_with_state("/log-sse", log_sse, log_state.clone())
            .await;
        self.add_handler_with_state("/log-dump", log_dump, log_state.clone())
            .await;
        self.add_openapi(
            create_logs_router(log_state.clone()),
            LogsApiDoc::openapi(),
            "logs",
        )
        .await;
        self.log_state = Some(log_state);
    }
}

pub struct ServerBuilder {
    info: ServerInfo,
}

impl ServerBuilder {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, http_port: u16) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                base_url: base_url.into(),
                http_port,
            },
        }
    }

    /// Hôte et port depuis la section `host` de la configuration
    pub fn new_configured() -> Self {
        let config = get_config();
        Self::new("Gala", config.get_base_url(), config.get_http_port())
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.info.name = name.into();
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.info.http_port = port;
        self
    }

    pub fn build(self) -> Server {
        let ServerInfo {
            name,
            base_url,
            http_port,
        } = self.info;
        Server::new(name, base_url, http_port)
    }
}
