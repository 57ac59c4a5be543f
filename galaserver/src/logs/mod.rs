//! Logs de Gala
//!
//! `init_logging` installe le subscriber global : un filtre de niveau
//! rechargeable, le [`SseLayer`] qui alimente un buffer circulaire, et la
//! sortie console en option. Le buffer est servi par `/log-dump`, le flux
//! temps réel par `/log-sse`, et `/api/logs/log_setup` change le niveau à
//! chaud.

mod sselayer;

pub use sselayer::SseLayer;

use crate::ErrorResponse;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::get,
};
use galaconfig::get_config;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, sync::Arc, time::SystemTime};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::Level;
use tracing_subscriber::{
    Registry, filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
const LIVE_CHANNEL_CAPACITY: usize = 1000;

type FilterHandle = reload::Handle<LevelFilter, Registry>;

/// Une ligne de log capturée
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: String,
    pub target: String,
    pub message: String,
}

/// Buffer circulaire partagé, diffusion temps réel et niveau courant
#[derive(Clone)]
pub struct LogState {
    entries: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    live: broadcast::Sender<LogEntry>,
    level: Arc<RwLock<Level>>,
    filter: FilterHandle,
}

impl LogState {
    pub fn new(capacity: usize, level: Level, filter: FilterHandle) -> Self {
        let capacity = capacity.max(1);
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            live,
            level: Arc::new(RwLock::new(level)),
            filter,
        }
    }

    /// Change le niveau et recharge le filtre du subscriber
    pub fn set_max_level(&self, level: Level) {
        *self.level.write() = level;
        if let Err(e) = self.filter.reload(LevelFilter::from_level(level)) {
            // le subscriber n'est peut-être pas (encore) installé
            eprintln!("❌ Failed to reload log level filter: {}", e);
        }
    }

    pub fn get_max_level(&self) -> Level {
        *self.level.read()
    }

    pub(crate) fn push(&self, entry: LogEntry) {
        {
            let mut entries = self.entries.write();
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }
        let _ = self.live.send(entry);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.live.subscribe()
    }

    pub fn dump(&self) -> Vec<LogEntry> {
        self.entries.read().iter().cloned().collect()
    }
}

/// Filtres de `/log-sse` : `?warn=true&error=true&search=retry`
///
/// Sans drapeau de niveau, tous les niveaux passent.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub error: Option<bool>,
    #[serde(default)]
    pub warn: Option<bool>,
    #[serde(default)]
    pub info: Option<bool>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub trace: Option<bool>,
    #[serde(default)]
    pub search: Option<String>,
}

impl LogQuery {
    fn selected_levels(&self) -> Vec<Level> {
        [self.error, self.warn, self.info, self.debug, self.trace]
            .into_iter()
            .zip(LEVELS)
            .filter_map(|(flag, level)| flag.unwrap_or(false).then_some(level))
            .collect()
    }

    fn accepts(&self, entry: &LogEntry) -> bool {
        let selected = self.selected_levels();
        let level_ok = selected.is_empty()
            || parse_level(&entry.level).is_some_and(|level| selected.contains(&level));

        let search_ok = match &self.search {
            Some(needle) => entry.message.contains(needle) || entry.target.contains(needle),
            None => true,
        };

        level_ok && search_ok
    }
}

/// `Level` ordonne TRACE > DEBUG > INFO > WARN > ERROR
fn within_level(entry: &LogEntry, max_level: Level) -> bool {
    parse_level(&entry.level).is_some_and(|level| level <= max_level)
}

fn sse_event(entry: &LogEntry) -> Option<Event> {
    serde_json::to_string(entry)
        .ok()
        .map(|json| Event::default().data(json))
}

/// `GET /log-sse` : l'historique du buffer puis les nouvelles entrées
pub async fn log_sse(
    State(state): State<LogState>,
    Query(query): Query<LogQuery>,
) -> impl IntoResponse {
    let mut live = state.subscribe();
    let history = state.dump();

    let stream = async_stream::stream! {
        let level = state.get_max_level();
        for entry in history.iter().filter(|e| within_level(e, level) && query.accepts(e)) {
            if let Some(event) = sse_event(entry) {
                yield Ok::<_, axum::Error>(event);
            }
        }

        loop {
            let entry = match live.recv().await {
                Ok(entry) => entry,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if !within_level(&entry, state.get_max_level()) || !query.accepts(&entry) {
                continue;
            }
            if let Some(event) = sse_event(&entry) {
                yield Ok::<_, axum::Error>(event);
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `GET /log-dump` : le buffer en JSON
pub async fn log_dump(State(state): State<LogState>) -> impl IntoResponse {
    Json(state.dump())
}

/// Options d'initialisation du logging
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Nombre d'entrées gardées dans le buffer circulaire
    pub buffer_capacity: usize,
    pub enable_console: bool,
    /// Niveau minimum au démarrage
    pub min_level: Level,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            enable_console: true,
            min_level: Level::INFO,
        }
    }
}

impl LoggingOptions {
    /// Section `host.logger` de la configuration
    pub fn from_config() -> Self {
        let config = get_config();
        let defaults = Self::default();

        Self {
            buffer_capacity: config
                .get_log_cache_size()
                .unwrap_or(defaults.buffer_capacity),
            enable_console: config
                .get_log_enable_console()
                .unwrap_or(defaults.enable_console),
            min_level: config
                .get_log_min_level()
                .ok()
                .and_then(|level| parse_level(&level))
                .unwrap_or(defaults.min_level),
        }
    }
}

/// Installe le subscriber global et renvoie l'état partagé des logs
///
/// Échoue si un subscriber global est déjà installé.
///
/// ```rust,no_run
/// use galaserver::logs::{init_logging, LoggingOptions};
///
/// let log_state = init_logging(LoggingOptions::default()).unwrap();
/// ```
pub fn init_logging(options: LoggingOptions) -> anyhow::Result<LogState> {
    let (filter, handle) = reload::Layer::new(LevelFilter::from_level(options.min_level));
    let state = LogState::new(options.buffer_capacity, options.min_level, handle);

    // le filtre s'applique aussi au SseLayer
    let registry = Registry::default()
        .with(filter)
        .with(SseLayer::new(state.clone()));

    let console = options.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(true)
    });
    registry.with(console).try_init()?;

    Ok(state)
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LogSetupRequest {
    pub level: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LogSetupResponse {
    pub current_level: String,
    pub available_levels: Vec<String>,
}

impl From<Level> for LogSetupResponse {
    fn from(level: Level) -> Self {
        Self {
            current_level: level.as_str().to_string(),
            available_levels: LEVELS.iter().map(|l| l.as_str().to_string()).collect(),
        }
    }
}

/// Niveau de log courant
#[utoipa::path(
    get,
    path = "/log_setup",
    responses(
        (status = 200, description = "Current log level", body = LogSetupResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_get(State(state): State<LogState>) -> Json<LogSetupResponse> {
    Json(state.get_max_level().into())
}

/// Change le niveau de log et l'enregistre dans la configuration
#[utoipa::path(
    post,
    path = "/log_setup",
    request_body = LogSetupRequest,
    responses(
        (status = 200, description = "Log level updated", body = LogSetupResponse),
        (status = 400, description = "Invalid log level", body = ErrorResponse)
    ),
    tag = "logs"
)]
pub async fn log_setup_post(
    State(state): State<LogState>,
    Json(payload): Json<LogSetupRequest>,
) -> Response {
    let Some(level) = parse_level(&payload.level) else {
        let error = ErrorResponse::new(format!(
            "Invalid log level '{}'. Must be one of: ERROR, WARN, INFO, DEBUG, TRACE",
            payload.level
        ));
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    };

    state.set_max_level(level);
    if let Err(e) = get_config().set_log_min_level(level.as_str().to_string()) {
        tracing::warn!("⚠️ Log level not saved to config: {}", e);
    }
    tracing::info!("Log level changed to {}", level);

    Json(LogSetupResponse::from(level)).into_response()
}

pub(crate) fn parse_level(s: &str) -> Option<Level> {
    s.trim().parse().ok()
}

/// Router de `/api/logs`
pub fn create_logs_router(state: LogState) -> Router {
    Router::new()
        .route("/log_setup", get(log_setup_get).post(log_setup_post))
        .with_state(state)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(log_setup_get, log_setup_post),
    components(schemas(LogSetupRequest, LogSetupResponse, ErrorResponse)),
    tags(
        (name = "logs", description = "Runtime log level")
    )
)]
pub struct LogsApiDoc;
