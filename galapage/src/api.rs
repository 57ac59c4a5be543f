//! API REST + SSE des sessions de page
//!
//! Monté sous `/api/page` par [`crate::PageExt`] :
//!
//! - `POST   /sessions` - ouvre une session (lit le `User-Agent`)
//! - `GET    /sessions/{id}` - résumé de la session
//! - `DELETE /sessions/{id}` - démonte tout
//! - `GET    /sessions/{id}/events` - flux SSE (commandes média + événements)
//! - `POST   /sessions/{id}/trigger` - zone de déclenchement atteinte
//! - `POST   /sessions/{id}/interact` - interaction du visiteur
//! - `GET    /sessions/{id}/media/{element}` - statut d'un élément
//! - `POST   /sessions/{id}/media/{element}/report` - rapport du navigateur
//! - `POST   /sessions/{id}/media/{element}/{action}` - `start`, `pause`, `retry`

use crate::countdown::CountdownState;
use crate::errors::PageError;
use crate::session::{
    ELEMENTS, MediaAction, MediaStatus, PageEvent, PageSession, SessionRegistry,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use galaplayback::{
    CapabilityProfile, ErrorCategory, MediaReport, PlaybackError, PlaybackStatus, RemoteCommand,
    restricted_platform_recommendations,
};
use galaserver::ErrorResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

type ApiResult<T> = std::result::Result<T, PageError>;

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let status = match &self {
            PageError::UnknownSession(_)
            | PageError::UnknownElement(_)
            | PageError::Playback(PlaybackError::UnknownElement(_)) => StatusCode::NOT_FOUND,
            PageError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            PageError::NotMounted(_) | PageError::Playback(PlaybackError::UnknownPlayRequest(_)) => {
                StatusCode::CONFLICT
            }
            PageError::Closed(_) | PageError::Playback(PlaybackError::Unmounted(_)) => {
                StatusCode::GONE
            }
        };
        debug!(%status, "Page API error: {}", self);
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ElementInfo {
    pub name: String,
    pub src: String,
    pub mounted: bool,
}

/// Résumé d'une session
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionInfo {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    pub capability: CapabilityProfile,
    pub countdown: CountdownState,
    pub has_interacted: bool,
    pub elements: Vec<ElementInfo>,
    /// Conseils affichés sur les plateformes restreintes
    pub recommendations: Vec<String>,
}

impl SessionInfo {
    fn of(session: &PageSession) -> Self {
        let settings = session.settings();
        let elements = ELEMENTS
            .iter()
            .map(|name| {
                let src = match *name {
                    crate::session::MUSIC => &settings.music_src,
                    crate::session::COUNTDOWN => &settings.countdown_audio_src,
                    _ => &settings.reveal_video_src,
                };
                ElementInfo {
                    name: name.to_string(),
                    src: src.clone(),
                    mounted: session
                        .media_status(name)
                        .map(|s| s.mounted)
                        .unwrap_or(false),
                }
            })
            .collect();

        let recommendations = if session.capability().is_restricted_platform {
            restricted_platform_recommendations()
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            Vec::new()
        };

        Self {
            id: session.id(),
            created_at: session.created_at(),
            capability: session.capability().clone(),
            countdown: session.countdown(),
            has_interacted: session.has_interacted(),
            elements,
            recommendations,
        }
    }
}

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TriggerQuery {
    /// Retour dans la zone en remontant
    pub back: Option<bool>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// Vrai si cet appel a démarré le compte à rebours
    pub started: bool,
    pub countdown: CountdownState,
}

#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session opened", body = SessionInfo)
    ),
    tag = "page"
)]
pub async fn create_session(
    State(registry): State<Arc<SessionRegistry>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let session = registry.create(user_agent);
    (StatusCode::CREATED, Json(SessionInfo::of(&session)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session summary", body = SessionInfo),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn get_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionInfo>> {
    let session = registry.get(id)?;
    Ok(Json(SessionInfo::of(&session)))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Session closed"),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn close_session(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    registry.close(id)?;
    Ok(StatusCode::NO_CONTENT)
}

enum Outgoing {
    Media(RemoteCommand),
    Page(PageEvent),
}

/// Libère la session quand le flux SSE est abandonné (onglet fermé)
struct StreamGuard {
    registry: Arc<SessionRegistry>,
    id: Uuid,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.registry.release(self.id);
    }
}

/// Flux SSE d'une session : événements `media` (commandes pour les
/// éléments) et événements de page (`status`, `countdown`, `reveal`...)
#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 200, description = "Server-sent event stream"),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn session_events(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let session = registry.get(id)?;
    let (mut commands, mut events) = session.attach()?;
    let snapshot = session.snapshot();
    let guard = StreamGuard {
        registry: registry.clone(),
        id,
    };

    let stream = async_stream::stream! {
        let _guard = guard;
        for event in snapshot {
            yield Event::default().event(event.name()).json_data(&event);
        }

        loop {
            let next = tokio::select! {
                command = commands.recv() => command.map(Outgoing::Media),
                event = events.recv() => event.map(Outgoing::Page),
            };

            match next {
                Ok(Outgoing::Media(command)) => {
                    yield Event::default().event("media").json_data(&command);
                }
                Ok(Outgoing::Page(event)) => {
                    let closed = event == PageEvent::Closed;
                    yield Event::default().event(event.name()).json_data(&event);
                    if closed {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(session = %id, skipped, "⚠️ Page event stream lagging");
                    continue;
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/trigger",
    params(
        ("id" = String, Path, description = "Session id"),
        TriggerQuery
    ),
    responses(
        (status = 200, description = "Trigger zone entered", body = TriggerResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn trigger(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TriggerQuery>,
) -> ApiResult<Json<TriggerResponse>> {
    let session = registry.get(id)?;
    let started = session.trigger(query.back.unwrap_or(false))?;
    Ok(Json(TriggerResponse {
        started,
        countdown: session.countdown(),
    }))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/interact",
    params(("id" = String, Path, description = "Session id")),
    responses(
        (status = 204, description = "Interaction recorded"),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn interact(
    State(registry): State<Arc<SessionRegistry>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    registry.get(id)?.interact()?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/media/{element}",
    params(
        ("id" = String, Path, description = "Session id"),
        ("element" = String, Path, description = "music, countdown or reveal")
    ),
    responses(
        (status = 200, description = "Element status", body = MediaStatus),
        (status = 404, description = "Unknown session or element", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn media_status(
    State(registry): State<Arc<SessionRegistry>>,
    Path((id, element)): Path<(Uuid, String)>,
) -> ApiResult<Json<MediaStatus>> {
    Ok(Json(registry.get(id)?.media_status(&element)?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/media/{element}/{action}",
    params(
        ("id" = String, Path, description = "Session id"),
        ("element" = String, Path, description = "music, countdown or reveal"),
        ("action" = String, Path, description = "start, pause or retry")
    ),
    responses(
        (status = 200, description = "Status right after the request", body = PlaybackStatus),
        (status = 400, description = "Unknown action", body = ErrorResponse),
        (status = 404, description = "Unknown session or element", body = ErrorResponse),
        (status = 409, description = "Element not mounted yet", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn media_action(
    State(registry): State<Arc<SessionRegistry>>,
    Path((id, element, action)): Path<(Uuid, String, String)>,
) -> ApiResult<Json<PlaybackStatus>> {
    let session = registry.get(id)?;
    let action: MediaAction = action.parse()?;
    Ok(Json(session.control(&element, action)?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/media/{element}/report",
    params(
        ("id" = String, Path, description = "Session id"),
        ("element" = String, Path, description = "music, countdown or reveal")
    ),
    request_body = MediaReport,
    responses(
        (status = 204, description = "Report applied"),
        (status = 404, description = "Unknown session or element", body = ErrorResponse),
        (status = 409, description = "Unknown or expired play request", body = ErrorResponse)
    ),
    tag = "page"
)]
pub async fn media_report(
    State(registry): State<Arc<SessionRegistry>>,
    Path((id, element)): Path<(Uuid, String)>,
    Json(report): Json<MediaReport>,
) -> ApiResult<StatusCode> {
    registry.get(id)?.report(&element, report)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Router à monter sous `/api/page`
pub fn create_page_router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session).delete(close_session))
        .route("/sessions/{id}/events", get(session_events))
        .route("/sessions/{id}/trigger", post(trigger))
        .route("/sessions/{id}/interact", post(interact))
        .route("/sessions/{id}/media/{element}", get(media_status))
        .route("/sessions/{id}/media/{element}/report", post(media_report))
        .route("/sessions/{id}/media/{element}/{action}", post(media_action))
        .with_state(registry)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_session,
        get_session,
        close_session,
        session_events,
        trigger,
        interact,
        media_status,
        media_action,
        media_report,
    ),
    components(schemas(
        SessionInfo,
        ElementInfo,
        TriggerResponse,
        MediaStatus,
        PageEvent,
        CountdownState,
        CapabilityProfile,
        PlaybackStatus,
        ErrorCategory,
        MediaReport,
        RemoteCommand,
        ErrorResponse,
    )),
    tags(
        (name = "page", description = "Page sessions and remote media bridge")
    )
)]
pub struct PageApiDoc;
