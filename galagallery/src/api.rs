//! Handler HTTP de listing des images

use crate::{Gallery, GalleryError};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi, ToSchema};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ImagesQuery {
    /// Dossier à lister (`hero`, `couple`)
    pub folder: Option<String>,
}

/// Réponse du listing, `message` présent uniquement en cas d'erreur
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageListResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub images: Vec<String>,
}

impl ImageListResponse {
    fn ok(images: Vec<String>) -> Self {
        Self {
            message: None,
            images,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            images: Vec::new(),
        }
    }
}

/// GET /api/images?folder=hero
#[utoipa::path(
    get,
    path = "/",
    params(ImagesQuery),
    responses(
        (status = 200, description = "Sorted image paths", body = ImageListResponse),
        (status = 400, description = "Folder not in the allow-list", body = ImageListResponse),
        (status = 500, description = "Folder cannot be read", body = ImageListResponse)
    ),
    tag = "images"
)]
pub async fn list_images(
    State(gallery): State<Arc<Gallery>>,
    Query(query): Query<ImagesQuery>,
) -> Response {
    let folder = query.folder.unwrap_or_default();
    match gallery.list(&folder).await {
        Ok(images) => Json(ImageListResponse::ok(images)).into_response(),
        Err(e @ GalleryError::InvalidFolder { .. }) => {
            (StatusCode::BAD_REQUEST, Json(ImageListResponse::error(e.to_string()))).into_response()
        }
        Err(GalleryError::Read { .. }) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ImageListResponse::error("Error reading images")),
        )
            .into_response(),
    }
}

/// Router à monter sous `/api/images`
pub fn create_images_router(gallery: Arc<Gallery>) -> Router {
    Router::new()
        .route("/", get(list_images))
        .with_state(gallery)
}

#[derive(OpenApi)]
#[openapi(
    paths(list_images),
    components(schemas(ImageListResponse)),
    tags(
        (name = "images", description = "Gallery image listing")
    )
)]
pub struct ImagesApiDoc;
