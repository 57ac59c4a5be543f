use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use galagallery::{Gallery, GalleryError, ImageListResponse, api::create_images_router};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

fn sample_gallery() -> (TempDir, Gallery) {
    let root = TempDir::new().unwrap();
    let hero = root.path().join("hero");
    fs::create_dir_all(&hero).unwrap();
    for name in ["b.png", "a.JPG", ".hidden.jpg", "notes.txt", "c.webp"] {
        fs::write(hero.join(name), b"x").unwrap();
    }
    let gallery = Gallery::new(root.path(), ["hero", "couple"]);
    (root, gallery)
}

#[tokio::test]
async fn test_list_filters_and_sorts() {
    let (_root, gallery) = sample_gallery();
    let images = gallery.list("hero").await.unwrap();
    assert_eq!(
        images,
        vec!["/images/hero/a.JPG", "/images/hero/b.png", "/images/hero/c.webp"]
    );
}

#[tokio::test]
async fn test_missing_folder_is_empty() {
    let (_root, gallery) = sample_gallery();
    assert!(gallery.list("couple").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_folder_is_rejected() {
    let (_root, gallery) = sample_gallery();
    let err = gallery.list("../etc").await.unwrap_err();
    assert!(matches!(err, GalleryError::InvalidFolder { .. }));
}

#[tokio::test]
async fn test_unreadable_folder_is_an_error() {
    let (root, gallery) = sample_gallery();
    // un fichier à la place du dossier
    fs::write(root.path().join("couple"), b"not a directory").unwrap();
    let err = gallery.list("couple").await.unwrap_err();
    assert!(matches!(err, GalleryError::Read { .. }));
}

async fn get(gallery: Gallery, uri: &str) -> (StatusCode, ImageListResponse) {
    let router = create_images_router(Arc::new(gallery));
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_endpoint_lists_images() {
    let (_root, gallery) = sample_gallery();
    let (status, body) = get(gallery, "/?folder=hero").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.message, None);
    assert_eq!(body.images.len(), 3);
}

#[tokio::test]
async fn test_endpoint_rejects_unknown_folder() {
    let (_root, gallery) = sample_gallery();
    let (status, body) = get(gallery, "/?folder=secret").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body.message.as_deref(),
        Some("Invalid folder. Must be one of: hero, couple")
    );
    assert!(body.images.is_empty());
}

#[tokio::test]
async fn test_endpoint_without_folder_is_rejected() {
    let (_root, gallery) = sample_gallery();
    let (status, _) = get(gallery, "/").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_endpoint_read_error() {
    let (root, gallery) = sample_gallery();
    fs::write(root.path().join("couple"), b"not a directory").unwrap();
    let (status, body) = get(gallery, "/?folder=couple").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body.message.as_deref(), Some("Error reading images"));
    assert!(body.images.is_empty());
}
