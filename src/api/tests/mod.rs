use super::*;
use crate::hub::test_helpers::{FakeOrigin, create_test_hub, png_bytes};
use crate::types::{CollectionName, SourceFormat};
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use std::time::Duration;
use tower::ServiceExt;

fn origin() -> FakeOrigin {
    FakeOrigin::default().with_collection(
        "Cats",
        &[
            ("a", SourceFormat::StaticImage, png_bytes(4)),
            ("b", SourceFormat::StaticImage, png_bytes(5)),
        ],
    )
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let (status, body) = get(create_router(hub), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "ok");
}

#[tokio::test]
async fn test_absent_collection_is_404() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let (status, body) = get(create_router(hub), "/collections/Cats").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json(&body)["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_invalid_name_is_400() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let (status, _) = get(create_router(hub), "/collections/bad.name").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_locked_collection_is_building() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let name = CollectionName::parse("Cats").unwrap();
    let _guard = hub.locks().try_lock(&name).unwrap();

    let (status, body) = get(create_router(hub.clone()), "/collections/Cats").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json(&body)["state"], "building");

    let (status, _) = get(create_router(hub), "/collections/Cats/manifest").await;
    assert_eq!(status, StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_published_collection_and_files() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let name = CollectionName::parse("Cats").unwrap();
    hub.request(&name, false).await.unwrap();

    let (status, body) = get(create_router(hub.clone()), "/collections/Cats").await;
    assert_eq!(status, StatusCode::OK);
    let view = json(&body);
    assert_eq!(view["state"], "ready");
    assert_eq!(view["converted"], 2);
    assert_eq!(view["parts"][0]["url"], "/files/Cats/parts/Cats_0.zip");

    let (status, body) = get(create_router(hub.clone()), "/collections/Cats/manifest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["items"].as_array().unwrap().len(), 2);

    let (status, body) = get(create_router(hub.clone()), "/files/Cats/parts/Cats_0.zip").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with(b"PK"));

    let (status, _) = get(create_router(hub), "/files/Cats/gif/a.gif").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cors_header_present() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let response = create_router(hub)
        .oneshot(
            Request::builder()
                .uri("/health")
                .header("Origin", "http://example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.headers().contains_key("access-control-allow-origin"));
}

#[tokio::test]
async fn test_server_stops_on_shutdown() {
    let (hub, _origin, _dir) = create_test_hub(origin()).await;
    let mut config = hub.config().clone();
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let hub = crate::StickerHub::new(config, std::sync::Arc::new(FakeOrigin::default()))
        .await
        .unwrap();

    let server = tokio::spawn(start_api_server(hub.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    hub.shutdown().await;

    let result = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}
