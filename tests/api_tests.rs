// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP surface tests driven through the router

use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fabstir_canopy_node::api::{build_router, AppState};
use fabstir_canopy_node::pipeline::fetch::HttpImageSource;
use fabstir_canopy_node::{DigestEmbedder, NodeConfig, ReportBuilder};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

fn test_state(output_dir: &std::path::Path) -> AppState {
    let mut config = NodeConfig::from_env();
    config.output_dir = output_dir.to_path_buf();
    AppState {
        config: Arc::new(config),
        describer: None,
        embedder: Arc::new(DigestEmbedder::new(128, true).unwrap()),
        image_source: Arc::new(HttpImageSource::new(2).unwrap()),
        report_builder: Arc::new(ReportBuilder::new(output_dir)),
        embedder_name: "digest".to_string(),
    }
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 10 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// PNG-encode a small image with one bright blob and return it as base64
fn blob_image_base64() -> String {
    let mut img = RgbImage::from_pixel(60, 60, Rgb([20, 22, 18]));
    for y in 20..40 {
        for x in 20..40 {
            img.put_pixel(x, y, Rgb([220, 60, 40]));
        }
    }
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    STANDARD.encode(bytes)
}

#[tokio::test]
async fn test_health_endpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["vlm_configured"], false);
    assert_eq!(json["embedder"], "digest");
}

#[tokio::test]
async fn test_survey_endpoint_happy_path() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let response = app
        .oneshot(post_json(
            "/v1/survey",
            serde_json::json!({
                "image": blob_image_base64(),
                "bandwidth": 60.0,
                "describe": false
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;

    let steps = json["summary"]["pipeline_steps"].as_array().unwrap();
    assert!(steps.iter().any(|s| s == "segmentation"));
    assert!(steps.iter().any(|s| s == "mean_shift_clustering"));
    assert!(json["summary"]["segmentation"]["segmented_pixels"]
        .as_u64()
        .unwrap()
        > 0);

    // Persisted rasters exist where the response says they are
    let segmented = json["segmentedPath"].as_str().unwrap();
    assert!(std::path::Path::new(segmented).exists());
    let results = json["resultsPath"].as_str().unwrap();
    assert!(std::path::Path::new(results).exists());
}

#[tokio::test]
async fn test_survey_endpoint_rejects_bad_base64() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let response = app
        .oneshot(post_json(
            "/v1/survey",
            serde_json::json!({"image": "!!!not-base64!!!"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "invalid_request");
}

#[tokio::test]
async fn test_survey_endpoint_rejects_unknown_strategy() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let response = app
        .oneshot(post_json(
            "/v1/survey",
            serde_json::json!({"image": blob_image_base64(), "strategy": "sam"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "validation_error");
}

#[tokio::test]
async fn test_annotations_endpoint_rejects_malformed_payload() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    // Inner text that is code, not an annotation document
    let response = app
        .oneshot(post_json(
            "/v1/annotations",
            serde_json::json!({"content": [{"text": "exec('rm -rf /')"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "malformed_payload");
}

#[tokio::test]
async fn test_annotations_endpoint_rejects_missing_content() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let response = app
        .oneshot(post_json("/v1/annotations", serde_json::json!({"content": []})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_annotations_endpoint_unreachable_original_is_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let app = build_router(test_state(tmp.path()));

    let inner = serde_json::json!({
        "image": {"url": "http://127.0.0.1:59995/orig.png"},
        "annotations": [{"image": {"url": "http://127.0.0.1:59995/m.png"}}]
    });
    let response = app
        .oneshot(post_json(
            "/v1/annotations",
            serde_json::json!({"content": [{"text": inner.to_string()}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error_type"], "invalid_request");
}
