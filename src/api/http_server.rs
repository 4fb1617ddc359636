// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP server wiring
//!
//! One router over shared immutable resources. Every capability is built
//! once at process start and passed by reference into the per-request
//! pipelines; requests never share mutable state.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};

use crate::api::annotations::annotations_handler;
use crate::api::survey::survey_handler;
use crate::config::NodeConfig;
use crate::embeddings::CropEmbedder;
use crate::pipeline::fetch::ImageSource;
use crate::report::ReportBuilder;
use crate::version;
use crate::vision::vlm_client::VlmClient;

/// Shared immutable resources behind the router
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<NodeConfig>,
    /// VLM sidecar, absent when the node runs without descriptions
    pub describer: Option<Arc<VlmClient>>,
    pub embedder: Arc<dyn CropEmbedder>,
    pub image_source: Arc<dyn ImageSource>,
    pub report_builder: Arc<ReportBuilder>,
    /// Name of the embedder implementation, reported by /health
    pub embedder_name: String,
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/survey", post(survey_handler))
        .route("/v1/annotations", post(annotations_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until the process is stopped
pub async fn start_server(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
    let port = state.config.api_port;
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("API server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let vlm_healthy = match &state.describer {
        Some(client) => client.health_check().await,
        None => false,
    };

    axum::response::Json(json!({
        "status": "ok",
        "version": version::VERSION,
        "features": version::FEATURES,
        "vlm_configured": state.describer.is_some(),
        "vlm_healthy": vlm_healthy,
        "embedder": state.embedder_name,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::DigestEmbedder;
    use crate::pipeline::fetch::HttpImageSource;

    pub(crate) fn test_state(output_dir: &std::path::Path) -> AppState {
        let mut config = NodeConfig::from_env();
        config.output_dir = output_dir.to_path_buf();
        AppState {
            config: Arc::new(config),
            describer: None,
            embedder: Arc::new(DigestEmbedder::new(128, true).unwrap()),
            image_source: Arc::new(HttpImageSource::new(5).unwrap()),
            report_builder: Arc::new(ReportBuilder::new(output_dir)),
            embedder_name: "digest".to_string(),
        }
    }

    #[test]
    fn test_router_builds() {
        let tmp = tempfile::tempdir().unwrap();
        let _router = build_router(test_state(tmp.path()));
    }
}
