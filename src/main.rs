// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::Result;
use fabstir_canopy_node::{
    api::{start_server, AppState},
    embeddings::{CropEmbedder, DigestEmbedder, OnnxVisionEncoder},
    pipeline::fetch::HttpImageSource,
    report::ReportBuilder,
    vision::vlm_client::VlmClient,
    NodeConfig,
};
use std::{env, sync::Arc};
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info");
    }
    tracing_subscriber::fmt::init();

    println!("Starting Fabstir Canopy Node...");
    println!("BUILD VERSION: {}", fabstir_canopy_node::version::VERSION);
    println!();

    let config = NodeConfig::from_env();
    tracing::info!(?config, "configuration loaded");

    std::fs::create_dir_all(&config.output_dir)?;

    // VLM sidecar is optional: without it the node skips description stages
    let describer = match &config.vlm_endpoint {
        Some(endpoint) => {
            let client = VlmClient::new(endpoint, &config.vlm_model, config.describe_timeout_secs)?;
            if client.health_check().await {
                tracing::info!("VLM sidecar reachable");
            } else {
                tracing::warn!("VLM sidecar configured but not reachable yet");
            }
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("VLM_ENDPOINT not set; description stages disabled");
            None
        }
    };

    // Vision encoder is expensive to build, so it is constructed exactly
    // once here and shared; the digest embedder keeps a model-less node
    // functional in degraded mode
    let (embedder, embedder_name): (Arc<dyn CropEmbedder>, String) =
        match &config.encoder_model_path {
            Some(path) => match OnnxVisionEncoder::new("siglip-vision", path).await {
                Ok(encoder) => {
                    let name = encoder.model_name().to_string();
                    (Arc::new(encoder), name)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "vision encoder failed to load; using digest embedder");
                    (Arc::new(DigestEmbedder::new(768, true)?), "digest".to_string())
                }
            },
            None => {
                tracing::warn!("ENCODER_MODEL_PATH not set; using digest embedder");
                (Arc::new(DigestEmbedder::new(768, true)?), "digest".to_string())
            }
        };

    let state = AppState {
        image_source: Arc::new(HttpImageSource::new(config.fetch_timeout_secs)?),
        report_builder: Arc::new(ReportBuilder::new(config.output_dir.clone())),
        config: Arc::new(config),
        describer,
        embedder,
        embedder_name,
    };

    tokio::select! {
        result = start_server(state) => {
            if let Err(e) = result {
                tracing::error!("API server error: {}", e);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    println!("Fabstir Canopy Node stopped");
    Ok(())
}
