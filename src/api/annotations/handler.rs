// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Annotation ingress handler

use axum::{extract::State, Json};
use tracing::info;

use super::request::{parse_annotation_request, IngressPayload};
use super::response::AnnotationResponse;
use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::pipeline::annotations::{run_annotations, PipelineError};

/// POST /v1/annotations - Cluster annotated objects from a drone survey
///
/// Accepts the annotator's wrapper payload, fetches the original image and
/// every mask, extracts and embeds the crops, clusters them and writes the
/// report. The reply carries the full run summary; per-item failures are
/// inside it rather than turned into transport errors.
pub async fn annotations_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngressPayload>,
) -> Result<Json<AnnotationResponse>, ApiError> {
    let request = parse_annotation_request(&payload)?;
    info!(
        original = request.original_url,
        annotations = request.annotation_urls.len(),
        "annotation payload accepted"
    );

    let output = run_annotations(
        &request,
        state.image_source.as_ref(),
        state.embedder.as_ref(),
        state.describer.as_deref(),
        &state.report_builder,
        &state.config.pipeline,
    )
    .await
    .map_err(|e| match e {
        PipelineError::Original(fetch) => {
            ApiError::InvalidRequest(format!("original image unusable: {fetch}"))
        }
    })?;

    Ok(Json(AnnotationResponse {
        status: "success".to_string(),
        summary: output.summary,
    }))
}
