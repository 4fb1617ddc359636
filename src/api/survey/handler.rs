// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Survey endpoint handler

use axum::{extract::State, Json};
use tracing::info;

use super::request::SurveyRequest;
use super::response::SurveyResponse;
use crate::api::http_server::AppState;
use crate::api::ApiError;
use crate::pipeline::survey::run_survey;
use crate::vision::image_utils;

/// POST /v1/survey - Segment an image and cluster its foreground by color
///
/// Accepts a base64-encoded image, runs the whole-image pipeline, persists
/// the segmented/clustered rasters plus a results document under the
/// output directory, and returns the run summary.
pub async fn survey_handler(
    State(state): State<AppState>,
    Json(request): Json<SurveyRequest>,
) -> Result<Json<SurveyResponse>, ApiError> {
    request.validate()?;
    let strategy = request.parsed_strategy()?;

    // Undecodable input is fatal to the run before any pixel work
    let (image, info) = image_utils::decode_base64_image(&request.image)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
    info!(
        width = info.width,
        height = info.height,
        format = ?info.format,
        "survey request accepted"
    );

    let describer = if request.describe {
        state.describer.as_deref()
    } else {
        None
    };

    let output = run_survey(
        &image,
        strategy,
        request.bandwidth,
        &state.config.pipeline,
        describer,
    )
    .await;

    // Persistence is the handler's concern, not the pipeline's
    let run_dir = state.config.output_dir.join(&output.summary.run_id);
    std::fs::create_dir_all(&run_dir)
        .map_err(|e| ApiError::InternalError(format!("failed to create output dir: {e}")))?;

    let segmented_path = run_dir.join("segmented_result.png");
    output
        .segmented_image
        .save(&segmented_path)
        .map_err(|e| ApiError::InternalError(format!("failed to write segmented raster: {e}")))?;

    let clustered_path = match &output.clustered_image {
        Some(clustered) => {
            let path = run_dir.join("clustered_result.png");
            clustered.save(&path).map_err(|e| {
                ApiError::InternalError(format!("failed to write clustered raster: {e}"))
            })?;
            Some(path.display().to_string())
        }
        None => None,
    };

    let results_path = run_dir.join("results.json");
    let document = serde_json::to_vec_pretty(&output.summary)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    std::fs::write(&results_path, document)
        .map_err(|e| ApiError::InternalError(format!("failed to write results: {e}")))?;

    Ok(Json(SurveyResponse {
        summary: output.summary,
        segmented_path: segmented_path.display().to_string(),
        clustered_path,
        results_path: results_path.display().to_string(),
    }))
}
