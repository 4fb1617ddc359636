// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cluster report assembly
//!
//! Composes the survey report for a crop-clustering run: one thumbnail grid
//! sheet per cluster, an optional narrative analysis requested from the VLM
//! over sample crops, and a `report.json` inventory. Everything lands in a
//! timestamped directory; page layout beyond that (PDF assembly) is left to
//! downstream consumers of the directory.

use crate::pipeline::summary::{ClusterMembers, DescriptionOutcome};
use crate::vision::crop::Crop;
use crate::vision::image_utils::rgba_to_data_url;
use crate::vision::vlm_client::VlmClient;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{imageops, Rgb, RgbImage};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

/// Thumbnail cell side length on a sheet
const CELL_SIZE: u32 = 128;

/// Grid columns per sheet
const SHEET_COLUMNS: u32 = 3;

/// Crops shown per cluster sheet
const SHEET_SAMPLES: usize = 6;

/// Sample crops per cluster sent with the narrative request
const NARRATIVE_SAMPLES: usize = 3;

/// Where a finished report lives and what it contains
#[derive(Debug, Clone)]
pub struct ClusterReport {
    /// Report directory (`clustering_report_<timestamp>`)
    pub path: PathBuf,
    /// Narrative outcome, present when a describer was configured
    pub narrative: Option<DescriptionOutcome>,
    /// One sheet path per cluster, ascending cluster id
    pub sheets: Vec<PathBuf>,
}

/// Builds cluster reports under a fixed output directory
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    output_dir: PathBuf,
}

impl ReportBuilder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Assemble and persist the report for one run
    pub async fn build(
        &self,
        clusters: &BTreeMap<usize, Vec<Crop>>,
        original_url: &str,
        describer: Option<&VlmClient>,
        timestamp: DateTime<Local>,
    ) -> Result<ClusterReport> {
        let dir = self
            .output_dir
            .join(format!("clustering_report_{}", timestamp.format("%Y%m%d_%H%M%S")));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create report directory {}", dir.display()))?;

        // One thumbnail sheet per cluster
        let mut sheets = Vec::new();
        for (&cluster_id, crops) in clusters {
            let sheet = compose_sheet(crops);
            let sheet_path = dir.join(format!("cluster_{cluster_id}.png"));
            sheet
                .save(&sheet_path)
                .with_context(|| format!("failed to write {}", sheet_path.display()))?;
            sheets.push(sheet_path);
        }

        // Narrative over sample crops from every cluster
        let narrative = match describer {
            Some(client) => Some(self.request_narrative(client, clusters, original_url).await),
            None => None,
        };

        let object_count: usize = clusters.values().map(Vec::len).sum();
        let inventory: Vec<ClusterMembers> = clusters
            .iter()
            .map(|(&cluster_id, crops)| ClusterMembers {
                cluster_id,
                members: crops.iter().map(|c| c.index).collect(),
            })
            .collect();

        let document = serde_json::json!({
            "generated_at": timestamp.to_rfc3339(),
            "original_url": original_url,
            "cluster_count": clusters.len(),
            "object_count": object_count,
            "clusters": inventory,
            "narrative": &narrative,
        });
        let json_path = dir.join("report.json");
        fs::write(&json_path, serde_json::to_vec_pretty(&document)?)
            .with_context(|| format!("failed to write {}", json_path.display()))?;

        info!(path = %dir.display(), clusters = clusters.len(), "report written");

        Ok(ClusterReport {
            path: dir,
            narrative,
            sheets,
        })
    }

    async fn request_narrative(
        &self,
        client: &VlmClient,
        clusters: &BTreeMap<usize, Vec<Crop>>,
        original_url: &str,
    ) -> DescriptionOutcome {
        let object_count: usize = clusters.values().map(Vec::len).sum();
        let mut prompt = format!(
            "Analyze these clustered images from a drone survey.\n\n\
             Source image: {original_url}\n\
             Total clusters found: {}\n\
             Number of objects: {object_count}\n\n\
             For each cluster, up to {NARRATIVE_SAMPLES} sample images follow. Provide:\n\
             1. A description of what type of objects/species are in each cluster\n\
             2. Key characteristics that distinguish each cluster\n\
             3. Ecological or environmental insights about these findings\n\
             4. Recommendations based on the analysis\n\n\
             Format your response as a structured report with sections for each cluster.\n",
            clusters.len(),
        );

        let mut data_urls = Vec::new();
        for (&cluster_id, crops) in clusters {
            prompt.push_str(&format!(
                "\n--- Cluster {cluster_id} ({} objects) ---\n",
                crops.len()
            ));
            for crop in crops.iter().take(NARRATIVE_SAMPLES) {
                match rgba_to_data_url(&crop.image) {
                    Ok(url) => data_urls.push(url),
                    Err(e) => warn!(cluster_id, error = %e, "skipping sample crop"),
                }
            }
        }

        match client.describe_many(&data_urls, &prompt, 2000).await {
            Ok(result) => DescriptionOutcome::success(None, result.text, result.parsed),
            Err(e) => {
                warn!(error = %e, "narrative request failed");
                DescriptionOutcome::failure(None, e.to_string())
            }
        }
    }
}

/// Compose the thumbnail grid sheet for one cluster
///
/// Up to [`SHEET_SAMPLES`] crops, [`SHEET_COLUMNS`] per row, each fitted
/// into a fixed cell on a white background with aspect ratio preserved.
fn compose_sheet(crops: &[Crop]) -> RgbImage {
    let shown = crops.len().min(SHEET_SAMPLES) as u32;
    let rows = shown.div_ceil(SHEET_COLUMNS).max(1);
    let columns = shown.min(SHEET_COLUMNS).max(1);

    let mut sheet = RgbImage::from_pixel(
        columns * CELL_SIZE,
        rows * CELL_SIZE,
        Rgb([255, 255, 255]),
    );

    for (slot, crop) in crops.iter().take(SHEET_SAMPLES).enumerate() {
        let cell = fit_into_cell(crop, CELL_SIZE);
        let col = slot as u32 % SHEET_COLUMNS;
        let row = slot as u32 / SHEET_COLUMNS;
        let offset_x = col * CELL_SIZE + (CELL_SIZE - cell.width()) / 2;
        let offset_y = row * CELL_SIZE + (CELL_SIZE - cell.height()) / 2;
        imageops::overlay(&mut sheet, &cell, offset_x as i64, offset_y as i64);
    }

    sheet
}

/// Scale a crop to fit a square cell, preserving aspect ratio
///
/// Transparent pixels flatten onto the white sheet.
fn fit_into_cell(crop: &Crop, cell: u32) -> RgbImage {
    let (w, h) = (crop.width().max(1), crop.height().max(1));
    let scale = (cell as f32 / w as f32).min(cell as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, cell);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, cell);

    let resized = imageops::resize(&crop.image, new_w, new_h, imageops::FilterType::Triangle);
    let mut cell_img = RgbImage::from_pixel(new_w, new_h, Rgb([255, 255, 255]));
    for y in 0..new_h {
        for x in 0..new_w {
            let p = resized.get_pixel(x, y).0;
            let alpha = p[3] as u32;
            let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
            cell_img.put_pixel(x, y, Rgb([blend(p[0]), blend(p[1]), blend(p[2])]));
        }
    }
    cell_img
}
