// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The two region-extraction pipelines
//!
//! `survey` drives whole-image segmentation and color clustering;
//! `annotations` drives mask-based crop extraction and embedding
//! clustering. Both produce ordered stage summaries with per-item error
//! capture.

pub mod annotations;
pub mod fetch;
pub mod summary;
pub mod survey;

pub use annotations::{run_annotations, AnnotationOutput, AnnotationRequest, PipelineError};
pub use fetch::{FetchError, HttpImageSource, ImageSource};
pub use summary::{
    AnnotationSummary, ClusterMembers, ClusteringSummary, DescriptionOutcome, ItemError,
    OutcomeStatus, SegmentationSummary, StageError, SurveySummary,
};
pub use survey::{run_survey, SurveyOutput};
