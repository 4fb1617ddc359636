// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod annotations;
pub mod errors;
pub mod http_server;
pub mod survey;

pub use annotations::{annotations_handler, AnnotationResponse, IngressPayload};
pub use errors::{ApiError, ErrorResponse};
pub use http_server::{build_router, start_server, AppState};
pub use survey::{survey_handler, SurveyRequest, SurveyResponse};
