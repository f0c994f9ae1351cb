//! Job submission and status handlers.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vedit_models::{
    AutoflipParams, EditKind, EditOperation, JobId, JobState, RemoveSegmentParams, TrimParams,
};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;
use crate::validation::{
    is_valid_job_id, parse_aspect_ratio, resolve_output_name, validate_input_url,
    validate_timestamps,
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrimRequest {
    pub input_url: String,
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub output_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveRequest {
    pub input_url: String,
    pub remove_start: String,
    pub remove_end: String,
    #[serde(default)]
    pub output_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AutoflipRequest {
    pub input_url: String,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub output_name: Option<String>,
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

/// Returned by every submission endpoint.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status_url: String,
}

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub id: String,
    /// queued, running, finished or failed
    pub status: JobState,
    /// Download URL once finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Failure detail once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /jobs/trim
pub async fn submit_trim(
    State(state): State<AppState>,
    Json(req): Json<TrimRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let kind = EditKind::Trim;
    let operation = reject_on_error(kind, || {
        validate_timestamps(&[&req.start, &req.end])?;
        Ok(EditOperation::Trim(TrimParams {
            input_url: validate_input_url(&req.input_url, state.config.allow_file_urls)?,
            start: req.start.clone(),
            end: req.end.clone(),
            output_name: resolve_output_name(req.output_name.as_deref(), kind)?,
        }))
    })?;

    submit(&state, operation).await
}

/// POST /jobs/remove
pub async fn submit_remove(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let kind = EditKind::RemoveSegment;
    let operation = reject_on_error(kind, || {
        validate_timestamps(&[&req.remove_start, &req.remove_end])?;
        Ok(EditOperation::RemoveSegment(RemoveSegmentParams {
            input_url: validate_input_url(&req.input_url, state.config.allow_file_urls)?,
            remove_start: req.remove_start.clone(),
            remove_end: req.remove_end.clone(),
            output_name: resolve_output_name(req.output_name.as_deref(), kind)?,
        }))
    })?;

    submit(&state, operation).await
}

/// POST /jobs/autoflip
pub async fn submit_autoflip(
    State(state): State<AppState>,
    Json(req): Json<AutoflipRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let kind = EditKind::Autoflip;
    let operation = reject_on_error(kind, || {
        Ok(EditOperation::Autoflip(AutoflipParams {
            input_url: validate_input_url(&req.input_url, state.config.allow_file_urls)?,
            aspect_ratio: parse_aspect_ratio(&req.aspect_ratio)?,
            debug: req.debug,
            output_name: resolve_output_name(req.output_name.as_deref(), kind)?,
        }))
    })?;

    submit(&state, operation).await
}

/// GET /jobs/:job_id
///
/// Returns:
/// - 200: current state, with `result_url` when finished and `error` when failed
/// - 404: Job not found
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::not_found("Job not found"));
    }

    let view = state.jobs.get_state(&JobId::from_string(job_id)).await?;

    let result_url = match view.status {
        JobState::Finished => view.result.as_deref().map(|name| state.config.result_url(name)),
        _ => None,
    };
    let error = match view.status {
        JobState::Failed => Some(view.error.unwrap_or_else(|| "Unknown error".to_string())),
        _ => None,
    };

    Ok(Json(JobStatusResponse {
        id: view.id.to_string(),
        status: view.status,
        result_url,
        error,
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn reject_on_error(
    kind: EditKind,
    build: impl FnOnce() -> ApiResult<EditOperation>,
) -> ApiResult<EditOperation> {
    build().inspect_err(|_| metrics::record_job_rejected(kind.as_str()))
}

async fn submit(state: &AppState, operation: EditOperation) -> ApiResult<Json<SubmitResponse>> {
    let kind = operation.kind();
    let output_name = operation.output_name().to_string();

    let job_id = state.jobs.submit(operation).await.inspect_err(|e| {
        if matches!(e, vedit_queue::QueueError::InvalidJob(_)) {
            metrics::record_job_rejected(kind.as_str());
        }
    })?;

    metrics::record_job_submitted(kind.as_str());
    info!("Accepted {} job {} -> {}", kind, job_id, output_name);

    Ok(Json(SubmitResponse {
        status_url: state.config.status_url(job_id.as_str()),
        job_id: job_id.to_string(),
    }))
}
