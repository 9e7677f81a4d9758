//! HTTP handlers
//!
//! Handlers only parse the request and delegate. PDF work runs on the
//! blocking pool; results are staged and returned as download links, either
//! directly or through a job.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use pdfjoin_core::PdfCommand;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;
use crate::jobs::JobResponse;
use crate::staging::{download_name, FileLink};
use crate::state::AppState;
use crate::upload::Upload;

#[derive(Debug, Serialize)]
pub struct FilesResponse {
    pub files: Vec<FileLink>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStarted {
    pub job_id: Uuid,
}

/// Handler: GET /api/pdf/status
pub async fn status() -> Json<Value> {
    Json(json!({ "status": "API is running" }))
}

/// Handler: POST /api/pdf/merge
pub async fn merge(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FilesResponse>, ApiError> {
    let command = Upload::read(multipart)
        .await?
        .into_merge(state.min_merge_files)?;
    respond(state, command).await
}

/// Handler: POST /api/pdf/split
pub async fn split(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FilesResponse>, ApiError> {
    let command = Upload::read(multipart).await?.into_split()?;
    respond(state, command).await
}

/// Handler: POST /api/pdf/split-by-bookmarks
pub async fn split_by_bookmarks(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<FilesResponse>, ApiError> {
    let command = Upload::read(multipart).await?.into_split_by_bookmarks()?;
    respond(state, command).await
}

/// Handler: POST /api/pdf/merge/job
pub async fn merge_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobStarted>), ApiError> {
    let command = Upload::read(multipart)
        .await?
        .into_merge(state.min_merge_files)?;
    Ok(start_job(state, command))
}

/// Handler: POST /api/pdf/split/job
pub async fn split_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobStarted>), ApiError> {
    let command = Upload::read(multipart).await?.into_split()?;
    Ok(start_job(state, command))
}

/// Handler: POST /api/pdf/split-by-bookmarks/job
pub async fn split_by_bookmarks_job(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<JobStarted>), ApiError> {
    let command = Upload::read(multipart).await?.into_split_by_bookmarks()?;
    Ok(start_job(state, command))
}

/// Handler: GET /api/pdf/job/:id
pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, ApiError> {
    Uuid::parse_str(&id)
        .ok()
        .and_then(|id| state.jobs.get(&id))
        .map(|job| Json(JobResponse::from(job)))
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))
}

/// Handler: GET /api/pdf/download/:reference
pub async fn download(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Response, ApiError> {
    let bytes = state.staging.consume(&reference).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", download_name(&reference)),
            ),
        ],
        bytes,
    )
        .into_response())
}

async fn respond(state: AppState, command: PdfCommand) -> Result<Json<FilesResponse>, ApiError> {
    let files = process(state, command).await?;
    Ok(Json(FilesResponse { files }))
}

fn start_job(state: AppState, command: PdfCommand) -> (StatusCode, Json<JobStarted>) {
    let job_id = state.jobs.create(command.kind());
    let jobs = state.jobs.clone();

    tokio::spawn(async move {
        jobs.run(job_id, process(state, command)).await;
    });

    (StatusCode::ACCEPTED, Json(JobStarted { job_id }))
}

/// Execute a command off the async runtime and stage its outputs
async fn process(state: AppState, command: PdfCommand) -> Result<Vec<FileLink>, ApiError> {
    let kind = command.kind();
    let options = state.options;

    let result = tokio::task::spawn_blocking(move || command.execute(&options))
        .await
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("PDF worker failed")))??;

    info!(
        kind = %kind,
        files = result.files.len(),
        pages = result.metrics.page_count,
        input_bytes = result.metrics.input_size_bytes,
        output_bytes = result.metrics.output_size_bytes,
        elapsed_ms = result.metrics.processing_time_ms,
        "Processed PDF command"
    );

    Ok(state.staging.stage_batch(result.files).await?)
}
