// src/handlers/jobs.rs
//! Job endpoints - submit, status, wait, cancel, QA reports, lesson videos

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::error_response;
use crate::jobs::ProgressUpdate;
use crate::models::{Job, JobId, JobSpec, JobStatus};
use crate::services::estimate_job_cost;
use crate::AppState;

const DEFAULT_WAIT_SECS: u64 = 30;
const MAX_WAIT_SECS: u64 = 3600;

#[derive(Serialize)]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
}

#[derive(Deserialize)]
pub struct WaitQuery {
    pub timeout_secs: Option<u64>,
}

/// POST /api/jobs - Validate a job spec and start it in the background
pub async fn submit_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(spec): Json<JobSpec>,
) -> Response {
    match state.job_manager.submit(spec).await {
        Ok(job_id) => {
            let response = SubmitResponse {
                job_id,
                status: JobStatus::Queued,
                message: "Job accepted".to_string(),
            };
            (StatusCode::ACCEPTED, Json(response)).into_response()
        }
        Err(e) => {
            tracing::warn!("Rejected job submission: {}", e);
            error_response(e)
        }
    }
}

/// GET /api/jobs - Status views of all known jobs, newest first
pub async fn list_jobs(Extension(state): Extension<Arc<AppState>>) -> Response {
    match state.job_manager.list_jobs().await {
        Ok(jobs) => (
            StatusCode::OK,
            Json(serde_json::json!({ "job_count": jobs.len(), "jobs": jobs })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/jobs/estimate - Cost estimate for a spec without running it
pub async fn estimate_job(
    Extension(state): Extension<Arc<AppState>>,
    Json(spec): Json<JobSpec>,
) -> Response {
    (StatusCode::OK, Json(estimate_job_cost(&spec, &state.pricing))).into_response()
}

/// GET /api/jobs/:job_id - Full job record
pub async fn get_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.status(job_id).await {
        Ok(job) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/:job_id/status - Get job status
pub async fn get_job_status(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.get_job_status(job_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/:job_id/wait - Block until the job is terminal or the timeout elapses
pub async fn wait_for_job(
    Path(job_id): Path<JobId>,
    Query(query): Query<WaitQuery>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let secs = query.timeout_secs.unwrap_or(DEFAULT_WAIT_SECS).min(MAX_WAIT_SECS);
    match state
        .job_manager
        .await_completion(job_id, Duration::from_secs(secs))
        .await
    {
        Ok(job) => (StatusCode::OK, Json(job.status_view())).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/jobs/:job_id/cancel - Stop scheduling new scenes for a job
pub async fn cancel_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.cancel(job_id).await {
        Ok(status) if !status.is_cancellable() => {
            let message = if status.is_terminal() {
                "Job already finished"
            } else {
                "Scene generation is over; the job can no longer be cancelled"
            };
            (
                StatusCode::CONFLICT,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": status,
                    "message": message,
                })),
            )
                .into_response()
        }
        Ok(status) => {
            tracing::info!("Cancel requested for job {}", job_id);
            (
                StatusCode::ACCEPTED,
                Json(serde_json::json!({
                    "job_id": job_id,
                    "status": status,
                    "message": "Cancellation requested",
                })),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/:job_id/qa - Latest QA report
pub async fn get_qa_report(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.get_qa_report(job_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// POST /api/jobs/:job_id/qa - Re-run QA over a completed job
pub async fn revalidate_job(
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.revalidate(job_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/:job_id/lessons/:index/video - Where a lesson's video was written
pub async fn get_lesson_video(
    Path((job_id, index)): Path<(JobId, usize)>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    match state.job_manager.lesson_video(job_id, index).await {
        Ok(handle) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "job_id": job_id,
                "lesson": index,
                "video": handle,
            })),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

/// GET /api/jobs/:job_id/ws - Stream progress updates over a WebSocket
pub async fn job_progress_ws(
    ws: WebSocketUpgrade,
    Path(job_id): Path<JobId>,
    Extension(state): Extension<Arc<AppState>>,
) -> Response {
    let snapshots = match state.job_manager.subscribe(job_id).await {
        Ok(rx) => rx,
        // Not running in this process; send the stored snapshot once.
        Err(_) => match state.job_manager.status(job_id).await {
            Ok(job) => watch::channel(job).1,
            Err(e) => return error_response(e),
        },
    };
    ws.on_upgrade(move |socket| progress_socket(socket, job_id, snapshots))
}

async fn progress_socket(stream: WebSocket, job_id: JobId, mut snapshots: watch::Receiver<Job>) {
    let (mut sender, mut receiver) = stream.split();
    tracing::info!("🔌 Progress subscriber connected for job {}", job_id);

    loop {
        let update = ProgressUpdate::from_job(&snapshots.borrow_and_update());
        let terminal = update.status.status.is_terminal();

        let json_str = match serde_json::to_string(&update) {
            Ok(json_str) => json_str,
            Err(e) => {
                tracing::error!("Failed to serialize progress update: {}", e);
                break;
            }
        };
        if sender.send(Message::Text(json_str)).await.is_err() {
            break;
        }
        if terminal {
            break;
        }

        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    tracing::info!("🔌 Progress subscriber for job {} disconnected", job_id);
}

/// Routes for job management
pub fn job_routes() -> Router {
    Router::new()
        .route("/api/jobs", post(submit_job).get(list_jobs))
        .route("/api/jobs/estimate", post(estimate_job))
        .route("/api/jobs/:job_id", get(get_job))
        .route("/api/jobs/:job_id/status", get(get_job_status))
        .route("/api/jobs/:job_id/wait", get(wait_for_job))
        .route("/api/jobs/:job_id/cancel", post(cancel_job))
        .route("/api/jobs/:job_id/qa", get(get_qa_report).post(revalidate_job))
        .route("/api/jobs/:job_id/lessons/:index/video", get(get_lesson_video))
        .route("/api/jobs/:job_id/ws", get(job_progress_ws))
}
