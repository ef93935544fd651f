// src/handlers/mod.rs
pub mod characters;
pub mod jobs;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};

use crate::error::JobError;

pub fn status_for(error: &JobError) -> StatusCode {
    match error {
        JobError::Malformed(_) => StatusCode::BAD_REQUEST,
        JobError::CharacterNotFound(_) | JobError::InconsistentCharacter { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        JobError::NotFound(_)
        | JobError::QaNotYetAvailable(_)
        | JobError::ArtifactUnavailable { .. } => StatusCode::NOT_FOUND,
        JobError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        JobError::NotFinished(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body with the status code matching the error.
pub fn error_response(error: JobError) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("❌ Request failed: {}", error);
    }
    (status, Json(serde_json::json!({ "error": error.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_job_errors_map_to_status_codes() {
        let id = Uuid::new_v4();
        assert_eq!(status_for(&JobError::Malformed("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_for(&JobError::InconsistentCharacter { name: "Sam".into(), field: "voice" }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(status_for(&JobError::QaNotYetAvailable(id)), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&JobError::Timeout(id)), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(status_for(&JobError::NotFinished(id)), StatusCode::CONFLICT);
        assert_eq!(status_for(&JobError::Cancelled), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
