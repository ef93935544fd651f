// src/error.rs
//! Error taxonomy for the lesson pipeline.
//!
//! Generator failures are classified as transient (retried) or permanent
//! (scene fails). Job-level errors either reject a submission at the boundary
//! or terminate a running job.

use std::path::PathBuf;

use crate::models::JobId;

/// Failure reported by an external asset generator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeneratorError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid prompt: {0}")]
    InvalidPrompt(String),

    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("generator rejected request: {0}")]
    Rejected(String),

    #[error("failed to store artifact at {path}: {message}")]
    Artifact { path: PathBuf, message: String },
}

impl GeneratorError {
    /// Network / rate-limit class failures that are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GeneratorError::RateLimited(_)
                | GeneratorError::ServiceUnavailable(_)
                | GeneratorError::Timeout(_)
                | GeneratorError::Transport(_)
        )
    }
}

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse media tool output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media file not found: {0}")]
    FileNotFound(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("scene has no {0} artifact to compose")]
    MissingInput(&'static str),

    #[error("layout avatar_split requires an avatar image or clip")]
    MissingAvatar,

    #[error(transparent)]
    Media(#[from] MediaError),
}

/// Persistence failures (job store, character store).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("character not found: {0}")]
    CharacterNotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read store file: {0}")]
    Io(#[from] std::io::Error),
}

/// Invalid state transition on a scene result slot.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("illegal artifact transition {from} -> {to}")]
pub struct SlotError {
    pub from: &'static str,
    pub to: &'static str,
}

/// Errors surfaced to callers of the job API.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("malformed job: {0}")]
    Malformed(String),

    #[error("character not found: {0}")]
    CharacterNotFound(String),

    #[error("character {name} is referenced with conflicting {field}")]
    InconsistentCharacter { name: String, field: &'static str },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("QA report for job {0} is not yet available")]
    QaNotYetAvailable(JobId),

    #[error("timed out waiting for job {0}")]
    Timeout(JobId),

    #[error("job {0} is not finished")]
    NotFinished(JobId),

    #[error("lesson {lesson} of job {job_id} has no video")]
    ArtifactUnavailable { job_id: JobId, lesson: usize },

    #[error("lesson {0} failed: every scene failed")]
    LessonFailed(usize),

    #[error("cancelled")]
    Cancelled,

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("media failure: {0}")]
    Media(#[from] MediaError),

    #[error("compositor failure: {0}")]
    Compositor(#[from] CompositorError),

    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GeneratorError::RateLimited("429".into()).is_transient());
        assert!(GeneratorError::Timeout(std::time::Duration::from_secs(1)).is_transient());
        assert!(GeneratorError::ServiceUnavailable("503".into()).is_transient());
        assert!(!GeneratorError::InvalidPrompt("bad".into()).is_transient());
        assert!(!GeneratorError::QuotaExhausted("no credit".into()).is_transient());
        assert!(!GeneratorError::ModelUnavailable("none".into()).is_transient());
    }
}
