// src/jobs/mod.rs
//! Job management: submission, background execution and status lookups.

pub mod ingest;
pub mod lesson_job;
pub mod retry;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::compositor::SceneCompositor;
use crate::config::PipelineConfig;
use crate::error::JobError;
use crate::generators::{AvatarAnimator, ImageGenerator, SpeechSynthesizer};
use crate::media::MediaBackend;
use crate::models::{ArtifactHandle, Job, JobId, JobSpec, JobStatus, JobStatusView, QaReport};
use crate::qa::QaValidator;
use crate::store::{CharacterStore, JobStore};

pub use lesson_job::LessonVideoJob;

/// External asset generators used by scene tasks.
pub struct Collaborators {
    pub images: Arc<dyn ImageGenerator>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub animator: Arc<dyn AvatarAnimator>,
}

/// Everything a running job needs, shared by all jobs of the process.
pub struct PipelineContext {
    pub collaborators: Collaborators,
    pub media: Arc<dyn MediaBackend>,
    pub compositor: SceneCompositor,
    pub validator: QaValidator,
    pub store: Arc<dyn JobStore>,
    pub config: PipelineConfig,
    /// Caps in-flight generator calls across all jobs.
    pub call_limiter: Semaphore,
}

impl PipelineContext {
    pub fn new(
        collaborators: Collaborators,
        media: Arc<dyn MediaBackend>,
        validator: QaValidator,
        store: Arc<dyn JobStore>,
        config: PipelineConfig,
    ) -> Self {
        let compositor = SceneCompositor::new(media.clone(), config.render.clone());
        let call_limiter = Semaphore::new(config.max_in_flight_calls.max(1));
        Self {
            collaborators,
            media,
            compositor,
            validator,
            store,
            config,
            call_limiter,
        }
    }
}

/// Progress update message sent to WebSocket subscribers
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub status: JobStatusView,
}

impl ProgressUpdate {
    pub fn from_job(job: &Job) -> Self {
        let message = match (&job.status, &job.error) {
            (JobStatus::Failed, Some(error)) => format!("failed: {}", error),
            (status, _) => format!(
                "{:?}: {}/{} scenes",
                status, job.completed_scenes, job.total_scenes
            )
            .to_lowercase(),
        };
        Self {
            job_id: job.id,
            timestamp: Utc::now(),
            message,
            status: job.status_view(),
        }
    }
}

struct JobEntry {
    snapshots: watch::Receiver<Job>,
    cancel: CancellationToken,
}

/// Job manager - tracks jobs submitted in this process
pub struct JobManager {
    ctx: Arc<PipelineContext>,
    characters: Arc<dyn CharacterStore>,
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
}

impl JobManager {
    pub fn new(ctx: Arc<PipelineContext>, characters: Arc<dyn CharacterStore>) -> Self {
        Self {
            ctx,
            characters,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn characters(&self) -> &Arc<dyn CharacterStore> {
        &self.characters
    }

    /// Validate and start a job. Rejected specs never create a job.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobId, JobError> {
        let lessons = ingest::build_lessons(&spec, self.characters.as_ref()).await?;
        let job = Job::new(spec.options, lessons);
        let job_id = job.id;
        self.ctx.store.save_job(&job).await?;

        let (tx, rx) = watch::channel(job.clone());
        let cancel = CancellationToken::new();
        self.jobs.write().await.insert(
            job_id,
            JobEntry {
                snapshots: rx,
                cancel: cancel.clone(),
            },
        );

        tracing::info!(
            job_id = %job_id,
            lessons = job.lessons.len(),
            scenes = job.total_scenes,
            "📥 Job accepted"
        );
        let runner = LessonVideoJob::new(self.ctx.clone(), job, tx, cancel);
        tokio::spawn(runner.run());

        Ok(job_id)
    }

    /// Latest snapshot of a job.
    pub async fn status(&self, job_id: JobId) -> Result<Job, JobError> {
        if let Some(entry) = self.jobs.read().await.get(&job_id) {
            return Ok(entry.snapshots.borrow().clone());
        }
        self.ctx
            .store
            .load_job(job_id)
            .await?
            .ok_or(JobError::NotFound(job_id))
    }

    pub async fn get_job_status(&self, job_id: JobId) -> Result<JobStatusView, JobError> {
        Ok(self.status(job_id).await?.status_view())
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobStatusView>, JobError> {
        Ok(self
            .ctx
            .store
            .list_jobs()
            .await?
            .iter()
            .map(Job::status_view)
            .collect())
    }

    /// Live snapshots for a job submitted in this process.
    pub async fn subscribe(&self, job_id: JobId) -> Result<watch::Receiver<Job>, JobError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(|entry| entry.snapshots.clone())
            .ok_or(JobError::NotFound(job_id))
    }

    /// Wait for a terminal status, up to `timeout`.
    pub async fn await_completion(&self, job_id: JobId, timeout: Duration) -> Result<Job, JobError> {
        let mut rx = match self.subscribe(job_id).await {
            Ok(rx) => rx,
            Err(_) => {
                let job = self.status(job_id).await?;
                return if job.status.is_terminal() {
                    Ok(job)
                } else {
                    Err(JobError::NotFinished(job_id))
                };
            }
        };

        let finished = match tokio::time::timeout(timeout, rx.wait_for(|job| job.status.is_terminal())).await {
            Ok(Ok(job)) => Some(job.clone()),
            // Runner gone; its last snapshot is final.
            Ok(Err(_)) => None,
            Err(_) => return Err(JobError::Timeout(job_id)),
        };
        Ok(finished.unwrap_or_else(|| rx.borrow().clone()))
    }

    /// Stop starting new scene work; the job ends as failed. Once scene
    /// generation is over the request is ignored and the current status is
    /// returned.
    pub async fn cancel(&self, job_id: JobId) -> Result<JobStatus, JobError> {
        let jobs = self.jobs.read().await;
        let entry = jobs.get(&job_id).ok_or(JobError::NotFound(job_id))?;
        // Holding the borrow keeps the runner from publishing a later status
        // until the token is set.
        let snapshot = entry.snapshots.borrow();
        if snapshot.status.is_cancellable() {
            tracing::info!(job_id = %job_id, "🛑 Cancelling job");
            entry.cancel.cancel();
        }
        Ok(snapshot.status)
    }

    pub async fn get_qa_report(&self, job_id: JobId) -> Result<QaReport, JobError> {
        let job = self.status(job_id).await?;
        self.ctx
            .store
            .latest_report(job.id)
            .await?
            .ok_or(JobError::QaNotYetAvailable(job_id))
    }

    /// Run QA again over a completed job and store the new report.
    pub async fn revalidate(&self, job_id: JobId) -> Result<QaReport, JobError> {
        let job = self.status(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(JobError::NotFinished(job_id));
        }
        let report = self.ctx.validator.validate(&job).await;
        self.ctx.store.save_report(&report).await?;
        Ok(report)
    }

    /// Video for one lesson of a completed job.
    pub async fn lesson_video(&self, job_id: JobId, lesson: usize) -> Result<ArtifactHandle, JobError> {
        let job = self.status(job_id).await?;
        if job.status != JobStatus::Completed {
            return Err(JobError::NotFinished(job_id));
        }
        job.outputs
            .lesson_videos
            .get(lesson)
            .cloned()
            .flatten()
            .ok_or(JobError::ArtifactUnavailable { job_id, lesson })
    }
}
