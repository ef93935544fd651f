// src/jobs/lesson_job.rs
//! Background runner for one job.
//!
//! The runner owns the job record. Scene tasks run concurrently and report
//! stage events over a channel; only the runner applies them, publishes
//! snapshots and persists the record.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::retry::call_with_retry;
use super::PipelineContext;
use crate::compositor::{AvatarInput, RenderedSegment, SceneRenderInput};
use crate::error::{CompositorError, GeneratorError, JobError};
use crate::models::{
    ArtifactHandle, DegradedScene, Job, JobOptions, JobStatus, Scene, ScenePos, Stage,
};
use crate::types::Layout;

#[derive(Debug)]
enum StageEvent {
    Started {
        pos: ScenePos,
        stage: Stage,
    },
    Produced {
        pos: ScenePos,
        stage: Stage,
        handle: ArtifactHandle,
    },
    Failed {
        pos: ScenePos,
        stage: Stage,
        reason: String,
    },
    Finished {
        pos: ScenePos,
        segment: RenderedSegment,
        degraded: Option<(Stage, String)>,
    },
}

/// Scratch layout: `<output_dir>/<job_id>/lesson_<index>/...`.
pub fn lesson_dir(job_dir: &Path, lesson: usize) -> PathBuf {
    job_dir.join(format!("lesson_{}", lesson))
}

pub struct LessonVideoJob {
    ctx: Arc<PipelineContext>,
    job: Job,
    snapshots: watch::Sender<Job>,
    cancel: CancellationToken,
    job_dir: PathBuf,
}

impl LessonVideoJob {
    pub fn new(
        ctx: Arc<PipelineContext>,
        job: Job,
        snapshots: watch::Sender<Job>,
        cancel: CancellationToken,
    ) -> Self {
        let job_dir = ctx.config.output_dir.join(job.id.to_string());
        Self {
            ctx,
            job,
            snapshots,
            cancel,
            job_dir,
        }
    }

    /// Drive the job to a terminal status.
    pub async fn run(mut self) {
        let job_id = self.job.id;
        tracing::info!(job_id = %job_id, scenes = self.job.total_scenes, "🚀 Starting lesson video job");

        match self.execute().await {
            Ok(()) => {
                tracing::info!(
                    job_id = %job_id,
                    degraded = self.job.degraded_scenes.len(),
                    "🎉 Job completed"
                );
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, "❌ Job failed: {}", e);
                self.job.outputs.lesson_videos.iter_mut().for_each(|v| *v = None);
                self.job.outputs.combined = None;
                self.job.fail(e.to_string());
                if let Err(store_err) = self.publish().await {
                    tracing::error!(job_id = %job_id, "Failed to persist failed job: {}", store_err);
                }
            }
        }
    }

    async fn execute(&mut self) -> Result<(), JobError> {
        self.advance(JobStatus::Running).await?;
        self.generate_scenes().await?;

        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        for lesson in self.job.lessons.iter_mut() {
            lesson.failed = lesson.scenes.iter().all(|s| s.degraded.is_some());
        }
        if let Some(lesson) = self.job.lessons.iter().find(|l| l.failed) {
            return Err(JobError::LessonFailed(lesson.index));
        }

        self.advance(JobStatus::Composing).await?;
        if self.cancel.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        self.assemble().await?;

        if self.job.options.run_qa {
            self.advance(JobStatus::Qa).await?;
            let report = self.ctx.validator.validate(&self.job).await;
            self.ctx.store.save_report(&report).await?;
        }

        self.advance(JobStatus::Completed).await
    }

    async fn advance(&mut self, next: JobStatus) -> Result<(), JobError> {
        if self.job.transition(next) {
            tracing::info!(job_id = %self.job.id, status = ?next, "Job status changed");
        }
        self.publish().await
    }

    async fn publish(&mut self) -> Result<(), JobError> {
        self.job.updated_at = chrono::Utc::now();
        self.snapshots.send_replace(self.job.clone());
        self.ctx.store.save_job(&self.job).await?;
        Ok(())
    }

    async fn generate_scenes(&mut self) -> Result<(), JobError> {
        for lesson in &self.job.lessons {
            tokio::fs::create_dir_all(lesson_dir(&self.job_dir, lesson.index)).await?;
        }

        let (tx, mut rx) = mpsc::channel::<StageEvent>(64);
        let slots = Arc::new(Semaphore::new(self.ctx.config.max_concurrent_scenes.max(1)));
        let mut tasks: JoinSet<Result<(), JobError>> = JoinSet::new();

        for lesson in &self.job.lessons {
            for scene in &lesson.scenes {
                let task = SceneTask {
                    ctx: self.ctx.clone(),
                    pos: ScenePos {
                        lesson: lesson.index,
                        scene_number: scene.scene_number,
                    },
                    scene: scene.clone(),
                    options: self.job.options.clone(),
                    dir: lesson_dir(&self.job_dir, lesson.index),
                    events: tx.clone(),
                };
                let slots = slots.clone();
                let cancel = self.cancel.clone();
                tasks.spawn(async move {
                    let Ok(_slot) = slots.acquire_owned().await else {
                        return Ok(());
                    };
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    task.run().await
                });
            }
        }
        drop(tx);

        loop {
            tokio::select! {
                Some(event) = rx.recv() => self.apply(event).await?,
                Some(joined) = tasks.join_next() => match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(e),
                    Err(e) => {
                        return Err(JobError::Io(std::io::Error::new(
                            std::io::ErrorKind::Other,
                            format!("scene task aborted: {}", e),
                        )))
                    }
                },
                else => break,
            }
        }
        Ok(())
    }

    async fn apply(&mut self, event: StageEvent) -> Result<(), JobError> {
        let job_id = self.job.id;
        match event {
            StageEvent::Started { pos, stage } => {
                if let Some(scene) = self.job.scene_mut(pos) {
                    if let Err(e) = scene.slot_mut(stage).begin() {
                        tracing::warn!(job_id = %job_id, ?pos, ?stage, "{}", e);
                    }
                }
            }
            StageEvent::Produced { pos, stage, handle } => {
                if let Some(scene) = self.job.scene_mut(pos) {
                    if let Err(e) = scene.slot_mut(stage).resolve(handle) {
                        tracing::warn!(job_id = %job_id, ?pos, ?stage, "{}", e);
                    }
                }
            }
            StageEvent::Failed { pos, stage, reason } => {
                if let Some(scene) = self.job.scene_mut(pos) {
                    if let Err(e) = scene.slot_mut(stage).fail(reason) {
                        tracing::warn!(job_id = %job_id, ?pos, ?stage, "{}", e);
                    }
                }
            }
            StageEvent::Finished {
                pos,
                segment,
                degraded,
            } => {
                let Some(scene) = self.job.scene_mut(pos) else {
                    return Ok(());
                };
                let slot = &mut scene.segment;
                if let Err(e) = slot.begin().and_then(|_| slot.resolve(segment.handle)) {
                    tracing::warn!(job_id = %job_id, ?pos, "{}", e);
                }
                scene.timing = Some(segment.timing);
                if let Some((stage, reason)) = degraded {
                    scene.degraded = Some(reason.clone());
                    self.job.degraded_scenes.push(DegradedScene {
                        lesson: pos.lesson,
                        scene_number: pos.scene_number,
                        stage,
                        reason,
                    });
                }
                self.job.completed_scenes += 1;
                tracing::info!(
                    job_id = %job_id,
                    lesson = pos.lesson,
                    scene = pos.scene_number,
                    progress = format!("{}/{}", self.job.completed_scenes, self.job.total_scenes),
                    "🎬 Scene finished"
                );
            }
        }
        self.publish().await
    }

    /// Concatenate segments per lesson (concurrently), then lessons into the
    /// combined video.
    async fn assemble(&mut self) -> Result<(), JobError> {
        let media = self.ctx.media.clone();
        let mut plans = Vec::with_capacity(self.job.lessons.len());

        for lesson in self.job.lessons.iter_mut() {
            let mut inputs = Vec::with_capacity(lesson.scenes.len());
            let mut offset = 0.0;
            for scene in lesson.scenes.iter_mut() {
                let handle = scene
                    .segment
                    .handle()
                    .ok_or(CompositorError::MissingInput("segment"))?;
                inputs.push(handle.path().to_path_buf());
                if let Some(timing) = scene.timing.as_mut() {
                    timing.start_secs = offset;
                    offset += timing.duration_secs;
                }
            }
            let output = lesson_dir(&self.job_dir, lesson.index)
                .join(format!("lesson_{}.mp4", lesson.index));
            plans.push((lesson.index, inputs, output));
        }

        let joins = plans.iter().map(|(index, inputs, output)| {
            let media = media.clone();
            async move {
                media.concat(inputs, output).await?;
                tracing::info!("📼 Lesson {} assembled from {} segments", index, inputs.len());
                Ok::<_, JobError>(())
            }
        });
        futures::future::try_join_all(joins).await?;

        for (index, _, output) in &plans {
            if let Some(slot) = self.job.outputs.lesson_videos.get_mut(*index) {
                *slot = Some(ArtifactHandle::new(output));
            }
        }

        let lesson_videos: Vec<PathBuf> = plans.into_iter().map(|(_, _, output)| output).collect();
        let combined = self.job_dir.join("combined.mp4");
        media.concat(&lesson_videos, &combined).await?;
        self.job.outputs.combined = Some(ArtifactHandle::new(combined));
        Ok(())
    }
}

/// Generates and composes one scene. Never touches the job record.
struct SceneTask {
    ctx: Arc<PipelineContext>,
    pos: ScenePos,
    scene: Scene,
    options: JobOptions,
    dir: PathBuf,
    events: mpsc::Sender<StageEvent>,
}

impl SceneTask {
    fn artifact(&self, name: &str) -> PathBuf {
        self.dir
            .join(format!("scene_{}_{}", self.scene.scene_number, name))
    }

    async fn emit(&self, event: StageEvent) {
        if self.events.send(event).await.is_err() {
            tracing::debug!(?self.pos, "runner gone, dropping stage event");
        }
    }

    async fn stage<F, Fut>(
        &self,
        stage: Stage,
        timeout: std::time::Duration,
        operation: F,
    ) -> Result<ArtifactHandle, GeneratorError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<ArtifactHandle, GeneratorError>>,
    {
        self.emit(StageEvent::Started { pos: self.pos, stage }).await;
        let label = format!(
            "lesson {} scene {} {:?}",
            self.pos.lesson, self.pos.scene_number, stage
        );
        let result = call_with_retry(
            &label,
            &self.ctx.config.retry,
            timeout,
            &self.ctx.call_limiter,
            operation,
        )
        .await;

        match &result {
            Ok(handle) => {
                self.emit(StageEvent::Produced {
                    pos: self.pos,
                    stage,
                    handle: handle.clone(),
                })
                .await
            }
            Err(e) => {
                self.emit(StageEvent::Failed {
                    pos: self.pos,
                    stage,
                    reason: e.to_string(),
                })
                .await
            }
        }
        result
    }

    async fn run(self) -> Result<(), JobError> {
        let timeouts = self.ctx.config.timeouts.clone();
        let collaborators = &self.ctx.collaborators;

        let image_path = self.artifact("image.png");
        let image = self
            .stage(Stage::Image, timeouts.image, || {
                collaborators.images.generate_image(
                    &self.scene.visual_prompt,
                    self.options.quality,
                    &image_path,
                )
            })
            .await;
        let image = match image {
            Ok(handle) => handle,
            Err(e) => return self.degrade(Stage::Image, e.to_string()).await,
        };

        let audio_path = self.artifact("audio.mp3");
        let audio = self
            .stage(Stage::Audio, timeouts.speech, || {
                collaborators
                    .speech
                    .synthesize(&self.scene.dialogue, &self.scene.voice, &audio_path)
            })
            .await;
        let audio = match audio {
            Ok(handle) => handle,
            Err(e) => return self.degrade(Stage::Audio, e.to_string()).await,
        };

        let avatar = self.avatar(audio.path(), timeouts.avatar).await;

        let input = SceneRenderInput {
            image: image.path().to_path_buf(),
            audio: audio.path().to_path_buf(),
            avatar,
            caption: self.scene.caption.clone(),
            target_secs: self.scene.duration_secs,
        };
        let output = self.artifact("segment.mp4");
        match self
            .ctx
            .compositor
            .compose(&input, self.options.layout, &output)
            .await
        {
            Ok(segment) => {
                self.emit(StageEvent::Finished {
                    pos: self.pos,
                    segment,
                    degraded: None,
                })
                .await;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(?self.pos, "Segment render failed: {}", e);
                self.degrade(Stage::Segment, e.to_string()).await
            }
        }
    }

    /// Avatar visual for the segment. Any animation failure falls back to
    /// the still image.
    async fn avatar(&self, audio: &Path, timeout: std::time::Duration) -> AvatarInput {
        if self.options.layout == Layout::FullScreen {
            return AvatarInput::None;
        }
        let Some(still) = self.scene.avatar_image.clone() else {
            return AvatarInput::None;
        };
        if !self.options.avatar_mode {
            return AvatarInput::Still(still);
        }

        let clip_path = self.artifact("avatar.mp4");
        let animator = &self.ctx.collaborators.animator;
        match self
            .stage(Stage::Avatar, timeout, || {
                animator.animate(&still, audio, &clip_path)
            })
            .await
        {
            Ok(clip) => AvatarInput::Clip(clip.path().to_path_buf()),
            Err(e) => {
                tracing::info!(?self.pos, "🖼️ Using still avatar: {}", e);
                AvatarInput::Still(still)
            }
        }
    }

    /// Replace the scene with a placeholder of its target duration.
    async fn degrade(&self, stage: Stage, reason: String) -> Result<(), JobError> {
        tracing::warn!(
            lesson = self.pos.lesson,
            scene = self.pos.scene_number,
            ?stage,
            "⚠️ Scene degraded to placeholder: {}",
            reason
        );
        let output = self.artifact("placeholder.mp4");
        let segment = self
            .ctx
            .compositor
            .render_placeholder(self.scene.duration_secs, &output)
            .await?;
        self.emit(StageEvent::Finished {
            pos: self.pos,
            segment,
            degraded: Some((stage, reason)),
        })
        .await;
        Ok(())
    }
}
