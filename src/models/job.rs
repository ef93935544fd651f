use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::scene::{ArtifactHandle, Scene, SceneSpec, Stage};
use crate::types::Layout;

/// Unique identifier for a generation job
pub type JobId = Uuid;

/// Job lifecycle. Moves strictly forward; `Failed` is reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Composing,
    Qa,
    Completed,
    Failed,
}

impl JobStatus {
    fn rank(&self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Composing => 2,
            JobStatus::Qa => 3,
            JobStatus::Completed | JobStatus::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Cancellation only applies while scenes are still being generated.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Failed || next.rank() > self.rank()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    #[default]
    Standard,
    Hd,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Standard => "standard",
            QualityTier::Hd => "hd",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobOptions {
    /// Animate avatars through the lip-sync generator.
    pub avatar_mode: bool,
    pub layout: Layout,
    pub quality: QualityTier,
    /// Run the QA validator once the videos are assembled.
    pub run_qa: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            avatar_mode: false,
            layout: Layout::AvatarSplit,
            quality: QualityTier::Standard,
            run_qa: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonSpec {
    #[serde(default)]
    pub title: Option<String>,
    pub scenes: Vec<SceneSpec>,
}

/// Generation request as submitted by a caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub lessons: Vec<LessonSpec>,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lesson {
    pub index: usize,
    pub title: Option<String>,
    /// Sorted by ascending scene number.
    pub scenes: Vec<Scene>,
    /// True only when every scene in the lesson failed.
    pub failed: bool,
}

/// Position of a scene inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScenePos {
    pub lesson: usize,
    pub scene_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedScene {
    pub lesson: usize,
    pub scene_number: u32,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOutputs {
    /// One entry per lesson, indexed by lesson index.
    pub lesson_videos: Vec<Option<ArtifactHandle>>,
    pub combined: Option<ArtifactHandle>,
}

/// Job record. Mutated only by the runner task that owns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub options: JobOptions,
    pub lessons: Vec<Lesson>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub degraded_scenes: Vec<DegradedScene>,
    pub completed_scenes: usize,
    pub total_scenes: usize,
    pub outputs: JobOutputs,
}

impl Job {
    pub fn new(options: JobOptions, lessons: Vec<Lesson>) -> Self {
        let now = Utc::now();
        let total_scenes = lessons.iter().map(|l| l.scenes.len()).sum();
        let lesson_count = lessons.len();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Queued,
            options,
            lessons,
            created_at: now,
            updated_at: now,
            error: None,
            degraded_scenes: Vec::new(),
            completed_scenes: 0,
            total_scenes,
            outputs: JobOutputs {
                lesson_videos: vec![None; lesson_count],
                combined: None,
            },
        }
    }

    /// Apply a status transition; returns false if it would move backwards.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!(job_id = %self.id, from = ?self.status, to = ?next, "rejected job status transition");
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        let error = error.into();
        if self.transition(JobStatus::Failed) {
            self.error = Some(error);
            true
        } else {
            false
        }
    }

    pub fn scene_mut(&mut self, pos: ScenePos) -> Option<&mut Scene> {
        self.lessons
            .get_mut(pos.lesson)?
            .scenes
            .iter_mut()
            .find(|s| s.scene_number == pos.scene_number)
    }

    pub fn progress_fraction(&self) -> f64 {
        if self.total_scenes == 0 {
            return 0.0;
        }
        self.completed_scenes as f64 / self.total_scenes as f64
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            progress_fraction: self.progress_fraction(),
            completed_scenes: self.completed_scenes,
            total_scenes: self.total_scenes,
            degraded_scenes: self.degraded_scenes.clone(),
            error: self.error.clone(),
        }
    }
}

/// Lightweight view for progress indicators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress_fraction: f64,
    pub completed_scenes: usize,
    pub total_scenes: usize,
    pub degraded_scenes: Vec<DegradedScene>,
    pub error: Option<String>,
}
