// src/qa/mod.rs
//! Post-hoc QA over a finished job's videos.
//!
//! The four checks are independent and advisory: a failing check only sets
//! `flagged` on the report. Media errors inside a check become failed
//! sub-checks with notes, so validation itself never fails.

pub mod captions;
pub mod consistency;
pub mod sync;
pub mod technical;

use std::path::Path;
use std::sync::Arc;

use crate::config::QaConfig;
use crate::media::MediaBackend;
use crate::models::{Job, QaChecks, QaReport, Scene};
use crate::types::Resolution;

pub struct QaValidator {
    media: Arc<dyn MediaBackend>,
    config: QaConfig,
    resolution: Resolution,
}

impl QaValidator {
    pub fn new(media: Arc<dyn MediaBackend>, config: QaConfig, resolution: Resolution) -> Self {
        Self {
            media,
            config,
            resolution,
        }
    }

    pub async fn validate(&self, job: &Job) -> QaReport {
        let media = self.media.as_ref();
        let (
            (audio_sync, sync_flags),
            (character_consistency, consistency_flags),
            (caption_alignment, caption_flags),
            technical_metrics,
        ) = tokio::join!(
            sync::check_audio_sync(job, media, &self.config),
            consistency::check_character_consistency(job, media, &self.config, self.resolution),
            captions::check_caption_alignment(job, media, &self.config),
            technical::check_technical_metrics(job, media, &self.config),
        );

        let mut flagged_scenes = sync_flags;
        flagged_scenes.extend(consistency_flags);
        flagged_scenes.extend(caption_flags);

        let report = QaReport::new(
            job.id,
            QaChecks {
                audio_sync,
                character_consistency,
                caption_alignment,
                technical_metrics,
            },
            flagged_scenes,
        );

        if report.flagged {
            tracing::warn!(
                job_id = %job.id,
                sync = report.checks.audio_sync.passed,
                consistency = report.checks.character_consistency.passed,
                captions = report.checks.caption_alignment.passed,
                technical = report.checks.technical_metrics.passed,
                "🚩 QA flagged job"
            );
        } else {
            tracing::info!(job_id = %job.id, "✅ QA passed");
        }
        report
    }
}

/// A scene the content checks can look at, with its lesson video.
pub(crate) struct RenderedScene<'a> {
    pub lesson: usize,
    pub video: &'a Path,
    pub scene: &'a Scene,
}

/// Non-degraded scenes with render timing, plus notes for what was skipped.
pub(crate) fn rendered_scenes(job: &Job) -> (Vec<RenderedScene<'_>>, Vec<String>) {
    let mut scenes = Vec::new();
    let mut notes = Vec::new();

    for lesson in &job.lessons {
        let video = job
            .outputs
            .lesson_videos
            .get(lesson.index)
            .and_then(|v| v.as_ref());
        let Some(video) = video else {
            notes.push(format!("lesson {} has no video", lesson.index));
            continue;
        };

        for scene in &lesson.scenes {
            if let Some(reason) = &scene.degraded {
                notes.push(format!(
                    "lesson {} scene {} excluded (placeholder: {})",
                    lesson.index, scene.scene_number, reason
                ));
            } else if scene.timing.is_some() {
                scenes.push(RenderedScene {
                    lesson: lesson.index,
                    video: video.path(),
                    scene,
                });
            }
        }
    }

    (scenes, notes)
}
