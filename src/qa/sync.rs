// src/qa/sync.rs
//! Audio/video sync: how late speech starts relative to each segment.

use crate::config::QaConfig;
use crate::media::MediaBackend;
use crate::models::{CheckResult, FlaggedScene, Job};

use super::rendered_scenes;

pub const CHECK_NAME: &str = "audio_sync";

/// `1 - min(mean / (2 * tolerance), 1)`; 1.0 at zero drift.
pub fn sync_score(mean_drift_ms: f64, tolerance_ms: f64) -> f64 {
    if tolerance_ms <= 0.0 {
        return if mean_drift_ms <= 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - (mean_drift_ms.max(0.0) / (2.0 * tolerance_ms)).min(1.0)
}

pub async fn check_audio_sync(
    job: &Job,
    media: &dyn MediaBackend,
    config: &QaConfig,
) -> (CheckResult, Vec<FlaggedScene>) {
    let tolerance = config.sync_tolerance_ms;
    let (scenes, mut notes) = rendered_scenes(job);
    let mut drifts = Vec::with_capacity(scenes.len());
    let mut flagged = Vec::new();
    let mut errors = 0usize;

    for rendered in scenes {
        let Some(timing) = rendered.scene.timing.as_ref() else {
            continue;
        };
        let onset = media
            .speech_onset(
                rendered.video,
                timing.start_secs,
                timing.duration_secs,
                config.silence_noise_db,
            )
            .await;

        let drift_ms = match onset {
            Ok(Some(onset)) => onset * 1000.0,
            Ok(None) => {
                notes.push(format!(
                    "lesson {} scene {}: no speech detected",
                    rendered.lesson, rendered.scene.scene_number
                ));
                timing.duration_secs * 1000.0
            }
            Err(e) => {
                errors += 1;
                notes.push(format!(
                    "lesson {} scene {}: onset detection failed: {}",
                    rendered.lesson, rendered.scene.scene_number, e
                ));
                continue;
            }
        };

        if drift_ms > 2.0 * tolerance {
            flagged.push(FlaggedScene {
                lesson: rendered.lesson,
                scene_number: rendered.scene.scene_number,
                check: CHECK_NAME.to_string(),
                detail: format!("speech starts {:.0} ms late", drift_ms),
            });
        }
        drifts.push(drift_ms);
    }

    let result = if drifts.is_empty() {
        if errors == 0 {
            notes.push("no scenes to measure".to_string());
            CheckResult::new(1.0, tolerance, true)
        } else {
            CheckResult::new(0.0, tolerance, false)
        }
    } else {
        let mean = drifts.iter().sum::<f64>() / drifts.len() as f64;
        notes.push(format!("mean drift {:.0} ms over {} scenes", mean, drifts.len()));
        CheckResult::new(sync_score(mean, tolerance), tolerance, errors == 0 && mean <= tolerance)
    };

    (result.with_notes(notes), flagged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_drift_scores_one() {
        assert_eq!(sync_score(0.0, 500.0), 1.0);
    }

    #[test]
    fn test_score_never_increases_with_drift() {
        let mut previous = f64::INFINITY;
        for drift in [0.0, 50.0, 250.0, 500.0, 750.0, 1000.0, 5000.0] {
            let score = sync_score(drift, 500.0);
            assert!(score <= previous);
            assert!((0.0..=1.0).contains(&score));
            previous = score;
        }
        assert_eq!(sync_score(500.0, 500.0), 0.5);
        assert_eq!(sync_score(1000.0, 500.0), 0.0);
    }
}
