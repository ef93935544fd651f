// src/qa/technical.rs
//! Technical metrics for the lesson videos and the combined video.

use std::path::Path;

use crate::config::QaConfig;
use crate::media::MediaBackend;
use crate::models::{CheckResult, Job};

#[derive(Default)]
struct Tally {
    total: usize,
    passed: usize,
    notes: Vec<String>,
}

impl Tally {
    fn record(&mut self, ok: bool, failure: impl FnOnce() -> String) {
        self.total += 1;
        if ok {
            self.passed += 1;
        } else {
            self.notes.push(failure());
        }
    }
}

async fn inspect(
    tally: &mut Tally,
    media: &dyn MediaBackend,
    config: &QaConfig,
    label: &str,
    path: &Path,
    expected_secs: Option<f64>,
) {
    let meta = match media.probe(path).await {
        Ok(meta) => meta,
        Err(e) => {
            tally.record(false, || format!("{}: cannot open: {}", label, e));
            return;
        }
    };

    tally.record(meta.duration_seconds > 0.0 && meta.has_video, || {
        format!("{}: no playable video stream", label)
    });
    tally.record(
        meta.width >= config.min_width && meta.height >= config.min_height,
        || {
            format!(
                "{}: resolution {}x{} below {}x{}",
                label, meta.width, meta.height, config.min_width, config.min_height
            )
        },
    );

    if let Some(expected) = expected_secs {
        let low = expected * (1.0 - config.duration_lower_tolerance);
        let high = expected * (1.0 + config.duration_upper_tolerance);
        let actual = meta.duration_seconds;
        tally.record(actual >= low && actual <= high, || {
            format!(
                "{}: duration {:.2}s outside [{:.2}, {:.2}]",
                label, actual, low, high
            )
        });
    }
}

pub async fn check_technical_metrics(
    job: &Job,
    media: &dyn MediaBackend,
    config: &QaConfig,
) -> CheckResult {
    let mut tally = Tally::default();

    for lesson in &job.lessons {
        let label = format!("lesson {}", lesson.index);
        let expected: f64 = lesson.scenes.iter().map(|s| s.duration_secs).sum();
        match job.outputs.lesson_videos.get(lesson.index).and_then(|v| v.as_ref()) {
            Some(video) => inspect(&mut tally, media, config, &label, video.path(), Some(expected)).await,
            None => tally.record(false, || format!("{}: no video", label)),
        }
    }

    let expected_total: f64 = job
        .lessons
        .iter()
        .flat_map(|l| &l.scenes)
        .map(|s| s.duration_secs)
        .sum();
    match &job.outputs.combined {
        Some(video) => {
            inspect(&mut tally, media, config, "combined", video.path(), Some(expected_total)).await
        }
        None => tally.record(false, || "combined: no video".to_string()),
    }

    let score = if tally.total == 0 {
        1.0
    } else {
        tally.passed as f64 / tally.total as f64
    };
    let all_passed = tally.passed == tally.total;
    if all_passed {
        tally.notes.push(format!("{} sub-checks passed", tally.total));
    }
    CheckResult::new(score, 1.0, all_passed).with_notes(tally.notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rendered_job, rendered_scene, FakeMedia};
    use crate::types::Resolution;

    fn two_scene_job() -> Job {
        rendered_job(vec![
            rendered_scene(1, "Sam", 0.0, 4.0),
            rendered_scene(2, "Sam", 4.0, 4.0),
        ])
    }

    #[tokio::test]
    async fn test_matching_outputs_pass() {
        let media = FakeMedia::new(8.0);
        let result = check_technical_metrics(&two_scene_job(), &media, &QaConfig::default()).await;
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
    }

    #[tokio::test]
    async fn test_low_resolution_fails() {
        let media = FakeMedia::new(8.0).with_resolution(
            "lesson_0.mp4",
            Resolution { width: 640, height: 360 },
        );
        let result = check_technical_metrics(&two_scene_job(), &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(result.notes.iter().any(|n| n.contains("lesson 0: resolution 640x360")));
    }

    #[tokio::test]
    async fn test_short_lesson_video_fails_duration_band() {
        // 5% shortfall allowed on an 8 s target.
        let media = FakeMedia::new(8.0).with_duration("lesson_0.mp4", 7.0);
        let result = check_technical_metrics(&two_scene_job(), &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(result.notes.iter().any(|n| n.starts_with("lesson 0: duration 7.00s")));

        let within = FakeMedia::new(8.0).with_duration("lesson_0.mp4", 7.8);
        let result = check_technical_metrics(&two_scene_job(), &within, &QaConfig::default()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_combined_duration_checked_against_all_scenes() {
        let media = FakeMedia::new(8.0).with_duration("combined.mp4", 20.0);
        let result = check_technical_metrics(&two_scene_job(), &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(result.notes.iter().any(|n| n.starts_with("combined: duration 20.00s")));
    }

    #[tokio::test]
    async fn test_unopenable_container_fails() {
        let media = FakeMedia::new(8.0).with_unreadable("combined.mp4");
        let result = check_technical_metrics(&two_scene_job(), &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(result.notes.iter().any(|n| n.starts_with("combined: cannot open")));
        assert!(result.score < 1.0 && result.score > 0.0);
    }

    #[tokio::test]
    async fn test_missing_lesson_video_fails() {
        let mut job = two_scene_job();
        job.outputs.lesson_videos[0] = None;
        let media = FakeMedia::new(8.0);
        let result = check_technical_metrics(&job, &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(result.notes.iter().any(|n| n == "lesson 0: no video"));
    }
}
