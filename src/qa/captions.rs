// src/qa/captions.rs
//! Caption alignment: captions must sit inside the rendered segment and be
//! readable at the configured speed.

use crate::config::QaConfig;
use crate::media::MediaBackend;
use crate::models::{CheckResult, FlaggedScene, Job};

use super::{rendered_scenes, RenderedScene};

pub const CHECK_NAME: &str = "caption_alignment";

/// Encoders round segment length to whole frames.
const WINDOW_TOLERANCE_SECS: f64 = 0.05;

/// Why a captioned scene fails, or `None` when it is fine.
async fn caption_problem(
    rendered: &RenderedScene<'_>,
    caption: &str,
    media: &dyn MediaBackend,
    config: &QaConfig,
) -> Option<String> {
    let timing = rendered.scene.timing.as_ref()?;
    let Some(window) = timing.caption_window else {
        return Some("caption was not rendered".to_string());
    };
    let Some(segment) = rendered.scene.segment.handle() else {
        return Some("segment file missing".to_string());
    };
    let rendered_secs = match media.probe(segment.path()).await {
        Ok(meta) => meta.duration_seconds,
        Err(e) => return Some(format!("cannot open segment: {}", e)),
    };

    let inside = window.start_secs >= -WINDOW_TOLERANCE_SECS
        && window.end_secs <= rendered_secs + WINDOW_TOLERANCE_SECS
        && window.length() > 0.0;
    if !inside {
        return Some(format!(
            "window {:.2}-{:.2}s outside rendered segment of {:.2}s",
            window.start_secs, window.end_secs, rendered_secs
        ));
    }

    let visible = window.end_secs.min(rendered_secs) - window.start_secs.max(0.0);
    let cps = caption.chars().count() as f64 / visible.max(f64::EPSILON);
    if cps < config.caption_min_cps || cps > config.caption_max_cps {
        return Some(format!(
            "{:.1} chars/s outside [{}, {}]",
            cps, config.caption_min_cps, config.caption_max_cps
        ));
    }
    None
}

pub async fn check_caption_alignment(
    job: &Job,
    media: &dyn MediaBackend,
    config: &QaConfig,
) -> (CheckResult, Vec<FlaggedScene>) {
    let (scenes, mut notes) = rendered_scenes(job);
    let mut flagged = Vec::new();
    let mut total = 0usize;
    let mut passed = 0usize;

    for rendered in &scenes {
        let scene = rendered.scene;
        let Some(caption) = scene.caption.as_deref() else {
            continue;
        };
        total += 1;

        match caption_problem(rendered, caption, media, config).await {
            Some(detail) => {
                notes.push(format!(
                    "lesson {} scene {}: {}",
                    rendered.lesson, scene.scene_number, detail
                ));
                flagged.push(FlaggedScene {
                    lesson: rendered.lesson,
                    scene_number: scene.scene_number,
                    check: CHECK_NAME.to_string(),
                    detail,
                });
            }
            None => passed += 1,
        }
    }

    let score = if total == 0 {
        notes.push("no captioned scenes".to_string());
        1.0
    } else {
        passed as f64 / total as f64
    };

    (
        CheckResult::new(score, config.caption_min_score, score >= config.caption_min_score)
            .with_notes(notes),
        flagged,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CaptionWindow, Scene};
    use crate::testing::{rendered_job, rendered_scene, FakeMedia};

    fn captioned(number: u32, caption: &str, duration: f64) -> Scene {
        let mut scene = rendered_scene(number, "Sam", 0.0, duration);
        scene.caption = Some(caption.to_string());
        if let Some(timing) = scene.timing.as_mut() {
            timing.caption_window = Some(CaptionWindow { start_secs: 0.0, end_secs: duration });
        }
        scene
    }

    #[tokio::test]
    async fn test_fast_caption_fails() {
        let long = "x".repeat(120);
        let job = rendered_job(vec![captioned(1, "Short and sweet.", 3.0), captioned(2, &long, 3.0)]);
        let media = FakeMedia::new(3.0);
        let (result, flagged) = check_caption_alignment(&job, &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert_eq!(result.score, 0.5);
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].scene_number, 2);
        assert!(flagged[0].detail.contains("40.0 chars/s"));
    }

    #[tokio::test]
    async fn test_window_past_segment_end_fails() {
        let mut scene = captioned(1, "Fine", 3.0);
        if let Some(timing) = scene.timing.as_mut() {
            timing.caption_window = Some(CaptionWindow { start_secs: 0.0, end_secs: 4.0 });
        }
        let media = FakeMedia::new(3.0);
        let (result, _) =
            check_caption_alignment(&rendered_job(vec![scene]), &media, &QaConfig::default()).await;
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_rendered_segment_shorter_than_plan_fails() {
        // Readable over the planned 4 s, but the file only holds 1 s.
        let caption = "y".repeat(40);
        let job = rendered_job(vec![captioned(1, &caption, 4.0)]);
        let media = FakeMedia::new(4.0).with_duration("seg_1.mp4", 1.0);

        let (result, flagged) = check_caption_alignment(&job, &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert_eq!(result.score, 0.0);
        assert_eq!(flagged.len(), 1);
        assert!(flagged[0].detail.contains("rendered segment of 1.00s"));

        let full = FakeMedia::new(4.0);
        let (result, _) = check_caption_alignment(&job, &full, &QaConfig::default()).await;
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_unreadable_segment_fails() {
        let job = rendered_job(vec![captioned(1, "Fine", 3.0)]);
        let media = FakeMedia::new(3.0).with_unreadable("seg_1.mp4");
        let (result, flagged) = check_caption_alignment(&job, &media, &QaConfig::default()).await;
        assert!(!result.passed);
        assert!(flagged[0].detail.starts_with("cannot open segment"));
    }

    #[tokio::test]
    async fn test_degraded_and_uncaptioned_scenes_are_ignored() {
        let mut degraded = captioned(1, &"y".repeat(200), 2.0);
        degraded.degraded = Some("invalid prompt".to_string());
        let mut silent = captioned(2, "", 2.0);
        silent.caption = None;
        let media = FakeMedia::new(2.0);
        let (result, flagged) =
            check_caption_alignment(&rendered_job(vec![degraded, silent]), &media, &QaConfig::default())
                .await;
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
        assert!(flagged.is_empty());
        assert!(result.notes.iter().any(|n| n.contains("excluded")));
    }
}
