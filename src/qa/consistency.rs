// src/qa/consistency.rs
//! Character consistency: the avatar region of every appearance of a
//! character should look the same.

use std::collections::BTreeMap;

use image::imageops::FilterType;
use image::DynamicImage;

use crate::config::QaConfig;
use crate::media::MediaBackend;
use crate::models::{CheckResult, FlaggedScene, Job};
use crate::types::{Layout, Resolution};

use super::rendered_scenes;

pub const CHECK_NAME: &str = "character_consistency";

/// 64-bit difference hash: each bit compares horizontally adjacent pixels
/// of a 9x8 grayscale thumbnail.
pub fn dhash(image: &DynamicImage) -> u64 {
    let thumb = image.resize_exact(9, 8, FilterType::Triangle).to_luma8();
    let mut hash = 0u64;
    for y in 0..8 {
        for x in 0..8 {
            hash <<= 1;
            if thumb.get_pixel(x, y)[0] > thumb.get_pixel(x + 1, y)[0] {
                hash |= 1;
            }
        }
    }
    hash
}

/// `1 - hamming / 64`.
pub fn similarity(a: u64, b: u64) -> f64 {
    1.0 - (a ^ b).count_ones() as f64 / 64.0
}

struct Appearance {
    lesson: usize,
    scene_number: u32,
    hash: u64,
}

pub async fn check_character_consistency(
    job: &Job,
    media: &dyn MediaBackend,
    config: &QaConfig,
    resolution: Resolution,
) -> (CheckResult, Vec<FlaggedScene>) {
    let threshold = config.min_character_similarity;

    if job.options.layout == Layout::FullScreen {
        let result = CheckResult::new(1.0, threshold, true)
            .with_notes(vec!["full_screen layout: no avatar on screen".to_string()]);
        return (result, Vec::new());
    }

    let (avatar_region, _) = resolution.split_regions();
    let (scenes, mut notes) = rendered_scenes(job);
    let mut by_character: BTreeMap<&str, Vec<Appearance>> = BTreeMap::new();
    let mut errors = 0usize;

    for rendered in scenes {
        let Some(timing) = rendered.scene.timing.as_ref() else {
            continue;
        };
        let midpoint = timing.start_secs + timing.duration_secs / 2.0;
        match media
            .sample_frame(rendered.video, midpoint, Some(avatar_region))
            .await
        {
            Ok(frame) => by_character
                .entry(rendered.scene.character.as_str())
                .or_default()
                .push(Appearance {
                    lesson: rendered.lesson,
                    scene_number: rendered.scene.scene_number,
                    hash: dhash(&frame),
                }),
            Err(e) => {
                errors += 1;
                notes.push(format!(
                    "lesson {} scene {}: frame sampling failed: {}",
                    rendered.lesson, rendered.scene.scene_number, e
                ));
            }
        }
    }

    let mut score: f64 = 1.0;
    let mut all_pass = errors == 0;
    let mut flagged: Vec<FlaggedScene> = Vec::new();

    for (name, appearances) in &by_character {
        if appearances.len() < 2 {
            notes.push(format!("{}: single appearance", name));
            continue;
        }

        let mut lowest: f64 = 1.0;
        for (i, a) in appearances.iter().enumerate() {
            for b in &appearances[i + 1..] {
                let sim = similarity(a.hash, b.hash);
                lowest = lowest.min(sim);
                if sim < threshold {
                    let already = flagged
                        .iter()
                        .any(|f| f.lesson == b.lesson && f.scene_number == b.scene_number);
                    if !already {
                        flagged.push(FlaggedScene {
                            lesson: b.lesson,
                            scene_number: b.scene_number,
                            check: CHECK_NAME.to_string(),
                            detail: format!(
                                "{} differs from lesson {} scene {} (similarity {:.2})",
                                name, a.lesson, a.scene_number, sim
                            ),
                        });
                    }
                }
            }
        }

        notes.push(format!(
            "{}: {} appearances, minimum similarity {:.2}",
            name,
            appearances.len(),
            lowest
        ));
        score = score.min(lowest);
        if lowest < threshold {
            all_pass = false;
        }
    }

    if errors > 0 && by_character.is_empty() {
        score = 0.0;
    }

    (
        CheckResult::new(score, threshold, all_pass).with_notes(notes),
        flagged,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rendered_job, rendered_scene, FakeMedia};
    use image::{GrayImage, Luma};

    fn gradient(reverse: bool) -> DynamicImage {
        let img = GrayImage::from_fn(90, 80, |x, _| {
            let v = (x * 255 / 89) as u8;
            Luma([if reverse { 255 - v } else { v }])
        });
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_identical_frames_are_fully_similar() {
        let a = dhash(&gradient(false));
        assert_eq!(similarity(a, dhash(&gradient(false))), 1.0);
    }

    #[test]
    fn test_opposite_gradients_differ() {
        let a = dhash(&gradient(false));
        let b = dhash(&gradient(true));
        assert!(similarity(a, b) < 0.5);
    }

    #[test]
    fn test_similarity_counts_bits() {
        assert_eq!(similarity(0, u64::MAX), 0.0);
        assert_eq!(similarity(0b1111, 0), 1.0 - 4.0 / 64.0);
    }

    /// Reversed gradient for frames sampled after `after_secs`.
    fn changes_after(after_secs: f64) -> FakeMedia {
        FakeMedia::new(4.0).with_frames(move |_, at| gradient(at > after_secs))
    }

    #[tokio::test]
    async fn test_single_appearances_pass_whatever_the_frames() {
        let job = rendered_job(vec![
            rendered_scene(1, "Sam", 0.0, 4.0),
            rendered_scene(2, "Kim", 4.0, 4.0),
        ]);
        let (result, flagged) =
            check_character_consistency(&job, &changes_after(4.0), &QaConfig::default(), Resolution::FULL_HD)
                .await;
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
        assert!(flagged.is_empty());
        assert!(result.notes.iter().any(|n| n == "Kim: single appearance"));
    }

    #[tokio::test]
    async fn test_changed_avatar_flags_later_scene() {
        let job = rendered_job(vec![
            rendered_scene(1, "Sam", 0.0, 4.0),
            rendered_scene(2, "Sam", 4.0, 4.0),
        ]);
        let (result, flagged) =
            check_character_consistency(&job, &changes_after(4.0), &QaConfig::default(), Resolution::FULL_HD)
                .await;
        assert!(!result.passed);
        assert!(result.score < QaConfig::default().min_character_similarity);
        assert_eq!(flagged.len(), 1);
        assert_eq!((flagged[0].lesson, flagged[0].scene_number), (0, 2));
        assert_eq!(flagged[0].check, CHECK_NAME);
        assert!(flagged[0].detail.contains("lesson 0 scene 1"));
    }

    #[tokio::test]
    async fn test_stable_avatar_passes() {
        let job = rendered_job(vec![
            rendered_scene(1, "Sam", 0.0, 4.0),
            rendered_scene(2, "Sam", 4.0, 4.0),
        ]);
        let (result, flagged) =
            check_character_consistency(&job, &FakeMedia::new(4.0), &QaConfig::default(), Resolution::FULL_HD)
                .await;
        assert!(result.passed);
        assert_eq!(result.score, 1.0);
        assert!(flagged.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_lesson_video_fails() {
        let job = rendered_job(vec![rendered_scene(1, "Sam", 0.0, 4.0)]);
        let media = FakeMedia::new(4.0).with_unreadable("lesson_0.mp4");
        let (result, _) =
            check_character_consistency(&job, &media, &QaConfig::default(), Resolution::FULL_HD).await;
        assert!(!result.passed);
        assert_eq!(result.score, 0.0);
    }

    #[tokio::test]
    async fn test_full_screen_layout_skips_check() {
        let mut job = rendered_job(vec![
            rendered_scene(1, "Sam", 0.0, 4.0),
            rendered_scene(2, "Sam", 4.0, 4.0),
        ]);
        job.options.layout = Layout::FullScreen;
        let (result, flagged) =
            check_character_consistency(&job, &changes_after(4.0), &QaConfig::default(), Resolution::FULL_HD)
                .await;
        assert!(result.passed);
        assert!(flagged.is_empty());
    }
}
