// Cost estimation for lesson video jobs
// Prices are USD per unit; results are reported in cents (avoids floating point display issues)

use serde::Serialize;

use crate::models::{JobSpec, QualityTier};

/// Approximate storage footprint of rendered video.
const GB_PER_VIDEO_MINUTE: f64 = 0.1;

pub struct UnitPricing {
    pub image_standard: f64,
    pub image_hd: f64,
    pub tts_per_1k_characters: f64,
    pub rendering_per_minute: f64,
    pub storage_per_gb: f64,
}

impl UnitPricing {
    /// OpenAI image + TTS pricing with flat rendering and storage rates
    pub fn openai() -> Self {
        Self {
            image_standard: 0.08,
            image_hd: 0.12,
            tts_per_1k_characters: 0.015,
            rendering_per_minute: 0.05,
            storage_per_gb: 0.02,
        }
    }

    fn image_price(&self, quality: QualityTier) -> f64 {
        match quality {
            QualityTier::Standard => self.image_standard,
            QualityTier::Hd => self.image_hd,
        }
    }
}

impl Default for UnitPricing {
    fn default() -> Self {
        Self::openai()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostEstimate {
    pub image_count: usize,
    pub tts_characters: usize,
    pub video_minutes: f64,
    pub storage_gb: f64,
    pub images_cents: i64,
    pub tts_cents: i64,
    pub rendering_cents: i64,
    pub storage_cents: i64,
    /// Rounded from the unrounded sum, so it may differ from the parts by a cent.
    pub total_cents: i64,
}

fn to_cents(usd: f64) -> i64 {
    (usd * 100.0).round() as i64
}

/// Estimate the cost of running a job spec, before submission.
pub fn estimate_job_cost(spec: &JobSpec, pricing: &UnitPricing) -> CostEstimate {
    let scenes = spec.lessons.iter().flat_map(|l| l.scenes.iter());

    let mut image_count = 0usize;
    let mut tts_characters = 0usize;
    let mut seconds = 0.0f64;
    for scene in scenes {
        image_count += 1;
        tts_characters += scene.dialogue.chars().count();
        seconds += scene.duration.max(0.0);
    }

    // Lesson videos plus the combined copy.
    let video_minutes = seconds / 60.0;
    let storage_gb = video_minutes * GB_PER_VIDEO_MINUTE * 2.0;

    let images = image_count as f64 * pricing.image_price(spec.options.quality);
    let tts = tts_characters as f64 / 1000.0 * pricing.tts_per_1k_characters;
    let rendering = video_minutes * pricing.rendering_per_minute;
    let storage = storage_gb * pricing.storage_per_gb;

    CostEstimate {
        image_count,
        tts_characters,
        video_minutes,
        storage_gb,
        images_cents: to_cents(images),
        tts_cents: to_cents(tts),
        rendering_cents: to_cents(rendering),
        storage_cents: to_cents(storage),
        total_cents: to_cents(images + tts + rendering + storage),
    }
}
