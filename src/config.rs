// src/config.rs
//! Runtime configuration loaded from the environment (`.env` supported via dotenvy).

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::types::Resolution;

/// Bounded exponential backoff for transient generator failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first one.
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(20),
            multiplier: 2.0,
        }
    }
}

/// Per-collaborator call timeouts.
#[derive(Debug, Clone)]
pub struct CallTimeouts {
    pub image: Duration,
    pub speech: Duration,
    pub avatar: Duration,
}

impl Default for CallTimeouts {
    fn default() -> Self {
        Self {
            image: Duration::from_secs(120),
            speech: Duration::from_secs(60),
            avatar: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub resolution: Resolution,
    pub fps: u32,
    pub font_size: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::FULL_HD,
            fps: 30,
            font_size: 36,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    /// Simultaneous in-flight external generator calls, process wide.
    pub max_in_flight_calls: usize,
    /// Scenes actively generating per job.
    pub max_concurrent_scenes: usize,
    pub retry: RetryPolicy,
    pub timeouts: CallTimeouts,
    pub render: RenderSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("outputs"),
            max_in_flight_calls: 4,
            max_concurrent_scenes: 4,
            retry: RetryPolicy::default(),
            timeouts: CallTimeouts::default(),
            render: RenderSettings::default(),
        }
    }
}

/// QA thresholds. Every check compares against these values only.
#[derive(Debug, Clone)]
pub struct QaConfig {
    pub sync_tolerance_ms: f64,
    pub min_character_similarity: f64,
    pub caption_min_cps: f64,
    pub caption_max_cps: f64,
    /// Fraction of captioned scenes that must pass.
    pub caption_min_score: f64,
    pub min_width: u32,
    pub min_height: u32,
    /// Allowed shortfall of a lesson video against its summed target durations.
    pub duration_lower_tolerance: f64,
    /// Allowed overrun; audio-driven extension lengthens segments.
    pub duration_upper_tolerance: f64,
    /// Silence floor used for speech onset detection, in dB.
    pub silence_noise_db: f64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            sync_tolerance_ms: 500.0,
            min_character_similarity: 0.85,
            caption_min_cps: 0.0,
            caption_max_cps: 20.0,
            caption_min_score: 1.0,
            min_width: 1280,
            min_height: 720,
            duration_lower_tolerance: 0.05,
            duration_upper_tolerance: 0.5,
            silence_noise_db: -35.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    /// Program invoked for lip-sync; avatars stay static when unset.
    pub lipsync_command: Option<String>,
    /// JSON array of characters seeding the in-memory store.
    pub characters_file: Option<PathBuf>,
    pub pipeline: PipelineConfig,
    pub qa: QaConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let pipeline_defaults = PipelineConfig::default();
        let qa_defaults = QaConfig::default();

        let pipeline = PipelineConfig {
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(pipeline_defaults.output_dir),
            max_in_flight_calls: env_or("MAX_IN_FLIGHT_CALLS", pipeline_defaults.max_in_flight_calls)?,
            max_concurrent_scenes: env_or("MAX_CONCURRENT_SCENES", pipeline_defaults.max_concurrent_scenes)?,
            retry: RetryPolicy {
                max_attempts: env_or("RETRY_MAX_ATTEMPTS", pipeline_defaults.retry.max_attempts)?,
                initial_interval: Duration::from_millis(env_or("RETRY_INITIAL_MS", 500u64)?),
                max_interval: Duration::from_millis(env_or("RETRY_MAX_MS", 20_000u64)?),
                multiplier: pipeline_defaults.retry.multiplier,
            },
            timeouts: CallTimeouts {
                image: Duration::from_secs(env_or("IMAGE_TIMEOUT_SECS", 120u64)?),
                speech: Duration::from_secs(env_or("SPEECH_TIMEOUT_SECS", 60u64)?),
                avatar: Duration::from_secs(env_or("AVATAR_TIMEOUT_SECS", 600u64)?),
            },
            render: RenderSettings {
                resolution: Resolution {
                    width: env_or("VIDEO_WIDTH", 1920u32)?,
                    height: env_or("VIDEO_HEIGHT", 1080u32)?,
                },
                fps: env_or("VIDEO_FPS", 30u32)?,
                font_size: env_or("CAPTION_FONT_SIZE", 36u32)?,
            },
        };

        let qa = QaConfig {
            sync_tolerance_ms: env_or("QA_SYNC_TOLERANCE_MS", qa_defaults.sync_tolerance_ms)?,
            min_character_similarity: env_or("QA_MIN_CHARACTER_SIMILARITY", qa_defaults.min_character_similarity)?,
            caption_min_cps: env_or("QA_CAPTION_MIN_CPS", qa_defaults.caption_min_cps)?,
            caption_max_cps: env_or("QA_CAPTION_MAX_CPS", qa_defaults.caption_max_cps)?,
            caption_min_score: env_or("QA_CAPTION_MIN_SCORE", qa_defaults.caption_min_score)?,
            min_width: env_or("QA_MIN_WIDTH", qa_defaults.min_width)?,
            min_height: env_or("QA_MIN_HEIGHT", qa_defaults.min_height)?,
            duration_lower_tolerance: env_or("QA_DURATION_LOWER", qa_defaults.duration_lower_tolerance)?,
            duration_upper_tolerance: env_or("QA_DURATION_UPPER", qa_defaults.duration_upper_tolerance)?,
            silence_noise_db: env_or("QA_SILENCE_DB", qa_defaults.silence_noise_db)?,
        };

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: non_empty_env("DATABASE_URL"),
            openai_api_key: non_empty_env("OPENAI_API_KEY"),
            openai_base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            lipsync_command: non_empty_env("LIPSYNC_COMMAND"),
            characters_file: non_empty_env("CHARACTERS_FILE").map(PathBuf::from),
            pipeline,
            qa,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_parses_and_rejects() {
        std::env::set_var("LF_TEST_ATTEMPTS", "7");
        assert_eq!(env_or("LF_TEST_ATTEMPTS", 3u32).unwrap(), 7);
        std::env::set_var("LF_TEST_BAD", "seven");
        assert!(env_or("LF_TEST_BAD", 3u32).is_err());
        assert_eq!(env_or("LF_TEST_UNSET_KEY", 3u32).unwrap(), 3);
    }

    #[test]
    fn test_default_thresholds() {
        let qa = QaConfig::default();
        assert_eq!(qa.sync_tolerance_ms, 500.0);
        assert_eq!(qa.caption_max_cps, 20.0);
    }
}
