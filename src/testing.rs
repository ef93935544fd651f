// src/testing.rs
//! Scripted collaborators and an in-memory media backend for tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};

use crate::compositor::SegmentPlan;
use crate::config::{CallTimeouts, PipelineConfig, QaConfig, RenderSettings, RetryPolicy};
use crate::error::{GeneratorError, MediaError};
use crate::generators::{AvatarAnimator, ImageGenerator, SpeechSynthesizer};
use crate::jobs::{Collaborators, JobManager, PipelineContext};
use crate::media::MediaBackend;
use crate::models::{
    ArtifactHandle, ArtifactSlot, Character, Gender, Job, JobOptions, JobSpec,
    Lesson, LessonSpec, QualityTier, Scene, SceneSpec, SegmentTiming, VoiceDescriptor, VoiceStyle,
};
use crate::qa::QaValidator;
use crate::store::{MemoryCharacterStore, MemoryJobStore};
use crate::types::{Region, Resolution, VideoMetadata, VisualFit};

type FrameFn = Box<dyn Fn(&Path, f64) -> DynamicImage + Send + Sync>;

/// How a scripted generator answers calls for one key.
#[derive(Debug, Clone)]
pub enum Behavior {
    Permanent(GeneratorError),
    /// Transient failures for the first `n` calls, then success.
    FlakyTimes(u32),
    AlwaysTransient,
}

/// Generator fake keyed by prompt, dialogue text or avatar still path.
#[derive(Default)]
pub struct ScriptedGenerator {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, key: impl Into<String>, behavior: Behavior) -> Self {
        self.behaviors.insert(key.into(), behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self, key: &str) -> u32 {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    async fn call(&self, key: &str, dest: &Path) -> Result<ArtifactHandle, GeneratorError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(key.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.behaviors.get(key) {
            Some(Behavior::Permanent(e)) => return Err(e.clone()),
            Some(Behavior::FlakyTimes(n)) if attempt <= *n => {
                return Err(GeneratorError::ServiceUnavailable("503".to_string()))
            }
            Some(Behavior::AlwaysTransient) => {
                return Err(GeneratorError::RateLimited("429".to_string()))
            }
            _ => {}
        }

        tokio::fs::write(dest, key.as_bytes())
            .await
            .map_err(|e| GeneratorError::Artifact {
                path: dest.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(ArtifactHandle::new(dest))
    }
}

#[async_trait]
impl ImageGenerator for ScriptedGenerator {
    async fn generate_image(
        &self,
        prompt: &str,
        _quality: QualityTier,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        self.call(prompt, dest).await
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedGenerator {
    async fn synthesize(
        &self,
        text: &str,
        _voice: &VoiceDescriptor,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        self.call(text, dest).await
    }
}

#[async_trait]
impl AvatarAnimator for ScriptedGenerator {
    async fn animate(
        &self,
        still: &Path,
        _audio: &Path,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        self.call(&still.to_string_lossy(), dest).await
    }
}

/// Media backend that tracks durations instead of encoding anything.
pub struct FakeMedia {
    resolution: Resolution,
    /// Duration reported for files the fake never produced (narration, clips).
    source_secs: f64,
    onset_secs: Option<f64>,
    durations: Mutex<HashMap<PathBuf, f64>>,
    resolutions: HashMap<PathBuf, Resolution>,
    unreadable: HashSet<PathBuf>,
    frames: Option<FrameFn>,
    concat_delay: Option<Duration>,
    concats: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
    segments: Mutex<Vec<SegmentPlan>>,
}

impl FakeMedia {
    pub fn new(source_secs: f64) -> Self {
        Self {
            resolution: Resolution::FULL_HD,
            source_secs,
            onset_secs: Some(0.0),
            durations: Mutex::new(HashMap::new()),
            resolutions: HashMap::new(),
            unreadable: HashSet::new(),
            frames: None,
            concat_delay: None,
            concats: Mutex::new(Vec::new()),
            segments: Mutex::new(Vec::new()),
        }
    }

    pub fn with_onset(mut self, onset_secs: Option<f64>) -> Self {
        self.onset_secs = onset_secs;
        self
    }

    pub fn with_duration(self, path: impl AsRef<Path>, secs: f64) -> Self {
        self.record(path.as_ref(), secs);
        self
    }

    pub fn with_resolution(mut self, path: impl Into<PathBuf>, resolution: Resolution) -> Self {
        self.resolutions.insert(path.into(), resolution);
        self
    }

    /// Probing or sampling `path` fails as if the container were corrupt.
    pub fn with_unreadable(mut self, path: impl Into<PathBuf>) -> Self {
        self.unreadable.insert(path.into());
        self
    }

    /// Frames come from `frames(path, at_secs)` instead of the fixed gradient.
    pub fn with_frames(
        mut self,
        frames: impl Fn(&Path, f64) -> DynamicImage + Send + Sync + 'static,
    ) -> Self {
        self.frames = Some(Box::new(frames));
        self
    }

    pub fn with_concat_delay(mut self, delay: Duration) -> Self {
        self.concat_delay = Some(delay);
        self
    }

    /// Every concat call in order, as (inputs, output).
    pub fn concats(&self) -> Vec<(Vec<PathBuf>, PathBuf)> {
        self.concats.lock().unwrap().clone()
    }

    pub fn segments(&self) -> Vec<SegmentPlan> {
        self.segments.lock().unwrap().clone()
    }

    fn duration_of(&self, path: &Path) -> f64 {
        self.durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(self.source_secs)
    }

    fn record(&self, path: &Path, secs: f64) {
        self.durations.lock().unwrap().insert(path.to_path_buf(), secs);
    }

    fn check_readable(&self, path: &Path) -> Result<(), MediaError> {
        if self.unreadable.contains(path) {
            return Err(MediaError::ParseError(format!(
                "{}: moov atom not found",
                path.display()
            )));
        }
        Ok(())
    }
}

/// Horizontal luma gradient; stands in for a decoded frame.
pub fn gradient_frame(width: u32, height: u32) -> DynamicImage {
    let image = GrayImage::from_fn(width, height, |x, _| {
        Luma([(x * 255 / width.max(1)) as u8])
    });
    DynamicImage::ImageLuma8(image)
}

#[async_trait]
impl MediaBackend for FakeMedia {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, MediaError> {
        self.check_readable(path)?;
        let resolution = self.resolutions.get(path).copied().unwrap_or(self.resolution);
        Ok(VideoMetadata {
            file_path: path.to_string_lossy().to_string(),
            duration_seconds: self.duration_of(path),
            width: resolution.width,
            height: resolution.height,
            fps: 30.0,
            has_audio: true,
            has_video: true,
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            file_size_mb: 1.0,
        })
    }

    async fn render_segment(&self, plan: &SegmentPlan) -> Result<(), MediaError> {
        self.record(&plan.output, plan.duration_secs);
        self.segments.lock().unwrap().push(plan.clone());
        Ok(())
    }

    async fn render_placeholder(
        &self,
        output: &Path,
        duration_secs: f64,
        _render: &RenderSettings,
    ) -> Result<(), MediaError> {
        self.record(output, duration_secs);
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        if let Some(delay) = self.concat_delay {
            tokio::time::sleep(delay).await;
        }
        let total: f64 = inputs.iter().map(|p| self.duration_of(p)).sum();
        self.record(output, total);
        self.concats
            .lock()
            .unwrap()
            .push((inputs.to_vec(), output.to_path_buf()));
        Ok(())
    }

    async fn speech_onset(
        &self,
        _path: &Path,
        _start_secs: f64,
        _window_secs: f64,
        _noise_db: f64,
    ) -> Result<Option<f64>, MediaError> {
        Ok(self.onset_secs)
    }

    async fn sample_frame(
        &self,
        path: &Path,
        at_secs: f64,
        region: Option<Region>,
    ) -> Result<DynamicImage, MediaError> {
        self.check_readable(path)?;
        if let Some(frames) = &self.frames {
            return Ok(frames(path, at_secs));
        }
        let region = region.unwrap_or_else(|| self.resolution.full_frame());
        Ok(gradient_frame(region.width.min(64), region.height.min(64)))
    }
}

pub const LECTURER: &str = "Professor Alex";

pub fn professor() -> Character {
    Character {
        name: LECTURER.to_string(),
        description: Some("Biology lecturer".to_string()),
        voice: VoiceDescriptor::new(Gender::Male, VoiceStyle::Professional),
        avatar_image: Some(PathBuf::from("/avatars/alex.png")),
    }
}

pub fn visual_prompt(lesson: usize, scene: u32) -> String {
    format!("lesson {} scene {} diagram", lesson, scene)
}

pub fn dialogue(lesson: usize, scene: u32) -> String {
    format!("Lesson {}, point {}.", lesson, scene)
}

/// `lessons` lessons of `scenes` four-second scenes each.
pub fn lesson_spec(lessons: usize, scenes: u32) -> JobSpec {
    JobSpec {
        lessons: (0..lessons)
            .map(|l| LessonSpec {
                title: Some(format!("Lesson {}", l)),
                scenes: (1..=scenes)
                    .map(|n| SceneSpec {
                        scene_number: n,
                        duration: 4.0,
                        dialogue: dialogue(l, n),
                        character: LECTURER.to_string(),
                        visual: visual_prompt(l, n),
                        caption: None,
                        voice: None,
                        avatar_image: None,
                    })
                    .collect(),
            })
            .collect(),
        options: JobOptions::default(),
    }
}

/// A composed scene at `start_secs` inside lesson 0, with segment
/// `seg_<number>.mp4`.
pub fn rendered_scene(number: u32, character: &str, start_secs: f64, duration_secs: f64) -> Scene {
    Scene {
        scene_number: number,
        duration_secs,
        dialogue: "Hello".to_string(),
        character: character.to_string(),
        voice: VoiceDescriptor::new(Gender::Neutral, VoiceStyle::Calm),
        avatar_image: Some(PathBuf::from("/avatars/sam.png")),
        visual_prompt: "board".to_string(),
        caption: None,
        image: ArtifactSlot::Absent,
        audio: ArtifactSlot::Absent,
        avatar_clip: ArtifactSlot::Absent,
        segment: ArtifactSlot::Present(ArtifactHandle::new(format!("seg_{}.mp4", number))),
        timing: Some(SegmentTiming {
            start_secs,
            duration_secs,
            audio_secs: Some(duration_secs),
            caption_window: None,
            visual_fit: VisualFit::Held,
        }),
        degraded: None,
    }
}

/// One-lesson job whose outputs are `lesson_0.mp4` and `combined.mp4`.
pub fn rendered_job(scenes: Vec<Scene>) -> Job {
    let mut job = Job::new(
        JobOptions::default(),
        vec![Lesson { index: 0, title: None, scenes, failed: false }],
    );
    job.outputs.lesson_videos[0] = Some(ArtifactHandle::new("lesson_0.mp4"));
    job.outputs.combined = Some(ArtifactHandle::new("combined.mp4"));
    job
}

pub fn test_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        output_dir: output_dir.to_path_buf(),
        max_in_flight_calls: 4,
        max_concurrent_scenes: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
        },
        timeouts: CallTimeouts {
            image: Duration::from_secs(5),
            speech: Duration::from_secs(5),
            avatar: Duration::from_secs(5),
        },
        render: RenderSettings::default(),
    }
}

/// A job manager wired to fakes, with handles to inspect them.
pub struct Harness {
    pub manager: JobManager,
    pub images: Arc<ScriptedGenerator>,
    pub speech: Arc<ScriptedGenerator>,
    pub animator: Arc<ScriptedGenerator>,
    pub media: Arc<FakeMedia>,
    pub dir: tempfile::TempDir,
}

pub struct HarnessBuilder {
    images: ScriptedGenerator,
    speech: ScriptedGenerator,
    animator: ScriptedGenerator,
    media: FakeMedia,
    max_concurrent_scenes: Option<usize>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            images: ScriptedGenerator::new(),
            speech: ScriptedGenerator::new(),
            animator: ScriptedGenerator::new(),
            media: FakeMedia::new(2.0),
            max_concurrent_scenes: None,
        }
    }

    pub fn images(mut self, images: ScriptedGenerator) -> Self {
        self.images = images;
        self
    }

    pub fn speech(mut self, speech: ScriptedGenerator) -> Self {
        self.speech = speech;
        self
    }

    pub fn animator(mut self, animator: ScriptedGenerator) -> Self {
        self.animator = animator;
        self
    }

    pub fn media(mut self, media: FakeMedia) -> Self {
        self.media = media;
        self
    }

    pub fn max_concurrent_scenes(mut self, n: usize) -> Self {
        self.max_concurrent_scenes = Some(n);
        self
    }

    pub fn build(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        if let Some(n) = self.max_concurrent_scenes {
            config.max_concurrent_scenes = n;
        }

        let images = Arc::new(self.images);
        let speech = Arc::new(self.speech);
        let animator = Arc::new(self.animator);
        let media = Arc::new(self.media);

        let validator = QaValidator::new(media.clone(), QaConfig::default(), config.render.resolution);
        let ctx = PipelineContext::new(
            Collaborators {
                images: images.clone(),
                speech: speech.clone(),
                animator: animator.clone(),
            },
            media.clone(),
            validator,
            Arc::new(MemoryJobStore::new()),
            config,
        );
        let characters = Arc::new(MemoryCharacterStore::with_characters([professor()]));

        Harness {
            manager: JobManager::new(Arc::new(ctx), characters),
            images,
            speech,
            animator,
            media,
            dir,
        }
    }
}
