// src/models/mod.rs
//! Job, scene, character and QA records.

pub mod character;
pub mod job;
pub mod qa;
pub mod scene;

pub use character::{Character, Gender, VoiceDescriptor, VoiceStyle};
pub use job::{
    DegradedScene, Job, JobId, JobOptions, JobOutputs, JobSpec, JobStatus, JobStatusView, Lesson,
    LessonSpec, QualityTier, ScenePos,
};
pub use qa::{CheckResult, FlaggedScene, QaChecks, QaReport};
pub use scene::{
    ArtifactHandle, ArtifactSlot, CaptionWindow, Scene, SceneSpec, SegmentTiming, Stage,
};
