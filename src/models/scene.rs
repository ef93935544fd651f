use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::character::VoiceDescriptor;
use crate::error::SlotError;
use crate::types::VisualFit;

/// Handle to a produced artifact on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactHandle(PathBuf);

impl ArtifactHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// Result slot of one generation stage.
///
/// Transitions are monotonic: `Absent -> Pending -> Present | Failed`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum ArtifactSlot {
    #[default]
    Absent,
    Pending,
    Present(ArtifactHandle),
    Failed(String),
}

impl ArtifactSlot {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactSlot::Absent => "absent",
            ArtifactSlot::Pending => "pending",
            ArtifactSlot::Present(_) => "present",
            ArtifactSlot::Failed(_) => "failed",
        }
    }

    pub fn begin(&mut self) -> Result<(), SlotError> {
        match self {
            ArtifactSlot::Absent => {
                *self = ArtifactSlot::Pending;
                Ok(())
            }
            other => Err(SlotError {
                from: other.label(),
                to: "pending",
            }),
        }
    }

    pub fn resolve(&mut self, handle: ArtifactHandle) -> Result<(), SlotError> {
        match self {
            ArtifactSlot::Pending => {
                *self = ArtifactSlot::Present(handle);
                Ok(())
            }
            other => Err(SlotError {
                from: other.label(),
                to: "present",
            }),
        }
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), SlotError> {
        match self {
            ArtifactSlot::Pending => {
                *self = ArtifactSlot::Failed(reason.into());
                Ok(())
            }
            other => Err(SlotError {
                from: other.label(),
                to: "failed",
            }),
        }
    }

    pub fn handle(&self) -> Option<&ArtifactHandle> {
        match self {
            ArtifactSlot::Present(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ArtifactSlot::Failed(_))
    }
}

/// Generation stage of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Image,
    Audio,
    Avatar,
    Segment,
}

/// Scene as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSpec {
    pub scene_number: u32,
    #[serde(alias = "duration_secs")]
    pub duration: f64,
    pub dialogue: String,
    pub character: String,
    #[serde(alias = "visual_prompt")]
    pub visual: String,
    #[serde(default, alias = "captions")]
    pub caption: Option<String>,
    /// Overrides the stored voice for this character; must agree across the job.
    #[serde(default)]
    pub voice: Option<VoiceDescriptor>,
    /// Overrides the stored avatar image; must agree across the job.
    #[serde(default)]
    pub avatar_image: Option<PathBuf>,
}

/// Caption display window relative to the segment start, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptionWindow {
    pub start_secs: f64,
    pub end_secs: f64,
}

impl CaptionWindow {
    pub fn length(&self) -> f64 {
        self.end_secs - self.start_secs
    }
}

/// Where and how a composed segment sits inside its lesson video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentTiming {
    /// Offset of the segment inside the lesson video; set at concatenation.
    pub start_secs: f64,
    pub duration_secs: f64,
    pub audio_secs: Option<f64>,
    pub caption_window: Option<CaptionWindow>,
    pub visual_fit: VisualFit,
}

/// Scene record owned by the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub duration_secs: f64,
    pub dialogue: String,
    pub character: String,
    pub voice: VoiceDescriptor,
    pub avatar_image: Option<PathBuf>,
    pub visual_prompt: String,
    pub caption: Option<String>,
    pub image: ArtifactSlot,
    pub audio: ArtifactSlot,
    pub avatar_clip: ArtifactSlot,
    pub segment: ArtifactSlot,
    pub timing: Option<SegmentTiming>,
    /// Set when a placeholder replaced the scene.
    pub degraded: Option<String>,
}

impl Scene {
    pub fn slot_mut(&mut self, stage: Stage) -> &mut ArtifactSlot {
        match stage {
            Stage::Image => &mut self.image,
            Stage::Audio => &mut self.audio,
            Stage::Avatar => &mut self.avatar_clip,
            Stage::Segment => &mut self.segment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_moves_forward_only() {
        let mut slot = ArtifactSlot::default();
        assert!(slot.resolve(ArtifactHandle::new("/tmp/a.png")).is_err());
        slot.begin().unwrap();
        assert!(slot.begin().is_err());
        slot.resolve(ArtifactHandle::new("/tmp/a.png")).unwrap();
        assert_eq!(slot.handle().unwrap().path(), Path::new("/tmp/a.png"));

        let err = slot.fail("late failure").unwrap_err();
        assert_eq!(err, SlotError { from: "present", to: "failed" });
    }

    #[test]
    fn test_failed_slot_is_terminal() {
        let mut slot = ArtifactSlot::default();
        slot.begin().unwrap();
        slot.fail("invalid prompt").unwrap();
        assert!(slot.is_failed());
        assert!(slot.begin().is_err());
        assert!(slot.resolve(ArtifactHandle::new("x")).is_err());
    }

    #[test]
    fn test_scene_spec_accepts_script_field_names() {
        let spec: SceneSpec = serde_json::from_str(
            r#"{"scene_number": 1, "duration": 5, "visual": "a cell", "character": "Professor Alex",
                "dialogue": "Cells are small.", "captions": "Cells"}"#,
        )
        .unwrap();
        assert_eq!(spec.caption.as_deref(), Some("Cells"));
        assert_eq!(spec.duration, 5.0);
        assert!(spec.voice.is_none());
    }
}
