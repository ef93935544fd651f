// src/jobs/ingest.rs
//! Submission checks. A spec that fails here never becomes a job.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use crate::error::{JobError, StoreError};
use crate::models::{
    ArtifactSlot, Character, JobSpec, Lesson, Scene, SceneSpec, VoiceDescriptor,
};
use crate::store::CharacterStore;
use crate::types::Layout;

/// What a character resolved to the first time a scene used it.
struct Resolved {
    voice: VoiceDescriptor,
    avatar: Option<PathBuf>,
}

/// Validate a job spec and turn it into lessons with sorted, resolved scenes.
pub async fn build_lessons(
    spec: &JobSpec,
    characters: &dyn CharacterStore,
) -> Result<Vec<Lesson>, JobError> {
    if spec.lessons.is_empty() {
        return Err(JobError::Malformed("job has no lessons".to_string()));
    }

    let show_avatars = spec.options.layout == Layout::AvatarSplit;
    let mut known: HashMap<String, Character> = HashMap::new();
    let mut resolved: HashMap<String, Resolved> = HashMap::new();
    let mut lessons = Vec::with_capacity(spec.lessons.len());

    for (index, lesson) in spec.lessons.iter().enumerate() {
        if lesson.scenes.is_empty() {
            return Err(JobError::Malformed(format!("lesson {} has no scenes", index)));
        }

        let mut seen = HashSet::new();
        let mut scenes = Vec::with_capacity(lesson.scenes.len());
        for spec_scene in &lesson.scenes {
            check_scene(index, spec_scene)?;
            if !seen.insert(spec_scene.scene_number) {
                return Err(JobError::Malformed(format!(
                    "lesson {} repeats scene number {}",
                    index, spec_scene.scene_number
                )));
            }

            let name = spec_scene.character.trim();
            if !known.contains_key(name) {
                let character = characters.get_character(name).await.map_err(|e| match e {
                    StoreError::CharacterNotFound(name) => JobError::CharacterNotFound(name),
                    other => JobError::Storage(other),
                })?;
                known.insert(name.to_string(), character);
            }
            let character = &known[name];

            let voice = spec_scene.voice.unwrap_or(character.voice);
            let avatar = spec_scene
                .avatar_image
                .clone()
                .or_else(|| character.avatar_image.clone());

            match resolved.get(name) {
                Some(first) => {
                    if first.voice != voice {
                        return Err(JobError::InconsistentCharacter {
                            name: name.to_string(),
                            field: "voice",
                        });
                    }
                    if show_avatars && first.avatar != avatar {
                        return Err(JobError::InconsistentCharacter {
                            name: name.to_string(),
                            field: "avatar_image",
                        });
                    }
                }
                None => {
                    if show_avatars && avatar.is_none() {
                        return Err(JobError::Malformed(format!(
                            "character {} has no avatar image for the avatar_split layout",
                            name
                        )));
                    }
                    resolved.insert(
                        name.to_string(),
                        Resolved {
                            voice,
                            avatar: avatar.clone(),
                        },
                    );
                }
            }

            scenes.push(Scene {
                scene_number: spec_scene.scene_number,
                duration_secs: spec_scene.duration,
                dialogue: spec_scene.dialogue.trim().to_string(),
                character: name.to_string(),
                voice,
                avatar_image: avatar,
                visual_prompt: spec_scene.visual.trim().to_string(),
                caption: spec_scene
                    .caption
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string),
                image: ArtifactSlot::Absent,
                audio: ArtifactSlot::Absent,
                avatar_clip: ArtifactSlot::Absent,
                segment: ArtifactSlot::Absent,
                timing: None,
                degraded: None,
            });
        }

        scenes.sort_by_key(|s| s.scene_number);
        lessons.push(Lesson {
            index,
            title: lesson.title.clone(),
            scenes,
            failed: false,
        });
    }

    Ok(lessons)
}

fn check_scene(lesson: usize, scene: &SceneSpec) -> Result<(), JobError> {
    let problem = if !(scene.duration.is_finite() && scene.duration > 0.0) {
        Some(format!("duration must be positive, got {}", scene.duration))
    } else if scene.dialogue.trim().is_empty() {
        Some("dialogue is empty".to_string())
    } else if scene.visual.trim().is_empty() {
        Some("visual prompt is empty".to_string())
    } else if scene.character.trim().is_empty() {
        Some("character is empty".to_string())
    } else {
        None
    };

    match problem {
        Some(problem) => Err(JobError::Malformed(format!(
            "lesson {} scene {}: {}",
            lesson, scene.scene_number, problem
        ))),
        None => Ok(()),
    }
}
