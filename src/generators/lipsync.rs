// src/generators/lipsync.rs
//! Lip-sync animation through an external program.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::AvatarAnimator;
use crate::error::GeneratorError;
use crate::models::ArtifactHandle;

/// Runs a configured lip-sync program. The template is split on whitespace
/// and `{image}`, `{audio}` and `{output}` are substituted per argument, e.g.
/// `python inference.py --source_image {image} --driven_audio {audio} --result {output}`.
#[derive(Debug, Clone)]
pub struct CommandAnimator {
    template: Vec<String>,
}

impl CommandAnimator {
    pub fn new(template: &str) -> Self {
        Self {
            template: template.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn build_args(&self, still: &Path, audio: &Path, dest: &Path) -> Vec<String> {
        self.template
            .iter()
            .map(|part| {
                part.replace("{image}", &still.to_string_lossy())
                    .replace("{audio}", &audio.to_string_lossy())
                    .replace("{output}", &dest.to_string_lossy())
            })
            .collect()
    }
}

#[async_trait]
impl AvatarAnimator for CommandAnimator {
    async fn animate(
        &self,
        still: &Path,
        audio: &Path,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        let args = self.build_args(still, audio, dest);
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| GeneratorError::ModelUnavailable("empty lip-sync command".to_string()))?;

        tracing::debug!("🎭 Running lip-sync: {} {:?}", program, rest);
        let output = Command::new(program)
            .args(rest)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GeneratorError::ModelUnavailable(format!("{}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr.lines().rev().take(5).collect::<Vec<_>>().join(" | ");
            return Err(GeneratorError::Rejected(format!(
                "lip-sync exited with {:?}: {}",
                output.status.code(),
                tail
            )));
        }

        if !tokio::fs::try_exists(dest).await.unwrap_or(false) {
            return Err(GeneratorError::Artifact {
                path: dest.to_path_buf(),
                message: "lip-sync finished without writing a clip".to_string(),
            });
        }
        Ok(ArtifactHandle::new(dest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_are_substituted() {
        let animator = CommandAnimator::new("lipsync --face {image} --audio {audio} --out={output}");
        let args = animator.build_args(Path::new("/a/face.png"), Path::new("/a/line.mp3"), Path::new("/a/clip.mp4"));
        assert_eq!(
            args,
            vec!["lipsync", "--face", "/a/face.png", "--audio", "/a/line.mp3", "--out=/a/clip.mp4"]
        );
    }

    #[tokio::test]
    async fn test_missing_program_is_permanent() {
        let animator = CommandAnimator::new("definitely-not-a-lipsync-binary {image}");
        let err = animator
            .animate(Path::new("a.png"), Path::new("a.mp3"), Path::new("o.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, GeneratorError::ModelUnavailable(_)));
    }
}
