// src/generators/mod.rs
//! External asset generators.
//!
//! Each collaborator writes its artifact to the destination path it is given
//! and reports failures as [`GeneratorError`], already classified as
//! transient or permanent.

pub mod lipsync;
pub mod openai_client;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::GeneratorError;
use crate::models::{ArtifactHandle, QualityTier, VoiceDescriptor};

pub use lipsync::CommandAnimator;
pub use openai_client::OpenAiClient;

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        quality: QualityTier,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceDescriptor,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError>;
}

#[async_trait]
pub trait AvatarAnimator: Send + Sync {
    /// Produce a talking-head clip from a still and a narration track.
    async fn animate(
        &self,
        still: &Path,
        audio: &Path,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError>;
}

/// Animator used when no lip-sync program is configured.
#[derive(Debug, Default)]
pub struct StillImageAnimator;

#[async_trait]
impl AvatarAnimator for StillImageAnimator {
    async fn animate(
        &self,
        _still: &Path,
        _audio: &Path,
        _dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        Err(GeneratorError::ModelUnavailable(
            "no lip-sync program configured".to_string(),
        ))
    }
}

/// Cache key for a narration track: same text and voice, same audio.
pub fn speech_cache_key(text: &str, voice: &VoiceDescriptor) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(b"\0");
    hasher.update(voice.voice_name().as_bytes());
    hasher.update(voice.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Reuses previously synthesized narration from a cache directory.
pub struct CachedSpeech<S> {
    inner: S,
    cache_dir: PathBuf,
}

impl<S: SpeechSynthesizer> CachedSpeech<S> {
    pub fn new(inner: S, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            cache_dir: cache_dir.into(),
        }
    }

    fn cache_path(&self, text: &str, voice: &VoiceDescriptor) -> PathBuf {
        self.cache_dir
            .join(format!("{}.mp3", speech_cache_key(text, voice)))
    }
}

fn artifact_error(path: &Path, e: std::io::Error) -> GeneratorError {
    GeneratorError::Artifact {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

#[async_trait]
impl<S: SpeechSynthesizer> SpeechSynthesizer for CachedSpeech<S> {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceDescriptor,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        let cached = self.cache_path(text, voice);
        if tokio::fs::try_exists(&cached).await.unwrap_or(false) {
            tracing::debug!("🔁 Narration cache hit: {}", cached.display());
            tokio::fs::copy(&cached, dest)
                .await
                .map_err(|e| artifact_error(dest, e))?;
            return Ok(ArtifactHandle::new(dest));
        }

        let handle = self.inner.synthesize(text, voice, dest).await?;

        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            tracing::warn!("Narration cache unavailable: {}", e);
        } else if let Err(e) = tokio::fs::copy(handle.path(), &cached).await {
            tracing::warn!("Failed to cache narration {}: {}", cached.display(), e);
        }
        Ok(handle)
    }
}
