// OpenAI-compatible API client
// Supports: image generation, text-to-speech

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ImageGenerator, SpeechSynthesizer};
use crate::error::GeneratorError;
use crate::models::{ArtifactHandle, QualityTier, VoiceDescriptor};

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: Client,
    base_url: String,
    image_model: String,
    speech_model: String,
}

// ============================================================================
// API REQUEST/RESPONSE STRUCTURES
// ============================================================================

#[derive(Serialize, Debug)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub n: u32,
    pub size: String,
    pub quality: String,
    pub response_format: String,
}

#[derive(Deserialize, Debug)]
pub struct ImageGenerationResponse {
    pub data: Vec<ImageData>,
}

#[derive(Deserialize, Debug)]
pub struct ImageData {
    #[serde(default)]
    pub b64_json: Option<String>,
    #[serde(default)]
    pub revised_prompt: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SpeechRequest {
    pub model: String,
    pub input: String,
    pub voice: String,
    pub response_format: String,
}

#[derive(Deserialize, Debug)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Map an HTTP error response to a transient or permanent generator error.
pub fn classify_status(status: u16, body: &str) -> GeneratorError {
    let detail = serde_json::from_str::<ApiErrorBody>(body).ok().map(|b| b.error);
    let code = detail
        .as_ref()
        .and_then(|d| d.code.clone().or_else(|| d.kind.clone()))
        .unwrap_or_default();
    let message = detail
        .map(|d| d.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(300).collect());
    let message = format!("{} ({})", message, status);

    match status {
        _ if code == "insufficient_quota" || code == "billing_hard_limit_reached" => {
            GeneratorError::QuotaExhausted(message)
        }
        402 => GeneratorError::QuotaExhausted(message),
        429 => GeneratorError::RateLimited(message),
        400 | 422 => GeneratorError::InvalidPrompt(message),
        404 => GeneratorError::ModelUnavailable(message),
        408 => GeneratorError::ServiceUnavailable(message),
        500..=599 => GeneratorError::ServiceUnavailable(message),
        _ => GeneratorError::Rejected(message),
    }
}

fn transport_error(e: reqwest::Error) -> GeneratorError {
    if e.is_timeout() {
        GeneratorError::Transport(format!("request timed out: {}", e))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        GeneratorError::Transport(e.to_string())
    } else {
        GeneratorError::Rejected(e.to_string())
    }
}

// ============================================================================
// IMPLEMENTATION
// ============================================================================

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            image_model: "dall-e-3".to_string(),
            speech_model: "tts-1".to_string(),
        }
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        endpoint: &str,
        body: &T,
    ) -> Result<reqwest::Response, GeneratorError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let err = classify_status(status.as_u16(), &error_text);
            tracing::warn!("OpenAI {} error: {}", endpoint, err);
            return Err(err);
        }
        Ok(response)
    }
}

async fn write_artifact(dest: &Path, bytes: &[u8]) -> Result<ArtifactHandle, GeneratorError> {
    let to_error = |e: std::io::Error| GeneratorError::Artifact {
        path: dest.to_path_buf(),
        message: e.to_string(),
    };
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(to_error)?;
    }
    tokio::fs::write(dest, bytes).await.map_err(to_error)?;
    Ok(ArtifactHandle::new(dest))
}

#[async_trait]
impl ImageGenerator for OpenAiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        quality: QualityTier,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        let request = ImageGenerationRequest {
            model: self.image_model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: "1792x1024".to_string(),
            quality: quality.as_str().to_string(),
            response_format: "b64_json".to_string(),
        };

        let response: ImageGenerationResponse = self
            .post_json("images/generations", &request)
            .await?
            .json()
            .await
            .map_err(|e| GeneratorError::Rejected(format!("unreadable image response: {}", e)))?;

        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| GeneratorError::Rejected("no image returned".to_string()))?;
        if let Some(revised) = &image.revised_prompt {
            tracing::debug!("Image prompt revised to: {}", revised);
        }
        let encoded = image
            .b64_json
            .ok_or_else(|| GeneratorError::Rejected("image returned without data".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| GeneratorError::Rejected(format!("invalid image payload: {}", e)))?;

        write_artifact(dest, &bytes).await
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceDescriptor,
        dest: &Path,
    ) -> Result<ArtifactHandle, GeneratorError> {
        let request = SpeechRequest {
            model: self.speech_model.clone(),
            input: text.to_string(),
            voice: voice.voice_name().to_string(),
            response_format: "mp3".to_string(),
        };

        let audio = self
            .post_json("audio/speech", &request)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;
        if audio.is_empty() {
            return Err(GeneratorError::ServiceUnavailable(
                "empty audio response".to_string(),
            ));
        }

        write_artifact(dest, &audio).await
    }
}
