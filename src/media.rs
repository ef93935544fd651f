// src/media.rs
//! Media backend: probing, segment rendering, concatenation and the frame /
//! audio sampling the QA checks rely on.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::DynamicImage;
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;

use crate::compositor::{encode_args, SegmentPlan};
use crate::config::RenderSettings;
use crate::error::MediaError;
use crate::types::{Region, VideoMetadata};
use crate::utils::{
    build_crop_filter, ensure_output_directory, execute_ffmpeg_command, execute_ffprobe_command,
    format_secs,
};

/// Leading silence shorter than this is treated as speech starting at zero.
const ONSET_EPSILON_SECS: f64 = 0.05;

#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, MediaError>;

    async fn render_segment(&self, plan: &SegmentPlan) -> Result<(), MediaError>;

    async fn render_placeholder(
        &self,
        output: &Path,
        duration_secs: f64,
        render: &RenderSettings,
    ) -> Result<(), MediaError>;

    /// Join `inputs` in order into `output`.
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError>;

    /// Seconds from `start_secs` until speech is first audible, or `None`
    /// when the window holds no speech.
    async fn speech_onset(
        &self,
        path: &Path,
        start_secs: f64,
        window_secs: f64,
        noise_db: f64,
    ) -> Result<Option<f64>, MediaError>;

    /// Decode a single frame, optionally cropped to `region`.
    async fn sample_frame(
        &self,
        path: &Path,
        at_secs: f64,
        region: Option<Region>,
    ) -> Result<DynamicImage, MediaError>;
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
    format_name: Option<String>,
}

/// Turn ffprobe JSON into [`VideoMetadata`].
pub fn parse_probe_output(json: &str, file_path: &Path) -> Result<VideoMetadata, MediaError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| MediaError::ParseError(e.to_string()))?;

    let format = probe.format.as_ref();
    let duration_seconds = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let file_size_mb = format
        .and_then(|f| f.size.as_deref())
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
        / (1024.0 * 1024.0);

    let mut metadata = VideoMetadata {
        file_path: file_path.to_string_lossy().to_string(),
        duration_seconds,
        width: 0,
        height: 0,
        fps: 0.0,
        has_audio: false,
        has_video: false,
        format: format
            .and_then(|f| f.format_name.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        file_size_mb,
    };

    for stream in &probe.streams {
        match stream.codec_type.as_deref() {
            Some("video") if !metadata.has_video => {
                metadata.has_video = true;
                metadata.width = stream.width.unwrap_or(0);
                metadata.height = stream.height.unwrap_or(0);
                metadata.fps = stream
                    .r_frame_rate
                    .as_deref()
                    .map(parse_frame_rate)
                    .unwrap_or(0.0);
            }
            Some("audio") => metadata.has_audio = true,
            _ => {}
        }
    }

    Ok(metadata)
}

fn parse_frame_rate(rate: &str) -> f64 {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f64>().unwrap_or(0.0);
            let den = den.parse::<f64>().unwrap_or(1.0);
            if den == 0.0 {
                0.0
            } else {
                num / den
            }
        }
        None => rate.parse::<f64>().unwrap_or(0.0),
    }
}

/// Speech onset from `silencedetect` output.
///
/// Silence starting at the window start means speech begins at the matching
/// `silence_end`; silence that never ends means no speech at all. No leading
/// silence means speech starts immediately.
pub fn parse_speech_onset(stderr: &str, window_secs: f64) -> Option<f64> {
    let event = Regex::new(r"silence_(start|end): (-?[0-9]+(?:\.[0-9]+)?)").ok()?;

    let mut events = event.captures_iter(stderr).filter_map(|caps| {
        let value = caps.get(2)?.as_str().parse::<f64>().ok()?;
        Some((caps.get(1)?.as_str() == "start", value))
    });

    match events.next() {
        None => Some(0.0),
        Some((true, start)) if start <= ONSET_EPSILON_SECS => match events.next() {
            Some((false, end)) if end < window_secs - ONSET_EPSILON_SECS => Some(end.max(0.0)),
            _ => None,
        },
        Some(_) => Some(0.0),
    }
}

/// FFmpeg-backed media operations.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MediaBackend for FfmpegBackend {
    async fn probe(&self, path: &Path) -> Result<VideoMetadata, MediaError> {
        let args = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ];
        let stdout = execute_ffprobe_command(&args, path).await?;
        parse_probe_output(&stdout, path)
    }

    async fn render_segment(&self, plan: &SegmentPlan) -> Result<(), MediaError> {
        let mut command = Command::new("ffmpeg");
        command.args(["-hide_banner", "-loglevel", "error"]);
        command.args(plan.ffmpeg_args());
        execute_ffmpeg_command(command).await?;
        Ok(())
    }

    async fn render_placeholder(
        &self,
        output: &Path,
        duration_secs: f64,
        render: &RenderSettings,
    ) -> Result<(), MediaError> {
        let duration = format_secs(duration_secs);
        let color = format!(
            "color=c=black:s={}x{}:r={}:d={}",
            render.resolution.width, render.resolution.height, render.fps, duration
        );

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "lavfi", "-i", color.as_str()])
            .args(["-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo"])
            .args(["-t", duration.as_str()])
            .args(encode_args(render))
            .arg("-y")
            .arg(output);
        execute_ffmpeg_command(command).await?;
        Ok(())
    }

    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<(), MediaError> {
        ensure_output_directory(output).await?;

        let mut list = String::new();
        for input in inputs {
            let absolute = tokio::fs::canonicalize(input).await?;
            let escaped = absolute.to_string_lossy().replace('\'', "'\\''");
            list.push_str(&format!("file '{}'\n", escaped));
        }
        let list_path = output.with_extension("concat.txt");
        tokio::fs::write(&list_path, list).await?;

        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy", "-y"])
            .arg(output);
        let result = execute_ffmpeg_command(command).await;

        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            tracing::warn!("Failed to remove concat list {}: {}", list_path.display(), e);
        }
        result.map(|_| ())
    }

    async fn speech_onset(
        &self,
        path: &Path,
        start_secs: f64,
        window_secs: f64,
        noise_db: f64,
    ) -> Result<Option<f64>, MediaError> {
        let filter = format!("silencedetect=noise={}dB:d=0.1", noise_db);
        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-nostats"])
            .args(["-ss", format_secs(start_secs).as_str(), "-t", format_secs(window_secs).as_str()])
            .arg("-i")
            .arg(path)
            .args(["-vn", "-af", filter.as_str(), "-f", "null", "-"]);
        let output = execute_ffmpeg_command(command).await?;
        Ok(parse_speech_onset(&output.stderr, window_secs))
    }

    async fn sample_frame(
        &self,
        path: &Path,
        at_secs: f64,
        region: Option<Region>,
    ) -> Result<DynamicImage, MediaError> {
        let mut command = Command::new("ffmpeg");
        command
            .args(["-hide_banner", "-loglevel", "error"])
            .args(["-ss", format_secs(at_secs).as_str()])
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1"]);
        if let Some(region) = region {
            command.args(["-vf", build_crop_filter(&region).as_str()]);
        }
        command.args(["-f", "image2pipe", "-vcodec", "png", "-"]);

        let output = execute_ffmpeg_command(command).await?;
        if output.stdout.is_empty() {
            return Err(MediaError::Decode(format!(
                "no frame at {:.3}s in {}",
                at_secs,
                path.display()
            )));
        }
        image::load_from_memory(&output.stdout).map_err(|e| MediaError::Decode(e.to_string()))
    }
}
