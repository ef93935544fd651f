// utils.rs - FFmpeg/FFprobe process helpers and filter builders
use std::path::Path;

use tokio::process::Command;

use crate::error::MediaError;
use crate::types::Region;

/// Captured output of a finished FFmpeg/FFprobe run.
#[derive(Debug)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

/// Execute an FFmpeg command, failing on a non-zero exit status.
pub async fn execute_ffmpeg_command(mut command: Command) -> Result<ToolOutput, MediaError> {
    tracing::debug!("Executing FFmpeg: {:?}", command.as_std());

    let output = command
        .kill_on_drop(true)
        .output()
        .await
        .map_err(MediaError::NotFound)?;

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        return Err(MediaError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr,
        });
    }

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr,
    })
}

/// Execute FFprobe for media analysis, returning stdout.
pub async fn execute_ffprobe_command(args: &[&str], path: &Path) -> Result<String, MediaError> {
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_string_lossy().to_string()));
    }

    let output = Command::new("ffprobe")
        .args(args)
        .arg(path)
        .output()
        .await
        .map_err(MediaError::NotFound)?;

    if !output.status.success() {
        return Err(MediaError::ExecutionFailed {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Check if FFmpeg and FFprobe are available
pub async fn check_ffmpeg_available() -> Result<(), MediaError> {
    for tool in ["ffmpeg", "ffprobe"] {
        Command::new(tool)
            .arg("-version")
            .output()
            .await
            .map_err(MediaError::NotFound)?;
    }
    tracing::info!("✓ FFmpeg and FFprobe are available");
    Ok(())
}

/// Scale-to-fill then crop so the input exactly covers `region`.
pub fn build_fill_filter(region: &Region) -> String {
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
        w = region.width,
        h = region.height
    )
}

/// Build FFmpeg crop filter
pub fn build_crop_filter(region: &Region) -> String {
    format!("crop={}:{}:{}:{}", region.width, region.height, region.x, region.y)
}

/// Escape a path for use inside a single-quoted filter option value.
/// Quoted text is literal, so a quote closes the string, is escaped, and
/// reopens it.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', "'\\''")
}

/// Create output directory if it doesn't exist
pub async fn ensure_output_directory(output_path: &Path) -> Result<(), MediaError> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Format a duration in seconds with millisecond precision for FFmpeg `-t`.
pub fn format_secs(seconds: f64) -> String {
    format!("{:.3}", seconds.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_fill_and_crop_filters() {
        let region = Region { x: 480, y: 0, width: 1440, height: 1080 };
        assert_eq!(
            build_fill_filter(&region),
            "scale=1440:1080:force_original_aspect_ratio=increase,crop=1440:1080,setsar=1"
        );
        assert_eq!(build_crop_filter(&region), "crop=1440:1080:480:0");
    }

    #[test]
    fn test_escape_filter_path() {
        let path = PathBuf::from("/tmp/it's:here.txt");
        assert_eq!(escape_filter_path(&path), "/tmp/it'\\''s:here.txt");
        assert_eq!(
            escape_filter_path(Path::new("/srv/out/scene_1.caption.txt")),
            "/srv/out/scene_1.caption.txt"
        );
    }
}
