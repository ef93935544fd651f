// src/compositor.rs
//! Scene compositor: renders one timed segment per scene.
//!
//! Segment length is `max(target, audio)`. Audio is never cut; it is padded
//! with silence up to the segment end. Stills are held for the whole
//! segment, avatar clips shorter than the segment are looped and longer
//! clips are cut at the segment end. Captions stay on screen for the whole
//! segment, anchored to the bottom of the frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::RenderSettings;
use crate::error::CompositorError;
use crate::media::MediaBackend;
use crate::models::{ArtifactHandle, CaptionWindow, SegmentTiming};
use crate::types::{Layout, VisualFit};
use crate::utils::{build_fill_filter, escape_filter_path, format_secs};

/// Clip lengths within this many seconds of the segment count as equal.
const FIT_EPSILON_SECS: f64 = 0.04;

/// Avatar visual as handed to the compositor.
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarInput {
    None,
    Still(PathBuf),
    Clip(PathBuf),
}

/// Avatar visual once its length is known.
#[derive(Debug, Clone, PartialEq)]
pub enum AvatarSource {
    None,
    Still(PathBuf),
    Clip { path: PathBuf, duration_secs: f64 },
}

#[derive(Debug, Clone)]
pub struct SceneRenderInput {
    pub image: PathBuf,
    pub audio: PathBuf,
    pub avatar: AvatarInput,
    pub caption: Option<String>,
    pub target_secs: f64,
}

/// Fully resolved render instructions for one segment.
#[derive(Debug, Clone)]
pub struct SegmentPlan {
    pub output: PathBuf,
    pub layout: Layout,
    pub duration_secs: f64,
    pub audio_secs: f64,
    pub image: PathBuf,
    pub audio: PathBuf,
    pub avatar: AvatarSource,
    pub visual_fit: VisualFit,
    pub caption_text: Option<String>,
    pub caption_file: Option<PathBuf>,
    pub caption_window: Option<CaptionWindow>,
    pub render: RenderSettings,
}

/// Decide segment length, visual fitting and caption window.
pub fn plan_segment(
    input: &SceneRenderInput,
    avatar: AvatarSource,
    audio_secs: f64,
    layout: Layout,
    render: &RenderSettings,
    output: &Path,
) -> Result<SegmentPlan, CompositorError> {
    let duration_secs = input.target_secs.max(audio_secs);

    let (avatar, visual_fit) = match layout {
        Layout::FullScreen => (AvatarSource::None, VisualFit::Held),
        Layout::AvatarSplit => {
            let fit = match &avatar {
                AvatarSource::None => return Err(CompositorError::MissingAvatar),
                AvatarSource::Still(_) => VisualFit::Held,
                AvatarSource::Clip { duration_secs: clip, .. } => {
                    if *clip + FIT_EPSILON_SECS < duration_secs {
                        VisualFit::Looped
                    } else if *clip > duration_secs + FIT_EPSILON_SECS {
                        VisualFit::Trimmed
                    } else {
                        VisualFit::Native
                    }
                }
            };
            (avatar, fit)
        }
    };

    let caption_text = input
        .caption
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let caption_window = caption_text.as_ref().map(|_| CaptionWindow {
        start_secs: 0.0,
        end_secs: duration_secs,
    });
    let caption_file = caption_text
        .as_ref()
        .map(|_| output.with_extension("caption.txt"));

    Ok(SegmentPlan {
        output: output.to_path_buf(),
        layout,
        duration_secs,
        audio_secs,
        image: input.image.clone(),
        audio: input.audio.clone(),
        avatar,
        visual_fit,
        caption_text,
        caption_file,
        caption_window,
        render: render.clone(),
    })
}

/// Encoder settings shared by every segment so concatenation can stream-copy.
pub fn encode_args(render: &RenderSettings) -> Vec<String> {
    let fps = render.fps.to_string();
    [
        "-c:v", "libx264", "-preset", "veryfast", "-pix_fmt", "yuv420p",
        "-r", fps.as_str(),
        "-c:a", "aac", "-ar", "44100", "-ac", "2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl SegmentPlan {
    fn audio_input_index(&self) -> usize {
        match self.layout {
            Layout::FullScreen => 1,
            Layout::AvatarSplit => 2,
        }
    }

    pub fn filter_graph(&self) -> String {
        let res = self.render.resolution;
        let fps = self.render.fps;
        let mut graph = match self.layout {
            Layout::FullScreen => format!(
                "[0:v]{},fps={},format=yuv420p[base]",
                build_fill_filter(&res.full_frame()),
                fps
            ),
            Layout::AvatarSplit => {
                let (avatar, content) = res.split_regions();
                format!(
                    "[1:v]{}[avatar];[0:v]{}[content];[avatar][content]hstack=inputs=2,fps={},format=yuv420p[base]",
                    build_fill_filter(&avatar),
                    build_fill_filter(&content),
                    fps
                )
            }
        };

        match &self.caption_file {
            Some(file) => graph.push_str(&format!(
                ";[base]drawtext=textfile='{}':fontcolor=white:fontsize={}:borderw=2:bordercolor=black:line_spacing=6:x=(w-text_w)/2:y=h-text_h-60:enable='between(t,0,{})'[v]",
                escape_filter_path(file),
                self.render.font_size,
                format_secs(self.duration_secs)
            )),
            None => graph.push_str(";[base]null[v]"),
        }

        graph.push_str(&format!(";[{}:a]apad[a]", self.audio_input_index()));
        graph
    }

    pub fn ffmpeg_args(&self) -> Vec<String> {
        let duration = format_secs(self.duration_secs);
        let fps = self.render.fps.to_string();
        let mut args: Vec<String> = Vec::new();

        let still = |args: &mut Vec<String>, path: &Path| {
            args.extend(["-loop", "1", "-framerate", fps.as_str(), "-t", duration.as_str()].map(String::from));
            args.push("-i".into());
            args.push(path.to_string_lossy().to_string());
        };

        still(&mut args, &self.image);
        match &self.avatar {
            AvatarSource::None => {}
            AvatarSource::Still(path) => still(&mut args, path),
            AvatarSource::Clip { path, .. } => {
                if self.visual_fit == VisualFit::Looped {
                    args.extend(["-stream_loop", "-1"].map(String::from));
                }
                args.push("-i".into());
                args.push(path.to_string_lossy().to_string());
            }
        }
        args.push("-i".into());
        args.push(self.audio.to_string_lossy().to_string());

        args.push("-filter_complex".into());
        args.push(self.filter_graph());
        args.extend(["-map", "[v]", "-map", "[a]", "-t", duration.as_str()].map(String::from));
        args.extend(encode_args(&self.render));
        args.push("-y".into());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    pub fn timing(&self) -> SegmentTiming {
        SegmentTiming {
            start_secs: 0.0,
            duration_secs: self.duration_secs,
            audio_secs: Some(self.audio_secs),
            caption_window: self.caption_window,
            visual_fit: self.visual_fit,
        }
    }
}

/// Break caption text into lines of at most `max_chars` characters.
pub fn wrap_caption(text: &str, max_chars: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() { word.chars().count() } else { current.chars().count() + 1 + word.chars().count() };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct RenderedSegment {
    pub handle: ArtifactHandle,
    pub timing: SegmentTiming,
}

pub struct SceneCompositor {
    media: Arc<dyn MediaBackend>,
    render: RenderSettings,
}

impl SceneCompositor {
    pub fn new(media: Arc<dyn MediaBackend>, render: RenderSettings) -> Self {
        Self { media, render }
    }

    /// Render one scene into `output`.
    pub async fn compose(
        &self,
        input: &SceneRenderInput,
        layout: Layout,
        output: &Path,
    ) -> Result<RenderedSegment, CompositorError> {
        let audio_secs = self.media.probe(&input.audio).await?.duration_seconds;

        let avatar = match (&input.avatar, layout) {
            (_, Layout::FullScreen) | (AvatarInput::None, _) => AvatarSource::None,
            (AvatarInput::Still(path), _) => AvatarSource::Still(path.clone()),
            (AvatarInput::Clip(path), _) => {
                let duration_secs = self.media.probe(path).await?.duration_seconds;
                AvatarSource::Clip {
                    path: path.clone(),
                    duration_secs,
                }
            }
        };

        let plan = plan_segment(input, avatar, audio_secs, layout, &self.render, output)?;

        crate::utils::ensure_output_directory(output).await?;
        if let (Some(file), Some(text)) = (&plan.caption_file, &plan.caption_text) {
            let max_chars = (self.render.resolution.width.saturating_sub(120) / (self.render.font_size / 2).max(1)) as usize;
            tokio::fs::write(file, wrap_caption(text, max_chars.max(10)))
                .await
                .map_err(crate::error::MediaError::from)?;
        }

        self.media.render_segment(&plan).await?;

        tracing::debug!(
            output = %output.display(),
            duration_secs = plan.duration_secs,
            audio_secs = plan.audio_secs,
            fit = ?plan.visual_fit,
            "composed segment"
        );

        Ok(RenderedSegment {
            handle: ArtifactHandle::new(output),
            timing: plan.timing(),
        })
    }

    /// Black, silent stand-in for a failed scene.
    pub async fn render_placeholder(
        &self,
        duration_secs: f64,
        output: &Path,
    ) -> Result<RenderedSegment, CompositorError> {
        crate::utils::ensure_output_directory(output).await?;
        self.media
            .render_placeholder(output, duration_secs, &self.render)
            .await?;
        Ok(RenderedSegment {
            handle: ArtifactHandle::new(output),
            timing: SegmentTiming {
                start_secs: 0.0,
                duration_secs,
                audio_secs: None,
                caption_window: None,
                visual_fit: VisualFit::Placeholder,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(target: f64, caption: Option<&str>) -> SceneRenderInput {
        SceneRenderInput {
            image: PathBuf::from("/w/scene_1.png"),
            audio: PathBuf::from("/w/scene_1.mp3"),
            avatar: AvatarInput::Still(PathBuf::from("/w/avatar.png")),
            caption: caption.map(String::from),
            target_secs: target,
        }
    }

    fn still() -> AvatarSource {
        AvatarSource::Still(PathBuf::from("/w/avatar.png"))
    }

    #[test]
    fn test_audio_longer_than_target_extends_segment() {
        let plan = plan_segment(&input(5.0, None), still(), 7.25, Layout::AvatarSplit, &RenderSettings::default(), Path::new("/w/seg.mp4")).unwrap();
        assert_eq!(plan.duration_secs, 7.25);
        assert_eq!(plan.visual_fit, VisualFit::Held);
    }

    #[test]
    fn test_short_audio_keeps_target_duration() {
        let plan = plan_segment(&input(5.0, None), still(), 3.0, Layout::FullScreen, &RenderSettings::default(), Path::new("/w/seg.mp4")).unwrap();
        assert_eq!(plan.duration_secs, 5.0);
        assert_eq!(plan.avatar, AvatarSource::None);
        assert!(plan.ffmpeg_args().contains(&"5.000".to_string()));
    }

    #[test]
    fn test_clip_fitting_is_deterministic() {
        let clip = |d: f64| AvatarSource::Clip { path: PathBuf::from("/w/talk.mp4"), duration_secs: d };
        let settings = RenderSettings::default();
        let out = Path::new("/w/seg.mp4");

        let looped = plan_segment(&input(6.0, None), clip(2.0), 4.0, Layout::AvatarSplit, &settings, out).unwrap();
        assert_eq!(looped.visual_fit, VisualFit::Looped);
        assert!(looped.ffmpeg_args().windows(2).any(|w| w == ["-stream_loop", "-1"]));

        let trimmed = plan_segment(&input(3.0, None), clip(9.0), 3.0, Layout::AvatarSplit, &settings, out).unwrap();
        assert_eq!(trimmed.visual_fit, VisualFit::Trimmed);
        assert_eq!(trimmed.duration_secs, 3.0);

        let native = plan_segment(&input(3.0, None), clip(4.0), 4.0, Layout::AvatarSplit, &settings, out).unwrap();
        assert_eq!(native.visual_fit, VisualFit::Native);
    }

    #[test]
    fn test_split_requires_avatar() {
        let err = plan_segment(&input(3.0, None), AvatarSource::None, 2.0, Layout::AvatarSplit, &RenderSettings::default(), Path::new("/w/seg.mp4"));
        assert!(matches!(err, Err(CompositorError::MissingAvatar)));
    }

    #[test]
    fn test_split_filter_graph_regions_and_caption() {
        let plan = plan_segment(&input(4.0, Some("Mitochondria make energy")), still(), 2.0, Layout::AvatarSplit, &RenderSettings::default(), Path::new("/w/seg.mp4")).unwrap();
        let graph = plan.filter_graph();
        assert!(graph.contains("[1:v]scale=480:1080"));
        assert!(graph.contains("[0:v]scale=1440:1080"));
        assert!(graph.contains("hstack=inputs=2"));
        assert!(graph.contains("textfile='/w/seg.caption.txt'"));
        assert!(graph.contains("between(t,0,4.000)"));
        assert!(graph.ends_with("[2:a]apad[a]"));

        let window = plan.caption_window.unwrap();
        assert_eq!(window.start_secs, 0.0);
        assert_eq!(window.end_secs, 4.0);
    }

    #[test]
    fn test_blank_caption_is_dropped() {
        let plan = plan_segment(&input(4.0, Some("   ")), still(), 2.0, Layout::FullScreen, &RenderSettings::default(), Path::new("/w/seg.mp4")).unwrap();
        assert!(plan.caption_window.is_none());
        assert!(plan.filter_graph().contains("[base]null[v]"));
        assert!(plan.filter_graph().ends_with("[1:a]apad[a]"));
    }

    #[test]
    fn test_wrap_caption() {
        assert_eq!(wrap_caption("one two three four", 9), "one two\nthree\nfour");
        assert_eq!(wrap_caption("", 9), "");
    }
}
