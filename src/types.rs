// types.rs - Media data structures shared by the compositor, backend and QA
use serde::{Deserialize, Serialize};

// Video metadata structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub file_path: String,
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub has_audio: bool,
    pub has_video: bool,
    pub format: String,
    pub file_size_mb: f64,
}

/// Frame layout of a rendered segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// Educational image fills the frame.
    FullScreen,
    /// Avatar in the left quarter, educational image in the right three quarters.
    #[default]
    AvatarSplit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const FULL_HD: Resolution = Resolution {
        width: 1920,
        height: 1080,
    };

    pub fn full_frame(&self) -> Region {
        Region {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// Left avatar column (one quarter of the width) and right content area.
    pub fn split_regions(&self) -> (Region, Region) {
        let avatar_width = self.width / 4;
        let avatar = Region {
            x: 0,
            y: 0,
            width: avatar_width,
            height: self.height,
        };
        let content = Region {
            x: avatar_width,
            y: 0,
            width: self.width - avatar_width,
            height: self.height,
        };
        (avatar, content)
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FULL_HD
    }
}

/// Rectangle inside a frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// How the visual inputs were fitted to the segment duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualFit {
    /// Stills held static for the whole segment.
    Held,
    /// Avatar clip shorter than the segment, looped.
    Looped,
    /// Avatar clip longer than the segment, cut at the segment end.
    Trimmed,
    /// Avatar clip already matches the segment length.
    Native,
    /// Black placeholder frame.
    Placeholder,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_regions_quarter_width() {
        let (avatar, content) = Resolution::FULL_HD.split_regions();
        assert_eq!(avatar.width, 480);
        assert_eq!(content.x, 480);
        assert_eq!(content.width, 1440);
        assert_eq!(avatar.width + content.width, 1920);
    }

    #[test]
    fn test_layout_serde_names() {
        assert_eq!(serde_json::to_string(&Layout::AvatarSplit).unwrap(), "\"avatar_split\"");
        let layout: Layout = serde_json::from_str("\"full_screen\"").unwrap();
        assert_eq!(layout, Layout::FullScreen);
    }
}
