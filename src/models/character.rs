use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceStyle {
    Professional,
    Friendly,
    Energetic,
    Calm,
    Confident,
    Playful,
    Narrative,
    Technical,
}

/// Gender × style pair that routes to exactly one synthesizer voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceDescriptor {
    pub gender: Gender,
    pub style: VoiceStyle,
}

impl VoiceDescriptor {
    pub fn new(gender: Gender, style: VoiceStyle) -> Self {
        Self { gender, style }
    }

    /// Concrete voice name used by the speech synthesizer.
    pub fn voice_name(&self) -> &'static str {
        use Gender::*;
        use VoiceStyle::*;
        match (self.gender, self.style) {
            (Male, Professional | Calm | Confident | Technical) => "onyx",
            (Male, Friendly | Narrative) => "echo",
            (Male, Energetic | Playful) => "fable",
            (Female, Professional | Calm | Confident | Narrative | Technical) => "nova",
            (Female, Friendly | Playful) => "shimmer",
            (Female, Energetic) => "alloy",
            (Neutral, Professional | Confident | Narrative | Technical) => "alloy",
            (Neutral, Friendly) => "fable",
            (Neutral, Energetic | Playful) => "echo",
            (Neutral, Calm) => "shimmer",
        }
    }
}

impl fmt::Display for VoiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}_{:?}", self.gender, self.style)
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "neutral" => Ok(Gender::Neutral),
            other => Err(format!("unknown gender: {}", other)),
        }
    }
}

impl FromStr for VoiceStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "professional" => Ok(VoiceStyle::Professional),
            "friendly" => Ok(VoiceStyle::Friendly),
            "energetic" => Ok(VoiceStyle::Energetic),
            "calm" => Ok(VoiceStyle::Calm),
            "confident" => Ok(VoiceStyle::Confident),
            "playful" => Ok(VoiceStyle::Playful),
            "narrative" => Ok(VoiceStyle::Narrative),
            "technical" => Ok(VoiceStyle::Technical),
            other => Err(format!("unknown voice style: {}", other)),
        }
    }
}

/// Character as returned by the character store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub voice: VoiceDescriptor,
    #[serde(default)]
    pub avatar_image: Option<PathBuf>,
}
