use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on outputs per request; each output is one remote operation.
pub const MAX_OUTPUTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoModel {
    #[default]
    #[serde(rename = "veo-3.1-fast-generate-preview")]
    Veo31Fast,
    #[serde(rename = "veo-3.1-generate-preview")]
    Veo31,
}

impl VideoModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Veo31Fast => "veo-3.1-fast-generate-preview",
            Self::Veo31 => "veo-3.1-generate-preview",
        }
    }

    /// Short family name used when naming exported files.
    pub fn family(&self) -> &'static str {
        "veo"
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "veo-3.1-fast-generate-preview" | "fast" => Some(Self::Veo31Fast),
            "veo-3.1-generate-preview" | "quality" => Some(Self::Veo31),
            _ => None,
        }
    }
}

impl fmt::Display for VideoModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "16:9" => Some(Self::Landscape),
            "9:16" => Some(Self::Portrait),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hd => "720p",
            Self::FullHd => "1080p",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "720p" => Some(Self::Hd),
            "1080p" => Some(Self::FullHd),
            _ => None,
        }
    }
}

/// Image used to seed an image-to-video request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Immutable generation parameters of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: VideoModel,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub number_of_outputs: usize,
    pub source_image: Option<SourceImage>,
}

impl GenerationRequest {
    /// Request with default model/aspect/resolution and a single output.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: VideoModel::default(),
            aspect_ratio: AspectRatio::default(),
            resolution: Resolution::default(),
            number_of_outputs: 1,
            source_image: None,
        }
    }

    pub fn with_outputs(mut self, number_of_outputs: usize) -> Self {
        self.number_of_outputs = number_of_outputs;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        if self.number_of_outputs == 0 || self.number_of_outputs > MAX_OUTPUTS {
            return Err(ValidationError::OutputCount {
                requested: self.number_of_outputs,
                max: MAX_OUTPUTS,
            });
        }
        if let Some(image) = &self.source_image {
            if image.data.is_empty() {
                return Err(ValidationError::EmptySourceImage);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt must not be empty")]
    EmptyPrompt,
    #[error("number of outputs must be between 1 and {max}, got {requested}")]
    OutputCount { requested: usize, max: usize },
    #[error("source image is empty")]
    EmptySourceImage,
}
