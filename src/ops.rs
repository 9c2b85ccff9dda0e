// src/ops.rs
//
// Settings snapshots handed to the core by the UI collaborator.
// These are cheap Copy values - the core never mutates them.

use crate::error::{QualityLensError, Result};
use image::ImageFormat;

/// Lossy quality level, always within 1..=100.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quality(u8);

impl Quality {
    pub const MIN: Quality = Quality(1);
    pub const MAX: Quality = Quality(100);

    /// Validate a raw quality value. Anything outside 1..=100 is rejected.
    pub fn new(value: i64) -> Result<Self> {
        if (1..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(QualityLensError::invalid_quality(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_max(self) -> bool {
        self.0 == 100
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

impl TryFrom<u8> for Quality {
    type Error = QualityLensError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value as i64)
    }
}

/// One snapshot of the user's compression settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CompressionSettings {
    pub quality: Quality,
    /// None = unconstrained
    pub max_width: Option<u32>,
    /// None = unconstrained
    pub max_height: Option<u32>,
}

impl CompressionSettings {
    pub fn new(quality: Quality) -> Self {
        Self {
            quality,
            max_width: None,
            max_height: None,
        }
    }

    pub fn with_max_width(mut self, max_width: Option<u32>) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_max_height(mut self, max_height: Option<u32>) -> Self {
        self.max_height = max_height;
        self
    }

    /// Reject zero max dimensions; `None` stays unconstrained.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == Some(0) {
            return Err(QualityLensError::invalid_dimension("max_width", 0));
        }
        if self.max_height == Some(0) {
            return Err(QualityLensError::invalid_dimension("max_height", 0));
        }
        Ok(())
    }
}

/// Format the source bytes were decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Bmp,
}

impl SourceFormat {
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::WebP => Some(Self::WebP),
            ImageFormat::Gif => Some(Self::Gif),
            ImageFormat::Bmp => Some(Self::Bmp),
            _ => None,
        }
    }

    /// Whether the container can carry transparency. This drives the
    /// white-flattening rule, independent of the actual pixel alpha values.
    pub fn supports_alpha(self) -> bool {
        match self {
            Self::Jpeg => false,
            Self::Png | Self::WebP | Self::Gif | Self::Bmp => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
        }
    }
}
