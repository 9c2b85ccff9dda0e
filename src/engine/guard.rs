// src/engine/guard.rs
//
// Input guard: rejects oversize or unsupported sources before the core runs.

use crate::error::{QualityLensError, Result};
use crate::ops::SourceFormat;
use image::ImageFormat;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const LENIENT_MAX_PIXELS: u64 = 75_000_000; // generous but below global MAX_PIXELS
const STRICT_MAX_BYTES: u64 = 32 * 1024 * 1024;
const LENIENT_MAX_BYTES: u64 = 48 * 1024 * 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputPolicyKind {
    Disabled,
    Strict,
    Lenient,
    Custom,
}

impl InputPolicyKind {
    /// Parse the policy names accepted by `QUALITY_LENS_INPUT_POLICY`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "disabled" | "off" | "none" => Some(Self::Disabled),
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputPolicy {
    pub enabled: bool,
    pub kind: InputPolicyKind,
    pub max_pixels: Option<u64>,
    pub max_bytes: Option<u64>,
}

impl Default for InputPolicy {
    fn default() -> Self {
        Self::lenient()
    }
}

impl InputPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            kind: InputPolicyKind::Disabled,
            max_pixels: None,
            max_bytes: None,
        }
    }

    pub fn strict() -> Self {
        Self {
            enabled: true,
            kind: InputPolicyKind::Strict,
            max_pixels: Some(STRICT_MAX_PIXELS),
            max_bytes: Some(STRICT_MAX_BYTES),
        }
    }

    pub fn lenient() -> Self {
        Self {
            enabled: true,
            kind: InputPolicyKind::Lenient,
            max_pixels: Some(LENIENT_MAX_PIXELS),
            max_bytes: Some(LENIENT_MAX_BYTES),
        }
    }

    /// Enabled with no limits; set `max_pixels` / `max_bytes` afterwards.
    pub fn custom() -> Self {
        Self {
            enabled: true,
            kind: InputPolicyKind::Custom,
            max_pixels: None,
            max_bytes: None,
        }
    }

    pub fn apply_policy(kind: InputPolicyKind) -> Self {
        match kind {
            InputPolicyKind::Disabled => Self::disabled(),
            InputPolicyKind::Strict => Self::strict(),
            InputPolicyKind::Lenient => Self::lenient(),
            InputPolicyKind::Custom => Self::custom(),
        }
    }

    pub fn with_max_pixels(mut self, max_pixels: Option<u64>) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: Option<u64>) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn enforce_source_len(&self, len: usize) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        if let Some(limit) = self.max_bytes {
            let len = len as u64;
            if len > limit {
                return Err(QualityLensError::input_too_large(len, limit));
            }
        }
        Ok(())
    }

    pub fn enforce_pixels(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 {
            return Err(QualityLensError::invalid_dimension("width", width));
        }
        if height == 0 {
            return Err(QualityLensError::invalid_dimension("height", height));
        }
        if !self.enabled {
            return Ok(());
        }
        if let Some(limit) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > limit {
                return Err(QualityLensError::pixel_count_exceeds_limit(pixels, limit));
            }
        }
        Ok(())
    }

    /// Map a sniffed container format onto a supported source format.
    ///
    /// Unknown or unsupported formats are rejected even when the policy is disabled,
    /// since nothing downstream can decode them.
    pub fn enforce_format(&self, format: Option<ImageFormat>) -> Result<SourceFormat> {
        let format =
            format.ok_or_else(|| QualityLensError::unsupported_format("unrecognized data"))?;
        SourceFormat::from_image_format(format).ok_or_else(|| {
            QualityLensError::unsupported_format(format!("{format:?}").to_ascii_lowercase())
        })
    }
}
