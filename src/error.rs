// src/error.rs
//
// Unified error handling for quality-lens
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - InputInvalid: bad file type/size/dimensions/settings, rejected before the core runs
// - EncodeFailure: the JPEG encoder produced no output
// - DecodeFailure: an encoded buffer (or resize pass) could not produce a bitmap
// - DimensionMismatch: two bitmaps handed to the metric/heat-map engines differ in size
// - Cancelled: a newer settings generation superseded the run
// - Internal: library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error category used by the UI collaborator to decide how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, rejected before the core runs
    InputInvalid,
    /// The encoder returned no output
    EncodeFailure,
    /// An encoded buffer could not be decoded back to a bitmap
    DecodeFailure,
    /// Precondition violation between two bitmaps
    DimensionMismatch,
    /// The run was superseded by a newer request; never shown to the user
    Cancelled,
    /// Library bugs (should not happen)
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "InputInvalid",
            ErrorCategory::EncodeFailure => "EncodeFailure",
            ErrorCategory::DecodeFailure => "DecodeFailure",
            ErrorCategory::DimensionMismatch => "DimensionMismatch",
            ErrorCategory::Cancelled => "Cancelled",
            ErrorCategory::Internal => "Internal",
        }
    }

    /// Stable machine-readable code for notices.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "QUALITY_LENS_INPUT_INVALID",
            ErrorCategory::EncodeFailure => "QUALITY_LENS_ENCODE_FAILURE",
            ErrorCategory::DecodeFailure => "QUALITY_LENS_DECODE_FAILURE",
            ErrorCategory::DimensionMismatch => "QUALITY_LENS_DIMENSION_MISMATCH",
            ErrorCategory::Cancelled => "QUALITY_LENS_CANCELLED",
            ErrorCategory::Internal => "QUALITY_LENS_INTERNAL",
        }
    }
}

/// quality-lens error types
#[derive(Debug, Error)]
pub enum QualityLensError {
    // Input Errors
    #[error("Quality {value} is outside the accepted range 1..=100")]
    InvalidQuality { value: i64 },

    #[error("Invalid {name}: {value}. Dimensions must be positive")]
    InvalidDimension { name: Cow<'static, str>, value: u32 },

    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Input size {bytes} bytes exceeds limit of {max} bytes")]
    InputTooLarge { bytes: u64, max: u64 },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    #[error("Invalid bitmap {width}x{height}: expected {expected} bytes, got {actual}")]
    InvalidBitmap {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Codec Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Precondition Errors
    #[error("Bitmap dimensions differ: reference {reference_width}x{reference_height}, compared {compared_width}x{compared_height}")]
    DimensionMismatch {
        reference_width: u32,
        reference_height: u32,
        compared_width: u32,
        compared_height: u32,
    },

    // State Errors
    #[error("Run for generation {generation} was superseded by generation {latest}")]
    Superseded { generation: u64, latest: u64 },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for QualityLensError {
    fn clone(&self) -> Self {
        match self {
            Self::InvalidQuality { value } => Self::InvalidQuality { value: *value },
            Self::InvalidDimension { name, value } => Self::InvalidDimension {
                name: name.clone(),
                value: *value,
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::InputTooLarge { bytes, max } => Self::InputTooLarge {
                bytes: *bytes,
                max: *max,
            },
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::InvalidBitmap {
                width,
                height,
                expected,
                actual,
            } => Self::InvalidBitmap {
                width: *width,
                height: *height,
                expected: *expected,
                actual: *actual,
            },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::DimensionMismatch {
                reference_width,
                reference_height,
                compared_width,
                compared_height,
            } => Self::DimensionMismatch {
                reference_width: *reference_width,
                reference_height: *reference_height,
                compared_width: *compared_width,
                compared_height: *compared_height,
            },
            Self::Superseded { generation, latest } => Self::Superseded {
                generation: *generation,
                latest: *latest,
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl QualityLensError {
    pub fn invalid_quality(value: i64) -> Self {
        Self::InvalidQuality { value }
    }

    pub fn invalid_dimension(name: impl Into<Cow<'static, str>>, value: u32) -> Self {
        Self::InvalidDimension {
            name: name.into(),
            value,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn input_too_large(bytes: u64, max: u64) -> Self {
        Self::InputTooLarge { bytes, max }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn invalid_bitmap(width: u32, height: u32, expected: usize, actual: usize) -> Self {
        Self::InvalidBitmap {
            width,
            height,
            expected,
            actual,
        }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn dimension_mismatch(reference: (u32, u32), compared: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            reference_width: reference.0,
            reference_height: reference.1,
            compared_width: compared.0,
            compared_height: compared.1,
        }
    }

    pub fn superseded(generation: u64, latest: u64) -> Self {
        Self::Superseded { generation, latest }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuality { .. }
            | Self::InvalidDimension { .. }
            | Self::UnsupportedFormat { .. }
            | Self::InputTooLarge { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::InvalidBitmap { .. }
            | Self::FileReadFailed { .. } => ErrorCategory::InputInvalid,

            Self::EncodeFailed { .. } => ErrorCategory::EncodeFailure,

            // Resizing produces the comparison bitmap, so a failed resize blocks the
            // same stage a failed decode does.
            Self::DecodeFailed { .. } | Self::ResizeFailed { .. } => ErrorCategory::DecodeFailure,

            Self::DimensionMismatch { .. } => ErrorCategory::DimensionMismatch,

            Self::Superseded { .. } => ErrorCategory::Cancelled,

            Self::InternalPanic { .. } => ErrorCategory::Internal,
        }
    }

    /// Check if the user can fix this error by changing the input or settings.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::InputInvalid | ErrorCategory::Cancelled => true,
            ErrorCategory::EncodeFailure
            | ErrorCategory::DecodeFailure
            | ErrorCategory::DimensionMismatch
            | ErrorCategory::Internal => false,
        }
    }

    /// Superseded runs are dropped silently; everything else becomes a notice.
    pub fn is_user_visible(&self) -> bool {
        self.category() != ErrorCategory::Cancelled
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, QualityLensError>;
