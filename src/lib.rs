// lib.rs
//
// quality-lens: perceptual quality analysis and dead-zone aware JPEG re-encoding
//
// Design goals:
// - Show what a quality setting costs (PSNR, SSIM, heat map) before saving
// - Warn about the dead zone where re-encoding makes the file larger
// - Only the latest settings snapshot is ever published

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod config;
pub mod engine;
pub mod error;
pub mod ops;
pub mod report;

pub use config::EngineConfig;
pub use engine::{
    CompressionOutcome, DeadZoneResult, ImageSession, JpegCodec, LossyCodec, MetricResult,
    Orchestrator, SettingsScheduler, SourceImage,
};
pub use error::{ErrorCategory, QualityLensError, Result};
pub use ops::{CompressionSettings, Quality, SourceFormat};
pub use report::CompressionSummary;

use image::ImageReader;
use std::io::Cursor;

/// Header-only view of an input, read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    /// `None` for containers the engine cannot decode
    pub format: Option<SourceFormat>,
}

pub fn inspect_header_from_bytes(data: &[u8]) -> Result<InspectMetadata> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| QualityLensError::decode_failed(format!("failed to read image header: {e}")))?;

    let format = reader.format().and_then(SourceFormat::from_image_format);
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| QualityLensError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn supported_input_formats() -> Vec<&'static str> {
    vec!["jpeg", "png", "webp", "gif", "bmp"]
}

pub fn supported_output_formats() -> Vec<&'static str> {
    vec!["jpeg"]
}

/// Entry points for the cargo-fuzz targets in fuzz/.
#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use crate::engine::{compare, diff, Bitmap, InputPolicy, SourceImage};
    use crate::report::{format_bytes, size_reduction_percent, suggested_file_name};

    /// Decode arbitrary bytes under the strict policy; errors are expected, panics are bugs.
    pub fn decode_arbitrary(data: &[u8]) {
        let _ = SourceImage::from_bytes(data.to_vec(), &InputPolicy::strict());
    }

    /// Score two RGBA buffers carved out of the fuzz input.
    pub fn score_pixels(width: u8, height: u8, data: &[u8]) {
        let (w, h) = (width.max(1) as u32, height.max(1) as u32);
        let len = (w * h * 4) as usize;
        if data.len() < len * 2 {
            return;
        }
        let (Ok(a), Ok(b)) = (
            Bitmap::from_rgba(w, h, data[..len].to_vec()),
            Bitmap::from_rgba(w, h, data[len..len * 2].to_vec()),
        ) else {
            return;
        };
        if let Ok(result) = compare(&a, &b) {
            assert!((0.0..=100.0).contains(&result.psnr));
            assert!((0.0..=1.0).contains(&result.ssim));
        }
        let _ = diff(&a, &b);
    }

    /// Display helpers must accept any sizes and names.
    pub fn display_values(reference: u64, current: u64, name: &str, alias: bool) {
        let _ = format_bytes(reference);
        let reduction = size_reduction_percent(reference, current);
        assert!(reduction >= 0.0);
        let _ = suggested_file_name(name, alias);
    }
}
