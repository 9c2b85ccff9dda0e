// src/report.rs
//
// Display values derived from a compression outcome.

use crate::engine::dead_zone::DeadZoneResult;
use crate::engine::orchestrator::CompressionOutcome;
use std::path::Path;

pub use crate::engine::dead_zone::dead_zone_width_percent;

const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
const FALLBACK_STEM: &str = "image";
const COMPRESSED_SUFFIX: &str = "-compressed";

/// Human-readable size in powers of 1024: `"512 B"`, `"1.5 KB"`, `"2.0 MB"`.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// `reference / current`; 0 when nothing was produced.
pub fn compression_ratio(reference: u64, current: u64) -> f64 {
    if current == 0 {
        return 0.0;
    }
    reference as f64 / current as f64
}

/// Percent saved relative to the reference, never negative.
pub fn size_reduction_percent(reference: u64, current: u64) -> f64 {
    if reference == 0 {
        return 0.0;
    }
    ((reference as f64 - current as f64) / reference as f64 * 100.0).max(0.0)
}

pub fn format_psnr(psnr: f64) -> String {
    format!("{psnr:.2} dB")
}

pub fn format_ssim(ssim: f64) -> String {
    format!("{ssim:.4}")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeBadge {
    /// Original bytes handed back unchanged
    Original,
    Smaller,
    Larger,
}

impl SizeBadge {
    pub fn classify(is_original_alias: bool, reference: u64, current: u64) -> Self {
        if is_original_alias {
            Self::Original
        } else if current <= reference {
            Self::Smaller
        } else {
            Self::Larger
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Smaller => "smaller",
            Self::Larger => "larger",
        }
    }
}

/// Download name: the original name for the alias, else `<stem>-compressed.jpg`.
pub fn suggested_file_name(original_name: &str, is_original_alias: bool) -> String {
    if is_original_alias && !original_name.is_empty() {
        return original_name.to_string();
    }
    let stem = Path::new(original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    format!("{stem}{COMPRESSED_SUFFIX}.jpg")
}

/// Everything the UI shows for one published outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionSummary {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub reference_size: u64,
    pub encoded_size: u64,
    pub reference_size_label: String,
    pub encoded_size_label: String,
    pub ratio: f64,
    pub reduction_percent: f64,
    pub psnr: f64,
    pub ssim: f64,
    pub badge: SizeBadge,
    pub dead_zone_threshold: Option<u8>,
    pub dead_zone_width_percent: u32,
    /// The chosen quality lies inside the dead zone.
    pub in_dead_zone: bool,
    pub file_name: String,
}

impl CompressionSummary {
    pub fn from_outcome(
        outcome: &CompressionOutcome,
        dead_zone: Option<DeadZoneResult>,
        original_name: Option<&str>,
    ) -> Self {
        let reference = outcome.reference_size;
        let encoded = outcome.encoded_size();
        Self {
            width: outcome.target_size.0,
            height: outcome.target_size.1,
            quality: outcome.quality.get(),
            reference_size: reference,
            encoded_size: encoded,
            reference_size_label: format_bytes(reference),
            encoded_size_label: format_bytes(encoded),
            ratio: compression_ratio(reference, encoded),
            reduction_percent: size_reduction_percent(reference, encoded),
            psnr: outcome.metrics.psnr,
            ssim: outcome.metrics.ssim,
            badge: SizeBadge::classify(outcome.is_original_alias, reference, encoded),
            dead_zone_threshold: dead_zone.map(|d| d.threshold()),
            dead_zone_width_percent: dead_zone.map_or(0, |d| d.width_percent()),
            in_dead_zone: dead_zone.is_some_and(|d| d.contains(outcome.quality)),
            file_name: suggested_file_name(original_name.unwrap_or(""), outcome.is_original_alias),
        }
    }
}
