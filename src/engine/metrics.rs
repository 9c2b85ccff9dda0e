// src/engine/metrics.rs
//
// Full-reference quality metrics between two equal-sized bitmaps.
//
// PSNR: RGB only, pixels with reference alpha < 255 excluded, capped at 100 dB.
// SSIM: luminance only, non-overlapping 8x8 windows, pixels with reference
// alpha == 0 excluded, mean over contributing windows.

use crate::engine::bitmap::Bitmap;
use crate::error::{QualityLensError, Result};
use rayon::prelude::*;

/// Value reported for a perfect (or vacuous) PSNR match.
pub const PSNR_CEILING: f64 = 100.0;

const MSE_EPSILON: f64 = 1e-10;
const PEAK: f64 = 255.0;

const SSIM_WINDOW: usize = 8;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const C1: f64 = (K1 * PEAK) * (K1 * PEAK);
const C2: f64 = (K2 * PEAK) * (K2 * PEAK);

/// Pixels handed to PSNR per rayon task.
const PSNR_CHUNK_PIXELS: usize = 16 * 1024;

/// PSNR and SSIM of one comparison.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricResult {
    /// Decibels in 0..=100
    pub psnr: f64,
    /// 0..=1
    pub ssim: f64,
}

impl MetricResult {
    pub fn perfect() -> Self {
        Self {
            psnr: PSNR_CEILING,
            ssim: 1.0,
        }
    }
}

fn ensure_same_size(reference: &Bitmap, compared: &Bitmap) -> Result<()> {
    if reference.dimensions() != compared.dimensions() {
        return Err(QualityLensError::dimension_mismatch(
            reference.dimensions(),
            compared.dimensions(),
        ));
    }
    Ok(())
}

/// Compute both metrics.
pub fn compare(reference: &Bitmap, compared: &Bitmap) -> Result<MetricResult> {
    Ok(MetricResult {
        psnr: psnr(reference, compared)?,
        ssim: ssim(reference, compared)?,
    })
}

/// Peak signal-to-noise ratio in decibels.
pub fn psnr(reference: &Bitmap, compared: &Bitmap) -> Result<f64> {
    ensure_same_size(reference, compared)?;

    let chunk = PSNR_CHUNK_PIXELS * 4;
    let (sum_sq, included) = reference
        .pixels()
        .par_chunks(chunk)
        .zip(compared.pixels().par_chunks(chunk))
        .map(|(a, b)| {
            let mut sum = 0.0f64;
            let mut count = 0u64;
            for (pa, pb) in a.chunks_exact(4).zip(b.chunks_exact(4)) {
                if pa[3] < 255 {
                    continue;
                }
                for c in 0..3 {
                    let d = pa[c] as f64 - pb[c] as f64;
                    sum += d * d;
                }
                count += 1;
            }
            (sum, count)
        })
        .reduce(|| (0.0, 0), |x, y| (x.0 + y.0, x.1 + y.1));

    Ok(psnr_from_error(sum_sq, included))
}

fn psnr_from_error(sum_sq: f64, included: u64) -> f64 {
    if included == 0 {
        return PSNR_CEILING;
    }
    let mse = sum_sq / (3.0 * included as f64);
    if mse < MSE_EPSILON {
        return PSNR_CEILING;
    }
    (10.0 * (PEAK * PEAK / mse).log10()).clamp(0.0, PSNR_CEILING)
}

#[inline]
fn luma(px: &[u8]) -> f64 {
    0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64
}

/// Structural similarity over luminance, in [0, 1].
pub fn ssim(reference: &Bitmap, compared: &Bitmap) -> Result<f64> {
    ensure_same_size(reference, compared)?;

    let width = reference.width() as usize;
    let height = reference.height() as usize;
    if width < SSIM_WINDOW || height < SSIM_WINDOW {
        return Ok(1.0);
    }

    let windows_x = width / SSIM_WINDOW;
    let windows_y = height / SSIM_WINDOW;
    let a = reference.pixels();
    let b = compared.pixels();

    let (sum, contributing) = (0..windows_y)
        .into_par_iter()
        .map(|wy| {
            let mut row_sum = 0.0f64;
            let mut row_count = 0u64;
            for wx in 0..windows_x {
                if let Some(value) = window_ssim(a, b, width, wx * SSIM_WINDOW, wy * SSIM_WINDOW) {
                    row_sum += value;
                    row_count += 1;
                }
            }
            (row_sum, row_count)
        })
        .reduce(|| (0.0, 0), |x, y| (x.0 + y.0, x.1 + y.1));

    if contributing == 0 {
        return Ok(1.0);
    }
    Ok((sum / contributing as f64).clamp(0.0, 1.0))
}

/// SSIM of one 8x8 window, or None when every reference pixel is fully transparent.
fn window_ssim(a: &[u8], b: &[u8], width: usize, x0: usize, y0: usize) -> Option<f64> {
    let mut xs = [0.0f64; SSIM_WINDOW * SSIM_WINDOW];
    let mut ys = [0.0f64; SSIM_WINDOW * SSIM_WINDOW];
    let mut n = 0usize;

    for y in y0..y0 + SSIM_WINDOW {
        let row = y * width;
        for x in x0..x0 + SSIM_WINDOW {
            let idx = (row + x) * 4;
            if a[idx + 3] == 0 {
                continue;
            }
            xs[n] = luma(&a[idx..idx + 4]);
            ys[n] = luma(&b[idx..idx + 4]);
            n += 1;
        }
    }
    if n == 0 {
        return None;
    }

    let count = n as f64;
    let mean_x = xs[..n].iter().sum::<f64>() / count;
    let mean_y = ys[..n].iter().sum::<f64>() / count;

    let mut var_x = 0.0;
    let mut var_y = 0.0;
    let mut cov = 0.0;
    for i in 0..n {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        var_x += dx * dx;
        var_y += dy * dy;
        cov += dx * dy;
    }
    let var_x = (var_x / count).max(0.0);
    let var_y = (var_y / count).max(0.0);
    let cov = cov / count;

    let numerator = (2.0 * mean_x * mean_y + C1) * (2.0 * cov + C2);
    let denominator = (mean_x * mean_x + mean_y * mean_y + C1) * (var_x + var_y + C2);
    Some(numerator / denominator)
}
