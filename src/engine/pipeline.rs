// src/engine/pipeline.rs
//
// Resizer: target-size calculation and the downscale pass.

use crate::engine::bitmap::Bitmap;
use crate::engine::common::run_with_panic_policy;
use crate::engine::MAX_DIMENSION;
use crate::error::QualityLensError;
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbaImage};

type PipelineResult<T> = std::result::Result<T, QualityLensError>;

/// Compute the output size for the given max-width/max-height constraints.
///
/// - Either source dimension zero => `(0, 0)`; callers must treat it as "cannot proceed".
/// - Unset constraints default to the source dimension.
/// - `scale = min(max_w / w, max_h / h, 1)`, so the image is never upscaled.
/// - Each output dimension is rounded and floored at 1.
pub fn compute_target_size(
    src_w: u32,
    src_h: u32,
    max_w: Option<u32>,
    max_h: Option<u32>,
) -> (u32, u32) {
    if src_w == 0 || src_h == 0 {
        return (0, 0);
    }
    let max_w = max_w.unwrap_or(src_w) as f64;
    let max_h = max_h.unwrap_or(src_h) as f64;

    let scale = (max_w / src_w as f64).min(max_h / src_h as f64).min(1.0);
    if scale >= 1.0 {
        return (src_w, src_h);
    }

    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Downscale (or pass through) a bitmap to exactly `dst_width`x`dst_height`.
///
/// Returns a clone sharing the same pixels when the size already matches.
pub fn resize_bitmap(src: &Bitmap, dst_width: u32, dst_height: u32) -> PipelineResult<Bitmap> {
    if src.dimensions() == (dst_width, dst_height) {
        return Ok(src.clone());
    }
    if dst_width == 0 || dst_height == 0 {
        return Err(QualityLensError::resize_failed(
            src.dimensions(),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }
    if dst_width > MAX_DIMENSION || dst_height > MAX_DIMENSION {
        return Err(QualityLensError::resize_failed(
            src.dimensions(),
            (dst_width, dst_height),
            format!("target exceeds max dimension {MAX_DIMENSION}"),
        ));
    }

    run_with_panic_policy("resize", || {
        let pixels = fast_resize_rgba(
            src.width(),
            src.height(),
            src.pixels().to_vec(),
            !src.is_fully_opaque(),
            dst_width,
            dst_height,
        )
        .map_err(|reason| {
            QualityLensError::resize_failed(src.dimensions(), (dst_width, dst_height), reason)
        })?;
        Bitmap::from_rgba(dst_width, dst_height, pixels)
    })
}

fn default_resize_options() -> ResizeOptions {
    ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3))
}

fn fast_resize_rgba(
    src_width: u32,
    src_height: u32,
    mut src_pixels: Vec<u8>,
    premultiply: bool,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let pixel_type = PixelType::U8x4;
    let required_bytes = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|n| n.checked_mul(pixel_type.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())?;

    if src_pixels.len() < required_bytes {
        return Err(format!(
            "fir source image invalid buffer size. expected {required_bytes} bytes, got {} bytes",
            src_pixels.len()
        ));
    }

    let primary_result = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => resize_with_source_image(src_image, premultiply, dst_width, dst_height),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned
                .buffer_mut()
                .copy_from_slice(&src_pixels[..required_bytes]);
            resize_with_source_image(aligned, premultiply, dst_width, dst_height)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary_result {
        Ok(pixels) => Ok(pixels),
        Err(err) => {
            tracing::debug!(%err, "fast_image_resize failed, falling back to image crate");
            resize_with_image_crate_fallback(
                &src_pixels,
                src_width,
                src_height,
                dst_width,
                dst_height,
            )
            .map_err(|fallback_err| format!("{err}; image crate fallback failed: {fallback_err}"))
        }
    }
}

fn resize_with_source_image(
    mut src_image: fir::images::Image<'_>,
    premultiply: bool,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x4);

    // Skip premultiply/unpremultiply for fully opaque images
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_image, &mut dst_image, &default_resize_options())
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    Ok(dst_image.into_vec())
}

fn resize_with_image_crate_fallback(
    src_pixels: &[u8],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> std::result::Result<Vec<u8>, String> {
    let rgba = RgbaImage::from_raw(src_width, src_height, src_pixels.to_vec())
        .ok_or_else(|| "failed to build rgba image for fallback resize".to_string())?;
    Ok(
        image::imageops::resize(&rgba, dst_width, dst_height, FilterType::Lanczos3)
            .into_raw(),
    )
}
