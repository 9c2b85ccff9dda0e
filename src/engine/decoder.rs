// src/engine/decoder.rs
//
// Decoder operations: JPEG (mozjpeg) for the comparison pass, image crate for
// source files of any supported format.

use crate::engine::bitmap::Bitmap;
use crate::engine::common::run_with_panic_policy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::QualityLensError;
use image::{DynamicImage, ImageFormat, ImageReader};
use mozjpeg::Decompress;
use std::io::Cursor;

type DecoderResult<T> = std::result::Result<T, QualityLensError>;

/// Decode a JPEG buffer into an opaque RGBA bitmap using mozjpeg.
pub fn decode_jpeg(data: &[u8]) -> DecoderResult<Bitmap> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(QualityLensError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            QualityLensError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;

        let mut decompress = decompress.rgb().map_err(|e| {
            QualityLensError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = decompress.width();
        let height = decompress.height();
        if width > MAX_DIMENSION as usize || height > MAX_DIMENSION as usize {
            return Err(QualityLensError::decode_failed(format!(
                "image dimensions {width}x{height} exceed max {MAX_DIMENSION}"
            )));
        }
        let (width, height) = (width as u32, height as u32);
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            QualityLensError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat: Vec<u8> = pixels.into_iter().flatten().collect();

        Bitmap::from_rgb(width, height, &flat)
            .map_err(|e| QualityLensError::decode_failed(format!("mozjpeg: {e}")))
    })
}

/// Decode any supported source format with the image crate.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| QualityLensError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Check if image dimensions are within safe limits.
/// Returns an error if the image is too large (potential decompression bomb).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(QualityLensError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(QualityLensError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Read only the header and return the dimensions, without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> DecoderResult<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| QualityLensError::decode_failed(format!("failed to read image header: {e}")))?
        .into_dimensions()
        .map_err(|e| QualityLensError::decode_failed(format!("failed to read dimensions: {e}")))
}
