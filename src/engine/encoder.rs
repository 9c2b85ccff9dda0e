// src/engine/encoder.rs
//
// Encoder: baseline JPEG via mozjpeg, with mandatory white flattening for
// alpha-capable sources.

use crate::engine::bitmap::Bitmap;
use crate::engine::common::run_with_panic_policy;
use crate::engine::MAX_DIMENSION;
use crate::error::QualityLensError;
use crate::ops::Quality;
use mozjpeg::{ColorSpace, Compress};

type EncoderResult<T> = std::result::Result<T, QualityLensError>;

/// How the RGBA source is reduced to the RGB the JPEG encoder accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlphaHandling {
    /// Composite every pixel over opaque white (origin format carries alpha)
    FlattenOntoWhite,
    /// Drop the alpha channel (origin format is opaque)
    Discard,
}

impl AlphaHandling {
    pub fn for_origin(has_alpha_origin: bool) -> Self {
        if has_alpha_origin {
            Self::FlattenOntoWhite
        } else {
            Self::Discard
        }
    }
}

/// Encode a bitmap to a baseline (sequential) JPEG.
///
/// Quality maps linearly onto the libjpeg quality scale. The output is not
/// guaranteed to be smaller than any reference - callers compare sizes themselves.
pub fn encode_jpeg(bitmap: &Bitmap, quality: Quality, alpha: AlphaHandling) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let (w, h) = bitmap.dimensions();

        if w == 0 || h == 0 {
            return Err(QualityLensError::encode_failed(
                "jpeg",
                "invalid image dimensions: width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(QualityLensError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }

        let rgb = match alpha {
            AlphaHandling::FlattenOntoWhite => bitmap.flatten_onto_white(),
            AlphaHandling::Discard => bitmap.to_rgb(),
        };
        let expected_len = (w as usize) * (h as usize) * 3;
        if rgb.len() != expected_len {
            return Err(QualityLensError::encode_failed(
                "jpeg",
                format!("pixel buffer is {} bytes, expected {expected_len}", rgb.len()),
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        // libjpeg-turbo compatible defaults: sequential baseline scans, no trellis
        comp.set_fastest_defaults();
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(quality.get() as f32);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_optimize_coding(true);

        let estimated_size = (expected_len / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                QualityLensError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in rgb.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    QualityLensError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                QualityLensError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        if output.is_empty() {
            return Err(QualityLensError::encode_failed(
                "jpeg",
                "encoder produced no output",
            ));
        }
        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_bitmap(width: u32, height: u32) -> Bitmap {
        Bitmap::from_fn(width, height, |x, y| {
            [(x % 256) as u8, (y % 256) as u8, 128, 255]
        })
        .unwrap()
    }

    fn q(v: i64) -> Quality {
        Quality::new(v).unwrap()
    }

    /// True when the stream carries a baseline SOF0 marker and no progressive SOF2.
    fn is_baseline(jpeg: &[u8]) -> bool {
        let sof0 = jpeg.windows(2).any(|w| w == [0xFF, 0xC0]);
        let sof2 = jpeg.windows(2).any(|w| w == [0xFF, 0xC2]);
        sof0 && !sof2
    }

    #[test]
    fn test_encode_jpeg_produces_valid_jpeg() {
        let bmp = create_test_bitmap(100, 100);
        let result = encode_jpeg(&bmp, q(80), AlphaHandling::Discard).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
        assert_eq!(&result[result.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_encode_jpeg_is_baseline() {
        let bmp = create_test_bitmap(64, 64);
        let result = encode_jpeg(&bmp, q(90), AlphaHandling::Discard).unwrap();
        assert!(is_baseline(&result));
    }

    #[test]
    fn test_encode_jpeg_quality_affects_size() {
        let bmp = create_test_bitmap(128, 128);
        let high = encode_jpeg(&bmp, q(95), AlphaHandling::Discard).unwrap();
        let low = encode_jpeg(&bmp, q(20), AlphaHandling::Discard).unwrap();
        assert!(high.len() > low.len());
    }

    #[test]
    fn test_flattening_renders_transparency_white() {
        let bmp = Bitmap::filled(16, 16, [0, 0, 0, 0]).unwrap();
        let flattened = encode_jpeg(&bmp, q(90), AlphaHandling::FlattenOntoWhite).unwrap();
        let discarded = encode_jpeg(&bmp, q(90), AlphaHandling::Discard).unwrap();

        let white = crate::engine::decoder::decode_jpeg(&flattened).unwrap();
        let black = crate::engine::decoder::decode_jpeg(&discarded).unwrap();
        assert!(white.pixel(8, 8)[0] > 245);
        assert!(black.pixel(8, 8)[0] < 10);
    }

    #[test]
    fn test_encode_1x1() {
        let bmp = Bitmap::filled(1, 1, [200, 10, 10, 255]).unwrap();
        let result = encode_jpeg(&bmp, Quality::MIN, AlphaHandling::Discard).unwrap();
        assert_eq!(&result[0..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_alpha_handling_for_origin() {
        assert_eq!(AlphaHandling::for_origin(true), AlphaHandling::FlattenOntoWhite);
        assert_eq!(AlphaHandling::for_origin(false), AlphaHandling::Discard);
    }
}
