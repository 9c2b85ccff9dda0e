// src/engine/bitmap.rs
//
// Pixel and byte containers passed between the engine stages.

use crate::error::{QualityLensError, Result};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;

/// Immutable RGBA8 raster, row-major with a top-left origin.
///
/// Pixels live behind an `Arc` so stages can share a bitmap without copying.
/// Every transform produces a new `Bitmap`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl Bitmap {
    /// Build from a raw RGBA buffer. The buffer must hold exactly `w*h*4` bytes
    /// and both dimensions must be positive.
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Arc<[u8]>>) -> Result<Self> {
        let pixels = pixels.into();
        let expected = expected_len(width, height);
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(QualityLensError::invalid_bitmap(
                width,
                height,
                expected,
                pixels.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build from a per-pixel function, mostly useful for synthetic inputs.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; 4]) -> Result<Self> {
        let mut pixels = Vec::with_capacity(expected_len(width, height));
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&f(x, y));
            }
        }
        Self::from_rgba(width, height, pixels)
    }

    /// Solid colour bitmap.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self> {
        Self::from_fn(width, height, |_, _| rgba)
    }

    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        let rgba = match img {
            DynamicImage::ImageRgba8(rgba) => rgba.clone(),
            other => other.to_rgba8(),
        };
        Self::from_rgba_image(rgba)
    }

    pub fn from_rgba_image(img: RgbaImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        Self::from_rgba(w, h, img.into_raw())
    }

    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.to_vec())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    /// RGBA of one pixel. Panics when out of bounds, like slice indexing.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    /// Identity check: true when both bitmaps share the same pixel allocation.
    pub fn shares_pixels_with(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    pub fn is_fully_opaque(&self) -> bool {
        self.pixels.iter().skip(3).step_by(4).all(|&a| a == 255)
    }

    /// Composite every pixel over opaque white and return packed RGB8.
    pub fn flatten_onto_white(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.pixels.chunks_exact(4) {
            let alpha = px[3] as u32;
            let inv = 255 - alpha;
            for &c in &px[..3] {
                // (c*a + 255*(255-a)) / 255, rounded
                let v = (c as u32 * alpha + 255 * inv + 127) / 255;
                rgb.push(v as u8);
            }
        }
        rgb
    }

    /// Drop the alpha channel without compositing.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.pixels.chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
        rgb
    }

    /// Expand packed RGB8 into an opaque bitmap.
    pub fn from_rgb(width: u32, height: u32, rgb: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(QualityLensError::invalid_bitmap(
                width,
                height,
                expected_len(width, height),
                rgb.len() / 3 * 4,
            ));
        }
        let mut rgba = Vec::with_capacity(expected_len(width, height));
        for px in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        Self::from_rgba(width, height, rgba)
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(4)
}

/// Where an encoded buffer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncodedKind {
    /// The user's original file bytes, reused verbatim
    Original,
    /// Output of the lossy encoder
    Reencoded,
}

/// Opaque encoded byte buffer.
///
/// Two values may share the original input allocation; use [`EncodedImage::is_alias_of`]
/// to test identity, never content equality.
#[derive(Clone, Debug)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    kind: EncodedKind,
}

impl EncodedImage {
    pub fn reencoded(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into(),
            kind: EncodedKind::Reencoded,
        }
    }

    /// Wrap the original bytes without copying.
    pub fn original(bytes: Arc<[u8]>) -> Self {
        Self {
            bytes,
            kind: EncodedKind::Original,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    pub fn kind(&self) -> EncodedKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_alias_of(&self, other: &Arc<[u8]>) -> bool {
        Arc::ptr_eq(&self.bytes, other)
    }
}
