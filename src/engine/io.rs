// src/engine/io.rs
//
// Source loading: byte / memory-mapped / path sources and the decoded
// `SourceImage` the orchestrator works from.

use crate::engine::bitmap::Bitmap;
use crate::engine::decoder::{
    check_dimensions, decode_with_image_crate, detect_format, read_dimensions,
};
use crate::engine::encoder::AlphaHandling;
use crate::engine::guard::InputPolicy;
use crate::error::{QualityLensError, Result};
use crate::ops::SourceFormat;
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Where encoded source bytes come from.
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory data
    Memory(Arc<[u8]>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    /// Map a file into memory.
    pub fn map_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().into_owned();
        let file = File::open(path)
            .map_err(|e| QualityLensError::file_read_failed(display.clone(), e))?;
        // Safety: the file is assumed not to be truncated by another process while mapped.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| QualityLensError::file_read_failed(display, e))?;
        Ok(Source::Mapped(Arc::new(mmap)))
    }

    /// Shared buffer of the bytes. Free for `Memory`, one copy for `Mapped`.
    pub fn load(&self) -> Arc<[u8]> {
        match self {
            Source::Memory(data) => Arc::clone(data),
            Source::Mapped(mmap) => Arc::from(&mmap[..]),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => &data[..],
            Source::Mapped(mmap) => &mmap[..],
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A decoded source image together with the bytes it came from.
///
/// `original_bytes` is what the fast path hands back unchanged, and its length is
/// the reference size for size comparisons.
#[derive(Clone, Debug)]
pub struct SourceImage {
    bitmap: Bitmap,
    original_bytes: Arc<[u8]>,
    format: Option<SourceFormat>,
    has_alpha_origin: bool,
    name: Option<String>,
}

impl SourceImage {
    /// Sniff, check and decode an in-memory encoded image.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, policy: &InputPolicy) -> Result<Self> {
        Self::from_source(&Source::Memory(bytes.into()), policy)
    }

    /// Memory-map a file, decode it from the mapping, and keep one owned copy of
    /// the bytes for aliasing.
    pub fn from_path(path: impl AsRef<Path>, policy: &InputPolicy) -> Result<Self> {
        let path = path.as_ref();
        let source = Source::map_file(path)?;
        let image = Self::from_source(&source, policy)?;
        Ok(match path.file_name() {
            Some(name) => image.with_name(name.to_string_lossy()),
            None => image,
        })
    }

    pub fn from_source(source: &Source, policy: &InputPolicy) -> Result<Self> {
        let (bitmap, format) = decode_checked(source.as_bytes(), policy)?;
        Ok(Self {
            bitmap,
            original_bytes: source.load(),
            has_alpha_origin: format.supports_alpha(),
            format: Some(format),
            name: None,
        })
    }

    /// Wrap a bitmap decoded elsewhere. The caller states whether its origin
    /// format carries alpha; nothing is inferred from the pixels.
    pub fn from_decoded(
        bitmap: Bitmap,
        original_bytes: impl Into<Arc<[u8]>>,
        has_alpha_origin: bool,
    ) -> Self {
        Self {
            bitmap,
            original_bytes: original_bytes.into(),
            format: None,
            has_alpha_origin,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn original_bytes(&self) -> &Arc<[u8]> {
        &self.original_bytes
    }

    /// Byte size of the original encoded file.
    pub fn reference_size(&self) -> u64 {
        self.original_bytes.len() as u64
    }

    pub fn format(&self) -> Option<SourceFormat> {
        self.format
    }

    pub fn has_alpha_origin(&self) -> bool {
        self.has_alpha_origin
    }

    pub fn alpha_handling(&self) -> AlphaHandling {
        AlphaHandling::for_origin(self.has_alpha_origin)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.bitmap.dimensions()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

fn decode_checked(bytes: &[u8], policy: &InputPolicy) -> Result<(Bitmap, SourceFormat)> {
    policy.enforce_source_len(bytes.len())?;
    let format = policy.enforce_format(detect_format(bytes))?;

    // Header-only pass so oversize images are rejected before allocating pixels.
    let (width, height) = read_dimensions(bytes)?;
    check_dimensions(width, height)?;
    policy.enforce_pixels(width, height)?;

    let decoded = decode_with_image_crate(bytes)?;
    let bitmap = Bitmap::from_dynamic(&decoded)?;
    tracing::debug!(
        format = format.as_str(),
        width,
        height,
        bytes = bytes.len(),
        "decoded source image"
    );
    Ok((bitmap, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::{Cursor, Write};

    fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 90, 255]));
        let dynamic = match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            _ => DynamicImage::ImageRgba8(img),
        };
        let mut buf = Vec::new();
        dynamic.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn from_bytes_png_is_alpha_origin() {
        let png = encode(ImageFormat::Png, 12, 9);
        let len = png.len() as u64;
        let src = SourceImage::from_bytes(png, &InputPolicy::lenient()).unwrap();
        assert_eq!(src.dimensions(), (12, 9));
        assert_eq!(src.format(), Some(SourceFormat::Png));
        assert!(src.has_alpha_origin());
        assert_eq!(src.alpha_handling(), AlphaHandling::FlattenOntoWhite);
        assert_eq!(src.reference_size(), len);
    }

    #[test]
    fn from_bytes_jpeg_is_opaque_origin() {
        let jpeg = encode(ImageFormat::Jpeg, 16, 16);
        let src = SourceImage::from_bytes(jpeg, &InputPolicy::lenient()).unwrap();
        assert_eq!(src.format(), Some(SourceFormat::Jpeg));
        assert!(!src.has_alpha_origin());
    }

    #[test]
    fn from_bytes_rejects_unknown_data() {
        let err = SourceImage::from_bytes(b"hello world".to_vec(), &InputPolicy::lenient())
            .unwrap_err();
        assert!(matches!(err, QualityLensError::UnsupportedFormat { .. }));
    }

    #[test]
    fn from_bytes_enforces_byte_limit() {
        let png = encode(ImageFormat::Png, 8, 8);
        let policy = InputPolicy::custom().with_max_bytes(Some(10));
        let err = SourceImage::from_bytes(png, &policy).unwrap_err();
        assert!(matches!(err, QualityLensError::InputTooLarge { .. }));
    }

    #[test]
    fn from_bytes_enforces_pixel_limit() {
        let png = encode(ImageFormat::Png, 20, 20);
        let policy = InputPolicy::custom().with_max_pixels(Some(100));
        let err = SourceImage::from_bytes(png, &policy).unwrap_err();
        assert!(matches!(err, QualityLensError::PixelCountExceedsLimit { .. }));
    }

    #[test]
    fn from_path_maps_and_names() {
        let png = encode(ImageFormat::Png, 5, 4);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        File::create(&path).unwrap().write_all(&png).unwrap();

        let src = SourceImage::from_path(&path, &InputPolicy::lenient()).unwrap();
        assert_eq!(src.dimensions(), (5, 4));
        assert_eq!(src.name(), Some("photo.png"));
        assert_eq!(&src.original_bytes()[..], &png[..]);
    }

    #[test]
    fn from_path_missing_file() {
        let err = SourceImage::from_path("/definitely/not/here.png", &InputPolicy::lenient())
            .unwrap_err();
        assert!(matches!(err, QualityLensError::FileReadFailed { .. }));
    }

    #[test]
    fn from_decoded_keeps_caller_flag() {
        let bmp = Bitmap::filled(3, 3, [1, 2, 3, 255]).unwrap();
        let src = SourceImage::from_decoded(bmp, vec![0u8; 42], true);
        assert!(src.has_alpha_origin());
        assert_eq!(src.reference_size(), 42);
        assert_eq!(src.format(), None);
    }

    #[test]
    fn source_variants() {
        let mem = Source::Memory(Arc::from(vec![1u8, 2, 3]));
        assert_eq!(mem.len(), 3);
        assert_eq!(mem.as_bytes(), &[1u8, 2, 3][..]);
        assert!(Arc::ptr_eq(&mem.load(), &mem.load()));

        let png = encode(ImageFormat::Png, 6, 6);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapped.png");
        File::create(&path).unwrap().write_all(&png).unwrap();
        let mapped = Source::map_file(&path).unwrap();
        assert!(!mapped.is_empty());
        assert_eq!(&mapped.load()[..], &png[..]);

        let src = SourceImage::from_source(&mapped, &InputPolicy::lenient()).unwrap();
        assert_eq!(src.dimensions(), (6, 6));
        assert_eq!(src.name(), None);
    }
}
