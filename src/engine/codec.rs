// src/engine/codec.rs
//
// Codec adapter seam. The orchestrator and the dead-zone search only talk to
// `LossyCodec`, so tests can substitute an encoder with scripted sizes.

use crate::engine::bitmap::{Bitmap, EncodedImage};
use crate::engine::decoder::decode_jpeg;
use crate::engine::encoder::{encode_jpeg, AlphaHandling};
use crate::error::Result;
use crate::ops::Quality;

/// A single lossy output format.
pub trait LossyCodec: Send + Sync {
    /// Short format name used in logs and error messages.
    fn format_name(&self) -> &'static str;

    /// File extension used for suggested download names.
    fn extension(&self) -> &'static str;

    /// Encode at the given quality. `alpha` says whether to flatten onto white.
    fn encode(&self, bitmap: &Bitmap, quality: Quality, alpha: AlphaHandling)
        -> Result<EncodedImage>;

    /// Decode a buffer produced by [`LossyCodec::encode`] back into a bitmap.
    fn decode(&self, encoded: &EncodedImage) -> Result<Bitmap>;
}

/// Baseline JPEG through mozjpeg.
#[derive(Clone, Copy, Debug, Default)]
pub struct JpegCodec;

impl LossyCodec for JpegCodec {
    fn format_name(&self) -> &'static str {
        "jpeg"
    }

    fn extension(&self) -> &'static str {
        "jpg"
    }

    fn encode(
        &self,
        bitmap: &Bitmap,
        quality: Quality,
        alpha: AlphaHandling,
    ) -> Result<EncodedImage> {
        encode_jpeg(bitmap, quality, alpha).map(EncodedImage::reencoded)
    }

    fn decode(&self, encoded: &EncodedImage) -> Result<Bitmap> {
        decode_jpeg(encoded.bytes())
    }
}

impl<C: LossyCodec + ?Sized> LossyCodec for std::sync::Arc<C> {
    fn format_name(&self) -> &'static str {
        (**self).format_name()
    }

    fn extension(&self) -> &'static str {
        (**self).extension()
    }

    fn encode(
        &self,
        bitmap: &Bitmap,
        quality: Quality,
        alpha: AlphaHandling,
    ) -> Result<EncodedImage> {
        (**self).encode(bitmap, quality, alpha)
    }

    fn decode(&self, encoded: &EncodedImage) -> Result<Bitmap> {
        (**self).decode(encoded)
    }
}
