// src/engine/dead_zone.rs
//
// Dead-zone search: the quality above which re-encoding is expected to produce
// a file larger than the original.
//
// The ladder is probed from the top. The first rung whose encoded size does not
// exceed the reference ends the search and the threshold is that rung + 1, so
// the dead zone is the half-open range (threshold, 100].

use crate::engine::bitmap::Bitmap;
use crate::engine::codec::LossyCodec;
use crate::engine::encoder::AlphaHandling;
use crate::engine::io::SourceImage;
use crate::engine::pipeline::{compute_target_size, resize_bitmap};
use crate::error::Result;
use crate::ops::{CompressionSettings, Quality};
use std::time::Instant;

/// Probed qualities, descending and denser near the top.
pub const DEAD_ZONE_LADDER: [u8; 15] = [99, 98, 97, 96, 95, 94, 93, 92, 91, 90, 88, 85, 80, 75, 70];

/// Threshold meaning "no dead zone / not applicable".
pub const NO_DEAD_ZONE: u8 = 101;

const MIN_THRESHOLD: u8 = 1;

/// Outcome of one dead-zone search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeadZoneResult {
    threshold: u8,
}

impl DeadZoneResult {
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.clamp(MIN_THRESHOLD, NO_DEAD_ZONE),
        }
    }

    pub fn none() -> Self {
        Self::new(NO_DEAD_ZONE)
    }

    /// Lowest quality at which re-encoding is expected to exceed the reference size.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn has_dead_zone(&self) -> bool {
        self.threshold <= 100
    }

    /// Whether `quality` falls inside the dead zone.
    pub fn contains(&self, quality: Quality) -> bool {
        self.has_dead_zone() && quality.get() >= self.threshold
    }

    pub fn width_percent(&self) -> u32 {
        dead_zone_width_percent(self.threshold)
    }
}

/// Width of the warning band on a 1..=100 quality scale.
pub fn dead_zone_width_percent(threshold: u8) -> u32 {
    if threshold <= 100 {
        (100 - threshold as u32) + 1
    } else {
        0
    }
}

/// Find the dead-zone threshold for `bitmap` resized to `target_width`x`target_height`.
///
/// Never fails: degenerate inputs give [`NO_DEAD_ZONE`], a resize failure is absorbed
/// the same way, and an encode failure ends the scan at that rung.
pub fn find_threshold<C: LossyCodec + ?Sized>(
    codec: &C,
    bitmap: Option<&Bitmap>,
    reference_size: u64,
    target_width: u32,
    target_height: u32,
    alpha: AlphaHandling,
) -> u8 {
    find_threshold_cancellable(
        codec,
        bitmap,
        reference_size,
        target_width,
        target_height,
        alpha,
        || false,
    )
    .unwrap_or(NO_DEAD_ZONE)
}

/// [`find_threshold`] with a cancellation check consulted before each probe.
/// Returns `None` once `is_cancelled` reports true.
pub fn find_threshold_cancellable<C, F>(
    codec: &C,
    bitmap: Option<&Bitmap>,
    reference_size: u64,
    target_width: u32,
    target_height: u32,
    alpha: AlphaHandling,
    is_cancelled: F,
) -> Option<u8>
where
    C: LossyCodec + ?Sized,
    F: Fn() -> bool,
{
    let Some(bitmap) = bitmap else {
        return Some(NO_DEAD_ZONE);
    };
    if reference_size == 0 || target_width == 0 || target_height == 0 {
        return Some(NO_DEAD_ZONE);
    }

    let started = Instant::now();
    let resized = match resize_bitmap(bitmap, target_width, target_height) {
        Ok(resized) => resized,
        Err(err) => {
            tracing::debug!(error = %err, "dead-zone resize failed; reporting no dead zone");
            return Some(NO_DEAD_ZONE);
        }
    };

    let mut threshold = None;
    for &candidate in DEAD_ZONE_LADDER.iter() {
        if is_cancelled() {
            tracing::trace!(candidate, "dead-zone search cancelled");
            return None;
        }
        let Ok(quality) = Quality::try_from(candidate) else {
            continue;
        };
        match codec.encode(&resized, quality, alpha) {
            Ok(encoded) => {
                let size = encoded.len() as u64;
                tracing::trace!(candidate, size, reference_size, "dead-zone probe");
                if size <= reference_size {
                    threshold = Some(candidate + 1);
                    break;
                }
            }
            Err(err) => {
                tracing::debug!(candidate, error = %err, "dead-zone probe failed; stopping scan");
                threshold = Some(candidate + 1);
                break;
            }
        }
    }

    let lowest = DEAD_ZONE_LADDER[DEAD_ZONE_LADDER.len() - 1];
    let threshold = threshold
        .unwrap_or(lowest + 1)
        .clamp(MIN_THRESHOLD, NO_DEAD_ZONE);
    tracing::debug!(
        threshold,
        reference_size,
        target_width,
        target_height,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "dead-zone search finished"
    );
    Some(threshold)
}

/// Validate the settings, derive the target size from the source, and search.
pub fn find_dead_zone_threshold<C: LossyCodec + ?Sized>(
    codec: &C,
    source: &SourceImage,
    settings: CompressionSettings,
    reference_size: u64,
) -> Result<DeadZoneResult> {
    settings.validate()?;
    let (src_w, src_h) = source.dimensions();
    let (target_w, target_h) =
        compute_target_size(src_w, src_h, settings.max_width, settings.max_height);
    Ok(DeadZoneResult::new(find_threshold(
        codec,
        Some(source.bitmap()),
        reference_size,
        target_w,
        target_h,
        source.alpha_handling(),
    )))
}
