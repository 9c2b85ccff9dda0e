// src/engine/heatmap.rs
//
// Per-pixel difference visualization. Colour encodes the mean RGB difference
// through a five-stop ramp; alpha rises with the difference above a floor.

use crate::engine::bitmap::Bitmap;
use crate::error::{QualityLensError, Result};
use rayon::prelude::*;

/// Alpha of a compared pixel with zero difference.
pub const ALPHA_FLOOR: u8 = 30;
/// Alpha scale applied to the normalized intensity.
const ALPHA_SCALE: f64 = 225.0;

/// Ramp stops at positions 0, 0.25, 0.5, 0.75, 1.
const RAMP: [[u8; 3]; 5] = [
    [0, 0, 255],   // blue
    [0, 255, 255], // cyan
    [0, 255, 0],   // green
    [255, 255, 0], // yellow
    [255, 0, 0],   // red
];

/// Bitmap-shaped RGBA difference map.
#[derive(Clone, Debug)]
pub struct HeatMap(Bitmap);

impl HeatMap {
    pub fn as_bitmap(&self) -> &Bitmap {
        &self.0
    }

    pub fn into_bitmap(self) -> Bitmap {
        self.0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }

    pub fn pixels(&self) -> &[u8] {
        self.0.pixels()
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.0.pixel(x, y)
    }

    /// Number of pixels that took part in the comparison (reference fully opaque).
    pub fn compared_pixel_count(&self) -> usize {
        self.0.pixels().chunks_exact(4).filter(|px| px[3] != 0).count()
    }
}

/// Map a normalized intensity in [0, 1] onto the colour ramp.
pub fn ramp_color(intensity: f64) -> [u8; 3] {
    let t = intensity.clamp(0.0, 1.0) * (RAMP.len() - 1) as f64;
    let segment = (t.floor() as usize).min(RAMP.len() - 2);
    let local = t - segment as f64;
    let (from, to) = (RAMP[segment], RAMP[segment + 1]);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let v = from[c] as f64 + (to[c] as f64 - from[c] as f64) * local;
        out[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[inline]
fn heat_pixel(reference: &[u8], compressed: &[u8]) -> [u8; 4] {
    if reference[3] < 255 {
        return [0, 0, 0, 0];
    }
    let total: u32 = (0..3)
        .map(|c| (reference[c] as i32 - compressed[c] as i32).unsigned_abs())
        .sum();
    let intensity = total as f64 / 3.0 / 255.0;
    let [r, g, b] = ramp_color(intensity);
    let alpha = (intensity * ALPHA_SCALE).round().max(ALPHA_FLOOR as f64) as u8;
    [r, g, b, alpha]
}

/// Build the heat map of `compressed` against `reference`.
pub fn diff(reference: &Bitmap, compressed: &Bitmap) -> Result<HeatMap> {
    if reference.dimensions() != compressed.dimensions() {
        return Err(QualityLensError::dimension_mismatch(
            reference.dimensions(),
            compressed.dimensions(),
        ));
    }

    let (width, height) = reference.dimensions();
    let row_bytes = width as usize * 4;
    let mut out = vec![0u8; reference.byte_len()];

    out.par_chunks_mut(row_bytes)
        .zip(reference.pixels().par_chunks(row_bytes))
        .zip(compressed.pixels().par_chunks(row_bytes))
        .for_each(|((dst, a), b)| {
            for ((d, pa), pb) in dst
                .chunks_exact_mut(4)
                .zip(a.chunks_exact(4))
                .zip(b.chunks_exact(4))
            {
                d.copy_from_slice(&heat_pixel(pa, pb));
            }
        });

    Ok(HeatMap(Bitmap::from_rgba(width, height, out)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(width: u32, height: u32) -> Bitmap {
        Bitmap::from_fn(width, height, |x, y| {
            [(x * 13 % 256) as u8, (y * 29 % 256) as u8, 77, 255]
        })
        .unwrap()
    }

    #[test]
    fn identical_bitmaps_are_blue_at_floor() {
        let img = sample(23, 11);
        let map = diff(&img, &img).unwrap();
        assert_eq!(map.dimensions(), (23, 11));
        for px in map.pixels().chunks_exact(4) {
            assert_eq!(px, &[0, 0, 255, ALPHA_FLOOR]);
        }
    }

    #[test]
    fn maximum_difference_is_opaque_red() {
        let a = Bitmap::filled(3, 3, [0, 0, 0, 255]).unwrap();
        let b = Bitmap::filled(3, 3, [255, 255, 255, 255]).unwrap();
        let map = diff(&a, &b).unwrap();
        assert_eq!(map.pixel(1, 1), [255, 0, 0, 225]);
    }

    #[test]
    fn non_opaque_reference_is_transparent() {
        let a = Bitmap::from_rgba(2, 1, vec![10, 10, 10, 254, 10, 10, 10, 255]).unwrap();
        let b = Bitmap::filled(2, 1, [200, 200, 200, 255]).unwrap();
        let map = diff(&a, &b).unwrap();
        assert_eq!(map.pixel(0, 0), [0, 0, 0, 0]);
        assert_ne!(map.pixel(1, 0)[3], 0);
        assert_eq!(map.compared_pixel_count(), 1);
    }

    #[test]
    fn ramp_hits_every_stop() {
        assert_eq!(ramp_color(0.0), [0, 0, 255]);
        assert_eq!(ramp_color(0.25), [0, 255, 255]);
        assert_eq!(ramp_color(0.5), [0, 255, 0]);
        assert_eq!(ramp_color(0.75), [255, 255, 0]);
        assert_eq!(ramp_color(1.0), [255, 0, 0]);
    }

    #[test]
    fn ramp_interpolates_between_stops() {
        // halfway blue -> cyan
        assert_eq!(ramp_color(0.125), [0, 128, 255]);
        // halfway yellow -> red
        assert_eq!(ramp_color(0.875), [255, 128, 0]);
    }

    #[test]
    fn alpha_floor_applies_to_small_differences() {
        // mean difference 20/255 => 0.078 * 225 = 17.6 < floor
        let a = Bitmap::filled(1, 1, [100, 100, 100, 255]).unwrap();
        let b = Bitmap::filled(1, 1, [120, 120, 120, 255]).unwrap();
        assert_eq!(diff(&a, &b).unwrap().pixel(0, 0)[3], ALPHA_FLOOR);
    }

    #[test]
    fn alpha_grows_with_difference() {
        // mean difference 102/255 = 0.4 => alpha 90
        let a = Bitmap::filled(1, 1, [0, 0, 0, 255]).unwrap();
        let b = Bitmap::filled(1, 1, [102, 102, 102, 255]).unwrap();
        assert_eq!(diff(&a, &b).unwrap().pixel(0, 0)[3], 90);
    }

    #[test]
    fn dimension_mismatch_rejected() {
        let err = diff(&sample(4, 4), &sample(4, 3)).unwrap_err();
        assert!(matches!(err, QualityLensError::DimensionMismatch { .. }));
    }

    #[test]
    fn heat_map_exposes_its_bitmap() {
        let map = diff(&sample(4, 4), &sample(4, 4)).unwrap();
        assert_eq!(map.as_bitmap().dimensions(), (4, 4));
        assert_eq!(map.into_bitmap().pixel_count(), 16);
    }
}
