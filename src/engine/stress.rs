// src/engine/stress.rs
//
// Stress helper: drives the full pipeline over one input so leak and
// soak harnesses can loop it. Built with `--features stress`.

use crate::engine::codec::JpegCodec;
use crate::engine::common::EngineResult;
use crate::engine::dead_zone::find_dead_zone_threshold;
use crate::engine::guard::InputPolicy;
use crate::engine::io::SourceImage;
use crate::engine::orchestrator::Orchestrator;
use crate::ops::{CompressionSettings, Quality};

const STRESS_QUALITIES: [u8; 4] = [100, 92, 75, 40];
const STRESS_MAX_WIDTH: u32 = 1200;

/// Run a single stress iteration: decode, dead-zone search, then compress at
/// several qualities with and without a width constraint.
pub fn run_stress_iteration(data: &[u8]) -> EngineResult<()> {
    let source = SourceImage::from_bytes(data.to_vec(), &InputPolicy::lenient())?;
    let orchestrator = Orchestrator::new(JpegCodec);
    let reference = source.reference_size();

    for max_width in [None, Some(STRESS_MAX_WIDTH)] {
        let base = CompressionSettings::default().with_max_width(max_width);
        find_dead_zone_threshold(orchestrator.codec(), &source, base, reference)?;

        for quality in STRESS_QUALITIES {
            let settings = CompressionSettings {
                quality: Quality::try_from(quality)?,
                ..base
            };
            // results are dropped; the harness only checks that nothing leaks or fails
            orchestrator.compress(&source, settings, reference)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    #[test]
    fn stress_iteration_on_png() {
        let img = RgbaImage::from_fn(40, 30, |x, y| Rgba([x as u8 * 6, y as u8 * 8, 33, 200]));
        let mut png = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        run_stress_iteration(&png).unwrap();
    }

    #[test]
    fn stress_iteration_rejects_garbage() {
        assert!(run_stress_iteration(b"nope").is_err());
    }
}
