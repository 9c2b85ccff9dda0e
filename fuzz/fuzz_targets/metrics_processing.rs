#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct ScoreInput {
    width: u8,
    height: u8,
    pixels: Vec<u8>,
}

fuzz_target!(|input: ScoreInput| {
    // PSNR/SSIM must stay in range and the heat map must not panic
    quality_lens::fuzzing::score_pixels(input.width, input.height, &input.pixels);
});
