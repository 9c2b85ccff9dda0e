#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct DisplayInput {
    reference: u64,
    current: u64,
    name: String,
    alias: bool,
}

fuzz_target!(|input: DisplayInput| {
    quality_lens::fuzzing::display_values(
        input.reference,
        input.current,
        &input.name,
        input.alias,
    );
});
