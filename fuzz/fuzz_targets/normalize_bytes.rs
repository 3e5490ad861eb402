#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use listing_image::{normalize, AspectRatio, NormalizeConfig};

#[derive(Arbitrary, Debug)]
struct NormalizeInput<'a> {
    min_width: u16,
    min_height: u16,
    max_long_side: u16,
    ratio: Option<(u8, u8)>,
    bytes: &'a [u8],
}

fuzz_target!(|input: NormalizeInput<'_>| {
    if input.bytes.is_empty() {
        return;
    }

    let mut config = NormalizeConfig::new();
    // Bounded so a 1x1 seed cannot demand a gigapixel upscale.
    config.min_width = u32::from(input.min_width) % 2048;
    config.min_height = u32::from(input.min_height) % 2048;
    config.max_long_side = u32::from(input.max_long_side) % 4096;
    if let Some((w, h)) = input.ratio {
        config.target_ratio = Some(AspectRatio::new(
            u32::from(w).clamp(1, 32),
            u32::from(h).clamp(1, 32),
        ));
    }

    let _ = normalize(input.bytes, &config);
});
