#![no_main]

use libfuzzer_sys::fuzz_target;
use listing_image::engine::decode_image;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let _ = decode_image(data);
});
