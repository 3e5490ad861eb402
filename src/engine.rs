// src/engine.rs
//
// The core of listing-image. A staged normalizer that:
// 1. Decodes from an in-memory buffer, format-sniffed
// 2. Flattens, upscales, crops and caps in one fixed order
// 3. Re-encodes under a byte budget by walking quality down
//
// This file is a facade that delegates to the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
/// This is the same limit used by libvips/sharp.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 300MB as opaque RGB. Beyond this is not a listing photo.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

mod batch;
mod common;
mod decoder;
mod encoder;
mod geometry;
mod io;
mod pipeline;
mod pool;

// Re-export commonly used types and functions
pub use batch::{
    collect_image_files, BatchJob, BatchOutcome, BatchSuccess, BatchSummary, OutputNamer,
    SequenceNamer, StemNamer, SUPPORTED_INPUT_EXTENSIONS,
};
pub use decoder::{
    check_dimensions, decode_image, detect_format, ensure_dimensions_safe, is_supported_format,
};
pub use encoder::{encode_jpeg, encode_png, encode_with_budget, EncodedResult};
pub use geometry::{
    cap_long_side, crop_rect_for_ratio, fits_minimum, minimum_upscale, CapPlan, CropRect,
};
pub use io::{open_mapped, write_atomic, Source};
pub use pipeline::{crop_rgb, flatten_to_opaque_rgb, normalize_dimensions, resize_rgb, NormalizeFlags};
pub use pool::{get_pool, MAX_POOL_THREADS};
