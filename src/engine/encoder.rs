// src/engine/encoder.rs
//
// Encoders for the normalized buffer: JPEG (mozjpeg) with the size-budgeted
// quality search, PNG (image + oxipng) as the lossless escape hatch.
//
// Everything here takes an opaque RGB8 buffer. The pipeline flattens before
// encoding, so the encoders never see alpha.

use crate::config::{NormalizeConfig, OutputFormat};
use crate::engine::common::run_with_panic_policy;
use crate::engine::pipeline::NormalizeFlags;
use crate::engine::MAX_DIMENSION;
use crate::error::ListingImageError;
use image::RgbImage;
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::io::Cursor;
use tracing::{debug, warn};

// Local alias keeps encode errors in the crate taxonomy.
type EncoderResult<T> = std::result::Result<T, ListingImageError>;

/// The outcome of a normalize call: encoded bytes plus everything a caller
/// needs to report on what happened without re-decoding them.
#[derive(Clone, Debug)]
pub struct EncodedResult {
    /// The encoded image, ready to write or upload.
    pub bytes: Vec<u8>,
    pub final_width: u32,
    pub final_height: u32,
    /// Quality the accepted encode used. 100 for lossless PNG output.
    pub quality_used: u8,
    /// Length of `bytes`, kept separate so summaries survive after the
    /// payload has been written out and dropped.
    pub size_bytes: u64,
    /// Whether the accepted encode fit `max_output_bytes`. False means the
    /// quality floor was reached and the bytes are still over budget.
    pub met_goal: bool,
    /// What the dimension stages did to this image.
    pub flags: NormalizeFlags,
}

impl EncodedResult {
    /// True when the long-side cap had to be waived to hold the minimums.
    pub fn size_constraint_relaxed(&self) -> bool {
        self.flags.contains(NormalizeFlags::SIZE_CONSTRAINT_RELAXED)
    }
}

/// Smoothing rises as quality drops; at low quality a little blur costs
/// less than the blocking artifacts it prevents.
fn smoothing_for(quality: u8) -> u8 {
    if quality >= 90 {
        0
    } else if quality >= 70 {
        5
    } else if quality >= 60 {
        10
    } else {
        18
    }
}

/// Encode an opaque RGB buffer to baseline-compatible progressive JPEG.
///
/// One full mozjpeg run per call: the quality search re-encodes from the
/// same pixels every step rather than recompressing its own output.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let quality = quality.min(100);
        let (w, h) = img.dimensions();
        let pixels: &[u8] = img.as_raw();

        // mozjpeg aborts via longjmp on bad input; rule it out up front.
        if w == 0 || h == 0 {
            return Err(ListingImageError::internal_panic(
                "zero-dimension buffer reached the encoder",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ListingImageError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }
        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(ListingImageError::corrupted_image());
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(f32::from(quality));

        // 4:2:0 subsampling plus optimized progressive scans. Listing photos
        // tolerate chroma loss far better than they tolerate extra bytes.
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(smoothing_for(quality));

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let mut writer = comp.start_compress(&mut output).map_err(|e| {
            ListingImageError::encode_failed(
                "jpeg",
                format!("mozjpeg: failed to start compress: {e:?}"),
            )
        })?;

        let stride = w as usize * 3;
        for row in pixels.chunks(stride) {
            writer.write_scanlines(row).map_err(|e| {
                ListingImageError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to write scanlines: {e:?}"),
                )
            })?;
        }

        writer.finish().map_err(|e| {
            ListingImageError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
        })?;

        Ok(output)
    })
}

/// Encode an opaque RGB buffer to PNG, then recompress with oxipng.
pub fn encode_png(img: &RgbImage) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .map_err(|e| {
                ListingImageError::encode_failed("png", format!("PNG encode failed: {e}"))
            })?;

        // oxipng で再圧縮してサイズを最適化（無劣化）
        let mut options = oxipng::Options::from_preset(4);
        // Fresh encode, nothing worth keeping beyond the pixels.
        options.strip = oxipng::StripChunks::Safe;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ListingImageError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode the normalized buffer under the configured byte budget.
///
/// JPEG walks the quality schedule from `quality_start` down by
/// `quality_step`, re-encoding in full each step, and accepts the first
/// attempt that fits `max_output_bytes`. If even the lowest scheduled
/// quality is over budget, that floor encode is returned with
/// `met_goal = false`; an oversized result is a reported condition here,
/// not an error. PNG has no quality axis, so it encodes once and reports
/// whether it happened to fit.
pub fn encode_with_budget(
    img: &RgbImage,
    config: &NormalizeConfig,
    flags: NormalizeFlags,
) -> EncoderResult<EncodedResult> {
    let (final_width, final_height) = img.dimensions();

    match config.output {
        OutputFormat::Png => {
            let bytes = encode_png(img)?;
            let size_bytes = bytes.len() as u64;
            let met_goal = size_bytes <= config.max_output_bytes;
            if !met_goal {
                warn!(
                    size = size_bytes,
                    budget = config.max_output_bytes,
                    "lossless PNG exceeds the size budget"
                );
            }
            Ok(EncodedResult {
                bytes,
                final_width,
                final_height,
                quality_used: 100,
                size_bytes,
                met_goal,
                flags,
            })
        }
        OutputFormat::Jpeg => {
            // 品質を段階的に下げて再エンコードし、最初に収まった結果を採用する
            let mut quality = config.quality_start;
            loop {
                let bytes = encode_jpeg(img, quality)?;
                let size_bytes = bytes.len() as u64;
                if size_bytes <= config.max_output_bytes {
                    debug!(quality, size = size_bytes, "quality search fit the budget");
                    return Ok(EncodedResult {
                        bytes,
                        final_width,
                        final_height,
                        quality_used: quality,
                        size_bytes,
                        met_goal: true,
                        flags,
                    });
                }
                match quality.checked_sub(config.quality_step) {
                    Some(next) if next >= config.quality_floor => {
                        debug!(
                            quality,
                            size = size_bytes,
                            next,
                            "over budget, stepping quality down"
                        );
                        quality = next;
                    }
                    _ => {
                        warn!(
                            quality,
                            size = size_bytes,
                            budget = config.max_output_bytes,
                            "size budget unmet at the quality floor, keeping best effort"
                        );
                        return Ok(EncodedResult {
                            bytes,
                            final_width,
                            final_height,
                            quality_used: quality,
                            size_bytes,
                            met_goal: false,
                            flags,
                        });
                    }
                }
            }
        }
    }
}
