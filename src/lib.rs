// lib.rs
//
// listing-image: batch image normalization for marketplace listings
//
// Design goals:
// - One fixed stage order, no per-image surprises
// - Minimum resolution wins over every other dimension rule
// - A missed byte budget degrades the result, never fails it
// - Buffer in, buffer out; only the batch driver touches disk

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod config;
pub mod engine;
pub mod error;

use std::io::{BufRead, BufReader, Cursor, Seek};
use std::path::Path;

use image::{DynamicImage, ImageReader};
use tracing::debug;

pub use config::{AspectRatio, NormalizeConfig, OutputFormat, ResizeFilter};
pub use engine::{
    collect_image_files, BatchJob, BatchOutcome, BatchSuccess, BatchSummary, EncodedResult,
    NormalizeFlags, OutputNamer, SequenceNamer, Source, StemNamer,
};
pub use error::{ErrorCategory, ListingImageError, Result};

/// Normalize one image held in memory.
///
/// Runs the full staged pipeline: decode, alpha flatten, minimum-resolution
/// upscale, aspect crop, post-crop re-verify, long-side cap, then a quality
/// search that re-encodes until the output fits `max_output_bytes`. A budget
/// that cannot be met at the floor quality still returns the floor encoding,
/// with `met_goal = false` on the result.
pub fn normalize(bytes: &[u8], config: &NormalizeConfig) -> Result<EncodedResult> {
    config.validate()?;
    engine::ensure_dimensions_safe(bytes)?;
    let (img, format) = engine::decode_image(bytes)?;
    debug!(
        input_bytes = bytes.len(),
        width = img.width(),
        height = img.height(),
        ?format,
        "decoded input"
    );
    normalize_decoded(img, config)
}

/// Normalize an already-decoded image.
///
/// Skips format sniffing and decode, otherwise identical to [`normalize`].
pub fn normalize_image(img: DynamicImage, config: &NormalizeConfig) -> Result<EncodedResult> {
    config.validate()?;
    normalize_decoded(img, config)
}

fn normalize_decoded(img: DynamicImage, config: &NormalizeConfig) -> Result<EncodedResult> {
    let (rgb, flags) = engine::normalize_dimensions(img, config)?;
    engine::encode_with_budget(&rgb, config, flags)
}

/// Header-only metadata, read without decoding pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectMetadata {
    pub width: u32,
    pub height: u32,
    pub format: Option<String>,
}

fn read_inspect_metadata<R: BufRead + Seek>(reader: R) -> Result<InspectMetadata> {
    let reader = ImageReader::new(reader).with_guessed_format().map_err(|e| {
        ListingImageError::decode_failed(format!("failed to read image header: {e}"))
    })?;

    let format = reader.format().map(|f| format!("{f:?}").to_lowercase());
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ListingImageError::decode_failed(format!("failed to read dimensions: {e}")))?;

    Ok(InspectMetadata {
        width,
        height,
        format,
    })
}

/// Inspect image metadata WITHOUT decoding pixels.
/// This reads only the header bytes - extremely fast (<1ms).
///
/// Use this to check dimensions before processing, or to reject
/// images that are too large without wasting CPU on decoding.
pub fn inspect_header_from_bytes(data: &[u8]) -> Result<InspectMetadata> {
    read_inspect_metadata(Cursor::new(data))
}

/// Inspect image metadata straight from a file, without loading the pixels.
pub fn inspect_header_from_path(path: impl AsRef<Path>) -> Result<InspectMetadata> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| ListingImageError::file_read_failed(path.display().to_string(), e))?;
    read_inspect_metadata(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn config_is_checked_before_any_decode_work() {
        let mut config = NormalizeConfig::new();
        config.quality_step = 0;
        // The bytes are garbage; the config error must win, proving the order.
        let err = normalize(b"definitely not an image", &config).unwrap_err();
        assert!(matches!(err, ListingImageError::InvalidConfig { .. }));
        assert!(err.halts_batch());
    }

    #[test]
    fn garbage_bytes_report_unsupported_format() {
        let err = normalize(b"plain text payload", &NormalizeConfig::new()).unwrap_err();
        assert!(matches!(err, ListingImageError::UnsupportedFormat { .. }));
        assert!(!err.halts_batch());
    }

    #[test]
    fn unconstrained_config_keeps_dimensions() {
        let result = normalize(&png_bytes(64, 48), &NormalizeConfig::new()).unwrap();
        assert_eq!((result.final_width, result.final_height), (64, 48));
        assert_eq!(result.quality_used, 95);
        assert!(result.met_goal);
        assert!(result.flags.is_empty());
        assert_eq!(&result.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn predecoded_images_take_the_same_path() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(80, 80, image::Rgb([10, 20, 30])));
        let result = normalize_image(img, &NormalizeConfig::new()).unwrap();
        assert_eq!((result.final_width, result.final_height), (80, 80));
        assert!(result.met_goal);
    }

    mod inspect_tests {
        use super::*;

        #[test]
        fn header_reports_dimensions_without_decoding() {
            let meta = inspect_header_from_bytes(&png_bytes(320, 200)).unwrap();
            assert_eq!((meta.width, meta.height), (320, 200));
            assert_eq!(meta.format.as_deref(), Some("png"));
        }

        #[test]
        fn header_rejects_garbage() {
            assert!(inspect_header_from_bytes(b"not an image").is_err());
        }

        #[test]
        fn header_reads_from_disk() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("probe.png");
            std::fs::write(&path, png_bytes(12, 34)).unwrap();
            let meta = inspect_header_from_path(&path).unwrap();
            assert_eq!((meta.width, meta.height), (12, 34));
        }

        #[test]
        fn missing_file_reports_read_failure() {
            let err = inspect_header_from_path("/no/such/listing.png").unwrap_err();
            assert!(matches!(err, ListingImageError::FileReadFailed { .. }));
        }
    }
}
