// src/engine/decoder.rs
//
// Decode routing for the supported listing-photo containers:
// JPEG/JFIF via mozjpeg, PNG via zune-png, WEBP via libwebp,
// BMP/GIF/TIFF via the image crate. Anything else is rejected up front.

use crate::engine::common::run_with_panic_policy;
use crate::engine::{MAX_DIMENSION, MAX_PIXELS};
use crate::error::ListingImageError;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, ImageReader, RgbImage, RgbaImage,
};
use mozjpeg::Decompress;
use std::io::Cursor;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

// Local alias keeps decode errors in the crate taxonomy (CodecError,
// ResourceLimit) instead of collapsing into an opaque type.
type DecoderResult<T> = std::result::Result<T, ListingImageError>;

/// Detect the container format from magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Containers a listing photo may arrive in. Everything else fails decode
/// with `UnsupportedFormat` before any pixel allocation.
pub fn is_supported_format(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Bmp
            | ImageFormat::Gif
            | ImageFormat::Tiff
    )
}

/// Unified decode entrypoint:
/// - Detect the format once (magic bytes) and gate on the supported set
/// - Route JPEG to mozjpeg, PNG to zune-png, WEBP to libwebp,
///   BMP/GIF/TIFF to the image crate (GIF decodes to its first frame)
/// - Return the decoded buffer and the detected format
pub fn decode_image(bytes: &[u8]) -> DecoderResult<(DynamicImage, ImageFormat)> {
    let format = detect_format(bytes)
        .ok_or_else(|| ListingImageError::unsupported_format("unknown container"))?;
    if !is_supported_format(format) {
        return Err(ListingImageError::unsupported_format(
            format.extensions_str().first().copied().unwrap_or("unknown"),
        ));
    }
    let img = match format {
        ImageFormat::Jpeg => decode_jpeg_mozjpeg(bytes)?,
        ImageFormat::Png => decode_png_zune(bytes)?,
        ImageFormat::WebP => decode_webp_libwebp(bytes)?,
        _ => decode_with_image_crate(bytes)?,
    };
    Ok((img, format))
}

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo), much faster than the
/// pure-Rust decoder on the camera-sized photos sellers feed in.
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        // Truncated uploads are common; the EOI scan catches them before
        // libjpeg starts emitting half-gray scanlines.
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(ListingImageError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            ListingImageError::decode_failed(format!("mozjpeg init failed: {e:?}"))
        })?;
        let mut decompress = decompress.rgb().map_err(|e| {
            ListingImageError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width()).map_err(|_| {
            ListingImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION)
        })?;
        let height = u32::try_from(decompress.height()).map_err(|_| {
            ListingImageError::dimension_exceeds_limit(u32::MAX, MAX_DIMENSION)
        })?;
        check_dimensions(width, height)?;

        let rows: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            ListingImageError::decode_failed(format!("mozjpeg scanline read failed: {e:?}"))
        })?;
        let flat: Vec<u8> = rows.into_iter().flatten().collect();

        let rgb = RgbImage::from_raw(width, height, flat).ok_or_else(|| {
            ListingImageError::decode_failed("mozjpeg: raw buffer did not match dimensions")
        })?;
        Ok(DynamicImage::ImageRgb8(rgb))
    })
}

/// Decode PNG using zune-png. 16-bit channels are stripped to 8-bit, which is
/// all the JPEG output side can carry anyway.
pub fn decode_png_zune(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(data, options);
        let pixels = decoder
            .decode()
            .map_err(|e| ListingImageError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .get_info()
            .ok_or_else(|| ListingImageError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(ListingImageError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .get_colorspace()
            .ok_or_else(|| ListingImageError::decode_failed("png: missing colorspace"))?;

        let img = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(|| {
                    ListingImageError::decode_failed("png: failed to build RGB image")
                })?,
            ColorSpace::RGBA | ColorSpace::YCbCr | ColorSpace::BGRA | ColorSpace::ARGB => {
                RgbaImage::from_raw(width, height, buf)
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| {
                        ListingImageError::decode_failed("png: failed to build RGBA image")
                    })?
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| {
                    ListingImageError::decode_failed("png: failed to build Luma image")
                })?,
            ColorSpace::LumaA => GrayAlphaImage::from_raw(width, height, buf)
                .map(DynamicImage::ImageLumaA8)
                .ok_or_else(|| {
                    ListingImageError::decode_failed("png: failed to build LumaA image")
                })?,
            other => {
                return Err(ListingImageError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };

        Ok(img)
    })
}

/// Decode WEBP using libwebp. Animated files fall back to the image crate,
/// which yields the first frame.
pub fn decode_webp_libwebp(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        // Read the header first so malformed files fail before any pixel
        // buffer is allocated.
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            ListingImageError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                ListingImageError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| ListingImageError::decode_failed("webp: decode failed"))?;

        // The header and the decoded buffer can disagree on crafted files.
        check_dimensions(decoded.width(), decoded.height())?;

        Ok(decoded.to_image())
    })
}

/// Decode BMP/GIF/TIFF through the image crate under panic containment.
pub fn decode_with_image_crate(data: &[u8]) -> DecoderResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| ListingImageError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Reject dimensions that would blow past sane allocation limits
/// (decompression bombs).
pub fn check_dimensions(width: u32, height: u32) -> DecoderResult<()> {
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(ListingImageError::dimension_exceeds_limit(
            width.max(height),
            MAX_DIMENSION,
        ));
    }
    let pixels = width as u64 * height as u64;
    if pixels > MAX_PIXELS {
        return Err(ListingImageError::pixel_count_exceeds_limit(
            pixels, MAX_PIXELS,
        ));
    }
    Ok(())
}

/// Check declared header dimensions before committing to a full decode.
/// Unknown containers pass through; decode_image rejects them with a better
/// error than this probe could give.
pub fn ensure_dimensions_safe(bytes: &[u8]) -> DecoderResult<()> {
    let cursor = Cursor::new(bytes);
    if let Ok(reader) = ImageReader::new(cursor).with_guessed_format() {
        if let Ok((width, height)) = reader.into_dimensions() {
            return check_dimensions(width, height);
        }
    }
    Ok(())
}
