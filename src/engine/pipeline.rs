// src/engine/pipeline.rs
//
// The dimension stages of normalization, in strict order: flatten to opaque
// RGB, enforce minimums, center-crop to the target ratio, re-verify the
// minimums, resolve the long-side cap. Encoding is the encoder's job.
//
// Every stage consumes one buffer and produces the next; after flatten the
// pipeline only ever holds RGB8, which keeps the resize path to a single
// pixel layout.

use crate::config::{NormalizeConfig, ResizeFilter};
use crate::engine::geometry::{cap_long_side, crop_rect_for_ratio, minimum_upscale, CapPlan, CropRect};
use crate::error::ListingImageError;
use bitflags::bitflags;
use fast_image_resize::{self as fir, PixelType, ResizeOptions};
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};
use tracing::{debug, warn};

// Local alias keeps pipeline errors in the crate taxonomy.
type PipelineResult<T> = std::result::Result<T, ListingImageError>;

bitflags! {
    /// What the pipeline actually did to this image. Purely diagnostic;
    /// `SIZE_CONSTRAINT_RELAXED` is the one callers usually act on.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NormalizeFlags: u32 {
        /// Input carried an alpha channel that was composited away.
        const ALPHA_FLATTENED = 1 << 0;
        /// At least one minimum-resolution upscale ran.
        const UPSCALED = 1 << 1;
        /// The center-crop removed pixels.
        const CROPPED = 1 << 2;
        /// The long side was shrunk onto the cap.
        const LONG_SIDE_CAPPED = 1 << 3;
        /// The cap conflicted with the minimums and was waived.
        const SIZE_CONSTRAINT_RELAXED = 1 << 4;
    }
}

/// Flatten any decoded buffer onto an opaque RGB one.
///
/// Alpha composites over a white background, the same background the
/// listing templates use. Already-opaque RGB8 passes through untouched
/// (byte-identical), which makes the stage idempotent. Grayscale widens to
/// RGB without the flag, since there was no alpha to lose. Palette inputs
/// arrive here already expanded by the decoders.
pub fn flatten_to_opaque_rgb(img: DynamicImage) -> (RgbImage, bool) {
    match img {
        DynamicImage::ImageRgb8(rgb) => (rgb, false),
        img if img.color().has_alpha() => (composite_onto_white(&img.to_rgba8()), true),
        img => (img.to_rgb8(), false),
    }
}

fn composite_onto_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        Rgb([
            blend_over_white(r, a),
            blend_over_white(g, a),
            blend_over_white(b, a),
        ])
    })
}

#[inline]
fn blend_over_white(channel: u8, alpha: u8) -> u8 {
    let fg = u32::from(channel) * u32::from(alpha);
    let bg = 255u32 * u32::from(255 - alpha);
    ((fg + bg + 127) / 255) as u8
}

fn resize_alg_for(filter: ResizeFilter) -> fir::ResizeAlg {
    match filter {
        ResizeFilter::Nearest => fir::ResizeAlg::Nearest,
        ResizeFilter::Bilinear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
        ResizeFilter::HighQuality => fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3),
    }
}

fn fallback_filter_for(filter: ResizeFilter) -> image::imageops::FilterType {
    match filter {
        ResizeFilter::Nearest => image::imageops::FilterType::Nearest,
        ResizeFilter::Bilinear => image::imageops::FilterType::Triangle,
        ResizeFilter::HighQuality => image::imageops::FilterType::Lanczos3,
    }
}

/// SIMD resize of an opaque RGB buffer via fast_image_resize, taking the
/// pixel buffer by value so no copy happens on the way in. Falls back to the
/// image crate's resampler if fir rejects the buffer, so a resize oddity
/// degrades to slower instead of failing the item.
pub fn resize_rgb(
    img: RgbImage,
    dst_width: u32,
    dst_height: u32,
    filter: ResizeFilter,
) -> PipelineResult<RgbImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(ListingImageError::resize_failed(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }
    if (src_width, src_height) == (dst_width, dst_height) {
        return Ok(img);
    }

    let required_bytes = (src_width as usize)
        .checked_mul(src_height as usize)
        .and_then(|px| px.checked_mul(3))
        .ok_or_else(|| {
            ListingImageError::resize_failed(
                (src_width, src_height),
                (dst_width, dst_height),
                "source buffer size overflow",
            )
        })?;
    let mut pixels = img.into_raw();
    if pixels.len() < required_bytes {
        return Err(ListingImageError::resize_failed(
            (src_width, src_height),
            (dst_width, dst_height),
            "source buffer smaller than declared dimensions",
        ));
    }

    let options = ResizeOptions::new().resize_alg(resize_alg_for(filter));
    let fir_result: Result<Vec<u8>, String> = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        pixels.as_mut_slice(),
        PixelType::U8x3,
    ) {
        Ok(src_image) => {
            let mut dst_image = fir::images::Image::new(dst_width, dst_height, PixelType::U8x3);
            fir::Resizer::new()
                .resize(&src_image, &mut dst_image, &options)
                .map(|_| dst_image.into_vec())
                .map_err(|e| format!("fir resize error: {e:?}"))
        }
        Err(e) => Err(format!("fir source image error: {e:?}")),
    };

    match fir_result {
        Ok(dst_pixels) => RgbImage::from_raw(dst_width, dst_height, dst_pixels).ok_or_else(|| {
            ListingImageError::resize_failed(
                (src_width, src_height),
                (dst_width, dst_height),
                "resized buffer did not match target dimensions",
            )
        }),
        Err(fir_error) => {
            debug!(error = %fir_error, "fir resize failed, using image crate fallback");
            let rgb = RgbImage::from_raw(src_width, src_height, pixels).ok_or_else(|| {
                ListingImageError::resize_failed(
                    (src_width, src_height),
                    (dst_width, dst_height),
                    "failed to rebuild source buffer for fallback resize",
                )
            })?;
            Ok(image::imageops::resize(
                &rgb,
                dst_width,
                dst_height,
                fallback_filter_for(filter),
            ))
        }
    }
}

/// Cut the rectangle out of the buffer. The geometry layer only hands out
/// in-bounds rectangles; anything else surfaces as an internal error.
pub fn crop_rgb(img: &RgbImage, rect: CropRect) -> PipelineResult<RgbImage> {
    let (width, height) = img.dimensions();
    let in_bounds = rect
        .x
        .checked_add(rect.width)
        .is_some_and(|right| right <= width)
        && rect
            .y
            .checked_add(rect.height)
            .is_some_and(|bottom| bottom <= height);
    if !in_bounds || rect.width == 0 || rect.height == 0 {
        return Err(ListingImageError::crop_out_of_bounds(
            rect.x,
            rect.y,
            rect.width,
            rect.height,
            width,
            height,
        ));
    }
    Ok(image::imageops::crop_imm(img, rect.x, rect.y, rect.width, rect.height).to_image())
}

/// Run the dimension stages over a decoded buffer. Returns the final opaque
/// RGB buffer, ready for the size-budgeted encode, plus diagnostic flags.
pub fn normalize_dimensions(
    img: DynamicImage,
    config: &NormalizeConfig,
) -> PipelineResult<(RgbImage, NormalizeFlags)> {
    let mut flags = NormalizeFlags::empty();

    // Stage 1: alpha/palette flatten. JPEG cannot carry alpha, and doing
    // this first keeps every later stage on one pixel layout.
    let (mut rgb, flattened) = flatten_to_opaque_rgb(img);
    if flattened {
        flags |= NormalizeFlags::ALPHA_FLATTENED;
        debug!(width = rgb.width(), height = rgb.height(), "alpha flattened onto white");
    }

    // Stage 2: pre-crop minimum enforcement. The crop can only remove
    // pixels, so the buffer has to clear the minimums before it.
    if let Some((w, h)) = minimum_upscale(
        rgb.width(),
        rgb.height(),
        config.min_width,
        config.min_height,
    ) {
        debug!(from_w = rgb.width(), from_h = rgb.height(), to_w = w, to_h = h, "upscaling to minimum");
        rgb = resize_rgb(rgb, w, h, config.resize_filter)?;
        flags |= NormalizeFlags::UPSCALED;
    }

    // Stage 3: center-crop to the target ratio.
    if let Some(ratio) = config.target_ratio {
        let rect = crop_rect_for_ratio(rgb.width(), rgb.height(), ratio);
        if !rect.is_full_frame(rgb.width(), rgb.height()) {
            debug!(x = rect.x, y = rect.y, w = rect.width, h = rect.height, "center crop");
            rgb = crop_rgb(&rgb, rect)?;
            flags |= NormalizeFlags::CROPPED;
        }
    }

    // Stage 4: the crop's rounding can land a hair under the minimum;
    // re-verify and upscale again if needed.
    if let Some((w, h)) = minimum_upscale(
        rgb.width(),
        rgb.height(),
        config.min_width,
        config.min_height,
    ) {
        debug!(to_w = w, to_h = h, "post-crop minimum re-verification upscale");
        rgb = resize_rgb(rgb, w, h, config.resize_filter)?;
        flags |= NormalizeFlags::UPSCALED;
    }

    // Stage 5: long-side cap, subordinate to the minimums.
    match cap_long_side(
        rgb.width(),
        rgb.height(),
        config.max_long_side,
        config.min_width,
        config.min_height,
    ) {
        CapPlan::Keep => {}
        CapPlan::Shrink(w, h) => {
            debug!(to_w = w, to_h = h, "capping long side");
            rgb = resize_rgb(rgb, w, h, config.resize_filter)?;
            flags |= NormalizeFlags::LONG_SIDE_CAPPED;
        }
        CapPlan::Relax => {
            warn!(
                width = rgb.width(),
                height = rgb.height(),
                max_long_side = config.max_long_side,
                "long-side cap waived to preserve minimum resolution"
            );
            flags |= NormalizeFlags::SIZE_CONSTRAINT_RELAXED;
        }
    }

    Ok((rgb, flags))
}
