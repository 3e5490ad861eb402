// src/engine/geometry.rs
//
// Pure dimension math for the normalization stages. No pixels move here;
// every function maps current dimensions plus policy to a target plan, so
// the whole layer is testable without touching a codec.

use crate::config::AspectRatio;

/// Centered crop rectangle inside a source buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// True when the rectangle covers the whole source, i.e. cropping would
    /// be a no-op.
    pub fn is_full_frame(&self, src_width: u32, src_height: u32) -> bool {
        self.x == 0 && self.y == 0 && self.width == src_width && self.height == src_height
    }
}

/// Outcome of resolving the long-side cap against the minimums.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapPlan {
    /// No cap configured, or already within it.
    Keep,
    /// Shrink so the long side lands exactly on the cap.
    Shrink(u32, u32),
    /// Shrinking would break a minimum; keep the current size and report the
    /// cap as relaxed. Minimum resolution is the harder marketplace
    /// requirement, so it wins.
    Relax,
}

/// Whether both minimums hold. A zero minimum is "no constraint" on that
/// axis.
pub fn fits_minimum(width: u32, height: u32, min_width: u32, min_height: u32) -> bool {
    (min_width == 0 || width >= min_width) && (min_height == 0 || height >= min_height)
}

/// Target dimensions for the minimum-resolution upscale, or None when the
/// buffer already satisfies both minimums.
///
/// The scale factor is `max(min_width/w, min_height/h)` so the tighter axis
/// drives both, and the result rounds up, so a satisfied axis can only
/// overshoot, never undershoot.
///
/// ```
/// use listing_image::engine::minimum_upscale;
///
/// assert_eq!(minimum_upscale(800, 600, 1350, 1350), Some((1800, 1350)));
/// assert_eq!(minimum_upscale(2000, 2000, 1350, 1350), None);
/// ```
pub fn minimum_upscale(
    width: u32,
    height: u32,
    min_width: u32,
    min_height: u32,
) -> Option<(u32, u32)> {
    if width == 0 || height == 0 {
        return None;
    }
    if fits_minimum(width, height, min_width, min_height) {
        return None;
    }
    let scale_w = f64::from(min_width) / f64::from(width);
    let scale_h = f64::from(min_height) / f64::from(height);
    let scale = scale_w.max(scale_h);
    let target_w = ((f64::from(width) * scale).ceil() as u32).max(1);
    let target_h = ((f64::from(height) * scale).ceil() as u32).max(1);
    Some((target_w, target_h))
}

/// Centered crop rectangle bringing `width x height` to the target ratio.
///
/// The longer-than-target axis loses pixels symmetrically; the other axis is
/// kept whole. The span rounds to nearest, offsets floor, and the rectangle
/// never leaves the source bounds.
///
/// ```
/// use listing_image::engine::crop_rect_for_ratio;
/// use listing_image::AspectRatio;
///
/// let rect = crop_rect_for_ratio(2000, 1000, AspectRatio::square());
/// assert_eq!((rect.x, rect.y, rect.width, rect.height), (500, 0, 1000, 1000));
/// ```
pub fn crop_rect_for_ratio(width: u32, height: u32, ratio: AspectRatio) -> CropRect {
    let r = ratio.as_f64();
    let current = f64::from(width) / f64::from(height.max(1));

    if current > r {
        // Relatively wider than the target: trim width, keep height.
        let crop_w = ((f64::from(height) * r).round() as u32).clamp(1, width);
        CropRect {
            x: (width - crop_w) / 2,
            y: 0,
            width: crop_w,
            height,
        }
    } else {
        // Relatively taller or equal: trim height, keep width.
        let crop_h = ((f64::from(width) / r).round() as u32).clamp(1, height);
        CropRect {
            x: 0,
            y: (height - crop_h) / 2,
            width,
            height: crop_h,
        }
    }
}

/// Resolve the long-side cap against the minimums.
///
/// Shrinking happens only when the scaled-down short side still meets its
/// minimum; otherwise the current size stays and the caller flags the result
/// as relaxed. The short side truncates on shrink, so the check is
/// conservative.
pub fn cap_long_side(
    width: u32,
    height: u32,
    max_long_side: u32,
    min_width: u32,
    min_height: u32,
) -> CapPlan {
    if max_long_side == 0 || width.max(height) <= max_long_side {
        return CapPlan::Keep;
    }
    let scale = f64::from(max_long_side) / f64::from(width.max(height));
    let (target_w, target_h) = if width >= height {
        (
            max_long_side,
            ((f64::from(height) * scale) as u32).max(1),
        )
    } else {
        (
            ((f64::from(width) * scale) as u32).max(1),
            max_long_side,
        )
    };
    if fits_minimum(target_w, target_h, min_width, min_height) {
        CapPlan::Shrink(target_w, target_h)
    } else {
        CapPlan::Relax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod minimum_upscale_tests {
        use super::*;

        #[test]
        fn returns_none_when_already_large_enough() {
            assert_eq!(minimum_upscale(1350, 1350, 1350, 1350), None);
            assert_eq!(minimum_upscale(2000, 1500, 1350, 1350), None);
            assert_eq!(minimum_upscale(100, 100, 0, 0), None);
        }

        #[test]
        fn scales_both_axes_by_the_tighter_one() {
            // 800x600 to min 1350x1350: height is tighter (1350/600 = 2.25),
            // so width rides along to 1800.
            assert_eq!(minimum_upscale(800, 600, 1350, 1350), Some((1800, 1350)));
        }

        #[test]
        fn zero_minimum_disables_that_axis() {
            // Only width constrained: 500x400 to min width 1000.
            assert_eq!(minimum_upscale(500, 400, 1000, 0), Some((1000, 800)));
            // Only height constrained.
            assert_eq!(minimum_upscale(500, 400, 0, 800), Some((1000, 800)));
        }

        #[test]
        fn ceil_rounding_never_undershoots() {
            // 1349/1350 scale on a 1349x1349 square must land on 1350, not 1349.
            let (w, h) = minimum_upscale(1349, 1349, 1350, 1350).unwrap();
            assert!(w >= 1350 && h >= 1350);

            // Awkward ratio: 333x1000 to min 500x500.
            let (w, h) = minimum_upscale(333, 1000, 500, 500).unwrap();
            assert!(w >= 500 && h >= 500);
        }

        #[test]
        fn one_satisfied_axis_only_overshoots() {
            // Height already exceeds its minimum; the width-driven upscale
            // pushes it further up, never down.
            let (w, h) = minimum_upscale(600, 2000, 1200, 1000).unwrap();
            assert_eq!(w, 1200);
            assert_eq!(h, 4000);
        }
    }

    mod crop_rect_tests {
        use super::*;

        #[test]
        fn wide_source_trims_width_centered() {
            let rect = crop_rect_for_ratio(2000, 1000, AspectRatio::square());
            assert_eq!(rect, CropRect { x: 500, y: 0, width: 1000, height: 1000 });
        }

        #[test]
        fn tall_source_trims_height_centered() {
            let rect = crop_rect_for_ratio(1000, 2000, AspectRatio::square());
            assert_eq!(rect, CropRect { x: 0, y: 500, width: 1000, height: 1000 });
        }

        #[test]
        fn matching_ratio_is_full_frame() {
            let rect = crop_rect_for_ratio(1350, 1800, AspectRatio::portrait_3_4());
            assert!(rect.is_full_frame(1350, 1800));
        }

        #[test]
        fn odd_remainder_floors_the_offset() {
            // 1001 wide to square over height 1000: crop 1000 wide, 1 spare
            // pixel, offset floors to 0.
            let rect = crop_rect_for_ratio(1001, 1000, AspectRatio::square());
            assert_eq!(rect.x, 0);
            assert_eq!(rect.width, 1000);
            assert_eq!(rect.height, 1000);
        }

        #[test]
        fn rect_always_stays_in_bounds() {
            let cases = [
                (1, 1),
                (1, 10_000),
                (10_000, 1),
                (1351, 1800),
                (1920, 1080),
                (3, 7),
            ];
            for (w, h) in cases {
                for ratio in [
                    AspectRatio::square(),
                    AspectRatio::portrait_3_4(),
                    AspectRatio::new(16, 9),
                ] {
                    let rect = crop_rect_for_ratio(w, h, ratio);
                    assert!(rect.x + rect.width <= w, "{w}x{h} {ratio:?}");
                    assert!(rect.y + rect.height <= h, "{w}x{h} {ratio:?}");
                    assert!(rect.width >= 1 && rect.height >= 1);
                }
            }
        }

        #[test]
        fn portrait_target_on_landscape_source() {
            // 1920x1080 to 3:4: keep height, width becomes round(1080 * 0.75).
            let rect = crop_rect_for_ratio(1920, 1080, AspectRatio::portrait_3_4());
            assert_eq!(rect.width, 810);
            assert_eq!(rect.height, 1080);
            assert_eq!(rect.x, (1920 - 810) / 2);
        }
    }

    mod cap_plan_tests {
        use super::*;

        #[test]
        fn keeps_when_unconfigured_or_within() {
            assert_eq!(cap_long_side(4000, 4000, 0, 1500, 1500), CapPlan::Keep);
            assert_eq!(cap_long_side(2999, 2000, 3000, 1500, 1500), CapPlan::Keep);
            assert_eq!(cap_long_side(3000, 3000, 3000, 1500, 1500), CapPlan::Keep);
        }

        #[test]
        fn shrinks_to_exact_cap_when_minimums_survive() {
            assert_eq!(
                cap_long_side(4000, 4000, 3000, 1500, 1500),
                CapPlan::Shrink(3000, 3000)
            );
            // Landscape: 6000x3000 capped to 3000 leaves 1500 height, right at
            // the minimum.
            assert_eq!(
                cap_long_side(6000, 3000, 3000, 1500, 1500),
                CapPlan::Shrink(3000, 1500)
            );
        }

        #[test]
        fn relaxes_when_shrink_would_break_minimum() {
            // 1400x1400 upscaled to 1500x1500, cap 1450: shrinking back under
            // the minimum is not allowed.
            assert_eq!(cap_long_side(1500, 1500, 1450, 1500, 1500), CapPlan::Relax);
            // 6000x3001 capped to 3000 would leave height just over 1500, but
            // truncation drops it to 1500, which still fits.
            assert_eq!(
                cap_long_side(6000, 3001, 3000, 1500, 1500),
                CapPlan::Shrink(3000, 1500)
            );
            // Short side falls below minimum after shrink.
            assert_eq!(cap_long_side(6000, 2999, 3000, 1500, 1500), CapPlan::Relax);
        }

        #[test]
        fn zero_minimums_always_allow_the_shrink() {
            assert_eq!(
                cap_long_side(5000, 1000, 2500, 0, 0),
                CapPlan::Shrink(2500, 500)
            );
        }
    }
}
