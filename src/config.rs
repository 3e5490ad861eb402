// src/config.rs
//
// Normalization policy vocabulary.
// One NormalizeConfig value describes everything a single invocation needs;
// the per-listing constants live here as named presets instead of being
// copy-pasted around call sites.

use crate::error::{ListingImageError, Result};

/// Default hard ceiling on output size: 1.9 MiB, the marketplace upload limit
/// the quality search aims for.
pub const DEFAULT_SIZE_BUDGET_BYTES: u64 = 1_992_294;

/// Default quality schedule: start at 95, step down by 5, give up below 5.
pub const DEFAULT_QUALITY_START: u8 = 95;
pub const DEFAULT_QUALITY_FLOOR: u8 = 5;
pub const DEFAULT_QUALITY_STEP: u8 = 5;

/// Target aspect ratio as a rational, e.g. 3:4 for portrait listing images.
///
/// Kept rational rather than float so configs compare exactly and the crop
/// math controls its own rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 3:4 portrait, the main-image shape most marketplaces want.
    pub fn portrait_3_4() -> Self {
        Self::new(3, 4)
    }

    /// 1:1 square, used for gallery and variant images.
    pub fn square() -> Self {
        Self::new(1, 1)
    }

    /// width / height as a float, for ratio comparisons.
    pub fn as_f64(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Parse "3:4" or "3/4" style text.
    pub fn parse(text: &str) -> Result<Self> {
        let (w, h) = text
            .split_once(':')
            .or_else(|| text.split_once('/'))
            .ok_or_else(|| {
                ListingImageError::invalid_config(
                    "target_ratio",
                    text.to_string(),
                    "expected WIDTH:HEIGHT, e.g. 3:4",
                )
            })?;
        let width: u32 = w.trim().parse().map_err(|_| {
            ListingImageError::invalid_config(
                "target_ratio",
                text.to_string(),
                "width term is not a positive integer",
            )
        })?;
        let height: u32 = h.trim().parse().map_err(|_| {
            ListingImageError::invalid_config(
                "target_ratio",
                text.to_string(),
                "height term is not a positive integer",
            )
        })?;
        if width == 0 || height == 0 {
            return Err(ListingImageError::invalid_config(
                "target_ratio",
                text.to_string(),
                "ratio terms must be non-zero",
            ));
        }
        Ok(Self::new(width, height))
    }
}

impl std::str::FromStr for AspectRatio {
    type Err = ListingImageError;

    fn from_str(text: &str) -> Result<Self> {
        Self::parse(text)
    }
}

/// Resampling filter policy: trade resample speed against smoothing quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeFilter {
    /// Fastest, blocky on upscale
    Nearest,
    /// Balanced
    Bilinear,
    /// Lanczos3 convolution, best for listing photos
    HighQuality,
}

impl ResizeFilter {
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            "high-quality" | "lanczos" => Ok(Self::HighQuality),
            other => Err(ListingImageError::invalid_config(
                "resize_filter",
                other.to_string(),
                "expected nearest, bilinear, or high-quality",
            )),
        }
    }
}

impl Default for ResizeFilter {
    fn default() -> Self {
        Self::HighQuality
    }
}

/// Output container for the encoded result.
///
/// JPEG is the format every listing flow uploads; it is the only one whose
/// size the quality search can trade against. PNG is a lossless escape hatch
/// that encodes once and reports whether it happened to fit the budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn parse(text: &str) -> Result<Self> {
        match text.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(ListingImageError::invalid_config(
                "output",
                other.to_string(),
                "expected jpeg or png",
            )),
        }
    }

    /// File extension for batch output naming.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Jpeg
    }
}

/// Policy for one normalization invocation.
///
/// Immutable value, cheap to clone, shared freely across batch workers.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizeConfig {
    /// Floor on final width; 0 disables the width minimum.
    pub min_width: u32,
    /// Floor on final height; 0 disables the height minimum.
    pub min_height: u32,
    /// Ceiling on max(width, height); 0 disables the cap. Subordinate to the
    /// minimums: when both cannot hold, the minimum wins and the result is
    /// flagged as relaxed.
    pub max_long_side: u32,
    /// Center-crop target; None keeps the source ratio untouched.
    pub target_ratio: Option<AspectRatio>,
    /// Hard byte ceiling the quality search tries to satisfy.
    pub max_output_bytes: u64,
    /// First quality the search encodes at.
    pub quality_start: u8,
    /// Lowest quality the search will accept before giving up.
    pub quality_floor: u8,
    /// Quality decrement between attempts.
    pub quality_step: u8,
    pub resize_filter: ResizeFilter,
    pub output: OutputFormat,
}

impl NormalizeConfig {
    /// Neutral config: no minimums, no cap, no crop, default budget and
    /// quality schedule, JPEG output.
    pub fn new() -> Self {
        Self {
            min_width: 0,
            min_height: 0,
            max_long_side: 0,
            target_ratio: None,
            max_output_bytes: DEFAULT_SIZE_BUDGET_BYTES,
            quality_start: DEFAULT_QUALITY_START,
            quality_floor: DEFAULT_QUALITY_FLOOR,
            quality_step: DEFAULT_QUALITY_STEP,
            resize_filter: ResizeFilter::default(),
            output: OutputFormat::default(),
        }
    }

    /// Get a built-in preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "marketplace" => Some(Self::marketplace()),
            "square" => Some(Self::square()),
            "furniture" => Some(Self::furniture()),
            "catalog" => Some(Self::catalog()),
            _ => None,
        }
    }

    /// Marketplace main image: minimum 1350x1350, cropped to 3:4.
    /// Use case: primary listing photo upload
    pub fn marketplace() -> Self {
        Self {
            min_width: 1350,
            min_height: 1350,
            target_ratio: Some(AspectRatio::portrait_3_4()),
            ..Self::new()
        }
    }

    /// Square gallery image: minimum 1350x1350, cropped to 1:1.
    /// Use case: gallery/variant photo upload
    pub fn square() -> Self {
        Self {
            min_width: 1350,
            min_height: 1350,
            target_ratio: Some(AspectRatio::square()),
            ..Self::new()
        }
    }

    /// Furniture listing: minimum 1500x1500, long side capped at 3000, 1:1.
    /// Use case: furniture category, which enforces both bounds
    pub fn furniture() -> Self {
        Self {
            min_width: 1500,
            min_height: 1500,
            max_long_side: 3000,
            target_ratio: Some(AspectRatio::square()),
            ..Self::new()
        }
    }

    /// Catalog export: minimum 1024x1024, source ratio kept.
    /// Use case: bulk catalog refresh where cropping is not wanted
    pub fn catalog() -> Self {
        Self {
            min_width: 1024,
            min_height: 1024,
            ..Self::new()
        }
    }

    /// Check the numeric constraints. Called once per normalize entry and
    /// once per batch run; a failure here halts a batch before fan-out.
    pub fn validate(&self) -> Result<()> {
        if self.quality_start == 0 || self.quality_start > 100 {
            return Err(ListingImageError::invalid_config(
                "quality_start",
                self.quality_start.to_string(),
                "must be in 1..=100",
            ));
        }
        if self.quality_floor == 0 || self.quality_floor > 100 {
            return Err(ListingImageError::invalid_config(
                "quality_floor",
                self.quality_floor.to_string(),
                "must be in 1..=100",
            ));
        }
        if self.quality_start < self.quality_floor {
            return Err(ListingImageError::invalid_config(
                "quality_start",
                self.quality_start.to_string(),
                "must be >= quality_floor",
            ));
        }
        if self.quality_step == 0 {
            return Err(ListingImageError::invalid_config(
                "quality_step",
                self.quality_step.to_string(),
                "must be at least 1",
            ));
        }
        if self.max_output_bytes == 0 {
            return Err(ListingImageError::invalid_config(
                "max_output_bytes",
                self.max_output_bytes.to_string(),
                "must be greater than 0",
            ));
        }
        if let Some(ratio) = &self.target_ratio {
            if ratio.width == 0 || ratio.height == 0 {
                return Err(ListingImageError::invalid_config(
                    "target_ratio",
                    format!("{}:{}", ratio.width, ratio.height),
                    "ratio terms must be non-zero",
                ));
            }
        }
        Ok(())
    }

    /// Upper bound on encode attempts the quality search can make.
    pub fn max_quality_attempts(&self) -> u32 {
        let span = u32::from(self.quality_start.saturating_sub(self.quality_floor));
        span / u32::from(self.quality_step.max(1)) + 1
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self::new()
    }
}
