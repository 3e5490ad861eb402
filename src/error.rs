// src/error.rs
//
// Unified error handling for listing-image
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Invalid input or configuration, recoverable
// - CodecError: Format/decoding/encoding issues
// - ResourceLimit: I/O and dimension limits
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy for batch drivers and operator-facing reporting
///
/// - UserError: Invalid input or configuration, recoverable by the caller
/// - CodecError: Format/decoding/encoding issues
/// - ResourceLimit: I/O and dimension limits
/// - InternalBug: Library bugs (should not happen)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input or configuration, recoverable by the caller
    UserError,
    /// Format/decoding/encoding issues
    CodecError,
    /// I/O and dimension limits
    ResourceLimit,
    /// Library bugs (should not happen)
    InternalBug,
}

/// listing-image error types
///
/// All errors are type-safe and provide clear, actionable messages.
/// No numeric error codes - just clear error variants.
///
/// A missed byte-size budget is not an error: the quality search returns its
/// floor-quality encoding with `met_goal = false` and the caller decides.
#[derive(Debug, Error)]
pub enum ListingImageError {
    // File I/O Errors (batch driver surface)
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to memory-map file '{path}': {source}")]
    MmapFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Corrupted image data")]
    CorruptedImage,

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Pipeline Errors
    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    #[error("Crop rectangle ({x}+{width}, {y}+{height}) exceeds image dimensions ({img_width}x{img_height})")]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Configuration Errors
    #[error("Unknown preset: '{name}'. Available: marketplace, square, furniture, catalog")]
    InvalidPreset { name: Cow<'static, str> },

    #[error("Invalid value for {field}: {value}. {reason}")]
    InvalidConfig {
        field: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl Clone for ListingImageError {
    fn clone(&self) -> Self {
        match self {
            Self::FileNotFound { path } => Self::FileNotFound { path: path.clone() },
            Self::FileReadFailed { path, source } => Self::FileReadFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::MmapFailed { path, source } => Self::MmapFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::FileWriteFailed { path, source } => Self::FileWriteFailed {
                path: path.clone(),
                source: std::io::Error::new(source.kind(), source.to_string()),
            },
            Self::UnsupportedFormat { format } => Self::UnsupportedFormat {
                format: format.clone(),
            },
            Self::DecodeFailed { message } => Self::DecodeFailed {
                message: message.clone(),
            },
            Self::CorruptedImage => Self::CorruptedImage,
            Self::DimensionExceedsLimit { dimension, max } => Self::DimensionExceedsLimit {
                dimension: *dimension,
                max: *max,
            },
            Self::PixelCountExceedsLimit { pixels, max } => Self::PixelCountExceedsLimit {
                pixels: *pixels,
                max: *max,
            },
            Self::ResizeFailed {
                source_width,
                source_height,
                target_width,
                target_height,
                message,
            } => Self::ResizeFailed {
                source_width: *source_width,
                source_height: *source_height,
                target_width: *target_width,
                target_height: *target_height,
                message: message.clone(),
            },
            Self::CropOutOfBounds {
                x,
                y,
                width,
                height,
                img_width,
                img_height,
            } => Self::CropOutOfBounds {
                x: *x,
                y: *y,
                width: *width,
                height: *height,
                img_width: *img_width,
                img_height: *img_height,
            },
            Self::EncodeFailed { format, message } => Self::EncodeFailed {
                format: format.clone(),
                message: message.clone(),
            },
            Self::InvalidPreset { name } => Self::InvalidPreset { name: name.clone() },
            Self::InvalidConfig {
                field,
                value,
                reason,
            } => Self::InvalidConfig {
                field: field.clone(),
                value: value.clone(),
                reason: reason.clone(),
            },
            Self::InternalPanic { message } => Self::InternalPanic {
                message: message.clone(),
            },
        }
    }
}

// Constructor Helpers
impl ListingImageError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn mmap_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::MmapFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn corrupted_image() -> Self {
        Self::CorruptedImage
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn crop_out_of_bounds(
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        img_width: u32,
        img_height: u32,
    ) -> Self {
        Self::CropOutOfBounds {
            x,
            y,
            width,
            height,
            img_width,
            img_height,
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn invalid_preset(name: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPreset { name: name.into() }
    }

    pub fn invalid_config(
        field: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Whether a batch driver should stop the whole run on this error.
    ///
    /// Configuration errors fail every item identically, so retrying the rest
    /// of the queue only repeats the same failure. Everything else is scoped
    /// to one image: decode/encode/I-O failures skip the item and the batch
    /// continues, matching the per-item skip-and-continue contract.
    pub fn halts_batch(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::InvalidPreset { .. }
        )
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            // UserError: invalid input or configuration
            Self::FileNotFound { .. }
            | Self::InvalidPreset { .. }
            | Self::InvalidConfig { .. } => ErrorCategory::UserError,

            // CodecError: format/decoding/encoding issues
            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::CorruptedImage
            | Self::EncodeFailed { .. }
            // ResizeFailed is a processing failure between decode and encode,
            // closest in kind to a codec fault.
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            // ResourceLimit: dimension guards plus I/O. Read/mmap/write
            // failures usually mean disk or permission trouble the operator
            // can fix, which is why they sit here rather than under UserError.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::FileReadFailed { .. }
            | Self::MmapFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            // InternalBug: the geometry layer guarantees in-bounds crops, so
            // an out-of-bounds rectangle reaching the pipeline is a bug here,
            // not bad user data.
            Self::CropOutOfBounds { .. } | Self::InternalPanic { .. } => {
                ErrorCategory::InternalBug
            }
        }
    }
}

impl ErrorCategory {
    /// Get string representation of error category
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ListingImageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ListingImageError::file_not_found("/path/to/photo.jpg");
        assert!(err.to_string().contains("/path/to/photo.jpg"));
    }

    #[test]
    fn test_halts_batch_policy() {
        assert!(ListingImageError::invalid_config("quality_step", "0", "must be at least 1")
            .halts_batch());
        assert!(ListingImageError::invalid_preset("unknown").halts_batch());

        // Per-item failures keep the batch running.
        assert!(!ListingImageError::decode_failed("truncated stream").halts_batch());
        assert!(!ListingImageError::corrupted_image().halts_batch());
        assert!(!ListingImageError::encode_failed("jpeg", "test").halts_batch());
        assert!(!ListingImageError::file_read_failed(
            "a.jpg",
            std::io::Error::from(std::io::ErrorKind::NotFound)
        )
        .halts_batch());
        assert!(!ListingImageError::internal_panic("codec panic").halts_batch());
    }

    #[test]
    fn test_all_error_constructors() {
        let _ = ListingImageError::file_not_found("test.jpg");
        let _ = ListingImageError::file_read_failed(
            "test.jpg",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        let _ = ListingImageError::mmap_failed(
            "test.jpg",
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        );
        let _ = ListingImageError::file_write_failed(
            "test.jpg",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let _ = ListingImageError::unsupported_format("avif");
        let _ = ListingImageError::decode_failed("test");
        let _ = ListingImageError::corrupted_image();
        let _ = ListingImageError::dimension_exceeds_limit(100000, 32768);
        let _ = ListingImageError::pixel_count_exceeds_limit(10_000_000_000, 100_000_000);
        let _ = ListingImageError::resize_failed((100, 100), (1500, 1500), "test");
        let _ = ListingImageError::crop_out_of_bounds(500, 0, 1000, 1000, 900, 900);
        let _ = ListingImageError::encode_failed("jpeg", "test");
        let _ = ListingImageError::invalid_preset("unknown");
        let _ = ListingImageError::invalid_config("quality_start", "0", "must be in 1..=100");
        let _ = ListingImageError::internal_panic("test");
    }

    #[test]
    fn test_error_category_user_error() {
        assert_eq!(
            ListingImageError::file_not_found("test.jpg").category(),
            ErrorCategory::UserError
        );
        assert_eq!(
            ListingImageError::invalid_preset("unknown").category(),
            ErrorCategory::UserError
        );
        assert_eq!(
            ListingImageError::invalid_config("min_width", "0", "test").category(),
            ErrorCategory::UserError
        );
    }

    #[test]
    fn test_error_category_codec_error() {
        assert_eq!(
            ListingImageError::unsupported_format("avif").category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            ListingImageError::decode_failed("test").category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            ListingImageError::corrupted_image().category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            ListingImageError::encode_failed("jpeg", "test").category(),
            ErrorCategory::CodecError
        );
        assert_eq!(
            ListingImageError::resize_failed((100, 100), (1500, 1500), "test").category(),
            ErrorCategory::CodecError
        );
    }

    #[test]
    fn test_error_category_resource_limit() {
        assert_eq!(
            ListingImageError::dimension_exceeds_limit(100000, 32768).category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            ListingImageError::pixel_count_exceeds_limit(10_000_000_000, 100_000_000).category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            ListingImageError::file_read_failed(
                "test.jpg",
                std::io::Error::from(std::io::ErrorKind::NotFound)
            )
            .category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            ListingImageError::mmap_failed(
                "test.jpg",
                std::io::Error::from(std::io::ErrorKind::NotFound)
            )
            .category(),
            ErrorCategory::ResourceLimit
        );
        assert_eq!(
            ListingImageError::file_write_failed(
                "test.jpg",
                std::io::Error::from(std::io::ErrorKind::PermissionDenied)
            )
            .category(),
            ErrorCategory::ResourceLimit
        );
    }

    #[test]
    fn test_error_category_internal_bug() {
        assert_eq!(
            ListingImageError::internal_panic("test").category(),
            ErrorCategory::InternalBug
        );
        assert_eq!(
            ListingImageError::crop_out_of_bounds(500, 0, 1000, 1000, 900, 900).category(),
            ErrorCategory::InternalBug
        );
    }

    #[test]
    fn test_error_category_as_str() {
        assert_eq!(ErrorCategory::UserError.as_str(), "UserError");
        assert_eq!(ErrorCategory::CodecError.as_str(), "CodecError");
        assert_eq!(ErrorCategory::ResourceLimit.as_str(), "ResourceLimit");
        assert_eq!(ErrorCategory::InternalBug.as_str(), "InternalBug");
    }
}
