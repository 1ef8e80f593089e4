//! Shared types for the folio analysis pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Re-export `RgbImage` as the raster handed between stages so
/// downstream crates can reference it without depending on `image`
/// directly.
pub use image::RgbImage as RasterImage;

/// Re-export `GrayImage` for intermediate single-channel renderings.
pub use image::GrayImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing raster.
    #[must_use]
    pub fn of(image: &RasterImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Number of pixels as a buffer length.
    #[must_use]
    pub const fn len(self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Returns `true` if either dimension is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned box in pixel coordinates.
///
/// `right` and `bottom` are inclusive, so a single pixel at `(x, y)` is
/// `BoundingBox { left: x, top: y, right: x, bottom: y }`. Boxes produced by
/// the pipeline always lie within `[0, width) × [0, height)` of their
/// source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Leftmost column.
    pub left: u32,
    /// Topmost row.
    pub top: u32,
    /// Rightmost column (inclusive).
    pub right: u32,
    /// Bottom row (inclusive).
    pub bottom: u32,
}

impl BoundingBox {
    /// Box covering exactly one pixel.
    #[must_use]
    pub const fn point(x: u32, y: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x,
            bottom: y,
        }
    }

    /// Box covering a whole image of the given dimensions.
    ///
    /// Callers must not pass empty dimensions.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self {
            left: 0,
            top: 0,
            right: dimensions.width.saturating_sub(1),
            bottom: dimensions.height.saturating_sub(1),
        }
    }

    /// Grow the box to include `(x, y)`.
    pub fn include(&mut self, x: u32, y: u32) {
        self.left = self.left.min(x);
        self.top = self.top.min(y);
        self.right = self.right.max(x);
        self.bottom = self.bottom.max(y);
    }

    /// Smallest box covering both `self` and `other`.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }

    /// Width in pixels (inclusive span).
    #[must_use]
    pub const fn width(self) -> u32 {
        self.right - self.left + 1
    }

    /// Height in pixels (inclusive span).
    #[must_use]
    pub const fn height(self) -> u32 {
        self.bottom - self.top + 1
    }

    /// Area in pixels.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Returns `true` if `(x, y)` lies inside the box.
    #[must_use]
    pub const fn contains(self, x: u32, y: u32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }

    /// Returns `true` if the box lies inside an image of `dimensions`.
    #[must_use]
    pub const fn fits_within(self, dimensions: Dimensions) -> bool {
        self.left <= self.right
            && self.top <= self.bottom
            && self.right < dimensions.width
            && self.bottom < dimensions.height
    }

    /// Number of rows shared by the vertical spans of two boxes.
    #[must_use]
    pub fn vertical_overlap(self, other: Self) -> u32 {
        let top = self.top.max(other.top);
        let bottom = self.bottom.min(other.bottom);
        if bottom >= top { bottom - top + 1 } else { 0 }
    }

    /// Horizontal gap between two boxes in pixels; zero when they touch or
    /// overlap horizontally.
    #[must_use]
    pub const fn horizontal_gap(self, other: Self) -> u32 {
        if other.left > self.right {
            other.left - self.right - 1
        } else if self.left > other.right {
            self.left - other.right - 1
        } else {
            0
        }
    }
}

/// Final output of the text detector.
///
/// Which variant is produced depends on the requested
/// [`OutputMode`](crate::render::OutputMode).
#[derive(Debug, Clone, PartialEq)]
pub enum DetectOutput {
    /// Geometry: one box per letter or per word.
    Boxes(Vec<BoundingBox>),
    /// A rendered raster with the same dimensions as the input.
    Image(RasterImage),
}

impl DetectOutput {
    /// The boxes, if this output is geometry.
    #[must_use]
    pub fn boxes(&self) -> Option<&[BoundingBox]> {
        match self {
            Self::Boxes(boxes) => Some(boxes),
            Self::Image(_) => None,
        }
    }

    /// The raster, if this output is an image.
    #[must_use]
    pub const fn image(&self) -> Option<&RasterImage> {
        match self {
            Self::Boxes(_) => None,
            Self::Image(image) => Some(image),
        }
    }
}

/// Errors that can occur during pipeline processing.
///
/// Every stage reports failure through this type; no stage substitutes
/// default output on error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The input raster is unusable: zero dimensions, or smaller than the
    /// requested algorithm needs.
    #[error("invalid image: {0}")]
    InvalidImage(String),

    /// Two rasters that must match in size do not.
    #[error(
        "image dimensions differ: {}x{} vs {}x{}",
        .left.width,
        .left.height,
        .right.width,
        .right.height
    )]
    DimensionMismatch {
        /// Dimensions of the first image.
        left: Dimensions,
        /// Dimensions of the second image.
        right: Dimensions,
    },

    /// The requested output mode is not known.
    #[error("unsupported output mode: {0}")]
    UnsupportedMode(String),

    /// Work bounds were exceeded in a way that indicates pathological input.
    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The caller's time budget ran out between two stages.
    #[error("timed out after {:.3}s before stage '{stage}'", .elapsed.as_secs_f64())]
    TimedOut {
        /// The stage that was about to start.
        stage: &'static str,
        /// Time spent so far.
        elapsed: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_pixel_count() {
        let d = Dimensions {
            width: 640,
            height: 480,
        };
        assert_eq!(d.pixel_count(), 307_200);
        assert_eq!(d.len(), 307_200);
        assert!(!d.is_empty());
    }

    #[test]
    fn zero_dimension_is_empty() {
        let d = Dimensions {
            width: 0,
            height: 10,
        };
        assert!(d.is_empty());
    }

    #[test]
    fn bounding_box_spans_are_inclusive() {
        let b = BoundingBox {
            left: 2,
            top: 3,
            right: 2,
            bottom: 7,
        };
        assert_eq!(b.width(), 1);
        assert_eq!(b.height(), 5);
        assert_eq!(b.area(), 5);
    }

    #[test]
    fn bounding_box_include_grows() {
        let mut b = BoundingBox::point(5, 5);
        b.include(2, 8);
        b.include(7, 1);
        assert_eq!(
            b,
            BoundingBox {
                left: 2,
                top: 1,
                right: 7,
                bottom: 8
            }
        );
        assert!(b.contains(5, 5));
        assert!(!b.contains(8, 5));
    }

    #[test]
    fn bounding_box_fits_within() {
        let dims = Dimensions {
            width: 10,
            height: 10,
        };
        assert!(BoundingBox::full(dims).fits_within(dims));
        assert!(
            !BoundingBox {
                left: 0,
                top: 0,
                right: 10,
                bottom: 3
            }
            .fits_within(dims)
        );
    }

    #[test]
    fn vertical_overlap_and_horizontal_gap() {
        let a = BoundingBox {
            left: 0,
            top: 0,
            right: 4,
            bottom: 9,
        };
        let b = BoundingBox {
            left: 8,
            top: 5,
            right: 12,
            bottom: 14,
        };
        assert_eq!(a.vertical_overlap(b), 5);
        assert_eq!(a.horizontal_gap(b), 3);
        assert_eq!(b.horizontal_gap(a), 3);
        assert_eq!(a.horizontal_gap(a), 0);

        let below = BoundingBox {
            left: 0,
            top: 20,
            right: 4,
            bottom: 25,
        };
        assert_eq!(a.vertical_overlap(below), 0);
    }

    #[test]
    fn detect_output_accessors() {
        let boxes = DetectOutput::Boxes(vec![BoundingBox::point(1, 1)]);
        assert_eq!(boxes.boxes().map(<[BoundingBox]>::len), Some(1));
        assert!(boxes.image().is_none());

        let image = DetectOutput::Image(RasterImage::new(2, 2));
        assert!(image.boxes().is_none());
        assert!(image.image().is_some());
    }

    #[test]
    fn error_display_messages() {
        let err = PipelineError::DimensionMismatch {
            left: Dimensions {
                width: 4,
                height: 3,
            },
            right: Dimensions {
                width: 5,
                height: 3,
            },
        };
        assert_eq!(err.to_string(), "image dimensions differ: 4x3 vs 5x3");

        let err = PipelineError::UnsupportedMode("42".to_string());
        assert_eq!(err.to_string(), "unsupported output mode: 42");

        let err = PipelineError::EmptyInput;
        assert_eq!(err.to_string(), "input image data is empty");
    }

    #[test]
    fn bounding_box_serde_round_trip() {
        let b = BoundingBox {
            left: 1,
            top: 2,
            right: 30,
            bottom: 40,
        };
        let json = serde_json::to_string(&b).unwrap();
        let back: BoundingBox = serde_json::from_str(&json).unwrap();
        assert_eq!(b, back);
    }
}
