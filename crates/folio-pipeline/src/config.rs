//! Settings structures for the detector and its collaborators.
//!
//! Each algorithm takes one explicit, immutable settings value. Every field
//! has a documented default exposed as an associated `DEFAULT_*` constant so
//! front ends (CLI flags, JSON configs) cannot silently diverge from the
//! library.

use std::f32::consts::PI;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::edge::{EdgeThresholds, MIN_THRESHOLD};
use crate::stroke::Polarity;
use crate::types::PipelineError;

/// Settings for the stroke width transform text detector.
///
/// # Invariants
///
/// [`validate`](Self::validate) enforces:
/// `1.0 <= thresholds.low <= thresholds.high`, `blur_sigma >= 0`,
/// `0 < direction_tolerance <= π`, `max_ray_length > 0` when set,
/// `stroke_ratio >= 1`, `min_component_pixels >= 1`,
/// `0 < min_aspect_ratio <= max_aspect_ratio`, `max_stroke_cv >= 0`,
/// `0 < max_fill_ratio <= 1`, `min_diameter_ratio >= 0`,
/// `word_gap_factor >= 0`, `0 < max_edge_fraction <= 1`,
/// `min_image_size >= 3`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwtConfig {
    /// Hysteresis thresholds on Sobel gradient magnitude.
    pub thresholds: EdgeThresholds,

    /// Gaussian sigma applied to the luma field before gradients.
    /// `0.0` disables smoothing.
    pub blur_sigma: f32,

    /// Maximum deviation (radians) between the end pixel's gradient
    /// direction and the exact opposite of the start pixel's direction.
    pub direction_tolerance: f32,

    /// Longest ray in pixels. `None` derives `min(width, height) / 4`.
    pub max_ray_length: Option<f32>,

    /// Which text polarity initiates rays.
    pub polarity: Polarity,

    /// Lower every pixel of a successful ray to the ray's median width in a
    /// second pass.
    pub median_refinement: bool,

    /// Largest ratio between neighboring stroke widths that may still join
    /// one component.
    pub stroke_ratio: f32,

    /// Components with fewer pixels are dropped as noise.
    pub min_component_pixels: usize,

    /// Lowest accepted height/width ratio of a letter box.
    pub min_aspect_ratio: f32,

    /// Highest accepted height/width ratio of a letter box.
    pub max_aspect_ratio: f32,

    /// Highest accepted coefficient of variation (stddev / mean) of the
    /// stroke widths within one component.
    pub max_stroke_cv: f32,

    /// Fill ratio (pixels / box area) above which a thick component is a
    /// solid blob.
    pub max_fill_ratio: f32,

    /// Box diagonal over mean stroke width below which a densely filled
    /// component is a solid blob.
    pub min_diameter_ratio: f32,

    /// Letters join a word when their horizontal gap is at most this many
    /// stroke widths.
    pub word_gap_factor: f32,

    /// Largest fraction of pixels that may be edges before the input is
    /// treated as pathological.
    pub max_edge_fraction: f32,

    /// Smallest accepted image side in pixels.
    pub min_image_size: u32,

    /// Caller time budget in milliseconds, checked between stages.
    pub timeout_ms: Option<u64>,
}

impl SwtConfig {
    /// Default hysteresis thresholds.
    pub const DEFAULT_THRESHOLDS: EdgeThresholds = EdgeThresholds {
        low: 40.0,
        high: 100.0,
    };
    /// Default pre-smoothing sigma (disabled).
    pub const DEFAULT_BLUR_SIGMA: f32 = 0.0;
    /// Default direction tolerance (π/6).
    pub const DEFAULT_DIRECTION_TOLERANCE: f32 = PI / 6.0;
    /// Default stroke width ratio factor.
    pub const DEFAULT_STROKE_RATIO: f32 = 3.0;
    /// Default minimum component size.
    pub const DEFAULT_MIN_COMPONENT_PIXELS: usize = 4;
    /// Default lower aspect ratio bound.
    pub const DEFAULT_MIN_ASPECT_RATIO: f32 = 0.1;
    /// Default upper aspect ratio bound.
    pub const DEFAULT_MAX_ASPECT_RATIO: f32 = 10.0;
    /// Default stroke width coefficient of variation bound.
    pub const DEFAULT_MAX_STROKE_CV: f32 = 0.5;
    /// Default blob fill ratio.
    pub const DEFAULT_MAX_FILL_RATIO: f32 = 0.9;
    /// Default blob diameter ratio.
    pub const DEFAULT_MIN_DIAMETER_RATIO: f32 = 2.5;
    /// Default word gap factor.
    pub const DEFAULT_WORD_GAP_FACTOR: f32 = 3.0;
    /// Default pathological edge fraction.
    pub const DEFAULT_MAX_EDGE_FRACTION: f32 = 0.5;
    /// Default minimum image side.
    pub const DEFAULT_MIN_IMAGE_SIZE: u32 = 8;

    /// Caller time budget, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Longest ray for an image of the given size.
    ///
    /// A fixed `max_ray_length` is clamped to the image diagonal, which no
    /// ray inside the image can exceed.
    #[must_use]
    pub fn ray_length_for(&self, width: u32, height: u32) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (width as f32, height as f32);
        let derived = (w.min(h) / 4.0).max(1.0);
        self.max_ray_length.map_or(derived, |len| len.min(w.hypot(h).max(1.0)))
    }

    /// Check every invariant listed on the type.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field that
    /// is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let t = self.thresholds;
        check(
            t.low >= MIN_THRESHOLD && t.low <= t.high,
            || format!("thresholds must satisfy {MIN_THRESHOLD} <= low <= high, got {t:?}"),
        )?;
        check(self.blur_sigma >= 0.0, || {
            format!("blur_sigma must be >= 0, got {}", self.blur_sigma)
        })?;
        check(
            self.direction_tolerance > 0.0 && self.direction_tolerance <= PI,
            || {
                format!(
                    "direction_tolerance must be in (0, π], got {}",
                    self.direction_tolerance
                )
            },
        )?;
        if let Some(len) = self.max_ray_length {
            check(len > 0.0 && len.is_finite(), || {
                format!("max_ray_length must be positive, got {len}")
            })?;
        }
        check(self.stroke_ratio >= 1.0, || {
            format!("stroke_ratio must be >= 1, got {}", self.stroke_ratio)
        })?;
        check(self.min_component_pixels >= 1, || {
            "min_component_pixels must be >= 1".to_string()
        })?;
        check(
            self.min_aspect_ratio > 0.0 && self.min_aspect_ratio <= self.max_aspect_ratio,
            || {
                format!(
                    "aspect ratio bounds must satisfy 0 < min <= max, got {}..{}",
                    self.min_aspect_ratio, self.max_aspect_ratio
                )
            },
        )?;
        check(self.max_stroke_cv >= 0.0, || {
            format!("max_stroke_cv must be >= 0, got {}", self.max_stroke_cv)
        })?;
        check(
            self.max_fill_ratio > 0.0 && self.max_fill_ratio <= 1.0,
            || format!("max_fill_ratio must be in (0, 1], got {}", self.max_fill_ratio),
        )?;
        check(self.min_diameter_ratio >= 0.0, || {
            format!(
                "min_diameter_ratio must be >= 0, got {}",
                self.min_diameter_ratio
            )
        })?;
        check(self.word_gap_factor >= 0.0, || {
            format!("word_gap_factor must be >= 0, got {}", self.word_gap_factor)
        })?;
        check(
            self.max_edge_fraction > 0.0 && self.max_edge_fraction <= 1.0,
            || {
                format!(
                    "max_edge_fraction must be in (0, 1], got {}",
                    self.max_edge_fraction
                )
            },
        )?;
        check(self.min_image_size >= 3, || {
            format!("min_image_size must be >= 3, got {}", self.min_image_size)
        })
    }
}

impl Default for SwtConfig {
    fn default() -> Self {
        Self {
            thresholds: Self::DEFAULT_THRESHOLDS,
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            direction_tolerance: Self::DEFAULT_DIRECTION_TOLERANCE,
            max_ray_length: None,
            polarity: Polarity::default(),
            median_refinement: true,
            stroke_ratio: Self::DEFAULT_STROKE_RATIO,
            min_component_pixels: Self::DEFAULT_MIN_COMPONENT_PIXELS,
            min_aspect_ratio: Self::DEFAULT_MIN_ASPECT_RATIO,
            max_aspect_ratio: Self::DEFAULT_MAX_ASPECT_RATIO,
            max_stroke_cv: Self::DEFAULT_MAX_STROKE_CV,
            max_fill_ratio: Self::DEFAULT_MAX_FILL_RATIO,
            min_diameter_ratio: Self::DEFAULT_MIN_DIAMETER_RATIO,
            word_gap_factor: Self::DEFAULT_WORD_GAP_FACTOR,
            max_edge_fraction: Self::DEFAULT_MAX_EDGE_FRACTION,
            min_image_size: Self::DEFAULT_MIN_IMAGE_SIZE,
            timeout_ms: None,
        }
    }
}

/// Settings for the standalone Canny edge rendering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannyConfig {
    /// Gaussian sigma applied before gradients (`0.0` disables).
    pub blur_sigma: f32,
    /// Hysteresis thresholds.
    pub thresholds: EdgeThresholds,
}

impl CannyConfig {
    /// Default smoothing sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 1.4;

    /// Check that `blur_sigma` is finite and `>= 0` and that
    /// `MIN_THRESHOLD <= low <= high`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for out-of-range values.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check(self.blur_sigma >= 0.0 && self.blur_sigma.is_finite(), || {
            format!("blur_sigma must be finite and >= 0, got {}", self.blur_sigma)
        })?;
        let t = self.thresholds;
        check(
            t.low >= MIN_THRESHOLD && t.low <= t.high && t.high.is_finite(),
            || format!("thresholds must satisfy {MIN_THRESHOLD} <= low <= high, got {t:?}"),
        )
    }
}

impl Default for CannyConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            thresholds: SwtConfig::DEFAULT_THRESHOLDS,
        }
    }
}

/// Settings for automatic color equalization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AceConfig {
    /// Seed for the sample-position generator. Equal seeds give equal output.
    pub seed: u64,
    /// Slope of the saturating contrast function.
    pub slope: f32,
    /// Distance (pixels) beyond which sample weights stop decreasing.
    pub limit: f32,
    /// Random samples compared against each pixel.
    pub samples: u32,
}

impl AceConfig {
    /// Default saturation slope.
    pub const DEFAULT_SLOPE: f32 = 10.0;
    /// Default distance limit.
    pub const DEFAULT_LIMIT: f32 = 1000.0;
    /// Default samples per pixel.
    pub const DEFAULT_SAMPLES: u32 = 100;
    /// Default seed.
    pub const DEFAULT_SEED: u64 = 0;

    /// Check that `slope > 0`, `limit >= 1` and `samples >= 1`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for out-of-range values.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check(self.slope > 0.0, || {
            format!("slope must be > 0, got {}", self.slope)
        })?;
        check(self.limit >= 1.0, || {
            format!("limit must be >= 1, got {}", self.limit)
        })?;
        check(self.samples >= 1, || "samples must be >= 1".to_string())
    }
}

impl Default for AceConfig {
    fn default() -> Self {
        Self {
            seed: Self::DEFAULT_SEED,
            slope: Self::DEFAULT_SLOPE,
            limit: Self::DEFAULT_LIMIT,
            samples: Self::DEFAULT_SAMPLES,
        }
    }
}

/// Settings for the isolated-noise filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseFilterConfig {
    /// Clusters of at most this many dark pixels are erased.
    pub intensity: usize,
    /// Lightness fraction (0..1) at or above which a pixel counts as white.
    pub white_threshold: f32,
}

impl NoiseFilterConfig {
    /// Default cluster size limit.
    pub const DEFAULT_INTENSITY: usize = 4;
    /// Default white threshold.
    pub const DEFAULT_WHITE_THRESHOLD: f32 = 0.9;

    /// Check that `white_threshold` lies in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for out-of-range values.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check((0.0..=1.0).contains(&self.white_threshold), || {
            format!(
                "white_threshold must be in [0, 1], got {}",
                self.white_threshold
            )
        })
    }
}

impl Default for NoiseFilterConfig {
    fn default() -> Self {
        Self {
            intensity: Self::DEFAULT_INTENSITY,
            white_threshold: Self::DEFAULT_WHITE_THRESHOLD,
        }
    }
}

/// Settings for scan border detection.
///
/// Scanner models differ in lid color, margin width and JPEG noise, so every
/// constant is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanBorderConfig {
    /// Gaussian sigma applied before the gradient (`0.0` disables).
    pub blur_sigma: f32,
    /// Fraction of each dimension searched inward from every side.
    pub search_fraction: f32,
    /// Minimum mean gradient magnitude along a row or column for it to
    /// count as the scanner edge.
    pub min_line_strength: f32,
}

impl ScanBorderConfig {
    /// Default smoothing sigma.
    pub const DEFAULT_BLUR_SIGMA: f32 = 2.0;
    /// Default search depth.
    pub const DEFAULT_SEARCH_FRACTION: f32 = 0.25;
    /// Default line strength threshold.
    pub const DEFAULT_MIN_LINE_STRENGTH: f32 = 20.0;

    /// Check that `blur_sigma` and `min_line_strength` are finite and
    /// `>= 0` and that `search_fraction` lies in `(0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] naming the first field that
    /// is out of range.
    pub fn validate(&self) -> Result<(), PipelineError> {
        check(self.blur_sigma >= 0.0 && self.blur_sigma.is_finite(), || {
            format!("blur_sigma must be finite and >= 0, got {}", self.blur_sigma)
        })?;
        check(
            self.search_fraction > 0.0 && self.search_fraction <= 1.0,
            || {
                format!(
                    "search_fraction must be in (0, 1], got {}",
                    self.search_fraction
                )
            },
        )?;
        check(
            self.min_line_strength >= 0.0 && self.min_line_strength.is_finite(),
            || {
                format!(
                    "min_line_strength must be finite and >= 0, got {}",
                    self.min_line_strength
                )
            },
        )
    }
}

impl Default for ScanBorderConfig {
    fn default() -> Self {
        Self {
            blur_sigma: Self::DEFAULT_BLUR_SIGMA,
            search_fraction: Self::DEFAULT_SEARCH_FRACTION,
            min_line_strength: Self::DEFAULT_MIN_LINE_STRENGTH,
        }
    }
}

/// Turn a failed predicate into [`PipelineError::InvalidConfig`].
fn check(ok: bool, message: impl FnOnce() -> String) -> Result<(), PipelineError> {
    if ok {
        Ok(())
    } else {
        Err(PipelineError::InvalidConfig(message()))
    }
}
