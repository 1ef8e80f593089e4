//! Edge detection: non-maximum suppression and hysteresis thresholding.
//!
//! Produces an [`EdgeMap`]: a boolean grid that also remembers the gradient
//! direction of every edge pixel. The direction tells the stroke width
//! stage which side of the edge is bright, so a single map serves both
//! text polarities.
//!
//! Also hosts the standalone [`canny`] and [`sobel`] renderings, which share
//! the same gradient and suppression code.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::blur;
use crate::config::CannyConfig;
use crate::gradient::GradientField;
use crate::parallel;
use crate::raster::{self, LumaField};
use crate::types::{Dimensions, PipelineError, RasterImage};

/// Minimum allowed hysteresis threshold.
///
/// A low threshold of zero turns every pixel with any gradient into a
/// potential edge, which floods the ray caster with work.
pub const MIN_THRESHOLD: f32 = 1.0;
const _: () = assert!(MIN_THRESHOLD > 0.0);

/// Two-level hysteresis thresholds on gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeThresholds {
    /// Weak edges: kept only when connected to a strong edge.
    pub low: f32,
    /// Strong edges: always kept.
    pub high: f32,
}

impl EdgeThresholds {
    /// Clamp both thresholds to at least [`MIN_THRESHOLD`] and `low` to at
    /// most `high`.
    #[must_use]
    pub fn clamped(self) -> Self {
        let high = self.high.max(MIN_THRESHOLD);
        let low = self.low.max(MIN_THRESHOLD).min(high);
        Self { low, high }
    }
}

/// Binary edge grid plus the gradient direction of each edge pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMap {
    width: u32,
    height: u32,
    edges: Vec<bool>,
    direction: Vec<f32>,
}

impl EdgeMap {
    /// Thin the gradient field and apply hysteresis.
    ///
    /// Thresholds are clamped with [`EdgeThresholds::clamped`].
    #[must_use]
    pub fn detect(gradient: &GradientField, thresholds: EdgeThresholds) -> Self {
        let thresholds = thresholds.clamped();
        let thinned = non_maximum_suppression(gradient);
        let edges = hysteresis(
            &thinned,
            gradient.width(),
            gradient.height(),
            thresholds,
        );
        let direction = (0..gradient.height())
            .flat_map(|y| (0..gradient.width()).map(move |x| (x, y)))
            .map(|(x, y)| gradient.direction(x, y))
            .collect();
        Self {
            width: gradient.width(),
            height: gradient.height(),
            edges,
            direction,
        }
    }

    /// Build a map directly from `(x, y, direction)` triples.
    ///
    /// Coordinates outside `dimensions` are ignored.
    #[must_use]
    pub fn from_edges(
        dimensions: Dimensions,
        pixels: impl IntoIterator<Item = (u32, u32, f32)>,
    ) -> Self {
        let len = dimensions.len();
        let mut edges = vec![false; len];
        let mut direction = vec![0.0; len];
        for (x, y, d) in pixels {
            if x < dimensions.width && y < dimensions.height {
                let idx = y as usize * dimensions.width as usize + x as usize;
                edges[idx] = true;
                direction[idx] = d;
            }
        }
        Self {
            width: dimensions.width,
            height: dimensions.height,
            edges,
            direction,
        }
    }

    /// Map dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Returns `true` if `(x, y)` is inside the map and is an edge.
    #[must_use]
    pub fn is_edge(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.edges[self.index(x, y)]
    }

    /// Gradient direction of the edge at `(x, y)`, or `None` for non-edges.
    #[must_use]
    pub fn direction(&self, x: u32, y: u32) -> Option<f32> {
        self.is_edge(x, y).then(|| self.direction[self.index(x, y)])
    }

    /// Number of edge pixels.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.iter().filter(|&&e| e).count()
    }

    /// Returns `true` if the map has no edge pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.edges.iter().any(|&e| e)
    }

    /// Edge pixels of row `y` with their directions, left to right.
    pub fn row_edges(&self, y: u32) -> impl Iterator<Item = (u32, f32)> + '_ {
        let start = y as usize * self.width as usize;
        let end = start + self.width as usize;
        let row = self.edges.get(start..end).unwrap_or_default();
        row.iter().enumerate().filter(|(_, e)| **e).map(move |(x, _)| {
            #[allow(clippy::cast_possible_truncation)]
            let x = x as u32;
            (x, self.direction[start + x as usize])
        })
    }

    /// Render as a raster: white edges on black.
    #[must_use]
    pub fn to_raster(&self) -> RasterImage {
        RasterImage::from_fn(self.width, self.height, |x, y| {
            if self.edges[self.index(x, y)] {
                image::Rgb([255, 255, 255])
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }
}

/// Quantized gradient orientation, folded modulo π.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Diagonal,
    Vertical,
    AntiDiagonal,
}

impl Orientation {
    fn of(direction: f32) -> Self {
        let degrees = direction.to_degrees() % 180.0;
        if !(22.5..157.5).contains(&degrees) {
            Self::Horizontal
        } else if degrees < 67.5 {
            Self::Diagonal
        } else if degrees < 112.5 {
            Self::Vertical
        } else {
            Self::AntiDiagonal
        }
    }

    /// Offsets of the (before, after) neighbors along the gradient.
    ///
    /// "Before" is always the neighbor with the smaller row, or the smaller
    /// column when rows are equal, so ties break the same way everywhere.
    const fn neighbors(self) -> ((i64, i64), (i64, i64)) {
        match self {
            Self::Horizontal => ((-1, 0), (1, 0)),
            Self::Diagonal => ((-1, -1), (1, 1)),
            Self::Vertical => ((0, -1), (0, 1)),
            Self::AntiDiagonal => ((1, -1), (-1, 1)),
        }
    }
}

/// Keep a pixel only where its magnitude peaks along its gradient.
///
/// A pixel survives when it is strictly greater than the "before" neighbor
/// and at least the "after" neighbor. On a symmetric step the two pixels
/// straddling the boundary tie, and exactly one of them survives.
/// Neighbors outside the image count as zero. Returns thinned magnitudes,
/// row-major.
fn non_maximum_suppression(gradient: &GradientField) -> Vec<f32> {
    let w = gradient.width();
    let h = gradient.height();
    let sample = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= i64::from(w) || y >= i64::from(h) {
            0.0
        } else {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let (x, y) = (x as u32, y as u32);
            gradient.magnitude(x, y)
        }
    };

    let rows: Vec<Vec<f32>> = parallel::map_rows(0..h, |y| {
        (0..w)
            .map(|x| {
                let mag = gradient.magnitude(x, y);
                if mag <= 0.0 {
                    return 0.0;
                }
                let ((bx, by), (ax, ay)) = Orientation::of(gradient.direction(x, y)).neighbors();
                let (xi, yi) = (i64::from(x), i64::from(y));
                let before = sample(xi + bx, yi + by);
                let after = sample(xi + ax, yi + ay);
                if mag > before && mag >= after { mag } else { 0.0 }
            })
            .collect()
    });
    rows.into_iter().flatten().collect()
}

/// Filter thinned magnitudes with the thresholds.
/// Non-recursive depth-first flood from every strong pixel over all 8
/// neighbors, with bounds checks at the image border.
fn hysteresis(thinned: &[f32], w: u32, h: u32, thresholds: EdgeThresholds) -> Vec<bool> {
    let width = w as usize;
    let mut out = vec![false; thinned.len()];
    let mut stack = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = y as usize * width + x as usize;
            if thinned[idx] < thresholds.high || out[idx] {
                continue;
            }
            out[idx] = true;
            stack.push((x, y));
            while let Some((nx, ny)) = stack.pop() {
                let neighbor_indices = [
                    (nx.wrapping_add(1), ny),
                    (nx.wrapping_add(1), ny.wrapping_add(1)),
                    (nx, ny.wrapping_add(1)),
                    (nx.wrapping_sub(1), ny.wrapping_sub(1)),
                    (nx.wrapping_sub(1), ny),
                    (nx.wrapping_sub(1), ny.wrapping_add(1)),
                    (nx, ny.wrapping_sub(1)),
                    (nx.wrapping_add(1), ny.wrapping_sub(1)),
                ];
                for (cx, cy) in neighbor_indices {
                    if cx >= w || cy >= h {
                        continue;
                    }
                    let cidx = cy as usize * width + cx as usize;
                    if thinned[cidx] >= thresholds.low && !out[cidx] {
                        out[cidx] = true;
                        stack.push((cx, cy));
                    }
                }
            }
        }
    }
    out
}

/// Gradient field of an RGB raster, optionally smoothed first.
pub(crate) fn gradient_of(image: &RasterImage, blur_sigma: f32) -> GradientField {
    let luma = LumaField::from_rgb(image);
    let luma = blur::blur_luma(&luma, blur_sigma);
    GradientField::compute(&luma)
}

/// Render Canny edges of `image`: white edge pixels on black.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for an empty raster and
/// [`PipelineError::InvalidConfig`] for an invalid `config`.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn canny(image: &RasterImage, config: &CannyConfig) -> Result<RasterImage, PipelineError> {
    raster::validate(image, 1, 1)?;
    config.validate()?;
    let gradient = gradient_of(image, config.blur_sigma);
    let edges = EdgeMap::detect(&gradient, config.thresholds);
    debug!(edge_pixels = edges.edge_count(), "canny edges detected");
    Ok(edges.to_raster())
}

/// Render the Sobel gradient magnitude of `image` as gray, normalized so the
/// strongest gradient maps to 255. A flat image renders black.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for an empty raster.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn sobel(image: &RasterImage) -> Result<RasterImage, PipelineError> {
    raster::validate(image, 1, 1)?;
    let gradient = gradient_of(image, 0.0);
    let max = gradient.max_magnitude();
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    Ok(RasterImage::from_fn(image.width(), image.height(), |x, y| {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = (gradient.magnitude(x, y) * scale).round().clamp(0.0, 255.0) as u8;
        image::Rgb([v, v, v])
    }))
}
