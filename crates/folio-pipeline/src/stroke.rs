//! Stroke width estimation by gradient-guided ray casting.
//!
//! Every edge pixel casts a ray across the stroke it bounds. The ray stops
//! at the first edge pixel it enters; if that pixel's gradient points the
//! opposite way, the two edges are taken to be the two sides of one stroke
//! and every pixel on the ray is lowered to the distance between them.
//!
//! Rays are independent. Origin rows are split into partitions that run in
//! parallel; each partition returns its successful rays and the rays are
//! folded into one [`StrokeWidthMap`] with a per-cell minimum. Minimum is
//! commutative, so the map does not depend on how rows were partitioned or
//! in what order the partitions finished.

use std::f32::consts::{FRAC_PI_2, FRAC_PI_8, PI, TAU};
use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::config::SwtConfig;
use crate::edge::EdgeMap;
use crate::parallel;
use crate::types::{Dimensions, PipelineError};

/// Distance between successive ray samples, in pixels.
const STEP: f32 = 0.25;

/// Origin rows handled by one worker in [`cast_rays`].
const ROWS_PER_PARTITION: u32 = 16;

/// Which text polarity the ray caster looks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    /// Dark strokes on a light background: rays run against the gradient.
    DarkOnLight,
    /// Light strokes on a dark background: rays run along the gradient.
    LightOnDark,
    /// Run both and keep the per-pixel minimum.
    #[default]
    Both,
}

impl Polarity {
    /// Angle added to an edge pixel's gradient direction to get the cast
    /// direction, one entry per pass.
    fn cast_offsets(self) -> &'static [f32] {
        match self {
            Self::DarkOnLight => &[PI],
            Self::LightOnDark => &[0.0],
            Self::Both => &[PI, 0.0],
        }
    }
}

/// Per-pixel stroke width estimate.
///
/// Cells start unassigned (`f32::INFINITY`) and can only be lowered.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeWidthMap {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl StrokeWidthMap {
    /// A map with every cell unassigned.
    #[must_use]
    pub fn new(dimensions: Dimensions) -> Self {
        Self {
            width: dimensions.width,
            height: dimensions.height,
            data: vec![f32::INFINITY; dimensions.len()],
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

    /// Stroke width at `(x, y)`, or `None` when unassigned or out of range.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let v = self.data[self.index(x, y)];
        v.is_finite().then_some(v)
    }

    /// Returns `true` if `(x, y)` has a stroke width.
    #[must_use]
    pub fn is_assigned(&self, x: u32, y: u32) -> bool {
        self.get(x, y).is_some()
    }

    /// Number of assigned cells.
    #[must_use]
    pub fn assigned_count(&self) -> usize {
        self.data.iter().filter(|v| v.is_finite()).count()
    }

    /// Lower `(x, y)` to `width` if that is smaller than its current value.
    /// Out-of-range coordinates are ignored.
    pub fn lower(&mut self, x: u32, y: u32, width: f32) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            if width < self.data[idx] {
                self.data[idx] = width;
            }
        }
    }

    /// Per-cell minimum with `other`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if the maps differ in
    /// size.
    pub fn merge_min(&mut self, other: &Self) -> Result<(), PipelineError> {
        if self.dimensions() != other.dimensions() {
            return Err(PipelineError::DimensionMismatch {
                left: self.dimensions(),
                right: other.dimensions(),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            if b < *a {
                *a = b;
            }
        }
        Ok(())
    }

    /// Raw cells, row-major; unassigned cells are `f32::INFINITY`.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// Counts from one ray casting run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RayStats {
    /// Rays started (one per edge pixel per polarity pass).
    pub cast: usize,
    /// Rays that ended on an opposite edge.
    pub kept: usize,
}

/// A successful ray: the pixels it crossed, both end points included.
#[derive(Debug, Clone)]
struct Ray {
    pixels: Vec<(u32, u32)>,
    width: f32,
}

/// Shared parameters of one casting pass.
#[derive(Debug, Clone, Copy)]
struct Caster<'a> {
    edges: &'a EdgeMap,
    offset: f32,
    tolerance: f32,
    max_length: f32,
}

/// Smallest absolute difference between two angles, in `[0, π]`.
#[must_use]
pub fn angle_between(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

/// What a marching ray does when it enters an edge pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hit {
    /// The pixel is the far side of the stroke.
    Accept,
    /// The pixel runs along the ray; keep marching.
    PassOver,
    /// The pixel ends the ray without a match.
    Stop,
}

/// Largest angle between a corner ray's far edge and its expected
/// direction.
const AXIS_REACH: f32 = 3.0 * FRAC_PI_8;

/// Returns `true` if `angle` lies closer to a diagonal than to an axis.
fn is_diagonal(angle: f32) -> bool {
    (FRAC_PI_8..=3.0 * FRAC_PI_8).contains(&angle.rem_euclid(FRAC_PI_2))
}

impl Caster<'_> {
    /// Cast from `(x, y)` across the stroke.
    ///
    /// Corner pixels have diagonal gradients and their rays cross the
    /// stroke at a slant, missing the opposite edge. When such a ray fails,
    /// it is retried along the horizontal and then the vertical axis
    /// nearest the cast direction, so the first and last rows and columns
    /// of a stroke still get widths.
    fn march(&self, x: u32, y: u32, origin_direction: f32) -> Option<Ray> {
        let cast = origin_direction + self.offset;
        let opposite = origin_direction + PI;
        let direct = self.trace(x, y, cast, |end| {
            if angle_between(end, opposite) <= self.tolerance {
                Hit::Accept
            } else {
                Hit::Stop
            }
        });
        if direct.is_some() || !is_diagonal(cast) {
            return direct;
        }

        let (dy, dx) = cast.sin_cos();
        let horizontal = if dx >= 0.0 { 0.0 } else { PI };
        let vertical = if dy >= 0.0 { FRAC_PI_2 } else { 3.0 * FRAC_PI_2 };
        [horizontal, vertical].into_iter().find_map(|axis| {
            // The far edge faces along the axis for dark strokes and
            // against it for light ones.
            let facing = axis + PI - self.offset;
            self.trace(x, y, axis, |end| {
                let off = angle_between(end, facing);
                if off <= AXIS_REACH {
                    Hit::Accept
                } else if off < PI - AXIS_REACH {
                    Hit::PassOver
                } else {
                    Hit::Stop
                }
            })
        })
    }

    /// March from the centre of `(x, y)` along `angle` until `classify`
    /// accepts or stops at an edge pixel, the ray leaves the image, or it
    /// grows longer than `max_length`.
    fn trace(&self, x: u32, y: u32, angle: f32, classify: impl Fn(f32) -> Hit) -> Option<Ray> {
        let dims = self.edges.dimensions();
        let (dy, dx) = angle.sin_cos();
        #[allow(clippy::cast_precision_loss)]
        let (ox, oy) = (x as f32 + 0.5, y as f32 + 0.5);
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (dims.width as f32, dims.height as f32);

        // Saturates for limits beyond u32 steps; the image border ends the
        // ray long before that.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_steps = ((self.max_length / STEP).ceil() as u32).saturating_add(1);
        let mut pixels = vec![(x, y)];
        let mut current = (x, y);
        for step in 1..=max_steps {
            #[allow(clippy::cast_precision_loss)]
            let t = step as f32 * STEP;
            let px = dx.mul_add(t, ox);
            let py = dy.mul_add(t, oy);
            if px < 0.0 || py < 0.0 || px >= w || py >= h {
                return None;
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let cell = (px as u32, py as u32);
            if cell == current {
                continue;
            }
            current = cell;
            pixels.push(cell);

            if let Some(end_direction) = self.edges.direction(cell.0, cell.1) {
                match classify(end_direction) {
                    Hit::PassOver => {}
                    Hit::Stop => return None,
                    Hit::Accept => {
                        #[allow(clippy::cast_precision_loss)]
                        let width = (cell.0 as f32 - x as f32).hypot(cell.1 as f32 - y as f32);
                        return (width <= self.max_length).then_some(Ray { pixels, width });
                    }
                }
            }
        }
        None
    }

    /// Cast every edge pixel whose row lies in `rows`.
    fn cast_rows(&self, rows: Range<u32>) -> (Vec<Ray>, usize) {
        let height = self.edges.dimensions().height;
        let mut rays = Vec::new();
        let mut cast = 0;
        for y in rows.start..rows.end.min(height) {
            for (x, direction) in self.edges.row_edges(y) {
                cast += 1;
                if let Some(ray) = self.march(x, y, direction) {
                    rays.push(ray);
                }
            }
        }
        (rays, cast)
    }
}

/// Lower every ray's pixels to the median of the map along that ray.
///
/// All medians are read from the map as it was before this pass.
fn refine_with_medians(map: &mut StrokeWidthMap, rays: &[Ray]) {
    let medians: Vec<f32> = parallel::map_items(rays, |ray| {
        let mut values: Vec<f32> = ray
            .pixels
            .iter()
            .filter_map(|&(x, y)| map.get(x, y))
            .collect();
        values.sort_by(f32::total_cmp);
        values.get(values.len() / 2).copied().unwrap_or(ray.width)
    });
    for (ray, median) in rays.iter().zip(medians) {
        for &(x, y) in &ray.pixels {
            map.lower(x, y, median);
        }
    }
}

fn check_edge_budget(edges: &EdgeMap, config: &SwtConfig) -> Result<(), PipelineError> {
    let dims = edges.dimensions();
    let count = edges.edge_count();
    #[allow(clippy::cast_precision_loss)]
    let budget = f64::from(config.max_edge_fraction) * dims.pixel_count() as f64;
    #[allow(clippy::cast_precision_loss)]
    let over_budget = count as f64 > budget;
    if over_budget {
        return Err(PipelineError::ResourceExhausted(format!(
            "{count} edge pixels in a {}x{} image exceeds the {} edge fraction limit",
            dims.width, dims.height, config.max_edge_fraction,
        )));
    }
    Ok(())
}

/// Split `0..height` into consecutive ranges of [`ROWS_PER_PARTITION`].
fn default_partitions(height: u32) -> Vec<Range<u32>> {
    (0..height)
        .step_by(ROWS_PER_PARTITION as usize)
        .map(|start| start..start.saturating_add(ROWS_PER_PARTITION).min(height))
        .collect()
}

/// Estimate stroke widths for every edge in `edges`.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceExhausted`] when more than
/// `config.max_edge_fraction` of the image is edge pixels.
pub fn cast_rays(
    edges: &EdgeMap,
    config: &SwtConfig,
) -> Result<(StrokeWidthMap, RayStats), PipelineError> {
    let partitions = default_partitions(edges.dimensions().height);
    cast_rays_partitioned(edges, config, &partitions)
}

/// [`cast_rays`] with an explicit split of origin rows into worker
/// partitions.
///
/// The partitions should together cover every row of the map. Overlapping
/// partitions are harmless; rows left out cast no rays.
///
/// # Errors
///
/// Same as [`cast_rays`].
#[instrument(skip_all, fields(partitions = partitions.len(), polarity = ?config.polarity))]
pub fn cast_rays_partitioned(
    edges: &EdgeMap,
    config: &SwtConfig,
    partitions: &[Range<u32>],
) -> Result<(StrokeWidthMap, RayStats), PipelineError> {
    check_edge_budget(edges, config)?;

    let dims = edges.dimensions();
    let mut map = StrokeWidthMap::new(dims);
    let mut stats = RayStats::default();

    for &offset in config.polarity.cast_offsets() {
        let caster = Caster {
            edges,
            offset,
            tolerance: config.direction_tolerance,
            max_length: config.ray_length_for(dims.width, dims.height),
        };
        let results = parallel::map_items(partitions, |rows| caster.cast_rows(rows.clone()));

        let mut pass = StrokeWidthMap::new(dims);
        let mut rays = Vec::new();
        for (partition_rays, cast) in results {
            stats.cast += cast;
            for ray in &partition_rays {
                for &(x, y) in &ray.pixels {
                    pass.lower(x, y, ray.width);
                }
            }
            rays.extend(partition_rays);
        }
        stats.kept += rays.len();

        if config.median_refinement {
            refine_with_medians(&mut pass, &rays);
        }
        map.merge_min(&pass)?;
    }

    debug!(
        rays_cast = stats.cast,
        rays_kept = stats.kept,
        assigned = map.assigned_count(),
        "stroke widths assigned"
    );
    Ok((map, stats))
}
