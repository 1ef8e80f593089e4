//! Connected components over the stroke width map.
//!
//! Two 8-adjacent assigned pixels join when the larger of their stroke
//! widths is at most `stroke_ratio` times the smaller. Components are
//! grown with a union-find over the whole grid, then collected in
//! row-major order of their first pixel, which makes ids and output order
//! deterministic.

use petgraph::unionfind::UnionFind;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::SwtConfig;
use crate::stroke::StrokeWidthMap;
use crate::types::BoundingBox;

/// A candidate letter: a maximal cluster of compatible stroke pixels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedComponent {
    id: usize,
    pixels: Vec<(u32, u32)>,
    bounds: BoundingBox,
    mean_stroke_width: f32,
    stroke_variance: f32,
}

impl ConnectedComponent {
    /// Build a component and its summary statistics from pixels and their
    /// stroke widths. Returns `None` for an empty pixel list.
    #[must_use]
    pub fn new(id: usize, pixels: Vec<(u32, u32)>, widths: &[f32]) -> Option<Self> {
        let (&(x0, y0), rest) = pixels.split_first()?;
        let mut bounds = BoundingBox::point(x0, y0);
        for &(x, y) in rest {
            bounds.include(x, y);
        }

        #[allow(clippy::cast_precision_loss)]
        let n = widths.len().max(1) as f64;
        let mean = widths.iter().map(|&w| f64::from(w)).sum::<f64>() / n;
        let variance = widths
            .iter()
            .map(|&w| (f64::from(w) - mean).powi(2))
            .sum::<f64>()
            / n;

        #[allow(clippy::cast_possible_truncation)]
        let (mean_stroke_width, stroke_variance) = (mean as f32, variance as f32);
        Some(Self {
            id,
            pixels,
            bounds,
            mean_stroke_width,
            stroke_variance,
        })
    }

    /// Position in the clusterer's output, starting at zero.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    /// Member pixel coordinates, row-major.
    #[must_use]
    pub fn pixels(&self) -> &[(u32, u32)] {
        &self.pixels
    }

    /// Tight bounding box of the pixels.
    #[must_use]
    pub const fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Number of member pixels.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Mean stroke width over the member pixels.
    #[must_use]
    pub const fn mean_stroke_width(&self) -> f32 {
        self.mean_stroke_width
    }

    /// Population variance of the stroke widths.
    #[must_use]
    pub const fn stroke_variance(&self) -> f32 {
        self.stroke_variance
    }

    /// Coefficient of variation (standard deviation over mean).
    ///
    /// Infinite when the mean is zero.
    #[must_use]
    pub fn stroke_cv(&self) -> f32 {
        if self.mean_stroke_width > 0.0 {
            self.stroke_variance.sqrt() / self.mean_stroke_width
        } else {
            f32::INFINITY
        }
    }

    /// Bounding box height over width.
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.bounds.height() as f32 / self.bounds.width() as f32;
        ratio
    }

    /// Fraction of the bounding box covered by member pixels.
    #[must_use]
    pub fn fill_ratio(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let ratio = self.pixels.len() as f32 / self.bounds.area() as f32;
        ratio
    }

    /// Length of the bounding box diagonal.
    #[must_use]
    pub fn diameter(&self) -> f32 {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (self.bounds.width() as f32, self.bounds.height() as f32);
        w.hypot(h)
    }
}

/// Returns `true` if two stroke widths may share a component.
#[must_use]
pub fn compatible(a: f32, b: f32, stroke_ratio: f32) -> bool {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    lo > 0.0 && hi <= lo * stroke_ratio
}

/// Group assigned pixels of `map` into components.
///
/// Components with fewer than `config.min_component_pixels` pixels are
/// dropped. Returned ids run `0..n` in row-major order of each component's
/// first pixel.
#[instrument(skip_all, fields(assigned = map.assigned_count()))]
pub fn cluster(map: &StrokeWidthMap, config: &SwtConfig) -> Vec<ConnectedComponent> {
    let dims = map.dimensions();
    let (w, h) = (dims.width, dims.height);
    let index = |x: u32, y: u32| y as usize * w as usize + x as usize;

    let mut uf = UnionFind::<usize>::new(dims.len());
    for y in 0..h {
        for x in 0..w {
            let Some(here) = map.get(x, y) else {
                continue;
            };
            // Forward half of the 8-neighborhood; the other half is covered
            // when the neighbor is visited.
            let forward = [
                (x.checked_add(1), Some(y)),
                (x.checked_sub(1), y.checked_add(1)),
                (Some(x), y.checked_add(1)),
                (x.checked_add(1), y.checked_add(1)),
            ];
            for (nx, ny) in forward {
                let (Some(nx), Some(ny)) = (nx, ny) else {
                    continue;
                };
                if let Some(there) = map.get(nx, ny)
                    && compatible(here, there, config.stroke_ratio)
                {
                    uf.union(index(x, y), index(nx, ny));
                }
            }
        }
    }
    let labels = uf.into_labeling();

    // Root label -> position in `groups`, in first-seen order.
    let mut slot = vec![usize::MAX; dims.len()];
    let mut groups: Vec<(Vec<(u32, u32)>, Vec<f32>)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let Some(width) = map.get(x, y) else {
                continue;
            };
            let root = labels[index(x, y)];
            if slot[root] == usize::MAX {
                slot[root] = groups.len();
                groups.push((Vec::new(), Vec::new()));
            }
            let (pixels, widths) = &mut groups[slot[root]];
            pixels.push((x, y));
            widths.push(width);
        }
    }

    let total = groups.len();
    let components: Vec<ConnectedComponent> = groups
        .into_iter()
        .filter(|(pixels, _)| pixels.len() >= config.min_component_pixels)
        .enumerate()
        .filter_map(|(id, (pixels, widths))| ConnectedComponent::new(id, pixels, &widths))
        .collect();

    debug!(
        components = components.len(),
        dropped = total - components.len(),
        "clustered stroke pixels"
    );
    components
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Dimensions;

    fn map_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> Option<f32>) -> StrokeWidthMap {
        let mut map = StrokeWidthMap::new(Dimensions {
            width: w,
            height: h,
        });
        for y in 0..h {
            for x in 0..w {
                if let Some(v) = f(x, y) {
                    map.lower(x, y, v);
                }
            }
        }
        map
    }

    #[test]
    fn empty_map_has_no_components() {
        let map = map_from_fn(10, 10, |_, _| None);
        assert!(cluster(&map, &SwtConfig::default()).is_empty());
    }

    #[test]
    fn diagonal_neighbors_connect() {
        let map = map_from_fn(6, 6, |x, y| (x == y).then_some(2.0));
        let comps = cluster(&map, &SwtConfig::default());
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].pixel_count(), 6);
        assert_eq!(
            comps[0].bounds(),
            BoundingBox {
                left: 0,
                top: 0,
                right: 5,
                bottom: 5
            }
        );
    }

    #[test]
    fn anti_diagonal_neighbors_connect() {
        let map = map_from_fn(6, 6, |x, y| (x + y == 5).then_some(2.0));
        assert_eq!(cluster(&map, &SwtConfig::default()).len(), 1);
    }

    #[test]
    fn incompatible_widths_stay_apart() {
        // Left block width 2, right block width 10, touching at x = 4|5.
        let map = map_from_fn(10, 4, |x, _| Some(if x < 5 { 2.0 } else { 10.0 }));
        let comps = cluster(&map, &SwtConfig::default());
        assert_eq!(comps.len(), 2);
        assert!((comps[0].mean_stroke_width() - 2.0).abs() < 1e-6);
        assert!((comps[1].mean_stroke_width() - 10.0).abs() < 1e-6);
        assert_eq!(comps[0].id(), 0);
        assert_eq!(comps[1].id(), 1);
    }

    #[test]
    fn joined_neighbors_respect_the_ratio() {
        // Widths alternate by column; every joined neighbor pair must be
        // within the ratio.
        let widths = [1.0_f32, 2.5, 9.0, 4.0, 3.5, 20.0, 7.0];
        let map = map_from_fn(7, 5, |x, _| Some(widths[x as usize]));
        let config = SwtConfig::default();
        let comps = cluster(&map, &config);
        for comp in &comps {
            let cols: Vec<u32> = comp.pixels().iter().map(|p| p.0).collect();
            let lo = *cols.iter().min().unwrap() as usize;
            let hi = *cols.iter().max().unwrap() as usize;
            for c in lo..hi {
                assert!(
                    compatible(widths[c], widths[c + 1], config.stroke_ratio),
                    "columns {c} and {} joined",
                    c + 1
                );
            }
        }
        // 1|2.5 join, 2.5|9 split, 9|4 join, 4|3.5 join, 3.5|20 split, 20|7 join.
        assert_eq!(comps.len(), 3);
    }

    #[test]
    fn small_components_are_dropped() {
        let map = map_from_fn(10, 10, |x, y| {
            let big = x < 3 && y < 3;
            let speck = x == 8 && y == 8;
            (big || speck).then_some(2.0)
        });
        let comps = cluster(&map, &SwtConfig::default());
        assert_eq!(comps.len(), 1);
        assert_eq!(comps[0].pixel_count(), 9);
    }

    #[test]
    fn statistics() {
        let pixels = vec![(0, 0), (1, 0), (0, 1), (1, 1), (2, 1)];
        let widths = [2.0, 2.0, 4.0, 4.0, 3.0];
        let comp = ConnectedComponent::new(7, pixels, &widths).unwrap();
        assert_eq!(comp.id(), 7);
        assert!((comp.mean_stroke_width() - 3.0).abs() < 1e-6);
        assert!((comp.stroke_variance() - 0.8).abs() < 1e-6);
        assert!((comp.aspect_ratio() - 2.0 / 3.0).abs() < 1e-6);
        assert!((comp.fill_ratio() - 5.0 / 6.0).abs() < 1e-6);
        assert!((comp.diameter() - 13.0_f32.sqrt()).abs() < 1e-6);
        assert!(ConnectedComponent::new(0, Vec::new(), &[]).is_none());
    }

    #[test]
    fn compatibility_is_symmetric_and_rejects_zero() {
        assert!(compatible(2.0, 6.0, 3.0));
        assert!(compatible(6.0, 2.0, 3.0));
        assert!(!compatible(2.0, 6.1, 3.0));
        assert!(!compatible(0.0, 0.0, 3.0));
    }
}
