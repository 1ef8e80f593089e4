//! Geometric rejection of components that do not look like letters.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cluster::ConnectedComponent;
use crate::config::SwtConfig;

/// Why a component was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Mean stroke width is zero or not finite.
    DegenerateStroke,
    /// Height over width outside the configured bounds.
    AspectRatio,
    /// Stroke width varies too much within the component.
    StrokeVariation,
    /// Nearly solid and too small relative to its stroke: a blob, not an
    /// outline.
    SolidBlob,
}

/// Rejection counts from one filter run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterReport {
    /// Components examined.
    pub examined: usize,
    /// Components kept.
    pub kept: usize,
    /// Rejected for a zero or non-finite mean stroke width.
    pub degenerate: usize,
    /// Rejected for aspect ratio.
    pub aspect_ratio: usize,
    /// Rejected for stroke width variation.
    pub stroke_variation: usize,
    /// Rejected as solid blobs.
    pub solid_blob: usize,
}

impl FilterReport {
    const fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::DegenerateStroke => self.degenerate += 1,
            Rejection::AspectRatio => self.aspect_ratio += 1,
            Rejection::StrokeVariation => self.stroke_variation += 1,
            Rejection::SolidBlob => self.solid_blob += 1,
        }
    }
}

/// First rule `component` breaks, or `None` if it passes.
#[must_use]
pub fn check(component: &ConnectedComponent, config: &SwtConfig) -> Option<Rejection> {
    let mean = component.mean_stroke_width();
    if !(mean.is_finite() && mean > 0.0) {
        return Some(Rejection::DegenerateStroke);
    }

    let aspect = component.aspect_ratio();
    if !(config.min_aspect_ratio..=config.max_aspect_ratio).contains(&aspect) {
        return Some(Rejection::AspectRatio);
    }

    if component.stroke_cv() > config.max_stroke_cv {
        return Some(Rejection::StrokeVariation);
    }

    if component.fill_ratio() > config.max_fill_ratio
        && component.diameter() / mean < config.min_diameter_ratio
    {
        return Some(Rejection::SolidBlob);
    }

    None
}

/// Keep the components that pass every rule, in their original order.
#[instrument(skip_all, fields(components = components.len()))]
pub fn filter_components(
    components: Vec<ConnectedComponent>,
    config: &SwtConfig,
) -> (Vec<ConnectedComponent>, FilterReport) {
    let mut report = FilterReport {
        examined: components.len(),
        ..FilterReport::default()
    };
    let kept: Vec<ConnectedComponent> = components
        .into_iter()
        .filter(|c| match check(c, config) {
            Some(rejection) => {
                report.record(rejection);
                false
            }
            None => true,
        })
        .collect();
    report.kept = kept.len();
    debug!(?report, "filtered components");
    (kept, report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A solid `w × h` rectangle with uniform stroke width.
    fn rect(w: u32, h: u32, stroke: f32) -> ConnectedComponent {
        let pixels: Vec<(u32, u32)> = (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).collect();
        let widths = vec![stroke; pixels.len()];
        ConnectedComponent::new(0, pixels, &widths).unwrap()
    }

    /// Outline of a `w × h` box, two pixels thick.
    fn ring(w: u32, h: u32) -> ConnectedComponent {
        let pixels: Vec<(u32, u32)> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| x < 2 || y < 2 || x >= w - 2 || y >= h - 2)
            .collect();
        let widths = vec![2.0; pixels.len()];
        ConnectedComponent::new(0, pixels, &widths).unwrap()
    }

    #[test]
    fn letter_shaped_outline_passes() {
        assert_eq!(check(&ring(10, 16), &SwtConfig::default()), None);
    }

    #[test]
    fn thin_bar_passes() {
        // A vertical stroke: solid, but long relative to its width.
        assert_eq!(check(&rect(6, 40, 6.0), &SwtConfig::default()), None);
    }

    #[test]
    fn flat_line_fails_aspect() {
        assert_eq!(
            check(&rect(200, 3, 3.0), &SwtConfig::default()),
            Some(Rejection::AspectRatio)
        );
    }

    #[test]
    fn tall_sliver_fails_aspect() {
        assert_eq!(
            check(&rect(2, 60, 2.0), &SwtConfig::default()),
            Some(Rejection::AspectRatio)
        );
    }

    #[test]
    fn uneven_stroke_fails_variation() {
        let pixels: Vec<(u32, u32)> = (0..10).flat_map(|y| (0..8).map(move |x| (x, y))).collect();
        let widths: Vec<f32> = (0..pixels.len())
            .map(|i| if i % 2 == 0 { 1.0 } else { 9.0 })
            .collect();
        let comp = ConnectedComponent::new(0, pixels, &widths).unwrap();
        assert_eq!(
            check(&comp, &SwtConfig::default()),
            Some(Rejection::StrokeVariation)
        );
    }

    #[test]
    fn solid_square_fails_blob() {
        // 10x10 filled, stroke 10: diameter ~14 is under 2.5 strokes.
        assert_eq!(
            check(&rect(10, 10, 10.0), &SwtConfig::default()),
            Some(Rejection::SolidBlob)
        );
    }

    #[test]
    fn zero_stroke_is_degenerate() {
        assert_eq!(
            check(&rect(5, 8, 0.0), &SwtConfig::default()),
            Some(Rejection::DegenerateStroke)
        );
    }

    #[test]
    fn report_counts_each_reason() {
        let comps = vec![
            ring(10, 16),
            rect(200, 3, 3.0),
            rect(10, 10, 10.0),
            rect(6, 40, 6.0),
        ];
        let (kept, report) = filter_components(comps, &SwtConfig::default());
        assert_eq!(kept.len(), 2);
        assert_eq!(
            report,
            FilterReport {
                examined: 4,
                kept: 2,
                degenerate: 0,
                aspect_ratio: 1,
                stroke_variation: 0,
                solid_blob: 1,
            }
        );
    }
}
