//! Detector diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for parameter
//! tuning. [`detect_text_with_diagnostics`] runs the staged detector and
//! collects them alongside the output.
//!
//! Time is read through the [`Clock`] trait so callers decide where
//! timestamps come from. [`WebClock`] uses the `web-time` crate, which
//! maps to `performance.now()` on WASM and `std::time::Instant` natively.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::SwtConfig;
use crate::filter::FilterReport;
use crate::pipeline::{
    Clustered, EdgesDetected, Filtered, GradientsComputed, Pipeline, StrokesMeasured,
};
use crate::render::OutputMode;
use crate::stroke::Polarity;
use crate::types::{DetectOutput, Dimensions, PipelineError, RasterImage};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time passed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single detector run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: validation and Sobel gradients.
    pub gradients: StageDiagnostics,
    /// Stage 2: non-maximum suppression and hysteresis.
    pub edges: StageDiagnostics,
    /// Stage 3: ray casting.
    pub stroke_widths: StageDiagnostics,
    /// Stage 4: connected components.
    pub clustering: StageDiagnostics,
    /// Stage 5: geometric filtering.
    pub filtering: StageDiagnostics,
    /// Stage 6: output rendering.
    pub rendering: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Gradient computation.
    Gradients {
        /// Image width in pixels.
        width: u32,
        /// Image height in pixels.
        height: u32,
        /// Pre-smoothing sigma (`0.0` when disabled).
        blur_sigma: f32,
        /// Largest gradient magnitude.
        max_magnitude: f32,
    },
    /// Edge detection.
    Edges {
        /// Low threshold (after clamping).
        low_threshold: f32,
        /// High threshold (after clamping).
        high_threshold: f32,
        /// Number of edge pixels.
        edge_pixel_count: usize,
        /// Total pixel count for computing edge density.
        total_pixel_count: u64,
    },
    /// Ray casting.
    StrokeWidths {
        /// Polarity setting used.
        polarity: Polarity,
        /// Rays started from edge pixels.
        rays_cast: usize,
        /// Rays that met an opposite edge.
        rays_kept: usize,
        /// Pixels with an assigned stroke width.
        assigned_pixels: usize,
    },
    /// Connected components.
    Clustering {
        /// Components that met the minimum size.
        component_count: usize,
        /// Pixels in the largest component.
        largest_component: usize,
    },
    /// Geometric filtering.
    Filtering {
        /// Kept and rejected counts.
        report: FilterReport,
    },
    /// Output rendering.
    Rendering {
        /// Output mode used.
        mode: OutputMode,
        /// Number of boxes for geometry modes.
        box_count: Option<usize>,
    },
}

/// High-level summary counts for the entire run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Components that survived filtering.
    pub letter_count: usize,
    /// Boxes in the output, for geometry modes.
    pub box_count: Option<usize>,
}

impl PipelineDiagnostics {
    /// Every stage with its display name, in execution order.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Gradients", &self.gradients),
            ("Edges", &self.edges),
            ("Stroke Widths", &self.stroke_widths),
            ("Clustering", &self.clustering),
            ("Filtering", &self.filtering),
            ("Rendering", &self.rendering),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let boxes = self
            .summary
            .box_count
            .map_or_else(|| "-".to_string(), |n| n.to_string());
        lines.push(format!(
            "Letters: {}  |  Output boxes: {boxes}",
            self.summary.letter_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Gradients {
            width,
            height,
            blur_sigma,
            max_magnitude,
        } => format!("{width}x{height} sigma={blur_sigma:.2} max={max_magnitude:.1}"),
        StageMetrics::Edges {
            low_threshold,
            high_threshold,
            edge_pixel_count,
            total_pixel_count,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixel_count > 0 {
                *edge_pixel_count as f64 / *total_pixel_count as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "low={low_threshold:.1} high={high_threshold:.1} edges={edge_pixel_count} ({density:.1}%)",
            )
        }
        StageMetrics::StrokeWidths {
            polarity,
            rays_cast,
            rays_kept,
            assigned_pixels,
        } => format!("{polarity:?} rays={rays_kept}/{rays_cast} assigned={assigned_pixels}"),
        StageMetrics::Clustering {
            component_count,
            largest_component,
        } => format!("{component_count} components (largest={largest_component} px)"),
        StageMetrics::Filtering { report } => format!(
            "{}/{} kept (aspect={} variation={} blob={} degenerate={})",
            report.kept,
            report.examined,
            report.aspect_ratio,
            report.stroke_variation,
            report.solid_blob,
            report.degenerate,
        ),
        StageMetrics::Rendering { mode, box_count } => match box_count {
            Some(n) => format!("{mode} {n} boxes"),
            None => format!("{mode} raster"),
        },
    }
}

/// Run one stage transition, timing it with `clock`.
fn timed<C: Clock, T>(
    clock: &C,
    step: impl FnOnce() -> Result<T, PipelineError>,
) -> Result<(T, Duration), PipelineError> {
    let start = clock.now();
    let value = step()?;
    Ok((value, clock.elapsed(&start)))
}

/// Run the detector and collect per-stage diagnostics.
///
/// Produces the same output as [`detect_text`](crate::detect_text).
///
/// # Errors
///
/// Returns the first error raised by any stage.
pub fn detect_text_with_diagnostics<C: Clock>(
    image: RasterImage,
    mode: OutputMode,
    config: &SwtConfig,
    clock: &C,
) -> Result<(DetectOutput, PipelineDiagnostics), PipelineError> {
    let total_start = clock.now();
    let dims = Dimensions::of(&image);

    let (gradients, d) = timed(clock, || {
        Pipeline::new(image, config.clone()).gradients()
    })?;
    let gradients_diag = StageDiagnostics {
        duration: d,
        metrics: gradients.metrics(),
    };

    let (edges, d) = timed(clock, || GradientsComputed::edges(gradients))?;
    let edges_diag = StageDiagnostics {
        duration: d,
        metrics: edges.metrics(),
    };

    let (strokes, d) = timed(clock, || EdgesDetected::stroke_widths(edges))?;
    let strokes_diag = StageDiagnostics {
        duration: d,
        metrics: strokes.metrics(),
    };

    let (clustered, d) = timed(clock, || StrokesMeasured::cluster(strokes))?;
    let cluster_diag = StageDiagnostics {
        duration: d,
        metrics: clustered.metrics(),
    };

    let (filtered, d) = timed(clock, || Clustered::filter(clustered))?;
    let filter_diag = StageDiagnostics {
        duration: d,
        metrics: filtered.metrics(),
    };
    let letter_count = filtered.components().len();

    let (output, d) = timed(clock, || Filtered::render(filtered, mode))?;
    let box_count = output.boxes().map(<[_]>::len);
    let render_diag = StageDiagnostics {
        duration: d,
        metrics: StageMetrics::Rendering { mode, box_count },
    };

    let diagnostics = PipelineDiagnostics {
        gradients: gradients_diag,
        edges: edges_diag,
        stroke_widths: strokes_diag,
        clustering: cluster_diag,
        filtering: filter_diag,
        rendering: render_diag,
        total_duration: clock.elapsed(&total_start),
        summary: PipelineSummary {
            image_width: dims.width,
            image_height: dims.height,
            pixel_count: dims.pixel_count(),
            letter_count,
            box_count,
        },
    };
    Ok((output, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;

    /// Clock that advances one millisecond per reading.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn page() -> RasterImage {
        RasterImage::from_fn(100, 100, |x, y| {
            if (40..46).contains(&x) && (30..70).contains(&y) {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let ms = duration_ms(Duration::from_millis(1234));
        assert!((ms - 1234.0).abs() < 0.01);
    }

    #[test]
    fn diagnostics_match_output() {
        let clock = TickClock(Cell::new(0));
        let (output, diag) = detect_text_with_diagnostics(
            page(),
            OutputMode::LetterBoxes,
            &SwtConfig::default(),
            &clock,
        )
        .unwrap();

        assert_eq!(diag.summary.image_width, 100);
        assert_eq!(diag.summary.pixel_count, 10_000);
        assert_eq!(diag.summary.box_count, output.boxes().map(<[_]>::len));
        for (name, stage) in diag.stages() {
            assert_eq!(stage.duration, Duration::from_millis(1), "{name}");
        }
        assert!(diag.total_duration >= Duration::from_millis(6));
        assert!(matches!(
            diag.rendering.metrics,
            StageMetrics::Rendering {
                mode: OutputMode::LetterBoxes,
                ..
            }
        ));
    }

    #[test]
    fn raster_modes_report_no_boxes() {
        let (output, diag) = detect_text_with_diagnostics(
            page(),
            OutputMode::StrokesOnly,
            &SwtConfig::default(),
            &WebClock,
        )
        .unwrap();
        assert!(output.image().is_some());
        assert_eq!(diag.summary.box_count, None);
        assert!(diag.report().contains("Output boxes: -"));
    }

    #[test]
    fn report_lists_every_stage() {
        let (_, diag) = detect_text_with_diagnostics(
            page(),
            OutputMode::WordBoxes,
            &SwtConfig::default(),
            &WebClock,
        )
        .unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        for (name, _) in diag.stages() {
            assert!(report.contains(name), "missing {name}");
        }
        assert!(report.contains("word-boxes"));
    }

    #[test]
    fn diagnostics_round_trip_through_json() {
        let (_, diag) = detect_text_with_diagnostics(
            page(),
            OutputMode::LetterBoxes,
            &SwtConfig::default(),
            &WebClock,
        )
        .unwrap();
        let json = serde_json::to_string(&diag).unwrap();
        let back: PipelineDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back.summary.letter_count, diag.summary.letter_count);
        assert_eq!(back.summary.box_count, diag.summary.box_count);
    }

    #[test]
    fn errors_propagate() {
        let result = detect_text_with_diagnostics(
            RasterImage::new(2, 2),
            OutputMode::LetterBoxes,
            &SwtConfig::default(),
            &WebClock,
        );
        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
    }
}
