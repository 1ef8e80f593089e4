//! Incremental detector: advance stage by stage, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use folio_pipeline::{OutputMode, Pipeline, PipelineError, RasterImage, SwtConfig};
//! # fn run(image: RasterImage) -> Result<(), PipelineError> {
//! let filtered = Pipeline::new(image, SwtConfig::default())
//!     .gradients()?
//!     .edges()?
//!     .stroke_widths()?
//!     .cluster()?
//!     .filter()?;
//! println!("{} letters", filtered.components().len());
//! let output = filtered.render(OutputMode::WordBoxes)?;
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state, so stages
//! can only run in order and none can touch an earlier stage's output.
//! Every transition first checks the caller's time budget
//! ([`SwtConfig::timeout_ms`]) and fails with [`PipelineError::TimedOut`]
//! once it is spent. A running stage is never interrupted.
//!
//! Intermediates are dropped as soon as the next stage no longer needs
//! them; only the source raster is carried to the end for rendering.

use tracing::debug;

use crate::cluster::{self, ConnectedComponent};
use crate::config::SwtConfig;
use crate::diagnostics::{Clock, StageMetrics, WebClock};
use crate::edge::{self, EdgeMap};
use crate::filter::{self, FilterReport};
use crate::gradient::GradientField;
use crate::raster;
use crate::render::{self, OutputMode};
use crate::stroke::{self, RayStats, StrokeWidthMap};
use crate::types::{DetectOutput, Dimensions, PipelineError, RasterImage};

/// State shared by every stage.
#[derive(Debug)]
struct Context {
    config: SwtConfig,
    image: RasterImage,
    started: <WebClock as Clock>::Instant,
}

impl Context {
    /// Fail if the time budget is spent before `stage` starts.
    fn check_deadline(&self, stage: &'static str) -> Result<(), PipelineError> {
        let Some(budget) = self.config.timeout() else {
            return Ok(());
        };
        let elapsed = WebClock.elapsed(&self.started);
        if elapsed > budget {
            debug!(stage, ?elapsed, "time budget spent");
            return Err(PipelineError::TimedOut { stage, elapsed });
        }
        Ok(())
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Detector state before any processing.
#[must_use = "pipeline stages are consumed by advancing, call .gradients() to continue"]
#[derive(Debug)]
pub struct Pending {
    context: Context,
}

impl Pending {
    /// The source raster.
    #[must_use]
    pub const fn image(&self) -> &RasterImage {
        &self.context.image
    }

    /// Validate the input and compute the gradient field.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for an invalid config,
    /// [`PipelineError::InvalidImage`] for an image smaller than
    /// `min_image_size` on either side, and [`PipelineError::TimedOut`]
    /// when the time budget is spent.
    pub fn gradients(self) -> Result<GradientsComputed, PipelineError> {
        let context = self.context;
        context.config.validate()?;
        let min = context.config.min_image_size;
        raster::validate(&context.image, min, min)?;
        context.check_deadline(GradientsComputed::NAME)?;

        let gradient = edge::gradient_of(&context.image, context.config.blur_sigma);
        Ok(GradientsComputed { context, gradient })
    }
}

// ───────────────────────── Stage 1: Gradients ────────────────────────

/// Detector state after computing intensity gradients.
#[must_use = "pipeline stages are consumed by advancing, call .edges() to continue"]
#[derive(Debug)]
pub struct GradientsComputed {
    context: Context,
    gradient: GradientField,
}

impl GradientsComputed {
    /// Stage name used in diagnostics and timeout errors.
    pub const NAME: &str = "gradients";

    /// The gradient field.
    #[must_use]
    pub const fn gradient(&self) -> &GradientField {
        &self.gradient
    }

    /// Metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let dims = self.context.dimensions();
        StageMetrics::Gradients {
            width: dims.width,
            height: dims.height,
            blur_sigma: self.context.config.blur_sigma,
            max_magnitude: self.gradient.max_magnitude(),
        }
    }

    /// Thin and threshold the gradient field into an edge map.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TimedOut`] when the time budget is spent.
    pub fn edges(self) -> Result<EdgesDetected, PipelineError> {
        self.context.check_deadline(EdgesDetected::NAME)?;
        let edges = EdgeMap::detect(&self.gradient, self.context.config.thresholds);
        debug!(edge_pixels = edges.edge_count(), "edges detected");
        Ok(EdgesDetected {
            context: self.context,
            edges,
        })
    }
}

// ───────────────────────── Stage 2: Edges ────────────────────────────

/// Detector state after edge detection.
#[must_use = "pipeline stages are consumed by advancing, call .stroke_widths() to continue"]
#[derive(Debug)]
pub struct EdgesDetected {
    context: Context,
    edges: EdgeMap,
}

impl EdgesDetected {
    /// Stage name used in diagnostics and timeout errors.
    pub const NAME: &str = "edges";

    /// The edge map.
    #[must_use]
    pub const fn edges(&self) -> &EdgeMap {
        &self.edges
    }

    /// Metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        let thresholds = self.context.config.thresholds.clamped();
        StageMetrics::Edges {
            low_threshold: thresholds.low,
            high_threshold: thresholds.high,
            edge_pixel_count: self.edges.edge_count(),
            total_pixel_count: self.context.dimensions().pixel_count(),
        }
    }

    /// Cast rays from every edge pixel to build the stroke width map.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ResourceExhausted`] for an edge map too
    /// dense to be text, and [`PipelineError::TimedOut`] when the time
    /// budget is spent.
    pub fn stroke_widths(self) -> Result<StrokesMeasured, PipelineError> {
        self.context.check_deadline(StrokesMeasured::NAME)?;
        let (map, rays) = stroke::cast_rays(&self.edges, &self.context.config)?;
        Ok(StrokesMeasured {
            context: self.context,
            map,
            rays,
        })
    }
}

// ───────────────────────── Stage 3: Stroke widths ────────────────────

/// Detector state after ray casting.
#[must_use = "pipeline stages are consumed by advancing, call .cluster() to continue"]
#[derive(Debug)]
pub struct StrokesMeasured {
    context: Context,
    map: StrokeWidthMap,
    rays: RayStats,
}

impl StrokesMeasured {
    /// Stage name used in diagnostics and timeout errors.
    pub const NAME: &str = "stroke_widths";

    /// The stroke width map.
    #[must_use]
    pub const fn stroke_widths(&self) -> &StrokeWidthMap {
        &self.map
    }

    /// Ray counts.
    #[must_use]
    pub const fn rays(&self) -> RayStats {
        self.rays
    }

    /// Metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::StrokeWidths {
            polarity: self.context.config.polarity,
            rays_cast: self.rays.cast,
            rays_kept: self.rays.kept,
            assigned_pixels: self.map.assigned_count(),
        }
    }

    /// Group stroke pixels into connected components.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TimedOut`] when the time budget is spent.
    pub fn cluster(self) -> Result<Clustered, PipelineError> {
        self.context.check_deadline(Clustered::NAME)?;
        let components = cluster::cluster(&self.map, &self.context.config);
        Ok(Clustered {
            context: self.context,
            components,
        })
    }
}

// ───────────────────────── Stage 4: Clustered ────────────────────────

/// Detector state after clustering.
#[must_use = "pipeline stages are consumed by advancing, call .filter() to continue"]
#[derive(Debug)]
pub struct Clustered {
    context: Context,
    components: Vec<ConnectedComponent>,
}

impl Clustered {
    /// Stage name used in diagnostics and timeout errors.
    pub const NAME: &str = "cluster";

    /// Every component that met the minimum size.
    #[must_use]
    pub fn components(&self) -> &[ConnectedComponent] {
        &self.components
    }

    /// Metrics for diagnostics.
    #[must_use]
    pub fn metrics(&self) -> StageMetrics {
        StageMetrics::Clustering {
            component_count: self.components.len(),
            largest_component: self
                .components
                .iter()
                .map(ConnectedComponent::pixel_count)
                .max()
                .unwrap_or(0),
        }
    }

    /// Drop components whose geometry is not letter-like.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TimedOut`] when the time budget is spent.
    pub fn filter(self) -> Result<Filtered, PipelineError> {
        self.context.check_deadline(Filtered::NAME)?;
        let (components, report) =
            filter::filter_components(self.components, &self.context.config);
        Ok(Filtered {
            context: self.context,
            components,
            report,
        })
    }
}

// ───────────────────────── Stage 5: Filtered ─────────────────────────

/// Detector state after geometric filtering: the surviving letters.
#[must_use = "call .render() to produce the output"]
#[derive(Debug)]
pub struct Filtered {
    context: Context,
    components: Vec<ConnectedComponent>,
    report: FilterReport,
}

impl Filtered {
    /// Stage name used in diagnostics and timeout errors.
    pub const NAME: &str = "filter";

    /// Name of the final rendering step.
    pub const RENDER_NAME: &str = "render";

    /// Candidate letters.
    #[must_use]
    pub fn components(&self) -> &[ConnectedComponent] {
        &self.components
    }

    /// Rejection counts.
    #[must_use]
    pub const fn report(&self) -> FilterReport {
        self.report
    }

    /// Metrics for diagnostics.
    #[must_use]
    pub const fn metrics(&self) -> StageMetrics {
        StageMetrics::Filtering {
            report: self.report,
        }
    }

    /// Produce the final output.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::TimedOut`] when the time budget is spent.
    pub fn render(self, mode: OutputMode) -> Result<DetectOutput, PipelineError> {
        self.context.check_deadline(Self::RENDER_NAME)?;
        Ok(render::render(
            &self.context.image,
            &self.components,
            mode,
            &self.context.config,
        ))
    }
}

/// Entry point of the staged detector.
pub struct Pipeline;

impl Pipeline {
    /// Start a detector run over `image` with `config`.
    ///
    /// Nothing is computed and the time budget starts now.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(image: RasterImage, config: SwtConfig) -> Pending {
        Pending {
            context: Context {
                config,
                image,
                started: WebClock.now(),
            },
        }
    }
}
