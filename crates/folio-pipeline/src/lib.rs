//! folio-pipeline: document image analysis (sans-IO).
//!
//! The centrepiece is a stroke width transform text detector:
//! luma -> Sobel gradients -> edges -> ray casting -> stroke width map ->
//! connected components -> geometric filter -> boxes or raster.
//!
//! Around it sit the scan-cleanup collaborators: [`scan_border`],
//! [`ace`], [`canny`], [`sobel`], [`noise_filter`], [`gaussian`] and
//! [`compare`].
//!
//! This crate has **no I/O dependencies**: it operates on in-memory
//! rasters and byte slices and returns structured data. File handling and
//! log subscribers live in the `folio` and `folio-bench` binaries.

pub mod ace;
pub mod blur;
pub mod border;
pub mod cluster;
pub mod compare;
pub mod config;
pub mod diagnostics;
pub mod edge;
pub mod filter;
pub mod gradient;
pub mod noise;
mod parallel;
pub mod pipeline;
pub mod raster;
pub mod render;
pub mod stroke;
pub mod types;

use tracing::instrument;

pub use ace::ace;
pub use blur::gaussian;
pub use border::scan_border;
pub use cluster::ConnectedComponent;
pub use compare::compare;
pub use config::{AceConfig, CannyConfig, NoiseFilterConfig, ScanBorderConfig, SwtConfig};
pub use diagnostics::{Clock, PipelineDiagnostics, WebClock, detect_text_with_diagnostics};
pub use edge::{EdgeMap, EdgeThresholds, canny, sobel};
pub use filter::FilterReport;
pub use noise::noise_filter;
pub use pipeline::Pipeline;
pub use raster::decode;
pub use render::OutputMode;
pub use stroke::{Polarity, StrokeWidthMap};
pub use types::{BoundingBox, DetectOutput, Dimensions, PipelineError, RasterImage};

/// Detect text in `image`.
///
/// Geometry modes return boxes; the other modes return a raster the size
/// of the input.
///
/// # Pipeline steps
///
/// 1. Validate config and image, compute Sobel gradients of the luma
/// 2. Non-maximum suppression and hysteresis into an edge map
/// 3. Cast rays from every edge pixel and build the stroke width map
/// 4. Group similar stroke widths into connected components
/// 5. Drop components whose geometry is not letter-like
/// 6. Render the survivors in `mode`
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an invalid `config`,
/// [`PipelineError::InvalidImage`] for an image below
/// [`SwtConfig::min_image_size`], [`PipelineError::ResourceExhausted`] for
/// an edge map too dense to be text, and [`PipelineError::TimedOut`] when
/// the time budget runs out between stages.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), %mode))]
pub fn detect_text(
    image: &RasterImage,
    mode: OutputMode,
    config: &SwtConfig,
) -> Result<DetectOutput, PipelineError> {
    Pipeline::new(image.clone(), config.clone())
        .gradients()?
        .edges()?
        .stroke_widths()?
        .cluster()?
        .filter()?
        .render(mode)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Two 6-px bars over rows 40..80 of a 160×120 white page, the second
    /// starting `gap` columns after the first ends.
    fn bars(gap: u32) -> RasterImage {
        let second = 56 + gap;
        RasterImage::from_fn(160, 120, |x, y| {
            let bar = ((50..56).contains(&x) || (second..second + 6).contains(&x))
                && (40..80).contains(&y);
            if bar {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
    }

    fn two_bars() -> RasterImage {
        bars(10)
    }

    #[test]
    fn uniform_page_has_no_text() {
        let img = RasterImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
        let out = detect_text(&img, OutputMode::LetterBoxes, &SwtConfig::default()).unwrap();
        assert_eq!(out, DetectOutput::Boxes(Vec::new()));
    }

    #[test]
    fn default_config_boxes_each_isolated_bar() {
        let img = bars(40);
        let config = SwtConfig::default();
        let letters = detect_text(&img, OutputMode::LetterBoxes, &config).unwrap();
        let letters = letters.boxes().unwrap();
        assert_eq!(letters.len(), 2, "{letters:?}");
        for b in letters {
            assert_eq!((b.top, b.bottom), (40, 79), "{b:?}");
        }
        assert!(letters[0].right < 60 && letters[1].left > 90, "{letters:?}");

        let words = detect_text(&img, OutputMode::WordBoxes, &config).unwrap();
        assert_eq!(words.boxes().unwrap().len(), 2);
    }

    #[test]
    fn default_polarity_joins_bars_across_a_narrow_light_gap() {
        // The light pass measures the 10-px gap as a stroke compatible with
        // the bars, and the merged map joins all three.
        let img = two_bars();
        let out = detect_text(&img, OutputMode::LetterBoxes, &SwtConfig::default()).unwrap();
        let letters = out.boxes().unwrap();
        assert_eq!(letters.len(), 1, "{letters:?}");
        assert!(letters[0].left <= 50 && letters[0].right >= 71, "{letters:?}");
    }

    #[test]
    fn dark_polarity_separates_close_bars_and_joins_them_into_a_word() {
        let img = two_bars();
        let config = SwtConfig {
            polarity: Polarity::DarkOnLight,
            ..SwtConfig::default()
        };
        let letters = detect_text(&img, OutputMode::LetterBoxes, &config).unwrap();
        let letters = letters.boxes().unwrap();
        assert_eq!(letters.len(), 2, "{letters:?}");

        let words = detect_text(&img, OutputMode::WordBoxes, &config).unwrap();
        let words = words.boxes().unwrap();
        assert_eq!(words.len(), 1, "{words:?}");
        assert!(words[0].width() > letters[0].width() * 2);
    }

    #[test]
    fn oversized_ray_limit_still_detects() {
        let img = RasterImage::from_fn(64, 64, |x, y| {
            if (29..35).contains(&x) && (12..52).contains(&y) {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let config = SwtConfig {
            max_ray_length: Some(1e10),
            ..SwtConfig::default()
        };
        config.validate().unwrap();
        let out = detect_text(&img, OutputMode::LetterBoxes, &config).unwrap();
        assert!(!out.boxes().unwrap().is_empty());
    }

    #[test]
    fn raster_modes_keep_dimensions() {
        let img = two_bars();
        for mode in [
            OutputMode::StrokesOnly,
            OutputMode::GrayscaleText,
            OutputMode::OriginalBoxes,
        ] {
            let out = detect_text(&img, mode, &SwtConfig::default()).unwrap();
            assert_eq!(out.image().unwrap().dimensions(), (160, 120), "{mode}");
        }
    }

    #[test]
    fn empty_image_is_rejected() {
        let img = RasterImage::new(0, 0);
        let result = detect_text(&img, OutputMode::LetterBoxes, &SwtConfig::default());
        assert!(matches!(result, Err(PipelineError::InvalidImage(_))));
    }

    #[test]
    fn matches_diagnostics_run() {
        let img = two_bars();
        let config = SwtConfig::default();
        let plain = detect_text(&img, OutputMode::WordBoxes, &config).unwrap();
        let (staged, _) =
            detect_text_with_diagnostics(img, OutputMode::WordBoxes, &config, &WebClock).unwrap();
        assert_eq!(plain, staged);
    }
}
