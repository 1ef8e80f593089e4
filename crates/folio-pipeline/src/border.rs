//! Scan border detection.
//!
//! A flatbed scan often shows a dark frame where the scanner lid or bed
//! surrounds the page. The frame's inner edge is a long straight line, so
//! it shows up as a peak in the mean horizontal gradient of a column (for
//! left and right borders) or the mean vertical gradient of a row (for top
//! and bottom borders).
//!
//! Each side is searched over `search_fraction` of the image, starting
//! from that side. The strongest line above `min_line_strength` is taken
//! as the scanner edge and the content starts one pixel inside it. A side
//! with no such line keeps the image edge.

use tracing::{debug, instrument};

use crate::blur;
use crate::config::ScanBorderConfig;
use crate::gradient::GradientField;
use crate::raster::{self, LumaField};
use crate::types::{BoundingBox, PipelineError, RasterImage};

/// Mean absolute `gx` of every column and mean absolute `gy` of every row.
fn profiles(gradient: &GradientField) -> (Vec<f32>, Vec<f32>) {
    let (w, h) = (gradient.width(), gradient.height());
    let mut columns = vec![0.0_f32; w as usize];
    let mut rows = vec![0.0_f32; h as usize];
    for y in 0..h {
        for x in 0..w {
            columns[x as usize] += gradient.gx(x, y).abs();
            rows[y as usize] += gradient.gy(x, y).abs();
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let (fw, fh) = (w as f32, h as f32);
    for c in &mut columns {
        *c /= fh;
    }
    for r in &mut rows {
        *r /= fw;
    }
    (columns, rows)
}

/// Strongest line in `indices` (scanned in the given order) whose profile
/// value exceeds `min_strength`. Earlier indices win ties.
fn strongest(profile: &[f32], indices: impl Iterator<Item = usize>, min_strength: f32) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for i in indices {
        let v = profile[i];
        if v > min_strength && best.is_none_or(|(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Number of lines searched from each side of a `len`-line dimension.
fn search_span(len: usize, fraction: f32) -> usize {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let span = (len as f32 * fraction).ceil() as usize;
    span.clamp(1, len)
}

/// Content start (near side) and end (far side) along one dimension.
fn content_span(profile: &[f32], config: &ScanBorderConfig) -> (usize, usize) {
    let len = profile.len();
    let span = search_span(len, config.search_fraction);
    let start = strongest(profile, 0..span, config.min_line_strength).map_or(0, |i| i + 1);
    let end = strongest(profile, (len - span..len).rev(), config.min_line_strength)
        .map_or(len - 1, |i| i.saturating_sub(1));
    if start <= end { (start, end) } else { (0, len - 1) }
}

/// Detect the content rectangle inside a scanner border.
///
/// The returned box is inclusive and lies within the image. Without any
/// detectable border it covers the whole image.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for images smaller than 3×3 and
/// [`PipelineError::InvalidConfig`] for an invalid `config`.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn scan_border(
    image: &RasterImage,
    config: &ScanBorderConfig,
) -> Result<BoundingBox, PipelineError> {
    raster::validate(image, 3, 3)?;
    config.validate()?;
    let luma = blur::blur_luma(&LumaField::from_rgb(image), config.blur_sigma);
    let gradient = GradientField::compute(&luma);
    let (columns, rows) = profiles(&gradient);

    let (left, right) = content_span(&columns, config);
    let (top, bottom) = content_span(&rows, config);
    #[allow(clippy::cast_possible_truncation)]
    let content = BoundingBox {
        left: left as u32,
        top: top as u32,
        right: right as u32,
        bottom: bottom as u32,
    };
    debug!(?content, "scan border detected");
    Ok(content)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// White page with a black frame of the given thickness on each side.
    fn framed(w: u32, h: u32, left: u32, top: u32, right: u32, bottom: u32) -> RasterImage {
        RasterImage::from_fn(w, h, |x, y| {
            let frame = x < left || y < top || x >= w - right || y >= h - bottom;
            if frame {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn blank_page_has_no_border() {
        let img = RasterImage::from_pixel(60, 40, image::Rgb([250, 250, 250]));
        let content = scan_border(&img, &ScanBorderConfig::default()).unwrap();
        assert_eq!(
            content,
            BoundingBox {
                left: 0,
                top: 0,
                right: 59,
                bottom: 39
            }
        );
    }

    #[test]
    fn left_and_top_frame_is_found() {
        let img = framed(100, 80, 6, 6, 0, 0);
        let content = scan_border(&img, &ScanBorderConfig::default()).unwrap();
        assert!((6..=7).contains(&content.left), "{content:?}");
        assert!((6..=7).contains(&content.top), "{content:?}");
        assert_eq!(content.right, 99);
        assert_eq!(content.bottom, 79);
    }

    #[test]
    fn frame_on_every_side() {
        let img = framed(120, 90, 5, 8, 10, 4);
        let content = scan_border(&img, &ScanBorderConfig::default()).unwrap();
        assert!((5..=6).contains(&content.left), "{content:?}");
        assert!((8..=9).contains(&content.top), "{content:?}");
        // Last white column is 109, last white row is 85.
        assert!((108..=109).contains(&content.right), "{content:?}");
        assert!((84..=85).contains(&content.bottom), "{content:?}");
    }

    #[test]
    fn strength_threshold_is_configurable() {
        let img = framed(100, 80, 6, 0, 0, 0);
        let strict = ScanBorderConfig {
            min_line_strength: 1.0e6,
            ..ScanBorderConfig::default()
        };
        assert_eq!(scan_border(&img, &strict).unwrap().left, 0);
    }

    #[test]
    fn frame_outside_search_window_is_ignored() {
        // Frame edge at 40% of the width, beyond the default 25% window.
        let img = framed(100, 80, 40, 0, 0, 0);
        assert_eq!(scan_border(&img, &ScanBorderConfig::default()).unwrap().left, 0);
    }

    #[test]
    fn tiny_image_is_rejected() {
        let img = RasterImage::new(2, 9);
        assert!(matches!(
            scan_border(&img, &ScanBorderConfig::default()),
            Err(PipelineError::InvalidImage(_))
        ));
    }

    #[test]
    fn search_span_bounds() {
        assert_eq!(search_span(100, 0.25), 25);
        assert_eq!(search_span(3, 0.01), 1);
        assert_eq!(search_span(10, 2.0), 10);
    }

    #[test]
    fn invalid_search_fraction_is_rejected() {
        let img = framed(100, 80, 6, 0, 0, 0);
        for search_fraction in [f32::NAN, 0.0] {
            let config = ScanBorderConfig {
                search_fraction,
                ..ScanBorderConfig::default()
            };
            assert!(matches!(
                scan_border(&img, &config),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }
}
