//! Isolated noise removal in the style of unpaper's noise filter.
//!
//! Dark specks left by scanner dust are small 8-connected clusters of
//! non-white pixels. Every cluster of at most `intensity` pixels is
//! painted white; larger clusters are left alone.

use tracing::{debug, instrument};

use crate::config::NoiseFilterConfig;
use crate::raster::{self, LumaField};
use crate::types::{PipelineError, RasterImage};

const WHITE: image::Rgb<u8> = image::Rgb([255, 255, 255]);

/// Remove isolated dark clusters from `image`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for an empty raster and
/// [`PipelineError::InvalidConfig`] for an invalid `config`.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), intensity = config.intensity))]
pub fn noise_filter(
    image: &RasterImage,
    config: &NoiseFilterConfig,
) -> Result<RasterImage, PipelineError> {
    let dims = raster::validate(image, 1, 1)?;
    config.validate()?;
    let (w, h) = (dims.width, dims.height);
    let luma = LumaField::from_rgb(image);
    let limit = config.white_threshold * 255.0;
    let dark = |x: u32, y: u32| luma.at(x, y) < limit;

    let mut out = image.clone();
    let mut visited = vec![false; dims.len()];
    let index = |x: u32, y: u32| y as usize * w as usize + x as usize;
    let mut removed = 0_usize;
    let mut stack = Vec::new();
    let mut cluster = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if visited[index(x, y)] || !dark(x, y) {
                continue;
            }
            visited[index(x, y)] = true;
            stack.push((x, y));
            cluster.clear();
            while let Some((cx, cy)) = stack.pop() {
                cluster.push((cx, cy));
                for dy in -1_i64..=1 {
                    for dx in -1_i64..=1 {
                        let (nx, ny) = (i64::from(cx) + dx, i64::from(cy) + dy);
                        if nx < 0 || ny < 0 || nx >= i64::from(w) || ny >= i64::from(h) {
                            continue;
                        }
                        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                        let (nx, ny) = (nx as u32, ny as u32);
                        let ni = index(nx, ny);
                        if !visited[ni] && dark(nx, ny) {
                            visited[ni] = true;
                            stack.push((nx, ny));
                        }
                    }
                }
            }
            if cluster.len() <= config.intensity {
                removed += 1;
                for &(px, py) in &cluster {
                    out.put_pixel(px, py, WHITE);
                }
            }
        }
    }

    debug!(removed, "noise clusters whitened");
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page_with(pixels: &[(u32, u32)]) -> RasterImage {
        let mut img = RasterImage::from_pixel(20, 20, WHITE);
        for &(x, y) in pixels {
            img.put_pixel(x, y, image::Rgb([0, 0, 0]));
        }
        img
    }

    #[test]
    fn isolated_specks_are_removed() {
        let img = page_with(&[(2, 2), (10, 10), (11, 11)]);
        let out = noise_filter(&img, &NoiseFilterConfig::default()).unwrap();
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn large_clusters_survive() {
        let stroke: Vec<(u32, u32)> = (3..12).map(|y| (5, y)).collect();
        let img = page_with(&stroke);
        let out = noise_filter(&img, &NoiseFilterConfig::default()).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn cluster_at_exact_intensity_is_removed() {
        let img = page_with(&[(0, 0), (1, 0), (0, 1), (1, 1)]);
        let config = NoiseFilterConfig {
            intensity: 4,
            ..NoiseFilterConfig::default()
        };
        let out = noise_filter(&img, &config).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);

        let config = NoiseFilterConfig {
            intensity: 3,
            ..NoiseFilterConfig::default()
        };
        let out = noise_filter(&img, &config).unwrap();
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn light_gray_counts_as_white() {
        let mut img = RasterImage::from_pixel(5, 5, WHITE);
        img.put_pixel(2, 2, image::Rgb([240, 240, 240]));
        let out = noise_filter(&img, &NoiseFilterConfig::default()).unwrap();
        // 240 is above 0.9 * 255, so it is not noise and is left as is.
        assert_eq!(out.get_pixel(2, 2).0, [240, 240, 240]);
    }

    #[test]
    fn nan_white_threshold_is_rejected() {
        let config = NoiseFilterConfig {
            white_threshold: f32::NAN,
            ..NoiseFilterConfig::default()
        };
        assert!(matches!(
            noise_filter(&page_with(&[(2, 2)]), &config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
