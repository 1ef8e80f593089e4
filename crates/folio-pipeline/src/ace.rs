//! Automatic color equalization (ACE) with random sampling.
//!
//! Each pixel is compared against a fixed number of sample pixels. The
//! contrast against each sample goes through a saturating slope and is
//! weighted by inverse distance; the weighted mean is the pixel's relative
//! lightness for that channel. Each channel is then linearly stretched to
//! the full `0..=255` range.
//!
//! Sample positions come from a SipHash counter keyed by the seed and the
//! pixel coordinates, so a seed fully determines the output regardless of
//! how rows are scheduled.

use std::hash::Hasher;

use siphasher::sip::SipHasher13;
use tracing::{debug, instrument};

use crate::config::AceConfig;
use crate::parallel;
use crate::raster;
use crate::types::{PipelineError, RasterImage};

/// Second SipHash key; fixed so only the seed varies the stream.
const SAMPLE_KEY: u64 = 0x6163_655f_7361_6d70;

/// Index of sample `k` for pixel `(x, y)` in an image of `len` pixels.
fn sample_index(seed: u64, x: u32, y: u32, k: u32, len: usize) -> usize {
    let mut hasher = SipHasher13::new_with_keys(seed, SAMPLE_KEY);
    hasher.write_u32(x);
    hasher.write_u32(y);
    hasher.write_u32(k);
    #[allow(clippy::cast_possible_truncation)]
    let index = (hasher.finish() % len as u64) as usize;
    index
}

/// Relative lightness of every pixel of one row, per channel.
fn relative_row(image: &RasterImage, config: &AceConfig, y: u32) -> Vec<[f32; 3]> {
    let w = image.width();
    let len = w as usize * image.height() as usize;
    (0..w)
        .map(|x| {
            let here = image.get_pixel(x, y).0;
            let mut sum = [0.0_f32; 3];
            let mut weight_sum = 0.0_f32;
            for k in 0..config.samples {
                let j = sample_index(config.seed, x, y, k, len);
                #[allow(clippy::cast_possible_truncation)]
                let (jx, jy) = ((j % w as usize) as u32, (j / w as usize) as u32);
                let there = image.get_pixel(jx, jy).0;

                #[allow(clippy::cast_precision_loss)]
                let distance = (x.abs_diff(jx) as f32).hypot(y.abs_diff(jy) as f32);
                let weight = 1.0 / distance.clamp(1.0, config.limit);
                weight_sum += weight;
                for c in 0..3 {
                    let contrast = f32::from(here[c]) - f32::from(there[c]);
                    let saturated = (config.slope * contrast / 255.0).clamp(-1.0, 1.0);
                    sum[c] += saturated * weight;
                }
            }
            sum.map(|s| if weight_sum > 0.0 { s / weight_sum } else { 0.0 })
        })
        .collect()
}

/// Equalize the contrast and color of `image`.
///
/// A channel with no spread in relative lightness (for example a uniform
/// image) keeps its original values.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for an empty raster and
/// [`PipelineError::InvalidConfig`] if `config` fails validation.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), seed = config.seed))]
pub fn ace(image: &RasterImage, config: &AceConfig) -> Result<RasterImage, PipelineError> {
    raster::validate(image, 1, 1)?;
    config.validate()?;

    let relative: Vec<[f32; 3]> = parallel::map_rows(0..image.height(), |y| {
        relative_row(image, config, y)
    })
    .into_iter()
    .flatten()
    .collect();

    let mut lo = [f32::INFINITY; 3];
    let mut hi = [f32::NEG_INFINITY; 3];
    for r in &relative {
        for c in 0..3 {
            lo[c] = lo[c].min(r[c]);
            hi[c] = hi[c].max(r[c]);
        }
    }
    debug!(?lo, ?hi, "relative lightness range");

    let w = image.width() as usize;
    Ok(RasterImage::from_fn(image.width(), image.height(), |x, y| {
        let r = relative[y as usize * w + x as usize];
        let original = image.get_pixel(x, y).0;
        image::Rgb(std::array::from_fn(|c| {
            let span = hi[c] - lo[c];
            if span <= f32::EPSILON {
                original[c]
            } else {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let v = ((r[c] - lo[c]) / span * 255.0).round().clamp(0.0, 255.0) as u8;
                v
            }
        }))
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config(seed: u64) -> AceConfig {
        AceConfig {
            seed,
            samples: 24,
            ..AceConfig::default()
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn textured(w: u32, h: u32) -> RasterImage {
        RasterImage::from_fn(w, h, |x, y| {
            image::Rgb([
                (100 + (x * 7 + y * 3) % 20) as u8,
                (90 + (x * 5) % 30) as u8,
                (110 + (y * 11) % 15) as u8,
            ])
        })
    }

    #[test]
    fn same_seed_is_reproducible() {
        let img = textured(16, 12);
        assert_eq!(ace(&img, &config(7)).unwrap(), ace(&img, &config(7)).unwrap());
    }

    #[test]
    fn different_seeds_sample_differently() {
        let img = textured(16, 12);
        assert_ne!(ace(&img, &config(1)).unwrap(), ace(&img, &config(2)).unwrap());
    }

    #[test]
    fn low_contrast_is_stretched_to_full_range() {
        let out = ace(&textured(16, 12), &config(3)).unwrap();
        for c in 0..3 {
            let values: Vec<u8> = out.pixels().map(|p| p.0[c]).collect();
            assert_eq!(values.iter().min(), Some(&0), "channel {c}");
            assert_eq!(values.iter().max(), Some(&255), "channel {c}");
        }
    }

    #[test]
    fn uniform_image_is_unchanged() {
        let img = RasterImage::from_pixel(8, 8, image::Rgb([40, 80, 120]));
        assert_eq!(ace(&img, &config(0)).unwrap(), img);
    }

    #[test]
    fn sample_indices_stay_in_range() {
        for k in 0..200 {
            assert!(sample_index(9, 3, 4, k, 37) < 37);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let img = textured(4, 4);
        let bad = AceConfig {
            samples: 0,
            ..AceConfig::default()
        };
        assert!(matches!(ace(&img, &bad), Err(PipelineError::InvalidConfig(_))));
    }
}
