//! Gaussian smoothing.
//!
//! Both entry points feed [`gaussian_kernel`] to
//! [`imageproc::filter::separable_filter_equal`], which pads by continuity.
//! Filtering runs on `f32` images so the horizontal and vertical passes do
//! not accumulate rounding. [`gaussian`] blurs each RGB channel of a raster
//! independently; [`blur_luma`] smooths the grayscale field the edge stages
//! work on.
//!
//! The kernel width is `ceil(nb_stddev * sigma)` rounded up to the next odd
//! number, so the kernel is always centred on the pixel.

use image::{Rgb, Rgb32FImage};
use imageproc::filter::separable_filter_equal;
use tracing::instrument;

use crate::raster::{self, LumaField};
use crate::types::{PipelineError, RasterImage};

/// Number of standard deviations covered by the kernel used for luma
/// pre-smoothing.
pub const DEFAULT_NB_STDDEV: f32 = 6.0;

/// Normalized 1-D Gaussian kernel, or `None` for non-positive parameters.
#[must_use]
pub fn gaussian_kernel(sigma: f32, nb_stddev: f32) -> Option<Vec<f32>> {
    if !(sigma > 0.0 && nb_stddev > 0.0) || !(sigma * nb_stddev).is_finite() {
        return None;
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let mut width = (nb_stddev * sigma).ceil() as usize;
    if width % 2 == 0 {
        width += 1;
    }
    let radius = width / 2;

    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..width)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let d = i as f32 - radius as f32;
            (-(d * d) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in &mut kernel {
        *k /= sum;
    }
    Some(kernel)
}

/// Smooth a luma field with a Gaussian of standard deviation `sigma`.
///
/// Non-positive `sigma` returns an unchanged copy.
#[must_use = "returns the blurred field"]
pub fn blur_luma(luma: &LumaField, sigma: f32) -> LumaField {
    let Some(kernel) = gaussian_kernel(sigma, DEFAULT_NB_STDDEV) else {
        return luma.clone();
    };
    if luma.dimensions().is_empty() {
        return luma.clone();
    }
    LumaField::from_image(separable_filter_equal(&luma.to_image(), &kernel))
}

/// Blur every channel of `image` with a Gaussian of standard deviation
/// `sigma`, using a kernel spanning `nb_stddev` standard deviations.
///
/// Non-positive `sigma` or `nb_stddev` returns the image unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for an empty raster.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn gaussian(
    image: &RasterImage,
    sigma: f32,
    nb_stddev: f32,
) -> Result<RasterImage, PipelineError> {
    raster::validate(image, 1, 1)?;
    let Some(kernel) = gaussian_kernel(sigma, nb_stddev) else {
        return Ok(image.clone());
    };

    let (w, h) = image.dimensions();
    let planes = Rgb32FImage::from_fn(w, h, |x, y| Rgb(image.get_pixel(x, y).0.map(f32::from)));
    let blurred = separable_filter_equal(&planes, &kernel);

    Ok(RasterImage::from_fn(w, h, |x, y| {
        Rgb(blurred.get_pixel(x, y).0.map(|v| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = v.round().clamp(0.0, 255.0) as u8;
            v
        }))
    }))
}
