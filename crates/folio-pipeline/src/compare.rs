//! Pixel-exact image comparison.

use tracing::{debug, instrument};

use crate::raster;
use crate::types::{Dimensions, PipelineError, RasterImage};

/// Color of differing pixels in the diff image.
const DIFF_COLOR: image::Rgb<u8> = image::Rgb([255, 0, 0]);

/// Compare two rasters pixel by pixel.
///
/// Returns whether any pixel differs, plus a diff image: differing pixels
/// are red, identical ones are a lightened gray of `a` so the red stands
/// out against the page.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the images differ in
/// size.
#[instrument(skip_all, fields(width = a.width(), height = a.height()))]
pub fn compare(a: &RasterImage, b: &RasterImage) -> Result<(bool, RasterImage), PipelineError> {
    let (left, right) = (Dimensions::of(a), Dimensions::of(b));
    if left != right {
        return Err(PipelineError::DimensionMismatch { left, right });
    }

    let mut differing = 0_usize;
    let diff = RasterImage::from_fn(a.width(), a.height(), |x, y| {
        let pa = *a.get_pixel(x, y);
        if pa == *b.get_pixel(x, y) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let v = f32::midpoint(raster::luma(pa), 255.0).round() as u8;
            image::Rgb([v, v, v])
        } else {
            differing += 1;
            DIFF_COLOR
        }
    });

    debug!(differing, "compared images");
    Ok((differing > 0, diff))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[allow(clippy::cast_possible_truncation)]
    fn gradient_image(w: u32, h: u32) -> RasterImage {
        RasterImage::from_fn(w, h, |x, y| image::Rgb([(x * 10) as u8, (y * 10) as u8, 77]))
    }

    #[test]
    fn identical_images_have_no_difference() {
        let img = gradient_image(12, 9);
        let (differs, diff) = compare(&img, &img).unwrap();
        assert!(!differs);
        assert_eq!(diff.dimensions(), (12, 9));
        assert!(diff.pixels().all(|p| p.0 != [255, 0, 0]));
    }

    #[test]
    fn changed_pixel_is_red() {
        let a = gradient_image(12, 9);
        let mut b = a.clone();
        b.put_pixel(3, 4, image::Rgb([1, 2, 3]));
        let (differs, diff) = compare(&a, &b).unwrap();
        assert!(differs);
        assert_eq!(diff.get_pixel(3, 4).0, [255, 0, 0]);
        assert_eq!(diff.pixels().filter(|p| p.0 == [255, 0, 0]).count(), 1);
    }

    #[test]
    fn unchanged_pixels_are_lightened() {
        let img = RasterImage::from_pixel(2, 2, image::Rgb([0, 0, 0]));
        let (_, diff) = compare(&img, &img).unwrap();
        assert_eq!(diff.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let a = RasterImage::new(10, 10);
        let b = RasterImage::new(10, 11);
        let err = compare(&a, &b).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }
}
