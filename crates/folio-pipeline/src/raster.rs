//! Raster decoding, validation, and grayscale reduction.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the
//! three-channel [`RasterImage`] every algorithm consumes. The SWT stages
//! work on a [`LumaField`], a floating-point grayscale reduction that
//! converts to and from the `imageproc` float image type.

use image::{ImageBuffer, Luma};
use imageproc::definitions::Image;

use crate::types::{Dimensions, PipelineError, RasterImage};

/// Luma weight for the red channel.
const LUMA_R: f32 = 0.299;
/// Luma weight for the green channel.
const LUMA_G: f32 = 0.587;
/// Luma weight for the blue channel.
const LUMA_B: f32 = 0.114;

/// Decode raw image bytes into an RGB raster.
///
/// Supports whatever the `image` crate was built with (PNG, JPEG, BMP,
/// WebP). Alpha is discarded.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<RasterImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(img.to_rgb8())
}

/// Check that `image` is at least `min_width × min_height` pixels.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidImage`] for zero dimensions or images
/// below the minimum.
pub fn validate(
    image: &RasterImage,
    min_width: u32,
    min_height: u32,
) -> Result<Dimensions, PipelineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(PipelineError::InvalidImage(format!(
            "image has zero dimensions ({}x{})",
            dimensions.width, dimensions.height,
        )));
    }
    if dimensions.width < min_width || dimensions.height < min_height {
        return Err(PipelineError::InvalidImage(format!(
            "image is {}x{}, below the {min_width}x{min_height} minimum",
            dimensions.width, dimensions.height,
        )));
    }
    Ok(dimensions)
}

/// Luma of a single RGB pixel, in `0.0..=255.0`.
#[must_use]
pub fn luma(pixel: image::Rgb<u8>) -> f32 {
    let [r, g, b] = pixel.0;
    LUMA_B.mul_add(
        f32::from(b),
        LUMA_R.mul_add(f32::from(r), LUMA_G * f32::from(g)),
    )
}

/// Single-channel floating-point intensity image.
///
/// Row-major, `width * height` samples in `0.0..=255.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaField {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl LumaField {
    /// Reduce an RGB raster to luma.
    #[must_use]
    pub fn from_rgb(image: &RasterImage) -> Self {
        let data = image.pixels().map(|p| luma(*p)).collect();
        Self {
            width: image.width(),
            height: image.height(),
            data,
        }
    }

    /// Wrap an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidImage`] if `data.len()` does not
    /// equal `width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<f32>) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(PipelineError::InvalidImage(format!(
                "luma buffer has {} samples, expected {expected}",
                data.len(),
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Copy into a single-channel float image for `imageproc` filters.
    pub(crate) fn to_image(&self) -> Image<Luma<f32>> {
        ImageBuffer::from_fn(self.width, self.height, |x, y| Luma([self.at(x, y)]))
    }

    /// Take over the samples of a single-channel float image.
    pub(crate) fn from_image(image: Image<Luma<f32>>) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Field width.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Field height.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Field dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    /// Sample at `(x, y)`; the caller guarantees the coordinate is in range.
    #[must_use]
    pub fn at(&self, x: u32, y: u32) -> f32 {
        self.data[y as usize * self.width as usize + x as usize]
    }

    /// One row of samples.
    #[must_use]
    pub fn row(&self, y: u32) -> &[f32] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.data[start..start + w]
    }

    /// All samples, row-major.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Convert back to an 8-bit gray raster (rounded, clamped).
    #[must_use]
    pub fn to_gray(&self) -> image::GrayImage {
        image::GrayImage::from_fn(self.width, self.height, |x, y| {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let v = self.at(x, y).round().clamp(0.0, 255.0) as u8;
            image::Luma([v])
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_rgba_png(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode(&[]);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes_to_rgb() {
        let img = image::RgbaImage::from_fn(17, 31, |_, _| image::Rgba([128, 64, 32, 255]));
        let rgb = decode(&encode_rgba_png(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (17, 31));
        assert_eq!(rgb.get_pixel(3, 3).0, [128, 64, 32]);
    }

    #[test]
    fn validate_rejects_zero_dimensions() {
        let img = RasterImage::new(0, 5);
        assert!(matches!(
            validate(&img, 1, 1),
            Err(PipelineError::InvalidImage(_))
        ));
    }

    #[test]
    fn validate_rejects_below_minimum() {
        let img = RasterImage::new(4, 40);
        assert!(matches!(
            validate(&img, 8, 8),
            Err(PipelineError::InvalidImage(_))
        ));
        let dims = validate(&img, 4, 4).unwrap();
        assert_eq!(dims.width, 4);
        assert_eq!(dims.height, 40);
    }

    #[test]
    fn luma_weights_green_highest() {
        let r = luma(image::Rgb([255, 0, 0]));
        let g = luma(image::Rgb([0, 255, 0]));
        let b = luma(image::Rgb([0, 0, 255]));
        assert!(g > r && r > b, "expected G > R > B, got R={r} G={g} B={b}");
        assert!((luma(image::Rgb([255, 255, 255])) - 255.0).abs() < 0.01);
    }

    #[test]
    fn image_conversion_keeps_row_major_order() {
        let field = LumaField::from_raw(3, 2, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let image = field.to_image();
        assert_eq!(image.get_pixel(2, 0).0, [3.0]);
        assert_eq!(image.get_pixel(0, 1).0, [4.0]);
        let back = LumaField::from_image(image);
        assert_eq!(back, field);
        assert_eq!(back.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    fn from_raw_rejects_wrong_length() {
        assert!(LumaField::from_raw(3, 3, vec![0.0; 8]).is_err());
    }

    #[test]
    fn to_gray_round_trips_integer_values() {
        let img = RasterImage::from_fn(4, 4, |x, _| image::Rgb([(x * 60) as u8; 3]));
        let gray = LumaField::from_rgb(&img).to_gray();
        for (x, _, p) in gray.enumerate_pixels() {
            assert_eq!(u32::from(p.0[0]), x * 60);
        }
    }
}
