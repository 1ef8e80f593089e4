//! Intensity gradients (Sobel) with magnitude and direction.
//!
//! - Correlates the 3×3 Sobel pair with [`imageproc::filter::filter_clamped`],
//!   which pads by continuity, so border pixels never fail and the field has
//!   the same size as its input.
//! - Stores per-pixel `gx`, `gy`, `magnitude = sqrt(gx² + gy²)` and
//!   `direction = atan2(gy, gx)` folded into `[0, 2π)`.
//!
//! Image rows grow downward, so the direction points toward increasing
//! intensity in image coordinates.

use std::f32::consts::TAU;

use image::Luma;
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

use crate::raster::LumaField;
use crate::types::Dimensions;

/// Horizontal Sobel kernel at `f32` so no sample is clamped.
const SOBEL_X: Kernel<'static, f32> =
    Kernel::new(&[-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0], 3, 3);
/// Vertical Sobel kernel; positive where intensity grows downward.
const SOBEL_Y: Kernel<'static, f32> =
    Kernel::new(&[-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0], 3, 3);

/// Per-pixel gradient of a [`LumaField`].
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    width: u32,
    height: u32,
    gx: Vec<f32>,
    gy: Vec<f32>,
    magnitude: Vec<f32>,
    direction: Vec<f32>,
}

impl GradientField {
    /// Compute the Sobel gradient of `luma`.
    #[must_use]
    pub fn compute(luma: &LumaField) -> Self {
        let plane = luma.to_image();
        let gx: Image<Luma<f32>> = filter_clamped::<_, f32, f32>(&plane, SOBEL_X);
        let gy: Image<Luma<f32>> = filter_clamped::<_, f32, f32>(&plane, SOBEL_Y);
        let (magnitude, direction) = gx
            .iter()
            .zip(gy.iter())
            .map(|(&sx, &sy)| (sx.hypot(sy), fold_angle(sy.atan2(sx))))
            .unzip();

        Self {
            width: luma.width(),
            height: luma.height(),
            gx: gx.into_raw(),
            gy: gy.into_raw(),
            magnitude,
            direction,
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

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Horizontal derivative at `(x, y)`.
    #[must_use]
    pub fn gx(&self, x: u32, y: u32) -> f32 {
        self.gx[self.index(x, y)]
    }

    /// Vertical derivative at `(x, y)`.
    #[must_use]
    pub fn gy(&self, x: u32, y: u32) -> f32 {
        self.gy[self.index(x, y)]
    }

    /// Gradient magnitude at `(x, y)`, always `>= 0`.
    #[must_use]
    pub fn magnitude(&self, x: u32, y: u32) -> f32 {
        self.magnitude[self.index(x, y)]
    }

    /// Gradient direction at `(x, y)` in `[0, 2π)`.
    #[must_use]
    pub fn direction(&self, x: u32, y: u32) -> f32 {
        self.direction[self.index(x, y)]
    }

    /// Largest magnitude in the field (`0.0` for an empty or flat field).
    #[must_use]
    pub fn max_magnitude(&self) -> f32 {
        self.magnitude.iter().copied().fold(0.0, f32::max)
    }

    /// All magnitudes, row-major.
    #[must_use]
    pub fn magnitudes(&self) -> &[f32] {
        &self.magnitude
    }
}

/// Fold an `atan2` result from `(-π, π]` into `[0, 2π)`.
fn fold_angle(angle: f32) -> f32 {
    let folded = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if folded >= TAU { 0.0 } else { folded }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use super::*;

    fn field_from_fn(w: u32, h: u32, f: impl Fn(u32, u32) -> f32) -> LumaField {
        let data = (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).map(|(x, y)| f(x, y));
        LumaField::from_raw(w, h, data.collect()).unwrap()
    }

    #[test]
    fn flat_field_has_zero_gradient() {
        let grad = GradientField::compute(&field_from_fn(9, 7, |_, _| 128.0));
        assert_eq!(grad.dimensions().width, 9);
        assert_eq!(grad.dimensions().height, 7);
        assert!(grad.max_magnitude().abs() < f32::EPSILON);
    }

    #[test]
    fn vertical_step_points_toward_bright_side() {
        // Dark left, bright right: gradient points +x (direction 0).
        let grad = GradientField::compute(&field_from_fn(10, 5, |x, _| {
            if x < 5 { 0.0 } else { 255.0 }
        }));
        let d = grad.direction(4, 2);
        assert!(d.abs() < 1e-5 || (TAU - d).abs() < 1e-5, "got {d}");
        assert!((grad.magnitude(4, 2) - 1020.0).abs() < 1e-3);
        assert!(grad.gy(4, 2).abs() < 1e-5);
    }

    #[test]
    fn horizontal_step_direction() {
        // Bright top, dark bottom: gradient points up (-y), i.e. 3π/2.
        let grad = GradientField::compute(&field_from_fn(6, 10, |_, y| {
            if y < 5 { 255.0 } else { 0.0 }
        }));
        let d = grad.direction(3, 4);
        assert!((d - 3.0 * FRAC_PI_2).abs() < 1e-5, "got {d}");
    }

    #[test]
    fn border_pixels_use_replicated_samples() {
        // A ramp along x: clamped borders halve the central difference.
        let grad = GradientField::compute(&field_from_fn(5, 3, |x, _| x as f32 * 10.0));
        assert!((grad.gx(2, 1) - 80.0).abs() < 1e-4);
        assert!((grad.gx(0, 1) - 40.0).abs() < 1e-4);
        assert!((grad.gx(4, 0) - 40.0).abs() < 1e-4);
    }

    #[test]
    fn directions_are_in_range() {
        let grad = GradientField::compute(&field_from_fn(12, 12, |x, y| {
            ((x * 37 + y * 11) % 256) as f32
        }));
        for y in 0..12 {
            for x in 0..12 {
                let d = grad.direction(x, y);
                assert!((0.0..TAU).contains(&d), "direction {d} out of range");
            }
        }
    }

    #[test]
    fn fold_angle_wraps_negative() {
        assert!((fold_angle(-FRAC_PI_2) - 3.0 * FRAC_PI_2).abs() < 1e-6);
        assert!((fold_angle(PI) - PI).abs() < 1e-6);
        assert!(fold_angle(-1e-9).abs() < 1e-6 || fold_angle(-1e-9) < TAU);
    }
}
