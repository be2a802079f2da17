//! Gradient magnitude and quantized orientation.
//!
//! The orientation is `atan(gy / gx)` in degrees, shifted by 180° and
//! rounded to the nearest multiple of 45° (ties to even), then reduced
//! modulo 360. Because `atan` only spans ±90°, the values produced are
//! 90, 135, 180, 225 and 270; a gradient and its negation share a bin.
//!
//! Division by zero follows IEEE rules and is not special-cased:
//! `gx == 0, gy != 0` yields ±∞ and therefore 270° or 90°, while
//! `gx == gy == 0` yields NaN, which propagates to the orientation plane.

use crate::backend::Backend;
use crate::kernels::{DIRECTION_COUNT, DIRECTION_STEP_DEGREES};
use crate::plane::Plane;
use crate::types::PipelineError;

/// Magnitude and orientation planes of one gradient pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeOrientation {
    /// `sqrt(gx² + gy²)` per pixel.
    pub magnitude: Plane,
    /// Quantized orientation in degrees, or NaN.
    pub orientation: Plane,
}

/// Compute magnitude and quantized orientation from a gradient pair.
///
/// The magnitude is `sqrt(gx² + gy²)` evaluated in plain `f32`
/// arithmetic: squares may overflow to infinity and NaN propagates.
///
/// # Errors
///
/// Returns [`PipelineError::ShapeMismatch`] if the planes differ in size.
pub fn compute_magnitude_orientation(
    grad_x: &Plane,
    grad_y: &Plane,
    backend: Backend,
) -> Result<MagnitudeOrientation, PipelineError> {
    grad_x.ensure_same_shape(grad_y)?;
    let width = grad_x.width() as usize;

    let mut magnitude = Plane::zeros(grad_x.width(), grad_x.height());
    let mut orientation = Plane::zeros(grad_x.width(), grad_x.height());
    backend.for_each_row(magnitude.as_mut_slice(), width, |y, row| {
        let start = y * width;
        let gx = &grad_x.as_slice()[start..start + width];
        let gy = &grad_y.as_slice()[start..start + width];
        for ((out, &gx), &gy) in row.iter_mut().zip(gx).zip(gy) {
            *out = magnitude_of(gx, gy);
        }
    });
    backend.for_each_row(orientation.as_mut_slice(), width, |y, row| {
        let start = y * width;
        let gx = &grad_x.as_slice()[start..start + width];
        let gy = &grad_y.as_slice()[start..start + width];
        for ((out, &gx), &gy) in row.iter_mut().zip(gx).zip(gy) {
            *out = quantize_orientation(gx, gy);
        }
    });

    Ok(MagnitudeOrientation {
        magnitude,
        orientation,
    })
}

/// `sqrt(gx² + gy²)` without the rescaling `hypot` does.
#[must_use]
#[allow(clippy::imprecise_flops, clippy::suboptimal_flops)]
pub fn magnitude_of(gx: f32, gy: f32) -> f32 {
    (gx * gx + gy * gy).sqrt()
}

/// Quantized orientation of a single gradient sample, in degrees.
#[must_use]
pub fn quantize_orientation(gx: f32, gy: f32) -> f32 {
    let degrees = (gy / gx).atan().to_degrees() + 180.0;
    let snapped = (degrees / DIRECTION_STEP_DEGREES).round_ties_even() * DIRECTION_STEP_DEGREES;
    snapped.rem_euclid(360.0)
}

/// Direction index (`0..8`) of an orientation in degrees.
///
/// Returns `None` for NaN and for angles that are not a whole multiple
/// of 45°; such pixels belong to no direction.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
pub fn direction_index(degrees: f32) -> Option<usize> {
    let index = (degrees / DIRECTION_STEP_DEGREES).rem_euclid(DIRECTION_COUNT as f32);
    if index.fract() != 0.0 || index >= DIRECTION_COUNT as f32 {
        return None;
    }
    Some(index as usize)
}
