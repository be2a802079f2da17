//! Non-maximum suppression along paired gradient directions.
//!
//! Each of the eight directional kernels is `+1` at the centre and `-1`
//! at one neighbour, so its response is positive exactly where the
//! magnitude exceeds that neighbour. A pixel is a local maximum along
//! direction `i` when the responses for `i` and its opposite `i + 4` are
//! both positive.
//!
//! Four passes cover all eight bins: pass `i` handles every pixel whose
//! orientation falls in bin `i` or `i + 4`. Pixels that belong to no
//! bin (NaN or off-grid orientation) are never visited and keep their
//! magnitude.

use crate::backend::Backend;
use crate::correlate::correlate;
use crate::kernels::{DIRECTION_COUNT, Kernel, opposite};
use crate::orientation::direction_index;
use crate::plane::Plane;
use crate::types::PipelineError;

/// Suppress every pixel that is not a maximum along its own direction.
///
/// Returns a new plane; `magnitude` is left untouched.
///
/// # Errors
///
/// Returns [`PipelineError::ShapeMismatch`] if `magnitude` and
/// `orientation` differ in size.
pub fn thin_edges(
    magnitude: &Plane,
    orientation: &Plane,
    directional: &[Kernel; DIRECTION_COUNT],
    backend: Backend,
) -> Result<Plane, PipelineError> {
    magnitude.ensure_same_shape(orientation)?;
    let width = magnitude.width() as usize;

    let responses = backend.map(directional, |kernel| correlate(magnitude, kernel, backend));

    let mut thin = magnitude.clone();
    for pos_i in 0..DIRECTION_COUNT / 2 {
        let neg_i = opposite(pos_i);
        let (pos, neg) = (&responses[pos_i], &responses[neg_i]);
        log::trace!("thinning pass: directions {pos_i} and {neg_i}");

        backend.for_each_row(thin.as_mut_slice(), width, |y, row| {
            let start = y * width;
            let theta = &orientation.as_slice()[start..start + width];
            let pos = &pos.as_slice()[start..start + width];
            let neg = &neg.as_slice()[start..start + width];
            for (x, out) in row.iter_mut().enumerate() {
                let is_oriented = matches!(
                    direction_index(theta[x]),
                    Some(d) if d == pos_i || d == neg_i
                );
                // NaN responses compare false and count as non-maximal.
                let is_max = pos[x] > 0.0 && neg[x] > 0.0;
                if is_oriented && !is_max {
                    *out = 0.0;
                }
            }
        });
    }

    Ok(thin)
}
