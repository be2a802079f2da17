//! Zero-padded "same" 2D correlation.
//!
//! Output sample `(x, y)` is `Σ k[r][c] · in[y + r - R][x + c - R]` with
//! `R` the kernel radius and out-of-range input samples treated as zero.
//! The kernel is not flipped (correlation, not convolution).

use crate::backend::Backend;
use crate::kernels::Kernel;
use crate::plane::Plane;

/// Correlate `plane` with `kernel`, producing a plane of the same size.
#[must_use = "returns the correlated plane"]
pub fn correlate(plane: &Plane, kernel: &Kernel, backend: Backend) -> Plane {
    let width = plane.width() as usize;
    let mut out = Plane::zeros(plane.width(), plane.height());
    backend.for_each_row(out.as_mut_slice(), width, |y, row| {
        for (x, sample) in row.iter_mut().enumerate() {
            *sample = correlate_at(plane, kernel, x, y);
        }
    });
    out
}

/// Correlation result at a single output position.
#[allow(clippy::cast_possible_wrap)]
fn correlate_at(plane: &Plane, kernel: &Kernel, x: usize, y: usize) -> f32 {
    let size = kernel.size();
    let radius = kernel.radius() as i64;
    let (x, y) = (x as i64, y as i64);
    let mut acc = 0.0_f32;
    for (i, &weight) in kernel.weights().iter().enumerate() {
        let dy = (i / size) as i64 - radius;
        let dx = (i % size) as i64 - radius;
        if let Some(v) = plane.get_signed(x + dx, y + dy) {
            acc += weight * v;
        }
    }
    acc
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::kernels::KernelTable;

    fn identity() -> Kernel {
        Kernel::from_rows_3x3([[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.0]])
    }

    #[test]
    fn identity_kernel_is_identity() {
        let p = Plane::from_fn(5, 4, |x, y| f32::from(u8::try_from(x * 3 + y).unwrap()));
        assert_eq!(correlate(&p, &identity(), Backend::Sequential), p);
    }

    #[test]
    fn output_same_size() {
        let p = Plane::zeros(17, 31);
        let out = correlate(&p, KernelTable::standard().sobel_x(), Backend::Parallel);
        assert_eq!(out.dimensions(), p.dimensions());
    }

    #[test]
    fn kernel_is_not_flipped() {
        // Picks the sample to the right of each position.
        let right = Kernel::from_rows_3x3([[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0, 0.0]]);
        let p = Plane::from_vec(3, 1, vec![1.0, 2.0, 3.0]).unwrap();
        let out = correlate(&p, &right, Backend::Sequential);
        assert_eq!(out.as_slice(), &[2.0, 3.0, 0.0]);
    }

    #[test]
    fn border_is_zero_padded() {
        let ones = Kernel::from_rows_3x3([[1.0; 3]; 3]);
        let p = Plane::filled(3, 3, 1.0);
        let out = correlate(&p, &ones, Backend::Sequential);
        assert_eq!(
            out.as_slice(),
            &[4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]
        );
    }

    #[test]
    fn backends_agree() {
        let p = Plane::from_fn(23, 11, |x, y| ((x * 7 + y * 13) % 17) as f32 * 0.37);
        let k = KernelTable::with_sobel_size(5).unwrap();
        let seq = correlate(&p, k.sobel_y(), Backend::Sequential);
        let par = correlate(&p, k.sobel_y(), Backend::Parallel);
        assert_eq!(seq, par);
    }

    #[test]
    fn empty_plane() {
        let p = Plane::zeros(0, 0);
        let out = correlate(&p, &identity(), Backend::Parallel);
        assert_eq!(out.dimensions(), p.dimensions());
    }
}
