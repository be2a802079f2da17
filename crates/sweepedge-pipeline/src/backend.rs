//! Execution backend: where the per-pixel work of each stage runs.
//!
//! Every stage takes a [`Backend`] argument instead of reading a
//! process-wide device setting. [`Backend::Parallel`] spreads rows (and
//! independent planes) over the `rayon` global thread pool;
//! [`Backend::Sequential`] runs on the calling thread. Both evaluate the
//! same scalar expression per sample, so their outputs are identical.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Selects how data-parallel loops are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Backend {
    /// Run every loop on the calling thread.
    Sequential,
    /// Run rows and independent planes on the `rayon` thread pool.
    #[default]
    Parallel,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

impl Backend {
    /// Call `f(y, row)` for every row of a row-major buffer.
    ///
    /// `width == 0` is a no-op (there are no rows to visit).
    pub(crate) fn for_each_row<F>(self, data: &mut [f32], width: usize, f: F)
    where
        F: Fn(usize, &mut [f32]) + Send + Sync,
    {
        if width == 0 {
            return;
        }
        match self {
            Self::Sequential => data
                .chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| f(y, row)),
            Self::Parallel => data
                .par_chunks_mut(width)
                .enumerate()
                .for_each(|(y, row)| f(y, row)),
        }
    }

    /// Map `f` over independent items, preserving order.
    pub(crate) fn map<T, R, F>(self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Send + Sync,
    {
        match self {
            Self::Sequential => items.iter().map(f).collect(),
            Self::Parallel => items.par_iter().map(f).collect(),
        }
    }

    /// Fallible [`map`](Self::map): stops at (one of) the first errors.
    pub(crate) fn try_map<T, R, E, F>(self, items: &[T], f: F) -> Result<Vec<R>, E>
    where
        T: Sync,
        R: Send,
        E: Send,
        F: Fn(&T) -> Result<R, E> + Send + Sync,
    {
        match self {
            Self::Sequential => items.iter().map(f).collect(),
            Self::Parallel => items.par_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_parallel() {
        assert_eq!(Backend::default(), Backend::Parallel);
    }

    #[test]
    fn for_each_row_visits_rows_in_order() {
        for backend in [Backend::Sequential, Backend::Parallel] {
            let mut data = vec![0.0_f32; 12];
            #[allow(clippy::cast_precision_loss)]
            backend.for_each_row(&mut data, 4, |y, row| {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = (y * 10 + x) as f32;
                }
            });
            assert_eq!(
                data,
                vec![0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0, 20.0, 21.0, 22.0, 23.0]
            );
        }
    }

    #[test]
    fn for_each_row_zero_width_is_noop() {
        let mut data: Vec<f32> = Vec::new();
        Backend::Parallel.for_each_row(&mut data, 0, |_, _| unreachable!());
        assert!(data.is_empty());
    }

    #[test]
    fn map_preserves_order() {
        let items = [1, 2, 3, 4, 5];
        for backend in [Backend::Sequential, Backend::Parallel] {
            assert_eq!(backend.map(&items, |v| v * 2), vec![2, 4, 6, 8, 10]);
        }
    }

    #[test]
    fn try_map_propagates_error() {
        let items = [1, 2, 3];
        let result: Result<Vec<i32>, String> = Backend::Sequential.try_map(&items, |&v| {
            if v == 2 {
                Err("two".to_string())
            } else {
                Ok(v)
            }
        });
        assert_eq!(result, Err("two".to_string()));
    }
}
