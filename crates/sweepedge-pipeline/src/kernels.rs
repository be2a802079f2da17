//! Constant correlation kernels consumed by the pipeline.
//!
//! [`KernelTable`] holds the Sobel pair, the eight directional thinning
//! kernels, and the hysteresis density kernel. The tables are built once
//! and never mutated.
//!
//! # Directional bank
//!
//! Kernel `i` points at `45° · i`, measured counter-clockwise on screen
//! (image rows grow downward, so 90° is the row above). Each kernel holds
//! `+1` at the centre and `-1` at the neighbour in its direction, so its
//! response is positive exactly where the centre exceeds that neighbour.
//! Kernels `i` and `(i + 4) % 8` point in opposite directions.

use serde::{Deserialize, Serialize};

use crate::types::PipelineError;

/// Number of discretized directions.
pub const DIRECTION_COUNT: usize = 8;

/// Angular step between directions, in degrees.
pub const DIRECTION_STEP_DEGREES: f32 = 45.0;

/// Weight of every cell of the hysteresis density kernel.
pub const DENSITY_WEIGHT: f32 = 1.25;

/// Neighbour offset `(dx, dy)` for each direction index.
pub const DIRECTION_OFFSETS: [(i32, i32); DIRECTION_COUNT] = [
    (1, 0),   // 0°: right
    (1, -1),  // 45°: up-right
    (0, -1),  // 90°: up
    (-1, -1), // 135°: up-left
    (-1, 0),  // 180°: left
    (-1, 1),  // 225°: down-left
    (0, 1),   // 270°: down
    (1, 1),   // 315°: down-right
];

/// A square correlation kernel with odd side length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "KernelRepr")]
pub struct Kernel {
    size: usize,
    weights: Vec<f32>,
}

#[derive(Deserialize)]
struct KernelRepr {
    size: usize,
    weights: Vec<f32>,
}

impl TryFrom<KernelRepr> for Kernel {
    type Error = PipelineError;

    fn try_from(repr: KernelRepr) -> Result<Self, Self::Error> {
        Self::new(repr.size, repr.weights)
    }
}

impl Kernel {
    /// Construct a kernel from row-major weights.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `size` is even or zero,
    /// or if `weights.len() != size * size`.
    pub fn new(size: usize, weights: Vec<f32>) -> Result<Self, PipelineError> {
        if size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "kernel size must be odd, got {size}"
            )));
        }
        if weights.len() != size * size {
            return Err(PipelineError::InvalidConfig(format!(
                "kernel of size {size} needs {} weights, got {}",
                size * size,
                weights.len()
            )));
        }
        Ok(Self { size, weights })
    }

    /// Construct a 3×3 kernel from rows.
    #[must_use]
    pub fn from_rows_3x3(rows: [[f32; 3]; 3]) -> Self {
        Self {
            size: 3,
            weights: rows.concat(),
        }
    }

    /// Side length.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Distance from the centre to an edge (`size / 2`).
    #[must_use]
    pub const fn radius(&self) -> usize {
        self.size / 2
    }

    /// Weight at `row`, `col`.
    ///
    /// # Panics
    ///
    /// If either index is `>= size`.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> f32 {
        assert!(row < self.size && col < self.size, "kernel index out of bounds");
        self.weights[row * self.size + col]
    }

    /// Row-major weights.
    #[must_use]
    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// The kernel mirrored across its main diagonal.
    #[must_use]
    pub fn transpose(&self) -> Self {
        let n = self.size;
        let weights = (0..n * n)
            .map(|i| self.weights[(i % n) * n + i / n])
            .collect();
        Self { size: n, weights }
    }
}

/// Sobel-style horizontal derivative kernel of side `size`.
///
/// Weight at offset `(x, y)` from the centre is `x / (x² + y²)`, with
/// the centre column fixed at zero. For `size == 3` this gives rows
/// `[-0.5, 0, 0.5]`, `[-1, 0, 1]`, `[-0.5, 0, 0.5]`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `size` is even or below 3.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap, clippy::cast_precision_loss)]
pub fn sobel_kernel(size: usize) -> Result<Kernel, PipelineError> {
    if size < 3 || size % 2 == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "sobel size must be odd and at least 3, got {size}"
        )));
    }
    let r = (size / 2) as i64;
    let mut weights = Vec::with_capacity(size * size);
    for y in -r..=r {
        for x in -r..=r {
            let weight = if x == 0 {
                0.0
            } else {
                let (xf, yf) = (x as f64, y as f64);
                xf / xf.mul_add(xf, yf * yf)
            };
            weights.push(weight as f32);
        }
    }
    Kernel::new(size, weights)
}

/// The 3×3 thinning kernel for direction index `direction`.
///
/// # Panics
///
/// If `direction >= DIRECTION_COUNT`.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn directional_kernel(direction: usize) -> Kernel {
    let (dx, dy) = DIRECTION_OFFSETS[direction];
    let mut rows = [[0.0_f32; 3]; 3];
    rows[1][1] = 1.0;
    rows[(1 + dy) as usize][(1 + dx) as usize] = -1.0;
    Kernel::from_rows_3x3(rows)
}

/// Index of the direction opposite to `direction`.
#[must_use]
pub const fn opposite(direction: usize) -> usize {
    (direction + DIRECTION_COUNT / 2) % DIRECTION_COUNT
}

/// All kernels the pipeline correlates with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelTable {
    sobel_x: Kernel,
    sobel_y: Kernel,
    directional: [Kernel; DIRECTION_COUNT],
    density: Kernel,
}

impl KernelTable {
    /// The standard table: 3×3 Sobel pair, the fixed directional bank,
    /// and the uniform 1.25 density kernel.
    #[must_use]
    pub fn standard() -> Self {
        let sobel_x = Kernel::from_rows_3x3([[-0.5, 0.0, 0.5], [-1.0, 0.0, 1.0], [-0.5, 0.0, 0.5]]);
        Self {
            sobel_y: sobel_x.transpose(),
            sobel_x,
            directional: std::array::from_fn(directional_kernel),
            density: Kernel::from_rows_3x3([[DENSITY_WEIGHT; 3]; 3]),
        }
    }

    /// The standard table with a generated Sobel pair of side `size`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `size` is even or
    /// below 3.
    pub fn with_sobel_size(size: usize) -> Result<Self, PipelineError> {
        let sobel_x = sobel_kernel(size)?;
        Ok(Self {
            sobel_y: sobel_x.transpose(),
            sobel_x,
            ..Self::standard()
        })
    }

    /// Assemble a table from caller-provided kernels.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] unless `directional` holds
    /// exactly [`DIRECTION_COUNT`] kernels.
    pub fn from_parts(
        sobel_x: Kernel,
        sobel_y: Kernel,
        directional: Vec<Kernel>,
        density: Kernel,
    ) -> Result<Self, PipelineError> {
        let count = directional.len();
        let directional: [Kernel; DIRECTION_COUNT] = directional.try_into().map_err(|_| {
            PipelineError::InvalidConfig(format!(
                "expected {DIRECTION_COUNT} directional kernels, got {count}"
            ))
        })?;
        Ok(Self {
            sobel_x,
            sobel_y,
            directional,
            density,
        })
    }

    /// Horizontal derivative kernel.
    #[must_use]
    pub const fn sobel_x(&self) -> &Kernel {
        &self.sobel_x
    }

    /// Vertical derivative kernel.
    #[must_use]
    pub const fn sobel_y(&self) -> &Kernel {
        &self.sobel_y
    }

    /// The eight directional thinning kernels, indexed by direction.
    #[must_use]
    pub const fn directional(&self) -> &[Kernel; DIRECTION_COUNT] {
        &self.directional
    }

    /// The hysteresis density kernel.
    #[must_use]
    pub const fn density(&self) -> &Kernel {
        &self.density
    }
}

impl Default for KernelTable {
    fn default() -> Self {
        Self::standard()
    }
}
