//! Shared types for the sweepedge Canny pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::plane::Plane;

/// Plane dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create a new dimensions value.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of samples in a plane of these dimensions.
    #[must_use]
    pub const fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Configuration for the Canny pipeline.
///
/// # Threshold rules
///
/// `low_threshold` alone produces a binary map. Both thresholds produce
/// the three-level classification (0, 0.5, 1), optionally followed by
/// density hysteresis. `high_threshold` without `low_threshold` is
/// rejected by [`validate`](Self::validate) with
/// [`PipelineError::InvalidConfig`]. `low_threshold >= high_threshold`
/// is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Lower classification threshold. `None` passes the thinned
    /// magnitude through unchanged.
    pub low_threshold: Option<f32>,

    /// Upper classification threshold. Requires `low_threshold`.
    pub high_threshold: Option<f32>,

    /// Promote weak pixels with a single density correlation pass.
    /// Only meaningful when both thresholds are set.
    pub hysteresis: bool,

    /// Side length of the generated Sobel kernels. Must be odd and >= 3.
    pub sobel_size: usize,

    /// Where per-pixel work runs.
    pub backend: Backend,
}

impl PipelineConfig {
    /// Default lower threshold (disabled).
    pub const DEFAULT_LOW_THRESHOLD: Option<f32> = None;
    /// Default upper threshold (disabled).
    pub const DEFAULT_HIGH_THRESHOLD: Option<f32> = None;
    /// Default hysteresis flag.
    pub const DEFAULT_HYSTERESIS: bool = false;
    /// Default Sobel kernel side length.
    pub const DEFAULT_SOBEL_SIZE: usize = 3;
    /// Default execution backend.
    pub const DEFAULT_BACKEND: Backend = Backend::Parallel;

    /// Check the structural preconditions of the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] when `high_threshold` is
    /// set without `low_threshold`, or when `sobel_size` is even or
    /// smaller than 3.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.low_threshold.is_none() && self.high_threshold.is_some() {
            return Err(PipelineError::InvalidConfig(
                "high_threshold requires low_threshold".to_string(),
            ));
        }
        if self.sobel_size < 3 || self.sobel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "sobel_size must be odd and at least 3, got {}",
                self.sobel_size
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            low_threshold: Self::DEFAULT_LOW_THRESHOLD,
            high_threshold: Self::DEFAULT_HIGH_THRESHOLD,
            hysteresis: Self::DEFAULT_HYSTERESIS,
            sobel_size: Self::DEFAULT_SOBEL_SIZE,
            backend: Self::DEFAULT_BACKEND,
        }
    }
}

/// Where the gradient pair of a run comes from.
///
/// `Supplied` planes (e.g. read back from a hardware accelerator) are
/// used as-is: they skip Sobel correlation and channel averaging, and
/// must match the input image dimensions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum GradientSource {
    /// Correlate the input channels with the Sobel kernels.
    #[default]
    Computed,
    /// Use an externally computed gradient pair.
    Supplied {
        /// Horizontal gradient plane.
        grad_x: Plane,
        /// Vertical gradient plane.
        grad_y: Plane,
    },
}

impl GradientSource {
    /// The variant tag without the payload.
    #[must_use]
    pub const fn kind(&self) -> GradientSourceKind {
        match self {
            Self::Computed => GradientSourceKind::Computed,
            Self::Supplied { .. } => GradientSourceKind::Supplied,
        }
    }
}

/// Payload-free tag of a [`GradientSource`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradientSourceKind {
    /// Gradients came from Sobel correlation.
    Computed,
    /// Gradients were supplied by the caller.
    Supplied,
}

impl fmt::Display for GradientSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computed => f.write_str("computed"),
            Self::Supplied => f.write_str("supplied"),
        }
    }
}

/// Every plane produced by one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannyOutput {
    /// Horizontal gradient (channel average, or the supplied plane).
    pub grad_x: Plane,
    /// Vertical gradient (channel average, or the supplied plane).
    pub grad_y: Plane,
    /// Euclidean gradient magnitude.
    pub magnitude: Plane,
    /// Quantized orientation in degrees (multiples of 45, NaN where the
    /// gradient is zero in both directions).
    pub orientation: Plane,
    /// Magnitude after directional non-maximum suppression.
    pub thin: Plane,
    /// Final edge map (thin plane, binary map, or classification,
    /// depending on the thresholds).
    pub edges: Plane,
    /// Shared dimensions of all planes.
    pub dimensions: Dimensions,
}

/// Errors that can occur during pipeline processing.
///
/// Numeric special values (NaN, infinity) are never errors; only
/// structural preconditions fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Two planes that must share dimensions do not.
    #[error("plane shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Dimensions established by the first plane.
        expected: Dimensions,
        /// Dimensions of the offending plane.
        found: Dimensions,
    },

    /// A sample buffer does not hold `width * height` values.
    #[error("plane buffer holds {actual} samples, expected {expected}")]
    BufferLength {
        /// `width * height`.
        expected: usize,
        /// Length of the provided buffer.
        actual: usize,
    },

    /// Pipeline configuration or kernel table is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// An image was built from zero channel planes.
    #[error("input image has no channels")]
    EmptyInput,
}

impl PipelineError {
    /// Shape mismatch between `expected` and `found`.
    #[must_use]
    pub const fn shape_mismatch(expected: Dimensions, found: Dimensions) -> Self {
        Self::ShapeMismatch { expected, found }
    }
}

/// Serde-compatible proxy for `PipelineError`.
///
/// Kept separate from the public enum so the wire format stays stable
/// when display messages change.
#[derive(Serialize, Deserialize)]
enum PipelineErrorProxy {
    ShapeMismatch {
        expected: Dimensions,
        found: Dimensions,
    },
    BufferLength {
        expected: usize,
        actual: usize,
    },
    InvalidConfig(String),
    EmptyInput,
}

impl Serialize for PipelineError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::ShapeMismatch { expected, found } => PipelineErrorProxy::ShapeMismatch {
                expected: *expected,
                found: *found,
            },
            Self::BufferLength { expected, actual } => PipelineErrorProxy::BufferLength {
                expected: *expected,
                actual: *actual,
            },
            Self::InvalidConfig(s) => PipelineErrorProxy::InvalidConfig(s.clone()),
            Self::EmptyInput => PipelineErrorProxy::EmptyInput,
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PipelineError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = PipelineErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            PipelineErrorProxy::ShapeMismatch { expected, found } => {
                Self::ShapeMismatch { expected, found }
            }
            PipelineErrorProxy::BufferLength { expected, actual } => {
                Self::BufferLength { expected, actual }
            }
            PipelineErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            PipelineErrorProxy::EmptyInput => Self::EmptyInput,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_display_and_count() {
        let d = Dimensions::new(7, 3);
        assert_eq!(d.to_string(), "7x3");
        assert_eq!(d.pixel_count(), 21);
    }

    // --- PipelineConfig tests ---

    #[test]
    fn default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.low_threshold, None);
        assert_eq!(config.high_threshold, None);
        assert!(!config.hysteresis);
        assert_eq!(config.sobel_size, 3);
        assert_eq!(config.backend, Backend::Parallel);
    }

    #[test]
    fn high_without_low_is_rejected() {
        let config = PipelineConfig {
            high_threshold: Some(0.7),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn low_above_high_is_accepted() {
        let config = PipelineConfig {
            low_threshold: Some(0.9),
            high_threshold: Some(0.1),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn even_sobel_size_is_rejected() {
        for sobel_size in [0, 1, 2, 4] {
            let config = PipelineConfig {
                sobel_size,
                ..PipelineConfig::default()
            };
            assert!(
                config.validate().is_err(),
                "sobel_size {sobel_size} should be rejected"
            );
        }
    }

    #[test]
    fn config_serde_round_trip() {
        let config = PipelineConfig {
            low_threshold: Some(0.3),
            high_threshold: Some(0.7),
            hysteresis: true,
            sobel_size: 5,
            backend: Backend::Sequential,
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn config_missing_fields_use_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"low_threshold": 0.2}"#).unwrap();
        assert_eq!(config.low_threshold, Some(0.2));
        assert_eq!(config.sobel_size, PipelineConfig::DEFAULT_SOBEL_SIZE);
        assert_eq!(config.backend, PipelineConfig::DEFAULT_BACKEND);
    }

    // --- GradientSource tests ---

    #[test]
    fn gradient_source_kind() {
        assert_eq!(GradientSource::Computed.kind(), GradientSourceKind::Computed);
        let supplied = GradientSource::Supplied {
            grad_x: Plane::zeros(2, 2),
            grad_y: Plane::zeros(2, 2),
        };
        assert_eq!(supplied.kind(), GradientSourceKind::Supplied);
        assert_eq!(GradientSourceKind::Supplied.to_string(), "supplied");
    }

    // --- PipelineError tests ---

    #[test]
    fn error_display_shape_mismatch() {
        let err = PipelineError::shape_mismatch(Dimensions::new(4, 4), Dimensions::new(5, 4));
        assert_eq!(
            err.to_string(),
            "plane shape mismatch: expected 4x4, found 5x4"
        );
    }

    #[test]
    fn error_serde_round_trip() {
        let errors = [
            PipelineError::shape_mismatch(Dimensions::new(1, 2), Dimensions::new(3, 4)),
            PipelineError::BufferLength {
                expected: 6,
                actual: 5,
            },
            PipelineError::InvalidConfig("bad".to_string()),
            PipelineError::EmptyInput,
        ];
        for err in errors {
            let json = serde_json::to_string(&err).unwrap();
            let back: PipelineError = serde_json::from_str(&json).unwrap();
            assert_eq!(err, back);
        }
    }
}
