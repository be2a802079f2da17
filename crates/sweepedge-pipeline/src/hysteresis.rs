//! Dual-threshold classification with single-pass density hysteresis.
//!
//! | `low` | `high` | output                                   |
//! |-------|--------|------------------------------------------|
//! | none  | none   | thinned plane unchanged                  |
//! | set   | none   | `1` where `t > low`, else `0`            |
//! | set   | set    | `0.5·[t > low] + 0.5·[t > high]`         |
//! | none  | set    | [`PipelineError::InvalidConfig`]         |
//!
//! With both thresholds and hysteresis enabled, the class plane is
//! correlated once with the density kernel. A weak pixel (class 0.5)
//! whose density exceeds 1 becomes an edge; strong pixels are edges;
//! everything else is 0. There is no iteration, so promotion never
//! travels further than one neighbourhood.

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::correlate::correlate;
use crate::kernels::Kernel;
use crate::plane::Plane;
use crate::types::PipelineError;

/// Density a weak pixel must exceed to be promoted.
pub const PROMOTION_THRESHOLD: f32 = 1.0;

/// Class value of a pixel between the thresholds.
pub const WEAK: f32 = 0.5;

/// Which branch of the classification table a run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassificationMode {
    /// No thresholds: thinned magnitude passed through.
    Passthrough,
    /// Low threshold only.
    Binary,
    /// Both thresholds, three-level output.
    DualThreshold,
    /// Both thresholds plus density promotion, binary output.
    Hysteresis,
}

impl ClassificationMode {
    /// Select the mode for a threshold combination.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `high` is set
    /// without `low`.
    pub fn select(
        low: Option<f32>,
        high: Option<f32>,
        hysteresis: bool,
    ) -> Result<Self, PipelineError> {
        match (low, high) {
            (None, None) => Ok(Self::Passthrough),
            (None, Some(_)) => Err(PipelineError::InvalidConfig(
                "high_threshold requires low_threshold".to_string(),
            )),
            (Some(_), None) => Ok(Self::Binary),
            (Some(_), Some(_)) if hysteresis => Ok(Self::Hysteresis),
            (Some(_), Some(_)) => Ok(Self::DualThreshold),
        }
    }
}

/// Edge plane plus the pixel counts of one classification.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationOutcome {
    /// The final edge plane.
    pub edges: Plane,
    /// Branch taken.
    pub mode: ClassificationMode,
    /// Pixels classified weak (0 outside the three-level modes).
    pub weak: u64,
    /// Pixels above the high threshold (0 without one).
    pub strong: u64,
    /// Weak pixels that became edges through density promotion.
    pub promoted: u64,
}

/// Classify a thinned plane. See the module docs for the table.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `high` is set without
/// `low`.
pub fn classify(
    thin: &Plane,
    low: Option<f32>,
    high: Option<f32>,
    hysteresis: bool,
    density: &Kernel,
    backend: Backend,
) -> Result<Plane, PipelineError> {
    classify_detailed(thin, low, high, hysteresis, density, backend).map(|o| o.edges)
}

/// [`classify`], also reporting the mode and pixel counts.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `high` is set without
/// `low`.
pub fn classify_detailed(
    thin: &Plane,
    low: Option<f32>,
    high: Option<f32>,
    hysteresis: bool,
    density: &Kernel,
    backend: Backend,
) -> Result<ClassificationOutcome, PipelineError> {
    let mode = ClassificationMode::select(low, high, hysteresis)?;
    let (low, high) = match (low, high) {
        (None, _) => {
            return Ok(ClassificationOutcome {
                edges: thin.clone(),
                mode,
                weak: 0,
                strong: 0,
                promoted: 0,
            });
        }
        (Some(low), None) => {
            return Ok(ClassificationOutcome {
                edges: thin.map(|t| indicator(t > low)),
                mode,
                weak: 0,
                strong: 0,
                promoted: 0,
            });
        }
        (Some(low), Some(high)) => (low, high),
    };

    let classes = thin.map(|t| WEAK * indicator(t > low) + WEAK * indicator(t > high));
    let weak = classes.count(is_weak);
    let strong = thin.count(|t| t > high);

    if mode == ClassificationMode::DualThreshold {
        return Ok(ClassificationOutcome {
            edges: classes,
            mode,
            weak,
            strong,
            promoted: 0,
        });
    }

    let neighbourhood = correlate(&classes, density, backend);
    let promoted_mask = classes.zip_map(&neighbourhood, |class, d| {
        indicator(is_weak(class) && d > PROMOTION_THRESHOLD)
    })?;
    let edges = thin.zip_map(&promoted_mask, |t, promoted| {
        indicator(t > high || promoted > 0.0)
    })?;
    let promoted = thin
        .zip_map(&promoted_mask, |t, p| indicator(p > 0.0 && t <= high))?
        .count(|v| v > 0.0);

    log::debug!("hysteresis: {weak} weak, {strong} strong, {promoted} promoted");

    Ok(ClassificationOutcome {
        edges,
        mode,
        weak,
        strong,
        promoted,
    })
}

#[allow(clippy::float_cmp)]
fn is_weak(class: f32) -> bool {
    class == WEAK
}

const fn indicator(condition: bool) -> f32 {
    if condition { 1.0 } else { 0.0 }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp, clippy::cast_precision_loss)]
mod tests {
    use super::*;
    use crate::kernels::KernelTable;

    fn row(values: &[f32]) -> Plane {
        Plane::from_vec(u32::try_from(values.len()).unwrap(), 1, values.to_vec()).unwrap()
    }

    fn run(thin: &Plane, low: Option<f32>, high: Option<f32>, hysteresis: bool) -> Plane {
        classify(
            thin,
            low,
            high,
            hysteresis,
            KernelTable::standard().density(),
            Backend::Sequential,
        )
        .unwrap()
    }

    fn hysteresis(thin: &Plane) -> Plane {
        run(thin, Some(0.3), Some(0.7), true)
    }

    #[test]
    fn three_level_classification() {
        let out = run(&row(&[0.1, 0.5, 0.9]), Some(0.3), Some(0.7), false);
        assert_eq!(out.as_slice(), &[0.0, 0.5, 1.0]);
    }

    #[test]
    fn thresholds_are_strict() {
        let out = run(&row(&[0.3, 0.7]), Some(0.3), Some(0.7), false);
        assert_eq!(out.as_slice(), &[0.0, 0.5]);
    }

    #[test]
    fn no_thresholds_passes_through() {
        let thin = row(&[0.0, 3.5, f32::INFINITY]);
        assert_eq!(run(&thin, None, None, true), thin);
    }

    #[test]
    fn low_only_is_binary() {
        let out = run(&row(&[0.1, 0.5, 0.9, f32::NAN]), Some(0.3), None, true);
        assert_eq!(out.as_slice(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn high_without_low_is_rejected() {
        let result = classify(
            &row(&[1.0]),
            None,
            Some(0.5),
            false,
            KernelTable::standard().density(),
            Backend::Sequential,
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn weak_next_to_strong_is_promoted() {
        // Density at the weak pixel: 1.25 * (1 + 0.5) = 1.875.
        let out = hysteresis(&row(&[0.0, 0.9, 0.5, 0.0, 0.0]));
        assert_eq!(out.as_slice(), &[0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn isolated_weak_is_dropped() {
        // Density 1.25 * 0.5 = 0.625.
        let out = hysteresis(&row(&[0.0, 0.0, 0.5, 0.0, 0.0]));
        assert!(out.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn weak_pair_promotes_without_strong_seed() {
        // Each weak pixel sees 1.25 * (0.5 + 0.5) = 1.25.
        let out = hysteresis(&row(&[0.0, 0.5, 0.5, 0.0, 0.0]));
        assert_eq!(out.as_slice(), &[0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn promotion_does_not_reach_past_one_neighbourhood() {
        // The weak pixel two steps from the strong one sees only zeros
        // and the suppressed gap.
        let out = hysteresis(&row(&[0.9, 0.0, 0.5, 0.0]));
        assert_eq!(out.as_slice(), &[1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn output_is_binary() {
        let thin = Plane::from_fn(11, 9, |x, y| ((x * 7 + y * 5) % 10) as f32 / 10.0);
        let out = hysteresis(&thin);
        assert!(out.as_slice().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn hysteresis_is_idempotent() {
        let thin = Plane::from_fn(11, 9, |x, y| ((x * 7 + y * 5) % 10) as f32 / 10.0);
        let once = hysteresis(&thin);
        assert_eq!(hysteresis(&once), once);
    }

    #[test]
    fn classify_is_deterministic() {
        let thin = Plane::from_fn(12, 10, |x, y| ((x * 5 + y * 3) % 11) as f32 / 11.0);
        let before = thin.clone();
        for (low, high, hyst) in [
            (Some(0.3), Some(0.7), true),
            (Some(0.3), Some(0.7), false),
            (None, Some(0.5), false),
            (None, None, false),
        ] {
            let first = run(&thin, low, high, hyst);
            let second = run(&thin, low, high, hyst);
            assert_eq!(first, second);
        }
        assert_eq!(thin, before);
    }

    #[test]
    fn raising_high_never_adds_edges() {
        let thin = Plane::from_fn(13, 11, |x, y| ((x * 3 + y * 11) % 17) as f32 / 17.0);
        let lower = run(&thin, Some(0.2), Some(0.5), true);
        let higher = run(&thin, Some(0.2), Some(0.8), true);
        for (&h, &l) in higher.as_slice().iter().zip(lower.as_slice()) {
            assert!(h <= l);
        }
    }

    #[test]
    fn equal_thresholds_have_no_weak_band() {
        let thin = Plane::from_fn(8, 8, |x, y| ((x + y * 3) % 9) as f32 / 9.0);
        let out = run(&thin, Some(0.5), Some(0.5), false);
        assert!(out.as_slice().iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn inverted_thresholds_stay_binary_under_hysteresis() {
        // low > high: 0.5 exceeds high but not low, class 0.5, still strong.
        let out = run(&row(&[0.5, 0.9, 0.1]), Some(0.7), Some(0.3), true);
        assert_eq!(out.as_slice(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn outcome_counts() {
        let outcome = classify_detailed(
            &row(&[0.0, 0.9, 0.5, 0.0, 0.5, 0.0, 0.0]),
            Some(0.3),
            Some(0.7),
            true,
            KernelTable::standard().density(),
            Backend::Parallel,
        )
        .unwrap();
        assert_eq!(outcome.mode, ClassificationMode::Hysteresis);
        assert_eq!(outcome.weak, 2);
        assert_eq!(outcome.strong, 1);
        assert_eq!(outcome.promoted, 1);
        assert_eq!(outcome.edges.count(|v| v > 0.0), 2);
    }

    #[test]
    fn mode_selection() {
        assert_eq!(
            ClassificationMode::select(None, None, true).unwrap(),
            ClassificationMode::Passthrough
        );
        assert_eq!(
            ClassificationMode::select(Some(1.0), None, true).unwrap(),
            ClassificationMode::Binary
        );
        assert_eq!(
            ClassificationMode::select(Some(1.0), Some(2.0), false).unwrap(),
            ClassificationMode::DualThreshold
        );
        assert_eq!(
            ClassificationMode::select(Some(1.0), Some(2.0), true).unwrap(),
            ClassificationMode::Hysteresis
        );
    }
}
