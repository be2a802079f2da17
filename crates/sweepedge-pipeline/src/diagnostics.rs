//! Pipeline diagnostics: timing and pixel counts for each stage.
//!
//! [`process_with_diagnostics`] drives a [`Pending`] pipeline to
//! completion and records how long each stage took together with the
//! stage's [`StageMetrics`].
//!
//! Timestamps come from a caller-supplied [`Clock`]. [`WebClock`] uses
//! the `web-time` crate (`performance.now()` on WASM,
//! `std::time::Instant` on native). Durations are serialized as
//! fractional seconds for JSON compatibility.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::hysteresis::ClassificationMode;
use crate::observer::{StageEvent, StageObserver};
use crate::pipeline::{Pending, PipelineStage};
use crate::types::{CannyOutput, GradientSourceKind, PipelineError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> web_time::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &web_time::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: gradient resolution.
    pub gradients: StageDiagnostics,
    /// Stage 2: magnitude and orientation.
    pub magnitude_orientation: StageDiagnostics,
    /// Stage 3: non-maximum suppression.
    pub thinning: StageDiagnostics,
    /// Stage 4: threshold classification and hysteresis.
    pub classification: StageDiagnostics,
    /// Total wall-clock duration of the run (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary counts across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: StageMetrics,
}

/// Stage-specific metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Gradient stage metrics.
    Gradients {
        /// Whether the pair was computed or supplied.
        source: GradientSourceKind,
        /// Number of input channels.
        channels: usize,
        /// Side length of the Sobel kernels.
        sobel_size: usize,
        /// Plane width in pixels.
        width: u32,
        /// Plane height in pixels.
        height: u32,
    },
    /// Magnitude/orientation metrics.
    MagnitudeOrientation {
        /// Largest finite magnitude (0 if none).
        max_magnitude: f32,
        /// Mean of the finite magnitudes.
        mean_magnitude: f64,
        /// Pixels whose orientation is NaN (zero gradient).
        undefined_orientations: u64,
    },
    /// Thinning metrics.
    Thinning {
        /// Nonzero magnitude pixels set to 0.
        suppressed: u64,
        /// Nonzero pixels in the thin plane.
        retained: u64,
    },
    /// Classification metrics.
    Classification {
        /// Branch taken.
        mode: ClassificationMode,
        /// Pixels between the thresholds.
        weak: u64,
        /// Pixels above the high threshold.
        strong: u64,
        /// Weak pixels promoted by hysteresis.
        promoted: u64,
        /// Pixels with a positive value in the final map.
        edge_pixels: u64,
    },
}

/// High-level summary counts for the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Plane width in pixels.
    pub image_width: u32,
    /// Plane height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Pixels with a positive value in the final map.
    pub edge_pixel_count: u64,
}

impl PipelineDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width, self.summary.image_height, self.summary.pixel_count,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Gradients", &self.gradients),
            ("Magnitude/Orientation", &self.magnitude_orientation),
            ("Thinning", &self.thinning),
            ("Classification", &self.classification),
        ];
        for (name, diag) in stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        #[allow(clippy::cast_precision_loss)]
        let density = if self.summary.pixel_count > 0 {
            self.summary.edge_pixel_count as f64 / self.summary.pixel_count as f64 * 100.0
        } else {
            0.0
        };
        lines.push(format!(
            "Edge pixels: {} ({density:.1}%)",
            self.summary.edge_pixel_count,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Gradients {
            source,
            channels,
            sobel_size,
            width,
            height,
        } => format!("{source} {width}x{height}, {channels} ch, sobel {sobel_size}"),
        StageMetrics::MagnitudeOrientation {
            max_magnitude,
            mean_magnitude,
            undefined_orientations,
        } => format!(
            "max={max_magnitude:.3} mean={mean_magnitude:.3} undefined={undefined_orientations}"
        ),
        StageMetrics::Thinning {
            suppressed,
            retained,
        } => format!("suppressed={suppressed} retained={retained}"),
        StageMetrics::Classification {
            mode,
            weak,
            strong,
            promoted,
            edge_pixels,
        } => format!(
            "{mode:?} weak={weak} strong={strong} promoted={promoted} edges={edge_pixels}"
        ),
    }
}

/// Forwards events to `inner` and accumulates the time it spends in them.
struct TimedObserver<'a, C: Clock> {
    clock: &'a C,
    inner: &'a mut dyn StageObserver,
    spent: Duration,
}

impl<C: Clock> StageObserver for TimedObserver<'_, C> {
    fn observe(&mut self, event: StageEvent<'_>) {
        let start = self.clock.now();
        self.inner.observe(event);
        self.spent += self.clock.elapsed(&start);
    }
}

/// Time one stage transition.
fn timed<C: Clock, S: PipelineStage>(
    clock: &C,
    advance: impl FnOnce() -> Result<S, PipelineError>,
    metrics: impl Fn(&S) -> StageMetrics,
) -> Result<(S, StageDiagnostics), PipelineError> {
    let start = clock.now();
    let stage = advance()?;
    let duration = clock.elapsed(&start);
    let diagnostics = StageDiagnostics {
        duration,
        metrics: metrics(&stage),
    };
    Ok((stage, diagnostics))
}

/// Run `pending` to completion, timing each stage.
///
/// Every intermediate is reported to `observer` in pipeline order. Time
/// spent inside `observer` is excluded from the stage and total durations.
///
/// # Errors
///
/// Returns any [`PipelineError`] raised by a stage.
pub fn process_with_diagnostics<C: Clock>(
    pending: Pending,
    clock: &C,
    observer: &mut dyn StageObserver,
) -> Result<(CannyOutput, PipelineDiagnostics), PipelineError> {
    let mut observer = TimedObserver {
        clock,
        inner: observer,
        spent: Duration::ZERO,
    };
    let start = clock.now();

    let (gradients, mut gradients_diag) = timed(
        clock,
        || pending.gradients_observed(&mut observer),
        |s| s.stage_metrics(),
    )?;
    // Per-channel events fire inside the gradients stage.
    gradients_diag.duration = gradients_diag.duration.saturating_sub(observer.spent);
    let (oriented, oriented_diag) = timed(clock, || gradients.orient(), |s| s.stage_metrics())?;
    oriented.emit(&mut observer);
    let (thinned, thinned_diag) = timed(clock, || oriented.thin(), |s| s.stage_metrics())?;
    thinned.emit(&mut observer);
    let (classified, classified_diag) =
        timed(clock, || thinned.classify(), |s| s.stage_metrics())?;
    classified.emit(&mut observer);

    let total_duration = clock.elapsed(&start).saturating_sub(observer.spent);
    let output = classified.into_result();
    let summary = PipelineSummary {
        image_width: output.dimensions.width,
        image_height: output.dimensions.height,
        pixel_count: output.dimensions.pixel_count() as u64,
        edge_pixel_count: output.edges.count(|v| v > 0.0),
    };

    Ok((
        output,
        PipelineDiagnostics {
            gradients: gradients_diag,
            magnitude_orientation: oriented_diag,
            thinning: thinned_diag,
            classification: classified_diag,
            total_duration,
            summary,
        },
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::observer::NoopObserver;
    use crate::pipeline::Pipeline;
    use crate::plane::{ChannelImage, Plane};
    use crate::types::PipelineConfig;

    fn pending() -> Pending {
        let image =
            ChannelImage::single(Plane::from_fn(9, 7, |x, y| if x + y < 8 { 0.0 } else { 4.0 }));
        Pipeline::new(
            image,
            PipelineConfig {
                low_threshold: Some(1.0),
                high_threshold: Some(3.0),
                hysteresis: true,
                ..PipelineConfig::default()
            },
        )
    }

    /// Clock that only moves when told to.
    #[derive(Default)]
    struct ManualClock {
        now: Cell<Duration>,
    }

    impl ManualClock {
        fn advance(&self, by: Duration) {
            self.now.set(self.now.get() + by);
        }
    }

    impl Clock for ManualClock {
        type Instant = Duration;

        fn now(&self) -> Duration {
            self.now.get()
        }

        fn elapsed(&self, since: &Duration) -> Duration {
            self.now.get() - *since
        }
    }

    #[test]
    fn observer_time_is_not_charged_to_stages() {
        let clock = ManualClock::default();
        let mut events = 0;
        let mut slow_observer = |_: StageEvent<'_>| {
            events += 1;
            clock.advance(Duration::from_secs(1));
        };
        let (_, diag) = process_with_diagnostics(pending(), &clock, &mut slow_observer).unwrap();

        assert_eq!(events, 7);
        assert_eq!(clock.now(), Duration::from_secs(7));
        assert_eq!(diag.gradients.duration, Duration::ZERO);
        assert_eq!(diag.magnitude_orientation.duration, Duration::ZERO);
        assert_eq!(diag.thinning.duration, Duration::ZERO);
        assert_eq!(diag.classification.duration, Duration::ZERO);
        assert_eq!(diag.total_duration, Duration::ZERO);
    }

    #[test]
    fn duration_ms_converts_correctly() {
        let d = Duration::from_millis(1500);
        assert!((duration_ms(d) - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn diagnostics_cover_every_stage() {
        let (output, diag) =
            process_with_diagnostics(pending(), &WebClock, &mut NoopObserver).unwrap();
        assert!(matches!(
            diag.gradients.metrics,
            StageMetrics::Gradients {
                source: GradientSourceKind::Computed,
                channels: 1,
                ..
            }
        ));
        assert!(matches!(
            diag.classification.metrics,
            StageMetrics::Classification {
                mode: ClassificationMode::Hysteresis,
                ..
            }
        ));
        assert_eq!(diag.summary.pixel_count, 63);
        assert_eq!(diag.summary.edge_pixel_count, output.edges.count(|v| v > 0.0));
        assert!(diag.total_duration >= diag.thinning.duration);
    }

    #[test]
    fn observer_sees_stage_outputs_in_order() {
        let mut names = Vec::new();
        let mut observer = |event: StageEvent<'_>| names.push(event.name());
        process_with_diagnostics(pending(), &WebClock, &mut observer).unwrap();
        assert_eq!(
            names,
            vec![
                "sobel_weights",
                "channel_input",
                "channel_gradients",
                "gradients",
                "magnitude_orientation",
                "thinned",
                "classified",
            ]
        );
    }

    #[test]
    fn report_produces_nonempty_string() {
        let (_, diag) =
            process_with_diagnostics(pending(), &WebClock, &mut NoopObserver).unwrap();
        let report = diag.report();
        assert!(report.contains("Pipeline Diagnostics Report"));
        assert!(report.contains("Thinning"));
        assert!(report.contains("Hysteresis"));
    }

    #[test]
    fn diagnostics_serialize_durations_as_seconds() {
        let stage = StageDiagnostics {
            duration: Duration::from_millis(250),
            metrics: StageMetrics::Thinning {
                suppressed: 3,
                retained: 4,
            },
        };
        let json = serde_json::to_value(&stage).unwrap();
        assert_eq!(json["duration"], serde_json::json!(0.25));
        let back: StageDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.duration, stage.duration);
        assert_eq!(back.metrics, stage.metrics);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let json = serde_json::json!({
            "duration": -1.0,
            "metrics": { "Thinning": { "suppressed": 0, "retained": 0 } }
        });
        assert!(serde_json::from_value::<StageDiagnostics>(json).is_err());
    }
}
