//! Incremental pipeline: advance stage by stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::run_canny`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use sweepedge_pipeline::{ChannelImage, Pipeline, PipelineConfig, PipelineError};
//! # fn run(image: ChannelImage) -> Result<(), PipelineError> {
//! let output = Pipeline::new(image, PipelineConfig::default())
//!     .gradients()?
//!     .orient()?
//!     .thin()?
//!     .classify()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying every plane computed so far. Accessors expose the current
//! stage's output at any point.

use crate::diagnostics::StageMetrics;
use crate::gradient::resolve_gradients;
use crate::hysteresis::{ClassificationMode, classify_detailed};
use crate::kernels::KernelTable;
use crate::observer::{NoopObserver, StageEvent, StageObserver};
use crate::orientation::compute_magnitude_orientation;
use crate::plane::{ChannelImage, Plane};
use crate::thin::thin_edges;
use crate::types::{
    CannyOutput, Dimensions, GradientSource, GradientSourceKind, PipelineConfig, PipelineError,
};

/// State shared by every stage after the gradients are resolved.
#[derive(Debug, Clone)]
struct RunContext {
    config: PipelineConfig,
    kernels: KernelTable,
    dimensions: Dimensions,
    source: GradientSourceKind,
    channels: usize,
}

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// Call [`gradients`](Self::gradients) to advance.
#[must_use = "pipeline stages are consumed by advancing: call .gradients() to continue"]
#[derive(Debug, Clone)]
pub struct Pending {
    config: PipelineConfig,
    image: ChannelImage,
    source: GradientSource,
    kernels: Option<KernelTable>,
}

impl Pending {
    /// The input image.
    #[must_use]
    pub const fn image(&self) -> &ChannelImage {
        &self.image
    }

    /// The configuration this run will use.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Take the gradient pair from `source` instead of computing it.
    pub fn with_source(mut self, source: GradientSource) -> Self {
        self.source = source;
        self
    }

    /// Use `kernels` instead of the table derived from
    /// `config.sobel_size`.
    pub fn with_kernels(mut self, kernels: KernelTable) -> Self {
        self.kernels = Some(kernels);
        self
    }

    /// Resolve the gradient pair and advance to [`Gradients`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the configuration is
    /// invalid, and [`PipelineError::ShapeMismatch`] if supplied
    /// gradients do not match the image.
    pub fn gradients(self) -> Result<Gradients, PipelineError> {
        self.gradients_observed(&mut NoopObserver)
    }

    /// [`gradients`](Self::gradients), reporting the Sobel weights,
    /// per-channel planes and the resolved pair to `observer`.
    ///
    /// # Errors
    ///
    /// See [`gradients`](Self::gradients).
    pub fn gradients_observed(
        self,
        observer: &mut dyn StageObserver,
    ) -> Result<Gradients, PipelineError> {
        self.config.validate()?;
        let kernels = match self.kernels {
            Some(kernels) => kernels,
            None => KernelTable::with_sobel_size(self.config.sobel_size)?,
        };
        let source = self.source.kind();
        let dimensions = self.image.dimensions();
        let channels = self.image.channel_count();

        let pair = resolve_gradients(
            &self.image,
            self.source,
            kernels.sobel_x(),
            kernels.sobel_y(),
            self.config.backend,
            observer,
        )?;
        log::debug!("gradients: {dimensions} {source}, {channels} channel(s)");

        let stage = Gradients {
            context: RunContext {
                config: self.config,
                kernels,
                dimensions,
                source,
                channels,
            },
            grad_x: pair.grad_x,
            grad_y: pair.grad_y,
        };
        stage.emit(observer);
        Ok(stage)
    }
}

// ───────────────────────── Stage 1: Gradients ────────────────────────

/// Pipeline state after the gradient pair is known.
#[must_use = "pipeline stages are consumed by advancing: call .orient() to continue"]
#[derive(Debug, Clone)]
pub struct Gradients {
    context: RunContext,
    grad_x: Plane,
    grad_y: Plane,
}

impl Gradients {
    /// Horizontal gradient.
    #[must_use]
    pub const fn grad_x(&self) -> &Plane {
        &self.grad_x
    }

    /// Vertical gradient.
    #[must_use]
    pub const fn grad_y(&self) -> &Plane {
        &self.grad_y
    }

    /// Whether the pair was computed or supplied.
    #[must_use]
    pub const fn source(&self) -> GradientSourceKind {
        self.context.source
    }

    /// The kernel table in use for this run.
    #[must_use]
    pub const fn kernels(&self) -> &KernelTable {
        &self.context.kernels
    }

    /// Compute magnitude and orientation and advance to [`Oriented`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if the gradient planes
    /// differ in size.
    pub fn orient(self) -> Result<Oriented, PipelineError> {
        let mo = compute_magnitude_orientation(
            &self.grad_x,
            &self.grad_y,
            self.context.config.backend,
        )?;
        log::debug!(
            "magnitude: max {:?}, {} undefined orientation(s)",
            mo.magnitude.max_finite(),
            mo.orientation.count(f32::is_nan)
        );
        Ok(Oriented {
            context: self.context,
            grad_x: self.grad_x,
            grad_y: self.grad_y,
            magnitude: mo.magnitude,
            orientation: mo.orientation,
        })
    }

    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Gradients {
            source: self.context.source,
            channels: self.context.channels,
            sobel_size: self.context.kernels.sobel_x().size(),
            width: self.context.dimensions.width,
            height: self.context.dimensions.height,
        }
    }
}

// ───────────────────────── Stage 2: Oriented ─────────────────────────

/// Pipeline state after magnitude and orientation.
#[must_use = "pipeline stages are consumed by advancing: call .thin() to continue"]
#[derive(Debug, Clone)]
pub struct Oriented {
    context: RunContext,
    grad_x: Plane,
    grad_y: Plane,
    magnitude: Plane,
    orientation: Plane,
}

impl Oriented {
    /// Gradient magnitude.
    #[must_use]
    pub const fn magnitude(&self) -> &Plane {
        &self.magnitude
    }

    /// Quantized orientation in degrees.
    #[must_use]
    pub const fn orientation(&self) -> &Plane {
        &self.orientation
    }

    /// Run non-maximum suppression and advance to [`Thinned`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if magnitude and
    /// orientation differ in size.
    pub fn thin(self) -> Result<Thinned, PipelineError> {
        let thin = thin_edges(
            &self.magnitude,
            &self.orientation,
            self.context.kernels.directional(),
            self.context.config.backend,
        )?;
        log::debug!(
            "thinning: {} of {} pixels nonzero",
            thin.count(|v| v != 0.0),
            self.context.dimensions.pixel_count()
        );
        Ok(Thinned {
            context: self.context,
            grad_x: self.grad_x,
            grad_y: self.grad_y,
            magnitude: self.magnitude,
            orientation: self.orientation,
            thin,
        })
    }

    /// Metrics describing the work done to reach this stage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stage_metrics(&self) -> StageMetrics {
        let (sum, finite) = self
            .magnitude
            .as_slice()
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0_f64, 0_u64), |(sum, n), &v| (sum + f64::from(v), n + 1));
        let mean_magnitude = if finite > 0 { sum / finite as f64 } else { 0.0 };
        StageMetrics::MagnitudeOrientation {
            max_magnitude: self.magnitude.max_finite().unwrap_or(0.0),
            mean_magnitude,
            undefined_orientations: self.orientation.count(f32::is_nan),
        }
    }
}

// ───────────────────────── Stage 3: Thinned ──────────────────────────

/// Pipeline state after non-maximum suppression.
#[must_use = "pipeline stages are consumed by advancing: call .classify() to continue"]
#[derive(Debug, Clone)]
pub struct Thinned {
    context: RunContext,
    grad_x: Plane,
    grad_y: Plane,
    magnitude: Plane,
    orientation: Plane,
    thin: Plane,
}

impl Thinned {
    /// Magnitude after suppression.
    #[must_use]
    pub const fn thin(&self) -> &Plane {
        &self.thin
    }

    /// Apply the thresholds and advance to [`Classified`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if a high threshold is
    /// set without a low one.
    pub fn classify(self) -> Result<Classified, PipelineError> {
        let config = &self.context.config;
        let outcome = classify_detailed(
            &self.thin,
            config.low_threshold,
            config.high_threshold,
            config.hysteresis,
            self.context.kernels.density(),
            config.backend,
        )?;
        log::debug!("classification: {:?}", outcome.mode);
        Ok(Classified {
            context: self.context,
            grad_x: self.grad_x,
            grad_y: self.grad_y,
            magnitude: self.magnitude,
            orientation: self.orientation,
            thin: self.thin,
            edges: outcome.edges,
            mode: outcome.mode,
            weak: outcome.weak,
            strong: outcome.strong,
            promoted: outcome.promoted,
        })
    }

    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        let suppressed = self
            .magnitude
            .as_slice()
            .iter()
            .zip(self.thin.as_slice())
            .filter(|&(&m, &t)| m != 0.0 && t == 0.0)
            .count() as u64;
        StageMetrics::Thinning {
            suppressed,
            retained: self.thin.count(|v| v != 0.0),
        }
    }
}

// ───────────────────────── Stage 4: Classified ───────────────────────

/// Final pipeline state.
#[must_use = "call .into_result() to take the planes"]
#[derive(Debug, Clone)]
pub struct Classified {
    context: RunContext,
    grad_x: Plane,
    grad_y: Plane,
    magnitude: Plane,
    orientation: Plane,
    thin: Plane,
    edges: Plane,
    mode: ClassificationMode,
    weak: u64,
    strong: u64,
    promoted: u64,
}

impl Classified {
    /// The final edge map.
    #[must_use]
    pub const fn edges(&self) -> &Plane {
        &self.edges
    }

    /// Which classification branch was taken.
    #[must_use]
    pub const fn mode(&self) -> ClassificationMode {
        self.mode
    }

    /// Consume the pipeline and return every plane.
    #[must_use]
    pub fn into_result(self) -> CannyOutput {
        CannyOutput {
            grad_x: self.grad_x,
            grad_y: self.grad_y,
            magnitude: self.magnitude,
            orientation: self.orientation,
            thin: self.thin,
            edges: self.edges,
            dimensions: self.context.dimensions,
        }
    }

    /// Metrics describing the work done to reach this stage.
    #[must_use]
    pub fn stage_metrics(&self) -> StageMetrics {
        StageMetrics::Classification {
            mode: self.mode,
            weak: self.weak,
            strong: self.strong,
            promoted: self.promoted,
            edge_pixels: self.edges.count(|v| v > 0.0),
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 5;

/// The output produced by a single pipeline stage.
#[must_use]
#[derive(Debug, Clone, Copy)]
pub enum StageOutput<'a> {
    /// The input image (nothing computed yet).
    Source {
        /// The channel planes.
        image: &'a ChannelImage,
    },
    /// The resolved gradient pair.
    Gradients {
        /// Whether the pair was computed or supplied.
        source: GradientSourceKind,
        /// Horizontal gradient.
        grad_x: &'a Plane,
        /// Vertical gradient.
        grad_y: &'a Plane,
    },
    /// Magnitude and orientation.
    MagnitudeOrientation {
        /// Gradient magnitude.
        magnitude: &'a Plane,
        /// Orientation in degrees.
        orientation: &'a Plane,
    },
    /// Thinned magnitude.
    Thinned {
        /// The thin-edge plane.
        thin: &'a Plane,
    },
    /// Final edge map.
    Classified {
        /// The edge plane.
        edges: &'a Plane,
    },
}

impl<'a> StageOutput<'a> {
    /// The observer event for this output; `None` for the source.
    #[must_use]
    pub const fn event(self) -> Option<StageEvent<'a>> {
        match self {
            Self::Source { .. } => None,
            Self::Gradients {
                source,
                grad_x,
                grad_y,
            } => Some(StageEvent::Gradients {
                source,
                grad_x,
                grad_y,
            }),
            Self::MagnitudeOrientation {
                magnitude,
                orientation,
            } => Some(StageEvent::MagnitudeOrientation {
                magnitude,
                orientation,
            }),
            Self::Thinned { thin } => Some(StageEvent::Thinned { thin }),
            Self::Classified { edges } => Some(StageEvent::Classified { edges }),
        }
    }
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// ```rust
/// # use sweepedge_pipeline::{ChannelImage, Pipeline, PipelineConfig, PipelineError};
/// # use sweepedge_pipeline::pipeline::{Advance, Stage};
/// # fn run(image: ChannelImage) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(image, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let output = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Machine-friendly name of this stage (e.g. `"thinning"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for [`Pending`] through `4`
    /// for [`Classified`]).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics; `None` for [`Pending`].
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage. `Ok(None)` at the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the stage transition fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages and return every plane.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining stage fails.
    fn complete(self) -> Result<CannyOutput, PipelineError>;

    /// Report this stage's output to `observer`.
    fn emit(&self, observer: &mut dyn StageObserver) {
        if let Some(event) = self.output().event() {
            observer.observe(event);
        }
    }
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source { image: &self.image }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Gradients(self.gradients()?)))
    }

    fn complete(self) -> Result<CannyOutput, PipelineError> {
        self.gradients()?.complete()
    }
}

impl PipelineStage for Gradients {
    const NAME: &str = "gradients";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Gradients {
            source: self.context.source,
            grad_x: &self.grad_x,
            grad_y: &self.grad_y,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Oriented(self.orient()?)))
    }

    fn complete(self) -> Result<CannyOutput, PipelineError> {
        self.orient()?.complete()
    }
}

impl PipelineStage for Oriented {
    const NAME: &str = "magnitude_orientation";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::MagnitudeOrientation {
            magnitude: &self.magnitude,
            orientation: &self.orientation,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Thinned(self.thin()?)))
    }

    fn complete(self) -> Result<CannyOutput, PipelineError> {
        self.thin()?.complete()
    }
}

impl PipelineStage for Thinned {
    const NAME: &str = "thinning";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Thinned { thin: &self.thin }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Classified(self.classify()?)))
    }

    fn complete(self) -> Result<CannyOutput, PipelineError> {
        self.classify()?.complete()
    }
}

impl PipelineStage for Classified {
    const NAME: &str = "classification";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Classified { edges: &self.edges }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(self.stage_metrics())
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<CannyOutput, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
#[must_use]
#[derive(Debug, Clone)]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Gradients`].
    Gradients(Gradients),
    /// See [`Oriented`].
    Oriented(Oriented),
    /// See [`Thinned`].
    Thinned(Thinned),
    /// See [`Classified`].
    Classified(Classified),
}

/// Fails to compile when a [`Stage`] variant is added without bumping
/// [`STAGE_COUNT`] alongside.
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Gradients(_)
        | Stage::Oriented(_)
        | Stage::Thinned(_)
        | Stage::Classified(_) => {}
    }
}

/// Result of [`Stage::advance`].
#[must_use]
#[derive(Debug)]
pub enum Advance {
    /// The pipeline advanced to this stage.
    Next(Stage),
    /// Already at the final stage, returned unchanged.
    Complete(Stage),
}

macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Gradients(s) => s.$method($($arg),*),
            Self::Oriented(s) => s.$method($($arg),*),
            Self::Thinned(s) => s.$method($($arg),*),
            Self::Classified(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Classified(_))
    }

    /// Advance to the next stage; `Ok(None)` consumes the final stage.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Loop-friendly [`next`](Self::next): the final stage comes back as
    /// [`Advance::Complete`] instead of being consumed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        Ok(match self {
            Self::Pending(s) => Advance::Next(s.gradients()?.into()),
            Self::Gradients(s) => Advance::Next(s.orient()?.into()),
            Self::Oriented(s) => Advance::Next(s.thin()?.into()),
            Self::Thinned(s) => Advance::Next(s.classify()?.into()),
            done @ Self::Classified(_) => Advance::Complete(done),
        })
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining stage fails.
    pub fn complete(self) -> Result<CannyOutput, PipelineError> {
        delegate!(self, complete)
    }
}

// Associated constants are not reachable through `self`, so the
// delegate macro goes through this helper.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Gradients> for Stage {
    fn from(s: Gradients) -> Self {
        Self::Gradients(s)
    }
}

impl From<Oriented> for Stage {
    fn from(s: Oriented) -> Self {
        Self::Oriented(s)
    }
}

impl From<Thinned> for Stage {
    fn from(s: Thinned) -> Self {
        Self::Thinned(s)
    }
}

impl From<Classified> for Stage {
    fn from(s: Classified) -> Self {
        Self::Classified(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental Canny pipeline.
///
/// Each stage method consumes the current state and returns the next,
/// so skipping or reordering stages is a compile-time error.
pub struct Pipeline;

impl Pipeline {
    /// Store the image and config; no processing happens yet.
    ///
    /// Gradients are computed unless [`Pending::with_source`] supplies
    /// them, and the kernel table follows `config.sobel_size` unless
    /// [`Pending::with_kernels`] replaces it.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: ChannelImage, config: PipelineConfig) -> Pending {
        Pending {
            config,
            image,
            source: GradientSource::Computed,
            kernels: None,
        }
    }
}
