//! sweepedge-pipeline: Canny edge detection over floating-point planes
//! (sans-IO).
//!
//! Stages, in order:
//! gradients -> magnitude/orientation -> directional thinning ->
//! threshold classification with optional density hysteresis.
//!
//! Every stage is a pure function of its inputs and an explicit
//! [`Backend`]. The gradient stage is pluggable: a caller may supply its
//! own gradient pair through [`GradientSource::Supplied`]. Intermediates
//! can be inspected through the typestate [`Pipeline`] or a
//! [`StageObserver`]; this crate never touches the filesystem.

pub mod backend;
pub mod correlate;
pub mod diagnostics;
pub mod gradient;
pub mod hysteresis;
pub mod kernels;
pub mod observer;
pub mod orientation;
pub mod pipeline;
pub mod plane;
pub mod thin;
pub mod types;

pub use backend::Backend;
pub use gradient::{GradientPair, compute_gradients, resolve_gradients};
pub use hysteresis::{ClassificationMode, classify};
pub use kernels::{Kernel, KernelTable};
pub use observer::{NoopObserver, StageEvent, StageObserver};
pub use orientation::{MagnitudeOrientation, compute_magnitude_orientation};
pub use pipeline::Pipeline;
pub use plane::{ChannelImage, Plane};
pub use thin::thin_edges;
pub use types::{
    CannyOutput, Dimensions, GradientSource, GradientSourceKind, PipelineConfig, PipelineError,
};

/// Run the full pipeline on one image.
///
/// `kernels` is used as given; `config.sobel_size` only matters to
/// [`Pipeline`], which derives its own table.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for an invalid `config` and
/// [`PipelineError::ShapeMismatch`] if supplied gradients do not match
/// the image.
pub fn run_canny(
    image: &ChannelImage,
    kernels: &KernelTable,
    config: &PipelineConfig,
    source: GradientSource,
) -> Result<CannyOutput, PipelineError> {
    run_canny_observed(image, kernels, config, source, &mut NoopObserver)
}

/// [`run_canny`], reporting every intermediate to `observer`.
///
/// # Errors
///
/// See [`run_canny`].
pub fn run_canny_observed(
    image: &ChannelImage,
    kernels: &KernelTable,
    config: &PipelineConfig,
    source: GradientSource,
    observer: &mut dyn StageObserver,
) -> Result<CannyOutput, PipelineError> {
    config.validate()?;
    let backend = config.backend;
    let kind = source.kind();

    // 1. Gradients: Sobel correlation or the supplied pair.
    let GradientPair { grad_x, grad_y } = resolve_gradients(
        image,
        source,
        kernels.sobel_x(),
        kernels.sobel_y(),
        backend,
        observer,
    )?;
    observer.observe(StageEvent::Gradients {
        source: kind,
        grad_x: &grad_x,
        grad_y: &grad_y,
    });

    // 2. Magnitude and quantized orientation.
    let MagnitudeOrientation {
        magnitude,
        orientation,
    } = compute_magnitude_orientation(&grad_x, &grad_y, backend)?;
    observer.observe(StageEvent::MagnitudeOrientation {
        magnitude: &magnitude,
        orientation: &orientation,
    });

    // 3. Directional non-maximum suppression.
    let thin = thin_edges(&magnitude, &orientation, kernels.directional(), backend)?;
    observer.observe(StageEvent::Thinned { thin: &thin });

    // 4. Thresholds and hysteresis.
    let edges = classify(
        &thin,
        config.low_threshold,
        config.high_threshold,
        config.hysteresis,
        kernels.density(),
        backend,
    )?;
    observer.observe(StageEvent::Classified { edges: &edges });

    let dimensions = image.dimensions();
    log::debug!(
        "canny: {dimensions} {kind} on {backend}, {} edge pixel(s)",
        edges.count(|v| v > 0.0)
    );

    Ok(CannyOutput {
        grad_x,
        grad_y,
        magnitude,
        orientation,
        thin,
        edges,
        dimensions,
    })
}

/// Run the pipeline on each image of a batch, computing gradients.
///
/// Images run in parallel under [`Backend::Parallel`]. Every image must
/// share the dimensions of the first; an empty batch yields an empty
/// result.
///
/// # Errors
///
/// Returns [`PipelineError::ShapeMismatch`] for an image whose size
/// differs from the first, or any error [`run_canny`] returns.
pub fn run_canny_batch(
    images: &[ChannelImage],
    kernels: &KernelTable,
    config: &PipelineConfig,
) -> Result<Vec<CannyOutput>, PipelineError> {
    config.validate()?;
    if let Some(first) = images.first() {
        let expected = first.dimensions();
        if let Some(other) = images.iter().find(|i| i.dimensions() != expected) {
            return Err(PipelineError::shape_mismatch(expected, other.dimensions()));
        }
    }
    log::debug!("canny batch: {} image(s)", images.len());
    config.backend.try_map(images, |image| {
        run_canny(image, kernels, config, GradientSource::Computed)
    })
}
