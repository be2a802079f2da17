//! Gradient stage: Sobel correlation averaged over channels.
//!
//! Each channel plane is correlated with both Sobel kernels; the
//! per-channel responses are summed in channel order and divided by the
//! channel count. A [`GradientSource::Supplied`] pair bypasses this
//! entirely, see [`resolve_gradients`].

use crate::backend::Backend;
use crate::correlate::correlate;
use crate::kernels::Kernel;
use crate::observer::{NoopObserver, StageEvent, StageObserver};
use crate::plane::{ChannelImage, Plane};
use crate::types::{GradientSource, PipelineError};

/// A horizontal/vertical gradient pair with shared dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientPair {
    /// Horizontal gradient.
    pub grad_x: Plane,
    /// Vertical gradient.
    pub grad_y: Plane,
}

/// Compute the channel-averaged Sobel gradients of `image`.
#[must_use = "returns the gradient pair"]
pub fn compute_gradients(
    image: &ChannelImage,
    sobel_x: &Kernel,
    sobel_y: &Kernel,
    backend: Backend,
) -> GradientPair {
    compute_gradients_observed(image, sobel_x, sobel_y, backend, &mut NoopObserver)
}

/// [`compute_gradients`], reporting the Sobel weights, each channel
/// input, and each channel's responses to `observer`.
#[allow(clippy::cast_precision_loss)]
pub fn compute_gradients_observed(
    image: &ChannelImage,
    sobel_x: &Kernel,
    sobel_y: &Kernel,
    backend: Backend,
    observer: &mut dyn StageObserver,
) -> GradientPair {
    let dims = image.dimensions();
    observer.observe(StageEvent::SobelWeights { sobel_x, sobel_y });

    let mut sum_x = Plane::zeros(dims.width, dims.height);
    let mut sum_y = Plane::zeros(dims.width, dims.height);
    for (channel, plane) in image.channels().iter().enumerate() {
        let response_x = correlate(plane, sobel_x, backend);
        let response_y = correlate(plane, sobel_y, backend);
        observer.observe(StageEvent::ChannelInput { channel, plane });
        observer.observe(StageEvent::ChannelGradients {
            channel,
            grad_x: &response_x,
            grad_y: &response_y,
        });
        accumulate(&mut sum_x, &response_x);
        accumulate(&mut sum_y, &response_y);
    }

    let count = image.channel_count() as f32;
    GradientPair {
        grad_x: sum_x.map(|v| v / count),
        grad_y: sum_y.map(|v| v / count),
    }
}

/// Pick the gradient pair for a run: compute it, or validate and take
/// the supplied planes unchanged.
///
/// # Errors
///
/// Returns [`PipelineError::ShapeMismatch`] if a supplied plane does not
/// match the image dimensions.
pub fn resolve_gradients(
    image: &ChannelImage,
    source: GradientSource,
    sobel_x: &Kernel,
    sobel_y: &Kernel,
    backend: Backend,
    observer: &mut dyn StageObserver,
) -> Result<GradientPair, PipelineError> {
    match source {
        GradientSource::Computed => Ok(compute_gradients_observed(
            image, sobel_x, sobel_y, backend, observer,
        )),
        GradientSource::Supplied { grad_x, grad_y } => {
            let expected = image.dimensions();
            for plane in [&grad_x, &grad_y] {
                if plane.dimensions() != expected {
                    return Err(PipelineError::shape_mismatch(expected, plane.dimensions()));
                }
            }
            Ok(GradientPair { grad_x, grad_y })
        }
    }
}

/// `sum += plane`, sample by sample. Shapes are equal by construction.
fn accumulate(sum: &mut Plane, plane: &Plane) {
    for (s, &v) in sum.as_mut_slice().iter_mut().zip(plane.as_slice()) {
        *s += v;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::kernels::KernelTable;
    use crate::types::Dimensions;

    fn ramp(width: u32, height: u32) -> Plane {
        Plane::from_fn(width, height, |x, _| f32::from(u16::try_from(x).unwrap()) * 2.0)
    }

    #[test]
    fn zero_image_has_zero_gradients() {
        let k = KernelTable::standard();
        let image = ChannelImage::single(Plane::zeros(6, 5));
        let g = compute_gradients(&image, k.sobel_x(), k.sobel_y(), Backend::Parallel);
        assert!(g.grad_x.as_slice().iter().all(|&v| v == 0.0));
        assert!(g.grad_y.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn horizontal_ramp_interior() {
        // Slope 2 per pixel: x-kernel weights sum to 2 on each side,
        // so the interior response is 2 * (2 * 2) = 8; y is flat.
        let k = KernelTable::standard();
        let image = ChannelImage::single(ramp(6, 5));
        let g = compute_gradients(&image, k.sobel_x(), k.sobel_y(), Backend::Sequential);
        for y in 1..4 {
            for x in 1..5 {
                assert_eq!(g.grad_x.get(x, y), 8.0);
                assert_eq!(g.grad_y.get(x, y), 0.0);
            }
        }
    }

    #[test]
    fn channels_are_averaged() {
        let k = KernelTable::standard();
        let single = ChannelImage::single(ramp(6, 5));
        let doubled = ChannelImage::new(vec![ramp(6, 5), ramp(6, 5).map(|v| v * 3.0)]).unwrap();
        let g1 = compute_gradients(&single, k.sobel_x(), k.sobel_y(), Backend::Sequential);
        let g2 = compute_gradients(&doubled, k.sobel_x(), k.sobel_y(), Backend::Sequential);
        // (1 + 3) / 2 = 2x the single-channel response.
        assert_eq!(g2.grad_x, g1.grad_x.map(|v| v * 2.0));
    }

    #[test]
    fn observer_sees_every_channel() {
        let k = KernelTable::standard();
        let image = ChannelImage::new(vec![Plane::zeros(3, 3); 3]).unwrap();
        let mut events = Vec::new();
        let mut observer = |event: StageEvent<'_>| {
            let channel = match event {
                StageEvent::ChannelInput { channel, .. }
                | StageEvent::ChannelGradients { channel, .. } => Some(channel),
                _ => None,
            };
            events.push((event.name(), channel));
        };
        let _ = compute_gradients_observed(
            &image,
            k.sobel_x(),
            k.sobel_y(),
            Backend::Sequential,
            &mut observer,
        );
        assert_eq!(events.len(), 7);
        assert_eq!(events[0], ("sobel_weights", None));
        assert_eq!(events[1], ("channel_input", Some(0)));
        assert_eq!(events[6], ("channel_gradients", Some(2)));
    }

    #[test]
    fn supplied_gradients_are_used_unchanged() {
        let k = KernelTable::standard();
        let image = ChannelImage::new(vec![Plane::zeros(4, 4), Plane::zeros(4, 4)]).unwrap();
        let grad_x = Plane::filled(4, 4, 3.0);
        let grad_y = Plane::filled(4, 4, -1.0);
        let g = resolve_gradients(
            &image,
            GradientSource::Supplied {
                grad_x: grad_x.clone(),
                grad_y: grad_y.clone(),
            },
            k.sobel_x(),
            k.sobel_y(),
            Backend::Sequential,
            &mut NoopObserver,
        )
        .unwrap();
        assert_eq!(g.grad_x, grad_x);
        assert_eq!(g.grad_y, grad_y);
    }

    #[test]
    fn supplied_gradients_must_match_image() {
        let k = KernelTable::standard();
        let image = ChannelImage::single(Plane::zeros(4, 4));
        let result = resolve_gradients(
            &image,
            GradientSource::Supplied {
                grad_x: Plane::zeros(4, 4),
                grad_y: Plane::zeros(4, 3),
            },
            k.sobel_x(),
            k.sobel_y(),
            Backend::Sequential,
            &mut NoopObserver,
        );
        assert_eq!(
            result,
            Err(PipelineError::shape_mismatch(
                Dimensions::new(4, 4),
                Dimensions::new(4, 3)
            ))
        );
    }
}
