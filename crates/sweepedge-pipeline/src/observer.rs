//! Observer hook for intermediate planes.
//!
//! The core never writes files. Callers that want to inspect or persist
//! intermediates (per-channel inputs, per-channel Sobel responses, the
//! Sobel weights, and every stage output) implement [`StageObserver`]
//! and pass it to [`run_canny_observed`](crate::run_canny_observed) or
//! [`Pending::gradients_observed`](crate::pipeline::Pending::gradients_observed).
//!
//! Any `FnMut(StageEvent<'_>)` closure is an observer.

use crate::kernels::Kernel;
use crate::plane::Plane;
use crate::types::GradientSourceKind;

/// One intermediate result, borrowed from the pipeline.
#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    /// The Sobel kernels about to be applied.
    SobelWeights {
        /// Horizontal derivative kernel.
        sobel_x: &'a Kernel,
        /// Vertical derivative kernel.
        sobel_y: &'a Kernel,
    },
    /// One input channel plane, before correlation.
    ChannelInput {
        /// Zero-based channel index.
        channel: usize,
        /// The channel plane.
        plane: &'a Plane,
    },
    /// Sobel responses of one channel, before averaging.
    ChannelGradients {
        /// Zero-based channel index.
        channel: usize,
        /// Horizontal response.
        grad_x: &'a Plane,
        /// Vertical response.
        grad_y: &'a Plane,
    },
    /// The gradient pair used by the rest of the pipeline.
    Gradients {
        /// Whether the pair was computed or supplied.
        source: GradientSourceKind,
        /// Horizontal gradient.
        grad_x: &'a Plane,
        /// Vertical gradient.
        grad_y: &'a Plane,
    },
    /// Magnitude and quantized orientation.
    MagnitudeOrientation {
        /// Gradient magnitude.
        magnitude: &'a Plane,
        /// Orientation in degrees.
        orientation: &'a Plane,
    },
    /// Magnitude after non-maximum suppression.
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

impl StageEvent<'_> {
    /// Short machine-friendly name (`"channel_input"`, `"thinned"`, ...).
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SobelWeights { .. } => "sobel_weights",
            Self::ChannelInput { .. } => "channel_input",
            Self::ChannelGradients { .. } => "channel_gradients",
            Self::Gradients { .. } => "gradients",
            Self::MagnitudeOrientation { .. } => "magnitude_orientation",
            Self::Thinned { .. } => "thinned",
            Self::Classified { .. } => "classified",
        }
    }
}

/// Receives intermediate results as the pipeline produces them.
pub trait StageObserver {
    /// Called once per event, in pipeline order.
    fn observe(&mut self, event: StageEvent<'_>);
}

impl<F> StageObserver for F
where
    F: FnMut(StageEvent<'_>),
{
    fn observe(&mut self, event: StageEvent<'_>) {
        self(event);
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn observe(&mut self, _event: StageEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_is_observer() {
        let mut names = Vec::new();
        let plane = Plane::zeros(1, 1);
        {
            let mut observer = |event: StageEvent<'_>| names.push(event.name());
            observer.observe(StageEvent::Thinned { thin: &plane });
            observer.observe(StageEvent::Classified { edges: &plane });
        }
        assert_eq!(names, vec!["thinned", "classified"]);
    }

    #[test]
    fn noop_observer_accepts_events() {
        let plane = Plane::zeros(1, 1);
        NoopObserver.observe(StageEvent::Thinned { thin: &plane });
    }
}
