//! Floating-point image planes and multi-channel images.
//!
//! A [`Plane`] is a row-major `H×W` grid of `f32` samples. Every stage
//! of the pipeline consumes and produces planes; a [`ChannelImage`]
//! groups the `C` channel planes of one input image and guarantees they
//! share dimensions.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// A 2D grid of `f32` samples in row-major order.
///
/// Serializes as `{ "width", "height", "data" }`. Finite samples are
/// JSON numbers; NaN and the infinities are the strings `"NaN"`,
/// `"inf"` and `"-inf"`, so every sample reads back bit-for-bit
/// equivalent. `null` is also accepted on input and reads as NaN.
///
/// Equality is sample-wise with NaN equal to NaN, so planes holding
/// undefined orientations still compare equal to themselves.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "PlaneRepr")]
pub struct Plane {
    width: u32,
    height: u32,
    data: Vec<f32>,
}

impl PartialEq for Plane {
    #[allow(clippy::float_cmp)]
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self
                .data
                .iter()
                .zip(&other.data)
                .all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
    }
}

/// One sample on the wire.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Sample {
    Finite(f32),
    NonFinite(String),
}

impl From<f32> for Sample {
    fn from(v: f32) -> Self {
        if v.is_finite() {
            Self::Finite(v)
        } else {
            // Display gives "NaN", "inf" and "-inf", all of which parse back.
            Self::NonFinite(v.to_string())
        }
    }
}

impl TryFrom<Sample> for f32 {
    type Error = PipelineError;

    fn try_from(sample: Sample) -> Result<Self, Self::Error> {
        match sample {
            Sample::Finite(v) => Ok(v),
            Sample::NonFinite(text) => match text.parse::<Self>() {
                Ok(v) if !v.is_finite() => Ok(v),
                _ => Err(PipelineError::InvalidConfig(format!(
                    "plane sample {text:?} is not a number, NaN, inf or -inf"
                ))),
            },
        }
    }
}

/// Wire form of a [`Plane`].
#[derive(Serialize, Deserialize)]
struct PlaneRepr {
    width: u32,
    height: u32,
    data: Vec<Option<Sample>>,
}

impl TryFrom<PlaneRepr> for Plane {
    type Error = PipelineError;

    fn try_from(repr: PlaneRepr) -> Result<Self, Self::Error> {
        let data = repr
            .data
            .into_iter()
            .map(|v| v.map_or(Ok(f32::NAN), f32::try_from))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_vec(repr.width, repr.height, data)
    }
}

impl Serialize for Plane {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PlaneRepr {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| Some(Sample::from(v))).collect(),
        }
        .serialize(serializer)
    }
}

impl Plane {
    /// A plane of zeros.
    #[must_use]
    pub fn zeros(width: u32, height: u32) -> Self {
        Self::filled(width, height, 0.0)
    }

    /// A plane with every sample set to `value`.
    #[must_use]
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; Dimensions::new(width, height).pixel_count()],
        }
    }

    /// Build a plane by evaluating `f(x, y)` for every sample.
    #[must_use]
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut data = Vec::with_capacity(Dimensions::new(width, height).pixel_count());
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wrap a row-major sample buffer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::BufferLength`] if `data.len()` is not
    /// `width * height`.
    pub fn from_vec(width: u32, height: u32, data: Vec<f32>) -> Result<Self, PipelineError> {
        let expected = Dimensions::new(width, height).pixel_count();
        if data.len() != expected {
            return Err(PipelineError::BufferLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Convert an 8-bit grayscale image, keeping the raw 0-255 scale.
    #[must_use]
    pub fn from_gray_image(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.as_raw().iter().map(|&v| f32::from(v)).collect(),
        }
    }

    /// Plane width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Plane height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Plane dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Sample at column `x`, row `y`.
    ///
    /// # Panics
    ///
    /// If `(x, y)` lies outside the plane.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        assert!(x < self.width && y < self.height, "sample out of bounds");
        self.data[self.index(x, y)]
    }

    /// Sample at signed coordinates, or `None` outside the plane.
    ///
    /// Used by zero-padded correlation.
    #[must_use]
    pub fn get_signed(&self, x: i64, y: i64) -> Option<f32> {
        let x = u32::try_from(x).ok().filter(|&x| x < self.width)?;
        let y = u32::try_from(y).ok().filter(|&y| y < self.height)?;
        Some(self.data[self.index(x, y)])
    }

    /// All samples in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable access to all samples in row-major order.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Apply `f` to every sample.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Combine two planes sample by sample.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] if `other` has different
    /// dimensions.
    pub fn zip_map(&self, other: &Self, f: impl Fn(f32, f32) -> f32) -> Result<Self, PipelineError> {
        self.ensure_same_shape(other)?;
        Ok(Self {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    /// Fail unless `other` has the same dimensions as `self`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ShapeMismatch`] naming both shapes.
    pub fn ensure_same_shape(&self, other: &Self) -> Result<(), PipelineError> {
        if self.dimensions() == other.dimensions() {
            Ok(())
        } else {
            Err(PipelineError::shape_mismatch(
                self.dimensions(),
                other.dimensions(),
            ))
        }
    }

    /// Number of samples satisfying `predicate`.
    #[must_use]
    pub fn count(&self, predicate: impl Fn(f32) -> bool) -> u64 {
        self.data.iter().filter(|&&v| predicate(v)).count() as u64
    }

    /// Largest finite sample, or `None` if there is none.
    #[must_use]
    pub fn max_finite(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f32::max)
    }

    /// Smallest finite sample, or `None` if there is none.
    #[must_use]
    pub fn min_finite(&self) -> Option<f32> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .reduce(f32::min)
    }

    /// Convert to 8-bit grayscale by multiplying each sample by `scale`
    /// and clamping to 0-255. NaN maps to 0.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_gray_image(&self, scale: f32) -> GrayImage {
        let raw = self
            .data
            .iter()
            .map(|&v| {
                let scaled = v * scale;
                if scaled.is_nan() {
                    0
                } else {
                    scaled.round().clamp(0.0, 255.0) as u8
                }
            })
            .collect();
        // The buffer length is width * height by construction.
        GrayImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Convert to 8-bit grayscale, stretching the finite sample range
    /// onto 0-255. Constant planes map to 0; NaN maps to 0.
    #[must_use]
    pub fn to_gray_image_normalized(&self) -> GrayImage {
        let (Some(min), Some(max)) = (self.min_finite(), self.max_finite()) else {
            return GrayImage::new(self.width, self.height);
        };
        let range = max - min;
        if range <= 0.0 {
            return GrayImage::new(self.width, self.height);
        }
        self.map(|v| (v - min) / range).to_gray_image(255.0)
    }

    const fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}

/// The channel planes of one input image, all with the same dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelImage {
    channels: Vec<Plane>,
}

impl ChannelImage {
    /// Group channel planes into an image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyInput`] if `channels` is empty and
    /// [`PipelineError::ShapeMismatch`] if the planes disagree on
    /// dimensions.
    pub fn new(channels: Vec<Plane>) -> Result<Self, PipelineError> {
        let first = channels.first().ok_or(PipelineError::EmptyInput)?;
        for plane in &channels[1..] {
            first.ensure_same_shape(plane)?;
        }
        Ok(Self { channels })
    }

    /// Single-channel image from one plane.
    #[must_use]
    pub fn single(plane: Plane) -> Self {
        Self {
            channels: vec![plane],
        }
    }

    /// The channel planes.
    #[must_use]
    pub fn channels(&self) -> &[Plane] {
        &self.channels
    }

    /// Number of channels (always at least one).
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Shared dimensions of the channel planes.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.channels
            .first()
            .map_or(Dimensions::new(0, 0), Plane::dimensions)
    }
}
