//! Glimpse windows and the fixed-resolution grids sampled from them.
use std::fmt;

use itertools::iproduct;
use log::warn;
use ndarray::{Array3, ArrayView3};
use serde_derive::{Deserialize, Serialize};

use crate::config::{CoordinateConvention, ScalePolicy};
use crate::error::{GlimpseError, Result};
use crate::sampler::{ContinuousSampler, Image};

/// A glimpse window.
///
/// `(x, y)` is the lower-left corner of the window and `scale` its extent as a
/// fraction of the full image (1.0 covers the whole image). Whether `x`/`y`
/// are normalized or pixel coordinates is decided by the [`GridBuilder`]'s
/// [`CoordinateConvention`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

impl Location {
    pub fn new(x: f32, y: f32, scale: f32) -> Self {
        Location { x, y, scale }
    }

    /// The window covering the whole image, where every glimpse loop starts.
    pub fn full_image() -> Self {
        Location::new(0.0, 0.0, 1.0)
    }

    /// Reinterprets a raw 3-element proposal as `(x, y, scale)`.
    pub fn from_slice(params: &[f32]) -> Result<Self> {
        match params {
            [x, y, scale] => Ok(Location::new(*x, *y, *scale)),
            _ => Err(GlimpseError::shape_mismatch(
                "location parameters",
                3,
                params.len(),
            )),
        }
    }
}

/// Output resolution of every glimpse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl GridShape {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GlimpseError::InvalidGridShape { width, height });
        }
        Ok(GridShape { width, height })
    }

    /// Number of sample points per channel.
    pub fn cells(&self) -> usize {
        self.width * self.height
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Gradient of a scalar loss with respect to a [`Location`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocationGrad {
    pub dx: f32,
    pub dy: f32,
    pub dscale: f32,
}

/// Builds `(width, height, C)` glimpse grids from a window over an image.
///
/// This is the only place where window coordinates are converted into the
/// pixel units [`ContinuousSampler`] works in.
#[derive(Debug, Clone)]
pub struct GridBuilder {
    shape: GridShape,
    convention: CoordinateConvention,
    scale_policy: ScalePolicy,
}

impl GridBuilder {
    pub fn new(shape: GridShape, convention: CoordinateConvention, scale_policy: ScalePolicy) -> Self {
        GridBuilder {
            shape,
            convention,
            scale_policy,
        }
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn convention(&self) -> CoordinateConvention {
        self.convention
    }

    /// Evenly spaced sample points of the window at `location`, converted to
    /// pixel units of `image`. Columns cover `[x, x + scale)` and rows
    /// `[y, y + scale)` of the window (endpoints exclusive).
    pub fn sample_points(&self, image: &Image, location: &Location) -> Result<(Vec<f32>, Vec<f32>)> {
        let scale = self.checked_window(location)?;
        Ok(self.points_for(image, location, scale))
    }

    fn points_for(&self, image: &Image, location: &Location, scale: f32) -> (Vec<f32>, Vec<f32>) {
        let (width, height, _) = image.dim();
        let (gw, gh) = (self.shape.width as f32, self.shape.height as f32);
        let (w, h) = (width as f32, height as f32);
        match self.convention {
            CoordinateConvention::Normalized => (
                (0..self.shape.width)
                    .map(|i| (location.x + i as f32 * scale / gw) * w)
                    .collect(),
                (0..self.shape.height)
                    .map(|j| (location.y + j as f32 * scale / gh) * h)
                    .collect(),
            ),
            CoordinateConvention::Pixel => (
                (0..self.shape.width)
                    .map(|i| location.x + i as f32 * scale * w / gw)
                    .collect(),
                (0..self.shape.height)
                    .map(|j| location.y + j as f32 * scale * h / gh)
                    .collect(),
            ),
        }
    }

    /// Samples the window at `location` into a fresh `(width, height, C)` grid.
    ///
    /// Windows reaching past the image are never an error; their sample points
    /// resolve through the sampler's clamp-to-edge policy.
    pub fn build_grid(&self, image: &Image, location: &Location) -> Result<Array3<f32>> {
        check_image(image)?;
        let (pxs, pys) = self.sample_points(image, location)?;
        let channels = image.dim().2;

        let mut grid: Array3<f32> = Array3::zeros((self.shape.width, self.shape.height, channels));
        for ((i, px), (j, py)) in iproduct!(pxs.iter().enumerate(), pys.iter().enumerate()) {
            let value = ContinuousSampler::sample(image, *px, *py);
            grid.slice_mut(ndarray::s![i, j, ..]).assign(&value);
        }
        Ok(grid)
    }

    /// Back-propagates `upstream` (d loss / d grid) into the window parameters.
    pub fn location_vjp(
        &self,
        image: &Image,
        location: &Location,
        upstream: ArrayView3<f32>,
    ) -> Result<LocationGrad> {
        check_image(image)?;
        self.check_upstream(image, &upstream)?;
        let (width, height, _) = image.dim();
        let scale = self.checked_window(location)?;
        let (pxs, pys) = self.points_for(image, location, scale);

        // d px / d x, d px / d scale per column (and the same for rows)
        let (dpx_dx, dpy_dy) = match self.convention {
            CoordinateConvention::Normalized => (width as f32, height as f32),
            CoordinateConvention::Pixel => (1.0, 1.0),
        };
        let dpx_dscale = |i: usize| i as f32 * width as f32 / self.shape.width as f32;
        let dpy_dscale = |j: usize| j as f32 * height as f32 / self.shape.height as f32;

        let mut grad = LocationGrad::default();
        for ((i, px), (j, py)) in iproduct!(pxs.iter().enumerate(), pys.iter().enumerate()) {
            let sample = ContinuousSampler::sample_with_grad(image, *px, *py);
            let up = upstream.slice(ndarray::s![i, j, ..]);
            let gx = up.dot(&sample.d_dx);
            let gy = up.dot(&sample.d_dy);
            grad.dx += gx * dpx_dx;
            grad.dy += gy * dpy_dy;
            grad.dscale += gx * dpx_dscale(i) + gy * dpy_dscale(j);
        }
        // a substituted scale is a constant, nothing flows back through it
        if scale != location.scale {
            grad.dscale = 0.0;
        }
        Ok(grad)
    }

    /// Scatters `upstream` (d loss / d grid) onto the image pixels.
    pub fn image_vjp(
        &self,
        image: &Image,
        location: &Location,
        upstream: ArrayView3<f32>,
    ) -> Result<Array3<f32>> {
        check_image(image)?;
        self.check_upstream(image, &upstream)?;
        let (pxs, pys) = self.sample_points(image, location)?;

        let mut grad: Array3<f32> = Array3::zeros(image.raw_dim());
        for ((i, px), (j, py)) in iproduct!(pxs.iter().enumerate(), pys.iter().enumerate()) {
            let up = upstream.slice(ndarray::s![i, j, ..]);
            for tap in ContinuousSampler::taps(image, *px, *py).iter() {
                grad.slice_mut(ndarray::s![tap.x, tap.y, ..])
                    .scaled_add(tap.weight, &up);
            }
        }
        Ok(grad)
    }

    /// Scale to sample `location` with, after the scale policy.
    ///
    /// A non-finite corner poisons every sample point, so it is rejected
    /// whatever the policy.
    fn checked_window(&self, location: &Location) -> Result<f32> {
        if !location.x.is_finite() || !location.y.is_finite() {
            return Err(GlimpseError::NonFiniteLocation {
                x: location.x,
                y: location.y,
            });
        }
        let scale = location.scale;
        if scale > 0.0 && scale.is_finite() {
            return Ok(scale);
        }
        match self.scale_policy {
            ScalePolicy::Clamp { min_scale } => {
                warn!("glimpse scale {} is not positive and finite, clamping to {}", scale, min_scale);
                Ok(min_scale)
            }
            ScalePolicy::Reject => Err(GlimpseError::InvalidScale(scale)),
        }
    }

    fn check_upstream(&self, image: &Image, upstream: &ArrayView3<f32>) -> Result<()> {
        let expected = (self.shape.width, self.shape.height, image.dim().2);
        if upstream.dim() != expected {
            return Err(GlimpseError::shape_mismatch(
                "upstream gradient elements",
                expected.0 * expected.1 * expected.2,
                upstream.len(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn check_image(image: &Image) -> Result<()> {
    let (width, height, channels) = image.dim();
    if width == 0 || height == 0 || channels == 0 {
        return Err(GlimpseError::EmptyImage {
            width,
            height,
            channels,
        });
    }
    Ok(())
}
