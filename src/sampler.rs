//! Continuous reconstruction of a discrete image by bilinear interpolation.
//!
//! Coordinates handed to the sampler are always in pixel units: `x` indexes
//! the width axis and `y` the height axis of an `(W, H, C)` array. Conversion
//! from normalized window coordinates happens once, in [`crate::grid`].
use ndarray::{Array1, Array3, ArrayView1};

/// Discrete image laid out as `(width, height, channels)`.
pub type Image = Array3<f32>;

/// One of the four neighbouring pixels used for an interpolated sample.
///
/// The index is already clamped to the image, and `weight` is the bilinear
/// weight, i.e. the derivative of the sample with respect to that pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tap {
    pub x: usize,
    pub y: usize,
    pub weight: f32,
}

/// Interpolated value together with its partial derivatives.
#[derive(Debug, Clone)]
pub struct SampleGrad {
    pub value: Array1<f32>,
    pub d_dx: Array1<f32>,
    pub d_dy: Array1<f32>,
    /// (lx,ly), (lx+1,ly), (lx,ly+1), (lx+1,ly+1) in that order.
    pub taps: [Tap; 4],
}

/// Stateless bilinear sampler with clamp-to-edge boundary handling.
///
/// Indices past the last row/column are pinned to it rather than erroring or
/// wrapping, so any real coordinate yields a value.
///
/// # Panics
/// Panics if the image has a zero width or height. [`crate::GridBuilder`]
/// rejects such images before sampling.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContinuousSampler;

impl ContinuousSampler {
    /// Interpolated value per channel at pixel coordinate `(x, y)`.
    pub fn sample(image: &Image, x: f32, y: f32) -> Array1<f32> {
        let taps = Self::taps(image, x, y);
        let mut value: Array1<f32> = Array1::zeros(image.dim().2);
        for tap in taps.iter() {
            value.scaled_add(tap.weight, &pixel(image, tap));
        }
        value
    }

    /// Interpolated value plus derivatives with respect to `x`, `y` and the
    /// four fetched pixels.
    pub fn sample_with_grad(image: &Image, x: f32, y: f32) -> SampleGrad {
        let taps = Self::taps(image, x, y);
        let fx = x - x.floor();
        let fy = y - y.floor();
        let [p00, p10, p01, p11] = [
            pixel(image, &taps[0]),
            pixel(image, &taps[1]),
            pixel(image, &taps[2]),
            pixel(image, &taps[3]),
        ];

        let value = &p00 * taps[0].weight
            + &p10 * taps[1].weight
            + &p01 * taps[2].weight
            + &p11 * taps[3].weight;
        // clamped neighbours coincide, so the slope saturates to zero off the edge
        let d_dx = (&p10 - &p00) * (1.0 - fy) + (&p11 - &p01) * fy;
        let d_dy = (&p01 - &p00) * (1.0 - fx) + (&p11 - &p10) * fx;

        SampleGrad {
            value,
            d_dx,
            d_dy,
            taps,
        }
    }

    /// The four clamped neighbours of `(x, y)` with their bilinear weights.
    pub fn taps(image: &Image, x: f32, y: f32) -> [Tap; 4] {
        let (width, height, _) = image.dim();
        assert!(
            width > 0 && height > 0,
            "cannot interpolate on an empty image"
        );

        let lx = x.floor();
        let ly = y.floor();
        let fx = x - lx;
        let fy = y - ly;

        let x0 = clamp_index(lx, width);
        let x1 = clamp_index(lx + 1.0, width);
        let y0 = clamp_index(ly, height);
        let y1 = clamp_index(ly + 1.0, height);

        [
            Tap {
                x: x0,
                y: y0,
                weight: (1.0 - fx) * (1.0 - fy),
            },
            Tap {
                x: x1,
                y: y0,
                weight: fx * (1.0 - fy),
            },
            Tap {
                x: x0,
                y: y1,
                weight: (1.0 - fx) * fy,
            },
            Tap {
                x: x1,
                y: y1,
                weight: fx * fy,
            },
        ]
    }
}

fn pixel<'a>(image: &'a Image, tap: &Tap) -> ArrayView1<'a, f32> {
    image.slice(ndarray::s![tap.x, tap.y, ..])
}

//NOTE: NaN coordinates land on index 0 since `as usize` saturates
fn clamp_index(i: f32, len: usize) -> usize {
    if i <= 0.0 || i.is_nan() {
        0
    } else {
        (i as usize).min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp(width: usize, height: usize, channels: usize) -> Image {
        Array3::from_shape_fn((width, height, channels), |(x, y, c)| {
            (x * 10 + y * 100 + c) as f32
        })
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn integer_coordinates_are_exact() {
        let image = ramp(5, 4, 2);
        for x in 0..5 {
            for y in 0..4 {
                let v = ContinuousSampler::sample(&image, x as f32, y as f32);
                for c in 0..2 {
                    assert_eq!(v[c], image[[x, y, c]]);
                }
            }
        }
    }

    #[test]
    fn midpoint_is_average_of_neighbours() {
        let image = ramp(4, 4, 1);
        for x in 0..3 {
            let mid = ContinuousSampler::sample(&image, x as f32 + 0.5, 2.0)[0];
            let avg = (image[[x, 2, 0]] + image[[x + 1, 2, 0]]) / 2.0;
            assert!(close(mid, avg), "{} vs {}", mid, avg);
        }
    }

    #[test]
    fn linear_between_integer_columns() {
        let image = ramp(4, 4, 1);
        let a = ContinuousSampler::sample(&image, 1.0, 1.0)[0];
        let b = ContinuousSampler::sample(&image, 2.0, 1.0)[0];
        for t in [0.1f32, 0.25, 0.6, 0.9] {
            let v = ContinuousSampler::sample(&image, 1.0 + t, 1.0)[0];
            assert!(close(v, a + (b - a) * t));
        }
    }

    #[test]
    fn clamps_to_edge_past_the_boundary() {
        let image = ramp(4, 3, 2);
        let far = ContinuousSampler::sample(&image, 4.0 + 5.0, 3.0 + 5.0);
        let corner = ContinuousSampler::sample(&image, 3.0, 2.0);
        assert_eq!(far, corner);

        let before = ContinuousSampler::sample(&image, -7.25, -0.5);
        let origin = ContinuousSampler::sample(&image, 0.0, 0.0);
        assert_eq!(before, origin);
    }

    #[test]
    fn tap_weights_sum_to_one() {
        let image = ramp(3, 3, 1);
        for &(x, y) in &[(0.3f32, 1.7f32), (2.9, 0.1), (-1.0, 5.5), (1.0, 1.0)] {
            let sum: f32 = ContinuousSampler::taps(&image, x, y)
                .iter()
                .map(|t| t.weight)
                .sum();
            assert!(close(sum, 1.0));
        }
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let image = Array3::from_shape_fn((4, 4, 1), |(x, y, _)| ((x * 7 + y * 3) % 5) as f32);
        let h = 1e-2;
        for &(x, y) in &[(0.3f32, 0.6f32), (1.4, 2.2), (2.7, 0.45)] {
            let g = ContinuousSampler::sample_with_grad(&image, x, y);
            let v = ContinuousSampler::sample(&image, x, y);
            assert!(close(g.value[0], v[0]));

            let fd_x = (ContinuousSampler::sample(&image, x + h, y)[0]
                - ContinuousSampler::sample(&image, x - h, y)[0])
                / (2.0 * h);
            let fd_y = (ContinuousSampler::sample(&image, x, y + h)[0]
                - ContinuousSampler::sample(&image, x, y - h)[0])
                / (2.0 * h);
            assert!((g.d_dx[0] - fd_x).abs() < 1e-2, "{} vs {}", g.d_dx[0], fd_x);
            assert!((g.d_dy[0] - fd_y).abs() < 1e-2, "{} vs {}", g.d_dy[0], fd_y);
        }
    }

    #[test]
    fn gradient_vanishes_outside_the_image() {
        let image = ramp(3, 3, 1);
        let g = ContinuousSampler::sample_with_grad(&image, 10.3, 12.8);
        assert_eq!(g.d_dx[0], 0.0);
        assert_eq!(g.d_dy[0], 0.0);
    }
}
