use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;

use crate::error::{GlimpseError, Result};

/// A standard fully connected layer with bias term
///
/// Weights are drawn uniformly from `[-1/sqrt(input_size), 1/sqrt(input_size)]`
/// and biases start at zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Dense {
    /// `(output_size, input_size)`
    w: Array2<f32>,
    b: Array1<f32>,
}

impl Dense {
    pub fn new<R: Rng>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (input_size.max(1) as f32).sqrt();
        Dense {
            w: Array2::from_shape_fn((output_size, input_size), |_| rng.gen_range(-bound..bound)),
            b: Array1::zeros(output_size),
        }
    }

    /// Wraps existing `(output_size, input_size)` weights and their bias.
    pub fn from_parts(w: Array2<f32>, b: Array1<f32>) -> Result<Self> {
        if w.nrows() != b.len() {
            return Err(GlimpseError::shape_mismatch("dense bias", w.nrows(), b.len()));
        }
        Ok(Dense { w, b })
    }

    pub fn input_size(&self) -> usize {
        self.w.ncols()
    }

    pub fn output_size(&self) -> usize {
        self.w.nrows()
    }

    /// `activation(W x + b)`
    ///
    /// `activation` is a function which takes a pre-activation value and
    /// applies an activation function such as sigmoid.
    pub fn forward(&self, input: ArrayView1<f32>, activation: &dyn Fn(f32) -> f32) -> Array1<f32> {
        let mut out = self.w.dot(&input) + &self.b;
        out.mapv_inplace(activation);
        out
    }

    /// `W x` without bias or activation, for summing several projections.
    pub fn project(&self, input: ArrayView1<f32>) -> Array1<f32> {
        self.w.dot(&input)
    }
}
