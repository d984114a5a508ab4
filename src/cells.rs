//! Reference collaborators: a dense feature extractor, two recurrent cells
//! and a softmax head. Any other implementation of the traits in
//! [`crate::step`] can be wired in their place.
use ndarray::{Array1, ArrayView1, ArrayView3};
use rand::Rng;

use crate::activations::{self, scale_transform, ScaleTransform};
use crate::grid::GridShape;
use crate::layers::Dense;
use crate::step::{FeatureExtractor, OutputHead, RecurrentUnit, LOCATION_PARAMS};

/// Flattened grid → tanh hidden layer → linear layer of `features + 3`.
///
/// The trailing three outputs are squashed into a location: sigmoid for
/// `x`/`y` so the window corner stays inside the image, and the configured
/// [`ScaleTransform`] for `scale`.
pub struct DenseExtractor {
    grid_shape: GridShape,
    channels: usize,
    hidden: Dense,
    out: Dense,
    scale: Box<dyn Fn(f32) -> f32 + Send + Sync>,
}

impl DenseExtractor {
    pub fn new<R: Rng>(
        grid_shape: GridShape,
        channels: usize,
        hidden_size: usize,
        features: usize,
        transform: ScaleTransform,
        min_scale: f32,
        rng: &mut R,
    ) -> Self {
        let input_size = grid_shape.cells() * channels;
        DenseExtractor {
            grid_shape,
            channels,
            hidden: Dense::new(input_size, hidden_size, rng),
            out: Dense::new(hidden_size, features + LOCATION_PARAMS, rng),
            scale: scale_transform(transform, min_scale),
        }
    }
}

impl FeatureExtractor for DenseExtractor {
    fn grid_shape(&self) -> GridShape {
        self.grid_shape
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn output_size(&self) -> usize {
        self.out.output_size()
    }

    fn extract(&self, grid: ArrayView3<f32>) -> Array1<f32> {
        let flat: Array1<f32> = grid.iter().cloned().collect();
        let hidden = self.hidden.forward(flat.view(), &activations::tanh);
        let mut out = self.out.forward(hidden.view(), &activations::identity);
        let n = out.len();
        out[n - 3] = activations::sigmoid(out[n - 3]);
        out[n - 2] = activations::sigmoid(out[n - 2]);
        out[n - 1] = (self.scale)(out[n - 1]);
        out
    }
}

/// `h' = tanh(W x + U h + b)`
#[derive(Debug, Clone)]
pub struct ElmanCell {
    input: Dense,
    recurrent: Dense,
}

impl ElmanCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        ElmanCell {
            input: Dense::new(input_size, hidden_size, rng),
            recurrent: Dense::new(hidden_size, hidden_size, rng),
        }
    }
}

impl RecurrentUnit for ElmanCell {
    type State = Array1<f32>;

    fn input_size(&self) -> usize {
        self.input.input_size()
    }

    fn initial_state(&self) -> Array1<f32> {
        Array1::zeros(self.recurrent.output_size())
    }

    fn update(&self, input: ArrayView1<f32>, state: &Array1<f32>) -> Array1<f32> {
        let mut h = self.input.forward(input, &activations::identity)
            + self.recurrent.project(state.view());
        h.mapv_inplace(activations::tanh);
        h
    }
}

/// Gated recurrent unit.
///
/// ```text
/// z  = sigmoid(Wz x + Uz h + bz)
/// r  = sigmoid(Wr x + Ur h + br)
/// h~ = tanh(Wh x + Uh (r * h) + bh)
/// h' = (1 - z) * h + z * h~
/// ```
#[derive(Debug, Clone)]
pub struct GruCell {
    wz: Dense,
    uz: Dense,
    wr: Dense,
    ur: Dense,
    wh: Dense,
    uh: Dense,
}

impl GruCell {
    pub fn new<R: Rng>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        GruCell {
            wz: Dense::new(input_size, hidden_size, rng),
            uz: Dense::new(hidden_size, hidden_size, rng),
            wr: Dense::new(input_size, hidden_size, rng),
            ur: Dense::new(hidden_size, hidden_size, rng),
            wh: Dense::new(input_size, hidden_size, rng),
            uh: Dense::new(hidden_size, hidden_size, rng),
        }
    }
}

impl RecurrentUnit for GruCell {
    type State = Array1<f32>;

    fn input_size(&self) -> usize {
        self.wz.input_size()
    }

    fn initial_state(&self) -> Array1<f32> {
        Array1::zeros(self.uz.output_size())
    }

    fn update(&self, input: ArrayView1<f32>, state: &Array1<f32>) -> Array1<f32> {
        let gate = |w: &Dense, u: &Dense, h: ArrayView1<f32>, act: fn(f32) -> f32| {
            let mut g = w.forward(input, &activations::identity) + u.project(h);
            g.mapv_inplace(act);
            g
        };
        let z = gate(&self.wz, &self.uz, state.view(), activations::sigmoid);
        let r = gate(&self.wr, &self.ur, state.view(), activations::sigmoid);
        let reset = &r * state;
        let candidate = gate(&self.wh, &self.uh, reset.view(), activations::tanh);
        z.mapv(|z| 1.0 - z) * state + &z * &candidate
    }
}

/// Either reference cell, so a config file can pick one at runtime.
#[derive(Debug, Clone)]
pub enum ReferenceCell {
    Elman(ElmanCell),
    Gru(GruCell),
}

impl RecurrentUnit for ReferenceCell {
    type State = Array1<f32>;

    fn input_size(&self) -> usize {
        match self {
            ReferenceCell::Elman(c) => c.input_size(),
            ReferenceCell::Gru(c) => c.input_size(),
        }
    }

    fn initial_state(&self) -> Array1<f32> {
        match self {
            ReferenceCell::Elman(c) => c.initial_state(),
            ReferenceCell::Gru(c) => c.initial_state(),
        }
    }

    fn update(&self, input: ArrayView1<f32>, state: &Array1<f32>) -> Array1<f32> {
        match self {
            ReferenceCell::Elman(c) => c.update(input, state),
            ReferenceCell::Gru(c) => c.update(input, state),
        }
    }
}

/// Dense projection of the hidden state followed by softmax.
#[derive(Debug, Clone)]
pub struct SoftmaxHead {
    layer: Dense,
}

impl SoftmaxHead {
    pub fn new<R: Rng>(hidden_size: usize, num_classes: usize, rng: &mut R) -> Self {
        SoftmaxHead {
            layer: Dense::new(hidden_size, num_classes, rng),
        }
    }
}

impl OutputHead<Array1<f32>> for SoftmaxHead {
    fn output_size(&self) -> usize {
        self.layer.output_size()
    }

    fn forward(&self, state: &Array1<f32>) -> Array1<f32> {
        let mut logits = self.layer.forward(state.view(), &activations::identity);
        if let Some(v) = logits.as_slice_mut() {
            activations::softmax(v);
        }
        logits
    }
}
