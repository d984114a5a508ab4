//activation functions are pure functions that define how each node/neuron is activated
use serde_derive::{Deserialize, Serialize};

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn tanh(x: f32) -> f32 {
    x.tanh()
}

pub fn identity(x: f32) -> f32 {
    x
}

/// In-place softmax, shifted by the max for stability.
pub fn softmax(v: &mut [f32]) {
    let max = v.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for n in v.iter_mut() {
        *n = (*n - max).exp();
        sum += *n;
    }
    for n in v.iter_mut() {
        *n /= sum;
    }
}

/// Range-limiting transform turning a raw network output into a glimpse scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleTransform {
    /// `min + (1 - min) * sigmoid(v)`, always inside `(min, 1)`.
    Sigmoid,
    /// `v.clamp(min, 1)`; zero gradient once saturated.
    Clamp,
    /// No limiting. Leaves legality to the grid builder's scale policy.
    Identity,
}

/// a builder for the scale transform selected in config, so the extractor can
/// hold it as a plain function.
pub fn scale_transform(kind: ScaleTransform, min_scale: f32) -> Box<dyn Fn(f32) -> f32 + Send + Sync> {
    match kind {
        ScaleTransform::Sigmoid => Box::new(move |v| min_scale + (1.0 - min_scale) * sigmoid(v)),
        ScaleTransform::Clamp => Box::new(move |v| v.clamp(min_scale, 1.0)),
        ScaleTransform::Identity => Box::new(identity),
    }
}
//TODO: softplus scale transform, needs an upper bound story since it is unbounded above

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_scale_stays_in_range() {
        let f = scale_transform(ScaleTransform::Sigmoid, 0.1);
        for v in [-1e4f32, -5.0, 0.0, 3.0, 1e4] {
            let s = f(v);
            assert!(s >= 0.1 && s <= 1.0, "{} -> {}", v, s);
        }
        assert!((f(0.0) - 0.55).abs() < 1e-6);
    }

    #[test]
    fn clamp_and_identity() {
        let clamp = scale_transform(ScaleTransform::Clamp, 0.2);
        assert_eq!(clamp(-3.0), 0.2);
        assert_eq!(clamp(0.5), 0.5);
        assert_eq!(clamp(7.0), 1.0);
        let id = scale_transform(ScaleTransform::Identity, 0.2);
        assert_eq!(id(-3.0), -3.0);
    }

    #[test]
    fn softmax_normalizes() {
        let mut v = [1.0f32, 2.0, 3.0, 1000.0];
        softmax(&mut v);
        assert!((v.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(v[3] > 0.99);
    }
}
