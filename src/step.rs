//! A single glimpse state transition and the collaborator contracts it is wired from.
use log::trace;
use ndarray::{Array1, ArrayView1, ArrayView3};

use crate::error::{GlimpseError, Result};
use crate::grid::{GridShape, Location};

/// Number of trailing extractor outputs that form the next location proposal.
pub const LOCATION_PARAMS: usize = 3;

/// Maps a glimpse grid to a feature vector.
///
/// The output is `recurrent_input_size + 3` long: the recurrent input first,
/// then the raw `(x, y, scale)` proposal. Any range limiting of the proposal
/// (keeping `scale > 0` in particular) is the extractor's job.
pub trait FeatureExtractor {
    /// Grid resolution the extractor was sized for.
    fn grid_shape(&self) -> GridShape;
    fn channels(&self) -> usize;
    fn output_size(&self) -> usize;
    fn extract(&self, grid: ArrayView3<f32>) -> Array1<f32>;
}

/// Recurrent update rule: `(input, state) -> new state`.
pub trait RecurrentUnit {
    type State: Clone;

    fn input_size(&self) -> usize;
    /// The "zero" state a glimpse loop starts from unless overridden.
    fn initial_state(&self) -> Self::State;
    fn update(&self, input: ArrayView1<f32>, state: &Self::State) -> Self::State;
}

/// Maps a final recurrent state to the task output.
pub trait OutputHead<S> {
    fn output_size(&self) -> usize;
    fn forward(&self, state: &S) -> Array1<f32>;
}

/// Result of one glimpse step.
#[derive(Debug, Clone)]
pub struct StepOutput<S> {
    pub state: S,
    /// Where the next glimpse should be taken, as proposed by the extractor.
    pub next_location: Location,
}

/// One state transition of the glimpse recurrence.
///
/// Holds no state between calls; everything carried forward goes through the
/// `state` argument and the returned [`StepOutput`].
#[derive(Debug, Clone)]
pub struct GlimpseStep<E, R> {
    extractor: E,
    unit: R,
}

impl<E: FeatureExtractor, R: RecurrentUnit> GlimpseStep<E, R> {
    /// Wires an extractor to a recurrent unit, checking their sizes line up.
    pub fn new(extractor: E, unit: R) -> Result<Self> {
        let expected = unit.input_size() + LOCATION_PARAMS;
        if extractor.output_size() != expected {
            return Err(GlimpseError::shape_mismatch(
                "feature extractor output",
                expected,
                extractor.output_size(),
            ));
        }
        Ok(GlimpseStep { extractor, unit })
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn unit(&self) -> &R {
        &self.unit
    }

    pub fn step(&self, state: &R::State, grid: ArrayView3<f32>) -> Result<StepOutput<R::State>> {
        let features = self.extractor.extract(grid);
        if features.len() != self.extractor.output_size() {
            return Err(GlimpseError::shape_mismatch(
                "extracted features",
                self.extractor.output_size(),
                features.len(),
            ));
        }
        let split = self.unit.input_size();
        let recurrent_input = features.slice(ndarray::s![..split]);
        let location = features.slice(ndarray::s![split..]);
        let next_location = Location::from_slice(&location.to_vec())?;
        trace!("glimpse step proposed {:?}", next_location);

        Ok(StepOutput {
            state: self.unit.update(recurrent_input, state),
            next_location,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, Array3};

    /// Sums the grid into every recurrent slot and proposes a fixed window.
    #[derive(Debug)]
    struct SumExtractor {
        k: usize,
        out: usize,
    }

    impl FeatureExtractor for SumExtractor {
        fn grid_shape(&self) -> GridShape {
            GridShape { width: 2, height: 2 }
        }
        fn channels(&self) -> usize {
            1
        }
        fn output_size(&self) -> usize {
            self.out
        }
        fn extract(&self, grid: ArrayView3<f32>) -> Array1<f32> {
            let mut v = vec![grid.sum(); self.k];
            v.extend_from_slice(&[0.1, 0.2, 0.3]);
            Array1::from(v)
        }
    }

    #[derive(Debug)]
    struct Accumulate(usize);

    impl RecurrentUnit for Accumulate {
        type State = Array1<f32>;
        fn input_size(&self) -> usize {
            self.0
        }
        fn initial_state(&self) -> Array1<f32> {
            Array1::zeros(self.0)
        }
        fn update(&self, input: ArrayView1<f32>, state: &Array1<f32>) -> Array1<f32> {
            state + &input
        }
    }

    #[test]
    fn splits_features_into_input_and_location() {
        let step = GlimpseStep::new(SumExtractor { k: 2, out: 5 }, Accumulate(2)).unwrap();
        let grid = Array3::from_elem((2, 2, 1), 1.0f32);
        let out = step.step(&arr1(&[1.0, 0.0]), grid.view()).unwrap();
        assert_eq!(out.state, arr1(&[5.0, 4.0]));
        assert_eq!(out.next_location, Location::new(0.1, 0.2, 0.3));
    }

    #[test]
    fn mismatched_wiring_fails_at_construction() {
        let err = GlimpseStep::new(SumExtractor { k: 2, out: 5 }, Accumulate(3)).unwrap_err();
        assert!(matches!(
            err,
            GlimpseError::ShapeMismatch {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn extractor_breaking_its_declared_size_is_caught() {
        // declares 5 outputs but emits k + 3 = 4
        let step = GlimpseStep::new(SumExtractor { k: 1, out: 5 }, Accumulate(2)).unwrap();
        let grid = Array3::from_elem((2, 2, 1), 1.0f32);
        assert!(step.step(&arr1(&[0.0, 0.0]), grid.view()).is_err());
    }
}
