//! The glimpse recurrence driver.
//!
//! Starting from the full-image window and an initial state, each iteration
//! samples a grid at the current location, feeds it through a
//! [`GlimpseStep`] and replaces `(state, location)` with its outputs. The
//! location proposed by the last iteration is never consumed.
use log::{debug, info};
use rayon::prelude::*;
use serde_derive::Serialize;

use crate::error::{GlimpseError, Result};
use crate::grid::{check_image, GridBuilder, Location};
use crate::sampler::Image;
use crate::step::{FeatureExtractor, GlimpseStep, RecurrentUnit};

/// Everything a single run visited, for inspection and debugging.
#[derive(Debug, Clone, Serialize)]
pub struct GlimpseTrace<S> {
    #[serde(skip)]
    pub state: S,
    /// The `num_iterations` windows that were sampled, in order.
    pub locations: Vec<Location>,
    /// Proposal emitted by the final step, discarded by the loop.
    pub final_proposal: Location,
}

impl<S> GlimpseTrace<S> {
    pub fn locations_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self)
    }
}

pub struct GlimpseLoop<E, R: RecurrentUnit> {
    step: GlimpseStep<E, R>,
    builder: GridBuilder,
    num_iterations: usize,
    initial_state: R::State,
}

impl<E: FeatureExtractor, R: RecurrentUnit> GlimpseLoop<E, R> {
    pub fn new(step: GlimpseStep<E, R>, builder: GridBuilder, num_iterations: usize) -> Result<Self> {
        if num_iterations == 0 {
            return Err(GlimpseError::InvalidIterations);
        }
        let extractor_shape = step.extractor().grid_shape();
        if extractor_shape != builder.shape() {
            return Err(GlimpseError::GridShapeMismatch {
                expected: builder.shape(),
                actual: extractor_shape,
            });
        }
        let initial_state = step.unit().initial_state();
        info!(
            "glimpse loop: {} iterations over {}x{} grids ({:?} coordinates)",
            num_iterations,
            builder.shape().width,
            builder.shape().height,
            builder.convention()
        );
        Ok(GlimpseLoop {
            step,
            builder,
            num_iterations,
            initial_state,
        })
    }

    /// Starts every run from `state` instead of the unit's zero state.
    pub fn with_initial_state(mut self, state: R::State) -> Self {
        self.initial_state = state;
        self
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    pub fn grid_builder(&self) -> &GridBuilder {
        &self.builder
    }

    pub fn glimpse_step(&self) -> &GlimpseStep<E, R> {
        &self.step
    }

    /// Runs all iterations and returns the final recurrent state.
    pub fn run(&self, image: &Image) -> Result<R::State> {
        self.drive(image, |_| {}).map(|(state, _)| state)
    }

    /// Like [`run`](Self::run), also recording every location sampled.
    pub fn run_traced(&self, image: &Image) -> Result<GlimpseTrace<R::State>> {
        let mut locations = Vec::with_capacity(self.num_iterations);
        let (state, final_proposal) = self.drive(image, |l| locations.push(*l))?;
        Ok(GlimpseTrace {
            state,
            locations,
            final_proposal,
        })
    }

    fn drive(&self, image: &Image, mut visit: impl FnMut(&Location)) -> Result<(R::State, Location)> {
        self.check_channels(image)?;
        let mut state = self.initial_state.clone();
        let mut location = Location::full_image();
        for k in 0..self.num_iterations {
            visit(&location);
            let grid = self.builder.build_grid(image, &location)?;
            let out = self.step.step(&state, grid.view())?;
            debug!("glimpse {}/{} at {:?}", k + 1, self.num_iterations, location);
            state = out.state;
            location = out.next_location;
        }
        Ok((state, location))
    }

    fn check_channels(&self, image: &Image) -> Result<()> {
        check_image(image)?;
        let channels = image.dim().2;
        if channels != self.step.extractor().channels() {
            return Err(GlimpseError::shape_mismatch(
                "image channels",
                self.step.extractor().channels(),
                channels,
            ));
        }
        Ok(())
    }
}

impl<E, R> GlimpseLoop<E, R>
where
    E: FeatureExtractor + Sync,
    R: RecurrentUnit + Sync,
    R::State: Send + Sync,
{
    /// Runs independent images in parallel; each image's loop stays sequential.
    pub fn run_batch(&self, images: &[Image]) -> Result<Vec<R::State>> {
        images.par_iter().map(|image| self.run(image)).collect()
    }
}
