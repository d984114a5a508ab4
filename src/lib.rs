//! Glimpse RNN: recurrent visual attention over a continuous image space.
//! Instead of reading a whole image at once, the model repeatedly picks a window
//! `(x, y, scale)`, bilinearly samples a fixed-resolution grid inside it, folds the
//! grid into a recurrent state and lets that state choose the next window. After a
//! fixed number of glimpses the state is handed to an output head.
//!
//! Sampling is differentiable in the window coordinates (see
//! [`ContinuousSampler::sample_with_grad`] and [`GridBuilder::location_vjp`]) so a
//! learned location policy can be trained through it.

pub mod activations;
pub mod cells;
pub mod config;
pub mod error;
pub mod glimpse_loop;
pub mod grid;
pub mod layers;
pub mod sampler;
pub mod step;

use log::info;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

pub use cells::{DenseExtractor, ElmanCell, GruCell, ReferenceCell, SoftmaxHead};
pub use config::{CellKind, CoordinateConvention, GlimpseConfig, LoggingConfig, ScalePolicy};
pub use error::{GlimpseError, Result};
pub use glimpse_loop::{GlimpseLoop, GlimpseTrace};
pub use grid::{GridBuilder, GridShape, Location, LocationGrad};
pub use sampler::{ContinuousSampler, Image, SampleGrad, Tap};
pub use step::{FeatureExtractor, GlimpseStep, OutputHead, RecurrentUnit, StepOutput};

/// Routes the `log` facade to stderr or to the configured file.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = config.level_filter()?;
    match &config.file {
        Some(path) => simple_logging::log_to_file(path, level)?,
        None => simple_logging::log_to_stderr(level),
    }
    Ok(())
}

//===========================
//----CONTINUOUS_SPACE_RNN----
//===========================
/// A glimpse loop plus the output head consuming its final state.
///
/// NOTE: the loop itself never computes a task output; the head only ever sees
/// the state left after the last glimpse.
pub struct ContinuousSpaceRnn<E, R: RecurrentUnit, H> {
    glimpses: GlimpseLoop<E, R>,
    head: H,
}

/// The model [`ContinuousSpaceRnn::from_config`] builds.
pub type ReferenceModel = ContinuousSpaceRnn<DenseExtractor, ReferenceCell, SoftmaxHead>;

impl<E, R, H> ContinuousSpaceRnn<E, R, H>
where
    E: FeatureExtractor,
    R: RecurrentUnit,
    H: OutputHead<R::State>,
{
    pub fn new(glimpses: GlimpseLoop<E, R>, head: H) -> Self {
        ContinuousSpaceRnn { glimpses, head }
    }

    pub fn glimpses(&self) -> &GlimpseLoop<E, R> {
        &self.glimpses
    }

    pub fn head(&self) -> &H {
        &self.head
    }

    /// Runs every glimpse and maps the final state through the head.
    pub fn forward(&self, image: &Image) -> Result<Array1<f32>> {
        let state = self.glimpses.run(image)?;
        Ok(self.head.forward(&state))
    }

    /// Index of the largest head output.
    pub fn classify(&self, image: &Image) -> Result<usize> {
        let output = self.forward(image)?;
        Ok(argmax(&output))
    }
}

impl<E, R, H> ContinuousSpaceRnn<E, R, H>
where
    E: FeatureExtractor + Sync,
    R: RecurrentUnit + Sync,
    R::State: Send + Sync,
    H: OutputHead<R::State> + Sync,
{
    pub fn forward_batch(&self, images: &[Image]) -> Result<Vec<Array1<f32>>> {
        images.par_iter().map(|image| self.forward(image)).collect()
    }
}

impl ReferenceModel {
    /// Builds the reference extractor/cell/head stack described by `config`.
    ///
    /// Every weight comes from a `StdRng` seeded with `config.model.seed`, so two
    /// models built from the same config are identical.
    ///
    ///# PARAMETERS:
    ///
    /// * config: validated before anything is built; the recurrent input width
    ///   equals `hidden_size`
    pub fn from_config(config: &GlimpseConfig) -> Result<Self> {
        config.validate()?;
        let shape = config.grid_shape()?;
        let model = &config.model;
        let mut rng = StdRng::seed_from_u64(model.seed);

        let extractor = DenseExtractor::new(
            shape,
            model.channels,
            model.hidden_size,
            model.hidden_size,
            config.scale.transform,
            config.scale.min_scale,
            &mut rng,
        );
        let cell = match model.cell {
            CellKind::Elman => ReferenceCell::Elman(ElmanCell::new(model.hidden_size, model.hidden_size, &mut rng)),
            CellKind::Gru => ReferenceCell::Gru(GruCell::new(model.hidden_size, model.hidden_size, &mut rng)),
        };
        let head = SoftmaxHead::new(model.hidden_size, model.num_classes, &mut rng);

        let builder = GridBuilder::new(shape, config.grid.coordinate_convention, config.scale.policy());
        let glimpses = GlimpseLoop::new(GlimpseStep::new(extractor, cell)?, builder, config.num_iterations)?;
        info!(
            "built {:?} glimpse model: hidden {}, {} classes, seed {}",
            model.cell, model.hidden_size, model.num_classes, model.seed
        );
        Ok(ContinuousSpaceRnn::new(glimpses, head))
    }
}

fn argmax(v: &Array1<f32>) -> usize {
    v.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &x)| if x > bv { (i, x) } else { (bi, bv) })
        .0
}

#[cfg(test)]
mod tests {
    use crate::*;
    use ndarray::{arr2, Array1, Array3, Axis};

    fn small_config(cell: CellKind) -> GlimpseConfig {
        let mut config = GlimpseConfig::default();
        config.num_iterations = 4;
        config.grid.width = 3;
        config.grid.height = 3;
        config.model.hidden_size = 12;
        config.model.num_classes = 5;
        config.model.cell = cell;
        config.model.seed = 11;
        config
    }

    fn test_images() -> Vec<Image> {
        (0..6)
            .map(|k| Array3::from_shape_fn((10, 8, 1), |(x, y, _)| ((x * (k + 1) + y * 3) % 7) as f32 / 7.0))
            .collect()
    }

    #[test]
    fn bright_square_end_to_end_glimpse() {
        let image: Image = arr2(&[
            [0.0f32, 0.0, 0.0, 0.0],
            [0.0, 1.0, 1.0, 0.0],
            [0.0, 1.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0],
        ])
        .insert_axis(Axis(2));
        let builder = GridBuilder::new(
            GridShape::new(2, 2).unwrap(),
            CoordinateConvention::Normalized,
            ScalePolicy::default(),
        );
        let location = Location::new(0.25, 0.25, 0.5);
        let (xs, ys) = builder.sample_points(&image, &location).unwrap();
        assert_eq!(xs, vec![1.0, 2.0]);
        assert_eq!(ys, vec![1.0, 2.0]);
        let grid = builder.build_grid(&image, &location).unwrap();
        assert!(grid.iter().all(|v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn reference_model_outputs_distributions() {
        for cell in [CellKind::Elman, CellKind::Gru] {
            let model = ReferenceModel::from_config(&small_config(cell)).unwrap();
            for image in test_images() {
                let p = model.forward(&image).unwrap();
                assert_eq!(p.len(), 5);
                assert!((p.sum() - 1.0).abs() < 1e-5);
                assert!(model.classify(&image).unwrap() < 5);
            }
        }
    }

    #[test]
    fn same_seed_same_bits() {
        let config = small_config(CellKind::Gru);
        let a = ReferenceModel::from_config(&config).unwrap();
        let b = ReferenceModel::from_config(&config).unwrap();
        for image in test_images() {
            let pa = a.forward(&image).unwrap();
            let pb = b.forward(&image).unwrap();
            let bits = |p: &Array1<f32>| p.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
            assert_eq!(bits(&pa), bits(&pb));
            assert_eq!(
                a.glimpses().run_traced(&image).unwrap().locations,
                b.glimpses().run_traced(&image).unwrap().locations
            );
        }
    }

    #[test]
    fn batch_matches_serial() {
        let model = ReferenceModel::from_config(&small_config(CellKind::Elman)).unwrap();
        let images = test_images();
        let batch = model.forward_batch(&images).unwrap();
        for (image, p) in images.iter().zip(batch.iter()) {
            assert_eq!(&model.forward(image).unwrap(), p);
        }
        let states = model.glimpses().run_batch(&images).unwrap();
        assert_eq!(states.len(), images.len());
    }

    #[test]
    fn learned_locations_stay_legal() {
        let model = ReferenceModel::from_config(&small_config(CellKind::Gru)).unwrap();
        let trace = model.glimpses().run_traced(&test_images()[2]).unwrap();
        assert_eq!(trace.locations.len(), 4);
        assert_eq!(trace.locations[0], Location::full_image());
        for l in trace.locations.iter().skip(1).chain(std::iter::once(&trace.final_proposal)) {
            assert!(l.scale >= 0.05 && l.scale <= 1.0);
            assert!(l.x > 0.0 && l.x < 1.0 && l.y > 0.0 && l.y < 1.0);
        }
    }

    #[test]
    fn wrong_channel_count_is_rejected() {
        let model = ReferenceModel::from_config(&small_config(CellKind::Gru)).unwrap();
        let rgb = Array3::zeros((6, 6, 3));
        assert!(matches!(
            model.forward(&rgb),
            Err(GlimpseError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn argmax_picks_first_maximum() {
        assert_eq!(argmax(&Array1::from(vec![0.1, 0.7, 0.7, 0.2])), 1);
    }
}
