//! Runs an untrained reference model over a few synthetic images and prints
//! where it looked.
//!
//! cargo run --example glimpse_demo -- demos/glimpse.toml
use glimpse_rnn::{init_logging, GlimpseConfig, Image, ReferenceModel};
use ndarray::Array3;

/// 28x28 image with a bright square whose corner is at `(x, y)`
fn square_at(x: usize, y: usize) -> Image {
    Array3::from_shape_fn((28, 28, 1), |(i, j, _)| {
        if (x..x + 8).contains(&i) && (y..y + 8).contains(&j) {
            1.0
        } else {
            0.0
        }
    })
}

fn main() -> anyhow::Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => GlimpseConfig::from_file(path)?,
        None => GlimpseConfig::default(),
    };
    init_logging(&config.logging)?;

    let model = ReferenceModel::from_config(&config)?;
    let images = vec![square_at(2, 2), square_at(18, 4), square_at(10, 10), square_at(4, 19)];

    for (image, probs) in images.iter().zip(model.forward_batch(&images)?) {
        let trace = model.glimpses().run_traced(image)?;
        println!("glimpses: {}", trace.locations_json()?);
        println!("class probabilities: {}", probs);
    }
    Ok(())
}
