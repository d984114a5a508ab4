//! Construction-time configuration, loaded from TOML.
//!
//! ```toml
//! num_iterations = 6
//!
//! [grid]
//! width = 8
//! height = 8
//! coordinate_convention = "normalized"
//!
//! [scale]
//! policy = "clamp"
//! min_scale = 0.05
//! transform = "sigmoid"
//!
//! [model]
//! channels = 1
//! hidden_size = 64
//! num_classes = 10
//! cell = "gru"
//! seed = 0
//!
//! [logging]
//! level = "info"
//! ```
use std::fs;
use std::path::Path;

use anyhow::Context;
use log::LevelFilter;
use serde_derive::{Deserialize, Serialize};

use crate::activations::ScaleTransform;
use crate::error::{GlimpseError, Result};
use crate::grid::GridShape;

/// How glimpse locations are expressed at the grid builder boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateConvention {
    /// `x`, `y` are fractions of the image extent.
    Normalized,
    /// `x`, `y` are pixel offsets; `scale` stays a fraction of the image.
    Pixel,
}

impl Default for CoordinateConvention {
    fn default() -> Self {
        CoordinateConvention::Normalized
    }
}

/// What the grid builder does with a scale that is not positive and finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScalePolicy {
    /// Substitute `min_scale` and log a warning.
    Clamp { min_scale: f32 },
    /// Fail with [`GlimpseError::InvalidScale`].
    Reject,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        ScalePolicy::Clamp {
            min_scale: DEFAULT_MIN_SCALE,
        }
    }
}

pub const DEFAULT_MIN_SCALE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalePolicyKind {
    Clamp,
    Reject,
}

/// Which reference recurrent cell [`crate::ContinuousSpaceRnn::from_config`] wires in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Elman,
    Gru,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub width: usize,
    pub height: usize,
    pub coordinate_convention: CoordinateConvention,
}

impl Default for GridConfig {
    fn default() -> Self {
        GridConfig {
            width: 8,
            height: 8,
            coordinate_convention: CoordinateConvention::Normalized,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    pub policy: ScalePolicyKind,
    /// Lower bound used both by the range-limiting transform and by the clamp policy.
    pub min_scale: f32,
    pub transform: ScaleTransform,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        ScaleConfig {
            policy: ScalePolicyKind::Clamp,
            min_scale: DEFAULT_MIN_SCALE,
            transform: ScaleTransform::Sigmoid,
        }
    }
}

impl ScaleConfig {
    pub fn policy(&self) -> ScalePolicy {
        match self.policy {
            ScalePolicyKind::Clamp => ScalePolicy::Clamp {
                min_scale: self.min_scale,
            },
            ScalePolicyKind::Reject => ScalePolicy::Reject,
        }
    }
}

/// Sizes for the reference collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub channels: usize,
    pub hidden_size: usize,
    pub num_classes: usize,
    pub cell: CellKind,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            channels: 1,
            hidden_size: 64,
            num_classes: 10,
            cell: CellKind::Gru,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of `off`, `error`, `warn`, `info`, `debug`, `trace`.
    pub level: String,
    /// Log to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn level_filter(&self) -> Result<LevelFilter> {
        self.level
            .parse()
            .map_err(|_| GlimpseError::Config(format!("unknown log level `{}`", self.level)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlimpseConfig {
    pub num_iterations: usize,
    pub grid: GridConfig,
    pub scale: ScaleConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

impl Default for GlimpseConfig {
    fn default() -> Self {
        GlimpseConfig {
            num_iterations: 6,
            grid: GridConfig::default(),
            scale: ScaleConfig::default(),
            model: ModelConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GlimpseConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: GlimpseConfig =
            toml::from_str(s).map_err(|e| GlimpseError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| GlimpseError::Config(e.to_string()))
    }

    /// Fails fast on anything that would make a forward pass undefined.
    pub fn validate(&self) -> Result<()> {
        if self.num_iterations == 0 {
            return Err(GlimpseError::InvalidIterations);
        }
        self.grid_shape()?;
        if !(self.scale.min_scale > 0.0 && self.scale.min_scale <= 1.0) {
            return Err(GlimpseError::Config(format!(
                "min_scale must lie in (0, 1], got {}",
                self.scale.min_scale
            )));
        }
        if self.model.channels == 0 || self.model.hidden_size == 0 || self.model.num_classes == 0 {
            return Err(GlimpseError::Config(
                "model channels, hidden_size and num_classes must be positive".to_string(),
            ));
        }
        self.logging.level_filter()?;
        Ok(())
    }

    pub fn grid_shape(&self) -> Result<GridShape> {
        GridShape::new(self.grid.width, self.grid.height)
    }
}
