pub mod architecture;
pub mod loss;

use crate::error::WideDeepError;
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid, tanh};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Which sub-networks are active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    /// Linear model over the wide input only
    WideOnly,
    /// Embedding + MLP with its own output layer
    DeepOnly,
    /// Raw wide vector concatenated with the last hidden layer, then projected
    WideAndDeep,
}

impl Topology {
    /// Pick the topology from the two branch flags
    pub fn from_flags(use_wide: bool, use_deep: bool) -> crate::error::Result<Self> {
        match (use_wide, use_deep) {
            (true, true) => Ok(Topology::WideAndDeep),
            (true, false) => Ok(Topology::WideOnly),
            (false, true) => Ok(Topology::DeepOnly),
            (false, false) => Err(WideDeepError::config(
                "at least one of use_wide and use_deep must be enabled",
            )),
        }
    }

    /// Whether the deep tower is built
    pub fn has_deep(&self) -> bool {
        !matches!(self, Topology::WideOnly)
    }
}

macro_rules! named_kind {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Identifier used in configuration files
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = WideDeepError;

            fn from_str(s: &str) -> crate::error::Result<Self> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(WideDeepError::config(format!(
                        "unknown {} `{}`",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

named_kind! {
    /// Training objective
    LossKind {
        LogLoss => "logloss",
        Mse => "mse",
    }
}

named_kind! {
    /// Metric reported each epoch and by `evaluate`
    MetricKind {
        Auc => "auc",
        Accuracy => "accuracy",
        LogLoss => "logloss",
        Rmse => "rmse",
    }
}

named_kind! {
    /// Gradient-based optimizer
    OptimizerKind {
        Adam => "adam",
        Adagrad => "adagrad",
        Gd => "gd",
        Momentum => "momentum",
        RmsProp => "rmsprop",
    }
}

named_kind! {
    /// Nonlinearity applied after every deep hidden layer
    Activation {
        Relu => "relu",
        Sigmoid => "sigmoid",
        Tanh => "tanh",
        Identity => "identity",
    }
}

impl Activation {
    /// Apply the nonlinearity
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Activation::Relu => relu(x),
            Activation::Sigmoid => sigmoid(x),
            Activation::Tanh => tanh(x),
            Activation::Identity => x,
        }
    }
}

/// Model and training configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Embedding width per categorical field
    #[config(default = 8)]
    pub embedding_size: usize,

    /// Widths of the deep hidden layers
    #[config(default = "vec![32, 32]")]
    pub deep_layers: Vec<usize>,

    /// Dropout rates (input + one per layer). Recorded but not applied.
    #[config(default = "vec![0.5, 0.5, 0.5]")]
    pub dropout_deep: Vec<f64>,

    /// Hidden-layer nonlinearity
    #[config(default = "Activation::Relu")]
    pub activation: Activation,

    /// Passes over the training set
    #[config(default = 10)]
    pub epochs: usize,

    /// Rows per gradient step
    #[config(default = 128)]
    pub batch_size: usize,

    #[config(default = 0.001)]
    pub learning_rate: f64,

    #[config(default = "OptimizerKind::Adam")]
    pub optimizer: OptimizerKind,

    /// Seed for parameter initialization
    #[config(default = 2018)]
    pub seed: u64,

    #[config(default = "LossKind::LogLoss")]
    pub loss: LossKind,

    #[config(default = "MetricKind::Auc")]
    pub metric: MetricKind,

    /// L2 coefficient on the deep hidden layers
    #[config(default = 0.0)]
    pub l2_reg: f64,

    #[config(default = true)]
    pub use_wide: bool,

    #[config(default = true)]
    pub use_deep: bool,
}

impl ModelConfig {
    /// Small configuration for quick runs
    pub fn quick() -> Self {
        Self::new()
            .with_embedding_size(4)
            .with_deep_layers(vec![16, 16])
            .with_epochs(2)
            .with_batch_size(256)
    }

    /// Check the configuration and resolve the topology
    pub fn validate(&self) -> crate::error::Result<Topology> {
        let topology = Topology::from_flags(self.use_wide, self.use_deep)?;

        if topology.has_deep() {
            if self.deep_layers.is_empty() {
                return Err(WideDeepError::config(
                    "deep_layers must have at least one entry when the deep branch is active",
                ));
            }
            if self.deep_layers.contains(&0) {
                return Err(WideDeepError::config("deep layer widths must be positive"));
            }
            if self.embedding_size == 0 {
                return Err(WideDeepError::config("embedding_size must be positive"));
            }
            if self.dropout_deep.len() != self.deep_layers.len() + 1 {
                warn!(
                    "dropout_deep has {} entries, expected {}; dropout is not applied",
                    self.dropout_deep.len(),
                    self.deep_layers.len() + 1
                );
            }
        }
        if self.batch_size == 0 {
            return Err(WideDeepError::config("batch_size must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(WideDeepError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if !(self.l2_reg.is_finite() && self.l2_reg >= 0.0) {
            return Err(WideDeepError::config(format!(
                "l2_reg must be non-negative, got {}",
                self.l2_reg
            )));
        }

        Ok(topology)
    }
}
