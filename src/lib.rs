//! # wide-deep: Wide & Deep learning
//!
//! A linear ("wide") model over raw and crossed categorical features, trained
//! jointly with a feed-forward ("deep") network over embeddings of the
//! categorical features concatenated with the continuous ones.
//!
//! ## Features
//!
//! - Cross-feature construction with label encoding
//! - Shared embedding table indexed by a pluggable `FeatureIndexer`
//! - Wide-only, deep-only or combined topologies
//! - Adam, AdaGrad, SGD, momentum and RMSProp optimizers
//! - AUC, accuracy, log-loss and RMSE evaluation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use wide_deep::data::loader::{load_labels, TableLoader};
//! use wide_deep::data::preprocessing::{FeatureDictionary, FeatureIndexer};
//! use wide_deep::data::FeatureSpec;
//! use wide_deep::model::ModelConfig;
//! use wide_deep::training::trainer::Trainer;
//! use wide_deep::TrainingBackend;
//!
//! let loader = TableLoader::new();
//! let train = loader.load("data/train.csv").unwrap();
//! let test = loader.load("data/test.csv").unwrap();
//! let y_train = load_labels("data/y_train.csv").unwrap();
//!
//! let spec = FeatureSpec::new(["age", "hours_per_week"], ["education", "occupation"])
//!     .unwrap()
//!     .with_cross([["education", "occupation"]])
//!     .unwrap();
//!
//! let mut dictionary = FeatureDictionary::new(&spec);
//! let vocabulary = dictionary.build_vocabulary(&train, &test).unwrap();
//! let train_index = dictionary.index(&train).unwrap();
//!
//! let device = Default::default();
//! let mut trainer =
//!     Trainer::<TrainingBackend>::new(spec, ModelConfig::new(), vocabulary, device).unwrap();
//! let result = trainer.fit(train_index, &train, &y_train).unwrap();
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod model;
pub mod predict;
pub mod training;
pub mod utils;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use data::preprocessing::{FeatureDictionary, FeatureIndexer, ModelInputs};
pub use data::{CategoryIndex, CategoryVocabulary, FeatureSpec, Matrix, Table};
pub use error::{Result, WideDeepError};
pub use model::{architecture::WideDeepModel, ModelConfig, Topology};
pub use predict::Predictor;
pub use training::{trainer::Trainer, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!("{} v{} - Wide & Deep learning", NAME, VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("wide-deep"));
        assert!(info_str.contains(VERSION));
    }
}
