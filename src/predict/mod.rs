use crate::data::feature_engineering::CrossBuilder;
use crate::data::preprocessing::ModelInputs;
use crate::data::{CategoryIndex, FeatureSpec, Matrix, Table};
use crate::error::{Result, WideDeepError};
use crate::model::architecture::{tensor_to_vec, WideDeepModel};
use crate::model::loss::metrics;
use crate::model::MetricKind;
use burn::tensor::backend::Backend;
use tracing::{debug, info};

/// Scores new rows with a trained model
#[derive(Debug, Clone)]
pub struct Predictor<B: Backend> {
    model: WideDeepModel<B>,
    spec: FeatureSpec,
    metric: MetricKind,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Create new predictor
    pub fn new(model: WideDeepModel<B>, spec: FeatureSpec, metric: MetricKind, device: B::Device) -> Self {
        Self {
            model,
            spec,
            metric,
            device,
        }
    }

    pub fn model(&self) -> &WideDeepModel<B> {
        &self.model
    }

    pub fn spec(&self) -> &FeatureSpec {
        &self.spec
    }

    /// Metric used by `evaluate`
    pub fn metric(&self) -> MetricKind {
        self.metric
    }

    /// Build model inputs for a new table.
    ///
    /// Cross features are rebuilt from `table` with a fresh encoder, so their
    /// codes are only comparable with training codes on the integer path.
    pub fn prepare(&self, table: &Table, category_index: CategoryIndex) -> Result<ModelInputs> {
        let cross = CrossBuilder::from_spec(&self.spec).build(table)?;
        ModelInputs::from_table(&self.spec, table, &cross, category_index)
    }

    /// One unbatched forward pass over raw matrices.
    ///
    /// Returns probabilities for log-loss models and raw scores otherwise.
    pub fn predict(&self, wide: &Matrix, deep: &Matrix, category_index: &CategoryIndex) -> Result<Vec<f32>> {
        let inputs = ModelInputs::new(&self.spec, wide.clone(), deep.clone(), category_index.clone())?;
        self.predict_inputs(&inputs)
    }

    /// Score prepared inputs
    pub fn predict_inputs(&self, inputs: &ModelInputs) -> Result<Vec<f32>> {
        let tensors = self.model.input_tensors(inputs, "predict", &self.device)?;
        let scores = tensor_to_vec(self.model.scores(&tensors)?)?;
        debug!("Scored {} rows", scores.len());
        Ok(scores)
    }

    /// Predict, then compute the configured metric against `labels`
    pub fn evaluate(
        &self,
        wide: &Matrix,
        deep: &Matrix,
        category_index: &CategoryIndex,
        labels: &[f32],
    ) -> Result<f64> {
        let scores = self.predict(wide, deep, category_index)?;
        metrics::evaluate(self.metric, labels, &scores)
    }

    /// `evaluate` on prepared inputs
    pub fn evaluate_inputs(&self, inputs: &ModelInputs, labels: &[f32]) -> Result<f64> {
        if labels.len() != inputs.num_rows() {
            return Err(WideDeepError::shape("evaluate", "label rows", inputs.num_rows(), labels.len()));
        }
        let scores = self.predict_inputs(inputs)?;
        metrics::evaluate(self.metric, labels, &scores)
    }

    /// Prepare a raw table and evaluate it
    pub fn evaluate_table(&self, table: &Table, category_index: CategoryIndex, labels: &[f32]) -> Result<f64> {
        let inputs = self.prepare(table, category_index)?;
        let value = self.evaluate_inputs(&inputs, labels)?;
        info!("{} rows, {}={:.4}", inputs.num_rows(), self.metric, value);
        Ok(value)
    }
}
