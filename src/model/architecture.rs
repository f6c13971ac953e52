use crate::data::preprocessing::ModelInputs;
use crate::data::{CategoryVocabulary, FeatureSpec};
use crate::error::{Result, WideDeepError};
use crate::model::loss::data_loss;
use crate::model::{Activation, LossKind, ModelConfig, Topology};
use crate::utils::random::{glorot_std, normal_vector};
use burn::module::{Ignored, Param};
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::TensorData;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

/// Std of the embedding table initializer
pub const EMBEDDING_INIT_STD: f64 = 0.01;

/// Constant initial bias of the wide + deep projection
pub const PROJECTION_BIAS_INIT: f32 = 0.01;

/// Feature-size bookkeeping fixed at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSizes {
    /// Continuous columns
    pub continuous: usize,
    /// Wide input columns (continuous + categorical + crosses)
    pub wide: usize,
    /// Raw deep input columns (continuous + categorical)
    pub deep: usize,
    /// Categorical slots per row
    pub category_field: usize,
    /// Rows of the embedding table
    pub category: usize,
    /// Embedding width
    pub embedding: usize,
}

impl FeatureSizes {
    /// Derive sizes from the feature spec and vocabulary
    pub fn new(spec: &FeatureSpec, vocabulary: &CategoryVocabulary, embedding: usize) -> Self {
        Self {
            continuous: spec.continuous().len(),
            wide: spec.wide_feature_size(),
            deep: spec.deep_feature_size(),
            category_field: vocabulary.category_field_size,
            category: vocabulary.category_size,
            embedding,
        }
    }

    /// Width of the dense vector entering the first hidden layer
    pub fn dense_width(&self) -> usize {
        self.category_field * self.embedding + self.continuous
    }
}

/// Linear layer `[fan_in] -> [fan_out]` holding the given row-major values
fn linear_from_values<B: Backend>(
    weight: Vec<f32>,
    bias: Vec<f32>,
    fan_in: usize,
    fan_out: usize,
    device: &B::Device,
) -> Linear<B> {
    let mut linear = LinearConfig::new(fan_in, fan_out).with_bias(true).init(device);
    linear.weight = Param::from_tensor(Tensor::from_data(TensorData::new(weight, [fan_in, fan_out]), device));
    linear.bias = Some(Param::from_tensor(Tensor::from_data(TensorData::new(bias, [fan_out]), device)));
    linear
}

/// Linear layer with weight and bias both drawn from N(0, std)
pub fn normal_linear<B: Backend>(
    rng: &mut ChaCha8Rng,
    fan_in: usize,
    fan_out: usize,
    std: f64,
    device: &B::Device,
) -> Result<Linear<B>> {
    let weight = normal_vector(rng, fan_in * fan_out, std)?;
    let bias = normal_vector(rng, fan_out, std)?;
    Ok(linear_from_values(weight, bias, fan_in, fan_out, device))
}

/// Linear layer with weight drawn from N(0, std) and a constant bias
pub fn constant_bias_linear<B: Backend>(
    rng: &mut ChaCha8Rng,
    fan_in: usize,
    fan_out: usize,
    std: f64,
    bias: f32,
    device: &B::Device,
) -> Result<Linear<B>> {
    let weight = normal_vector(rng, fan_in * fan_out, std)?;
    Ok(linear_from_values(weight, vec![bias; fan_out], fan_in, fan_out, device))
}

/// `‖W‖² + ‖b‖²`
fn squared_norm<B: Backend>(linear: &Linear<B>) -> Tensor<B, 1> {
    let weight = linear.weight.val();
    let norm = (weight.clone() * weight).sum();
    match &linear.bias {
        Some(bias) => {
            let bias = bias.val();
            norm + (bias.clone() * bias).sum()
        }
        None => norm,
    }
}

/// Shared embedding table followed by the hidden layers
#[derive(Module, Debug)]
pub struct DeepTower<B: Backend> {
    embedding: Option<Embedding<B>>,
    layers: Vec<Linear<B>>,
}

impl<B: Backend> DeepTower<B> {
    fn init(
        sizes: &FeatureSizes,
        widths: &[usize],
        rng: &mut ChaCha8Rng,
        device: &B::Device,
    ) -> Result<Self> {
        let input_width = sizes.dense_width();
        if input_width == 0 {
            return Err(WideDeepError::config(
                "deep branch has no inputs: no continuous features and no categorical fields",
            ));
        }

        let embedding = if sizes.category_field > 0 {
            if sizes.category == 0 {
                return Err(WideDeepError::config(
                    "category_size must be positive when categorical fields are present",
                ));
            }
            let values = normal_vector(rng, sizes.category * sizes.embedding, EMBEDDING_INIT_STD)?;
            let mut embedding = EmbeddingConfig::new(sizes.category, sizes.embedding).init(device);
            embedding.weight = Param::from_tensor(Tensor::from_data(
                TensorData::new(values, [sizes.category, sizes.embedding]),
                device,
            ));
            Some(embedding)
        } else {
            None
        };

        let mut layers = Vec::with_capacity(widths.len());
        let mut fan_in = input_width;
        for &fan_out in widths {
            layers.push(normal_linear(rng, fan_in, fan_out, glorot_std(fan_in, fan_out), device)?);
            fan_in = fan_out;
        }
        debug!("Deep tower: input width {}, layers {:?}", input_width, widths);

        Ok(Self { embedding, layers })
    }

    fn forward(
        &self,
        inputs: &InputTensors<B>,
        sizes: &FeatureSizes,
        activation: Activation,
    ) -> Result<Tensor<B, 2>> {
        let batch = inputs.rows;
        let mut parts = Vec::with_capacity(2);

        if let Some(embedding) = &self.embedding {
            let index = inputs
                .category_index
                .clone()
                .ok_or_else(|| WideDeepError::config("category index tensor is missing"))?;
            // [batch, fields, embedding] flattened per row
            let vectors = embedding.forward(index);
            parts.push(vectors.reshape([batch, sizes.category_field * sizes.embedding]));
        }
        if let Some(continuous) = &inputs.continuous {
            parts.push(continuous.clone());
        }

        let mut x = Tensor::cat(parts, 1);
        for layer in &self.layers {
            x = activation.apply(layer.forward(x));
        }
        Ok(x)
    }

    fn l2_penalty(&self) -> Option<Tensor<B, 1>> {
        self.layers
            .iter()
            .map(squared_norm)
            .reduce(|acc, norm| acc + norm)
    }
}

/// Device tensors for one forward pass
#[derive(Debug, Clone)]
pub struct InputTensors<B: Backend> {
    /// Row count
    pub rows: usize,
    /// `[rows, category_field]`, absent without categorical fields
    pub category_index: Option<Tensor<B, 2, Int>>,
    /// `[rows, |continuous|]`, absent without continuous features
    pub continuous: Option<Tensor<B, 2>>,
    /// `[rows, wide]`
    pub wide: Tensor<B, 2>,
}

/// Wide & Deep model
#[derive(Module, Debug)]
pub struct WideDeepModel<B: Backend> {
    /// Linear model of a wide-only topology
    wide: Option<Linear<B>>,
    deep: Option<DeepTower<B>>,
    /// Deep-only output layer, or the wide + deep projection
    head: Option<Linear<B>>,
    topology: Ignored<Topology>,
    activation: Ignored<Activation>,
    loss: Ignored<LossKind>,
    l2_reg: Ignored<f64>,
    sizes: Ignored<FeatureSizes>,
}

fn part<'a, T>(part: &'a Option<T>, name: &str) -> Result<&'a T> {
    part.as_ref()
        .ok_or_else(|| WideDeepError::config(format!("model was built without its {}", name)))
}

impl<B: Backend> WideDeepModel<B> {
    pub fn topology(&self) -> Topology {
        self.topology.0
    }

    pub fn sizes(&self) -> FeatureSizes {
        self.sizes.0
    }

    pub fn loss_kind(&self) -> LossKind {
        self.loss.0
    }

    pub fn l2_reg(&self) -> f64 {
        self.l2_reg.0
    }

    /// Same parameters with a different L2 coefficient
    pub fn with_l2_reg(mut self, l2_reg: f64) -> Self {
        self.l2_reg = Ignored(l2_reg);
        self
    }

    /// The deep tower, if built
    pub fn deep(&self) -> Option<&DeepTower<B>> {
        self.deep.as_ref()
    }

    /// Check `inputs` against the build-time sizes and move them to `device`
    pub fn input_tensors(
        &self,
        inputs: &ModelInputs,
        stage: &'static str,
        device: &B::Device,
    ) -> Result<InputTensors<B>> {
        let sizes = self.sizes();
        let rows = inputs.num_rows();

        if inputs.wide.cols() != sizes.wide {
            return Err(WideDeepError::shape(stage, "wide input columns", sizes.wide, inputs.wide.cols()));
        }
        if inputs.deep.cols() != sizes.deep {
            return Err(WideDeepError::shape(stage, "deep input columns", sizes.deep, inputs.deep.cols()));
        }
        if inputs.continuous.cols() != sizes.continuous {
            return Err(WideDeepError::shape(
                stage,
                "continuous columns",
                sizes.continuous,
                inputs.continuous.cols(),
            ));
        }

        let uses_index = self.topology().has_deep() && sizes.category_field > 0;
        if uses_index {
            let index = &inputs.category_index;
            if index.cols() != sizes.category_field {
                return Err(WideDeepError::shape(
                    stage,
                    "category index columns",
                    sizes.category_field,
                    index.cols(),
                ));
            }
            if index.rows() != rows {
                return Err(WideDeepError::shape(stage, "category index rows", rows, index.rows()));
            }
            if let Some(bad) = index
                .data()
                .iter()
                .find(|&&id| id < 0 || id as usize >= sizes.category)
            {
                return Err(WideDeepError::data(
                    "category_index",
                    format!(
                        "index {} is outside the vocabulary of {} categories",
                        bad, sizes.category
                    ),
                ));
            }
        }

        let category_index = uses_index.then(|| {
            Tensor::<B, 2, Int>::from_data(
                TensorData::new(inputs.category_index.data().to_vec(), [rows, sizes.category_field]),
                device,
            )
        });
        let continuous = (sizes.continuous > 0).then(|| {
            Tensor::from_data(
                TensorData::new(inputs.continuous.data().to_vec(), [rows, sizes.continuous]),
                device,
            )
        });
        let wide = Tensor::from_data(TensorData::new(inputs.wide.data().to_vec(), [rows, sizes.wide]), device);

        Ok(InputTensors {
            rows,
            category_index,
            continuous,
            wide,
        })
    }

    /// Raw scores `[rows, 1]`
    pub fn forward(&self, inputs: &InputTensors<B>) -> Result<Tensor<B, 2>> {
        let sizes = self.sizes();
        let activation = self.activation.0;

        match self.topology() {
            Topology::WideOnly => Ok(part(&self.wide, "wide layer")?.forward(inputs.wide.clone())),
            Topology::DeepOnly => {
                let hidden = part(&self.deep, "deep tower")?.forward(inputs, &sizes, activation)?;
                Ok(part(&self.head, "output layer")?.forward(hidden))
            }
            Topology::WideAndDeep => {
                let hidden = part(&self.deep, "deep tower")?.forward(inputs, &sizes, activation)?;
                let joined = Tensor::cat(vec![inputs.wide.clone(), hidden], 1);
                Ok(part(&self.head, "projection")?.forward(joined))
            }
        }
    }

    /// Scores as reported to callers: probabilities for log-loss, raw otherwise
    pub fn scores(&self, inputs: &InputTensors<B>) -> Result<Tensor<B, 2>> {
        let raw = self.forward(inputs)?;
        Ok(match self.loss_kind() {
            LossKind::LogLoss => sigmoid(raw),
            LossKind::Mse => raw,
        })
    }

    /// Sum of squared norms of the deep hidden layers
    pub fn l2_penalty(&self) -> Option<Tensor<B, 1>> {
        self.deep.as_ref().and_then(DeepTower::l2_penalty)
    }

    /// Training objective: data loss plus the weighted L2 penalty
    pub fn objective(&self, inputs: &InputTensors<B>, labels: Tensor<B, 2>) -> Result<Tensor<B, 1>> {
        let scores = self.forward(inputs)?;
        let mut loss = data_loss(self.loss_kind(), scores, labels);

        if self.l2_reg() > 0.0 {
            if let Some(penalty) = self.l2_penalty() {
                loss = loss + penalty.mul_scalar(self.l2_reg());
            }
        }
        Ok(loss)
    }
}

/// Labels as a `[rows, 1]` tensor
pub fn label_tensor<B: Backend>(labels: &[f32], device: &B::Device) -> Tensor<B, 2> {
    Tensor::from_data(TensorData::new(labels.to_vec(), [labels.len(), 1]), device)
}

/// Copy a tensor back to the host
pub fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| WideDeepError::Backend(format!("{:?}", e)))
}

/// Build a model whose parameters are drawn from `rng`
pub fn init_model<B: Backend>(
    spec: &FeatureSpec,
    config: &ModelConfig,
    vocabulary: &CategoryVocabulary,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Result<WideDeepModel<B>> {
    let topology = config.validate()?;
    let sizes = FeatureSizes::new(spec, vocabulary, config.embedding_size);

    let deep = if topology.has_deep() {
        Some(DeepTower::init(&sizes, &config.deep_layers, rng, device)?)
    } else {
        None
    };
    let last_hidden = config.deep_layers.last().copied().unwrap_or(0);

    let (wide, head) = match topology {
        Topology::WideOnly => (Some(normal_linear(rng, sizes.wide, 1, 1.0, device)?), None),
        Topology::DeepOnly => {
            let std = glorot_std(last_hidden, 1);
            (None, Some(normal_linear(rng, last_hidden, 1, std, device)?))
        }
        Topology::WideAndDeep => {
            let fan_in = sizes.wide + last_hidden;
            let head = constant_bias_linear(
                rng,
                fan_in,
                1,
                glorot_std(fan_in, 1),
                PROJECTION_BIAS_INIT,
                device,
            )?;
            (None, Some(head))
        }
    };

    info!(
        "Built {:?} model: wide={}, deep={}, fields={}, categories={}",
        topology, sizes.wide, sizes.deep, sizes.category_field, sizes.category
    );

    Ok(WideDeepModel {
        wide,
        deep,
        head,
        topology: Ignored(topology),
        activation: Ignored(config.activation),
        loss: Ignored(config.loss),
        l2_reg: Ignored(config.l2_reg),
        sizes: Ignored(sizes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CategoryIndex, Matrix};
    use crate::utils::random::seeded_rng;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::tensor::ElementConversion;

    type TestBackend = NdArray<f32>;

    fn spec() -> FeatureSpec {
        FeatureSpec::new(["age"], ["sex"]).unwrap()
    }

    fn config() -> ModelConfig {
        ModelConfig::new()
            .with_embedding_size(2)
            .with_deep_layers(vec![4])
    }

    fn inputs(rows: usize) -> ModelInputs {
        let age: Vec<f32> = (0..rows).map(|i| i as f32 / rows as f32).collect();
        let sex: Vec<f32> = (0..rows).map(|i| (i % 2) as f32).collect();
        let wide = Matrix::from_columns(rows, &[age.clone(), sex.clone()]).unwrap();
        let deep = wide.clone();
        let index = CategoryIndex::new(rows, 1, (0..rows).map(|i| (i % 2) as i64).collect()).unwrap();
        ModelInputs::new(&spec(), wide, deep, index).unwrap()
    }

    fn build(config: &ModelConfig, seed: u64) -> WideDeepModel<TestBackend> {
        let device = Default::default();
        let vocabulary = CategoryVocabulary::new(2, 1);
        init_model(&spec(), config, &vocabulary, &mut seeded_rng(seed), &device).unwrap()
    }

    #[test]
    fn test_forward_shape_per_topology() {
        let device = Default::default();
        for (wide, deep) in [(true, true), (true, false), (false, true)] {
            let model = build(&config().with_use_wide(wide).with_use_deep(deep), 7);
            let tensors = model.input_tensors(&inputs(5), "test", &device).unwrap();
            assert_eq!(model.forward(&tensors).unwrap().dims(), [5, 1]);
        }
    }

    #[test]
    fn test_parameter_count() {
        // embedding 2x2, hidden (2 + 1) x 4 + 4, projection (2 + 4) x 1 + 1
        assert_eq!(build(&config(), 1).num_params(), 4 + 16 + 7);

        // wide-only: 2 x 1 + 1
        let wide_only = build(&config().with_use_deep(false), 1);
        assert_eq!(wide_only.num_params(), 3);
        assert!(wide_only.l2_penalty().is_none());
        assert!(wide_only.deep().is_none());
    }

    #[test]
    fn test_same_seed_same_parameters() {
        let device = Default::default();
        let a = build(&config(), 2018);
        let b = build(&config(), 2018);
        let tensors = a.input_tensors(&inputs(4), "test", &device).unwrap();

        let out_a = tensor_to_vec(a.forward(&tensors).unwrap()).unwrap();
        let out_b = tensor_to_vec(b.forward(&tensors).unwrap()).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_scores_are_probabilities_for_logloss() {
        let device = Default::default();
        let model = build(&config(), 3);
        let tensors = model.input_tensors(&inputs(6), "test", &device).unwrap();
        let scores = tensor_to_vec(model.scores(&tensors).unwrap()).unwrap();
        assert!(scores.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }

    #[test]
    fn test_wide_shape_mismatch() {
        let device = Default::default();
        let model = build(&config().with_use_deep(false), 1);
        let other = FeatureSpec::new(["age", "hours"], ["sex"]).unwrap();
        let wide = Matrix::new(1, 3, vec![0.0; 3]).unwrap();
        let bad = ModelInputs::new(&other, wide.clone(), wide, CategoryIndex::new(1, 1, vec![0]).unwrap()).unwrap();

        match model.input_tensors(&bad, "predict", &device).unwrap_err() {
            WideDeepError::Shape { stage, expected, actual, .. } => {
                assert_eq!(stage, "predict");
                assert_eq!(expected, 2);
                assert_eq!(actual, 3);
            }
            other => panic!("expected shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_category_index_out_of_range() {
        let device = Default::default();
        let model = build(&config(), 1);
        let mut bad = inputs(2);
        bad.category_index = CategoryIndex::new(2, 1, vec![0, 5]).unwrap();

        let err = model.input_tensors(&bad, "fit", &device).unwrap_err();
        assert!(err.to_string().contains("outside the vocabulary"));
    }

    #[test]
    fn test_l2_increases_objective() {
        let device = Default::default();
        let model = build(&config(), 11);
        let tensors = model.input_tensors(&inputs(8), "test", &device).unwrap();
        let labels = label_tensor::<TestBackend>(&[0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0], &device);

        let objective = |l2: f64| {
            model
                .clone()
                .with_l2_reg(l2)
                .objective(&tensors, labels.clone())
                .unwrap()
                .into_scalar()
                .elem::<f64>()
        };

        let none = objective(0.0);
        let small = objective(0.01);
        let large = objective(0.1);
        assert!(none < small);
        assert!(small < large);

        // The added term is exactly l2_reg times the penalty
        let penalty = model.l2_penalty().unwrap().into_scalar().elem::<f64>();
        assert!(penalty > 0.0);
        assert_relative_eq!(objective(0.5) - none, 0.5 * penalty, max_relative = 1e-4);
    }

    #[test]
    fn test_l2_penalty_covers_hidden_layers_only() {
        let model = build(&config().with_deep_layers(vec![4, 3]), 5);

        let host_norm = |linear: &Linear<TestBackend>| -> f64 {
            let weight = tensor_to_vec(linear.weight.val()).unwrap();
            let bias = tensor_to_vec(linear.bias.as_ref().unwrap().val()).unwrap();
            weight.iter().chain(&bias).map(|&v| (v as f64) * (v as f64)).sum()
        };

        let tower = model.deep().unwrap();
        assert_eq!(tower.layers.len(), 2);
        let hidden: f64 = tower.layers.iter().map(host_norm).sum();
        let head = host_norm(model.head.as_ref().unwrap());
        assert!(head > 0.0);

        let penalty = model.l2_penalty().unwrap().into_scalar().elem::<f64>();
        assert_relative_eq!(penalty, hidden, max_relative = 1e-5);
        assert!((penalty - (hidden + head)).abs() > 1e-6);
    }

    #[test]
    fn test_deep_branch_without_inputs() {
        let device = Default::default();
        let spec = FeatureSpec::new(Vec::<&str>::new(), ["sex"]).unwrap();
        let err = init_model::<TestBackend>(
            &spec,
            &config().with_use_wide(false),
            &CategoryVocabulary::new(0, 0),
            &mut seeded_rng(0),
            &device,
        )
        .unwrap_err();
        assert!(err.is_configuration());
    }
}
