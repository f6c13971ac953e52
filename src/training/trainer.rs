use crate::data::feature_engineering::CrossBuilder;
use crate::data::preprocessing::ModelInputs;
use crate::data::{CategoryIndex, CategoryVocabulary, FeatureSpec, Table};
use crate::error::{Result, WideDeepError};
use crate::model::architecture::{init_model, label_tensor, WideDeepModel};
use crate::model::{ModelConfig, OptimizerKind, Topology};
use crate::predict::Predictor;
use crate::training::callbacks::{CallbackManager, TrainingCallback};
use crate::training::{batch_ranges, EpochReport, TrainingBatch, TrainingResult, TrainingState};
use crate::utils::random::seeded_rng;
use burn::module::AutodiffModule;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdaGradConfig, AdamConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use std::time::Instant;
use tracing::{debug, info};

/// Momentum coefficient of the `momentum` optimizer
pub const MOMENTUM: f64 = 0.95;

/// Small constant of the `adagrad` optimizer
pub const ADAGRAD_EPSILON: f32 = 1e-8;

/// Minibatch trainer for the Wide & Deep model
pub struct Trainer<B: AutodiffBackend> {
    spec: FeatureSpec,
    config: ModelConfig,
    vocabulary: CategoryVocabulary,
    topology: Topology,
    device: B::Device,
    callbacks: CallbackManager,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create new trainer; the configuration is validated here
    pub fn new(
        spec: FeatureSpec,
        config: ModelConfig,
        vocabulary: CategoryVocabulary,
        device: B::Device,
    ) -> Result<Self> {
        let topology = config.validate()?;
        Ok(Self {
            spec,
            config,
            vocabulary,
            topology,
            device,
            callbacks: CallbackManager::new(),
        })
    }

    /// Register a training callback
    pub fn with_callback<C: TrainingCallback + 'static>(mut self, callback: C) -> Self {
        self.callbacks.add_callback(callback);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Train on a raw table.
    ///
    /// Cross features are built from `train`, then the wide and deep inputs are
    /// assembled in feature-spec order.
    pub fn fit(
        &mut self,
        category_index: CategoryIndex,
        train: &Table,
        labels: &[f32],
    ) -> Result<TrainingResult<B::InnerBackend>> {
        let cross = CrossBuilder::from_spec(&self.spec).build(train)?;
        let inputs = ModelInputs::from_table(&self.spec, train, &cross, category_index)?;
        self.fit_inputs(&inputs, labels)
    }

    /// Train on prepared inputs
    pub fn fit_inputs(
        &mut self,
        inputs: &ModelInputs,
        labels: &[f32],
    ) -> Result<TrainingResult<B::InnerBackend>> {
        if labels.len() != inputs.num_rows() {
            return Err(WideDeepError::shape("fit", "label rows", inputs.num_rows(), labels.len()));
        }
        if labels.is_empty() {
            return Err(WideDeepError::data("labels", "training set is empty"));
        }

        let mut rng = seeded_rng(self.config.seed);
        let model = init_model::<B>(&self.spec, &self.config, &self.vocabulary, &mut rng, &self.device)?;

        info!(
            "Training {:?} model: {} rows, {} epochs, batch size {}, optimizer {}",
            self.topology,
            inputs.num_rows(),
            self.config.epochs,
            self.config.batch_size,
            self.config.optimizer
        );

        match self.config.optimizer {
            OptimizerKind::Adam => {
                let optim = AdamConfig::new()
                    .with_epsilon(1e-8)
                    .init::<B, WideDeepModel<B>>();
                self.run(model, optim, inputs, labels)
            }
            OptimizerKind::Adagrad => {
                let optim = AdaGradConfig::new()
                    .with_epsilon(ADAGRAD_EPSILON)
                    .init::<B, WideDeepModel<B>>();
                self.run(model, optim, inputs, labels)
            }
            OptimizerKind::Gd => {
                let optim = SgdConfig::new().init::<B, WideDeepModel<B>>();
                self.run(model, optim, inputs, labels)
            }
            OptimizerKind::Momentum => {
                let momentum = MomentumConfig::new()
                    .with_momentum(MOMENTUM)
                    .with_dampening(0.0);
                let optim = SgdConfig::new()
                    .with_momentum(Some(momentum))
                    .init::<B, WideDeepModel<B>>();
                self.run(model, optim, inputs, labels)
            }
            OptimizerKind::RmsProp => {
                let optim = RmsPropConfig::new()
                    .with_alpha(0.9)
                    .with_epsilon(1e-10)
                    .init::<B, WideDeepModel<B>>();
                self.run(model, optim, inputs, labels)
            }
        }
    }

    fn run<O>(
        &mut self,
        mut model: WideDeepModel<B>,
        mut optim: O,
        inputs: &ModelInputs,
        labels: &[f32],
    ) -> Result<TrainingResult<B::InnerBackend>>
    where
        O: Optimizer<WideDeepModel<B>, B>,
    {
        let start_time = Instant::now();
        let mut state = TrainingState::new();
        let ranges = batch_ranges(inputs.num_rows(), self.config.batch_size);
        let metric = self.config.metric;

        self.callbacks.on_train_begin(self.config.epochs, ranges.len());

        for epoch in 1..=self.config.epochs {
            self.callbacks.on_epoch_begin(epoch);
            let mut cost = f64::NAN;

            for (step, range) in ranges.iter().enumerate() {
                let batch = TrainingBatch::slice(inputs, labels, range.clone());
                let tensors = model.input_tensors(&batch.inputs, "fit", &self.device)?;
                let targets = label_tensor::<B>(&batch.labels, &self.device);

                let loss = model.objective(&tensors, targets)?;
                cost = loss.clone().into_scalar().elem::<f64>();

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(self.config.learning_rate, model, grads);

                self.callbacks.on_batch_end(step, cost);
            }

            let predictor = Predictor::new(model.valid(), self.spec.clone(), metric, self.device.clone());
            let value = predictor.evaluate_inputs(inputs, labels)?;

            info!("[{}] cost={}, train-{}={:.4}", epoch, cost, metric, value);
            let report = EpochReport {
                epoch,
                cost,
                metric: value,
                batches: ranges.len(),
            };
            state.update_epoch(report);
            self.callbacks.on_epoch_end(&report, &state);
        }

        self.callbacks.on_train_end(&state);
        let duration_secs = start_time.elapsed().as_secs_f64();
        debug!("fit finished after {} steps", state.global_step);

        Ok(TrainingResult {
            state,
            predictor: Predictor::new(model.valid(), self.spec.clone(), metric, self.device.clone()),
            duration_secs,
            seed: self.config.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use crate::model::{LossKind, MetricKind};
    use crate::training::callbacks::TimerCallback;
    use burn::backend::{Autodiff, NdArray};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    type TestBackend = Autodiff<NdArray<f32>>;

    struct BatchCounter {
        batches: Arc<AtomicUsize>,
    }

    impl TrainingCallback for BatchCounter {
        fn on_batch_end(&mut self, _batch: usize, _loss: f64) {
            self.batches.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 50 rows; label is 1 for older rows, sex alternates
    fn census(rows: usize) -> (FeatureSpec, Table, CategoryIndex, Vec<f32>) {
        let spec = FeatureSpec::new(["age"], ["sex"]).unwrap();
        let age: Vec<f64> = (0..rows).map(|i| i as f64 / rows as f64).collect();
        let sex: Vec<f64> = (0..rows).map(|i| (i % 2) as f64).collect();
        let labels: Vec<f32> = age.iter().map(|&a| if a >= 0.5 { 1.0 } else { 0.0 }).collect();
        let index = CategoryIndex::new(rows, 1, sex.iter().map(|&s| s as i64).collect()).unwrap();
        let table = Table::new()
            .with_column(Column::numeric("age", age))
            .unwrap()
            .with_column(Column::numeric("sex", sex))
            .unwrap();
        (spec, table, index, labels)
    }

    fn config() -> ModelConfig {
        ModelConfig::new()
            .with_embedding_size(2)
            .with_deep_layers(vec![4])
            .with_epochs(2)
            .with_batch_size(10)
    }

    #[test]
    fn test_fit_end_to_end() {
        let (spec, table, index, labels) = census(50);
        let device = Default::default();
        let mut trainer =
            Trainer::<TestBackend>::new(spec, config(), CategoryVocabulary::new(2, 1), device).unwrap();

        let result = trainer.fit(index, &table, &labels).unwrap();

        assert_eq!(result.state.epoch, 2);
        assert_eq!(result.state.reports.len(), 2);
        assert_eq!(result.seed, 2018);
        for report in &result.state.reports {
            assert!(report.cost.is_finite());
            assert!(report.metric.is_finite());
            assert!((0.0..=1.0).contains(&report.metric));
        }
    }

    #[test]
    fn test_steps_per_epoch() {
        let (spec, table, index, labels) = census(23);
        let batches = Arc::new(AtomicUsize::new(0));
        let mut trainer = Trainer::<TestBackend>::new(
            spec,
            config().with_epochs(3),
            CategoryVocabulary::new(2, 1),
            Default::default(),
        )
        .unwrap()
        .with_callback(BatchCounter {
            batches: Arc::clone(&batches),
        })
        .with_callback(TimerCallback::new());

        let result = trainer.fit(index, &table, &labels).unwrap();

        // ceil(23 / 10) = 3 steps per epoch
        assert_eq!(batches.load(Ordering::SeqCst), 9);
        assert_eq!(result.state.global_step, 9);
        assert!(result.state.reports.iter().all(|r| r.batches == 3));
    }

    #[test]
    fn test_no_branch_rejected_before_training() {
        let (spec, ..) = census(4);
        let config = config().with_use_wide(false).with_use_deep(false);
        let err = Trainer::<TestBackend>::new(spec, config, CategoryVocabulary::new(2, 1), Default::default())
            .err()
            .unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_every_optimizer_trains() {
        let (spec, table, index, labels) = census(20);
        for optimizer in [
            OptimizerKind::Adam,
            OptimizerKind::Adagrad,
            OptimizerKind::Gd,
            OptimizerKind::Momentum,
            OptimizerKind::RmsProp,
        ] {
            let mut trainer = Trainer::<TestBackend>::new(
                spec.clone(),
                config().with_epochs(1).with_optimizer(optimizer),
                CategoryVocabulary::new(2, 1),
                Default::default(),
            )
            .unwrap();
            let result = trainer.fit(index.clone(), &table, &labels).unwrap();
            assert!(result.state.reports[0].cost.is_finite(), "{} diverged", optimizer);
        }
    }

    #[test]
    fn test_mse_regression_with_rmse() {
        let (spec, table, index, _) = census(30);
        let targets: Vec<f32> = (0..30).map(|i| i as f32 / 30.0).collect();
        let config = config()
            .with_loss(LossKind::Mse)
            .with_metric(MetricKind::Rmse)
            .with_learning_rate(0.01)
            .with_epochs(20);
        let mut trainer =
            Trainer::<TestBackend>::new(spec, config, CategoryVocabulary::new(2, 1), Default::default()).unwrap();

        let result = trainer.fit(index, &table, &targets).unwrap();
        let reports = &result.state.reports;
        assert!(reports.last().unwrap().metric < reports.first().unwrap().metric);
    }

    #[test]
    fn test_label_count_mismatch() {
        let (spec, table, index, _) = census(10);
        let mut trainer =
            Trainer::<TestBackend>::new(spec, config(), CategoryVocabulary::new(2, 1), Default::default()).unwrap();

        let err = trainer.fit(index, &table, &[1.0; 9]).err().unwrap();
        assert!(err.is_shape());
    }

    #[test]
    fn test_trained_predictor_scores_test_rows() {
        let (spec, table, index, labels) = census(40);
        let mut trainer =
            Trainer::<TestBackend>::new(spec, config(), CategoryVocabulary::new(2, 1), Default::default()).unwrap();
        let result = trainer.fit(index.clone(), &table, &labels).unwrap();

        let inputs = result.predictor.prepare(&table, index).unwrap();
        let scores = result.predictor.predict_inputs(&inputs).unwrap();
        assert_eq!(scores.len(), 40);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }
}
