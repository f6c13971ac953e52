use anyhow::{Context, Result};
use burn::config::Config;
use std::path::Path;
use tracing::{error, info};
use wide_deep::cli::{parse_args, setup_logging, Commands, InitConfigArgs, TrainArgs};
use wide_deep::data::loader::{load_labels, TableLoader};
use wide_deep::data::preprocessing::{FeatureDictionary, FeatureIndexer};
use wide_deep::data::FeatureSpec;
use wide_deep::model::{ModelConfig, OptimizerKind};
use wide_deep::training::callbacks::{ProgressBarCallback, TimerCallback};
use wide_deep::training::trainer::Trainer;
use wide_deep::utils::{format_duration, format_number, validation};
use wide_deep::TrainingBackend;

const CONTINUOUS: [&str; 6] = [
    "age",
    "fnlwgt",
    "education_num",
    "capital_gain",
    "capital_loss",
    "hours_per_week",
];

const CATEGORICAL: [&str; 8] = [
    "workclass",
    "education",
    "marital_status",
    "occupation",
    "relationship",
    "race",
    "sex",
    "native_country",
];

const CROSSES: [[&str; 2]; 2] = [["education", "occupation"], ["native_country", "occupation"]];

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", wide_deep::info());

    let result = match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::InitConfig(args) => run_init_config(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Adult census features, or a JSON feature file
fn feature_spec(path: Option<&Path>) -> Result<FeatureSpec> {
    let Some(path) = path else {
        return Ok(FeatureSpec::new(CONTINUOUS, CATEGORICAL)?.with_cross(CROSSES)?);
    };

    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read feature file {:?}", path))?;
    let raw: FeatureSpec = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse feature file {:?}", path))?;

    // Rebuild through the constructors so the lists are validated
    let spec = FeatureSpec::new(raw.continuous().to_vec(), raw.categorical().to_vec())?
        .with_cross(raw.cross_groups().to_vec())?
        .with_ignored(raw.ignored().to_vec())?;
    Ok(spec)
}

fn model_config(args: &TrainArgs) -> Result<ModelConfig> {
    let mut config = match &args.config {
        Some(path) => ModelConfig::load(path)
            .map_err(|e| anyhow::anyhow!("Failed to load model config {:?}: {}", path, e))?,
        None if args.quick => ModelConfig::quick(),
        None => ModelConfig::new(),
    };

    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(learning_rate) = args.learning_rate {
        config.learning_rate = learning_rate;
    }
    if let Some(optimizer) = &args.optimizer {
        config.optimizer = optimizer.parse::<OptimizerKind>()?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    Ok(config)
}

fn run_train(args: TrainArgs) -> Result<()> {
    let dir = &args.data_dir;
    let train_path = dir.join("train.csv");
    let test_path = dir.join("test.csv");
    let y_train_path = dir.join("y_train.csv");
    let y_val_path = dir.join("y_val.csv");
    for (path, what) in [
        (&train_path, "train table"),
        (&test_path, "test table"),
        (&y_train_path, "train labels"),
        (&y_val_path, "test labels"),
    ] {
        validation::file_exists(path, what)?;
    }

    info!("Reading dataset from {:?}", dir);
    let loader = TableLoader::new();
    let train = loader.load(&train_path)?;
    let test = loader.load(&test_path)?;
    let y_train = load_labels(&y_train_path)?;
    let y_val = load_labels(&y_val_path)?;
    validation::same_length(y_train.len(), train.num_rows(), "y_train")?;
    validation::same_length(y_val.len(), test.num_rows(), "y_val")?;
    info!(
        "Train rows: {}, test rows: {}",
        format_number(train.num_rows()),
        format_number(test.num_rows())
    );

    let spec = feature_spec(args.features.as_deref())?;
    let config = model_config(&args)?;

    let mut dictionary = FeatureDictionary::new(&spec);
    let vocabulary = dictionary
        .build_vocabulary(&train, &test)
        .context("Failed to build feature dictionary")?;
    let train_index = dictionary.index(&train)?;
    let test_index = dictionary.index(&test)?;

    let device = Default::default();
    let mut trainer = Trainer::<TrainingBackend>::new(spec, config, vocabulary, device)?
        .with_callback(TimerCallback::new());
    if args.progress {
        trainer = trainer.with_callback(ProgressBarCallback::new());
    }

    let result = trainer
        .fit(train_index, &train, &y_train)
        .context("Training failed")?;
    info!(
        "Trained {} epochs in {} (seed {})",
        result.state.epoch,
        format_duration(result.duration_secs),
        result.seed
    );

    let predictor = &result.predictor;
    let test_metric = predictor
        .evaluate_table(&test, test_index, &y_val)
        .context("Evaluation failed")?;
    info!("test-{}={:.4}", predictor.metric(), test_metric);

    if let Some(report) = &args.report {
        let json = serde_json::to_string_pretty(&result.state.reports)?;
        std::fs::write(report, json)
            .with_context(|| format!("Failed to write report {:?}", report))?;
        info!("Epoch reports saved to: {:?}", report);
    }

    Ok(())
}

fn run_init_config(args: InitConfigArgs) -> Result<()> {
    ModelConfig::new()
        .save(&args.output)
        .with_context(|| format!("Failed to write {:?}", args.output))?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}
