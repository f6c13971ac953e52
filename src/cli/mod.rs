use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// wide-deep: train and evaluate Wide & Deep models
#[derive(Parser, Debug)]
#[command(name = "wide-deep")]
#[command(about = "Wide & Deep learning for categorical and continuous features")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train on a data directory and report the test metric
    Train(TrainArgs),

    /// Write the default model configuration as JSON
    InitConfig(InitConfigArgs),
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Directory holding train.csv, test.csv, y_train.csv and y_val.csv
    #[arg(short, long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Model configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Feature lists (JSON); defaults to the adult census columns
    #[arg(short, long)]
    pub features: Option<PathBuf>,

    /// Override the number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override the batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override the learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Override the optimizer (adam, adagrad, gd, momentum, rmsprop)
    #[arg(long)]
    pub optimizer: Option<String>,

    /// Override the random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write per-epoch reports to this JSON file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Show a progress bar
    #[arg(long)]
    pub progress: bool,

    /// Quick test mode (small model, fewer epochs)
    #[arg(long)]
    pub quick: bool,
}

/// Arguments of `init-config`
#[derive(Parser, Debug)]
pub struct InitConfigArgs {
    /// Output file
    #[arg(short, long, default_value = "wide_deep.json")]
    pub output: PathBuf,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity
pub fn setup_logging(verbose: bool) {
    let filter = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
