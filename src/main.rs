//! Steering Clone CLI
//!
//! Running the binary without a subcommand trains a model on `data/driving_log.csv`
//! with the default settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::info;

use steering_clone::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use steering_clone::dataset::{
    load_driving_log, preprocess_image, DrivingBatcher, ExhaustionPolicy, LogStats,
    SamplingStrategy, DEFAULT_DATA_DIR, DEFAULT_LOG_FILE,
};
use steering_clone::dataset::generator::load_camera_image;
use steering_clone::model::{load_model, TrainingConfig, VariantConfig};
use steering_clone::training::run_training;
use steering_clone::utils::logging::{init_logging, LogConfig};
use steering_clone::utils::{format_duration, format_number, histogram_bar};
use steering_clone::VERSION;

/// Behavioral cloning steering model trainer
///
/// Learns to predict steering angles from simulator camera frames using the
/// Burn framework.
#[derive(Parser, Debug)]
#[command(name = "steering_clone")]
#[command(version)]
#[command(about = "Train a steering-angle CNN from recorded driving", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute (defaults to `train`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the steering model and save it
    Train(TrainArgs),

    /// Show statistics for a steering log
    Stats {
        /// Directory the log's image paths are relative to
        #[arg(short, long, default_value = DEFAULT_DATA_DIR)]
        data_dir: String,

        /// Steering log (defaults to <data-dir>/driving_log.csv)
        #[arg(short, long)]
        log_file: Option<String>,
    },

    /// Predict the steering angle for one camera frame
    Predict {
        /// Path to a 320x160 camera image
        #[arg(short, long)]
        image: String,

        /// Saved weights
        #[arg(short, long, default_value = "model.mpk")]
        weights: String,

        /// Saved architecture description
        #[arg(short, long, default_value = "model.json")]
        architecture: String,
    },
}

#[derive(Args, Debug, Default)]
struct TrainArgs {
    /// JSON training configuration; flags below override its values
    #[arg(short, long)]
    config: Option<String>,

    /// Directory the log's image paths are relative to
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Steering log (defaults to <data-dir>/driving_log.csv)
    #[arg(short, long)]
    log_file: Option<String>,

    /// Number of training epochs
    #[arg(short, long)]
    epochs: Option<usize>,

    /// Batch size for training and validation
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Training samples drawn per epoch
    #[arg(long)]
    samples_per_epoch: Option<usize>,

    /// Validation samples drawn per epoch
    #[arg(long)]
    validation_samples: Option<usize>,

    /// Adam learning rate
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Pipeline variant
    #[arg(long, value_enum)]
    variant: Option<VariantArg>,

    /// How batches draw samples
    #[arg(long, value_enum)]
    sampling: Option<SamplingArg>,

    /// What to do when a shuffled pass runs out mid-batch
    #[arg(long, value_enum)]
    exhaustion: Option<ExhaustionArg>,

    /// Random seed for reproducibility (OS entropy when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Weights output path
    #[arg(long)]
    weights: Option<String>,

    /// Architecture output path
    #[arg(long)]
    architecture: Option<String>,

    /// Training report output path
    #[arg(long)]
    report: Option<String>,

    /// Quick smoke-test run (1 epoch, 256 samples)
    #[arg(long, default_value = "false")]
    quick: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum VariantArg {
    Reference,
    ZeroFiltered,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SamplingArg {
    Shuffled,
    RandomCamera,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExhaustionArg {
    Wrap,
    Truncate,
    Fail,
}

impl From<VariantArg> for VariantConfig {
    fn from(arg: VariantArg) -> Self {
        match arg {
            VariantArg::Reference => VariantConfig::reference(),
            VariantArg::ZeroFiltered => VariantConfig::zero_filtered(),
        }
    }
}

impl From<SamplingArg> for SamplingStrategy {
    fn from(arg: SamplingArg) -> Self {
        match arg {
            SamplingArg::Shuffled => SamplingStrategy::ShuffledPasses,
            SamplingArg::RandomCamera => SamplingStrategy::RandomCamera,
        }
    }
}

impl From<ExhaustionArg> for ExhaustionPolicy {
    fn from(arg: ExhaustionArg) -> Self {
        match arg {
            ExhaustionArg::Wrap => ExhaustionPolicy::Wrap,
            ExhaustionArg::Truncate => ExhaustionPolicy::Truncate,
            ExhaustionArg::Fail => ExhaustionPolicy::Fail,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command.unwrap_or_else(|| Commands::Train(TrainArgs::default())) {
        Commands::Train(args) => cmd_train(args)?,
        Commands::Stats { data_dir, log_file } => {
            let log_file = log_file.unwrap_or_else(|| default_log_file(&data_dir));
            cmd_stats(&data_dir, &log_file)?;
        }
        Commands::Predict {
            image,
            weights,
            architecture,
        } => cmd_predict(&image, &weights, &architecture)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------------------+
 |   Steering Clone                                             |
 |   Behavioral cloning for simulator driving with Burn + Rust  |
 +--------------------------------------------------------------+"#
            .green()
    );
    println!("  v{} | {}", VERSION, backend_name());
    println!();
}

fn default_log_file(data_dir: &str) -> String {
    Path::new(data_dir)
        .join(DEFAULT_LOG_FILE)
        .to_string_lossy()
        .into_owned()
}

/// Merge CLI flags over the file config (or the defaults)
fn build_config(args: TrainArgs) -> Result<TrainingConfig> {
    let mut config = match (&args.config, args.quick) {
        (Some(path), _) => TrainingConfig::load(Path::new(path))
            .with_context(|| format!("Failed to read training config {:?}", path))?,
        (None, true) => TrainingConfig::quick(),
        (None, false) => TrainingConfig::default(),
    };

    if let Some(data_dir) = args.data_dir {
        if args.log_file.is_none() {
            config.log_file = default_log_file(&data_dir);
        }
        config.data_dir = data_dir;
    }
    if let Some(log_file) = args.log_file {
        config.log_file = log_file;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(n) = args.samples_per_epoch {
        config.samples_per_epoch = n;
    }
    if let Some(n) = args.validation_samples {
        config.validation_samples = n;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(variant) = args.variant {
        config.variant = variant.into();
    }
    if let Some(sampling) = args.sampling {
        config.sampling = sampling.into();
    }
    if let Some(exhaustion) = args.exhaustion {
        config.exhaustion = exhaustion.into();
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(path) = args.weights {
        config.weights_path = path;
    }
    if let Some(path) = args.architecture {
        config.architecture_path = path;
    }
    if let Some(path) = args.report {
        config.report_path = path;
    }

    Ok(config)
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = build_config(args)?;
    info!("Training on {} with backend {}", config.log_file, backend_name());

    println!("{}", "Starting Training...".green().bold());
    let report = run_training::<TrainingBackend>(&config)?;

    let total_secs: f64 = report.epochs.iter().map(|e| e.duration_secs).sum();

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Epochs:           {}", report.epochs.len());
    println!("  Duration:         {}", format_duration(total_secs));
    if let Some(loss) = report.final_val_loss() {
        println!("  Final val loss:   {:.5}", loss);
    }
    if let Some(loss) = report.best_val_loss() {
        println!("  Best val loss:    {:.5}", loss);
    }
    if let Some(acc) = report.epochs.last().and_then(|e| e.val_accuracy) {
        println!("  Final val acc:    {:.2}%", acc * 100.0);
    }
    println!("  Weights:          {:?}", report.weights_path);
    println!("  Architecture:     {:?}", report.architecture_path);
    println!("  Report:           {}", config.report_path);

    Ok(())
}

fn cmd_stats(data_dir: &str, log_file: &str) -> Result<()> {
    info!("Computing steering log statistics for: {}", log_file);

    if !Path::new(log_file).exists() {
        println!("{} Steering log not found: {}", "Error:".red(), log_file);
        println!();
        println!("Record a session in the simulator and place it under {}/", data_dir);
        return Ok(());
    }

    let log = load_driving_log(log_file, data_dir)?;
    let stats = log.stats();

    let all_samples = log.samples(false).len();
    let filtered_samples = log.samples(true).len();

    println!("{}", "Steering Log Statistics:".cyan().bold());
    println!("  Rows:                   {}", format_number(stats.total_rows));
    println!(
        "  Zero-angle rows:        {} ({:.1}%)",
        format_number(stats.zero_angle_rows),
        stats.zero_angle_fraction() * 100.0
    );
    println!("  Angle range:            {:.3} .. {:.3}", stats.min_angle, stats.max_angle);
    println!("  Mean angle:             {:.4}", stats.mean_angle);
    println!("  Samples (reference):    {}", format_number(all_samples));
    println!("  Samples (zero-filtered): {}", format_number(filtered_samples));
    println!();

    println!("{}", "Angle Distribution:".cyan().bold());
    let peak = stats.histogram.iter().copied().max().unwrap_or(0).max(1);
    for (bin, count) in stats.histogram.iter().enumerate() {
        println!(
            "  {:>6.2} {:>7} {}",
            LogStats::bin_start(bin),
            count,
            histogram_bar(*count as f64 / peak as f64, 40)
        );
    }

    Ok(())
}

fn cmd_predict(image: &str, weights: &str, architecture: &str) -> Result<()> {
    info!("Predicting steering angle for: {}", image);

    let device = default_device();
    let (model, arch) = load_model::<DefaultBackend>(
        &PathBuf::from(weights),
        &PathBuf::from(architecture),
        &device,
    )
    .context("Failed to load model")?;
    info!("Model '{}' with {} parameters", arch.name, arch.parameter_count);

    let frame = load_camera_image(Path::new(image))?;
    let input = DrivingBatcher::<DefaultBackend>::new(device).single_image(preprocess_image(&frame));

    let angles: Vec<f32> = model
        .forward(input)
        .into_data()
        .to_vec()
        .map_err(|e| anyhow::anyhow!("Failed to read prediction: {:?}", e))?;
    let angle = angles
        .first()
        .copied()
        .context("Model returned no prediction")?;

    println!("{} {:.4}", "Steering angle:".cyan().bold(), angle);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_version_comes_from_package() {
        assert_eq!(Cli::command().get_version(), Some(VERSION));
    }

    #[test]
    fn test_no_subcommand_parses() {
        let cli = Cli::try_parse_from(["steering_clone"]).unwrap();
        assert!(cli.command.is_none());
        assert!(Cli::try_parse_from(["steering_clone", "--verbose", "--quiet"]).is_err());
    }

    #[test]
    fn test_train_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "steering_clone",
            "train",
            "--data-dir",
            "recordings",
            "--variant",
            "zero-filtered",
            "--sampling",
            "random-camera",
            "--exhaustion",
            "truncate",
            "--seed",
            "7",
        ])
        .unwrap();

        let Some(Commands::Train(args)) = cli.command else {
            panic!("expected train subcommand");
        };
        let config = build_config(args).unwrap();

        assert_eq!(config.data_dir, "recordings");
        assert_eq!(config.log_file, default_log_file("recordings"));
        assert_eq!(config.variant, VariantConfig::zero_filtered());
        assert_eq!(config.sampling, SamplingStrategy::RandomCamera);
        assert_eq!(config.exhaustion, ExhaustionPolicy::Truncate);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.epochs, TrainingConfig::default().epochs);
    }

    #[test]
    fn test_variant_arg_conversion() {
        assert_eq!(VariantConfig::from(VariantArg::Reference), VariantConfig::reference());
        assert_eq!(
            VariantConfig::from(VariantArg::ZeroFiltered),
            VariantConfig::zero_filtered()
        );
    }
}
