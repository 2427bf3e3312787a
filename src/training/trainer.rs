//! Regression Training Loop
//!
//! A custom Burn loop rather than the high-level learner: the generators are
//! endless, so an epoch is a fixed number of steps instead of a pass over a
//! dataset.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use burn::{
    module::AutodiffModule,
    nn::loss::{MseLoss, Reduction},
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{
        backend::{AutodiffBackend, Backend},
        ElementConversion,
    },
};
use chrono::Local;
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dataset::{
    load_driving_log, BatchGenerator, DrivingBatch, DrivingBatcher, GeneratorConfig,
};
use crate::model::{
    save_model, SteeringModel, SteeringModelConfig, TrainingConfig, ACCURACY_TOLERANCE,
};
use crate::utils::logging::TrainingLogger;

/// RNG stream for the training generator
const TRAIN_STREAM: u64 = 0;
/// RNG stream for the validation generator
const VALIDATION_STREAM: u64 = 1;

/// Metrics for one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-indexed
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Only present when the variant tracks accuracy
    pub val_accuracy: Option<f64>,
    pub duration_secs: f64,
}

/// Summary written next to the model after training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub started_at: String,
    pub finished_at: String,
    pub backend: String,
    pub config: TrainingConfig,
    pub log_rows: usize,
    pub training_samples: usize,
    pub parameter_count: usize,
    pub epochs: Vec<EpochMetrics>,
    pub weights_path: PathBuf,
    pub architecture_path: PathBuf,
}

impl TrainingReport {
    pub fn final_val_loss(&self) -> Option<f64> {
        self.epochs.last().map(|e| e.val_loss)
    }

    pub fn best_val_loss(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|e| e.val_loss)
            .fold(None, |best, v| match best {
                Some(b) if b <= v => Some(b),
                _ => Some(v),
            })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Build a generator RNG; the two generators share a seed but draw from separate streams
pub fn generator_rng(seed: Option<u64>, stream: u64) -> ChaCha8Rng {
    let mut rng = match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    rng.set_stream(stream);
    rng
}

/// Run the full pipeline: load the log, fit, save the model and the report
///
/// # Type Parameters
/// * `B` - The autodiff backend to use (e.g., `Autodiff<NdArray>` or `Autodiff<Cuda>`)
pub fn run_training<B>(config: &TrainingConfig) -> Result<TrainingReport>
where
    B: AutodiffBackend,
{
    config.validate()?;
    let started_at = Local::now();

    let device = B::Device::default();
    info!("Device: {:?}", device);

    if let Some(seed) = config.seed {
        B::seed(seed);
    }

    let log = load_driving_log(&config.log_file, &config.data_dir)
        .with_context(|| format!("Failed to load steering log {:?}", config.log_file))?;

    let generator_config = GeneratorConfig::default()
        .with_batch_size(config.batch_size)
        .with_strategy(config.sampling)
        .with_exhaustion(config.exhaustion);

    let data_dir = Path::new(&config.data_dir);
    let filter = config.variant.apply_zero_angle_filter;

    let mut train_gen = BatchGenerator::from_rows(
        log.rows(),
        data_dir,
        filter,
        generator_config.clone(),
        generator_rng(config.seed, TRAIN_STREAM),
    )
    .context("Failed to build training generator")?;

    let mut val_gen = BatchGenerator::from_rows(
        log.rows(),
        data_dir,
        filter,
        generator_config,
        generator_rng(config.seed, VALIDATION_STREAM),
    )
    .context("Failed to build validation generator")?;

    let model_config =
        SteeringModelConfig::new().with_dense_activation(config.variant.dense_activation);
    let mut model = model_config.init::<B>(&device);
    let mut optimizer = AdamConfig::new().init();

    let train_batcher = DrivingBatcher::<B>::new(device.clone());
    let val_batcher = DrivingBatcher::<B::InnerBackend>::new(device.clone());

    let steps = config.steps_per_epoch();
    let val_steps = config.validation_steps();

    println!();
    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Log rows:           {}", log.len());
    println!("  Training samples:   {}", train_gen.samples().len());
    println!("  Epochs:             {}", config.epochs);
    println!("  Batch size:         {}", config.batch_size);
    println!("  Steps per epoch:    {}", steps);
    println!("  Validation steps:   {}", val_steps);
    println!("  Learning rate:      {}", config.learning_rate);
    println!("  Dense activation:   {}", config.variant.dense_activation);
    println!("  Zero-angle filter:  {}", filter);
    println!("  Parameters:         {}", model.parameter_count());
    println!();

    let mut logger = TrainingLogger::new(config.epochs);
    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);
        let epoch_start = Instant::now();

        let mut epoch_loss = 0.0f64;
        let mut epoch_samples = 0usize;
        for step in 0..steps {
            let batch = train_gen
                .next_batch()
                .with_context(|| format!("Training batch {} of epoch {}", step + 1, epoch + 1))?;
            let batch_size = batch.len();
            let batch = train_batcher.batch(batch);

            let (updated, loss) = train_step(model, &mut optimizer, batch, config.learning_rate);
            model = updated;
            epoch_loss += loss * batch_size as f64;
            epoch_samples += batch_size;

            if (step + 1) % 50 == 0 || step + 1 == steps {
                debug!("  Step {:>4}/{}: loss = {:.5}", step + 1, steps, loss);
            }
        }
        let train_loss = epoch_loss / epoch_samples.max(1) as f64;

        let (val_loss, val_accuracy) = evaluate(
            &model.valid(),
            &mut val_gen,
            &val_batcher,
            val_steps,
            config.variant.track_accuracy_metric,
        )?;

        logger.end_epoch(train_loss, val_loss, val_accuracy);
        history.push(EpochMetrics {
            epoch: epoch + 1,
            train_loss,
            val_loss,
            val_accuracy,
            duration_secs: epoch_start.elapsed().as_secs_f64(),
        });
    }

    if let Some(last) = history.last() {
        logger.log_complete(last.val_loss);
    }

    let weights_path = PathBuf::from(&config.weights_path);
    let architecture_path = PathBuf::from(&config.architecture_path);
    save_model(&model, &model_config, &weights_path, &architecture_path)
        .context("Failed to save model")?;

    let report = TrainingReport {
        started_at: started_at.to_rfc3339(),
        finished_at: Local::now().to_rfc3339(),
        backend: std::any::type_name::<B>().to_string(),
        config: config.clone(),
        log_rows: log.len(),
        training_samples: train_gen.samples().len(),
        parameter_count: model.parameter_count(),
        epochs: history,
        weights_path,
        architecture_path,
    };
    report.save(Path::new(&config.report_path))?;
    info!("Training report written to {:?}", config.report_path);

    Ok(report)
}

/// One optimizer step; returns the updated model and the batch loss
pub fn train_step<B, O>(
    model: SteeringModel<B>,
    optimizer: &mut O,
    batch: DrivingBatch<B>,
    learning_rate: f64,
) -> (SteeringModel<B>, f64)
where
    B: AutodiffBackend,
    O: Optimizer<SteeringModel<B>, B>,
{
    let output = model.forward(batch.images);
    let loss = MseLoss::new().forward(output, batch.targets, Reduction::Mean);
    let loss_value: f64 = loss.clone().into_scalar().elem();

    let grads = loss.backward();
    let grads = GradientsParams::from_grads(grads, &model);
    let model = optimizer.step(learning_rate, model, grads);

    (model, loss_value)
}

/// Per-sample mean validation loss over `steps` batches, plus accuracy when `track_accuracy` is set
pub fn evaluate<B: Backend>(
    model: &SteeringModel<B>,
    generator: &mut BatchGenerator,
    batcher: &DrivingBatcher<B>,
    steps: usize,
    track_accuracy: bool,
) -> Result<(f64, Option<f64>)> {
    let mut total_loss = 0.0f64;
    let mut within_tolerance = 0usize;
    let mut total = 0usize;

    for step in 0..steps {
        let batch = generator
            .next_batch()
            .with_context(|| format!("Validation batch {}", step + 1))?;
        let batch = batcher.batch(batch);
        let batch_size = batch.targets.dims()[0];

        let output = model.forward(batch.images);

        if track_accuracy {
            let hits: i64 = output
                .clone()
                .sub(batch.targets.clone())
                .abs()
                .lower_equal_elem(ACCURACY_TOLERANCE)
                .int()
                .sum()
                .into_scalar()
                .elem();
            within_tolerance += hits as usize;
        }

        let loss = MseLoss::new().forward(output, batch.targets, Reduction::Mean);
        let loss_value: f64 = loss.into_scalar().elem();
        // Truncated batches carry less weight than full ones
        total_loss += loss_value * batch_size as f64;
        total += batch_size;
    }

    let val_loss = total_loss / total.max(1) as f64;
    let accuracy = track_accuracy.then(|| within_tolerance as f64 / total.max(1) as f64);

    Ok((val_loss, accuracy))
}
