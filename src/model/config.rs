//! Training and Variant Configuration
//!
//! The pipeline exists in two flavours that differ only in data handling and
//! dense-layer details. Both are described by [`VariantConfig`]; everything
//! else the driver needs lives in [`TrainingConfig`].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dataset::{ExhaustionPolicy, SamplingStrategy};
use crate::utils::error::{DriveError, Result};

/// Predictions within this distance of the target count as accurate
pub const ACCURACY_TOLERANCE: f32 = 0.05;

/// Activation used after each hidden dense layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DenseActivation {
    Relu,
    Elu,
}

impl Default for DenseActivation {
    fn default() -> Self {
        Self::Relu
    }
}

impl std::fmt::Display for DenseActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenseActivation::Relu => write!(f, "relu"),
            DenseActivation::Elu => write!(f, "elu"),
        }
    }
}

/// Knobs that distinguish the two pipeline variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantConfig {
    /// Drop center samples recorded at exactly 0.0 to reduce straight-driving bias
    pub apply_zero_angle_filter: bool,
    pub dense_activation: DenseActivation,
    /// Report the fraction of predictions within `ACCURACY_TOLERANCE`
    pub track_accuracy_metric: bool,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self::reference()
    }
}

impl VariantConfig {
    /// Every camera sample, ReLU dense layers, loss only
    pub fn reference() -> Self {
        Self {
            apply_zero_angle_filter: false,
            dense_activation: DenseActivation::Relu,
            track_accuracy_metric: false,
        }
    }

    /// Straight-driving center frames dropped, ELU dense layers, accuracy reported
    pub fn zero_filtered() -> Self {
        Self {
            apply_zero_angle_filter: true,
            dense_activation: DenseActivation::Elu,
            track_accuracy_metric: true,
        }
    }
}

/// Everything the training driver needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Directory the log's image paths are relative to
    pub data_dir: String,
    /// Steering log, relative to the working directory
    pub log_file: String,
    /// Weights output (burn appends the `.mpk` extension)
    pub weights_path: String,
    /// Architecture description output
    pub architecture_path: String,
    /// Per-epoch loss history output
    pub report_path: String,

    pub epochs: usize,
    pub batch_size: usize,
    pub samples_per_epoch: usize,
    pub validation_samples: usize,
    pub learning_rate: f64,

    /// Seed for shuffling and augmentation; `None` draws from OS entropy
    pub seed: Option<u64>,
    pub sampling: SamplingStrategy,
    pub exhaustion: ExhaustionPolicy,
    pub variant: VariantConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            log_file: "data/driving_log.csv".to_string(),
            weights_path: "model.mpk".to_string(),
            architecture_path: "model.json".to_string(),
            report_path: "training_report.json".to_string(),
            epochs: 20,
            batch_size: 64,
            samples_per_epoch: 28416,
            validation_samples: 1024,
            learning_rate: 1e-3,
            seed: None,
            sampling: SamplingStrategy::ShuffledPasses,
            exhaustion: ExhaustionPolicy::Wrap,
            variant: VariantConfig::reference(),
        }
    }
}

impl TrainingConfig {
    /// A short run for smoke-testing a dataset
    pub fn quick() -> Self {
        Self {
            epochs: 1,
            batch_size: 16,
            samples_per_epoch: 256,
            validation_samples: 64,
            seed: Some(42),
            ..Default::default()
        }
    }

    /// Optimizer steps per epoch
    pub fn steps_per_epoch(&self) -> usize {
        self.samples_per_epoch.div_ceil(self.batch_size.max(1))
    }

    /// Validation batches per epoch
    pub fn validation_steps(&self) -> usize {
        self.validation_samples.div_ceil(self.batch_size.max(1))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(DriveError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(DriveError::Config("batch_size must be greater than 0".to_string()));
        }
        if self.samples_per_epoch == 0 {
            return Err(DriveError::Config(
                "samples_per_epoch must be greater than 0".to_string(),
            ));
        }
        if self.validation_samples == 0 {
            return Err(DriveError::Config(
                "validation_samples must be greater than 0".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(DriveError::Config("learning_rate must be positive".to_string()));
        }
        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 20);
        assert_eq!(config.batch_size, 64);
        assert_eq!(config.samples_per_epoch, 28416);
        assert_eq!(config.validation_samples, 1024);
        assert_eq!(config.steps_per_epoch(), 444);
        assert_eq!(config.validation_steps(), 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_steps_round_up() {
        let config = TrainingConfig {
            batch_size: 64,
            samples_per_epoch: 100,
            validation_samples: 1,
            ..Default::default()
        };
        assert_eq!(config.steps_per_epoch(), 2);
        assert_eq!(config.validation_steps(), 1);
    }

    #[test]
    fn test_validation_rejects_zero_sizes() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.epochs = 0;
        assert!(config.validate().is_err());

        config = TrainingConfig::default();
        config.learning_rate = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_variant_presets() {
        let reference = VariantConfig::reference();
        assert!(!reference.apply_zero_angle_filter);
        assert_eq!(reference.dense_activation, DenseActivation::Relu);
        assert!(!reference.track_accuracy_metric);

        let filtered = VariantConfig::zero_filtered();
        assert!(filtered.apply_zero_angle_filter);
        assert_eq!(filtered.dense_activation, DenseActivation::Elu);
        assert!(filtered.track_accuracy_metric);
    }

    #[test]
    fn test_config_save_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");

        let mut config = TrainingConfig::quick();
        config.variant = VariantConfig::zero_filtered();
        config.sampling = SamplingStrategy::RandomCamera;
        config.save(&path).unwrap();

        let loaded = TrainingConfig::load(&path).unwrap();
        assert_eq!(loaded.epochs, 1);
        assert_eq!(loaded.seed, Some(42));
        assert_eq!(loaded.variant, VariantConfig::zero_filtered());
        assert_eq!(loaded.sampling, SamplingStrategy::RandomCamera);
    }
}
