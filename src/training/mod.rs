//! Training module for the steering regressor
//!
//! This module provides:
//! - The fit loop (Adam + mean squared error) driven by endless batch generators
//! - Validation with an optional within-tolerance accuracy metric
//! - The JSON training report written after a run

pub mod trainer;

pub use trainer::{evaluate, run_training, train_step, EpochMetrics, TrainingReport};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
