//! # Steering Clone
//!
//! Behavioral cloning for a driving simulator: a convolutional network learns to
//! predict the steering angle from a single front-camera frame, trained on
//! recorded human driving.
//!
//! ## Modules
//!
//! - `dataset`: Steering log parsing, per-camera samples, brightness augmentation and batch generation
//! - `model`: The steering CNN, run configuration and model persistence
//! - `training`: The regression fit loop and training report
//! - `backend`: Burn backend selection (NdArray or CUDA)
//! - `utils`: Errors, logging and formatting helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use steering_clone::backend::TrainingBackend;
//! use steering_clone::{run_training, TrainingConfig};
//!
//! let report = run_training::<TrainingBackend>(&TrainingConfig::default())?;
//! println!("final val loss: {:?}", report.final_val_loss());
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{load_driving_log, Batch, BatchGenerator, DrivingLog, LogRow, Sample};
pub use model::{
    load_model, save_model, SteeringModel, SteeringModelConfig, TrainingConfig, VariantConfig,
};
pub use training::{run_training, TrainingReport};
pub use utils::error::{DriveError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
