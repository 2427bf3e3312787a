//! Model Module
//!
//! The steering CNN, its configuration, and weight/architecture persistence.

pub mod cnn;
pub mod config;
pub mod persist;

pub use cnn::{SteeringModel, SteeringModelConfig};
pub use config::{DenseActivation, TrainingConfig, VariantConfig, ACCURACY_TOLERANCE};
pub use persist::{load_model, save_model, LayerSpec, ModelArchitecture};
