//! Dataset module for the steering log and camera images
//!
//! This module provides functionality for:
//! - Loading the simulator's steering log (`driving_log.csv`)
//! - Expanding each log row into per-camera samples with a steering correction
//! - Brightness augmentation in HSV space
//! - An endless batch generator feeding the training loop
//! - Conversion of host batches into Burn tensors
//!
//! ## Camera Offsets
//!
//! Each log row carries three images taken at the same instant. The left and
//! right cameras see the road as if the car had drifted, so their targets get a
//! fixed correction of `+CAMERA_OFFSET` and `-CAMERA_OFFSET` respectively.

pub mod augmentation;
pub mod burn_dataset;
pub mod generator;
pub mod loader;
pub mod samples;

pub use augmentation::{preprocess_image, BrightnessJitter};
pub use burn_dataset::{DrivingBatch, DrivingBatcher};
pub use generator::{Batch, BatchGenerator, ExhaustionPolicy, GeneratorConfig, SamplingStrategy};
pub use loader::{load_driving_log, DrivingLog, LogRow, LogStats};
pub use samples::{expand_row, expand_rows, Camera, Sample};

/// Camera image height in pixels
pub const IMAGE_HEIGHT: usize = 160;

/// Camera image width in pixels
pub const IMAGE_WIDTH: usize = 320;

/// Number of color channels
pub const IMAGE_CHANNELS: usize = 3;

/// Number of floats in one image
pub const IMAGE_LEN: usize = IMAGE_HEIGHT * IMAGE_WIDTH * IMAGE_CHANNELS;

/// Steering correction applied to the side cameras
pub const CAMERA_OFFSET: f32 = 0.2;

/// Default location of the simulator recordings
pub const DEFAULT_DATA_DIR: &str = "data";

/// Default steering log file name inside the data directory
pub const DEFAULT_LOG_FILE: &str = "driving_log.csv";
