//! Sample Expander
//!
//! Turns one log row into per-camera `(image, angle)` training samples.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loader::LogRow;
use super::CAMERA_OFFSET;

/// Which of the three car-mounted cameras took an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Camera {
    Center,
    Left,
    Right,
}

impl Camera {
    /// Steering correction added to the recorded angle for this camera
    pub fn offset(&self) -> f32 {
        match self {
            Camera::Center => 0.0,
            Camera::Left => CAMERA_OFFSET,
            Camera::Right => -CAMERA_OFFSET,
        }
    }
}

/// One training example: an image on disk and its target steering angle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub image_path: PathBuf,
    pub angle: f32,
    pub camera: Camera,
}

/// Expand a log row into its camera samples, in center/left/right order
///
/// With `apply_zero_angle_filter`, a row recorded at exactly 0.0 loses its center
/// sample; the corrected side samples are always kept.
pub fn expand_row(row: &LogRow, apply_zero_angle_filter: bool, data_dir: &Path) -> Vec<Sample> {
    let center = row.steering_angle;
    let cameras = [
        (Camera::Center, &row.center_path),
        (Camera::Left, &row.left_path),
        (Camera::Right, &row.right_path),
    ];

    cameras
        .into_iter()
        .filter(|(camera, _)| !(apply_zero_angle_filter && *camera == Camera::Center && center == 0.0))
        .map(|(camera, path)| Sample {
            image_path: data_dir.join(path),
            angle: center + camera.offset(),
            camera,
        })
        .collect()
}

/// Expand a whole log, preserving row order
pub fn expand_rows(rows: &[LogRow], apply_zero_angle_filter: bool, data_dir: &Path) -> Vec<Sample> {
    rows.iter()
        .flat_map(|row| expand_row(row, apply_zero_angle_filter, data_dir))
        .collect()
}
