//! Steering Log Loader
//!
//! Reads the simulator's `driving_log.csv`. The first row is a header; every
//! following row is `center,left,right,steering,throttle,brake,speed` of which
//! only the first four columns are required.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::samples::{expand_rows, Sample};
use crate::utils::error::{DriveError, Result};

/// One parsed line of the steering log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRow {
    pub center_path: String,
    pub left_path: String,
    pub right_path: String,
    pub steering_angle: f32,
    pub throttle: Option<f32>,
    pub brake: Option<f32>,
    pub speed: Option<f32>,
}

impl LogRow {
    /// Build a row from the three image paths and the recorded steering angle
    pub fn new(center: &str, left: &str, right: &str, steering_angle: f32) -> Self {
        Self {
            center_path: center.trim().to_string(),
            left_path: left.trim().to_string(),
            right_path: right.trim().to_string(),
            steering_angle,
            throttle: None,
            brake: None,
            speed: None,
        }
    }

    fn from_record(record: &StringRecord, line: u64) -> Result<Self> {
        if record.len() < 4 {
            return Err(DriveError::MalformedRow {
                line,
                reason: format!("expected at least 4 columns, found {}", record.len()),
            });
        }

        let raw_angle = record.get(3).unwrap_or("").trim();
        let steering_angle = raw_angle.parse::<f32>().map_err(|_| DriveError::MalformedRow {
            line,
            reason: format!("steering angle '{}' is not a number", raw_angle),
        })?;

        let mut row = Self::new(
            record.get(0).unwrap_or(""),
            record.get(1).unwrap_or(""),
            record.get(2).unwrap_or(""),
            steering_angle,
        );
        row.throttle = optional_f32(record, 4);
        row.brake = optional_f32(record, 5);
        row.speed = optional_f32(record, 6);

        Ok(row)
    }
}

fn optional_f32(record: &StringRecord, index: usize) -> Option<f32> {
    record.get(index).and_then(|s| s.trim().parse::<f32>().ok())
}

/// The parsed steering log plus the directory its image paths are relative to
#[derive(Debug, Clone)]
pub struct DrivingLog {
    pub data_dir: PathBuf,
    pub rows: Vec<LogRow>,
}

impl DrivingLog {
    pub fn new<P: AsRef<Path>>(data_dir: P, rows: Vec<LogRow>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            rows,
        }
    }

    pub fn rows(&self) -> &[LogRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Expand every row into camera samples with paths resolved against `data_dir`
    pub fn samples(&self, apply_zero_angle_filter: bool) -> Vec<Sample> {
        expand_rows(&self.rows, apply_zero_angle_filter, &self.data_dir)
    }

    /// Summary statistics over the recorded steering angles
    pub fn stats(&self) -> LogStats {
        LogStats::from_rows(&self.rows)
    }
}

/// Load a steering log from `log_path`, resolving image paths against `data_dir`
///
/// A missing file, a row with fewer than four columns, or a non-numeric steering
/// angle is a fatal error.
pub fn load_driving_log<P: AsRef<Path>, Q: AsRef<Path>>(log_path: P, data_dir: Q) -> Result<DrivingLog> {
    let log_path = log_path.as_ref();
    info!("Loading steering log from: {:?}", log_path);

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(log_path)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(idx as u64 + 2);
        rows.push(LogRow::from_record(&record, line)?);
    }

    info!("Loaded {} log rows", rows.len());
    debug!("Image paths resolve against {:?}", data_dir.as_ref());

    Ok(DrivingLog::new(data_dir, rows))
}

/// Statistics about the recorded steering angles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStats {
    pub total_rows: usize,
    pub zero_angle_rows: usize,
    pub min_angle: f32,
    pub max_angle: f32,
    pub mean_angle: f32,
    /// Counts over `HISTOGRAM_BINS` equal bins spanning [-1, 1]; outliers land in the edge bins
    pub histogram: Vec<usize>,
}

impl LogStats {
    pub const HISTOGRAM_BINS: usize = 20;

    pub fn from_rows(rows: &[LogRow]) -> Self {
        let mut histogram = vec![0usize; Self::HISTOGRAM_BINS];
        let mut min_angle = f32::INFINITY;
        let mut max_angle = f32::NEG_INFINITY;
        let mut sum = 0.0f64;
        let mut zero_angle_rows = 0;

        for row in rows {
            let angle = row.steering_angle;
            min_angle = min_angle.min(angle);
            max_angle = max_angle.max(angle);
            sum += angle as f64;
            if angle == 0.0 {
                zero_angle_rows += 1;
            }
            histogram[Self::bin_index(angle)] += 1;
        }

        if rows.is_empty() {
            min_angle = 0.0;
            max_angle = 0.0;
        }

        Self {
            total_rows: rows.len(),
            zero_angle_rows,
            min_angle,
            max_angle,
            mean_angle: if rows.is_empty() { 0.0 } else { (sum / rows.len() as f64) as f32 },
            histogram,
        }
    }

    /// Lower edge of histogram bin `bin`
    pub fn bin_start(bin: usize) -> f32 {
        -1.0 + bin as f32 * (2.0 / Self::HISTOGRAM_BINS as f32)
    }

    fn bin_index(angle: f32) -> usize {
        let scaled = (angle + 1.0) / 2.0 * Self::HISTOGRAM_BINS as f32;
        (scaled.floor().max(0.0) as usize).min(Self::HISTOGRAM_BINS - 1)
    }

    /// Fraction of rows recorded while driving straight
    pub fn zero_angle_fraction(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.zero_angle_rows as f64 / self.total_rows as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const HEADER: &str = "center,left,right,steering,throttle,brake,speed\n";

    fn write_log(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("driving_log.csv");
        fs::write(&path, format!("{}{}", HEADER, body)).unwrap();
        path
    }

    #[test]
    fn test_load_skips_header_and_parses_rows() {
        let dir = TempDir::new().unwrap();
        let path = write_log(
            &dir,
            "IMG/center_1.jpg, IMG/left_1.jpg, IMG/right_1.jpg, 0.0, 0.0, 0, 22.14\n\
             IMG/center_2.jpg, IMG/left_2.jpg, IMG/right_2.jpg, -0.05, 0.9, 0, 30.18\n",
        );

        let log = load_driving_log(&path, dir.path()).unwrap();
        assert_eq!(log.len(), 2);

        let row = &log.rows()[1];
        assert_eq!(row.center_path, "IMG/center_2.jpg");
        assert_eq!(row.left_path, "IMG/left_2.jpg");
        assert_eq!(row.right_path, "IMG/right_2.jpg");
        assert_eq!(row.steering_angle, -0.05);
        assert_eq!(row.throttle, Some(0.9));
        assert_eq!(row.speed, Some(30.18));
    }

    #[test]
    fn test_telemetry_columns_are_optional() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "c.jpg,l.jpg,r.jpg,0.25\n");

        let log = load_driving_log(&path, dir.path()).unwrap();
        let row = &log.rows()[0];
        assert_eq!(row.steering_angle, 0.25);
        assert_eq!(row.throttle, None);
        assert_eq!(row.brake, None);
        assert_eq!(row.speed, None);
    }

    #[test]
    fn test_non_numeric_angle_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "c.jpg,l.jpg,r.jpg,0.1\nc.jpg,l.jpg,r.jpg,left\n");

        match load_driving_log(&path, dir.path()) {
            Err(DriveError::MalformedRow { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("left"));
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_short_row_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = write_log(&dir, "c.jpg,l.jpg\n");

        assert!(matches!(
            load_driving_log(&path, dir.path()),
            Err(DriveError::MalformedRow { line: 2, .. })
        ));
    }

    #[test]
    fn test_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let result = load_driving_log(dir.path().join("nope.csv"), dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_stats() {
        let rows = vec![
            LogRow::new("c", "l", "r", 0.0),
            LogRow::new("c", "l", "r", 0.5),
            LogRow::new("c", "l", "r", -0.5),
            LogRow::new("c", "l", "r", 0.0),
        ];
        let stats = LogStats::from_rows(&rows);

        assert_eq!(stats.total_rows, 4);
        assert_eq!(stats.zero_angle_rows, 2);
        assert_eq!(stats.min_angle, -0.5);
        assert_eq!(stats.max_angle, 0.5);
        assert_eq!(stats.mean_angle, 0.0);
        assert_eq!(stats.histogram.iter().sum::<usize>(), 4);
        assert_eq!(stats.histogram[LogStats::HISTOGRAM_BINS / 2], 2);
        assert!((stats.zero_angle_fraction() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_stats_outliers_land_in_edge_bins() {
        let rows = vec![LogRow::new("c", "l", "r", -3.0), LogRow::new("c", "l", "r", 1.0)];
        let stats = LogStats::from_rows(&rows);
        assert_eq!(stats.histogram[0], 1);
        assert_eq!(stats.histogram[LogStats::HISTOGRAM_BINS - 1], 1);
    }
}
