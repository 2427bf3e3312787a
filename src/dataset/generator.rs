//! Endless Batch Generator
//!
//! Produces `(images, angles)` batches on demand for the training loop. The
//! generator owns its random source, so a seeded `ChaCha8Rng` makes the whole
//! stream (order and brightness factors) reproducible.
//!
//! Images are read from disk synchronously on every call; there is no
//! prefetching, so slow storage directly stalls the training step.

use std::ops::Range;
use std::path::Path;

use image::{ImageReader, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::augmentation::BrightnessJitter;
use super::loader::LogRow;
use super::samples::{expand_row, Sample};
use super::{IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_LEN, IMAGE_WIDTH};
use crate::utils::error::{DriveError, Result};

/// How samples are drawn for each batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingStrategy {
    /// Consecutive windows over a list reshuffled at the start of every pass
    ShuffledPasses,
    /// Each item picks a random log row, then a random camera of that row
    RandomCamera,
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::ShuffledPasses
    }
}

/// What `ShuffledPasses` does when a batch needs more samples than the pass has left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExhaustionPolicy {
    /// Reshuffle and keep filling; every batch is full
    Wrap,
    /// Emit the shorter remainder; the next batch starts a new pass
    Truncate,
    /// Report `DriveError::PassExhausted`
    Fail,
}

impl Default for ExhaustionPolicy {
    fn default() -> Self {
        Self::Wrap
    }
}

/// Generator settings
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub batch_size: usize,
    pub strategy: SamplingStrategy,
    pub exhaustion: ExhaustionPolicy,
    pub jitter: BrightnessJitter,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            strategy: SamplingStrategy::default(),
            exhaustion: ExhaustionPolicy::default(),
            jitter: BrightnessJitter::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_strategy(mut self, strategy: SamplingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_exhaustion(mut self, exhaustion: ExhaustionPolicy) -> Self {
        self.exhaustion = exhaustion;
        self
    }
}

/// One step's worth of training data, host side
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Row-major `[len, IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]` HSV floats
    pub images: Vec<f32>,
    /// Target steering angles, one per image
    pub angles: Vec<f32>,
}

impl Batch {
    fn with_capacity(len: usize) -> Self {
        Self {
            images: Vec::with_capacity(len * IMAGE_LEN),
            angles: Vec::with_capacity(len),
        }
    }

    pub fn len(&self) -> usize {
        self.angles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.angles.is_empty()
    }

    /// `[len, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [self.len(), IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]
    }

    /// The `index`-th image as HWC floats
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let start = index.checked_mul(IMAGE_LEN)?;
        self.images.get(start..start + IMAGE_LEN)
    }
}

/// Infinite producer of batches
pub struct BatchGenerator {
    samples: Vec<Sample>,
    /// Sample ranges belonging to one log row, used by `RandomCamera`
    groups: Vec<Range<usize>>,
    order: Vec<usize>,
    cursor: usize,
    config: GeneratorConfig,
    rng: ChaCha8Rng,
    passes_started: usize,
    batches_emitted: usize,
}

impl BatchGenerator {
    /// Generator over a flat sample list
    ///
    /// Under `RandomCamera` every sample counts as its own row.
    pub fn new(samples: Vec<Sample>, config: GeneratorConfig, rng: ChaCha8Rng) -> Result<Self> {
        let groups = (0..samples.len()).map(|i| i..i + 1).collect();
        Self::with_groups(samples, groups, config, rng)
    }

    /// Generator over log rows, keeping the per-row grouping for `RandomCamera`
    pub fn from_rows(
        rows: &[LogRow],
        data_dir: &Path,
        apply_zero_angle_filter: bool,
        config: GeneratorConfig,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        let mut samples = Vec::with_capacity(rows.len() * 3);
        let mut groups = Vec::with_capacity(rows.len());

        for row in rows {
            let start = samples.len();
            samples.extend(expand_row(row, apply_zero_angle_filter, data_dir));
            groups.push(start..samples.len());
        }

        Self::with_groups(samples, groups, config, rng)
    }

    fn with_groups(
        samples: Vec<Sample>,
        groups: Vec<Range<usize>>,
        config: GeneratorConfig,
        rng: ChaCha8Rng,
    ) -> Result<Self> {
        if samples.is_empty() {
            return Err(DriveError::InvalidInput(
                "batch generator needs at least one sample".to_string(),
            ));
        }
        if config.batch_size == 0 {
            return Err(DriveError::InvalidInput(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        debug!(
            "Batch generator: {} samples, batch size {}, {:?}/{:?}",
            samples.len(),
            config.batch_size,
            config.strategy,
            config.exhaustion
        );

        Ok(Self {
            samples,
            groups,
            order: Vec::new(),
            cursor: 0,
            config,
            rng,
            passes_started: 0,
            batches_emitted: 0,
        })
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Shuffled passes begun so far (always 0 under `RandomCamera`)
    pub fn passes_started(&self) -> usize {
        self.passes_started
    }

    pub fn batches_emitted(&self) -> usize {
        self.batches_emitted
    }

    /// Pull the next batch, loading and augmenting every image from disk
    pub fn next_batch(&mut self) -> Result<Batch> {
        let indices = self.next_indices()?;
        let mut batch = Batch::with_capacity(indices.len());

        for idx in indices {
            let sample = &self.samples[idx];
            let img = load_camera_image(&sample.image_path)?;
            let hsv = self.config.jitter.augment(&img, &mut self.rng);
            batch.images.extend_from_slice(&hsv);
            batch.angles.push(sample.angle);
        }

        self.batches_emitted += 1;
        trace!("Emitted batch {} ({} images)", self.batches_emitted, batch.len());
        Ok(batch)
    }

    fn start_pass(&mut self) {
        self.order = (0..self.samples.len()).collect();
        self.order.shuffle(&mut self.rng);
        self.cursor = 0;
        self.passes_started += 1;
    }

    fn take(&mut self, count: usize, into: &mut Vec<usize>) {
        let end = self.cursor + count;
        into.extend_from_slice(&self.order[self.cursor..end]);
        self.cursor = end;
    }

    fn next_indices(&mut self) -> Result<Vec<usize>> {
        let batch_size = self.config.batch_size;

        if self.config.strategy == SamplingStrategy::RandomCamera {
            let mut picked = Vec::with_capacity(batch_size);
            for _ in 0..batch_size {
                let row = self.rng.gen_range(0..self.groups.len());
                let group = self.groups[row].clone();
                picked.push(self.rng.gen_range(group));
            }
            return Ok(picked);
        }

        if self.cursor >= self.order.len() {
            self.start_pass();
        }

        let mut picked = Vec::with_capacity(batch_size);
        let remaining = self.order.len() - self.cursor;
        if remaining >= batch_size {
            self.take(batch_size, &mut picked);
            return Ok(picked);
        }

        match self.config.exhaustion {
            ExhaustionPolicy::Fail => {
                self.cursor = self.order.len();
                Err(DriveError::PassExhausted {
                    remaining,
                    requested: batch_size,
                })
            }
            ExhaustionPolicy::Truncate => {
                self.take(remaining, &mut picked);
                Ok(picked)
            }
            ExhaustionPolicy::Wrap => {
                self.take(remaining, &mut picked);
                while picked.len() < batch_size {
                    self.start_pass();
                    let count = (batch_size - picked.len()).min(self.order.len());
                    self.take(count, &mut picked);
                }
                Ok(picked)
            }
        }
    }
}

impl Iterator for BatchGenerator {
    type Item = Result<Batch>;

    /// Never returns `None`
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Decode a camera frame and check it matches the network's input size
pub fn load_camera_image(path: &Path) -> Result<RgbImage> {
    let img = ImageReader::open(path)
        .map_err(|e| DriveError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| DriveError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .to_rgb8();

    let (width, height) = img.dimensions();
    if width as usize != IMAGE_WIDTH || height as usize != IMAGE_HEIGHT {
        return Err(DriveError::ImageShape {
            path: path.to_path_buf(),
            width,
            height,
            expected_width: IMAGE_WIDTH as u32,
            expected_height: IMAGE_HEIGHT as u32,
        });
    }

    Ok(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::samples::Camera;
    use image::Rgb;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_frame(dir: &Path, name: &str, shade: u8) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(IMAGE_WIDTH as u32, IMAGE_HEIGHT as u32, Rgb([shade, 40, 200]))
            .save(&path)
            .unwrap();
        path
    }

    fn fixture(count: usize) -> (TempDir, Vec<Sample>) {
        let dir = TempDir::new().unwrap();
        let samples = (0..count)
            .map(|i| Sample {
                image_path: write_frame(dir.path(), &format!("frame_{}.png", i), (i * 20) as u8),
                angle: i as f32 * 0.1,
                camera: Camera::Center,
            })
            .collect();
        (dir, samples)
    }

    fn generator(samples: Vec<Sample>, config: GeneratorConfig, seed: u64) -> BatchGenerator {
        BatchGenerator::new(samples, config, ChaCha8Rng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_batch_shape() {
        let (_dir, samples) = fixture(4);
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(3), 1);

        let batch = gen.next_batch().unwrap();
        assert_eq!(batch.shape(), [3, 160, 320, 3]);
        assert_eq!(batch.images.len(), 3 * 160 * 320 * 3);
        assert_eq!(batch.angles.len(), 3);
        assert!(batch.image(2).is_some());
        assert!(batch.image(3).is_none());
    }

    #[test]
    fn test_each_pass_is_a_permutation() {
        let (_dir, samples) = fixture(4);
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(2), 5);

        for _ in 0..3 {
            let mut seen: Vec<f32> = gen.next_batch().unwrap().angles;
            seen.extend(gen.next_batch().unwrap().angles);
            let distinct: HashSet<u32> = seen.iter().map(|a| a.to_bits()).collect();
            assert_eq!(distinct.len(), 4);
        }
        assert_eq!(gen.passes_started(), 3);
        assert_eq!(gen.batches_emitted(), 6);
    }

    #[test]
    fn test_wrap_keeps_batches_full() {
        let (_dir, samples) = fixture(4);
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(3), 2);

        for _ in 0..4 {
            assert_eq!(gen.next_batch().unwrap().len(), 3);
        }
        // 12 items over 4-sample passes
        assert_eq!(gen.passes_started(), 3);
    }

    #[test]
    fn test_wrap_with_batch_larger_than_samples() {
        let (_dir, samples) = fixture(2);
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(5), 2);
        assert_eq!(gen.next_batch().unwrap().len(), 5);
    }

    #[test]
    fn test_truncate_emits_remainder() {
        let (_dir, samples) = fixture(4);
        let config = GeneratorConfig::default()
            .with_batch_size(3)
            .with_exhaustion(ExhaustionPolicy::Truncate);
        let mut gen = generator(samples, config, 3);

        assert_eq!(gen.next_batch().unwrap().len(), 3);
        assert_eq!(gen.next_batch().unwrap().len(), 1);
        assert_eq!(gen.next_batch().unwrap().len(), 3);
        assert_eq!(gen.passes_started(), 2);
    }

    #[test]
    fn test_fail_reports_exhaustion() {
        let (_dir, samples) = fixture(4);
        let config = GeneratorConfig::default()
            .with_batch_size(3)
            .with_exhaustion(ExhaustionPolicy::Fail);
        let mut gen = generator(samples, config, 4);

        assert!(gen.next_batch().is_ok());
        assert!(matches!(
            gen.next_batch(),
            Err(DriveError::PassExhausted {
                remaining: 1,
                requested: 3
            })
        ));
        // The abandoned pass is replaced by a fresh one
        assert!(gen.next_batch().is_ok());
    }

    #[test]
    fn test_seeded_generators_agree() {
        let (_dir, samples) = fixture(4);
        let config = GeneratorConfig::default().with_batch_size(2);
        let mut a = generator(samples.clone(), config.clone(), 11);
        let mut b = generator(samples, config, 11);

        for _ in 0..3 {
            assert_eq!(a.next_batch().unwrap(), b.next_batch().unwrap());
        }
    }

    #[test]
    fn test_iterator_never_ends() {
        let (_dir, samples) = fixture(1);
        let gen = generator(samples, GeneratorConfig::default().with_batch_size(1), 0);
        assert_eq!(gen.take(5).filter(|b| b.is_ok()).count(), 5);
    }

    #[test]
    fn test_random_camera_draws_from_rows() {
        let dir = TempDir::new().unwrap();
        for name in ["c.png", "l.png", "r.png"] {
            write_frame(dir.path(), name, 90);
        }
        let rows = vec![LogRow::new("c.png", "l.png", "r.png", 0.0)];
        let config = GeneratorConfig::default()
            .with_batch_size(16)
            .with_strategy(SamplingStrategy::RandomCamera);
        let mut gen = BatchGenerator::from_rows(
            &rows,
            dir.path(),
            true,
            config,
            ChaCha8Rng::seed_from_u64(9),
        )
        .unwrap();

        let batch = gen.next_batch().unwrap();
        assert_eq!(batch.len(), 16);
        // Zero-angle filter leaves only the side cameras
        assert!(batch.angles.iter().all(|&a| a == 0.2 || a == -0.2));
        assert_eq!(gen.passes_started(), 0);
    }

    #[test]
    fn test_missing_image_is_fatal() {
        let samples = vec![Sample {
            image_path: PathBuf::from("/nonexistent/IMG/center.jpg"),
            angle: 0.0,
            camera: Camera::Center,
        }];
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(1), 0);
        assert!(matches!(gen.next_batch(), Err(DriveError::ImageLoad(_, _))));
    }

    #[test]
    fn test_wrong_image_size_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("small.png");
        RgbImage::from_pixel(64, 32, Rgb([1, 2, 3])).save(&path).unwrap();

        let samples = vec![Sample {
            image_path: path,
            angle: 0.0,
            camera: Camera::Center,
        }];
        let mut gen = generator(samples, GeneratorConfig::default().with_batch_size(1), 0);
        assert!(matches!(
            gen.next_batch(),
            Err(DriveError::ImageShape { width: 64, height: 32, .. })
        ));
    }

    #[test]
    fn test_rejects_empty_samples_and_zero_batch() {
        let rng = ChaCha8Rng::seed_from_u64(0);
        assert!(BatchGenerator::new(Vec::new(), GeneratorConfig::default(), rng.clone()).is_err());

        let (_dir, samples) = fixture(1);
        assert!(BatchGenerator::new(samples, GeneratorConfig::default().with_batch_size(0), rng).is_err());
    }
}
