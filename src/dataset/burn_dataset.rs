//! Burn Tensor Conversion
//!
//! Moves host-side [`Batch`]es onto a Burn device. Images stay in NHWC layout;
//! the model permutes them itself.

use burn::prelude::*;

use super::generator::Batch;
use super::{IMAGE_CHANNELS, IMAGE_HEIGHT, IMAGE_LEN, IMAGE_WIDTH};

/// A batch of camera frames and steering targets on a device
#[derive(Clone, Debug)]
pub struct DrivingBatch<B: Backend> {
    /// `[batch_size, height, width, 3]`
    pub images: Tensor<B, 4>,
    /// `[batch_size, 1]`
    pub targets: Tensor<B, 2>,
}

/// Creates device tensors from generator output
#[derive(Clone, Debug)]
pub struct DrivingBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> DrivingBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    pub fn batch(&self, batch: Batch) -> DrivingBatch<B> {
        let batch_size = batch.len();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(
                batch.images,
                [batch_size, IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS],
            ),
            &self.device,
        );
        let targets = Tensor::<B, 2>::from_data(
            TensorData::new(batch.angles, [batch_size, 1]),
            &self.device,
        );

        DrivingBatch { images, targets }
    }

    /// A single preprocessed HWC image as a batch of one
    pub fn single_image(&self, image: Vec<f32>) -> Tensor<B, 4> {
        debug_assert_eq!(image.len(), IMAGE_LEN);
        Tensor::<B, 4>::from_data(
            TensorData::new(image, [1, IMAGE_HEIGHT, IMAGE_WIDTH, IMAGE_CHANNELS]),
            &self.device,
        )
    }
}
