//! Steering Regression CNN
//!
//! A fixed sequential network mapping one 160x320 camera frame to a steering
//! angle. The topology follows the end-to-end driving architecture of five
//! convolutions and a small dense head:
//!
//! ```text
//! [B,160,320,3] -> crop rows 60..140 -> resize 66x200 -> x/127.5 - 1
//!   -> conv 24@5x5/2 -> conv 36@5x5/2 -> conv 48@5x5/2 -> conv 64@3x3 -> conv 64@3x3
//!   -> flatten (1152) -> dropout 0.2
//!   -> dense 100 -> dropout 0.5 -> dense 50 -> dropout 0.5 -> dense 10 -> dropout 0.5
//!   -> dense 1
//! ```

use burn::{
    config::Config,
    module::{Ignored, Module, Param},
    nn::{
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        Dropout, DropoutConfig, Initializer, Linear, LinearConfig, PaddingConfig2d,
    },
    tensor::{activation, backend::Backend, Tensor},
};

use super::config::DenseActivation;
use crate::utils::error::DriveError;

/// `(out_channels, kernel_size, stride)` for each convolution, in order
pub const CONV_LAYERS: [(usize, usize, usize); 5] =
    [(24, 5, 2), (36, 5, 2), (48, 5, 2), (64, 3, 1), (64, 3, 1)];

/// Hidden dense layer widths, in order
pub const DENSE_UNITS: [usize; 3] = [100, 50, 10];

/// Configuration for the SteeringModel
#[derive(Config, Debug)]
pub struct SteeringModelConfig {
    /// Camera frame height
    #[config(default = "160")]
    pub input_height: usize,

    /// Camera frame width
    #[config(default = "320")]
    pub input_width: usize,

    /// Rows removed from the top (sky)
    #[config(default = "60")]
    pub crop_top: usize,

    /// Rows removed from the bottom (hood)
    #[config(default = "20")]
    pub crop_bottom: usize,

    #[config(default = "66")]
    pub resize_height: usize,

    #[config(default = "200")]
    pub resize_width: usize,

    /// Activation after each hidden dense layer
    #[config(default = "DenseActivation::Relu")]
    pub dense_activation: DenseActivation,

    /// Dropout right after flattening the conv features
    #[config(default = "0.2")]
    pub input_dropout: f64,

    /// Dropout after each hidden dense layer
    #[config(default = "0.5")]
    pub hidden_dropout: f64,
}

impl SteeringModelConfig {
    /// Feature map `[channels, height, width]` after the last convolution
    pub fn conv_output_dims(&self) -> [usize; 3] {
        let mut height = self.resize_height;
        let mut width = self.resize_width;
        let mut channels = 3;

        for &(out_channels, kernel, stride) in CONV_LAYERS.iter() {
            height = (height.saturating_sub(kernel)) / stride + 1;
            width = (width.saturating_sub(kernel)) / stride + 1;
            channels = out_channels;
        }

        [channels, height, width]
    }

    /// Number of features entering the dense head
    pub fn flattened_features(&self) -> usize {
        let [c, h, w] = self.conv_output_dims();
        c * h * w
    }

    /// Reject geometries the network cannot run on
    ///
    /// The crop must leave at least one row and the resized frame must survive
    /// every valid-padded convolution.
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.crop_top + self.crop_bottom >= self.input_height {
            return Err(DriveError::Model(format!(
                "crop {}+{} rows leaves nothing of a {} row frame",
                self.crop_top, self.crop_bottom, self.input_height
            )));
        }

        let (mut height, mut width) = (self.resize_height, self.resize_width);
        for &(_, kernel, stride) in CONV_LAYERS.iter() {
            if height < kernel || width < kernel {
                return Err(DriveError::Model(format!(
                    "resize {}x{} is too small for the convolution stack",
                    self.resize_height, self.resize_width
                )));
            }
            height = (height - kernel) / stride + 1;
            width = (width - kernel) / stride + 1;
        }

        for rate in [self.input_dropout, self.hidden_dropout] {
            if !(0.0..1.0).contains(&rate) {
                return Err(DriveError::Model(format!("dropout rate {} outside [0, 1)", rate)));
            }
        }

        Ok(())
    }

    /// Build the model on `device`
    pub fn init<B: Backend>(&self, device: &B::Device) -> SteeringModel<B> {
        SteeringModel::new(self, device)
    }
}

/// He-normal weights; biases start at zero
fn he_normal() -> Initializer {
    Initializer::KaimingNormal {
        gain: std::f64::consts::SQRT_2,
        fan_out_only: false,
    }
}

fn conv_layer<B: Backend>(
    in_channels: usize,
    (out_channels, kernel, stride): (usize, usize, usize),
    device: &B::Device,
) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new([in_channels, out_channels], [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Valid)
        .with_initializer(he_normal())
        .init(device);
    conv.bias = Some(Param::from_tensor(Tensor::zeros([out_channels], device)));
    conv
}

fn dense_layer<B: Backend>(inputs: usize, outputs: usize, device: &B::Device) -> Linear<B> {
    let mut linear = LinearConfig::new(inputs, outputs)
        .with_initializer(he_normal())
        .init(device);
    linear.bias = Some(Param::from_tensor(Tensor::zeros([outputs], device)));
    linear
}

/// Steering angle regressor
#[derive(Module, Debug)]
pub struct SteeringModel<B: Backend> {
    pub resize: Interpolate2d,

    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub conv3: Conv2d<B>,
    pub conv4: Conv2d<B>,
    pub conv5: Conv2d<B>,

    pub input_dropout: Dropout,
    pub fc1: Linear<B>,
    pub dropout1: Dropout,
    pub fc2: Linear<B>,
    pub dropout2: Dropout,
    pub fc3: Linear<B>,
    pub dropout3: Dropout,
    pub output: Linear<B>,

    crop_top: usize,
    crop_bottom: usize,
    activation: Ignored<DenseActivation>,
}

impl<B: Backend> SteeringModel<B> {
    pub fn new(config: &SteeringModelConfig, device: &B::Device) -> Self {
        let resize = Interpolate2dConfig::new()
            .with_output_size(Some([config.resize_height, config.resize_width]))
            .with_mode(InterpolateMode::Linear)
            .init();

        let conv1 = conv_layer(3, CONV_LAYERS[0], device);
        let conv2 = conv_layer(CONV_LAYERS[0].0, CONV_LAYERS[1], device);
        let conv3 = conv_layer(CONV_LAYERS[1].0, CONV_LAYERS[2], device);
        let conv4 = conv_layer(CONV_LAYERS[2].0, CONV_LAYERS[3], device);
        let conv5 = conv_layer(CONV_LAYERS[3].0, CONV_LAYERS[4], device);

        let features = config.flattened_features();

        Self {
            resize,
            conv1,
            conv2,
            conv3,
            conv4,
            conv5,
            input_dropout: DropoutConfig::new(config.input_dropout).init(),
            fc1: dense_layer(features, DENSE_UNITS[0], device),
            dropout1: DropoutConfig::new(config.hidden_dropout).init(),
            fc2: dense_layer(DENSE_UNITS[0], DENSE_UNITS[1], device),
            dropout2: DropoutConfig::new(config.hidden_dropout).init(),
            fc3: dense_layer(DENSE_UNITS[1], DENSE_UNITS[2], device),
            dropout3: DropoutConfig::new(config.hidden_dropout).init(),
            output: dense_layer(DENSE_UNITS[2], 1, device),
            crop_top: config.crop_top,
            crop_bottom: config.crop_bottom,
            activation: Ignored(config.dense_activation),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `images` - `[batch_size, height, width, 3]` frames, channel-last
    ///
    /// # Returns
    /// * `[batch_size, 1]` predicted steering angles
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch_size, height, width, channels] = images.dims();

        // NHWC -> NCHW
        let x = images.permute([0, 3, 1, 2]);
        let x = x.slice([
            0..batch_size,
            0..channels,
            self.crop_top..height - self.crop_bottom,
            0..width,
        ]);
        let x = self.resize.forward(x);
        let x = x.div_scalar(127.5).sub_scalar(1.0);

        let x = activation::relu(self.conv1.forward(x));
        let x = activation::relu(self.conv2.forward(x));
        let x = activation::relu(self.conv3.forward(x));
        let x = activation::relu(self.conv4.forward(x));
        let x = activation::relu(self.conv5.forward(x));

        let [batch_size, c, h, w] = x.dims();
        let x = x.reshape([batch_size, c * h * w]);
        let x = self.input_dropout.forward(x);

        let x = self.dropout1.forward(self.dense_activation(self.fc1.forward(x)));
        let x = self.dropout2.forward(self.dense_activation(self.fc2.forward(x)));
        let x = self.dropout3.forward(self.dense_activation(self.fc3.forward(x)));

        self.output.forward(x)
    }

    fn dense_activation(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match *self.activation {
            DenseActivation::Relu => activation::relu(x),
            // elu(x) = x for x > 0, exp(x) - 1 otherwise; exp only sees non-positive inputs
            DenseActivation::Elu => {
                let negative = x.clone().clamp_max(0.0);
                activation::relu(x) + negative.exp().sub_scalar(1.0)
            }
        }
    }

    pub fn dense_activation_kind(&self) -> DenseActivation {
        *self.activation
    }

    /// Total trainable parameters
    pub fn parameter_count(&self) -> usize {
        self.num_params()
    }
}
