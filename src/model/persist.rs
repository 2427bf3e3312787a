//! Model Persistence
//!
//! Trained weights go to a MessagePack record; the architecture (layer table
//! plus the config needed to rebuild the network) goes to a separate JSON file.

use std::path::Path;

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder},
    tensor::backend::Backend,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::cnn::{SteeringModel, SteeringModelConfig, CONV_LAYERS, DENSE_UNITS};
use crate::utils::error::{DriveError, Result};

pub const MODEL_NAME: &str = "steering_cnn";

/// One row of the layer table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerSpec {
    pub name: String,
    pub kind: String,
    /// Output shape excluding the batch dimension
    pub output_shape: Vec<usize>,
    pub params: usize,
}

impl LayerSpec {
    fn new(name: impl Into<String>, kind: impl Into<String>, output_shape: Vec<usize>, params: usize) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            output_shape,
            params,
        }
    }
}

/// Everything needed to rebuild a [`SteeringModel`] before loading weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArchitecture {
    pub name: String,
    /// `[height, width, channels]`
    pub input_shape: [usize; 3],
    pub layers: Vec<LayerSpec>,
    pub parameter_count: usize,
    pub config: SteeringModelConfig,
}

impl ModelArchitecture {
    /// Describe the network built from `config`
    pub fn describe(config: &SteeringModelConfig) -> Self {
        let mut layers = Vec::new();
        let crop_end = config.input_height.saturating_sub(config.crop_bottom);
        let cropped = crop_end.saturating_sub(config.crop_top);

        layers.push(LayerSpec::new(
            "crop",
            format!("crop rows {}..{}", config.crop_top, crop_end),
            vec![cropped, config.input_width, 3],
            0,
        ));
        layers.push(LayerSpec::new(
            "resize",
            "bilinear",
            vec![config.resize_height, config.resize_width, 3],
            0,
        ));
        layers.push(LayerSpec::new(
            "normalize",
            "x / 127.5 - 1",
            vec![config.resize_height, config.resize_width, 3],
            0,
        ));

        let (mut height, mut width, mut channels) = (config.resize_height, config.resize_width, 3);
        for (i, &(out_channels, kernel, stride)) in CONV_LAYERS.iter().enumerate() {
            height = height.saturating_sub(kernel) / stride + 1;
            width = width.saturating_sub(kernel) / stride + 1;
            let params = channels * out_channels * kernel * kernel + out_channels;
            layers.push(LayerSpec::new(
                format!("conv{}", i + 1),
                format!("conv {}x{}/{} relu", kernel, kernel, stride),
                vec![height, width, out_channels],
                params,
            ));
            channels = out_channels;
        }

        let mut features = channels * height * width;
        layers.push(LayerSpec::new("flatten", "flatten", vec![features], 0));
        layers.push(LayerSpec::new(
            "input_dropout",
            format!("dropout {}", config.input_dropout),
            vec![features],
            0,
        ));

        for (i, &units) in DENSE_UNITS.iter().enumerate() {
            layers.push(LayerSpec::new(
                format!("fc{}", i + 1),
                format!("dense {}", config.dense_activation),
                vec![units],
                features * units + units,
            ));
            layers.push(LayerSpec::new(
                format!("dropout{}", i + 1),
                format!("dropout {}", config.hidden_dropout),
                vec![units],
                0,
            ));
            features = units;
        }

        layers.push(LayerSpec::new("output", "dense linear", vec![1], features + 1));

        let parameter_count = layers.iter().map(|l| l.params).sum();

        Self {
            name: MODEL_NAME.to_string(),
            input_shape: [config.input_height, config.input_width, 3],
            layers,
            parameter_count,
            config: config.clone(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

impl<B: Backend> SteeringModel<B> {
    /// Layer table for the network built from `config`
    pub fn architecture(&self, config: &SteeringModelConfig) -> ModelArchitecture {
        ModelArchitecture::describe(config)
    }
}

/// Write weights and architecture
pub fn save_model<B: Backend>(
    model: &SteeringModel<B>,
    config: &SteeringModelConfig,
    weights_path: &Path,
    architecture_path: &Path,
) -> Result<()> {
    info!("Saving model weights to {:?}", weights_path);

    if let Some(parent) = weights_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    model
        .clone()
        .save_file(weights_path, &recorder)
        .map_err(|e| DriveError::Model(format!("Failed to save weights: {:?}", e)))?;

    model.architecture(config).save(architecture_path)?;
    info!("Architecture written to {:?}", architecture_path);

    Ok(())
}

/// Rebuild a model from its architecture file and load the weights
pub fn load_model<B: Backend>(
    weights_path: &Path,
    architecture_path: &Path,
    device: &B::Device,
) -> Result<(SteeringModel<B>, ModelArchitecture)> {
    let architecture = ModelArchitecture::load(architecture_path)?;
    if architecture.name != MODEL_NAME {
        return Err(DriveError::Model(format!(
            "Unexpected architecture '{}' in {:?}",
            architecture.name, architecture_path
        )));
    }
    architecture.config.validate()?;

    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let model = architecture
        .config
        .init::<B>(device)
        .load_file(weights_path, &recorder, device)
        .map_err(|e| DriveError::Model(format!("Failed to load weights: {:?}", e)))?;

    info!("Loaded model from {:?}", weights_path);
    Ok((model, architecture))
}
