use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::Resolution;
use crate::error::SegmentationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
    DirectMl,
    CoreMl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub encoder_path: PathBuf,
    pub decoder_path: PathBuf,
    pub provider: ExecutionProvider,
    /// Accelerator index, ignored on CPU.
    pub device_id: Option<i32>,
    /// Intra-op threads, 0 lets the runtime decide.
    pub threads: usize,
    pub input_size: Resolution,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            encoder_path: PathBuf::from("models/sam_encoder.onnx"),
            decoder_path: PathBuf::from("models/sam_decoder.onnx"),
            provider: ExecutionProvider::Cpu,
            device_id: None,
            threads: 0,
            input_size: Resolution::new(1024, 1024),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubsystemConfig {
    pub model: ModelConfig,
    /// Window size at startup; updated later through resize events.
    pub window: Resolution,
    /// Start in brush mode instead of click-to-segment mode.
    pub pixel_scaling: bool,
}

impl Default for SubsystemConfig {
    fn default() -> Self {
        SubsystemConfig {
            model: ModelConfig::default(),
            window: Resolution::new(1280, 720),
            pixel_scaling: false,
        }
    }
}

impl SubsystemConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, SegmentationError> {
        let config: SubsystemConfig =
            toml::from_str(text).map_err(|e| SegmentationError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, SegmentationError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SegmentationError::InvalidConfig(format!("{}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), SegmentationError> {
        let invalid = |msg: &str| Err(SegmentationError::InvalidConfig(msg.to_string()));
        if self.model.input_size.is_empty() {
            return invalid("model input size must be non-zero");
        }
        if self.model.input_size.width > 4096 || self.model.input_size.height > 4096 {
            return invalid("model input size too large (max 4096)");
        }
        if self.window.is_empty() {
            return invalid("window resolution must be non-zero");
        }
        if self.model.threads > 256 {
            return invalid("thread count too large (max 256)");
        }
        if matches!(self.model.device_id, Some(id) if id < 0) {
            return invalid("device id must not be negative");
        }
        Ok(())
    }
}
