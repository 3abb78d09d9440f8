use std::path::Path;

use ort::execution_providers::ExecutionProviderDispatch;
use ort::inputs;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{info, warn};

use crate::config::{ExecutionProvider, ModelConfig};
use crate::coords::Resolution;
use crate::error::SegmentationError;
use crate::inference::{InferenceService, MaskPrediction, Prompt};
use crate::processing::{self, MASK_INPUT_SIDE};

/// Segment-Anything on ONNX Runtime: one encoder and one decoder session.
pub struct SamRunner {
    encoder: Session,
    decoder: Session,
    input_size: Resolution,
    /// Encoder output for the current picture, fed to every decoder query.
    embeddings: Option<Tensor<f32>>,
}

fn execution_providers(model: &ModelConfig) -> Vec<ExecutionProviderDispatch> {
    let mut providers = Vec::new();
    match model.provider {
        ExecutionProvider::Cpu => {}
        ExecutionProvider::Cuda => {
            #[cfg(feature = "cuda")]
            {
                let mut builder = ort::execution_providers::CUDAExecutionProvider::default();
                if let Some(device_id) = model.device_id {
                    builder = builder.with_device_id(device_id)
                }
                providers.push(builder.build());
            }
        }
        ExecutionProvider::DirectMl => {
            #[cfg(feature = "directml")]
            {
                let mut builder = ort::execution_providers::DirectMLExecutionProvider::default();
                if let Some(device_id) = model.device_id {
                    builder = builder.with_device_id(device_id)
                }
                providers.push(builder.build());
            }
        }
        ExecutionProvider::CoreMl => {
            #[cfg(target_os = "macos")]
            providers.push(ort::execution_providers::CoreMLExecutionProvider::default().build());
        }
    }
    if model.provider != ExecutionProvider::Cpu && providers.is_empty() {
        warn!("{:?} support not compiled in, running on CPU", model.provider);
    }
    providers.push(ort::execution_providers::CPUExecutionProvider::default().build());
    providers
}

fn open_session(path: &Path, model: &ModelConfig) -> Result<Session, SegmentationError> {
    let init_err = |e: ort::Error| SegmentationError::ModelInit(format!("{}: {}", path.display(), e));
    let mut builder = Session::builder()
        .map_err(init_err)?
        .with_execution_providers(execution_providers(model))
        .map_err(init_err)?;
    if model.threads > 0 {
        builder = builder.with_intra_threads(model.threads).map_err(init_err)?;
    }
    let session = builder.commit_from_file(path).map_err(init_err)?;
    info!("Model loaded successfully from {}", path.display());
    Ok(session)
}

impl SamRunner {
    pub fn new(model: &ModelConfig) -> Result<Self, SegmentationError> {
        if model.input_size.is_empty() {
            return Err(SegmentationError::ModelInit("model input size is empty".to_string()));
        }
        Ok(SamRunner {
            encoder: open_session(&model.encoder_path, model)?,
            decoder: open_session(&model.decoder_path, model)?,
            input_size: model.input_size,
            embeddings: None,
        })
    }
}

impl InferenceService for SamRunner {
    fn input_size(&self) -> Resolution {
        self.input_size
    }

    fn load_image(&mut self, path: &Path) -> Result<Resolution, SegmentationError> {
        self.embeddings = None;
        let image = processing::read_image(path)?;
        let resolution = processing::image_resolution(&image);
        let input = processing::encoder_input(&image, self.input_size)?;

        let (w, h) = (self.input_size.width as usize, self.input_size.height as usize);
        let tensor = Tensor::from_array((vec![1, 3, h, w], input))?;
        let outputs = self.encoder.run(inputs![tensor]?)?;
        let output = outputs[0].try_extract_tensor::<f32>()?;
        let shape = output.shape().to_vec();
        let data: Vec<f32> = output.iter().copied().collect();
        self.embeddings = Some(Tensor::from_array((shape, data))?);
        Ok(resolution)
    }

    fn get_mask(&mut self, prompt: &Prompt) -> Result<MaskPrediction, SegmentationError> {
        let embeddings = self
            .embeddings
            .as_ref()
            .ok_or_else(|| SegmentationError::Inference("no image encoded".to_string()))?;
        let points = processing::decoder_prompt(prompt);
        let n = points.len();
        let (w, h) = (self.input_size.width, self.input_size.height);

        let outputs = self.decoder.run(inputs![
            "image_embeddings" => embeddings,
            "point_coords" => Tensor::from_array((vec![1, n, 2], points.coords))?,
            "point_labels" => Tensor::from_array((vec![1, n], points.labels))?,
            "mask_input" => Tensor::from_array((
                vec![1, 1, MASK_INPUT_SIDE, MASK_INPUT_SIDE],
                vec![0.0f32; MASK_INPUT_SIDE * MASK_INPUT_SIDE],
            ))?,
            "has_mask_input" => Tensor::from_array((vec![1], vec![0.0f32]))?,
            "orig_im_size" => Tensor::from_array((vec![2], vec![h as f32, w as f32]))?,
        ]?)?;

        let masks = outputs
            .get("masks")
            .ok_or_else(|| SegmentationError::Inference("decoder has no `masks` output".to_string()))?
            .try_extract_tensor::<f32>()?;
        let plane = self.input_size.area();
        let logits: Vec<f32> = masks.iter().take(plane).copied().collect();
        let mask = processing::logits_to_mask(&logits, self.input_size)?;

        let iou = outputs
            .get("iou_predictions")
            .and_then(|scores| scores.try_extract_tensor::<f32>().ok())
            .and_then(|scores| scores.iter().next().copied());
        Ok(MaskPrediction { mask, iou })
    }
}
