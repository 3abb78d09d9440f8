use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    #[error("Model initialisation failed: {0}")]
    ModelInit(String),

    #[error("Image load failed: {0}")]
    ImageLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Segmentation worker is not running")]
    WorkerGone,

    #[error("Failed to start segmentation worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[cfg(feature = "onnx")]
impl From<opencv::Error> for SegmentationError {
    fn from(err: opencv::Error) -> Self {
        SegmentationError::Inference(err.message)
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for SegmentationError {
    fn from(err: ort::Error) -> Self {
        SegmentationError::Inference(err.to_string())
    }
}
