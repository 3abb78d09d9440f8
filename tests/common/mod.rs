use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use living_select::{
    FOREGROUND, InferenceService, MaskImage, MaskPrediction, Prompt, Resolution, SegmentationError,
};

/// Inference stand-in: answers from a script, all-white masks once it runs out.
pub struct ScriptedService {
    pub input: Resolution,
    pub image: Resolution,
    pub delay: Duration,
    pub script: VecDeque<Result<MaskPrediction, SegmentationError>>,
    pub prompts: Arc<Mutex<Vec<Prompt>>>,
}

impl ScriptedService {
    pub fn new(input: Resolution, image: Resolution) -> Self {
        ScriptedService {
            input,
            image,
            delay: Duration::ZERO,
            script: VecDeque::new(),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn then(mut self, answer: Result<MaskPrediction, SegmentationError>) -> Self {
        self.script.push_back(answer);
        self
    }
}

pub fn prediction(mask: MaskImage) -> Result<MaskPrediction, SegmentationError> {
    Ok(MaskPrediction { mask, iou: Some(0.95) })
}

/// Mask selecting the axis-aligned rectangle `[x0, x1) x [y0, y1)`.
pub fn rect_mask(size: Resolution, x0: u32, y0: u32, x1: u32, y1: u32) -> MaskImage {
    let mut mask = MaskImage::new(size);
    for y in y0..y1 {
        for x in x0..x1 {
            mask.set_foreground(x, y);
        }
    }
    mask
}

impl InferenceService for ScriptedService {
    fn input_size(&self) -> Resolution {
        self.input
    }

    fn load_image(&mut self, path: &Path) -> Result<Resolution, SegmentationError> {
        if path.to_string_lossy().contains("missing") {
            return Err(SegmentationError::ImageLoad(format!("{} not found", path.display())));
        }
        Ok(self.image)
    }

    fn get_mask(&mut self, prompt: &Prompt) -> Result<MaskPrediction, SegmentationError> {
        self.prompts.lock().push(prompt.clone());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.script
            .pop_front()
            .unwrap_or_else(|| prediction(MaskImage::filled(self.input, FOREGROUND)))
    }
}
