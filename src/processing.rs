#[cfg(feature = "onnx")]
use std::path::Path;

#[cfg(feature = "onnx")]
use opencv::core::{CV_32FC3, Mat, MatTraitConst, MatTraitConstManual, Size};
#[cfg(feature = "onnx")]
use opencv::imgcodecs::{IMREAD_COLOR, imread};
#[cfg(feature = "onnx")]
use opencv::imgproc::{COLOR_BGR2RGB, INTER_LINEAR, cvt_color, resize};

use crate::coords::Resolution;
use crate::error::SegmentationError;
use crate::inference::Prompt;
use crate::mask::{FOREGROUND, MaskImage};

/// Decoder logits above this are foreground.
pub const MASK_THRESHOLD: f32 = 0.0;

/// Per-channel RGB normalisation the encoder was trained with.
pub const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
pub const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

pub const MASK_INPUT_SIDE: usize = 256;

const LABEL_PADDING: f32 = -1.0;
const LABEL_NEGATIVE: f32 = 0.0;
const LABEL_POSITIVE: f32 = 1.0;
const LABEL_BOX_TOP_LEFT: f32 = 2.0;
const LABEL_BOX_BOTTOM_RIGHT: f32 = 3.0;

#[derive(Debug, Clone, PartialEq)]
pub struct DecoderPrompt {
    /// `[x0, y0, x1, y1, ...]`, one pair per label.
    pub coords: Vec<f32>,
    pub labels: Vec<f32>,
}

impl DecoderPrompt {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Positive points, then negative points, then either the box corners or a
/// padding point; the exported decoder expects the padding when no box is set.
pub fn decoder_prompt(prompt: &Prompt) -> DecoderPrompt {
    let mut out = DecoderPrompt { coords: Vec::new(), labels: Vec::new() };
    let mut push = |x: f32, y: f32, label: f32| {
        out.coords.extend_from_slice(&[x, y]);
        out.labels.push(label);
    };
    for p in &prompt.points {
        push(p.x, p.y, LABEL_POSITIVE);
    }
    for p in &prompt.negative_points {
        push(p.x, p.y, LABEL_NEGATIVE);
    }
    match prompt.roi {
        Some(roi) => {
            push(roi.x, roi.y, LABEL_BOX_TOP_LEFT);
            push(roi.x + roi.width, roi.y + roi.height, LABEL_BOX_BOTTOM_RIGHT);
        }
        None => push(0.0, 0.0, LABEL_PADDING),
    }
    out
}

pub fn logits_to_mask(logits: &[f32], resolution: Resolution) -> Result<MaskImage, SegmentationError> {
    let data = logits
        .iter()
        .map(|&v| if v > MASK_THRESHOLD { FOREGROUND } else { 0 })
        .collect();
    MaskImage::from_raw(resolution, data).ok_or_else(|| {
        SegmentationError::Inference(format!(
            "mask has {} values, expected {}x{}",
            logits.len(),
            resolution.width,
            resolution.height
        ))
    })
}

/// Interleaved RGB (HWC) in 0..255 to normalised planar (CHW).
pub fn normalize_to_chw(hwc: &[f32]) -> Vec<f32> {
    let plane = hwc.len() / 3;
    let mut chw = vec![0.0f32; plane * 3];
    for (i, px) in hwc.chunks_exact(3).enumerate() {
        for c in 0..3 {
            chw[c * plane + i] = (px[c] - PIXEL_MEAN[c]) / PIXEL_STD[c];
        }
    }
    chw
}

#[cfg(feature = "onnx")]
pub fn read_image(path: &Path) -> Result<Mat, SegmentationError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| SegmentationError::ImageLoad(format!("{} is not valid UTF-8", path.display())))?;
    let image = imread(path_str, IMREAD_COLOR)
        .map_err(|e| SegmentationError::ImageLoad(format!("{}: {}", path.display(), e.message)))?;
    if image.empty() {
        return Err(SegmentationError::ImageLoad(format!(
            "{} could not be decoded",
            path.display()
        )));
    }
    Ok(image)
}

#[cfg(feature = "onnx")]
pub fn image_resolution(image: &Mat) -> Resolution {
    Resolution::new(image.cols().max(0) as u32, image.rows().max(0) as u32)
}

/// BGR image to the `[1, 3, H, W]` encoder input at `size`.
#[cfg(feature = "onnx")]
pub fn encoder_input(image: &Mat, size: Resolution) -> Result<Vec<f32>, SegmentationError> {
    let mut image_rgb = Mat::default();
    cvt_color(image, &mut image_rgb, COLOR_BGR2RGB, 0)?;

    let mut resized = Mat::default();
    resize(
        &image_rgb,
        &mut resized,
        Size::new(size.width as i32, size.height as i32),
        0.0,
        0.0,
        INTER_LINEAR,
    )?;

    let mut image_float = Mat::default();
    resized.convert_to(&mut image_float, CV_32FC3, 1.0, 0.0)?;

    let hwc: &[f32] = bytemuck::try_cast_slice(image_float.data_bytes()?)
        .map_err(|e| SegmentationError::Inference(format!("unexpected pixel layout: {e}")))?;
    Ok(normalize_to_chw(hwc))
}
