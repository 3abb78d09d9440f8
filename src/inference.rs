use std::path::Path;

use crate::coords::Resolution;
use crate::error::SegmentationError;
use crate::mask::{FOREGROUND, MaskImage};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Roi {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prompt {
    pub points: Vec<Point>,
    pub negative_points: Vec<Point>,
    pub roi: Option<Roi>,
}

impl Prompt {
    pub fn single(x: f32, y: f32) -> Self {
        Prompt { points: vec![Point { x, y }], ..Default::default() }
    }
}

#[derive(Debug, Clone)]
pub struct MaskPrediction {
    /// Binary mask at model resolution, `FOREGROUND` for selected pixels.
    pub mask: MaskImage,
    pub iou: Option<f32>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AutoSegmentOptions {
    /// Prompts are laid out on a `points_per_side` x `points_per_side` grid.
    pub points_per_side: u32,
    pub iou_threshold: f32,
    pub min_area: usize,
}

impl Default for AutoSegmentOptions {
    fn default() -> Self {
        AutoSegmentOptions { points_per_side: 16, iou_threshold: 0.86, min_area: 100 }
    }
}

impl AutoSegmentOptions {
    pub const MAX_POINTS_PER_SIDE: u32 = 256;

    pub fn validate(&self) -> Result<(), SegmentationError> {
        if self.points_per_side == 0 || self.points_per_side > Self::MAX_POINTS_PER_SIDE {
            return Err(SegmentationError::InvalidConfig(format!(
                "points_per_side must be in 1..={}, got {}",
                Self::MAX_POINTS_PER_SIDE,
                self.points_per_side
            )));
        }
        if !self.iou_threshold.is_finite() {
            return Err(SegmentationError::InvalidConfig("iou_threshold must be finite".to_string()));
        }
        Ok(())
    }
}

pub trait InferenceService: Send {
    /// Resolution the network expects, fixed for the lifetime of the service.
    fn input_size(&self) -> Resolution;

    fn load_image(&mut self, path: &Path) -> Result<Resolution, SegmentationError>;

    fn get_mask(&mut self, prompt: &Prompt) -> Result<MaskPrediction, SegmentationError>;

    /// Segments everything by prompting a regular grid of single points and
    /// OR-ing together the confident, large-enough masks.
    fn auto_segment(
        &mut self,
        options: &AutoSegmentOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<MaskImage, SegmentationError> {
        options.validate()?;
        let size = self.input_size();
        let side = options.points_per_side as usize;
        let total = side
            .checked_mul(side)
            .ok_or_else(|| SegmentationError::InvalidConfig("auto segmentation grid too large".to_string()))?;
        let mut combined = MaskImage::new(size);
        for i in 0..total {
            let (gx, gy) = (i % side, i / side);
            let x = (gx as f32 + 0.5) * size.width as f32 / side as f32;
            let y = (gy as f32 + 0.5) * size.height as f32 / side as f32;
            match self.get_mask(&Prompt::single(x, y)) {
                Ok(prediction) => {
                    let confident = prediction.iou.is_none_or(|iou| iou >= options.iou_threshold);
                    let area = prediction.mask.foreground_count();
                    if confident && area >= options.min_area {
                        combined.union_with(&prediction.mask.resize_nearest(size));
                    }
                }
                Err(err) => tracing::debug!(x, y, %err, "grid prompt skipped"),
            }
            progress((i + 1) as f64 / total as f64);
        }
        Ok(combined)
    }
}

/// True if `mask` cannot contribute any pixels to the selection.
pub fn is_blank(mask: &MaskImage) -> bool {
    mask.is_empty() || !mask.as_raw().contains(&FOREGROUND)
}
