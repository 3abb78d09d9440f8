use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

use crate::coords::Resolution;

/// Value marking a foreground pixel in an inference mask.
pub const FOREGROUND: u8 = 255;

/// Single-channel binary mask as produced by the inference service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskImage {
    pixels: GrayImage,
}

impl MaskImage {
    pub fn new(resolution: Resolution) -> Self {
        MaskImage { pixels: GrayImage::new(resolution.width, resolution.height) }
    }

    pub fn filled(resolution: Resolution, value: u8) -> Self {
        MaskImage { pixels: GrayImage::from_pixel(resolution.width, resolution.height, Luma([value])) }
    }

    /// Wraps row-major bytes, `None` if the length does not match the resolution.
    pub fn from_raw(resolution: Resolution, data: Vec<u8>) -> Option<Self> {
        if data.len() != resolution.area() {
            return None;
        }
        GrayImage::from_raw(resolution.width, resolution.height, data).map(|pixels| MaskImage { pixels })
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.pixels.width(), self.pixels.height())
    }

    pub fn is_empty(&self) -> bool {
        self.resolution().is_empty()
    }

    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn foreground_count(&self) -> usize {
        self.pixels.pixels().filter(|p| p.0[0] == FOREGROUND).count()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels.get_pixel(x, y).0[0]
    }

    /// Marks `(x, y)` as foreground; out-of-bounds coordinates are ignored.
    pub fn set_foreground(&mut self, x: u32, y: u32) {
        if x < self.pixels.width() && y < self.pixels.height() {
            self.pixels.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }

    pub fn foreground(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.pixels
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] == FOREGROUND)
            .map(|(x, y, _)| (x, y))
    }

    /// Nearest-neighbour resample to `target`, so the mask stays binary.
    pub fn resize_nearest(&self, target: Resolution) -> MaskImage {
        if self.is_empty() || target.is_empty() {
            return MaskImage::new(target);
        }
        MaskImage { pixels: imageops::resize(&self.pixels, target.width, target.height, FilterType::Nearest) }
    }

    /// Sets every pixel that is foreground in `other` (same resolution).
    pub fn union_with(&mut self, other: &MaskImage) {
        if other.resolution() != self.resolution() {
            return;
        }
        for (dst, src) in self.pixels.pixels_mut().zip(other.pixels.pixels()) {
            if src.0[0] == FOREGROUND {
                *dst = Luma([FOREGROUND]);
            }
        }
    }
}
